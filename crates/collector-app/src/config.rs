use std::env::{self, VarError};
use std::fs;
use std::net::SocketAddr;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use influx_reporter::InfluxConfig;
use modbus_client::{ClientConfig, Parity, MAX_UNIT_ID};
use poller_actor::ActorConfig;
use types::DeviceIdentity;

const DEFAULT_DEVICE_NAME: &str = "Growatt SPF5000ES";
const DEFAULT_PORT: &str = "/dev/ttyXRUSB0";
const DEFAULT_UNIT_ID: u8 = 1;
const DEFAULT_RECONNECT_DELAY_MS: u64 = 5_000;
const DEFAULT_LOG_FILTER: &str = "info";

#[derive(Clone, Debug)]
pub struct CollectorConfig {
    pub device: DeviceIdentity,
    /// Serial settings; `port` is always taken from `device`.
    pub modbus: ClientConfig,
    pub poller: ActorConfig,
    pub reconnect_delay_ms: u64,
    pub influx: InfluxConfig,
    /// Address for `/healthz` and `/metrics`; unset disables the listener.
    pub http_listen: Option<String>,
    pub log_filter: String,
}

impl CollectorConfig {
    pub fn load() -> Result<Self> {
        Self::load_with_path(None)
    }

    pub fn load_with_path(config_path: Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(file_config) = load_file_config(config_path.as_deref())? {
            apply_file_config(&mut config, file_config)?;
        }

        apply_env_overrides(&mut config)?;
        config.modbus.port = config.device.port.clone();
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.device.unit_id == 0 || self.device.unit_id > MAX_UNIT_ID {
            anyhow::bail!("device.unit_id must be between 1 and {MAX_UNIT_ID}");
        }
        if self.device.port.trim().is_empty() {
            anyhow::bail!("device.port must be non-empty");
        }
        if self.modbus.baud_rate == 0 {
            anyhow::bail!("modbus.baud_rate must be >= 1");
        }
        if !(5..=8).contains(&self.modbus.data_bits) {
            anyhow::bail!("modbus.data_bits must be between 5 and 8");
        }
        if !(1..=2).contains(&self.modbus.stop_bits) {
            anyhow::bail!("modbus.stop_bits must be 1 or 2");
        }
        if self.modbus.timeout_ms == 0 {
            anyhow::bail!("modbus.timeout_ms must be >= 1");
        }
        if self.modbus.retry_backoff_ms == 0 {
            anyhow::bail!("modbus.retry_backoff_ms must be >= 1");
        }
        if self.poller.poll_interval.is_zero() {
            anyhow::bail!("poller.poll_interval_ms must be >= 1");
        }
        if self.poller.measurement.trim().is_empty() {
            anyhow::bail!("poller.measurement must be non-empty");
        }
        if self.poller.location.trim().is_empty() {
            anyhow::bail!("poller.location must be non-empty");
        }
        if self.poller.degraded_after == 0 {
            anyhow::bail!("poller.degraded_after must be >= 1");
        }
        if self.poller.write_timeout.is_zero() {
            anyhow::bail!("poller.write_timeout_ms must be >= 1");
        }
        if self.reconnect_delay_ms == 0 {
            anyhow::bail!("poller.reconnect_delay_ms must be >= 1");
        }
        if self.influx.bucket.trim().is_empty() {
            anyhow::bail!("influx.bucket must be non-empty");
        }
        if !self.influx.url.trim().is_empty() {
            validate_influx_url(&self.influx.url)?;
            if self.influx.org.trim().is_empty() {
                anyhow::bail!("influx.org must be non-empty when influx.url is set");
            }
        }
        if let Some(ref listen) = self.http_listen {
            listen
                .parse::<SocketAddr>()
                .map_err(|_| anyhow::anyhow!("http.listen must be host:port, got {listen:?}"))?;
        }

        Ok(())
    }

    /// True when points are only logged rather than sent to a server.
    pub fn is_mock_reporter(&self) -> bool {
        self.influx.url.trim().is_empty()
    }
}

impl Default for CollectorConfig {
    fn default() -> Self {
        let device = DeviceIdentity {
            name: DEFAULT_DEVICE_NAME.to_string(),
            port: DEFAULT_PORT.to_string(),
            unit_id: DEFAULT_UNIT_ID,
        };
        let modbus = ClientConfig {
            port: device.port.clone(),
            ..ClientConfig::default()
        };

        Self {
            device,
            modbus,
            poller: ActorConfig::default(),
            reconnect_delay_ms: DEFAULT_RECONNECT_DELAY_MS,
            influx: InfluxConfig::default(),
            http_listen: None,
            log_filter: DEFAULT_LOG_FILTER.to_string(),
        }
    }
}

fn apply_env_overrides(config: &mut CollectorConfig) -> Result<()> {
    if let Ok(value) = env::var("GROWATT_DEVICE_NAME") {
        config.device.name = value;
    }
    if let Ok(value) = env::var("GROWATT_PORT") {
        config.device.port = value;
    }
    if let Some(unit_id) = parse_env::<u8>("GROWATT_UNIT_ID")? {
        config.device.unit_id = unit_id;
    }

    if let Some(baud_rate) = parse_env::<u32>("GROWATT_BAUD_RATE")? {
        config.modbus.baud_rate = baud_rate;
    }
    if let Ok(value) = env::var("GROWATT_PARITY") {
        config.modbus.parity = value.parse::<Parity>().context("GROWATT_PARITY")?;
    }
    if let Some(timeout_ms) = parse_env::<u64>("GROWATT_MODBUS_TIMEOUT_MS")? {
        config.modbus.timeout_ms = timeout_ms;
    }
    if let Some(retry_count) = parse_env::<usize>("GROWATT_RETRY_COUNT")? {
        config.modbus.retry_count = retry_count;
    }

    if let Some(interval_ms) = parse_env::<u64>("GROWATT_POLL_INTERVAL_MS")? {
        config.poller.poll_interval = Duration::from_millis(interval_ms);
    }
    if let Ok(value) = env::var("GROWATT_MEASUREMENT") {
        config.poller.measurement = value;
    }
    if let Ok(value) = env::var("GROWATT_LOCATION") {
        config.poller.location = value;
    }
    if let Some(timeout_ms) = parse_env::<u64>("GROWATT_WRITE_TIMEOUT_MS")? {
        config.poller.write_timeout = Duration::from_millis(timeout_ms);
    }
    config.reconnect_delay_ms =
        parse_env::<u64>("GROWATT_RECONNECT_DELAY_MS")?.unwrap_or(config.reconnect_delay_ms);

    if let Ok(value) = env::var("GROWATT_INFLUX_URL") {
        config.influx.url = value;
    }
    if let Ok(value) = env::var("GROWATT_INFLUX_ORG") {
        config.influx.org = value;
    }
    if let Ok(value) = env::var("GROWATT_INFLUX_BUCKET") {
        config.influx.bucket = value;
    }
    if let Ok(value) = env::var("GROWATT_INFLUX_TOKEN") {
        config.influx.token = value;
    }

    config.http_listen = env::var("GROWATT_HTTP_LISTEN").ok().or(config.http_listen.take());
    if let Ok(value) = env::var("GROWATT_LOG") {
        config.log_filter = value;
    }

    Ok(())
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    device: Option<FileDeviceConfig>,
    modbus: Option<FileModbusConfig>,
    poller: Option<FilePollerConfig>,
    influx: Option<FileInfluxConfig>,
    http: Option<FileHttpConfig>,
    logging: Option<FileLoggingConfig>,
}

#[derive(Debug, Deserialize)]
struct FileDeviceConfig {
    name: Option<String>,
    port: Option<String>,
    unit_id: Option<u8>,
}

#[derive(Debug, Deserialize)]
struct FileModbusConfig {
    baud_rate: Option<u32>,
    data_bits: Option<u8>,
    stop_bits: Option<u8>,
    parity: Option<String>,
    timeout_ms: Option<u64>,
    retry_count: Option<usize>,
    retry_backoff_ms: Option<u64>,
    retry_max_backoff_ms: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct FilePollerConfig {
    poll_interval_ms: Option<u64>,
    measurement: Option<String>,
    location: Option<String>,
    degraded_after: Option<u32>,
    write_timeout_ms: Option<u64>,
    reconnect_delay_ms: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct FileInfluxConfig {
    url: Option<String>,
    org: Option<String>,
    bucket: Option<String>,
    token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FileHttpConfig {
    listen: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FileLoggingConfig {
    filter: Option<String>,
}

fn load_file_config(config_path: Option<&str>) -> Result<Option<FileConfig>> {
    let path = match config_path {
        Some(path) => path.to_string(),
        None => match env::var("GROWATT_CONFIG") {
            Ok(value) => value,
            Err(_) => return Ok(None),
        },
    };

    let content = fs::read_to_string(&path)
        .with_context(|| format!("read config file {path}"))?;
    let ext = Path::new(&path).extension().and_then(|value| value.to_str());

    let config = match ext {
        Some("json") => serde_json::from_str(&content).context("parse json config")?,
        _ => toml::from_str(&content).context("parse toml config")?,
    };

    Ok(Some(config))
}

fn apply_file_config(config: &mut CollectorConfig, file: FileConfig) -> Result<()> {
    if let Some(device) = file.device {
        if let Some(name) = device.name {
            config.device.name = name;
        }
        if let Some(port) = device.port {
            config.device.port = port;
        }
        if let Some(unit_id) = device.unit_id {
            config.device.unit_id = unit_id;
        }
    }

    if let Some(modbus) = file.modbus {
        if let Some(baud_rate) = modbus.baud_rate {
            config.modbus.baud_rate = baud_rate;
        }
        if let Some(data_bits) = modbus.data_bits {
            config.modbus.data_bits = data_bits;
        }
        if let Some(stop_bits) = modbus.stop_bits {
            config.modbus.stop_bits = stop_bits;
        }
        if let Some(parity) = modbus.parity {
            config.modbus.parity = parity.parse().context("modbus.parity")?;
        }
        if let Some(timeout_ms) = modbus.timeout_ms {
            config.modbus.timeout_ms = timeout_ms;
        }
        if let Some(retry_count) = modbus.retry_count {
            config.modbus.retry_count = retry_count;
        }
        if let Some(backoff) = modbus.retry_backoff_ms {
            config.modbus.retry_backoff_ms = backoff;
        }
        if let Some(max_backoff) = modbus.retry_max_backoff_ms {
            config.modbus.retry_max_backoff_ms = max_backoff;
        }
    }

    if let Some(poller) = file.poller {
        if let Some(interval_ms) = poller.poll_interval_ms {
            config.poller.poll_interval = Duration::from_millis(interval_ms);
        }
        if let Some(measurement) = poller.measurement {
            config.poller.measurement = measurement;
        }
        if let Some(location) = poller.location {
            config.poller.location = location;
        }
        if let Some(degraded_after) = poller.degraded_after {
            config.poller.degraded_after = degraded_after;
        }
        if let Some(timeout_ms) = poller.write_timeout_ms {
            config.poller.write_timeout = Duration::from_millis(timeout_ms);
        }
        if let Some(delay) = poller.reconnect_delay_ms {
            config.reconnect_delay_ms = delay;
        }
    }

    if let Some(influx) = file.influx {
        if let Some(url) = influx.url {
            config.influx.url = url;
        }
        if let Some(org) = influx.org {
            config.influx.org = org;
        }
        if let Some(bucket) = influx.bucket {
            config.influx.bucket = bucket;
        }
        if let Some(token) = influx.token {
            config.influx.token = token;
        }
    }

    if let Some(http) = file.http {
        config.http_listen = http.listen.or(config.http_listen.take());
    }

    if let Some(filter) = file.logging.and_then(|logging| logging.filter) {
        config.log_filter = filter;
    }

    Ok(())
}

/// Unset is `None`; a value that does not parse is an error, never ignored.
fn parse_env<T>(key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let value = match env::var(key) {
        Ok(value) => value,
        Err(VarError::NotPresent) => return Ok(None),
        Err(err) => return Err(err).with_context(|| key.to_string()),
    };
    value
        .trim()
        .parse()
        .map(Some)
        .with_context(|| format!("{key}={value:?}"))
}

fn validate_influx_url(url: &str) -> Result<()> {
    let rest = url
        .strip_prefix("http://")
        .or_else(|| url.strip_prefix("https://"))
        .ok_or_else(|| anyhow::anyhow!("influx.url must start with http:// or https://"))?;
    if rest.trim_matches('/').is_empty() {
        anyhow::bail!("influx.url must include a host");
    }
    Ok(())
}
