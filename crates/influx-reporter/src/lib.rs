use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::future::Future;

use thiserror::Error;
use tracing::{debug, info};
use types::FieldValue;

/// One time-series sample: measurement, tag set and ordered field set.
#[derive(Debug, Clone, PartialEq)]
pub struct Point {
    measurement: String,
    tags: BTreeMap<String, String>,
    fields: Vec<(String, FieldValue)>,
    timestamp_ns: Option<i64>,
}

impl Point {
    pub fn new(measurement: impl Into<String>) -> Self {
        Self {
            measurement: measurement.into(),
            tags: BTreeMap::new(),
            fields: Vec::new(),
            timestamp_ns: None,
        }
    }

    pub fn tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    pub fn field(mut self, key: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.fields.push((key.into(), value.into()));
        self
    }

    pub fn fields<K, I>(mut self, fields: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, FieldValue)>,
    {
        self.fields
            .extend(fields.into_iter().map(|(key, value)| (key.into(), value)));
        self
    }

    pub fn timestamp_ns(mut self, timestamp_ns: i64) -> Self {
        self.timestamp_ns = Some(timestamp_ns);
        self
    }

    pub fn measurement(&self) -> &str {
        &self.measurement
    }

    pub fn tags(&self) -> &BTreeMap<String, String> {
        &self.tags
    }

    pub fn field_values(&self) -> &[(String, FieldValue)] {
        &self.fields
    }

    pub fn get(&self, key: &str) -> Option<&FieldValue> {
        self.fields
            .iter()
            .find(|(name, _)| name == key)
            .map(|(_, value)| value)
    }

    /// Renders the point in InfluxDB line protocol, fields in insertion order.
    pub fn to_line_protocol(&self) -> String {
        let mut line = String::with_capacity(64 + self.fields.len() * 24);
        escape_into(&mut line, &self.measurement, &[',', ' ']);
        for (key, value) in &self.tags {
            line.push(',');
            escape_into(&mut line, key, &[',', '=', ' ']);
            line.push('=');
            escape_into(&mut line, value, &[',', '=', ' ']);
        }

        for (idx, (key, value)) in self.fields.iter().enumerate() {
            line.push(if idx == 0 { ' ' } else { ',' });
            escape_into(&mut line, key, &[',', '=', ' ']);
            line.push('=');
            match value {
                FieldValue::Float(v) => {
                    let _ = write!(line, "{v}");
                }
                FieldValue::Integer(v) => {
                    let _ = write!(line, "{v}i");
                }
                FieldValue::Text(v) => {
                    line.push('"');
                    escape_into(&mut line, v, &['"', '\\']);
                    line.push('"');
                }
            }
        }

        if let Some(ts) = self.timestamp_ns {
            let _ = write!(line, " {ts}");
        }
        line
    }
}

fn escape_into(out: &mut String, value: &str, special: &[char]) {
    for ch in value.chars() {
        if special.contains(&ch) {
            out.push('\\');
        }
        out.push(ch);
    }
}

#[derive(Debug, Error)]
pub enum WriteError {
    #[error("point {0} has no fields")]
    Empty(String),
    #[error("influxdb write error: {0}")]
    Influx(String),
    #[error("write did not complete within {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },
}

/// Persists points. One call is one write attempt; no retry or buffering.
pub trait Reporter {
    fn write(&self, point: &Point) -> impl Future<Output = Result<(), WriteError>> + Send;
}

impl<T: Reporter + Sync> Reporter for &T {
    fn write(&self, point: &Point) -> impl Future<Output = Result<(), WriteError>> + Send {
        (**self).write(point)
    }
}

#[derive(Debug, Clone)]
pub struct InfluxConfig {
    /// Server base URL. Empty selects the logging-only reporter.
    pub url: String,
    pub org: String,
    pub bucket: String,
    pub token: String,
}

impl Default for InfluxConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            org: String::new(),
            bucket: "growatt_status".to_string(),
            token: String::new(),
        }
    }
}

/// InfluxDB 2.x writer. Without a client it only logs what it would send.
#[derive(Debug, Clone)]
pub struct InfluxReporter {
    client: Option<influxdb2::Client>,
    org: String,
    bucket: String,
}

impl InfluxReporter {
    pub fn new_mock(bucket: impl Into<String>) -> Self {
        Self {
            client: None,
            org: String::new(),
            bucket: bucket.into(),
        }
    }

    pub fn new_influx(config: InfluxConfig) -> Self {
        debug!(url = %config.url, org = %config.org, bucket = %config.bucket, "creating influxdb client");
        let client = influxdb2::Client::new(config.url, config.org.clone(), config.token);
        Self {
            client: Some(client),
            org: config.org,
            bucket: config.bucket,
        }
    }

    pub fn from_config(config: InfluxConfig) -> Self {
        if config.url.trim().is_empty() {
            Self::new_mock(config.bucket)
        } else {
            Self::new_influx(config)
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn is_mock(&self) -> bool {
        self.client.is_none()
    }
}

impl Reporter for InfluxReporter {
    async fn write(&self, point: &Point) -> Result<(), WriteError> {
        if point.fields.is_empty() {
            return Err(WriteError::Empty(point.measurement.clone()));
        }

        let line = point.to_line_protocol();
        match &self.client {
            Some(client) => {
                let bytes = line.len();
                client
                    .write_line_protocol(&self.org, &self.bucket, line)
                    .await
                    .map_err(|err| WriteError::Influx(err.to_string()))?;
                debug!(bucket = %self.bucket, bytes, "influxdb write ok");
                Ok(())
            }
            None => {
                info!(bucket = %self.bucket, line = %line, "mock write invoked");
                Ok(())
            }
        }
    }
}
