use std::cmp::min;
use std::fmt;
use std::future::Future;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::{sleep, timeout};
use tokio_modbus::client::{rtu, Context};
use tokio_modbus::prelude::{Reader, Slave, SlaveContext};
use tokio_serial::{DataBits, SerialPortBuilderExt, StopBits};
use tracing::{debug, info, warn};

/// Highest unit id addressable on a Modbus serial line.
pub const MAX_UNIT_ID: u8 = 247;

/// Serial link settings for a Modbus RTU line.
#[cfg_attr(feature = "config", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Serial device path.
    pub port: String,
    pub baud_rate: u32,
    pub data_bits: u8,
    pub stop_bits: u8,
    pub parity: Parity,
    /// Per-request response timeout in milliseconds.
    pub timeout_ms: u64,
    /// Number of retries per request after the initial attempt.
    pub retry_count: usize,
    /// Base delay between retries in milliseconds (exponential backoff).
    pub retry_backoff_ms: u64,
    /// Upper bound for retry backoff delay in milliseconds.
    pub retry_max_backoff_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            port: "/dev/ttyUSB0".to_string(),
            baud_rate: 9_600,
            data_bits: 8,
            stop_bits: 1,
            parity: Parity::None,
            timeout_ms: 1_000,
            retry_count: 0,
            retry_backoff_ms: 100,
            retry_max_backoff_ms: 2_000,
        }
    }
}

#[cfg_attr(feature = "config", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Parity {
    None,
    Even,
    Odd,
}

impl FromStr for Parity {
    type Err = ClientError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "n" | "none" => Ok(Parity::None),
            "e" | "even" => Ok(Parity::Even),
            "o" | "odd" => Ok(Parity::Odd),
            _ => Err(ClientError::InvalidParity(value.to_string())),
        }
    }
}

impl fmt::Display for Parity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Parity::None => "N",
            Parity::Even => "E",
            Parity::Odd => "O",
        })
    }
}

impl From<Parity> for tokio_serial::Parity {
    fn from(value: Parity) -> Self {
        match value {
            Parity::None => tokio_serial::Parity::None,
            Parity::Even => tokio_serial::Parity::Even,
            Parity::Odd => tokio_serial::Parity::Odd,
        }
    }
}

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("failed to open serial port {port}: {source}")]
    Serial {
        port: String,
        source: tokio_serial::Error,
    },
    #[error("modbus transport error: {0}")]
    Modbus(std::io::Error),
    #[error("request timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },
    #[error("short response: expected {expected} registers, got {actual}")]
    ShortResponse { expected: u16, actual: usize },
    #[error("register address overflow")]
    AddressOverflow,
    #[error("unit id {0} outside 1..=247")]
    InvalidUnitId(u8),
    #[error("invalid parity {0:?}")]
    InvalidParity(String),
}

impl ClientError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, ClientError::Timeout { .. })
    }
}

/// Block reads against one bus. Implementations must serialize requests.
pub trait RegisterReader {
    fn read_input_registers(
        &self,
        unit_id: u8,
        start: u16,
        count: u16,
    ) -> impl Future<Output = Result<Vec<u16>, ClientError>> + Send;

    fn read_holding_registers(
        &self,
        unit_id: u8,
        start: u16,
        count: u16,
    ) -> impl Future<Output = Result<Vec<u16>, ClientError>> + Send;
}

impl<T: RegisterReader + Sync> RegisterReader for &T {
    fn read_input_registers(
        &self,
        unit_id: u8,
        start: u16,
        count: u16,
    ) -> impl Future<Output = Result<Vec<u16>, ClientError>> + Send {
        (**self).read_input_registers(unit_id, start, count)
    }

    fn read_holding_registers(
        &self,
        unit_id: u8,
        start: u16,
        count: u16,
    ) -> impl Future<Output = Result<Vec<u16>, ClientError>> + Send {
        (**self).read_holding_registers(unit_id, start, count)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Table {
    Input,
    Holding,
}

impl Table {
    fn as_str(self) -> &'static str {
        match self {
            Table::Input => "input",
            Table::Holding => "holding",
        }
    }
}

/// Modbus RTU master owning one serial port.
#[derive(Debug)]
pub struct ModbusClient {
    config: ClientConfig,
    context: Mutex<Context>,
}

impl ModbusClient {
    pub async fn connect(config: ClientConfig) -> Result<Self, ClientError> {
        let data_bits = match config.data_bits {
            5 => DataBits::Five,
            6 => DataBits::Six,
            7 => DataBits::Seven,
            _ => DataBits::Eight,
        };
        let stop_bits = match config.stop_bits {
            2 => StopBits::Two,
            _ => StopBits::One,
        };

        let serial = tokio_serial::new(config.port.as_str(), config.baud_rate)
            .data_bits(data_bits)
            .stop_bits(stop_bits)
            .parity(config.parity.into())
            .timeout(Duration::from_millis(config.timeout_ms))
            .open_native_async()
            .map_err(|source| ClientError::Serial {
                port: config.port.clone(),
                source,
            })?;
        info!(
            port = %config.port,
            baud_rate = config.baud_rate,
            framing = %format_args!("{}{}{}", config.data_bits, config.parity, config.stop_bits),
            "serial port opened"
        );

        let context = rtu::attach(serial);
        Ok(Self {
            config,
            context: Mutex::new(context),
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    async fn read_range(
        &self,
        table: Table,
        unit_id: u8,
        start: u16,
        count: u16,
    ) -> Result<Vec<u16>, ClientError> {
        if unit_id == 0 || unit_id > MAX_UNIT_ID {
            return Err(ClientError::InvalidUnitId(unit_id));
        }
        if count == 0 {
            return Ok(Vec::new());
        }
        u16::try_from(u32::from(start) + u32::from(count) - 1)
            .map_err(|_| ClientError::AddressOverflow)?;

        let mut ctx = self.context.lock().await;
        ctx.set_slave(Slave(unit_id));
        let mut attempts = 0usize;

        loop {
            let last_error = match self.read_once(&mut ctx, table, start, count).await {
                Ok(values) if values.len() == usize::from(count) => {
                    debug!(unit_id, table = table.as_str(), start, count, "modbus read ok");
                    return Ok(values);
                }
                Ok(values) => {
                    warn!(
                        unit_id,
                        table = table.as_str(),
                        start,
                        count,
                        received = values.len(),
                        "modbus short response"
                    );
                    ClientError::ShortResponse {
                        expected: count,
                        actual: values.len(),
                    }
                }
                Err(err) => {
                    warn!(unit_id, table = table.as_str(), start, count, error = %err, "modbus read failed");
                    err
                }
            };

            if attempts >= self.config.retry_count {
                return Err(last_error);
            }

            let delay_ms = self.retry_delay_ms(attempts);
            attempts += 1;
            sleep(Duration::from_millis(delay_ms)).await;
        }
    }

    async fn read_once(
        &self,
        ctx: &mut Context,
        table: Table,
        start: u16,
        count: u16,
    ) -> Result<Vec<u16>, ClientError> {
        let limit = Duration::from_millis(self.config.timeout_ms);
        let result = match table {
            Table::Input => timeout(limit, ctx.read_input_registers(start, count)).await,
            Table::Holding => timeout(limit, ctx.read_holding_registers(start, count)).await,
        };
        match result {
            Ok(Ok(values)) => Ok(values),
            Ok(Err(err)) => Err(ClientError::Modbus(err)),
            Err(_) => Err(ClientError::Timeout {
                timeout_ms: self.config.timeout_ms,
            }),
        }
    }

    fn retry_delay_ms(&self, attempt: usize) -> u64 {
        retry_delay_ms(
            self.config.retry_backoff_ms,
            self.config.retry_max_backoff_ms,
            attempt,
        )
    }
}

impl RegisterReader for ModbusClient {
    async fn read_input_registers(
        &self,
        unit_id: u8,
        start: u16,
        count: u16,
    ) -> Result<Vec<u16>, ClientError> {
        self.read_range(Table::Input, unit_id, start, count).await
    }

    async fn read_holding_registers(
        &self,
        unit_id: u8,
        start: u16,
        count: u16,
    ) -> Result<Vec<u16>, ClientError> {
        self.read_range(Table::Holding, unit_id, start, count).await
    }
}

/// Exponential backoff for retry `attempt` (0-based), clamped to `max_ms`.
pub fn retry_delay_ms(base_ms: u64, max_ms: u64, attempt: usize) -> u64 {
    let base = base_ms.max(1);
    let shift = u32::try_from(attempt).unwrap_or(u32::MAX);
    let factor = 1u64.checked_shl(shift).unwrap_or(u64::MAX);
    let delay = base.saturating_mul(factor);
    min(delay, max_ms.max(base))
}
