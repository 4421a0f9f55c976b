use thiserror::Error;
use tracing::{debug, info, trace, warn};

use growatt_registers::{
    decode_config, decode_status, ConfigRecord, DecodeError, RegisterBlock, RegisterSpace, Schema,
    StatusRecord,
};
use modbus_client::{ClientConfig, ClientError, ModbusClient, RegisterReader};
use types::DeviceIdentity;

/// Holding register read once at connect time as a liveness probe.
pub const PROBE_ADDRESS: u16 = 73;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Transport,
    Decode,
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Transport(#[from] ClientError),
    #[error(transparent)]
    Decode(#[from] DecodeError),
}

impl SessionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SessionError::Transport(_) => ErrorKind::Transport,
            SessionError::Decode(_) => ErrorKind::Decode,
        }
    }
}

/// One inverter reached through an exclusively owned register reader.
#[derive(Debug)]
pub struct DeviceSession<R> {
    identity: DeviceIdentity,
    reader: R,
    protocol_version: u16,
}

impl DeviceSession<ModbusClient> {
    /// Opens the serial port named by `identity` and probes the device.
    pub async fn connect(
        identity: DeviceIdentity,
        mut config: ClientConfig,
    ) -> Result<Self, SessionError> {
        config.port = identity.port.clone();
        let client = ModbusClient::connect(config).await?;
        Self::attach(identity, client).await
    }
}

impl<R: RegisterReader> DeviceSession<R> {
    /// Probes the device through an already open reader.
    pub async fn attach(identity: DeviceIdentity, reader: R) -> Result<Self, SessionError> {
        let probe = reader
            .read_holding_registers(identity.unit_id, PROBE_ADDRESS, 1)
            .await?;
        let protocol_version = probe.first().copied().ok_or(ClientError::ShortResponse {
            expected: 1,
            actual: 0,
        })?;
        info!(
            device = %identity.name,
            unit_id = identity.unit_id,
            protocol_version,
            "inverter connected"
        );

        Ok(Self {
            identity,
            reader,
            protocol_version,
        })
    }

    pub fn identity(&self) -> &DeviceIdentity {
        &self.identity
    }

    pub fn unit_id(&self) -> u8 {
        self.identity.unit_id
    }

    /// Value of the probe register, cached at connect time.
    pub fn protocol_version(&self) -> u16 {
        self.protocol_version
    }

    pub async fn read_status(&self) -> Result<StatusRecord, SessionError> {
        let block = self.read_block(Schema::Status).await?;
        let record = decode_status(&block).inspect_err(|err| self.log_decode_error(err))?;
        debug!(unit_id = self.unit_id(), status = %record.status, "status decoded");
        Ok(record)
    }

    pub async fn read_config(&self) -> Result<ConfigRecord, SessionError> {
        let block = self.read_block(Schema::Config).await?;
        let record = decode_config(&block).inspect_err(|err| self.log_decode_error(err))?;
        debug!(unit_id = self.unit_id(), "config decoded");
        Ok(record)
    }

    async fn read_block(&self, schema: Schema) -> Result<RegisterBlock, SessionError> {
        let unit_id = self.unit_id();
        let words = match schema.space() {
            RegisterSpace::Input => {
                self.reader
                    .read_input_registers(unit_id, schema.start(), schema.count())
                    .await
            }
            RegisterSpace::Holding => {
                self.reader
                    .read_holding_registers(unit_id, schema.start(), schema.count())
                    .await
            }
        }
        .inspect_err(|err| {
            warn!(
                device = %self.identity.name,
                unit_id,
                schema = %schema,
                error = %err,
                "register read failed"
            )
        })?;
        trace!(unit_id, schema = %schema, registers = ?words, "raw block");

        Ok(RegisterBlock::new(schema.space(), schema.start(), words))
    }

    fn log_decode_error(&self, err: &DecodeError) {
        warn!(
            device = %self.identity.name,
            unit_id = self.unit_id(),
            protocol_version = self.protocol_version,
            error = %err,
            "register block did not match the expected layout"
        );
    }
}
