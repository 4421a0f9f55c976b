//! Register maps for Growatt off-grid (SPF series) inverters.
//!
//! Each map is a static table of `(names, index, kind, unit)` rows. The same
//! table definition generates the typed record struct, so a row that points
//! past the end of its block fails to compile.

use std::fmt;

use serde::Serialize;
use thiserror::Error;

#[macro_use]
mod table;
mod config;
mod status;

pub use config::{ConfigRecord, CONFIG_FIELDS};
pub use status::{OperatingState, StatusRecord, STATUS_FIELDS};

/// Register table a block was read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RegisterSpace {
    Input,
    Holding,
}

impl fmt::Display for RegisterSpace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RegisterSpace::Input => "input",
            RegisterSpace::Holding => "holding",
        })
    }
}

/// The two register layouts exposed by the inverter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Schema {
    /// Live measurements, input registers 0..84.
    Status,
    /// Settings and identifiers, holding registers 0..81.
    Config,
}

impl Schema {
    pub const fn space(self) -> RegisterSpace {
        match self {
            Schema::Status => RegisterSpace::Input,
            Schema::Config => RegisterSpace::Holding,
        }
    }

    /// First register address of the block.
    pub const fn start(self) -> u16 {
        0
    }

    /// Number of registers in one block read.
    pub const fn block_len(self) -> usize {
        match self {
            Schema::Status => 84,
            Schema::Config => 81,
        }
    }

    pub const fn count(self) -> u16 {
        self.block_len() as u16
    }

    pub fn fields(self) -> &'static [FieldDef] {
        match self {
            Schema::Status => STATUS_FIELDS,
            Schema::Config => CONFIG_FIELDS,
        }
    }

    fn check(self, block: &RegisterBlock) -> Result<&[u16], DecodeError> {
        if block.space != self.space() {
            return Err(DecodeError::WrongSpace {
                schema: self,
                expected: self.space(),
                actual: block.space,
            });
        }
        if block.words.len() != self.block_len() {
            return Err(DecodeError::Length {
                schema: self,
                expected: self.block_len(),
                actual: block.words.len(),
            });
        }
        Ok(&block.words)
    }
}

impl fmt::Display for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Schema::Status => "status",
            Schema::Config => "config",
        })
    }
}

/// Raw response of one block read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterBlock {
    space: RegisterSpace,
    start: u16,
    words: Vec<u16>,
}

impl RegisterBlock {
    pub fn new(space: RegisterSpace, start: u16, words: Vec<u16>) -> Self {
        Self {
            space,
            start,
            words,
        }
    }

    pub fn input(words: Vec<u16>) -> Self {
        Self::new(RegisterSpace::Input, 0, words)
    }

    pub fn holding(words: Vec<u16>) -> Self {
        Self::new(RegisterSpace::Holding, 0, words)
    }

    pub fn space(&self) -> RegisterSpace {
        self.space
    }

    pub fn start(&self) -> u16 {
        self.start
    }

    pub fn words(&self) -> &[u16] {
        &self.words
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<u16> {
        self.words.get(index).copied()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("{schema} block must come from {expected} registers, got {actual}")]
    WrongSpace {
        schema: Schema,
        expected: RegisterSpace,
        actual: RegisterSpace,
    },
    #[error("{schema} block must hold {expected} registers, got {actual}")]
    Length {
        schema: Schema,
        expected: usize,
        actual: usize,
    },
    #[error("unknown {field} code {code} in register {index}")]
    UnknownCode {
        field: &'static str,
        index: u16,
        code: u16,
    },
}

/// How a table row turns register words into field values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Raw register value, emitted as an integer.
    Word,
    /// Raw bitmask or diagnostic register, emitted as a float.
    Flags,
    /// Operating-state code, emitted as its label.
    State,
    /// `raw / divisor`.
    Scaled { divisor: u16 },
    /// Two consecutive registers (high word first), each `raw / divisor`.
    /// The halves are emitted as separate fields and never combined.
    Pair { divisor: u16 },
}

impl FieldKind {
    /// Number of registers consumed by the row.
    pub const fn width(self) -> usize {
        match self {
            FieldKind::Pair { .. } => 2,
            _ => 1,
        }
    }

    pub const fn divisor(self) -> Option<u16> {
        match self {
            FieldKind::Scaled { divisor } | FieldKind::Pair { divisor } => Some(divisor),
            _ => None,
        }
    }
}

/// One row of a register map.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldDef {
    /// Output field names; two for [`FieldKind::Pair`] (high, low).
    pub names: &'static [&'static str],
    /// Index of the first register within the block.
    pub index: u16,
    pub kind: FieldKind,
    /// Physical unit, empty for dimensionless values.
    pub unit: &'static str,
}

impl FieldDef {
    /// Multiplier applied to the raw word, if the row is scaled.
    pub fn scale(&self) -> Option<f64> {
        self.kind.divisor().map(|divisor| 1.0 / f64::from(divisor))
    }

    /// Highest register index read by this row.
    pub fn last_index(&self) -> usize {
        usize::from(self.index) + self.kind.width() - 1
    }
}

/// Looks up the row producing `name`.
pub fn find_field(table: &'static [FieldDef], name: &str) -> Option<&'static FieldDef> {
    table
        .iter()
        .find(|def| def.names.iter().any(|candidate| *candidate == name))
}

/// Total number of output fields produced by a table.
pub fn output_count(table: &[FieldDef]) -> usize {
    table.iter().map(|def| def.names.len()).sum()
}

/// Converts a raw word to its physical value. Dividing by the integer
/// divisor yields the closest double to the exact decimal result.
pub fn apply_scale(raw: u16, divisor: u16) -> f64 {
    f64::from(raw) / f64::from(divisor)
}

/// High and low halves of a quantity wider than one register.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WordPair {
    pub high: u16,
    pub low: u16,
    divisor: u16,
}

impl WordPair {
    pub fn new(high: u16, low: u16, divisor: u16) -> Self {
        Self { high, low, divisor }
    }

    pub fn high_value(&self) -> f64 {
        apply_scale(self.high, self.divisor)
    }

    pub fn low_value(&self) -> f64 {
        apply_scale(self.low, self.divisor)
    }

    pub fn raw(&self) -> u32 {
        (u32::from(self.high) << 16) | u32::from(self.low)
    }

    /// Both halves joined as an unsigned 32-bit quantity, scaled.
    pub fn combined(&self) -> f64 {
        f64::from(self.raw()) / f64::from(self.divisor)
    }

    /// Both halves joined as a two's-complement 32-bit quantity, scaled.
    pub fn combined_signed(&self) -> f64 {
        f64::from(self.raw() as i32) / f64::from(self.divisor)
    }
}

pub fn decode_status(block: &RegisterBlock) -> Result<StatusRecord, DecodeError> {
    StatusRecord::decode(block)
}

pub fn decode_config(block: &RegisterBlock) -> Result<ConfigRecord, DecodeError> {
    ConfigRecord::decode(block)
}
