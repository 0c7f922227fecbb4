//! Per-slot configuration.
//!
//! Defaults reproduce the character-device driver: 1 MiB of storage per slot,
//! 128-byte messages, both directions blocking.

#[cfg(feature = "config")]
use serde::{Deserialize, Serialize};

use crate::core::{Error, Result};

/// Number of addressable minor numbers.
pub const MAX_MINOR_NUMBER: u32 = 256;
/// Default (and ceiling) per-message size in bytes.
pub const DEFAULT_MAX_DATA_UNIT_SIZE: usize = 128;
/// Byte capacity of one slot.
pub const MAX_STORAGE: usize = 1 << 20;

/// Configuration applied to each newly created slot.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "config", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "config", serde(default))]
pub struct MailslotConfig {
    /// Fixed byte capacity. Never changes after the slot is created.
    /// Default: 1 MiB
    pub max_storage: usize,

    /// Initial per-message size limit.
    /// Default: 128
    pub max_data_unit_size: usize,

    /// Upper bound accepted by `set_max_data_unit_size`.
    /// Default: 128
    pub max_data_unit_size_ceiling: usize,

    /// Initial write mode.
    /// Default: true
    pub blocking_write: bool,

    /// Initial read mode.
    /// Default: true
    pub blocking_read: bool,
}

impl Default for MailslotConfig {
    fn default() -> Self {
        Self {
            max_storage: MAX_STORAGE,
            max_data_unit_size: DEFAULT_MAX_DATA_UNIT_SIZE,
            max_data_unit_size_ceiling: DEFAULT_MAX_DATA_UNIT_SIZE,
            blocking_write: true,
            blocking_read: true,
        }
    }
}

impl MailslotConfig {
    /// Small slot used by tests and demos.
    pub fn with_capacity(max_storage: usize, max_data_unit_size: usize) -> Self {
        Self {
            max_storage,
            max_data_unit_size,
            max_data_unit_size_ceiling: max_data_unit_size
                .max(DEFAULT_MAX_DATA_UNIT_SIZE)
                .min(max_storage),
            ..Self::default()
        }
    }

    pub fn non_blocking(self) -> Self {
        Self {
            blocking_write: false,
            blocking_read: false,
            ..self
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_storage == 0 {
            return Err(Error::Config("max_storage must be positive".to_string()));
        }
        if self.max_data_unit_size_ceiling == 0
            || self.max_data_unit_size_ceiling > self.max_storage
        {
            return Err(Error::Config(format!(
                "max_data_unit_size_ceiling {} outside 1..={}",
                self.max_data_unit_size_ceiling, self.max_storage
            )));
        }
        if self.max_data_unit_size == 0
            || self.max_data_unit_size > self.max_data_unit_size_ceiling
        {
            return Err(Error::Config(format!(
                "max_data_unit_size {} outside 1..={}",
                self.max_data_unit_size, self.max_data_unit_size_ceiling
            )));
        }
        Ok(())
    }
}
