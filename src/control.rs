//! ioctl-style control surface.
//!
//! Command codes are the ones the character-device driver exposed, so tooling
//! written against `(code, arg)` pairs keeps working:
//!
//! | Code | Command | Argument | Result |
//! |------|---------|----------|--------|
//! | 3 | change write blocking mode | 0 or 1 | 0 |
//! | 4 | change read blocking mode | 0 or 1 | 0 |
//! | 5 | change max data unit size | 1..=ceiling | 0 |
//! | 6 | get max data unit size | - | size |
//! | 7 | get free space | - | bytes |
//! | 8 | get write blocking mode | - | 0 or 1 |
//! | 9 | get read blocking mode | - | 0 or 1 |

use log::{debug, warn};

use crate::core::{Error, Mailslot, Result};

pub const CHANGE_WRITE_BLOCKING_MODE: u32 = 3;
pub const CHANGE_READ_BLOCKING_MODE: u32 = 4;
pub const CHANGE_MAX_DATA_UNIT_SIZE: u32 = 5;
pub const GET_MAX_DATA_UNIT_SIZE: u32 = 6;
pub const GET_FREESPACE_SIZE: u32 = 7;
pub const GET_WRITE_BLOCKING_MODE: u32 = 8;
pub const GET_READ_BLOCKING_MODE: u32 = 9;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    SetBlockingWrite(bool),
    SetBlockingRead(bool),
    SetMaxDataUnitSize(usize),
    GetMaxDataUnitSize,
    GetFreeSpace,
    GetBlockingWrite,
    GetBlockingRead,
}

impl Command {
    /// Validates a raw `(code, arg)` pair. Getters ignore `arg`.
    pub fn decode(code: u32, arg: u64) -> Result<Self> {
        match code {
            CHANGE_WRITE_BLOCKING_MODE => decode_mode(arg).map(Command::SetBlockingWrite),
            CHANGE_READ_BLOCKING_MODE => decode_mode(arg).map(Command::SetBlockingRead),
            CHANGE_MAX_DATA_UNIT_SIZE => usize::try_from(arg)
                .map(Command::SetMaxDataUnitSize)
                .map_err(|_| Error::InvalidArgument("max data unit size out of range")),
            GET_MAX_DATA_UNIT_SIZE => Ok(Command::GetMaxDataUnitSize),
            GET_FREESPACE_SIZE => Ok(Command::GetFreeSpace),
            GET_WRITE_BLOCKING_MODE => Ok(Command::GetBlockingWrite),
            GET_READ_BLOCKING_MODE => Ok(Command::GetBlockingRead),
            other => {
                warn!("inappropriate control command {other}");
                Err(Error::NotSupported(other))
            }
        }
    }

    pub fn code(&self) -> u32 {
        match self {
            Command::SetBlockingWrite(_) => CHANGE_WRITE_BLOCKING_MODE,
            Command::SetBlockingRead(_) => CHANGE_READ_BLOCKING_MODE,
            Command::SetMaxDataUnitSize(_) => CHANGE_MAX_DATA_UNIT_SIZE,
            Command::GetMaxDataUnitSize => GET_MAX_DATA_UNIT_SIZE,
            Command::GetFreeSpace => GET_FREESPACE_SIZE,
            Command::GetBlockingWrite => GET_WRITE_BLOCKING_MODE,
            Command::GetBlockingRead => GET_READ_BLOCKING_MODE,
        }
    }

    pub fn arg(&self) -> u64 {
        match *self {
            Command::SetBlockingWrite(mode) | Command::SetBlockingRead(mode) => u64::from(mode),
            Command::SetMaxDataUnitSize(size) => size as u64,
            _ => 0,
        }
    }
}

fn decode_mode(arg: u64) -> Result<bool> {
    match arg {
        0 => Ok(false),
        1 => Ok(true),
        _ => {
            warn!("invalid blocking mode argument {arg}, expected 0 or 1");
            Err(Error::InvalidArgument("blocking mode must be 0 or 1"))
        }
    }
}

/// Runs `command` against `slot`. Setters return 0, getters the value.
pub fn dispatch(slot: &Mailslot, command: Command) -> Result<u64> {
    debug!("mailslot {}: control {:?}", slot.minor(), command);
    match command {
        Command::SetBlockingWrite(mode) => {
            slot.set_blocking_write(mode);
            Ok(0)
        }
        Command::SetBlockingRead(mode) => {
            slot.set_blocking_read(mode);
            Ok(0)
        }
        Command::SetMaxDataUnitSize(size) => slot.set_max_data_unit_size(size).map(|()| 0),
        Command::GetMaxDataUnitSize => Ok(slot.max_data_unit_size() as u64),
        Command::GetFreeSpace => Ok(slot.free_space() as u64),
        Command::GetBlockingWrite => Ok(u64::from(slot.blocking_write())),
        Command::GetBlockingRead => Ok(u64::from(slot.blocking_read())),
    }
}

/// Decodes and runs a raw `(code, arg)` request.
pub fn ioctl(slot: &Mailslot, code: u32, arg: u64) -> Result<u64> {
    dispatch(slot, Command::decode(code, arg)?)
}
