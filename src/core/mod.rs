//! Mail slot primitives: message queue, lock/wait protocol, slot operations.

pub mod config;
pub mod error;
pub mod interrupt;
pub mod mailslot;
pub mod queue;
pub mod sync;

pub use config::{MailslotConfig, DEFAULT_MAX_DATA_UNIT_SIZE, MAX_MINOR_NUMBER, MAX_STORAGE};
pub use error::{Error, Result};
pub use interrupt::Interrupt;
pub use mailslot::{Mailslot, SlotStats};
pub use queue::{Message, MessageQueue};
