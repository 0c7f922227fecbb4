//! Capacity-bounded FIFO mail slots.
//!
//! A mail slot is a named mailbox shared by any number of writers and readers.
//! Writers enqueue whole messages, readers dequeue them one at a time in commit
//! order, and the slot enforces a byte budget (`max_storage`) and a per-message
//! limit (`max_data_unit_size`). Each direction is independently blocking or
//! non-blocking, and blocked callers can be interrupted without side effects.
//!
//! ```
//! use mailslot::{Command, Registry};
//!
//! let registry = Registry::default();
//! let writer = registry.open(0)?;
//! let reader = registry.open(0)?;
//!
//! writer.write(b"first")?;
//! writer.write(b"second")?;
//!
//! reader.control(Command::SetBlockingRead(false))?;
//! assert_eq!(reader.recv(128)?, b"first");
//! assert_eq!(reader.recv(128)?, b"second");
//! assert!(matches!(reader.recv(128), Err(mailslot::Error::WouldBlock)));
//! # Ok::<(), mailslot::Error>(())
//! ```

pub mod control;
pub mod core;
pub mod registry;
pub mod session;

pub use crate::control::Command;
pub use crate::core::{Error, Interrupt, Mailslot, MailslotConfig, Result, SlotStats};
pub use crate::registry::{Registry, RegistryConfig, TeardownReport};
pub use crate::session::{Interrupter, Session};
