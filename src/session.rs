//! Open handles to a slot.
//!
//! A [`Session`] is what a process holds between open and close: it counts
//! toward the slot's session total and owns the interrupt token its blocking
//! calls listen on. Closing a session never destroys the slot or its
//! messages.
//!
//! ```
//! use std::thread;
//! use mailslot::Registry;
//!
//! let registry = Registry::default();
//! let session = registry.open(7)?;
//! let interrupter = session.interrupter();
//!
//! thread::scope(|s| {
//!     let reader = s.spawn(|| session.recv(128));
//!     interrupter.interrupt();
//!     assert!(matches!(reader.join().unwrap(), Err(mailslot::Error::Interrupted)));
//! });
//! # Ok::<(), mailslot::Error>(())
//! ```

use std::sync::Arc;

use log::info;

use crate::control::{self, Command};
use crate::core::{Interrupt, Mailslot, Result, SlotStats};

pub struct Session {
    slot: Arc<Mailslot>,
    interrupt: Interrupt,
}

impl Session {
    pub(crate) fn open(slot: Arc<Mailslot>) -> Self {
        let sessions = slot.open_session();
        info!(
            "mailslot {}: opened by process {}, {} sessions",
            slot.minor(),
            std::process::id(),
            sessions
        );
        Self {
            slot,
            interrupt: Interrupt::new(),
        }
    }

    pub fn minor(&self) -> u32 {
        self.slot.minor()
    }

    pub fn slot(&self) -> &Arc<Mailslot> {
        &self.slot
    }

    pub fn write(&self, payload: &[u8]) -> Result<usize> {
        self.slot.write_interruptible(payload, Some(&self.interrupt))
    }

    pub fn read(&self, buf: &mut [u8]) -> Result<usize> {
        self.slot.read_interruptible(buf, Some(&self.interrupt))
    }

    pub fn recv(&self, capacity: usize) -> Result<Vec<u8>> {
        self.slot.recv_interruptible(capacity, Some(&self.interrupt))
    }

    pub fn control(&self, command: Command) -> Result<u64> {
        control::dispatch(&self.slot, command)
    }

    pub fn ioctl(&self, code: u32, arg: u64) -> Result<u64> {
        control::ioctl(&self.slot, code, arg)
    }

    pub fn stats(&self) -> SlotStats {
        self.slot.stats()
    }

    /// Handle that cancels this session's blocking calls from another thread.
    pub fn interrupter(&self) -> Interrupter {
        Interrupter {
            slot: Arc::clone(&self.slot),
            interrupt: self.interrupt.clone(),
        }
    }

    /// Whether an interrupt is waiting to be observed by the next blocking wait.
    pub fn interrupt_pending(&self) -> bool {
        self.interrupt.is_pending()
    }

    /// Drops an interrupt that no wait has observed yet.
    pub fn clear_interrupt(&self) {
        self.interrupt.clear();
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        let sessions = self.slot.close_session();
        info!(
            "mailslot {}: closed by process {}, {} sessions",
            self.slot.minor(),
            std::process::id(),
            sessions
        );
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("minor", &self.slot.minor())
            .field("interrupt_pending", &self.interrupt.is_pending())
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct Interrupter {
    slot: Arc<Mailslot>,
    interrupt: Interrupt,
}

impl Interrupter {
    /// Wakes the session's blocked call with `Error::Interrupted`, or makes its
    /// next wait fail if nothing is blocked yet.
    pub fn interrupt(&self) {
        self.slot.interrupt(&self.interrupt);
    }
}
