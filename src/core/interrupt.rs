use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Pending-interrupt flag for one caller.
///
/// Raising the flag does not wake anyone by itself; `Mailslot::interrupt`
/// raises it and then wakes the slot's waiters, which observe and consume it.
/// A flag raised while its owner is not waiting stays pending until the next
/// wait.
#[derive(Debug, Clone, Default)]
pub struct Interrupt {
    pending: Arc<AtomicBool>,
}

impl Interrupt {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raise(&self) {
        self.pending.store(true, Ordering::Release);
    }

    pub fn is_pending(&self) -> bool {
        self.pending.load(Ordering::Acquire)
    }

    /// Consumes a pending interrupt.
    pub fn take(&self) -> bool {
        self.pending.swap(false, Ordering::AcqRel)
    }

    /// Drops a pending interrupt without reporting it.
    pub fn clear(&self) {
        self.pending.store(false, Ordering::Release);
    }
}
