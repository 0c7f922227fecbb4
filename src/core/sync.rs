//! Lock and wait/wake protocol of a slot.
//!
//! ```text
//!   writer                                   reader
//!   ──────                                   ──────
//!   lock L (try_lock when non-blocking)      lock L (try_lock when non-blocking)
//!   while free < len: wait W                 while queue empty: wait R
//!   enqueue, signal R                        dequeue, broadcast W
//!   unlock L                                 unlock L, copy out
//! ```
//!
//! `L` is the mutex around the [`MessageQueue`]. `R` ("message available") is
//! a condvar whose count is the queue's pending count, so claiming a message
//! and taking the lock are one step. A separate counting claim that a
//! non-blocking reader spends before losing the `try_lock` race is never
//! returned, leaving a queued message no reader can claim; see
//! `claim_then_try_lock_strands_a_message` below.
//!
//! `W` ("space freed") is broadcast on every dequeue because several writers
//! may fit into the freed space, and each re-checks its own requirement
//! after waking.
//!
//! Waits re-read the caller's blocking flag and interrupt token on every
//! wake, so a mode switch or an interrupt reaches callers that are already
//! suspended. No critical section suspends, so the wait for `L` itself is
//! bounded.

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError, TryLockError};

use crate::core::interrupt::Interrupt;
use crate::core::queue::MessageQueue;
use crate::core::{Error, Result};

pub type QueueGuard<'a> = MutexGuard<'a, MessageQueue>;

#[derive(Debug, Default)]
pub struct SlotSync {
    queue: Mutex<MessageQueue>,
    /// R: a message may be claimable.
    readable: Condvar,
    /// W: free space may have grown.
    writable: Condvar,
}

impl SlotSync {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquires `L`. Non-blocking callers fail with `WouldBlock` on contention.
    ///
    /// Queue mutations are single steps, so a poisoned lock still guards a
    /// consistent queue and is recovered rather than reported.
    pub fn lock(&self, blocking: bool) -> Result<QueueGuard<'_>> {
        if blocking {
            return Ok(self.lock_blocking());
        }
        match self.queue.try_lock() {
            Ok(guard) => Ok(guard),
            Err(TryLockError::Poisoned(poisoned)) => Ok(poisoned.into_inner()),
            Err(TryLockError::WouldBlock) => Err(Error::WouldBlock),
        }
    }

    /// Acquires `L`, waiting as long as it is held.
    pub fn lock_blocking(&self) -> QueueGuard<'_> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Holds `L` until `required` bytes fit within `capacity`.
    ///
    /// On error the guard is released and the queue is untouched.
    pub fn wait_for_space<'a>(
        &'a self,
        mut guard: QueueGuard<'a>,
        required: usize,
        capacity: usize,
        blocking: impl Fn() -> bool,
        interrupt: Option<&Interrupt>,
    ) -> Result<QueueGuard<'a>> {
        loop {
            if capacity.saturating_sub(guard.storage_size()) >= required {
                return Ok(guard);
            }
            if !blocking() {
                return Err(Error::WouldBlock);
            }
            if interrupt.is_some_and(Interrupt::take) {
                return Err(Error::Interrupted);
            }
            guard = self
                .writable
                .wait(guard)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Holds `L` until the queue has a head message; returns its length.
    pub fn wait_for_message<'a>(
        &'a self,
        mut guard: QueueGuard<'a>,
        blocking: impl Fn() -> bool,
        interrupt: Option<&Interrupt>,
    ) -> Result<(QueueGuard<'a>, usize)> {
        loop {
            if let Some(head_len) = guard.peek_len() {
                return Ok((guard, head_len));
            }
            if !blocking() {
                return Err(Error::WouldBlock);
            }
            if interrupt.is_some_and(Interrupt::take) {
                return Err(Error::Interrupted);
            }
            guard = self
                .readable
                .wait(guard)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Signals R: one more message can be claimed.
    pub fn signal_readable(&self) {
        self.readable.notify_one();
    }

    /// Broadcasts W: space was freed.
    pub fn broadcast_writable(&self) {
        self.writable.notify_all();
    }

    /// Wakes every reader so each re-checks its mode and interrupt token.
    pub fn wake_readers(&self) {
        // Taking L orders the wake after any waiter's last check.
        let _guard = self.lock_blocking();
        self.readable.notify_all();
    }

    /// Wakes every writer so each re-checks its mode and interrupt token.
    pub fn wake_writers(&self) {
        let _guard = self.lock_blocking();
        self.writable.notify_all();
    }

    pub fn wake_all(&self) {
        let _guard = self.lock_blocking();
        self.readable.notify_all();
        self.writable.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::mpsc;
    use std::sync::{Arc, Condvar, Mutex, TryLockError};
    use std::thread;
    use std::time::Duration;

    use super::SlotSync;
    use crate::core::interrupt::Interrupt;
    use crate::core::queue::{Message, MessageQueue};
    use crate::core::Error;

    /// Counting "message available" signal: posted once per enqueue,
    /// spent once per claim, never refunded.
    #[derive(Default)]
    struct ClaimCount {
        count: Mutex<usize>,
        posted: Condvar,
    }

    impl ClaimCount {
        fn post(&self) {
            *self.count.lock().expect("count") += 1;
            self.posted.notify_one();
        }

        fn try_claim(&self) -> bool {
            let mut count = self.count.lock().expect("count");
            if *count == 0 {
                return false;
            }
            *count -= 1;
            true
        }

        fn claim_timeout(&self, timeout: Duration) -> bool {
            let count = self.count.lock().expect("count");
            let (mut count, _) = self
                .posted
                .wait_timeout_while(count, timeout, |count| *count == 0)
                .expect("count");
            if *count == 0 {
                return false;
            }
            *count -= 1;
            true
        }
    }

    #[test]
    fn claim_then_try_lock_strands_a_message() {
        let queue = Mutex::new(MessageQueue::new());
        let claims = ClaimCount::default();
        queue
            .lock()
            .expect("lock")
            .enqueue(Message::new(b"stranded".to_vec()));
        claims.post();

        {
            // A writer holds L while a non-blocking reader claims then tries L.
            let _held = queue.lock().expect("lock");
            assert!(claims.try_claim());
            assert!(matches!(queue.try_lock(), Err(TryLockError::WouldBlock)));
        }

        assert_eq!(queue.lock().expect("lock").pending_count(), 1);
        for _ in 0..3 {
            assert!(!claims.try_claim());
            assert!(!claims.claim_timeout(Duration::from_millis(50)));
        }
        assert_eq!(queue.lock().expect("lock").pending_count(), 1);
    }

    #[test]
    fn contended_non_blocking_read_leaves_message_claimable() {
        let sync = SlotSync::new();
        sync.lock_blocking().enqueue(Message::new(b"kept".to_vec()));
        sync.signal_readable();

        {
            let _held = sync.lock_blocking();
            assert!(matches!(sync.lock(false), Err(Error::WouldBlock)));
        }

        let guard = sync.lock_blocking();
        let (mut guard, len) = sync
            .wait_for_message(guard, || true, None)
            .expect("message still claimable");
        assert_eq!(len, 4);
        assert_eq!(guard.dequeue().expect("head").payload(), b"kept");
    }

    #[test]
    fn non_blocking_lock_fails_on_contention() {
        let sync = SlotSync::new();
        let held = sync.lock(true).expect("lock");
        assert!(matches!(sync.lock(false), Err(Error::WouldBlock)));
        drop(held);
        assert!(sync.lock(false).is_ok());
    }

    #[test]
    fn empty_queue_without_blocking_fails_fast() {
        let sync = SlotSync::new();
        let guard = sync.lock(false).expect("lock");
        let res = sync.wait_for_message(guard, || false, None);
        assert!(matches!(res, Err(Error::WouldBlock)));
    }

    #[test]
    fn pending_interrupt_fails_a_wait_that_must_suspend() {
        let sync = SlotSync::new();
        let interrupt = Interrupt::new();
        interrupt.raise();
        let guard = sync.lock(true).expect("lock");
        let res = sync.wait_for_message(guard, || true, Some(&interrupt));
        assert!(matches!(res, Err(Error::Interrupted)));
        assert!(!interrupt.is_pending());
    }

    #[test]
    fn pending_interrupt_is_kept_when_no_wait_is_needed() {
        let sync = SlotSync::new();
        let interrupt = Interrupt::new();
        interrupt.raise();
        let guard = sync.lock(true).expect("lock");
        let guard = sync
            .wait_for_space(guard, 4, 8, || true, Some(&interrupt))
            .expect("space available");
        drop(guard);
        assert!(interrupt.is_pending());
    }

    #[test]
    fn reader_wakes_on_signal() {
        let sync = Arc::new(SlotSync::new());
        let (done_tx, done_rx) = mpsc::channel();

        let reader_sync = Arc::clone(&sync);
        let handle = thread::spawn(move || {
            let guard = reader_sync.lock(true).expect("lock");
            let (_guard, len) = reader_sync
                .wait_for_message(guard, || true, None)
                .expect("message");
            let _ = done_tx.send(len);
        });

        assert!(done_rx.recv_timeout(Duration::from_millis(50)).is_err());
        {
            let mut guard = sync.lock(true).expect("lock");
            guard.enqueue(Message::new(b"ping".to_vec()));
            sync.signal_readable();
        }
        assert_eq!(done_rx.recv_timeout(Duration::from_secs(1)).expect("woken"), 4);
        handle.join().expect("reader thread");
    }

    #[test]
    fn mode_switch_releases_waiting_writer() {
        let sync = Arc::new(SlotSync::new());
        let blocking = Arc::new(AtomicBool::new(true));
        {
            let mut guard = sync.lock(true).expect("lock");
            guard.enqueue(Message::new(vec![0; 8]));
        }

        let (done_tx, done_rx) = mpsc::channel();
        let writer_sync = Arc::clone(&sync);
        let writer_blocking = Arc::clone(&blocking);
        let handle = thread::spawn(move || {
            let guard = writer_sync.lock(true).expect("lock");
            let res = writer_sync
                .wait_for_space(guard, 1, 8, || writer_blocking.load(Ordering::Acquire), None)
                .map(|_| ());
            let _ = done_tx.send(res);
        });

        assert!(done_rx.recv_timeout(Duration::from_millis(50)).is_err());
        blocking.store(false, Ordering::Release);
        sync.wake_writers();
        let res = done_rx.recv_timeout(Duration::from_secs(1)).expect("woken");
        assert!(matches!(res, Err(Error::WouldBlock)));
        handle.join().expect("writer thread");
    }
}
