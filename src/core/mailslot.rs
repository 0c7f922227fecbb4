//! A single mail slot: FIFO of whole messages under a byte budget.
//!
//! # Example
//!
//! ```
//! use mailslot::core::{Mailslot, MailslotConfig};
//!
//! let slot = Mailslot::new(0, MailslotConfig::with_capacity(20, 10))?;
//! slot.write(b"hello")?;
//! assert_eq!(slot.free_space(), 15);
//!
//! let mut buf = [0u8; 10];
//! let n = slot.read(&mut buf)?;
//! assert_eq!(&buf[..n], b"hello");
//! # Ok::<(), mailslot::core::Error>(())
//! ```

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use log::{debug, warn};

use crate::core::config::MailslotConfig;
use crate::core::interrupt::Interrupt;
use crate::core::queue::{Message, MessageQueue};
use crate::core::sync::SlotSync;
use crate::core::{Error, Result};

/// Point-in-time view of a slot for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotStats {
    pub minor: u32,
    pub pending_count: usize,
    pub storage_size: usize,
    pub free_space: usize,
    pub max_storage: usize,
    pub max_data_unit_size: usize,
    pub blocking_write: bool,
    pub blocking_read: bool,
    pub session_count: usize,
}

#[derive(Debug)]
pub struct Mailslot {
    minor: u32,
    max_storage: usize,
    max_data_unit_size_ceiling: usize,
    max_data_unit_size: AtomicUsize,
    blocking_write: AtomicBool,
    blocking_read: AtomicBool,
    /// Copy of the queue's storage size, stored under `L` after each mutation.
    storage_size: AtomicUsize,
    sessions: AtomicUsize,
    sync: SlotSync,
}

impl Mailslot {
    pub fn new(minor: u32, config: MailslotConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            minor,
            max_storage: config.max_storage,
            max_data_unit_size_ceiling: config.max_data_unit_size_ceiling,
            max_data_unit_size: AtomicUsize::new(config.max_data_unit_size),
            blocking_write: AtomicBool::new(config.blocking_write),
            blocking_read: AtomicBool::new(config.blocking_read),
            storage_size: AtomicUsize::new(0),
            sessions: AtomicUsize::new(0),
            sync: SlotSync::new(),
        })
    }

    pub fn minor(&self) -> u32 {
        self.minor
    }

    /// Enqueues `payload` as one message. Uninterruptible.
    pub fn write(&self, payload: &[u8]) -> Result<usize> {
        self.write_interruptible(payload, None)
    }

    /// Enqueues `payload` as one message, or nothing at all.
    ///
    /// # Errors
    ///
    /// - `Error::MessageTooLarge`: empty payload or longer than `max_data_unit_size`
    /// - `Error::WouldBlock`: non-blocking mode and the lock is contended or space is short
    /// - `Error::Interrupted`: `interrupt` fired while waiting for space
    pub fn write_interruptible(
        &self,
        payload: &[u8],
        interrupt: Option<&Interrupt>,
    ) -> Result<usize> {
        let len = payload.len();
        let max = self.max_data_unit_size();
        let blocking = self.blocking_write();
        debug!(
            "mailslot {}: write of {} bytes, blocking={}, free space={}",
            self.minor,
            len,
            blocking,
            self.free_space()
        );
        if len == 0 || len > max {
            warn!(
                "mailslot {}: rejected write of {} bytes, max data unit size is {}",
                self.minor, len, max
            );
            return Err(Error::MessageTooLarge { len, max });
        }

        // Copy the payload before taking the lock.
        let message = Message::new(payload.to_vec());

        let queue = self.sync.lock(blocking)?;
        let mut queue = self.sync.wait_for_space(
            queue,
            len,
            self.max_storage,
            || self.blocking_write(),
            interrupt,
        )?;
        queue.enqueue(message);
        self.publish(&queue);
        self.sync.signal_readable();
        debug!(
            "mailslot {}: stored {} bytes, {} messages pending",
            self.minor,
            len,
            queue.pending_count()
        );
        drop(queue);
        Ok(len)
    }

    /// Dequeues the head message into `buf`. Uninterruptible.
    pub fn read(&self, buf: &mut [u8]) -> Result<usize> {
        self.read_interruptible(buf, None)
    }

    /// Dequeues the head message into `buf` and returns its length.
    ///
    /// # Errors
    ///
    /// - `Error::BufferTooSmall`: the head message is longer than `buf`; it stays queued
    /// - `Error::WouldBlock`: non-blocking mode and no message or the lock is contended
    /// - `Error::Interrupted`: `interrupt` fired while waiting for a message
    pub fn read_interruptible(
        &self,
        buf: &mut [u8],
        interrupt: Option<&Interrupt>,
    ) -> Result<usize> {
        let message = self.take(buf.len(), interrupt)?;
        let len = message.len();
        // Outside the critical section.
        buf[..len].copy_from_slice(message.payload());
        Ok(len)
    }

    /// Dequeues the head message as an owned buffer if it fits in `capacity`.
    pub fn recv(&self, capacity: usize) -> Result<Vec<u8>> {
        self.recv_interruptible(capacity, None)
    }

    pub fn recv_interruptible(
        &self,
        capacity: usize,
        interrupt: Option<&Interrupt>,
    ) -> Result<Vec<u8>> {
        self.take(capacity, interrupt).map(Message::into_payload)
    }

    fn take(&self, capacity: usize, interrupt: Option<&Interrupt>) -> Result<Message> {
        let blocking = self.blocking_read();
        debug!(
            "mailslot {}: read into {} bytes, blocking={}",
            self.minor, capacity, blocking
        );

        let queue = self.sync.lock(blocking)?;
        let (mut queue, head_len) =
            self.sync
                .wait_for_message(queue, || self.blocking_read(), interrupt)?;

        if capacity < head_len {
            drop(queue);
            // Hand the claim on this message to the next waiting reader.
            self.sync.signal_readable();
            warn!(
                "mailslot {}: read buffer of {} bytes cannot hold {}-byte message",
                self.minor, capacity, head_len
            );
            return Err(Error::BufferTooSmall {
                required: head_len,
                available: capacity,
            });
        }

        let message = queue.dequeue().ok_or(Error::WouldBlock)?;
        self.publish(&queue);
        debug!(
            "mailslot {}: read {} bytes, {} messages remain",
            self.minor,
            head_len,
            queue.pending_count()
        );
        drop(queue);
        self.sync.broadcast_writable();
        Ok(message)
    }

    /// Raises `interrupt` and wakes every waiter so its owner observes it.
    pub fn interrupt(&self, interrupt: &Interrupt) {
        interrupt.raise();
        self.sync.wake_all();
    }

    pub fn set_blocking_write(&self, blocking: bool) {
        self.blocking_write.store(blocking, Ordering::Release);
        if !blocking {
            self.sync.wake_writers();
        }
    }

    pub fn set_blocking_read(&self, blocking: bool) {
        self.blocking_read.store(blocking, Ordering::Release);
        if !blocking {
            self.sync.wake_readers();
        }
    }

    /// Applies to messages written from now on; queued messages keep their length.
    pub fn set_max_data_unit_size(&self, size: usize) -> Result<()> {
        if size == 0 || size > self.max_data_unit_size_ceiling {
            warn!(
                "mailslot {}: max data unit size {} outside 1..={}",
                self.minor, size, self.max_data_unit_size_ceiling
            );
            return Err(Error::InvalidArgument("max data unit size out of range"));
        }
        self.max_data_unit_size.store(size, Ordering::Release);
        Ok(())
    }

    pub fn max_data_unit_size(&self) -> usize {
        self.max_data_unit_size.load(Ordering::Acquire)
    }

    pub fn max_data_unit_size_ceiling(&self) -> usize {
        self.max_data_unit_size_ceiling
    }

    pub fn max_storage(&self) -> usize {
        self.max_storage
    }

    /// Unsynchronized snapshot; concurrent writers may consume it immediately.
    pub fn free_space(&self) -> usize {
        self.max_storage
            .saturating_sub(self.storage_size.load(Ordering::Acquire))
    }

    pub fn blocking_write(&self) -> bool {
        self.blocking_write.load(Ordering::Acquire)
    }

    pub fn blocking_read(&self) -> bool {
        self.blocking_read.load(Ordering::Acquire)
    }

    pub fn session_count(&self) -> usize {
        self.sessions.load(Ordering::Acquire)
    }

    pub(crate) fn open_session(&self) -> usize {
        self.sessions.fetch_add(1, Ordering::AcqRel) + 1
    }

    pub(crate) fn close_session(&self) -> usize {
        self.sessions.fetch_sub(1, Ordering::AcqRel).saturating_sub(1)
    }

    pub fn stats(&self) -> SlotStats {
        let (pending_count, storage_size) = {
            let queue = self.sync.lock_blocking();
            (queue.pending_count(), queue.storage_size())
        };
        SlotStats {
            minor: self.minor,
            pending_count,
            storage_size,
            free_space: self.max_storage.saturating_sub(storage_size),
            max_storage: self.max_storage,
            max_data_unit_size: self.max_data_unit_size(),
            blocking_write: self.blocking_write(),
            blocking_read: self.blocking_read(),
            session_count: self.session_count(),
        }
    }

    /// Discards every queued message, returning `(messages, bytes)`.
    pub fn drain(&self) -> (usize, usize) {
        let drained = {
            let mut queue = self.sync.lock_blocking();
            let drained = queue.drain();
            self.publish(&queue);
            drained
        };
        self.sync.broadcast_writable();
        drained
    }

    fn publish(&self, queue: &MessageQueue) {
        self.storage_size
            .store(queue.storage_size(), Ordering::Release);
    }
}
