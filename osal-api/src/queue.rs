//! Bounded message queue contract

use alloc::boxed::Box;
use core::fmt;

use crate::core::types::Timeout;
use crate::error::Result;

/// Backend queue contract
///
/// Items are fixed-size binary blobs copied by value. The Nth successful
/// `receive` yields the item of the Nth successful `send`, across every
/// sender and receiver.
pub trait RawQueue: Send + Sync {
    /// Copies `item` into the tail slot, blocking per `timeout` while full
    fn send(&self, item: &[u8], timeout: Timeout) -> Result<()>;

    /// Copies the head item into `item`, blocking per `timeout` while empty
    fn receive(&self, item: &mut [u8], timeout: Timeout) -> Result<()>;

    /// Returns the number of queued items
    fn len(&self) -> usize;

    /// Returns the maximum number of items
    fn capacity(&self) -> usize;

    /// Returns the size of one item in bytes
    fn item_size(&self) -> usize;
}

/// Queue handle
pub struct Queue {
    raw: Box<dyn RawQueue>,
}

impl Queue {
    /// Wraps a backend queue
    pub fn from_raw(raw: Box<dyn RawQueue>) -> Self {
        Self { raw }
    }

    /// Sends one item; `item.len()` must equal [`Queue::item_size`]
    pub fn send(&self, item: &[u8], timeout: impl Into<Timeout>) -> Result<()> {
        self.raw.send(item, timeout.into())
    }

    /// Receives one item into the first [`Queue::item_size`] bytes of `item`
    pub fn receive(&self, item: &mut [u8], timeout: impl Into<Timeout>) -> Result<()> {
        self.raw.receive(item, timeout.into())
    }

    /// Returns the current occupancy
    pub fn len(&self) -> usize {
        self.raw.len()
    }

    /// Returns true if no item is queued
    pub fn is_empty(&self) -> bool {
        self.raw.len() == 0
    }

    /// Returns true if the queue is at capacity
    pub fn is_full(&self) -> bool {
        self.raw.len() >= self.raw.capacity()
    }

    /// Returns the capacity in items
    pub fn capacity(&self) -> usize {
        self.raw.capacity()
    }

    /// Returns the item size in bytes
    pub fn item_size(&self) -> usize {
        self.raw.item_size()
    }

    /// Destroys the queue, dropping any queued items
    pub fn destroy(self) {}
}

impl fmt::Debug for Queue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Queue")
            .field("item_size", &self.raw.item_size())
            .field("capacity", &self.raw.capacity())
            .field("len", &self.raw.len())
            .finish()
    }
}

static_assertions::assert_impl_all!(Queue: Send, Sync);
