//! Host bounded queue
//!
//! Items live back to back in one byte ring of `capacity * item_size` bytes.

use std::sync::{Condvar, Mutex};

use osal_api::error::invalid_argument;
use osal_api::{Error, RawQueue, Result, Timeout};

use crate::wait::{lock, wait_while};

#[derive(Debug)]
struct Ring {
    slots: Vec<u8>,
    /// Slot index of the oldest item
    head: usize,
    /// Number of queued items
    len: usize,
}

/// Fixed-item-size FIFO with blocking send and receive
#[derive(Debug)]
pub struct HostQueue {
    item_size: usize,
    capacity: usize,
    ring: Mutex<Ring>,
    not_empty: Condvar,
    not_full: Condvar,
}

impl HostQueue {
    /// Creates an empty queue
    pub fn new(item_size: usize, capacity: usize) -> Result<Self> {
        if item_size == 0 {
            return Err(invalid_argument("queue item_size must be non-zero"));
        }
        if capacity == 0 {
            return Err(invalid_argument("queue capacity must be non-zero"));
        }
        let bytes = item_size
            .checked_mul(capacity)
            .ok_or_else(|| invalid_argument("queue size overflows"))?;

        let mut slots = Vec::new();
        slots.try_reserve_exact(bytes).map_err(|_| Error::OutOfMemory)?;
        slots.resize(bytes, 0);

        Ok(Self {
            item_size,
            capacity,
            ring: Mutex::new(Ring { slots, head: 0, len: 0 }),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
        })
    }

    fn slot(&self, index: usize) -> core::ops::Range<usize> {
        let start = index * self.item_size;
        start..start + self.item_size
    }
}

impl RawQueue for HostQueue {
    fn send(&self, item: &[u8], timeout: Timeout) -> Result<()> {
        if item.len() != self.item_size {
            return Err(invalid_argument("item length differs from queue item_size"));
        }

        let capacity = self.capacity;
        let mut ring = wait_while(&self.not_full, lock(&self.ring), timeout, |r| r.len == capacity)?;
        let tail = (ring.head + ring.len) % capacity;
        let range = self.slot(tail);
        ring.slots[range].copy_from_slice(item);
        ring.len += 1;
        drop(ring);

        self.not_empty.notify_one();
        Ok(())
    }

    fn receive(&self, item: &mut [u8], timeout: Timeout) -> Result<()> {
        if item.len() < self.item_size {
            return Err(invalid_argument("receive buffer shorter than queue item_size"));
        }

        let mut ring = wait_while(&self.not_empty, lock(&self.ring), timeout, |r| r.len == 0)?;
        let range = self.slot(ring.head);
        item[..self.item_size].copy_from_slice(&ring.slots[range]);
        ring.head = (ring.head + 1) % self.capacity;
        ring.len -= 1;
        drop(ring);

        self.not_full.notify_one();
        Ok(())
    }

    fn len(&self) -> usize {
        lock(&self.ring).len
    }

    fn capacity(&self) -> usize {
        self.capacity
    }

    fn item_size(&self) -> usize {
        self.item_size
    }
}
