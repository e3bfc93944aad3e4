// ABOUTME: Counting admission gate that caps how many drain cycles run at once
// ABOUTME: Shutdown closes the gate, releasing every blocked and future caller without a slot

use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Semaphore;

/// Bounded admission for dispatch workers.
///
/// A slot taken by [`wait_and_increment`](Self::wait_and_increment) stays
/// taken until [`decrement`](Self::decrement) is called, independent of any
/// guard value, because the slot is released by a different task than the one
/// that reserved it.
#[derive(Debug)]
pub struct ConcurrencyGate {
    slots: Semaphore,
    active: AtomicUsize,
    capacity: usize,
}

impl ConcurrencyGate {
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: Semaphore::new(capacity),
            active: AtomicUsize::new(0),
            capacity,
        }
    }

    /// Wait for a free slot and reserve it.
    ///
    /// Returns `false` without reserving anything once the gate has been told
    /// to stop admitting, including for callers already waiting.
    pub async fn wait_and_increment(&self) -> bool {
        match self.slots.acquire().await {
            Ok(permit) => {
                permit.forget();
                self.active.fetch_add(1, Ordering::SeqCst);
                true
            }
            Err(_) => false,
        }
    }

    /// Release one reserved slot. Extra releases are ignored.
    pub fn decrement(&self) {
        let released = self
            .active
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if released {
            self.slots.add_permits(1);
        }
    }

    /// Stop admitting permanently and wake every waiter.
    pub fn dont_wait_any_more(&self) {
        self.slots.close();
    }

    pub fn is_closed(&self) -> bool {
        self.slots.is_closed()
    }

    /// Slots currently reserved.
    pub fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
