//! Shared pool of caller-side relay ports.
//!
//! Each child checks out two ports for its stdout and stderr listeners and
//! returns them on close. The pool is the only state shared across
//! adapters; it is always passed in explicitly so tests can substitute a
//! fresh pool per case.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::Notify;

/// A FIFO pool of TCP ports with blocking dequeue and non-blocking enqueue.
#[derive(Debug)]
pub struct PortPool {
    ports: Mutex<VecDeque<u16>>,
    available: Notify,
}

impl PortPool {
    /// Creates a pool seeded with the given ports.
    pub fn new(ports: impl IntoIterator<Item = u16>) -> Self {
        Self {
            ports: Mutex::new(ports.into_iter().collect()),
            available: Notify::new(),
        }
    }

    /// Takes a port from the pool, waiting until one is available.
    pub async fn acquire(&self) -> u16 {
        loop {
            {
                let mut ports = self.guard();
                if let Some(port) = ports.pop_front() {
                    // Pass the baton: a Notify stores at most one permit, so
                    // back-to-back releases can under-notify. Re-notifying
                    // while ports remain keeps every waiter progressing.
                    if !ports.is_empty() {
                        self.available.notify_one();
                    }
                    return port;
                }
            }
            self.available.notified().await;
        }
    }

    /// Returns a port to the pool and wakes one waiter.
    pub fn release(&self, port: u16) {
        self.guard().push_back(port);
        self.available.notify_one();
    }

    /// Number of ports currently available.
    pub fn available_count(&self) -> usize {
        self.guard().len()
    }

    // A poisoned queue is still a queue; the pool must keep serving during
    // teardown paths that swallow errors.
    fn guard(&self) -> MutexGuard<'_, VecDeque<u16>> {
        self.ports.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
