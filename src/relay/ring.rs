//! Sampling ring buffer for Ref relationships.
//!
//! Keeps the most recent rows of a parent table and hands out uniformly
//! chosen entries without removing them.

use super::RelayError;
use crate::broker::{Delivery, Listener, Message};
use crate::cancel::{CancelToken, Cancelled, WAIT_SLICE};
use crate::row::Row;
use parking_lot::{Condvar, Mutex};
use rand::Rng;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Default number of parent rows retained for sampling
pub const DEFAULT_RING_CAPACITY: usize = 4096;

/// Default limit on waiting for a parent's first row
pub const DEFAULT_SAMPLE_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Default)]
struct RingState {
    /// Buffered rows, oldest first
    items: VecDeque<Arc<Row>>,
    /// Parent has sent its poison marker
    closed: bool,
    /// Total rows offered, including evicted ones
    seen: u64,
}

/// Bounded, non-destructive sampler over a parent table's rows
#[derive(Debug)]
pub struct SamplingRing {
    table: String,
    capacity: usize,
    /// Longest wait on an empty, open ring; `None` waits forever
    wait_limit: Option<Duration>,
    state: Mutex<RingState>,
    available: Condvar,
}

impl SamplingRing {
    pub fn new(table: &str, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            table: table.to_string(),
            capacity,
            wait_limit: None,
            state: Mutex::new(RingState {
                items: VecDeque::with_capacity(capacity.min(DEFAULT_RING_CAPACITY)),
                ..RingState::default()
            }),
            available: Condvar::new(),
        }
    }

    /// Give up sampling after waiting `limit` for a row to arrive
    pub fn with_wait_limit(mut self, limit: Option<Duration>) -> Self {
        self.wait_limit = limit;
        self
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Add a row, evicting the oldest one when full. Never blocks.
    pub fn offer(&self, row: Arc<Row>) {
        let mut state = self.state.lock();
        if state.items.len() == self.capacity {
            state.items.pop_front();
        }
        state.items.push_back(row);
        state.seen += 1;
        drop(state);
        self.available.notify_all();
    }

    /// Mark the parent as finished and wake any waiting samplers
    pub fn close(&self) {
        self.state.lock().closed = true;
        self.available.notify_all();
    }

    /// Pick a buffered row uniformly at random.
    ///
    /// Waits while the buffer is empty and the parent is still producing,
    /// failing with [`RelayError::ParentStalled`] once the wait limit passes.
    pub fn sample<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        cancel: &CancelToken,
    ) -> Result<Arc<Row>, RelayError> {
        let started = Instant::now();
        let mut state = self.state.lock();
        loop {
            cancel.check()?;
            if !state.items.is_empty() {
                let i = rng.random_range(0..state.items.len());
                return Ok(Arc::clone(&state.items[i]));
            }
            if state.closed {
                return Err(RelayError::ParentExhausted {
                    table: self.table.clone(),
                });
            }
            let slice = match self.wait_limit {
                Some(limit) => {
                    let waited = started.elapsed();
                    if waited >= limit {
                        return Err(RelayError::ParentStalled {
                            table: self.table.clone(),
                            waited,
                        });
                    }
                    WAIT_SLICE.min(limit - waited)
                }
                None => WAIT_SLICE,
            };
            self.available.wait_for(&mut state, slice);
        }
    }

    pub fn len(&self) -> usize {
        self.state.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total rows offered so far
    pub fn total_seen(&self) -> u64 {
        self.state.lock().seen
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }
}

impl Listener for SamplingRing {
    fn try_deliver(&self, message: &Message) -> Delivery {
        match message {
            Message::Row(row) => self.offer(Arc::clone(row)),
            Message::Poison => self.close(),
        }
        Delivery::Delivered
    }

    fn deliver(&self, message: &Message, _cancel: &CancelToken) -> Result<Delivery, Cancelled> {
        Ok(self.try_deliver(message))
    }
}
