use crate::cancel::{CancelToken, Cancelled, WAIT_SLICE};
use parking_lot::{Condvar, Mutex};

/// One-shot start barrier: releases once `parties` workers have arrived.
///
/// Waiting is cancellable, so a worker that fails before arriving cannot
/// strand the others.
#[derive(Debug)]
pub struct StartBarrier {
    parties: usize,
    arrived: Mutex<usize>,
    released: Condvar,
}

impl StartBarrier {
    pub fn new(parties: usize) -> Self {
        Self {
            parties,
            arrived: Mutex::new(0),
            released: Condvar::new(),
        }
    }

    pub fn parties(&self) -> usize {
        self.parties
    }

    /// Arrive and block until everyone has arrived or the run is cancelled
    pub fn arrive_and_wait(&self, cancel: &CancelToken) -> Result<(), Cancelled> {
        let mut arrived = self.arrived.lock();
        *arrived += 1;
        if *arrived >= self.parties {
            self.released.notify_all();
            return Ok(());
        }
        while *arrived < self.parties {
            cancel.check()?;
            self.released.wait_for(&mut arrived, WAIT_SLICE);
        }
        Ok(())
    }
}
