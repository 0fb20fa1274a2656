//! Outstanding-read cap.
//!
//! Each device allows at most `limit` characteristic reads in flight.  A
//! read requested at the cap is refused immediately and counted; nothing
//! queues behind the gate.

use core::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

#[derive(Debug)]
pub struct ReadGate {
    outstanding: AtomicUsize,
    limit: usize,
    refused: AtomicU64,
}

/// One admitted read.  The slot is released on drop.
#[derive(Debug)]
pub struct ReadPermit<'a> {
    gate: &'a ReadGate,
}

impl ReadGate {
    pub fn new(limit: usize) -> Self {
        Self {
            outstanding: AtomicUsize::new(0),
            limit,
            refused: AtomicU64::new(0),
        }
    }

    pub fn try_acquire(&self) -> Option<ReadPermit<'_>> {
        let admitted = self
            .outstanding
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < self.limit).then_some(n + 1)
            })
            .is_ok();
        if admitted {
            Some(ReadPermit { gate: self })
        } else {
            self.refused.fetch_add(1, Ordering::Relaxed);
            None
        }
    }

    pub fn outstanding(&self) -> usize {
        self.outstanding.load(Ordering::Acquire)
    }

    /// Reads refused at the cap since construction.
    pub fn refused(&self) -> u64 {
        self.refused.load(Ordering::Relaxed)
    }

    pub fn limit(&self) -> usize {
        self.limit
    }
}

impl Drop for ReadPermit<'_> {
    fn drop(&mut self) {
        self.gate.outstanding.fetch_sub(1, Ordering::AcqRel);
    }
}
