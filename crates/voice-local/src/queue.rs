//! Bounded hand-off between the capture thread and the assembler.
//!
//! The producer never blocks: when the queue is full the oldest unconsumed
//! segment is dropped so capture stays real-time.

use crate::AudioSegment;
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

struct QueueState {
    items: VecDeque<AudioSegment>,
    dropped: u64,
    closed: bool,
}

#[derive(Clone)]
pub struct SegmentQueue {
    capacity: usize,
    state: Arc<Mutex<QueueState>>,
    available: Arc<Condvar>,
}

impl SegmentQueue {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            state: Arc::new(Mutex::new(QueueState {
                items: VecDeque::with_capacity(capacity),
                dropped: 0,
                closed: false,
            })),
            available: Arc::new(Condvar::new()),
        }
    }

    /// Enqueue a segment. Returns `false` if the queue was already closed.
    pub fn push(&self, segment: AudioSegment) -> bool {
        let mut state = self.state.lock();
        if state.closed {
            return false;
        }
        state.items.push_back(segment);
        while state.items.len() > self.capacity {
            state.items.pop_front();
            state.dropped += 1;
            tracing::debug!(dropped = state.dropped, "segment queue full, dropped oldest");
        }
        drop(state);
        self.available.notify_one();
        true
    }

    /// Wait up to `timeout` for the next segment.
    pub fn pop_timeout(&self, timeout: Duration) -> Option<AudioSegment> {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        while state.items.is_empty() && !state.closed {
            if self.available.wait_until(&mut state, deadline).timed_out() {
                break;
            }
        }
        state.items.pop_front()
    }

    pub fn try_pop(&self) -> Option<AudioSegment> {
        self.state.lock().items.pop_front()
    }

    pub fn close(&self) {
        self.state.lock().closed = true;
        self.available.notify_all();
    }

    /// Closed and fully drained.
    pub fn is_finished(&self) -> bool {
        let state = self.state.lock();
        state.closed && state.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.state.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn dropped(&self) -> u64 {
        self.state.lock().dropped
    }
}
