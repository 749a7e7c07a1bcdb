//! Pending ICE candidate buffering
//!
//! Trickle ICE lets candidates arrive before the remote description does.
//! Applying one early is a hard error in the underlying transport, so each
//! peer record buffers them here and flushes in arrival order once the
//! remote description lands.

use crate::signaling::IceCandidate;
use std::collections::VecDeque;

/// FIFO buffer of candidates that arrived too early
#[derive(Debug, Default)]
pub struct PendingCandidateQueue {
    queue: VecDeque<IceCandidate>,
}

impl PendingCandidateQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, candidate: IceCandidate) {
        self.queue.push_back(candidate);
    }

    /// Take all buffered candidates, preserving arrival order
    pub fn drain(&mut self) -> Vec<IceCandidate> {
        self.queue.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn clear(&mut self) {
        self.queue.clear();
    }
}
