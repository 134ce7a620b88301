//! ICE candidate queue-and-flush.
//!
//! A candidate may arrive before the peer connection exists or before its
//! remote description is set; the underlying stack rejects it in either
//! case. Such candidates wait here and are released, in arrival order and
//! exactly once, when [`CandidateQueue::mark_ready`] is called right after
//! the remote description is applied.

use std::collections::VecDeque;

use multiplay_core::IceCandidate;

#[derive(Debug, Default)]
pub struct CandidateQueue {
    pending: VecDeque<IceCandidate>,
    ready: bool,
}

impl CandidateQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the candidate back if it can be applied now, or queues it.
    pub fn offer(&mut self, candidate: IceCandidate) -> Option<IceCandidate> {
        if self.ready {
            Some(candidate)
        } else {
            self.pending.push_back(candidate);
            None
        }
    }

    /// Marks the remote description as set and drains the backlog.
    pub fn mark_ready(&mut self) -> Vec<IceCandidate> {
        self.ready = true;
        self.pending.drain(..).collect()
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Forgets everything. Used on teardown.
    pub fn reset(&mut self) {
        self.pending.clear();
        self.ready = false;
    }
}
