use std::sync::atomic::{AtomicBool, Ordering};

/// One-shot guard for a continuation frame.
///
/// Shared by the handler-completion path and the timeout path; whichever
/// calls [`ContinuationLatch::try_fire`] first wins.
#[derive(Debug, Default)]
pub struct ContinuationLatch {
    fired: AtomicBool,
}

impl ContinuationLatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// `true` exactly once.
    pub fn try_fire(&self) -> bool {
        !self.fired.swap(true, Ordering::AcqRel)
    }

    pub fn has_fired(&self) -> bool {
        self.fired.load(Ordering::Acquire)
    }
}
