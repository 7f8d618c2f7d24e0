//! Identity of the test that is currently running.
//!
//! Handlers capture the active test when they start. A timeout that fires after
//! the active test changed belongs to a test that already finished.

use crate::sync::lock;
use std::fmt;
use std::sync::Mutex;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TestId(pub String);

impl fmt::Display for TestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TestId {
    fn from(id: &str) -> Self {
        TestId(id.to_owned())
    }
}

/// Marker for the test attempt that was running when a handler started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TestGeneration(u64);

#[derive(Debug, Default)]
struct Running {
    generation: u64,
    test: Option<TestId>,
}

/// The running test. Every `set` starts a new attempt, even for the same id.
#[derive(Debug, Default)]
pub struct ActiveTest {
    running: Mutex<Running>,
}

impl ActiveTest {
    pub fn set(&self, test: Option<TestId>) {
        let mut running = lock(&self.running);
        running.generation += 1;
        running.test = test;
    }

    pub fn current(&self) -> Option<TestId> {
        lock(&self.running).test.clone()
    }

    pub fn capture(&self) -> TestGeneration {
        TestGeneration(lock(&self.running).generation)
    }

    /// Whether the attempt `captured` belongs to is still running.
    pub fn is_current(&self, captured: TestGeneration) -> bool {
        lock(&self.running).generation == captured.0
    }
}
