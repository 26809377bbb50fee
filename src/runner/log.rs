use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::testing::TestResult;

/// Append-only sink shared by the workers of a run.
#[derive(Debug, Default)]
pub struct ResultLog {
    entries: Mutex<Vec<TestResult>>,
}

impl ResultLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, result: TestResult) {
        self.lock().push(result);
    }

    pub fn sequences(&self) -> HashSet<usize> {
        self.lock().iter().map(|result| result.sequence).collect()
    }

    /// Moves every recorded result out of the log.
    pub fn take(&self) -> Vec<TestResult> {
        std::mem::take(&mut *self.lock())
    }

    // A worker that panicked mid-push cannot leave a half-written entry, so a
    // poisoned lock still guards a consistent vector.
    fn lock(&self) -> MutexGuard<'_, Vec<TestResult>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
