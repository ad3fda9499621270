//! # Output channel
//!
//! Destination of the solutions computed by the solver. Publishing is fire and forget.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::sync::{Mutex, MutexGuard, PoisonError};
use comms_if::slv::SolutionMsg;

// ------------------------------------------------------------------------------------------------
// TRAITS
// ------------------------------------------------------------------------------------------------

/// A consumer of solutions.
pub trait SolutionSink: Send + Sync {
    fn publish(&self, sol: &SolutionMsg);
}

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// A sink keeping every published solution in memory.
#[derive(Default)]
pub struct SolutionBuffer {
    sols: Mutex<Vec<SolutionMsg>>,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl SolutionBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remove and return all solutions published so far.
    pub fn take(&self) -> Vec<SolutionMsg> {
        std::mem::take(&mut *self.lock())
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn last(&self) -> Option<SolutionMsg> {
        self.lock().last().cloned()
    }

    fn lock(&self) -> MutexGuard<Vec<SolutionMsg>> {
        self.sols.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl SolutionSink for SolutionBuffer {
    fn publish(&self, sol: &SolutionMsg) {
        self.lock().push(sol.clone());
    }
}
