//! Per-process lifecycle state machine.
//!
//! `Running → Terminating → Terminated`, with `Running → Terminated` on a
//! natural exit. The exit protocol is claimed through a single guarded
//! transition so timeout, cancel, and natural exit can never run it twice.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::models::process::{Escalation, EscalationStep, ProcessState};

/// Shared lifecycle state for one supervised process.
#[derive(Debug)]
pub struct Lifecycle {
    state: Mutex<ProcessState>,
    exit_claimed: AtomicBool,
    escalation: Mutex<Vec<Escalation>>,
}

impl Lifecycle {
    /// A lifecycle in the `Running` state.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(ProcessState::Running),
            exit_claimed: AtomicBool::new(false),
            escalation: Mutex::new(Vec::new()),
        }
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> ProcessState {
        *lock(&self.state)
    }

    /// Move `Running → Terminating`. Returns `false` if termination was
    /// already requested or the process has terminated.
    #[must_use]
    pub fn begin_termination(&self) -> bool {
        let mut state = lock(&self.state);
        if *state == ProcessState::Running {
            *state = ProcessState::Terminating;
            true
        } else {
            false
        }
    }

    /// Claim the exit protocol. Returns `true` exactly once.
    #[must_use]
    pub fn claim_exit(&self) -> bool {
        !self.exit_claimed.swap(true, Ordering::AcqRel)
    }

    /// Enter the terminal state.
    pub fn mark_terminated(&self) {
        *lock(&self.state) = ProcessState::Terminated;
    }

    /// Record a signal sent to the process.
    pub fn record_escalation(&self, step: EscalationStep, elapsed_ms: u64) {
        lock(&self.escalation).push(Escalation { step, elapsed_ms });
    }

    /// Signals sent so far, in order.
    #[must_use]
    pub fn escalation(&self) -> Vec<Escalation> {
        lock(&self.escalation).clone()
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
