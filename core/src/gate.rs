//! One-shot parse gate.
//!
//! Each command node owns a [`ParseGate`]. The first parse call runs the
//! guarded body and stores its outcome; every later call returns that stored
//! outcome without running anything, so a failed first parse keeps failing
//! instead of turning into a silent success.

use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::Serialize;

use crate::error::ArgError;
use crate::policy::ErrorPolicy;

/// Observable parse state of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ParseStatus {
    /// No parse entry point has completed on this node.
    Unparsed,
    /// The first parse succeeded.
    Parsed,
    /// The first parse failed; the failure is cached.
    Failed,
}

/// A parse failure together with the policy of the node that detected it.
#[derive(Debug, Clone)]
pub(crate) struct Failure {
    pub error: ArgError,
    pub policy: ErrorPolicy,
}

#[derive(Debug)]
enum GateState {
    Open,
    Running,
    Closed(Result<(), Failure>),
}

/// Runs a parse body at most once and caches its outcome.
#[derive(Debug)]
pub(crate) struct ParseGate {
    state: Mutex<GateState>,
}

impl Default for ParseGate {
    fn default() -> Self {
        Self {
            state: Mutex::new(GateState::Open),
        }
    }
}

/// Closes the gate with a failure if the body unwinds.
struct UnwindGuard<'a> {
    gate: &'a ParseGate,
    armed: bool,
}

impl Drop for UnwindGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            *self.gate.lock() = GateState::Closed(Err(Failure {
                error: ArgError::Misuse("parse aborted by a panic".to_string()),
                policy: ErrorPolicy::Continue,
            }));
        }
    }
}

impl ParseGate {
    fn lock(&self) -> MutexGuard<'_, GateState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Runs `body` if the gate is still open, otherwise returns the cached
    /// outcome. A call made while the body is running (re-entrant parse from
    /// a run callback, or a concurrent caller) is rejected as misuse.
    pub(crate) fn run<F>(&self, body: F) -> Result<(), Failure>
    where
        F: FnOnce() -> Result<(), Failure>,
    {
        {
            let mut state = self.lock();
            match &*state {
                GateState::Closed(outcome) => return outcome.clone(),
                GateState::Running => {
                    return Err(Failure {
                        error: ArgError::Misuse("parse is already in progress".to_string()),
                        policy: ErrorPolicy::Continue,
                    });
                }
                GateState::Open => *state = GateState::Running,
            }
        }

        let mut guard = UnwindGuard {
            gate: self,
            armed: true,
        };
        let outcome = body();
        guard.armed = false;
        *self.lock() = GateState::Closed(outcome.clone());
        outcome
    }

    /// Current status; a running parse reports [`ParseStatus::Unparsed`].
    pub fn status(&self) -> ParseStatus {
        match &*self.lock() {
            GateState::Open | GateState::Running => ParseStatus::Unparsed,
            GateState::Closed(Ok(())) => ParseStatus::Parsed,
            GateState::Closed(Err(_)) => ParseStatus::Failed,
        }
    }

    /// Returns `true` once any parse entry point has started.
    pub fn has_started(&self) -> bool {
        !matches!(&*self.lock(), GateState::Open)
    }

    /// The cached failure, if the first parse failed.
    pub fn error(&self) -> Option<ArgError> {
        match &*self.lock() {
            GateState::Closed(Err(failure)) => Some(failure.error.clone()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;

    fn failure(msg: &str) -> Failure {
        Failure {
            error: ArgError::UnknownFlag(msg.to_string()),
            policy: ErrorPolicy::Continue,
        }
    }

    #[test]
    fn test_body_runs_once() {
        let gate = ParseGate::default();
        let runs = Cell::new(0);

        assert_eq!(gate.status(), ParseStatus::Unparsed);
        assert!(gate.run(|| {
            runs.set(runs.get() + 1);
            Ok(())
        })
        .is_ok());
        assert!(gate.run(|| {
            runs.set(runs.get() + 1);
            Err(failure("late"))
        })
        .is_ok());

        assert_eq!(runs.get(), 1);
        assert_eq!(gate.status(), ParseStatus::Parsed);
    }

    #[test]
    fn test_failure_is_resurfaced() {
        let gate = ParseGate::default();
        assert!(gate.run(|| Err(failure("bogus"))).is_err());

        let second = gate.run(|| Ok(())).unwrap_err();
        assert!(matches!(second.error, ArgError::UnknownFlag(ref f) if f == "bogus"));
        assert_eq!(gate.status(), ParseStatus::Failed);
        assert!(gate.error().is_some());
    }

    #[test]
    fn test_reentry_is_rejected() {
        let gate = ParseGate::default();
        let inner = gate.run(|| {
            let nested = gate.run(|| Ok(()));
            assert!(matches!(
                nested,
                Err(Failure {
                    error: ArgError::Misuse(_),
                    ..
                })
            ));
            Ok(())
        });
        assert!(inner.is_ok());
    }

    #[test]
    fn test_panicking_body_closes_gate_with_failure() {
        let gate = ParseGate::default();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _ = gate.run(|| panic!("boom"));
        }));
        assert!(result.is_err());
        assert_eq!(gate.status(), ParseStatus::Failed);
        assert!(matches!(gate.error(), Some(ArgError::Misuse(_))));
    }
}
