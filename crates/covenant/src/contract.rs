//! # Contract Evaluation
//!
//! Contracts are pure predicates supplied by an actor. The evaluator runs them
//! under an input-size limit and a wall-clock budget, and treats a panic or an
//! overrun the same way as a `false` result: the transition is rejected and
//! the actor stays where it was.

use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::time::{Duration, Instant};

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};

use crate::actor::{Actor, HttpActor};
use crate::config::ContractConfig;

/// Which of an actor's contracts produced a verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ContractKind {
    State,
    Message,
    Http,
}

impl ContractKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContractKind::State => "state-contract",
            ContractKind::Message => "message-contract",
            ContractKind::Http => "http-contract",
        }
    }

    /// Short name used in rejection log lines.
    pub fn tag(&self) -> &'static str {
        match self {
            ContractKind::State => "state",
            ContractKind::Message => "message",
            ContractKind::Http => "http",
        }
    }
}

impl fmt::Display for ContractKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum RejectionReason {
    /// The predicate returned `false`.
    Rejected,
    InputTooLarge { size: usize, limit: usize },
    BudgetExceeded { elapsed_ms: u128, budget_ms: u128 },
    Panicked,
}

impl fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectionReason::Rejected => write!(f, "predicate returned false"),
            RejectionReason::InputTooLarge { size, limit } => {
                write!(f, "input of {} bytes exceeds limit of {} bytes", size, limit)
            }
            RejectionReason::BudgetExceeded {
                elapsed_ms,
                budget_ms,
            } => write!(f, "took {}ms, budget is {}ms", elapsed_ms, budget_ms),
            RejectionReason::Panicked => write!(f, "predicate panicked"),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[error("{kind} rejected: {reason}")]
pub struct ContractViolation {
    pub kind: ContractKind,
    pub reason: RejectionReason,
}

impl ContractViolation {
    pub fn new(kind: ContractKind, reason: RejectionReason) -> Self {
        Self { kind, reason }
    }
}

/// Limits applied to every contract evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContractBudget {
    pub max_input_bytes: usize,
    pub max_duration: Duration,
}

impl Default for ContractBudget {
    fn default() -> Self {
        Self::from(&ContractConfig::default())
    }
}

impl From<&ContractConfig> for ContractBudget {
    fn from(config: &ContractConfig) -> Self {
        Self {
            max_input_bytes: config.max_input_bytes,
            max_duration: Duration::from_millis(config.budget_ms),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ContractEvaluator {
    budget: ContractBudget,
}

impl ContractEvaluator {
    pub fn new(budget: ContractBudget) -> Self {
        Self { budget }
    }

    pub fn budget(&self) -> ContractBudget {
        self.budget
    }

    pub fn evaluate_state_contract<A: Actor + ?Sized>(
        &self,
        actor: &A,
        state: &[u8],
    ) -> Result<(), ContractViolation> {
        self.evaluate(ContractKind::State, state.len(), || {
            actor.state_contract(state)
        })
    }

    pub fn evaluate_message_contract<A: Actor + ?Sized>(
        &self,
        actor: &A,
        message: &[u8],
        state: &[u8],
    ) -> Result<(), ContractViolation> {
        self.evaluate(ContractKind::Message, message.len() + state.len(), || {
            actor.message_contract(message, state)
        })
    }

    pub fn evaluate_http_contract<A: HttpActor + ?Sized>(
        &self,
        actor: &A,
        request: &[u8],
        state: &[u8],
    ) -> Result<(), ContractViolation> {
        self.evaluate(ContractKind::Http, request.len() + state.len(), || {
            actor.http_contract(request, state)
        })
    }

    /// Runs `predicate` and turns every way it can fail into a violation.
    ///
    /// The budget is checked after the predicate returns; a predicate that
    /// never returns is not interrupted.
    fn evaluate<F>(
        &self,
        kind: ContractKind,
        input_len: usize,
        predicate: F,
    ) -> Result<(), ContractViolation>
    where
        F: FnOnce() -> bool,
    {
        if input_len > self.budget.max_input_bytes {
            return Err(ContractViolation::new(
                kind,
                RejectionReason::InputTooLarge {
                    size: input_len,
                    limit: self.budget.max_input_bytes,
                },
            ));
        }

        let start = Instant::now();
        let verdict = catch_unwind(AssertUnwindSafe(predicate));
        let elapsed = start.elapsed();

        let accepted = match verdict {
            Ok(accepted) => accepted,
            Err(_) => {
                warn!("{} panicked during evaluation", kind);
                return Err(ContractViolation::new(kind, RejectionReason::Panicked));
            }
        };

        if elapsed > self.budget.max_duration {
            return Err(ContractViolation::new(
                kind,
                RejectionReason::BudgetExceeded {
                    elapsed_ms: elapsed.as_millis(),
                    budget_ms: self.budget.max_duration.as_millis(),
                },
            ));
        }

        debug!("{} evaluated to {} in {:?}", kind, accepted, elapsed);
        if accepted {
            Ok(())
        } else {
            Err(ContractViolation::new(kind, RejectionReason::Rejected))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actor::{ActorContext, HandlerFault};
    use pretty_assertions::assert_eq;

    struct Bounded {
        max_state: usize,
        slow: bool,
    }

    impl Actor for Bounded {
        fn init(&self, _ctx: &ActorContext) -> Result<Vec<u8>, HandlerFault> {
            Ok(Vec::new())
        }

        fn state_contract(&self, state: &[u8]) -> bool {
            if self.slow {
                std::thread::sleep(Duration::from_millis(20));
            }
            state.len() <= self.max_state
        }

        fn message_contract(&self, message: &[u8], _state: &[u8]) -> bool {
            if message == b"boom" {
                panic!("contract exploded");
            }
            true
        }

        fn handle(
            &self,
            message: &[u8],
            state: &[u8],
            _ctx: &ActorContext,
        ) -> Result<Vec<u8>, HandlerFault> {
            Ok([state, message].concat())
        }
    }

    fn actor() -> Bounded {
        Bounded {
            max_state: 4,
            slow: false,
        }
    }

    #[test]
    fn test_accepts_and_rejects() {
        let evaluator = ContractEvaluator::default();
        assert_eq!(evaluator.evaluate_state_contract(&actor(), b"abcd"), Ok(()));

        let violation = evaluator
            .evaluate_state_contract(&actor(), b"abcde")
            .unwrap_err();
        assert_eq!(violation.kind, ContractKind::State);
        assert_eq!(violation.reason, RejectionReason::Rejected);
    }

    #[test]
    fn test_panic_is_a_rejection() {
        let evaluator = ContractEvaluator::default();
        let violation = evaluator
            .evaluate_message_contract(&actor(), b"boom", b"")
            .unwrap_err();
        assert_eq!(violation.kind, ContractKind::Message);
        assert_eq!(violation.reason, RejectionReason::Panicked);
    }

    #[test]
    fn test_oversized_input_is_rejected_before_running() {
        let evaluator = ContractEvaluator::new(ContractBudget {
            max_input_bytes: 3,
            max_duration: Duration::from_secs(1),
        });
        // "boom" would panic if the predicate ran.
        let violation = evaluator
            .evaluate_message_contract(&actor(), b"boom", b"")
            .unwrap_err();
        assert_eq!(
            violation.reason,
            RejectionReason::InputTooLarge { size: 4, limit: 3 }
        );
    }

    #[test]
    fn test_budget_overrun_is_a_rejection() {
        let evaluator = ContractEvaluator::new(ContractBudget {
            max_input_bytes: 1024,
            max_duration: Duration::from_millis(1),
        });
        let slow = Bounded {
            max_state: 4,
            slow: true,
        };
        let violation = evaluator.evaluate_state_contract(&slow, b"ok").unwrap_err();
        assert!(matches!(
            violation.reason,
            RejectionReason::BudgetExceeded { budget_ms: 1, .. }
        ));
    }

    #[test]
    fn test_violation_display() {
        let violation = ContractViolation::new(ContractKind::Message, RejectionReason::Rejected);
        assert_eq!(
            violation.to_string(),
            "message-contract rejected: predicate returned false"
        );
    }
}
