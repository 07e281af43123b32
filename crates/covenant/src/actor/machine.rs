//! # Actor State Machine
//!
//! Drives one actor through `Uninitialized -> Ready -> Faulted`. Every
//! transition is checked against the actor's contracts before and after the
//! handler runs, and only a fully checked transition produces a
//! [`PendingCommit`]. The machine never touches the ledger; the lane that
//! owns it appends the commit and then updates nothing else, so state and
//! chain cannot drift apart.

use std::panic::{catch_unwind, AssertUnwindSafe};

use covenant_chain::{digest, ActorId, EventData, PendingCommit};
use tracing::{debug, error};

use super::behavior::{Actor, Behavior, HandlerFault, HttpOutcome};
use super::context::ActorContext;
use super::types::{ActorError, ActorStatus};
use crate::contract::ContractEvaluator;
use crate::messages::Envelope;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MachinePhase {
    Uninitialized,
    Ready(Vec<u8>),
    Faulted { reason: String },
}

/// An accepted transition waiting to be committed.
#[derive(Debug)]
pub struct Transition {
    pub pending: PendingCommit,
    pub outbound: Vec<Envelope>,
}

#[derive(Debug)]
pub enum HttpReply {
    /// The request produced a successor state that must be committed.
    Committed {
        response: Vec<u8>,
        transition: Transition,
    },
    /// The request left state untouched. Nothing is committed.
    ReadOnly {
        response: Vec<u8>,
        outbound: Vec<Envelope>,
    },
}

pub struct ActorMachine {
    behavior: Behavior,
    evaluator: ContractEvaluator,
    context: ActorContext,
    phase: MachinePhase,
}

impl ActorMachine {
    pub fn new(behavior: Behavior, evaluator: ContractEvaluator, context: ActorContext) -> Self {
        Self {
            behavior,
            evaluator,
            context,
            phase: MachinePhase::Uninitialized,
        }
    }

    pub fn id(&self) -> &ActorId {
        self.context.actor_id()
    }

    pub fn phase(&self) -> &MachinePhase {
        &self.phase
    }

    pub fn state(&self) -> Option<&[u8]> {
        match &self.phase {
            MachinePhase::Ready(state) => Some(state),
            _ => None,
        }
    }

    pub fn status(&self) -> ActorStatus {
        match &self.phase {
            MachinePhase::Uninitialized => ActorStatus::Uninitialized,
            MachinePhase::Ready(_) => ActorStatus::Ready,
            MachinePhase::Faulted { reason } => ActorStatus::Faulted {
                reason: reason.clone(),
            },
        }
    }

    /// Runs `init` and checks the initial state. Any failure is terminal.
    pub fn init(&mut self) -> Result<Transition, ActorError> {
        match &self.phase {
            MachinePhase::Uninitialized => {}
            MachinePhase::Ready(_) => return Err(ActorError::AlreadyInitialized),
            MachinePhase::Faulted { reason } => {
                return Err(ActorError::Faulted {
                    reason: reason.clone(),
                })
            }
        }

        let behavior = &self.behavior;
        let context = &self.context;
        let initial = match guard_handler(|| behavior.init(context)) {
            Ok(state) => state,
            Err(fault) => return Err(self.fault(fault)),
        };

        if let Err(violation) = self
            .evaluator
            .evaluate_state_contract(&self.behavior, &initial)
        {
            self.context.discard_outbox();
            self.phase = MachinePhase::Faulted {
                reason: violation.to_string(),
            };
            error!("actor [{}]: initial state rejected: {}", self.id(), violation);
            return Err(ActorError::InitRejected(violation));
        }

        self.phase = MachinePhase::Ready(initial.clone());
        Ok(Transition {
            pending: PendingCommit::new(self.id().clone(), EventData::Init { state: initial }),
            outbound: self.context.take_outbox(),
        })
    }

    /// Checks and applies a message. A contract violation leaves the actor
    /// exactly as it was.
    pub fn handle(&mut self, message: Vec<u8>) -> Result<Transition, ActorError> {
        let state = self.ready_state()?;

        self.evaluator
            .evaluate_message_contract(&self.behavior, &message, &state)?;

        let behavior = &self.behavior;
        let context = &self.context;
        let next = match guard_handler(|| behavior.handle(&message, &state, context)) {
            Ok(next) => next,
            Err(fault) => return Err(self.fault(fault)),
        };

        if let Err(violation) = self.evaluator.evaluate_state_contract(&self.behavior, &next) {
            self.context.discard_outbox();
            return Err(violation.into());
        }

        debug!(
            "actor [{}]: message accepted, state {} -> {} bytes",
            self.id(),
            state.len(),
            next.len()
        );
        self.phase = MachinePhase::Ready(next.clone());
        Ok(Transition {
            pending: PendingCommit::new(
                self.id().clone(),
                EventData::MessageHandled {
                    message,
                    state: next,
                },
            ),
            outbound: self.context.take_outbox(),
        })
    }

    pub fn handle_http(&mut self, request: Vec<u8>) -> Result<HttpReply, ActorError> {
        let state = self.ready_state()?;
        let Some(http) = self.behavior.as_http() else {
            return Err(ActorError::HttpUnsupported);
        };

        self.evaluator
            .evaluate_http_contract(http, &request, &state)?;

        let context = &self.context;
        let outcome = match guard_handler(|| http.handle_http(&request, &state, context)) {
            Ok(outcome) => outcome,
            Err(fault) => return Err(self.fault(fault)),
        };

        let HttpOutcome { response, state: next } = outcome;
        let Some(next) = next else {
            return Ok(HttpReply::ReadOnly {
                response,
                outbound: self.context.take_outbox(),
            });
        };

        if let Err(violation) = self.evaluator.evaluate_state_contract(&self.behavior, &next) {
            self.context.discard_outbox();
            return Err(violation.into());
        }

        self.phase = MachinePhase::Ready(next.clone());
        let pending = PendingCommit::new(
            self.id().clone(),
            EventData::HttpHandled {
                request,
                response_digest: digest(&response),
                state: next,
            },
        );
        Ok(HttpReply::Committed {
            response,
            transition: Transition {
                pending,
                outbound: self.context.take_outbox(),
            },
        })
    }

    fn ready_state(&self) -> Result<Vec<u8>, ActorError> {
        match &self.phase {
            MachinePhase::Ready(state) => Ok(state.clone()),
            MachinePhase::Uninitialized => Err(ActorError::NotInitialized),
            MachinePhase::Faulted { reason } => Err(ActorError::Faulted {
                reason: reason.clone(),
            }),
        }
    }

    fn fault(&mut self, fault: HandlerFault) -> ActorError {
        self.context.discard_outbox();
        error!("actor [{}]: handler fault: {}", self.id(), fault);
        self.phase = MachinePhase::Faulted {
            reason: fault.to_string(),
        };
        ActorError::HandlerFault(fault)
    }
}

/// Runs a handler, turning a panic into a fault.
fn guard_handler<T, F>(handler: F) -> Result<T, HandlerFault>
where
    F: FnOnce() -> Result<T, HandlerFault>,
{
    match catch_unwind(AssertUnwindSafe(handler)) {
        Ok(result) => result,
        Err(payload) => {
            let detail = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            Err(HandlerFault::new(format!("handler panicked: {}", detail)))
        }
    }
}
