//! # Actor Types
//!
//! Error types and the operation, info and control messages an actor lane
//! accepts.

use std::fmt;

use covenant_chain::{ChainIntegrityError, CommitRecord};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::oneshot;

use super::behavior::HandlerFault;
use crate::contract::ContractViolation;
use crate::metrics::ActorMetrics;

/// # ActorError
///
/// Everything that can go wrong when driving an actor. Only
/// `ContractViolation` leaves the actor usable; `HandlerFault`,
/// `InitRejected` and `Faulted` all mean the actor is in its terminal
/// phase.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ActorError {
    /// A contract rejected the transition. State is unchanged.
    #[error("contract violation: {0}")]
    ContractViolation(#[from] ContractViolation),

    /// The handler failed. The actor is now faulted.
    #[error("handler fault: {0}")]
    HandlerFault(#[from] HandlerFault),

    /// The initial state did not satisfy the state contract.
    #[error("initial state rejected: {0}")]
    InitRejected(ContractViolation),

    /// The actor faulted earlier and accepts no further transitions.
    #[error("actor is faulted: {reason}")]
    Faulted { reason: String },

    #[error("actor is not initialized")]
    NotInitialized,

    #[error("actor is already initialized")]
    AlreadyInitialized,

    #[error("actor does not handle http requests")]
    HttpUnsupported,

    #[error("actor mailbox is full")]
    MailboxFull,

    #[error("operation channel closed")]
    ChannelClosed,

    #[error("actor is shutting down")]
    ShuttingDown,

    #[error("chain integrity failure: {0}")]
    ChainIntegrity(#[from] ChainIntegrityError),
}

impl ActorError {
    /// True if the actor can keep accepting transitions after this error.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            ActorError::ContractViolation(_) | ActorError::MailboxFull
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "phase", rename_all = "lowercase")]
pub enum ActorStatus {
    Uninitialized,
    Ready,
    Faulted { reason: String },
}

impl fmt::Display for ActorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActorStatus::Uninitialized => write!(f, "Uninitialized"),
            ActorStatus::Ready => write!(f, "Ready"),
            ActorStatus::Faulted { reason } => write!(f, "Faulted({})", reason),
        }
    }
}

/// Reply to an HTTP request. `commit` is present only when the request
/// produced a successor state.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub body: Vec<u8>,
    pub commit: Option<CommitRecord>,
}

/// Transitions, processed strictly one at a time in arrival order.
#[derive(Debug)]
pub enum ActorOperation {
    HandleMessage {
        message: Vec<u8>,
        response_tx: oneshot::Sender<Result<CommitRecord, ActorError>>,
    },
    HandleHttp {
        request: Vec<u8>,
        response_tx: oneshot::Sender<Result<HttpResponse, ActorError>>,
    },
}

impl ActorOperation {
    /// Answers the caller without running the operation.
    pub(crate) fn reject(self, error: ActorError) {
        match self {
            ActorOperation::HandleMessage { response_tx, .. } => {
                let _ = response_tx.send(Err(error));
            }
            ActorOperation::HandleHttp { response_tx, .. } => {
                let _ = response_tx.send(Err(error));
            }
        }
    }
}

/// Read-only queries, answered between transitions.
#[derive(Debug)]
pub enum ActorInfo {
    GetState {
        response_tx: oneshot::Sender<Result<Option<Vec<u8>>, ActorError>>,
    },
    GetChain {
        response_tx: oneshot::Sender<Result<Vec<CommitRecord>, ActorError>>,
    },
    VerifyChain {
        response_tx: oneshot::Sender<Result<(), ActorError>>,
    },
    GetStatus {
        response_tx: oneshot::Sender<Result<ActorStatus, ActorError>>,
    },
    GetMetrics {
        response_tx: oneshot::Sender<Result<ActorMetrics, ActorError>>,
    },
}

#[derive(Debug)]
pub enum ActorControl {
    /// Stop after the current transition. Queued operations are answered
    /// with `ShuttingDown`.
    Shutdown {
        response_tx: oneshot::Sender<Result<(), ActorError>>,
    },
}
