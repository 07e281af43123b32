//! # Actor Behavior
//!
//! The traits an actor implements. Handlers are ordinary synchronous code:
//! they receive the current state by reference and return the successor
//! state, so there is no way for a handler to mutate the committed state in
//! place. Contracts are pure predicates and must not touch the context.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::context::ActorContext;

/// A handler that could not produce a successor state.
///
/// Returning a fault (or panicking) moves the actor to its terminal
/// `Faulted` phase.
#[derive(Error, Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[error("{0}")]
pub struct HandlerFault(String);

impl HandlerFault {
    pub fn new(reason: impl Into<String>) -> Self {
        Self(reason.into())
    }

    pub fn reason(&self) -> &str {
        &self.0
    }
}

pub trait Actor: Send + Sync {
    /// Produces the initial state. It must satisfy the state contract.
    fn init(&self, ctx: &ActorContext) -> Result<Vec<u8>, HandlerFault>;

    /// Invariant every committed state must satisfy.
    fn state_contract(&self, state: &[u8]) -> bool;

    /// Precondition for handling `message` in `state`.
    fn message_contract(&self, message: &[u8], state: &[u8]) -> bool;

    /// Computes the successor state for `message`.
    fn handle(
        &self,
        message: &[u8],
        state: &[u8],
        ctx: &ActorContext,
    ) -> Result<Vec<u8>, HandlerFault>;
}

/// The result of an HTTP handler. `state` is `None` for requests that do
/// not change the actor, in which case nothing is committed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpOutcome {
    pub response: Vec<u8>,
    pub state: Option<Vec<u8>>,
}

impl HttpOutcome {
    pub fn read_only(response: impl Into<Vec<u8>>) -> Self {
        Self {
            response: response.into(),
            state: None,
        }
    }

    pub fn with_state(response: impl Into<Vec<u8>>, state: Vec<u8>) -> Self {
        Self {
            response: response.into(),
            state: Some(state),
        }
    }
}

pub trait HttpActor: Actor {
    fn http_contract(&self, request: &[u8], state: &[u8]) -> bool;

    fn handle_http(
        &self,
        request: &[u8],
        state: &[u8],
        ctx: &ActorContext,
    ) -> Result<HttpOutcome, HandlerFault>;
}

/// The behavior an actor is spawned with.
#[derive(Clone)]
pub enum Behavior {
    Basic(Arc<dyn Actor>),
    Http(Arc<dyn HttpActor>),
}

impl Behavior {
    pub fn basic<A: Actor + 'static>(actor: A) -> Self {
        Behavior::Basic(Arc::new(actor))
    }

    pub fn http<A: HttpActor + 'static>(actor: A) -> Self {
        Behavior::Http(Arc::new(actor))
    }

    pub fn as_http(&self) -> Option<&dyn HttpActor> {
        match self {
            Behavior::Basic(_) => None,
            Behavior::Http(actor) => Some(actor.as_ref()),
        }
    }
}

impl fmt::Debug for Behavior {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Behavior::Basic(_) => f.write_str("Behavior::Basic"),
            Behavior::Http(_) => f.write_str("Behavior::Http"),
        }
    }
}

impl Actor for Behavior {
    fn init(&self, ctx: &ActorContext) -> Result<Vec<u8>, HandlerFault> {
        match self {
            Behavior::Basic(actor) => actor.init(ctx),
            Behavior::Http(actor) => actor.init(ctx),
        }
    }

    fn state_contract(&self, state: &[u8]) -> bool {
        match self {
            Behavior::Basic(actor) => actor.state_contract(state),
            Behavior::Http(actor) => actor.state_contract(state),
        }
    }

    fn message_contract(&self, message: &[u8], state: &[u8]) -> bool {
        match self {
            Behavior::Basic(actor) => actor.message_contract(message, state),
            Behavior::Http(actor) => actor.message_contract(message, state),
        }
    }

    fn handle(
        &self,
        message: &[u8],
        state: &[u8],
        ctx: &ActorContext,
    ) -> Result<Vec<u8>, HandlerFault> {
        match self {
            Behavior::Basic(actor) => actor.handle(message, state, ctx),
            Behavior::Http(actor) => actor.handle(message, state, ctx),
        }
    }
}
