//! # Actors
//!
//! An actor is a [`Behavior`] (init, contracts, handlers) driven by an
//! [`ActorMachine`] inside its own lane ([`ActorRuntime`]), addressed
//! through an [`ActorHandle`].

pub mod behavior;
pub mod context;
pub mod handle;
pub mod machine;
pub mod runtime;
pub mod types;

pub use behavior::{Actor, Behavior, HandlerFault, HttpActor, HttpOutcome};
pub use context::ActorContext;
pub use handle::ActorHandle;
pub use machine::{ActorMachine, HttpReply, MachinePhase, Transition};
pub use runtime::{ActorRuntime, LaneConfig, SpawnedActor};
pub use types::{
    ActorControl, ActorError, ActorInfo, ActorOperation, ActorStatus, HttpResponse,
};
