//! # Covenant
//!
//! Covenant is a runtime for contract-verified actors. Every actor declares
//! contracts, pure predicates over its state and the messages it accepts,
//! and every state transition must satisfy them before it becomes real.
//! Each accepted transition is sealed into a hash-chained ledger, one chain
//! per actor, so the full history of an actor can be audited and replayed.
//!
//! ## Core Features
//!
//! * **Contracts**: message, state and HTTP predicates checked around every handler
//! * **Hash-chained history**: one tamper-evident chain of commits per actor
//! * **Chain logging**: a stable text rendering of every commit, decoupled from the commit path
//! * **Replay**: re-run a chain's inputs to prove its states follow from them
//!
//! ## Architecture
//!
//! * `CovenantRuntime`: the dispatcher that owns actor lanes and routes messages
//! * `ActorRuntime`: the lane that runs a single actor, one transition at a time
//! * `ActorHandle`: the interface for talking to a lane
//! * `Ledger`: the per-actor hash chains, from `covenant-chain`
//! * `ChainLogger`: renders commits and supplementary entries to sinks
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use covenant::{Actor, ActorContext, Behavior, CovenantRuntime, HandlerFault, RuntimeConfig};
//!
//! struct Appender;
//!
//! impl Actor for Appender {
//!     fn init(&self, _ctx: &ActorContext) -> Result<Vec<u8>, HandlerFault> {
//!         Ok(vec![0])
//!     }
//!     fn state_contract(&self, _state: &[u8]) -> bool {
//!         true
//!     }
//!     fn message_contract(&self, message: &[u8], _state: &[u8]) -> bool {
//!         message.len() <= 4
//!     }
//!     fn handle(&self, message: &[u8], state: &[u8], _ctx: &ActorContext) -> Result<Vec<u8>, HandlerFault> {
//!         Ok([state, message].concat())
//!     }
//! }
//!
//! # async fn example() -> anyhow::Result<()> {
//! let (runtime, handle) = CovenantRuntime::new(RuntimeConfig::default())?;
//! tokio::spawn(runtime.run());
//!
//! handle.spawn_actor("appender", Behavior::basic(Appender)).await?;
//! handle.deliver("appender", vec![1]).await?;
//! handle.verify_chain("appender").await?;
//! handle.shutdown().await?;
//! # Ok(())
//! # }
//! ```

pub mod actor;
pub mod config;
pub mod contract;
pub mod covenant_runtime;
pub mod errors;
pub mod logging;
pub mod messages;
pub mod metrics;
pub mod replay;
pub mod shutdown;
pub mod transport;

pub use actor::{
    Actor, ActorContext, ActorError, ActorHandle, ActorRuntime, ActorStatus, Behavior,
    HandlerFault, HttpActor, HttpOutcome, HttpResponse,
};
pub use config::{ConfigError, LogLevel, RuntimeConfig};
pub use contract::{ContractBudget, ContractEvaluator, ContractKind, ContractViolation};
pub use covenant_runtime::{CovenantRuntime, RuntimeBuilder, RuntimeHandle};
pub use errors::RuntimeError;
pub use logging::{ChainLogger, LogSink, MemorySink, SinkWriteError};
pub use messages::{Envelope, RuntimeCommand};
pub use metrics::{ActorMetrics, TransitionStats};
pub use replay::{replay_chain, ReplayError, ReplayReport};
pub use transport::{NullTransport, Transport, TransportError};

pub use covenant_chain::{
    audit, verify, ActorId, ChainFile, ChainHash, ChainIntegrityError, CommitRecord, EventData,
    EventType, Ledger, LogicalClock,
};
