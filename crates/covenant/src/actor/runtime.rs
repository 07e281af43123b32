//! # Actor Runtime
//!
//! One tokio task per actor, its lane. The lane owns the actor's state
//! machine and processes operations one at a time, so the sequence
//!
//! message contract -> handle -> state contract -> ledger append -> log
//!
//! is never interleaved with another transition of the same actor. Lanes
//! of different actors share nothing but the ledger, whose locks are per
//! actor.

use std::sync::Arc;
use std::time::{Duration, Instant};

use covenant_chain::{digest, ActorId, ChainHash, CommitRecord, Ledger};
use tokio::sync::mpsc::{self, Receiver, Sender};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::behavior::Behavior;
use super::context::ActorContext;
use super::handle::ActorHandle;
use super::machine::{ActorMachine, HttpReply, Transition};
use super::types::{ActorControl, ActorError, ActorInfo, ActorOperation, HttpResponse};
use crate::config::{LogLevel, RuntimeConfig};
use crate::contract::{ContractBudget, ContractEvaluator};
use crate::logging::ChainLogger;
use crate::messages::{Envelope, RuntimeCommand};
use crate::metrics::{MetricsCollector, TransitionOutcome};

const INFO_CHANNEL_CAPACITY: usize = 32;
const CONTROL_CHANNEL_CAPACITY: usize = 4;

#[derive(Debug, Clone, Copy)]
pub struct LaneConfig {
    pub mailbox_capacity: usize,
    pub send_timeout: Duration,
    pub budget: ContractBudget,
}

impl Default for LaneConfig {
    fn default() -> Self {
        Self::from(&RuntimeConfig::default())
    }
}

impl From<&RuntimeConfig> for LaneConfig {
    fn from(config: &RuntimeConfig) -> Self {
        Self {
            mailbox_capacity: config.runtime.mailbox_capacity,
            send_timeout: config.runtime.send_timeout(),
            budget: ContractBudget::from(&config.contracts),
        }
    }
}

/// A freshly started lane. `init` resolves once the INIT commit is sealed
/// or initialization has faulted the actor.
pub struct SpawnedActor {
    pub handle: ActorHandle,
    pub init: oneshot::Receiver<Result<CommitRecord, ActorError>>,
    pub task: JoinHandle<()>,
}

pub struct ActorRuntime {
    machine: ActorMachine,
    ledger: Arc<Ledger>,
    logger: ChainLogger,
    metrics: MetricsCollector,
    runtime_tx: Sender<RuntimeCommand>,
}

impl ActorRuntime {
    /// Starts a lane for `behavior`. Outbound sends are handed to the
    /// dispatcher through `runtime_tx`.
    pub fn spawn(
        id: ActorId,
        behavior: Behavior,
        ledger: Arc<Ledger>,
        logger: ChainLogger,
        runtime_tx: Sender<RuntimeCommand>,
        config: LaneConfig,
    ) -> SpawnedActor {
        let (operation_tx, operation_rx) = mpsc::channel(config.mailbox_capacity.max(1));
        let (info_tx, info_rx) = mpsc::channel(INFO_CHANNEL_CAPACITY);
        let (control_tx, control_rx) = mpsc::channel(CONTROL_CHANNEL_CAPACITY);
        let (init_tx, init_rx) = oneshot::channel();

        let handle = ActorHandle::new(
            id.clone(),
            operation_tx,
            info_tx,
            control_tx,
            config.send_timeout,
        );

        let context = ActorContext::new(id, logger.clone());
        let machine = ActorMachine::new(behavior, ContractEvaluator::new(config.budget), context);
        let runtime = Self {
            machine,
            ledger,
            logger,
            metrics: MetricsCollector::new(),
            runtime_tx,
        };

        let task = tokio::spawn(runtime.run(init_tx, operation_rx, info_rx, control_rx));

        SpawnedActor {
            handle,
            init: init_rx,
            task,
        }
    }

    fn id(&self) -> &ActorId {
        self.machine.id()
    }

    async fn run(
        mut self,
        init_tx: oneshot::Sender<Result<CommitRecord, ActorError>>,
        mut operation_rx: Receiver<ActorOperation>,
        mut info_rx: Receiver<ActorInfo>,
        mut control_rx: Receiver<ActorControl>,
    ) {
        info!("Actor [{}] lane started", self.id());

        let init = self.initialize().await;
        if init_tx.send(init).is_err() {
            debug!("Actor [{}]: nobody waiting for init result", self.id());
        }

        loop {
            tokio::select! {
                biased;

                Some(control) = control_rx.recv() => match control {
                    ActorControl::Shutdown { response_tx } => {
                        info!("Actor [{}] shutting down", self.id());
                        operation_rx.close();
                        while let Ok(operation) = operation_rx.try_recv() {
                            operation.reject(ActorError::ShuttingDown);
                        }
                        if response_tx.send(Ok(())).is_err() {
                            debug!("Actor [{}]: shutdown requester went away", self.id());
                        }
                        break;
                    }
                },

                Some(info) = info_rx.recv() => self.process_info(info).await,

                Some(operation) = operation_rx.recv() => self.process_operation(operation).await,

                else => {
                    debug!("Actor [{}]: all handles dropped", self.id());
                    break;
                }
            }
        }

        let metrics = self.metrics.get_metrics().await;
        info!(
            "Actor [{}] lane stopped: {} committed, {} rejected, {} faults",
            self.id(),
            metrics.transitions.committed,
            metrics.transitions.contract_rejections,
            metrics.transitions.handler_faults
        );
    }

    async fn initialize(&mut self) -> Result<CommitRecord, ActorError> {
        let start = Instant::now();
        let result = match self.machine.init() {
            Ok(transition) => Ok(self.commit(transition).await),
            Err(err) => {
                self.logger
                    .log_init_fault(self.machine.id(), &err.to_string())
                    .await;
                Err(err)
            }
        };
        self.record(result.as_ref().map(|_| TransitionOutcome::Committed), start)
            .await;
        result
    }

    async fn process_operation(&mut self, operation: ActorOperation) {
        let start = Instant::now();
        match operation {
            ActorOperation::HandleMessage {
                message,
                response_tx,
            } => {
                debug!("Actor [{}]: handling {} byte message", self.id(), message.len());
                let result = self.handle_message(message).await;
                self.record(result.as_ref().map(|_| TransitionOutcome::Committed), start)
                    .await;
                if response_tx.send(result).is_err() {
                    debug!("Actor [{}]: message sender went away", self.id());
                }
            }
            ActorOperation::HandleHttp {
                request,
                response_tx,
            } => {
                debug!("Actor [{}]: handling {} byte request", self.id(), request.len());
                let result = self.handle_http(request).await;
                let outcome = result.as_ref().map(|response| match response.commit {
                    Some(_) => TransitionOutcome::Committed,
                    None => TransitionOutcome::ReadOnly,
                });
                self.record(outcome, start).await;
                if response_tx.send(result).is_err() {
                    debug!("Actor [{}]: http requester went away", self.id());
                }
            }
        }
    }

    async fn handle_message(&mut self, message: Vec<u8>) -> Result<CommitRecord, ActorError> {
        let input_digest = digest(&message);
        match self.machine.handle(message) {
            Ok(transition) => Ok(self.commit(transition).await),
            Err(err) => {
                self.report(&err, input_digest).await;
                Err(err)
            }
        }
    }

    async fn handle_http(&mut self, request: Vec<u8>) -> Result<HttpResponse, ActorError> {
        let input_digest = digest(&request);
        match self.machine.handle_http(request) {
            Ok(HttpReply::Committed {
                response,
                transition,
            }) => {
                let record = self.commit(transition).await;
                Ok(HttpResponse {
                    body: response,
                    commit: Some(record),
                })
            }
            Ok(HttpReply::ReadOnly { response, outbound }) => {
                self.forward(outbound).await;
                Ok(HttpResponse {
                    body: response,
                    commit: None,
                })
            }
            Err(err) => {
                self.report(&err, input_digest).await;
                Err(err)
            }
        }
    }

    /// Seals the transition, then logs it, then releases its sends.
    async fn commit(&mut self, transition: Transition) -> CommitRecord {
        let record = self.ledger.append(transition.pending);
        self.logger.log_commit(&record).await;
        self.forward(transition.outbound).await;
        record
    }

    async fn forward(&self, outbound: Vec<Envelope>) {
        for envelope in outbound {
            let to = envelope.to.clone();
            if self
                .runtime_tx
                .send(RuntimeCommand::Forward { envelope })
                .await
                .is_err()
            {
                warn!(
                    "Actor [{}]: dispatcher is gone, dropping message to {}",
                    self.id(),
                    to
                );
            }
        }
    }

    /// Writes the supplementary entry for a failed operation.
    async fn report(&self, err: &ActorError, input_digest: ChainHash) {
        let id = self.machine.id();
        let tip = self.ledger.tip_or_genesis(id);
        match err {
            ActorError::ContractViolation(violation) => {
                debug!("Actor [{}]: {}", id, violation);
                self.logger
                    .log_rejection(id, violation, input_digest, tip)
                    .await;
            }
            ActorError::HandlerFault(fault) => {
                self.logger
                    .log_handler_fault(id, fault.reason(), tip)
                    .await;
            }
            other => debug!("Actor [{}]: operation refused: {}", id, other),
        }
    }

    async fn record(&self, outcome: Result<TransitionOutcome, &ActorError>, start: Instant) {
        let outcome = match outcome {
            Ok(outcome) => outcome,
            Err(err) => TransitionOutcome::from_error(err),
        };
        self.metrics
            .record_transition(outcome, start.elapsed())
            .await;
    }

    async fn process_info(&self, info: ActorInfo) {
        match info {
            ActorInfo::GetState { response_tx } => {
                let state = self.machine.state().map(<[u8]>::to_vec);
                if response_tx.send(Ok(state)).is_err() {
                    error!("Actor [{}]: failed to send state response", self.id());
                }
            }
            ActorInfo::GetChain { response_tx } => {
                let chain = self.ledger.chain(self.id());
                if response_tx.send(Ok(chain)).is_err() {
                    error!("Actor [{}]: failed to send chain response", self.id());
                }
            }
            ActorInfo::VerifyChain { response_tx } => {
                let result = self.ledger.verify_actor(self.id());
                if let Err(integrity) = &result {
                    self.logger
                        .log_supplementary(
                            LogLevel::Error,
                            format!(
                                "CHAIN_INTEGRITY_FAILURE actor={} {}",
                                self.id(),
                                integrity
                            ),
                            Some(integrity.hash()),
                        )
                        .await;
                }
                if response_tx.send(result.map_err(ActorError::from)).is_err() {
                    error!("Actor [{}]: failed to send verify response", self.id());
                }
            }
            ActorInfo::GetStatus { response_tx } => {
                if response_tx.send(Ok(self.machine.status())).is_err() {
                    error!("Actor [{}]: failed to send status response", self.id());
                }
            }
            ActorInfo::GetMetrics { response_tx } => {
                let metrics = self.metrics.get_metrics().await;
                if response_tx.send(Ok(metrics)).is_err() {
                    error!("Actor [{}]: failed to send metrics response", self.id());
                }
            }
        }
    }
}
