//! # Covenant Runtime
//!
//! The dispatcher. It owns the registry of actor lanes and routes commands
//! to them: spawning, message and HTTP delivery, outbound sends between
//! actors, chain queries and shutdown.
//!
//! The command loop never waits on an individual actor. Every lane has a
//! delivery queue in front of its bounded mailbox, fed in command order and
//! drained by its own task, which waits for mailbox space until the
//! delivery's deadline (`runtime.send_timeout_ms` after the command was
//! taken). Per-actor ordering therefore follows command order, and one busy
//! actor cannot stall delivery to the others. Replies are relayed from
//! short-lived tasks.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use covenant_chain::{ActorId, ChainFile, CommitRecord, Ledger};
use tokio::sync::mpsc::{self, Receiver, Sender, UnboundedReceiver, UnboundedSender};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{timeout, Instant};
use tracing::{debug, error, info, warn};

use crate::actor::{
    ActorError, ActorHandle, ActorOperation, ActorRuntime, ActorStatus, Behavior, HttpResponse,
    LaneConfig,
};
use crate::config::{LogLevel, RuntimeConfig};
use crate::errors::RuntimeError;
use crate::logging::{ChainLogger, LogSink, LoggerTask};
use crate::messages::{Envelope, RuntimeCommand};
use crate::metrics::ActorMetrics;
use crate::shutdown::{ShutdownType, DEFAULT_SHUTDOWN_TIMEOUT};
use crate::transport::{NullTransport, Transport};

struct ActorProcess {
    handle: ActorHandle,
    task: JoinHandle<()>,
    deliveries: DeliveryQueue,
}

/// An operation waiting for room in a lane's mailbox.
struct Delivery {
    operation: ActorOperation,
    deadline: Instant,
    /// The sending actor, for sends released by a commit.
    from: Option<ActorId>,
}

/// The ordered queue in front of one lane's mailbox.
///
/// Dropping it lets the drain task finish what is queued and exit.
struct DeliveryQueue {
    tx: UnboundedSender<Delivery>,
}

impl DeliveryQueue {
    fn spawn(handle: ActorHandle, logger: ChainLogger) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(drain_deliveries(handle, logger, rx));
        Self { tx }
    }

    fn push(&self, delivery: Delivery) {
        if let Err(unsent) = self.tx.send(delivery) {
            unsent.0.operation.reject(ActorError::ShuttingDown);
        }
    }
}

async fn drain_deliveries(
    handle: ActorHandle,
    logger: ChainLogger,
    mut rx: UnboundedReceiver<Delivery>,
) {
    while let Some(Delivery {
        operation,
        deadline,
        from,
    }) = rx.recv().await
    {
        let Err((operation, error)) = handle.enqueue_until(operation, deadline).await else {
            continue;
        };
        if let Some(from) = from {
            warn!(
                "Failed to deliver message from {} to {}: {}",
                from,
                handle.id(),
                error
            );
            logger
                .log_supplementary(
                    LogLevel::Warn,
                    format!("SEND_FAILED from={} to={} reason={}", from, handle.id(), error),
                    None,
                )
                .await;
        }
        operation.reject(error);
    }
    debug!("Delivery queue for {} closed", handle.id());
}

pub struct CovenantRuntime {
    runtime_tx: Sender<RuntimeCommand>,
    runtime_rx: Receiver<RuntimeCommand>,
    actors: HashMap<ActorId, ActorProcess>,
    ledger: Arc<Ledger>,
    logger: ChainLogger,
    logger_task: Option<LoggerTask>,
    transport: Arc<dyn Transport>,
    lane_config: LaneConfig,
}

/// Assembles a [`CovenantRuntime`]. Anything not supplied comes from the
/// configuration: a system-clock ledger, the configured log output and no
/// transport.
pub struct RuntimeBuilder {
    config: RuntimeConfig,
    ledger: Option<Arc<Ledger>>,
    sinks: Option<Vec<Box<dyn LogSink>>>,
    transport: Option<Arc<dyn Transport>>,
}

impl RuntimeBuilder {
    pub fn new(config: RuntimeConfig) -> Self {
        Self {
            config,
            ledger: None,
            sinks: None,
            transport: None,
        }
    }

    pub fn ledger(mut self, ledger: Arc<Ledger>) -> Self {
        self.ledger = Some(ledger);
        self
    }

    /// Replaces the configured log output.
    pub fn sinks(mut self, sinks: Vec<Box<dyn LogSink>>) -> Self {
        self.sinks = Some(sinks);
        self
    }

    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Validates the configuration and starts the logger. Must be called
    /// inside a tokio runtime; the returned runtime still has to be `run`.
    pub fn build(self) -> Result<(CovenantRuntime, RuntimeHandle), RuntimeError> {
        self.config.validate()?;

        let (logger, logger_task) = match self.sinks {
            Some(sinks) => ChainLogger::spawn(&self.config.logging, sinks),
            None => ChainLogger::from_config(&self.config.logging)?,
        };
        let (runtime_tx, runtime_rx) = mpsc::channel(self.config.runtime.command_capacity);

        let runtime = CovenantRuntime {
            runtime_tx: runtime_tx.clone(),
            runtime_rx,
            actors: HashMap::new(),
            ledger: self.ledger.unwrap_or_default(),
            logger: logger.clone(),
            logger_task: Some(logger_task),
            transport: self
                .transport
                .unwrap_or_else(|| Arc::new(NullTransport)),
            lane_config: LaneConfig::from(&self.config),
        };
        let handle = RuntimeHandle {
            runtime_tx,
            logger,
        };
        Ok((runtime, handle))
    }
}

impl CovenantRuntime {
    pub fn new(config: RuntimeConfig) -> Result<(Self, RuntimeHandle), RuntimeError> {
        RuntimeBuilder::new(config).build()
    }

    pub fn ledger(&self) -> Arc<Ledger> {
        self.ledger.clone()
    }

    /// Processes commands until a `Shutdown` command arrives.
    pub async fn run(mut self) {
        info!("Covenant runtime starting");

        while let Some(cmd) = self.runtime_rx.recv().await {
            debug!("Runtime received command: {}", cmd.to_log());
            match cmd {
                RuntimeCommand::SpawnActor {
                    id,
                    behavior,
                    response_tx,
                } => self.spawn_actor(id, behavior, response_tx),
                RuntimeCommand::Deliver {
                    to,
                    message,
                    response_tx,
                } => self.deliver(to, message, response_tx),
                RuntimeCommand::DeliverHttp {
                    to,
                    request,
                    response_tx,
                } => self.deliver_http(to, request, response_tx),
                RuntimeCommand::Forward { envelope } => self.forward(envelope).await,
                RuntimeCommand::GetChain { actor, response_tx } => {
                    let result = self
                        .known(&actor)
                        .map(|()| self.ledger.chain(&actor));
                    if response_tx.send(result).is_err() {
                        error!("Failed to send chain response for {}", actor);
                    }
                }
                RuntimeCommand::VerifyChain { actor, response_tx } => {
                    let result = self.verify_chain(&actor).await;
                    if response_tx.send(result).is_err() {
                        error!("Failed to send verify response for {}", actor);
                    }
                }
                RuntimeCommand::GetState { actor, response_tx } => {
                    match self.actors.get(&actor) {
                        Some(process) => {
                            let handle = process.handle.clone();
                            tokio::spawn(async move {
                                let state = handle.get_state().await.map_err(RuntimeError::from);
                                let _ = response_tx.send(state);
                            });
                        }
                        None => {
                            let _ = response_tx.send(Err(RuntimeError::ActorNotFound(actor)));
                        }
                    }
                }
                RuntimeCommand::GetStatus { actor, response_tx } => {
                    match self.actors.get(&actor) {
                        Some(process) => {
                            let handle = process.handle.clone();
                            tokio::spawn(async move {
                                let status = handle.status().await.map_err(RuntimeError::from);
                                let _ = response_tx.send(status);
                            });
                        }
                        None => {
                            let _ = response_tx.send(Err(RuntimeError::ActorNotFound(actor)));
                        }
                    }
                }
                RuntimeCommand::GetMetrics { actor, response_tx } => {
                    match self.actors.get(&actor) {
                        Some(process) => {
                            let handle = process.handle.clone();
                            tokio::spawn(async move {
                                let metrics = handle.metrics().await.map_err(RuntimeError::from);
                                let _ = response_tx.send(metrics);
                            });
                        }
                        None => {
                            let _ = response_tx.send(Err(RuntimeError::ActorNotFound(actor)));
                        }
                    }
                }
                RuntimeCommand::GetActors { response_tx } => {
                    let mut actors: Vec<ActorId> = self.actors.keys().cloned().collect();
                    actors.sort();
                    if response_tx.send(actors).is_err() {
                        error!("Failed to send actor list");
                    }
                }
                RuntimeCommand::StopActor { actor, response_tx } => {
                    match self.actors.remove(&actor) {
                        Some(process) => {
                            info!("Stopping actor {}", actor);
                            tokio::spawn(async move {
                                stop_process(&actor, process).await;
                                let _ = response_tx.send(Ok(()));
                            });
                        }
                        None => {
                            let _ = response_tx.send(Err(RuntimeError::ActorNotFound(actor)));
                        }
                    }
                }
                RuntimeCommand::Shutdown { response_tx } => {
                    info!("Covenant runtime shutting down");
                    self.stop_all().await;
                    let _ = response_tx.send(());
                    break;
                }
            }
        }

        info!("Covenant runtime stopped");
    }

    fn spawn_actor(
        &mut self,
        id: ActorId,
        behavior: Behavior,
        response_tx: oneshot::Sender<Result<CommitRecord, RuntimeError>>,
    ) {
        if self.actors.contains_key(&id) || !self.ledger.is_empty(&id) {
            let _ = response_tx.send(Err(RuntimeError::ActorAlreadyExists(id)));
            return;
        }

        let spawned = ActorRuntime::spawn(
            id.clone(),
            behavior,
            self.ledger.clone(),
            self.logger.clone(),
            self.runtime_tx.clone(),
            self.lane_config,
        );
        let deliveries = DeliveryQueue::spawn(spawned.handle.clone(), self.logger.clone());
        self.actors.insert(
            id.clone(),
            ActorProcess {
                handle: spawned.handle,
                task: spawned.task,
                deliveries,
            },
        );

        let init = spawned.init;
        tokio::spawn(async move {
            let result = match init.await {
                Ok(result) => result.map_err(RuntimeError::from),
                Err(_) => Err(RuntimeError::ChannelClosed),
            };
            match &result {
                Ok(record) => info!("Spawned actor {} at {}", id, record.hash.short()),
                Err(e) => error!("Actor {} failed to initialize: {}", id, e),
            }
            let _ = response_tx.send(result);
        });
    }

    fn deliver(
        &mut self,
        to: ActorId,
        message: Vec<u8>,
        response_tx: oneshot::Sender<Result<CommitRecord, RuntimeError>>,
    ) {
        let Some(process) = self.actors.get(&to) else {
            let _ = response_tx.send(Err(RuntimeError::ActorNotFound(to)));
            return;
        };
        let (tx, rx) = oneshot::channel();
        process.deliveries.push(Delivery {
            operation: ActorOperation::HandleMessage {
                message,
                response_tx: tx,
            },
            deadline: self.deadline(),
            from: None,
        });
        relay(rx, response_tx);
    }

    fn deliver_http(
        &mut self,
        to: ActorId,
        request: Vec<u8>,
        response_tx: oneshot::Sender<Result<HttpResponse, RuntimeError>>,
    ) {
        let Some(process) = self.actors.get(&to) else {
            let _ = response_tx.send(Err(RuntimeError::ActorNotFound(to)));
            return;
        };
        let (tx, rx) = oneshot::channel();
        process.deliveries.push(Delivery {
            operation: ActorOperation::HandleHttp {
                request,
                response_tx: tx,
            },
            deadline: self.deadline(),
            from: None,
        });
        relay(rx, response_tx);
    }

    fn deadline(&self) -> Instant {
        Instant::now() + self.lane_config.send_timeout
    }

    /// Routes a committed send: to a local lane if the target lives here,
    /// otherwise to the transport. A local lane with a full mailbox gets
    /// the usual send timeout; only then is the send dropped and logged.
    async fn forward(&mut self, envelope: Envelope) {
        let Envelope { from, to, message } = envelope;
        if let Some(process) = self.actors.get(&to) {
            let (tx, rx) = oneshot::channel();
            process.deliveries.push(Delivery {
                operation: ActorOperation::HandleMessage {
                    message,
                    response_tx: tx,
                },
                deadline: self.deadline(),
                from: Some(from.clone()),
            });
            tokio::spawn(async move {
                match rx.await {
                    Ok(Ok(record)) => {
                        debug!("{} -> {} committed {}", from, to, record.hash.short())
                    }
                    Ok(Err(e)) if e.is_recoverable() => {
                        debug!("{} -> {} not committed: {}", from, to, e)
                    }
                    Ok(Err(e)) => warn!("{} -> {} not committed: {}", from, to, e),
                    Err(_) => debug!("{} -> {}: lane stopped", from, to),
                }
            });
            return;
        }

        if let Err(e) = self
            .transport
            .forward(Envelope::new(from.clone(), to.clone(), message))
        {
            warn!("Failed to deliver message from {} to {}: {}", from, to, e);
            self.logger
                .log_supplementary(
                    LogLevel::Warn,
                    format!("SEND_FAILED from={} to={} reason={}", from, to, e),
                    None,
                )
                .await;
        }
    }

    fn known(&self, actor: &ActorId) -> Result<(), RuntimeError> {
        if self.actors.contains_key(actor) || !self.ledger.is_empty(actor) {
            Ok(())
        } else {
            Err(RuntimeError::ActorNotFound(actor.clone()))
        }
    }

    async fn verify_chain(&self, actor: &ActorId) -> Result<(), RuntimeError> {
        self.known(actor)?;
        match self.ledger.verify_actor(actor) {
            Ok(()) => Ok(()),
            Err(source) => {
                self.logger
                    .log_supplementary(
                        LogLevel::Error,
                        format!("CHAIN_INTEGRITY_FAILURE actor={} {}", actor, source),
                        Some(source.hash()),
                    )
                    .await;
                Err(RuntimeError::Integrity {
                    actor: actor.clone(),
                    source,
                })
            }
        }
    }

    async fn stop_all(&mut self) {
        for (id, process) in self.actors.drain() {
            stop_process(&id, process).await;
        }
        if let Some(logger_task) = self.logger_task.take() {
            logger_task.shutdown(ShutdownType::Graceful).await;
        }
    }
}

fn relay<T>(
    rx: oneshot::Receiver<Result<T, ActorError>>,
    response_tx: oneshot::Sender<Result<T, RuntimeError>>,
) where
    T: Send + 'static,
{
    tokio::spawn(async move {
        let result = match rx.await {
            Ok(result) => result.map_err(RuntimeError::from),
            Err(_) => Err(RuntimeError::Actor(ActorError::ChannelClosed)),
        };
        let _ = response_tx.send(result);
    });
}

async fn stop_process(id: &ActorId, process: ActorProcess) {
    match timeout(DEFAULT_SHUTDOWN_TIMEOUT, process.handle.shutdown()).await {
        Ok(Ok(())) => {
            if let Err(e) = process.task.await {
                error!("Actor {} lane ended abnormally: {}", id, e);
            }
        }
        Ok(Err(e)) => debug!("Actor {} was already stopped: {}", id, e),
        Err(_) => {
            warn!(
                "Actor {} did not stop within {:?}, aborting its lane",
                id, DEFAULT_SHUTDOWN_TIMEOUT
            );
            process.task.abort();
        }
    }
}

/// The cloneable client of a running [`CovenantRuntime`].
#[derive(Clone, Debug)]
pub struct RuntimeHandle {
    runtime_tx: Sender<RuntimeCommand>,
    logger: ChainLogger,
}

impl RuntimeHandle {
    /// Spawns an actor and waits for its INIT commit.
    pub async fn spawn_actor(
        &self,
        id: impl Into<ActorId>,
        behavior: Behavior,
    ) -> Result<CommitRecord, RuntimeError> {
        let id = id.into();
        self.request(|response_tx| RuntimeCommand::SpawnActor {
            id,
            behavior,
            response_tx,
        })
        .await?
    }

    pub async fn deliver(
        &self,
        to: impl Into<ActorId>,
        message: impl Into<Vec<u8>>,
    ) -> Result<CommitRecord, RuntimeError> {
        let to = to.into();
        let message = message.into();
        self.request(|response_tx| RuntimeCommand::Deliver {
            to,
            message,
            response_tx,
        })
        .await?
    }

    pub async fn deliver_http(
        &self,
        to: impl Into<ActorId>,
        request: impl Into<Vec<u8>>,
    ) -> Result<HttpResponse, RuntimeError> {
        let to = to.into();
        let request = request.into();
        self.request(|response_tx| RuntimeCommand::DeliverHttp {
            to,
            request,
            response_tx,
        })
        .await?
    }

    pub async fn get_chain(
        &self,
        actor: impl Into<ActorId>,
    ) -> Result<Vec<CommitRecord>, RuntimeError> {
        let actor = actor.into();
        self.request(|response_tx| RuntimeCommand::GetChain { actor, response_tx })
            .await?
    }

    /// Audits an actor's chain. Fails with [`RuntimeError::Integrity`]
    /// naming the first bad record.
    pub async fn verify_chain(&self, actor: impl Into<ActorId>) -> Result<(), RuntimeError> {
        let actor = actor.into();
        self.request(|response_tx| RuntimeCommand::VerifyChain { actor, response_tx })
            .await?
    }

    pub async fn get_state(
        &self,
        actor: impl Into<ActorId>,
    ) -> Result<Option<Vec<u8>>, RuntimeError> {
        let actor = actor.into();
        self.request(|response_tx| RuntimeCommand::GetState { actor, response_tx })
            .await?
    }

    pub async fn status(&self, actor: impl Into<ActorId>) -> Result<ActorStatus, RuntimeError> {
        let actor = actor.into();
        self.request(|response_tx| RuntimeCommand::GetStatus { actor, response_tx })
            .await?
    }

    /// Transition counters and timings collected by the actor's lane.
    pub async fn metrics(&self, actor: impl Into<ActorId>) -> Result<ActorMetrics, RuntimeError> {
        let actor = actor.into();
        self.request(|response_tx| RuntimeCommand::GetMetrics { actor, response_tx })
            .await?
    }

    pub async fn actors(&self) -> Result<Vec<ActorId>, RuntimeError> {
        self.request(|response_tx| RuntimeCommand::GetActors { response_tx })
            .await
    }

    pub async fn stop_actor(&self, actor: impl Into<ActorId>) -> Result<(), RuntimeError> {
        let actor = actor.into();
        self.request(|response_tx| RuntimeCommand::StopActor { actor, response_tx })
            .await?
    }

    /// Saves an actor's chain for offline audit.
    pub async fn save_chain(
        &self,
        actor: impl Into<ActorId>,
        path: impl AsRef<Path>,
    ) -> Result<(), RuntimeError> {
        let actor = actor.into();
        let records = self.get_chain(actor.clone()).await?;
        ChainFile::new(actor, records).save(path.as_ref())?;
        Ok(())
    }

    /// Stops every lane, drains the chain logger and ends the command loop.
    pub async fn shutdown(&self) -> Result<(), RuntimeError> {
        self.request(|response_tx| RuntimeCommand::Shutdown { response_tx })
            .await
    }

    pub fn logger(&self) -> &ChainLogger {
        &self.logger
    }

    async fn request<T, F>(&self, make: F) -> Result<T, RuntimeError>
    where
        F: FnOnce(oneshot::Sender<T>) -> RuntimeCommand,
    {
        let (tx, rx) = oneshot::channel();
        self.runtime_tx
            .send(make(tx))
            .await
            .map_err(|_| RuntimeError::ChannelClosed)?;
        rx.await.map_err(|_| RuntimeError::ChannelClosed)
    }
}
