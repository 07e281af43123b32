//! # Chain Logger
//!
//! Renders commits and supplementary entries off the transition path. Every
//! [`ChainLogger`] clone feeds one bounded queue drained by a single task,
//! so records reach each sink in the order they were enqueued, and records
//! for one actor are always enqueued in commit order by that actor's lane.
//!
//! Nothing here can fail a transition. A full queue loses the rendered
//! record (counted), and a failing sink reports a [`SinkWriteError`] on the
//! side channel; the commit itself is already in the ledger.
//!
//! Commits are also published as records, unrendered, to
//! [`ChainLogger::subscribe_commits`] and kept in a bounded history. Neither
//! depends on the queue or the sinks.

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use covenant_chain::{ActorId, ChainHash, CommitRecord};
use serde::Serialize;
use tokio::sync::mpsc::error::{SendTimeoutError, TrySendError};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::format::{render_commit, render_entry, LogEntry};
use super::sink::{FailurePolicy, FileSink, LogSink, SinkWriteError, StdoutSink};
use crate::config::{ConfigError, LogLevel, LogOutput, LoggingConfig, QueuePolicy};
use crate::contract::ContractViolation;
use crate::shutdown::{ShutdownController, ShutdownReceiver, ShutdownType};

const ERROR_CHANNEL_CAPACITY: usize = 64;
const COMMIT_CHANNEL_CAPACITY: usize = 1024;

#[derive(Debug)]
enum LogMessage {
    Commit(CommitRecord),
    Entry(LogEntry),
    Flush(oneshot::Sender<()>),
}

#[derive(Debug)]
struct LoggerSettings {
    chain_events: bool,
    level: LogLevel,
    queue_policy: QueuePolicy,
    block_timeout: Duration,
}

#[derive(Debug, Default)]
struct LoggerStats {
    rendered: AtomicU64,
    dropped: AtomicU64,
    sink_failures: AtomicU64,
    retries: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LoggerStatsSnapshot {
    /// Records handed to the sinks.
    pub rendered: u64,
    /// Records lost because the queue was full or closed.
    pub dropped: u64,
    /// Sink writes that failed after all retries.
    pub sink_failures: u64,
    pub retries: u64,
}

/// Every commit seen by the logger, as records.
#[derive(Debug)]
struct CommitFeed {
    tx: broadcast::Sender<CommitRecord>,
    history: Mutex<VecDeque<CommitRecord>>,
    limit: usize,
}

impl CommitFeed {
    fn new(limit: usize) -> Self {
        let (tx, _) = broadcast::channel(COMMIT_CHANNEL_CAPACITY);
        Self {
            tx,
            history: Mutex::new(VecDeque::with_capacity(limit)),
            limit,
        }
    }

    fn publish(&self, record: &CommitRecord) {
        if self.limit > 0 {
            let mut history = self.history.lock().unwrap_or_else(PoisonError::into_inner);
            if history.len() >= self.limit {
                history.pop_front();
            }
            history.push_back(record.clone());
        }
        // No subscribers is fine.
        let _ = self.tx.send(record.clone());
    }

    fn recent(&self) -> Vec<CommitRecord> {
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }
}

#[derive(Clone)]
pub struct ChainLogger {
    tx: Option<mpsc::Sender<LogMessage>>,
    settings: Arc<LoggerSettings>,
    stats: Arc<LoggerStats>,
    errors: broadcast::Sender<SinkWriteError>,
    commits: Arc<CommitFeed>,
}

impl fmt::Debug for ChainLogger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChainLogger")
            .field("enabled", &self.tx.is_some())
            .field("settings", &self.settings)
            .finish()
    }
}

/// The task behind a [`ChainLogger`].
///
/// Dropping this detaches the task; it then stops once every logger clone
/// is gone.
pub struct LoggerTask {
    handle: JoinHandle<()>,
    shutdown: ShutdownController,
}

impl LoggerTask {
    /// Stops the task. A graceful shutdown writes everything still queued.
    pub async fn shutdown(self, shutdown_type: ShutdownType) {
        self.shutdown.signal_shutdown(shutdown_type).await;
        if let Err(e) = self.handle.await {
            error!("Chain logger task failed: {}", e);
        }
    }
}

impl ChainLogger {
    /// Starts the logging task writing to `sinks`. Must be called inside a
    /// tokio runtime.
    pub fn spawn(config: &LoggingConfig, sinks: Vec<Box<dyn LogSink>>) -> (Self, LoggerTask) {
        let (tx, rx) = mpsc::channel(config.queue.capacity.max(1));
        let (errors, _) = broadcast::channel(ERROR_CHANNEL_CAPACITY);
        let stats = Arc::new(LoggerStats::default());
        let mut shutdown = ShutdownController::new();

        let worker = LoggerWorker {
            rx,
            sinks,
            policy: FailurePolicy::from(&config.sink),
            stats: stats.clone(),
            errors: errors.clone(),
        };
        let handle = tokio::spawn(worker.run(shutdown.subscribe()));

        let logger = Self {
            tx: Some(tx),
            settings: Arc::new(LoggerSettings {
                chain_events: config.chain_events,
                level: config.level,
                queue_policy: config.queue.policy,
                block_timeout: config.queue.block_timeout(),
            }),
            stats,
            errors,
            commits: Arc::new(CommitFeed::new(config.history)),
        };
        (logger, LoggerTask { handle, shutdown })
    }

    /// Starts a logger writing to the sink named by `config.output`.
    pub fn from_config(config: &LoggingConfig) -> Result<(Self, LoggerTask), ConfigError> {
        let sink: Box<dyn LogSink> = match config.output {
            LogOutput::Stdout => Box::new(StdoutSink),
            LogOutput::File => {
                let path = config.file_path.as_ref().ok_or_else(|| {
                    ConfigError::Invalid("file output requires logging.file_path".to_string())
                })?;
                Box::new(FileSink::new(path))
            }
        };
        Ok(Self::spawn(config, vec![sink]))
    }

    /// A logger that discards everything. Used where no output is wanted,
    /// such as replaying a chain.
    pub fn disabled() -> Self {
        let (errors, _) = broadcast::channel(1);
        Self {
            tx: None,
            settings: Arc::new(LoggerSettings {
                chain_events: false,
                level: LogLevel::Error,
                queue_policy: QueuePolicy::Drop,
                block_timeout: Duration::ZERO,
            }),
            stats: Arc::new(LoggerStats::default()),
            errors,
            commits: Arc::new(CommitFeed::new(0)),
        }
    }

    /// Publishes a commit to subscribers and the history, then queues its
    /// rendering unless chain events are switched off.
    pub async fn log_commit(&self, record: &CommitRecord) {
        self.commits.publish(record);
        if !self.settings.chain_events {
            return;
        }
        self.enqueue(LogMessage::Commit(record.clone())).await;
    }

    /// Every commit from now on, in the order the lanes committed them.
    /// A subscriber that falls more than 1024 records behind sees
    /// `RecvError::Lagged`.
    pub fn subscribe_commits(&self) -> broadcast::Receiver<CommitRecord> {
        self.commits.tx.subscribe()
    }

    /// The most recent commits, oldest first, up to `logging.history`.
    pub fn recent_commits(&self) -> Vec<CommitRecord> {
        self.commits.recent()
    }

    pub async fn log_supplementary(
        &self,
        level: LogLevel,
        message: impl Into<String>,
        chain: Option<ChainHash>,
    ) {
        if level < self.settings.level {
            return;
        }
        self.enqueue(LogMessage::Entry(LogEntry::new(level, message, chain)))
            .await;
    }

    /// Records a rejected transition, correlated to the unchanged tip.
    pub async fn log_rejection(
        &self,
        actor: &ActorId,
        violation: &ContractViolation,
        input_digest: ChainHash,
        tip: ChainHash,
    ) {
        let message = format!(
            "CONTRACT_REJECTED actor={} contract={} reason={} message=#{}",
            actor,
            violation.kind.tag(),
            violation.reason,
            input_digest
        );
        self.log_supplementary(LogLevel::Warn, message, Some(tip))
            .await;
    }

    pub async fn log_handler_fault(&self, actor: &ActorId, reason: &str, tip: ChainHash) {
        let message = format!("HANDLER_FAULT actor={} reason={}", actor, reason);
        self.log_supplementary(LogLevel::Error, message, Some(tip))
            .await;
    }

    /// A failed init has no commit to correlate with.
    pub async fn log_init_fault(&self, actor: &ActorId, reason: &str) {
        let message = format!("INIT_FAULTED actor={} reason={}", actor, reason);
        self.log_supplementary(LogLevel::Error, message, None).await;
    }

    /// An actor's own `log` line. Never waits for queue space.
    pub fn log_actor(&self, actor: &ActorId, message: &str) {
        if LogLevel::Info < self.settings.level {
            return;
        }
        let entry = LogEntry::new(LogLevel::Info, format!("[{}] {}", actor, message), None);
        self.try_enqueue(LogMessage::Entry(entry));
    }

    /// Waits until everything enqueued before this call has been written.
    pub async fn flush(&self) {
        let Some(tx) = &self.tx else {
            return;
        };
        let (ack_tx, ack_rx) = oneshot::channel();
        if tx.send(LogMessage::Flush(ack_tx)).await.is_err() {
            debug!("Chain logger already stopped, nothing to flush");
            return;
        }
        let _ = ack_rx.await;
    }

    /// Side channel for sink failures.
    pub fn subscribe_errors(&self) -> broadcast::Receiver<SinkWriteError> {
        self.errors.subscribe()
    }

    pub fn stats(&self) -> LoggerStatsSnapshot {
        LoggerStatsSnapshot {
            rendered: self.stats.rendered.load(Ordering::Relaxed),
            dropped: self.stats.dropped.load(Ordering::Relaxed),
            sink_failures: self.stats.sink_failures.load(Ordering::Relaxed),
            retries: self.stats.retries.load(Ordering::Relaxed),
        }
    }

    async fn enqueue(&self, message: LogMessage) {
        let Some(tx) = &self.tx else {
            return;
        };
        match self.settings.queue_policy {
            QueuePolicy::Drop => self.try_enqueue(message),
            QueuePolicy::Block => {
                match tx.send_timeout(message, self.settings.block_timeout).await {
                    Ok(()) => {}
                    Err(SendTimeoutError::Timeout(_)) => self.record_drop("queue full"),
                    Err(SendTimeoutError::Closed(_)) => self.record_drop("logger stopped"),
                }
            }
        }
    }

    fn try_enqueue(&self, message: LogMessage) {
        let Some(tx) = &self.tx else {
            return;
        };
        match tx.try_send(message) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => self.record_drop("queue full"),
            Err(TrySendError::Closed(_)) => self.record_drop("logger stopped"),
        }
    }

    fn record_drop(&self, cause: &str) {
        let lost = self.stats.dropped.fetch_add(1, Ordering::Relaxed) + 1;
        warn!("Chain logger dropped a record ({}), {} lost so far", cause, lost);
    }
}

struct LoggerWorker {
    rx: mpsc::Receiver<LogMessage>,
    sinks: Vec<Box<dyn LogSink>>,
    policy: FailurePolicy,
    stats: Arc<LoggerStats>,
    errors: broadcast::Sender<SinkWriteError>,
}

impl LoggerWorker {
    async fn run(mut self, mut shutdown: ShutdownReceiver) {
        info!("Chain logger started with {} sink(s)", self.sinks.len());
        loop {
            tokio::select! {
                biased;

                message = self.rx.recv() => match message {
                    Some(message) => self.write(message),
                    None => {
                        debug!("All chain logger handles dropped");
                        break;
                    }
                },

                signal = shutdown.wait_for_shutdown() => {
                    self.rx.close();
                    match signal.shutdown_type {
                        ShutdownType::Graceful => {
                            while let Ok(message) = self.rx.try_recv() {
                                self.write(message);
                            }
                        }
                        ShutdownType::Force => {
                            let mut abandoned = 0;
                            while self.rx.try_recv().is_ok() {
                                abandoned += 1;
                            }
                            self.stats.dropped.fetch_add(abandoned, Ordering::Relaxed);
                            if abandoned > 0 {
                                warn!("Chain logger abandoned {} queued records", abandoned);
                            }
                        }
                    }
                    self.flush_sinks();
                    signal.acknowledge();
                    info!("Chain logger stopped");
                    return;
                }
            }
        }
        self.flush_sinks();
        info!("Chain logger stopped");
    }

    fn write(&mut self, message: LogMessage) {
        let rendered = match message {
            LogMessage::Commit(record) => render_commit(&record),
            LogMessage::Entry(entry) => render_entry(&entry),
            LogMessage::Flush(ack) => {
                self.flush_sinks();
                let _ = ack.send(());
                return;
            }
        };

        for sink in self.sinks.iter_mut() {
            let max_writes = self.policy.max_writes();
            let mut attempt = 1;
            loop {
                match sink.write_record(&rendered) {
                    Ok(()) => break,
                    Err(err) if attempt < max_writes => {
                        debug!("Retrying write to {} after: {}", sink.name(), err);
                        self.stats.retries.fetch_add(1, Ordering::Relaxed);
                        attempt += 1;
                    }
                    Err(err) => {
                        self.stats.sink_failures.fetch_add(1, Ordering::Relaxed);
                        warn!("Dropping log record: {}", err);
                        // No subscribers is fine.
                        let _ = self.errors.send(err);
                        break;
                    }
                }
            }
        }
        self.stats.rendered.fetch_add(1, Ordering::Relaxed);
    }

    fn flush_sinks(&mut self) {
        for sink in self.sinks.iter_mut() {
            if let Err(err) = sink.flush() {
                warn!("Failed to flush log sink: {}", err);
                let _ = self.errors.send(err);
            }
        }
    }
}
