//! # Logging
//!
//! Two separate streams. The chain logger renders every commit in the
//! stable CHAIN COMMIT format plus leveled supplementary lines; `tracing`
//! carries the runtime's own diagnostics.

pub mod format;
pub mod logger;
pub mod sink;
pub mod subscriber;

pub use format::{render_commit, render_entry, LogEntry, DELIMITER};
pub use logger::{ChainLogger, LoggerStatsSnapshot, LoggerTask};
pub use sink::{FailurePolicy, FileSink, LogSink, MemorySink, SinkWriteError, StdoutSink};
pub use subscriber::setup_global_logging;
