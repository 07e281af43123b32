//! Destinations for rendered log records.
//!
//! A sink receives one fully rendered record per call and must write it with
//! a single write so records from different actors never interleave inside a
//! block.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use serde::Serialize;
use thiserror::Error;

use crate::config::{SinkConfig, SinkFailure};

/// A sink could not accept a record. The ledger is unaffected.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[error("sink '{sink}' failed: {reason}")]
pub struct SinkWriteError {
    pub sink: String,
    pub reason: String,
}

impl SinkWriteError {
    pub fn new(sink: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            sink: sink.into(),
            reason: reason.into(),
        }
    }
}

/// What the logger does with a record a sink refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePolicy {
    Drop,
    Retry { attempts: u32 },
}

impl FailurePolicy {
    /// Total number of writes tried for one record.
    pub fn max_writes(&self) -> u32 {
        match self {
            FailurePolicy::Drop => 1,
            FailurePolicy::Retry { attempts } => attempts.saturating_add(1),
        }
    }
}

impl From<&SinkConfig> for FailurePolicy {
    fn from(config: &SinkConfig) -> Self {
        match config.failure {
            SinkFailure::Drop => FailurePolicy::Drop,
            SinkFailure::Retry => FailurePolicy::Retry {
                attempts: config.retries,
            },
        }
    }
}

pub trait LogSink: Send {
    fn name(&self) -> &str;

    /// Writes one rendered record followed by a newline.
    fn write_record(&mut self, rendered: &str) -> Result<(), SinkWriteError>;

    fn flush(&mut self) -> Result<(), SinkWriteError> {
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct StdoutSink;

impl LogSink for StdoutSink {
    fn name(&self) -> &str {
        "stdout"
    }

    fn write_record(&mut self, rendered: &str) -> Result<(), SinkWriteError> {
        let line = format!("{}\n", rendered);
        std::io::stdout()
            .lock()
            .write_all(line.as_bytes())
            .map_err(|e| SinkWriteError::new(self.name(), e.to_string()))
    }

    fn flush(&mut self) -> Result<(), SinkWriteError> {
        std::io::stdout()
            .flush()
            .map_err(|e| SinkWriteError::new(self.name(), e.to_string()))
    }
}

/// Appends records to a file. The file is opened on first use and reopened
/// after a failed write.
#[derive(Debug)]
pub struct FileSink {
    name: String,
    path: PathBuf,
    file: Option<File>,
}

impl FileSink {
    pub fn new(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        Self {
            name: format!("file:{}", path.display()),
            path,
            file: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn open(&mut self) -> Result<&mut File, SinkWriteError> {
        if self.file.is_none() {
            if let Some(parent) = self.path.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)
                        .map_err(|e| SinkWriteError::new(&self.name, e.to_string()))?;
                }
            }
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.path)
                .map_err(|e| SinkWriteError::new(&self.name, e.to_string()))?;
            self.file = Some(file);
        }
        self.file
            .as_mut()
            .ok_or_else(|| SinkWriteError::new(&self.name, "file handle unavailable"))
    }
}

impl LogSink for FileSink {
    fn name(&self) -> &str {
        &self.name
    }

    fn write_record(&mut self, rendered: &str) -> Result<(), SinkWriteError> {
        let line = format!("{}\n", rendered);
        let file = self.open()?;
        if let Err(e) = file.write_all(line.as_bytes()) {
            self.file = None;
            return Err(SinkWriteError::new(&self.name, e.to_string()));
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<(), SinkWriteError> {
        match self.file.as_mut() {
            Some(file) => file
                .flush()
                .map_err(|e| SinkWriteError::new(&self.name, e.to_string())),
            None => Ok(()),
        }
    }
}

/// An in-memory sink that can be switched off, for embedding and tests.
///
/// Clones share the same buffer and switch.
#[derive(Debug, Clone)]
pub struct MemorySink {
    name: String,
    records: Arc<Mutex<Vec<String>>>,
    available: Arc<AtomicBool>,
}

impl Default for MemorySink {
    fn default() -> Self {
        Self::new("memory")
    }
}

impl MemorySink {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            records: Arc::new(Mutex::new(Vec::new())),
            available: Arc::new(AtomicBool::new(true)),
        }
    }

    /// While unavailable every write fails.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub fn records(&self) -> Vec<String> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Every line of every record, in write order.
    pub fn lines(&self) -> Vec<String> {
        self.records()
            .iter()
            .flat_map(|record| record.lines().map(str::to_string).collect::<Vec<_>>())
            .collect()
    }
}

impl LogSink for MemorySink {
    fn name(&self) -> &str {
        &self.name
    }

    fn write_record(&mut self, rendered: &str) -> Result<(), SinkWriteError> {
        if !self.available.load(Ordering::SeqCst) {
            return Err(SinkWriteError::new(&self.name, "sink unavailable"));
        }
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(rendered.to_string());
        Ok(())
    }
}
