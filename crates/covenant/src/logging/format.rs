//! Text formats of the chain logger.
//!
//! The commit block and the supplementary line are stable formats: audits
//! and tooling parse them, so changes here are breaking changes.

use chrono::{DateTime, Utc};
use covenant_chain::{digest, ChainHash, CommitRecord, EventData};
use std::fmt::Write;

use crate::config::LogLevel;

pub const DELIMITER: &str = "----------------------------------";

/// Bytes shown in a DATA preview before truncating.
const PREVIEW_BYTES: usize = 32;

/// A supplementary log entry. Carries no chain guarantees of its own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub level: LogLevel,
    pub timestamp: DateTime<Utc>,
    pub message: String,
    pub chain: Option<ChainHash>,
}

impl LogEntry {
    pub fn new(level: LogLevel, message: impl Into<String>, chain: Option<ChainHash>) -> Self {
        Self {
            level,
            timestamp: Utc::now(),
            message: message.into(),
            chain,
        }
    }
}

/// Renders the CHAIN COMMIT block for `record`, without a trailing newline.
pub fn render_commit(record: &CommitRecord) -> String {
    let mut out = String::new();
    // Writing to a String cannot fail.
    let _ = write_commit(&mut out, record);
    out
}

fn write_commit(out: &mut String, record: &CommitRecord) -> std::fmt::Result {
    writeln!(out, "{}", DELIMITER)?;
    writeln!(out, "CHAIN COMMIT #{}", record.hash)?;
    writeln!(out, "TIMESTAMP: {}", record.timestamp.to_rfc3339())?;
    writeln!(out, "ACTOR: {}", record.actor)?;
    writeln!(out, "TYPE: {}", record.event_type)?;
    writeln!(out, "DATA:")?;
    match &record.data {
        EventData::Init { state } => {
            writeln!(out, "  state: {}", describe(state))?;
        }
        EventData::MessageHandled { message, state } => {
            writeln!(out, "  message: {}", describe(message))?;
            writeln!(out, "  state: {}", describe(state))?;
        }
        EventData::HttpHandled {
            request,
            response_digest,
            state,
        } => {
            writeln!(out, "  request: {}", describe(request))?;
            writeln!(out, "  response: #{}", response_digest)?;
            writeln!(out, "  state: {}", describe(state))?;
        }
    }
    writeln!(out, "PARENT: #{}", record.parent_hash)?;
    write!(out, "{}", DELIMITER)
}

/// Renders a one-line supplementary entry.
pub fn render_entry(entry: &LogEntry) -> String {
    let mut line = format!(
        "[{}] {} {}",
        entry.level,
        entry.timestamp.to_rfc3339(),
        entry.message
    );
    if let Some(hash) = entry.chain {
        let _ = write!(line, " (chain: #{})", hash);
    }
    line
}

/// `<preview> (<n> bytes, #<digest>)`
fn describe(bytes: &[u8]) -> String {
    format!("{} ({} bytes, #{})", preview(bytes), bytes.len(), digest(bytes))
}

fn preview(bytes: &[u8]) -> String {
    if bytes.is_empty() {
        return "<empty>".to_string();
    }
    if let Ok(text) = std::str::from_utf8(bytes) {
        if bytes.len() <= PREVIEW_BYTES && !text.chars().any(char::is_control) {
            return format!("{:?}", text);
        }
    }
    let shown = &bytes[..bytes.len().min(PREVIEW_BYTES)];
    if shown.len() < bytes.len() {
        format!("0x{}...", hex::encode(shown))
    } else {
        format!("0x{}", hex::encode(shown))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use covenant_chain::{ActorId, Ledger, LogicalClock, PendingCommit};
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    fn ledger() -> Ledger {
        Ledger::with_clock(Arc::new(LogicalClock::from_unix_epoch()))
    }

    #[test]
    fn test_render_init_commit() {
        let ledger = ledger();
        let record = ledger.append(PendingCommit::new(
            ActorId::from("counter"),
            EventData::Init { state: vec![0x00] },
        ));

        let rendered = render_commit(&record);
        let expected = format!(
            "{d}\nCHAIN COMMIT #{hash}\nTIMESTAMP: 1970-01-01T00:00:00+00:00\nACTOR: counter\nTYPE: INIT\nDATA:\n  state: 0x00 (1 bytes, #{sd})\nPARENT: #0000000000000000000000000000000000000000\n{d}",
            d = DELIMITER,
            hash = record.hash,
            sd = digest(&[0x00]),
        );
        assert_eq!(rendered, expected);
    }

    #[test]
    fn test_render_message_commit_links_parent() {
        let ledger = ledger();
        let actor = ActorId::from("greeter");
        let init = ledger.append(PendingCommit::new(
            actor.clone(),
            EventData::Init { state: Vec::new() },
        ));
        let next = ledger.append(PendingCommit::new(
            actor,
            EventData::MessageHandled {
                message: b"hello".to_vec(),
                state: b"hello".to_vec(),
            },
        ));

        let rendered = render_commit(&next);
        let lines: Vec<&str> = rendered.lines().collect();
        assert_eq!(lines[4], "TYPE: MESSAGE_HANDLED");
        assert_eq!(lines[6], format!("  message: \"hello\" (5 bytes, #{})", digest(b"hello")));
        assert_eq!(lines[8], format!("PARENT: #{}", init.hash));
        assert_eq!(lines.len(), 10);
        assert!(render_commit(&init).contains("  state: <empty> (0 bytes, #"));
    }

    #[test]
    fn test_render_http_commit() {
        let ledger = ledger();
        let record = ledger.append(PendingCommit::new(
            ActorId::from("web"),
            EventData::HttpHandled {
                request: b"POST /".to_vec(),
                response_digest: digest(b"ok"),
                state: vec![1],
            },
        ));
        let rendered = render_commit(&record);
        assert!(rendered.contains("TYPE: HTTP_HANDLED"));
        assert!(rendered.contains(&format!("  response: #{}", digest(b"ok"))));
    }

    #[test]
    fn test_long_previews_are_truncated() {
        let bytes = vec![0xab; 40];
        assert_eq!(preview(&bytes), format!("0x{}...", "ab".repeat(32)));
        assert_eq!(preview(b"line\nbreak"), "0x6c696e650a627265616b");
    }

    #[test]
    fn test_render_entry() {
        let timestamp = DateTime::<Utc>::UNIX_EPOCH;
        let entry = LogEntry {
            level: LogLevel::Warn,
            timestamp,
            message: "CONTRACT_REJECTED actor=a".to_string(),
            chain: Some(ChainHash::GENESIS),
        };
        assert_eq!(
            render_entry(&entry),
            "[WARN] 1970-01-01T00:00:00+00:00 CONTRACT_REJECTED actor=a (chain: #0000000000000000000000000000000000000000)"
        );

        let plain = LogEntry {
            chain: None,
            ..entry
        };
        assert_eq!(
            render_entry(&plain),
            "[WARN] 1970-01-01T00:00:00+00:00 CONTRACT_REJECTED actor=a"
        );
    }
}
