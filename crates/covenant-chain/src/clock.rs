use chrono::{DateTime, TimeZone, Utc};
use std::fmt::Debug;
use std::sync::atomic::{AtomicI64, Ordering};

/// Source of commit timestamps.
///
/// The timestamp is part of every record's hash, so reproducing a chain
/// byte-for-byte requires a deterministic clock.
pub trait Clock: Send + Sync + Debug {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A deterministic clock: a fixed epoch advanced by one millisecond per reading.
#[derive(Debug)]
pub struct LogicalClock {
    next_millis: AtomicI64,
}

impl LogicalClock {
    pub fn new(epoch: DateTime<Utc>) -> Self {
        Self {
            next_millis: AtomicI64::new(epoch.timestamp_millis()),
        }
    }

    /// Starts at the Unix epoch.
    pub fn from_unix_epoch() -> Self {
        Self::new(DateTime::<Utc>::UNIX_EPOCH)
    }
}

impl Clock for LogicalClock {
    fn now(&self) -> DateTime<Utc> {
        let millis = self.next_millis.fetch_add(1, Ordering::SeqCst);
        Utc.timestamp_millis_opt(millis)
            .single()
            .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_logical_clock_ticks() {
        let clock = LogicalClock::from_unix_epoch();
        let first = clock.now();
        let second = clock.now();
        assert_eq!(first.timestamp_millis(), 0);
        assert_eq!(second.timestamp_millis(), 1);
    }

    #[test]
    fn test_two_logical_clocks_agree() {
        let a = LogicalClock::from_unix_epoch();
        let b = LogicalClock::from_unix_epoch();
        for _ in 0..5 {
            assert_eq!(a.now(), b.now());
        }
    }
}
