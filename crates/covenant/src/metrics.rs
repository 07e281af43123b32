use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::RwLock;

use crate::actor::ActorError;

/// How a single operation on an actor ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionOutcome {
    Committed,
    /// An HTTP request that left state untouched.
    ReadOnly,
    Rejected,
    Faulted,
    /// Refused before running, e.g. on an already faulted actor.
    Refused,
}

impl TransitionOutcome {
    pub fn from_error(error: &ActorError) -> Self {
        match error {
            ActorError::ContractViolation(_) => TransitionOutcome::Rejected,
            ActorError::HandlerFault(_) | ActorError::InitRejected(_) => {
                TransitionOutcome::Faulted
            }
            _ => TransitionOutcome::Refused,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct TransitionMetrics {
    pub committed: u64,
    pub read_only: u64,
    pub contract_rejections: u64,
    pub handler_faults: u64,
    pub refused: u64,
    #[serde(with = "duration_serde")]
    pub total_processing_time: Duration,
    #[serde(with = "duration_serde")]
    pub max_processing_time: Duration,
    #[serde(with = "option_duration_serde")]
    pub min_processing_time: Option<Duration>,
}

impl TransitionMetrics {
    pub fn total(&self) -> u64 {
        self.committed + self.read_only + self.contract_rejections + self.handler_faults + self.refused
    }

    pub fn stats(&self) -> TransitionStats {
        let total = self.total();
        if total == 0 {
            return TransitionStats::default();
        }
        TransitionStats {
            acceptance_rate: ((self.committed + self.read_only) as f64 / total as f64) * 100.0,
            avg_processing_time: self.total_processing_time.div_f64(total as f64),
            total_operations: total,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ActorMetrics {
    pub transitions: TransitionMetrics,
    /// Derived from `transitions` when the metrics are read.
    pub stats: TransitionStats,
    #[serde(with = "option_timestamp_serde")]
    pub last_update: Option<SystemTime>,
    pub uptime_secs: u64,
    #[serde(with = "timestamp_serde")]
    pub start_time: SystemTime,
}

impl Default for ActorMetrics {
    fn default() -> Self {
        Self {
            transitions: TransitionMetrics::default(),
            stats: TransitionStats::default(),
            last_update: None,
            uptime_secs: 0,
            start_time: SystemTime::now(),
        }
    }
}

mod timestamp_serde {
    use serde::Serializer;
    use std::time::{SystemTime, UNIX_EPOCH};

    pub fn serialize<S>(time: &SystemTime, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let timestamp = time
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        serializer.serialize_u64(timestamp)
    }
}

mod option_timestamp_serde {
    use serde::Serializer;
    use std::time::{SystemTime, UNIX_EPOCH};

    pub fn serialize<S>(time: &Option<SystemTime>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match time {
            Some(t) => {
                let timestamp = t.duration_since(UNIX_EPOCH).unwrap_or_default().as_secs();
                serializer.serialize_some(&timestamp)
            }
            None => serializer.serialize_none(),
        }
    }
}

mod duration_serde {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_nanos() as u64)
    }
}

mod option_duration_serde {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match duration {
            Some(d) => serializer.serialize_some(&(d.as_nanos() as u64)),
            None => serializer.serialize_none(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TransitionStats {
    /// Percentage of operations that committed or answered read-only.
    pub acceptance_rate: f64,
    #[serde(with = "duration_serde")]
    pub avg_processing_time: Duration,
    pub total_operations: u64,
}

#[derive(Debug, Clone)]
pub struct MetricsCollector {
    metrics: Arc<RwLock<ActorMetrics>>,
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            metrics: Arc::new(RwLock::new(ActorMetrics::default())),
        }
    }

    pub async fn record_transition(&self, outcome: TransitionOutcome, duration: Duration) {
        let mut metrics = self.metrics.write().await;
        let transitions = &mut metrics.transitions;
        match outcome {
            TransitionOutcome::Committed => transitions.committed += 1,
            TransitionOutcome::ReadOnly => transitions.read_only += 1,
            TransitionOutcome::Rejected => transitions.contract_rejections += 1,
            TransitionOutcome::Faulted => transitions.handler_faults += 1,
            TransitionOutcome::Refused => transitions.refused += 1,
        }
        transitions.total_processing_time += duration;
        transitions.max_processing_time = transitions.max_processing_time.max(duration);
        transitions.min_processing_time = Some(
            transitions
                .min_processing_time
                .map_or(duration, |min| min.min(duration)),
        );
        metrics.last_update = Some(SystemTime::now());
        metrics.uptime_secs = SystemTime::now()
            .duration_since(metrics.start_time)
            .unwrap_or_default()
            .as_secs();
    }

    pub async fn get_metrics(&self) -> ActorMetrics {
        let mut metrics = self.metrics.write().await;
        metrics.uptime_secs = SystemTime::now()
            .duration_since(metrics.start_time)
            .unwrap_or_default()
            .as_secs();
        metrics.stats = metrics.transitions.stats();
        metrics.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::{ContractKind, ContractViolation, RejectionReason};
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_record_transitions() {
        let collector = MetricsCollector::new();
        collector
            .record_transition(TransitionOutcome::Committed, Duration::from_millis(4))
            .await;
        collector
            .record_transition(TransitionOutcome::Rejected, Duration::from_millis(2))
            .await;
        collector
            .record_transition(TransitionOutcome::Committed, Duration::from_millis(6))
            .await;

        let metrics = collector.get_metrics().await;
        assert_eq!(metrics.transitions.committed, 2);
        assert_eq!(metrics.transitions.contract_rejections, 1);
        assert_eq!(metrics.transitions.max_processing_time, Duration::from_millis(6));
        assert_eq!(
            metrics.transitions.min_processing_time,
            Some(Duration::from_millis(2))
        );
        assert!(metrics.last_update.is_some());

        let stats = metrics.stats;
        assert_eq!(stats.total_operations, 3);
        assert_eq!(stats.avg_processing_time, Duration::from_millis(4));
        assert!((stats.acceptance_rate - 200.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_outcome_from_error() {
        let violation = ContractViolation::new(ContractKind::State, RejectionReason::Rejected);
        assert_eq!(
            TransitionOutcome::from_error(&ActorError::ContractViolation(violation)),
            TransitionOutcome::Rejected
        );
        assert_eq!(
            TransitionOutcome::from_error(&ActorError::Faulted {
                reason: "x".to_string()
            }),
            TransitionOutcome::Refused
        );
    }

    #[test]
    fn test_metrics_serialize() {
        let json = serde_json::to_value(ActorMetrics::default()).unwrap();
        assert_eq!(json["transitions"]["committed"], 0);
        assert!(json["transitions"]["min_processing_time"].is_null());
        assert_eq!(json["stats"]["total_operations"], 0);
    }
}
