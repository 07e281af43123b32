//! # Replay
//!
//! Re-runs the inputs recorded in a chain against a fresh state machine and
//! checks that every transition reproduces the recorded state. A chain that
//! audits cleanly proves nobody edited it; a chain that also replays cleanly
//! proves the recorded states really follow from the recorded inputs.

use covenant_chain::{audit, digest, ActorId, ChainHash, ChainIntegrityError, CommitRecord, EventData};
use thiserror::Error;
use tracing::{debug, info};

use crate::actor::{ActorContext, ActorError, ActorMachine, Behavior, HttpReply};
use crate::contract::{ContractBudget, ContractEvaluator};
use crate::logging::ChainLogger;

#[derive(Error, Debug)]
pub enum ReplayError {
    #[error("chain is empty")]
    EmptyChain,

    #[error(transparent)]
    Integrity(#[from] ChainIntegrityError),

    #[error("record #{index} ({hash}): replay produced state #{replayed}, chain recorded #{recorded}")]
    StateDiverged {
        index: usize,
        hash: ChainHash,
        recorded: ChainHash,
        replayed: ChainHash,
    },

    #[error("record #{index} ({hash}): replay produced response #{replayed}, chain recorded #{recorded}")]
    ResponseDiverged {
        index: usize,
        hash: ChainHash,
        recorded: ChainHash,
        replayed: ChainHash,
    },

    #[error("record #{index} ({hash}): replayed request did not change state")]
    MissingTransition { index: usize, hash: ChainHash },

    #[error("record #{index} ({hash}): replay failed: {error}")]
    Failed {
        index: usize,
        hash: ChainHash,
        error: ActorError,
    },
}

impl ReplayError {
    /// Position of the record replay stopped at, if it got that far.
    pub fn index(&self) -> Option<usize> {
        match self {
            ReplayError::EmptyChain => None,
            ReplayError::Integrity(e) => Some(e.index()),
            ReplayError::StateDiverged { index, .. }
            | ReplayError::ResponseDiverged { index, .. }
            | ReplayError::MissingTransition { index, .. }
            | ReplayError::Failed { index, .. } => Some(*index),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplayReport {
    pub actor: ActorId,
    pub replayed: usize,
    pub final_state: Vec<u8>,
}

/// Audits `records`, then replays them against `behavior`.
pub fn replay_chain(
    behavior: Behavior,
    records: &[CommitRecord],
    budget: ContractBudget,
) -> Result<ReplayReport, ReplayError> {
    let first = records.first().ok_or(ReplayError::EmptyChain)?;
    audit(records)?;

    let actor = first.actor.clone();
    let context = ActorContext::new(actor.clone(), ChainLogger::disabled());
    let mut machine = ActorMachine::new(behavior, ContractEvaluator::new(budget), context);

    for (index, record) in records.iter().enumerate() {
        let failed = |error: ActorError| ReplayError::Failed {
            index,
            hash: record.hash,
            error,
        };

        let replayed = match &record.data {
            EventData::Init { .. } => machine.init().map_err(failed)?.pending.data,
            EventData::MessageHandled { message, .. } => {
                machine.handle(message.clone()).map_err(failed)?.pending.data
            }
            EventData::HttpHandled {
                request,
                response_digest,
                ..
            } => match machine.handle_http(request.clone()).map_err(failed)? {
                HttpReply::Committed {
                    response,
                    transition,
                } => {
                    let replayed = digest(&response);
                    if replayed != *response_digest {
                        return Err(ReplayError::ResponseDiverged {
                            index,
                            hash: record.hash,
                            recorded: *response_digest,
                            replayed,
                        });
                    }
                    transition.pending.data
                }
                HttpReply::ReadOnly { .. } => {
                    return Err(ReplayError::MissingTransition {
                        index,
                        hash: record.hash,
                    })
                }
            },
        };

        if replayed.state() != record.data.state() {
            return Err(ReplayError::StateDiverged {
                index,
                hash: record.hash,
                recorded: digest(record.data.state()),
                replayed: digest(replayed.state()),
            });
        }
        debug!("replayed record #{} ({})", index, record.hash.short());
    }

    let final_state = machine.state().map(<[u8]>::to_vec).unwrap_or_default();
    info!("Replayed {} records for actor {}", records.len(), actor);
    Ok(ReplayReport {
        actor,
        replayed: records.len(),
        final_state,
    })
}
