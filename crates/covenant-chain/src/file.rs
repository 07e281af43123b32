use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

use crate::error::{ChainIntegrityError, ChainStoreError};
use crate::event::CommitRecord;
use crate::id::ActorId;

/// An actor chain as written to disk.
///
/// Loading never implies trust: call [`ChainFile::audit`] before relying on it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainFile {
    pub actor: ActorId,
    pub records: Vec<CommitRecord>,
}

impl ChainFile {
    pub fn new(actor: ActorId, records: Vec<CommitRecord>) -> Self {
        Self { actor, records }
    }

    /// Writes the chain as pretty-printed JSON.
    pub fn save(&self, path: &Path) -> Result<(), ChainStoreError> {
        let json = serde_json::to_string_pretty(self)?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| ChainStoreError::Io {
                path: parent.display().to_string(),
                source,
            })?;
        }
        std::fs::write(path, json).map_err(|source| ChainStoreError::Io {
            path: path.display().to_string(),
            source,
        })?;
        debug!(
            "Saved {} records for actor [{}] to {}",
            self.records.len(),
            self.actor,
            path.display()
        );
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self, ChainStoreError> {
        let content = std::fs::read_to_string(path).map_err(|source| ChainStoreError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Audits the records and checks they all belong to the named actor.
    pub fn audit(&self) -> Result<(), ChainIntegrityError> {
        if let Some((index, record)) = self
            .records
            .iter()
            .enumerate()
            .find(|(_, record)| record.actor != self.actor)
        {
            return Err(ChainIntegrityError::ForeignRecord {
                index,
                hash: record.hash,
                expected: self.actor.clone(),
                found: record.actor.clone(),
            });
        }
        crate::chain::audit(&self.records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::Ledger;
    use crate::event::{EventData, PendingCommit};

    fn sample_chain() -> ChainFile {
        let ledger = Ledger::new();
        let actor = ActorId::from("counter");
        ledger.append(PendingCommit::new(
            actor.clone(),
            EventData::Init { state: vec![0] },
        ));
        ledger.append(PendingCommit::new(
            actor.clone(),
            EventData::MessageHandled {
                message: vec![1],
                state: vec![0, 1],
            },
        ));
        ChainFile::new(actor.clone(), ledger.chain(&actor))
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chains").join("counter.json");
        let file = sample_chain();
        file.save(&path).unwrap();

        let loaded = ChainFile::load(&path).unwrap();
        assert_eq!(loaded, file);
        assert!(loaded.audit().is_ok());
    }

    #[test]
    fn test_edited_file_fails_audit() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("counter.json");
        sample_chain().save(&path).unwrap();

        // State [0, 1] is stored as the hex string "0001".
        let content = std::fs::read_to_string(&path).unwrap();
        std::fs::write(&path, content.replace("\"0001\"", "\"0002\"")).unwrap();

        let loaded = ChainFile::load(&path).unwrap();
        let err = loaded.audit().unwrap_err();
        assert_eq!(err.index(), 1);
    }

    #[test]
    fn test_actor_mismatch_fails_audit() {
        let mut file = sample_chain();
        file.actor = ActorId::from("someone-else");
        assert!(matches!(
            file.audit(),
            Err(ChainIntegrityError::ForeignRecord { index: 0, .. })
        ));
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            ChainFile::load(&dir.path().join("nope.json")),
            Err(ChainStoreError::Io { .. })
        ));
    }
}
