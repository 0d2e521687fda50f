use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use repsync_protocol::{
    DraftError, DraftRecord, DraftResult, DraftStorePort, SessionKey, SessionState,
};
use tokio::fs;
use tracing::{debug, instrument, warn};

/// Stores each draft as pretty JSON under `<root>/drafts/<key>.json`.
///
/// Writes go to a temp file and are renamed into place, so a reader never
/// sees a half-written draft. Writes for the same key are serialized.
#[derive(Debug)]
pub struct FileDraftStore {
    root: PathBuf,
    write_locks: Mutex<HashMap<SessionKey, Arc<tokio::sync::Mutex<()>>>>,
}

impl FileDraftStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            write_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn drafts_dir(&self) -> PathBuf {
        self.root.join("drafts")
    }

    fn draft_path(&self, key: &SessionKey) -> DraftResult<PathBuf> {
        let raw = key.as_str();
        let valid = !raw.is_empty()
            && !raw.starts_with('.')
            && raw
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | ':'));
        if !valid || raw.contains("..") {
            return Err(DraftError::InvalidKey(raw.to_owned()));
        }
        let file_name = format!("{}.json", raw.replace(':', "@"));
        Ok(self.drafts_dir().join(file_name))
    }

    fn lock_for(&self, key: &SessionKey) -> Arc<tokio::sync::Mutex<()>> {
        let mut guard = self.write_locks.lock();
        guard
            .entry(key.clone())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    async fn ensure_parent(path: &Path) -> DraftResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|error| classify_io(error, "failed creating drafts dir", parent))?;
        }
        Ok(())
    }
}

fn classify_io(error: io::Error, action: &str, path: &Path) -> DraftError {
    let message = format!("{action} {path:?}: {error}");
    match error.kind() {
        io::ErrorKind::PermissionDenied | io::ErrorKind::InvalidData => {
            DraftError::Permanent(message)
        }
        _ => DraftError::Transient(message),
    }
}

#[async_trait]
impl DraftStorePort for FileDraftStore {
    #[instrument(skip(self), fields(session_key = %key))]
    async fn load_draft(&self, key: &SessionKey) -> DraftResult<Option<DraftRecord>> {
        let path = self.draft_path(key)?;
        let raw = match fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(error) => return Err(classify_io(error, "failed reading draft", &path)),
        };

        let record: DraftRecord = serde_json::from_str(&raw)?;
        if record.session_key != *key {
            return Err(DraftError::Permanent(format!(
                "draft file {path:?} belongs to session {}",
                record.session_key
            )));
        }
        debug!(exercises = record.payload.len(), "draft file read");
        Ok(Some(record))
    }

    #[instrument(skip(self, payload), fields(session_key = %key))]
    async fn save_draft(
        &self,
        key: &SessionKey,
        payload: &SessionState,
    ) -> DraftResult<DraftRecord> {
        let path = self.draft_path(key)?;
        let lock = self.lock_for(key);
        let _guard = lock.lock().await;
        Self::ensure_parent(&path).await?;

        let record = DraftRecord::new(key.clone(), payload.clone());
        let encoded = serde_json::to_string_pretty(&record)?;
        let staging = path.with_extension("json.tmp");
        let written = match fs::write(&staging, encoded).await {
            Ok(()) => fs::rename(&staging, &path)
                .await
                .map_err(|error| classify_io(error, "failed replacing draft", &path)),
            Err(error) => Err(classify_io(error, "failed writing draft", &staging)),
        };
        if let Err(error) = written {
            if let Err(cleanup) = fs::remove_file(&staging).await
                && cleanup.kind() != io::ErrorKind::NotFound
            {
                warn!(path = ?staging, error = %cleanup, "failed removing staging file");
            }
            return Err(error);
        }

        debug!(path = ?path, "draft file written");
        Ok(record)
    }

    #[instrument(skip(self), fields(session_key = %key))]
    async fn discard_draft(&self, key: &SessionKey) -> DraftResult<bool> {
        let path = self.draft_path(key)?;
        let lock = self.lock_for(key);
        let removed = {
            let _guard = lock.lock().await;
            match fs::remove_file(&path).await {
                Ok(()) => Ok(true),
                Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(false),
                Err(error) => Err(classify_io(error, "failed removing draft", &path)),
            }
        };
        self.write_locks.lock().remove(key);
        removed
    }
}

#[cfg(test)]
mod tests {
    use std::time::{SystemTime, UNIX_EPOCH};

    use anyhow::Result;
    use repsync_protocol::{
        CardioEntry, ErrorKind, ExerciseDescriptor, ExerciseId, ExerciseState, ExerciseTracking,
        SetEntry, WorkoutExerciseId,
    };

    use super::*;

    fn unique_test_root(name: &str) -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0);
        std::env::temp_dir().join(format!("{name}-{nanos}"))
    }

    fn sample_state() -> SessionState {
        let descriptor = |id: &str| ExerciseDescriptor {
            id: ExerciseId::from(id),
            name: id.to_owned(),
            muscle_group: None,
            equipment: None,
            instructions: None,
        };
        let mut set = SetEntry::blank(1);
        set.weight = Some(42.5);
        set.completed = true;
        [
            (
                WorkoutExerciseId::from("row"),
                ExerciseState {
                    expanded: false,
                    exercise_id: ExerciseId::from("row"),
                    current_exercise: descriptor("row"),
                    tracking: ExerciseTracking::Strength { sets: vec![set] },
                },
            ),
            (
                WorkoutExerciseId::from("bike"),
                ExerciseState {
                    expanded: true,
                    exercise_id: ExerciseId::from("bike"),
                    current_exercise: descriptor("bike"),
                    tracking: ExerciseTracking::Cardio {
                        cardio: CardioEntry {
                            distance: Some(5.2),
                            ..CardioEntry::default()
                        },
                    },
                },
            ),
        ]
        .into_iter()
        .collect()
    }

    #[tokio::test]
    async fn saved_draft_reads_back_identically() -> Result<()> {
        let root = unique_test_root("repsync-file-roundtrip");
        let store = FileDraftStore::new(&root);
        let key = SessionKey::from("client-1:w-7");

        assert!(store.load_draft(&key).await?.is_none());
        let saved = store.save_draft(&key, &sample_state()).await?;
        let loaded = store.load_draft(&key).await?.expect("draft exists");
        assert_eq!(loaded, saved);
        assert_eq!(
            loaded.payload.ids().map(|id| id.as_str()).collect::<Vec<_>>(),
            ["row", "bike"]
        );
        assert!(store.drafts_dir().join("client-1@w-7.json").exists());

        let _ = fs::remove_dir_all(root).await;
        Ok(())
    }

    #[tokio::test]
    async fn second_save_overwrites_and_discard_removes() -> Result<()> {
        let root = unique_test_root("repsync-file-overwrite");
        let store = FileDraftStore::new(&root);
        let key = SessionKey::from("k1");

        store.save_draft(&key, &SessionState::new()).await?;
        store.save_draft(&key, &sample_state()).await?;
        let loaded = store.load_draft(&key).await?.expect("draft exists");
        assert_eq!(loaded.payload, sample_state());

        let mut entries = fs::read_dir(store.drafts_dir()).await?;
        let mut files = 0;
        while entries.next_entry().await?.is_some() {
            files += 1;
        }
        assert_eq!(files, 1);

        assert!(store.discard_draft(&key).await?);
        assert!(!store.discard_draft(&key).await?);
        assert!(store.load_draft(&key).await?.is_none());

        let _ = fs::remove_dir_all(root).await;
        Ok(())
    }

    #[tokio::test]
    async fn corrupt_draft_is_a_permanent_error() -> Result<()> {
        let root = unique_test_root("repsync-file-corrupt");
        let store = FileDraftStore::new(&root);
        let key = SessionKey::from("k2");
        fs::create_dir_all(store.drafts_dir()).await?;
        fs::write(store.drafts_dir().join("k2.json"), "{ not json").await?;

        let error = store.load_draft(&key).await.unwrap_err();
        assert_eq!(error.kind(), ErrorKind::Permanent);

        let _ = fs::remove_dir_all(root).await;
        Ok(())
    }

    #[tokio::test]
    async fn path_like_keys_are_rejected() {
        let store = FileDraftStore::new(unique_test_root("repsync-file-keys"));
        for raw in ["../escape", "a/b", "", ".hidden", "a\\b"] {
            let error = store
                .save_draft(&SessionKey::from(raw), &SessionState::new())
                .await
                .unwrap_err();
            assert!(matches!(error, DraftError::InvalidKey(_)), "{raw}");
        }
    }

    #[tokio::test]
    async fn discard_releases_the_key_lock() -> Result<()> {
        let root = unique_test_root("repsync-file-locks");
        let store = FileDraftStore::new(&root);
        let key = SessionKey::from("k4");

        store.save_draft(&key, &SessionState::new()).await?;
        assert_eq!(store.write_locks.lock().len(), 1);
        store.discard_draft(&key).await?;
        assert!(store.write_locks.lock().is_empty());

        let _ = fs::remove_dir_all(root).await;
        Ok(())
    }

    #[tokio::test]
    async fn failed_replace_removes_staging_file() -> Result<()> {
        let root = unique_test_root("repsync-file-staging");
        let store = FileDraftStore::new(&root);
        let key = SessionKey::from("k3");
        let blocker = store.drafts_dir().join("k3.json");
        fs::create_dir_all(&blocker).await?;
        fs::write(blocker.join("occupied"), "x").await?;

        assert!(store.save_draft(&key, &SessionState::new()).await.is_err());
        assert!(!store.drafts_dir().join("k3.json.tmp").exists());

        let _ = fs::remove_dir_all(root).await;
        Ok(())
    }
}
