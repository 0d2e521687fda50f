use std::sync::Arc;

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use repsync_protocol::{
    DraftStorePort, SessionKey, SessionProgress, SessionState, WorkoutExerciseDefinition,
};
use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};

use crate::autosave::{AutosaveScheduler, AutosaveSink, AutosaveTelemetry, SaveOutcome};
use crate::config::SessionConfig;
use crate::initializer::{InitOutcome, InitSource, SessionInitializer};
use crate::loader::{DraftLoadState, DraftLoader, DraftOutcome};

/// Autosave sink writing session state through a [`DraftStorePort`].
/// Transient store errors map to [`SaveOutcome::Failed`], permanent ones to
/// [`SaveOutcome::Rejected`].
#[derive(Clone)]
pub struct DraftSink {
    store: Arc<dyn DraftStorePort>,
    key: SessionKey,
}

impl DraftSink {
    pub fn new(store: Arc<dyn DraftStorePort>, key: SessionKey) -> Self {
        Self { store, key }
    }
}

#[async_trait]
impl AutosaveSink<SessionState> for DraftSink {
    async fn save(&self, value: SessionState) -> SaveOutcome {
        match self.store.save_draft(&self.key, &value).await {
            Ok(record) => {
                debug!(session_key = %self.key, saved_at = %record.saved_at, "draft saved");
                SaveOutcome::Saved
            }
            Err(error) if error.is_retryable() => {
                warn!(session_key = %self.key, %error, "draft save failed");
                SaveOutcome::Failed
            }
            Err(error) => {
                warn!(session_key = %self.key, %error, "draft save rejected");
                SaveOutcome::Rejected
            }
        }
    }
}

/// One in-progress workout: hydrated from its draft (or built from the
/// plan) and autosaved while the user edits it.
pub struct WorkoutSession {
    key: SessionKey,
    store: Arc<dyn DraftStorePort>,
    autosave: AutosaveScheduler<SessionState>,
    source: InitSource,
    draft_outcome: DraftOutcome,
}

impl WorkoutSession {
    #[instrument(skip(store, defs, config), fields(session_key = %key, definitions = defs.len()))]
    pub async fn open(
        store: Arc<dyn DraftStorePort>,
        key: SessionKey,
        defs: &[WorkoutExerciseDefinition],
        config: SessionConfig,
    ) -> Result<Self> {
        if defs.is_empty() {
            bail!("workout has no exercises to track");
        }

        let loader = DraftLoader::new(store.clone(), config.loader.clone());
        let loaded = loader.load(Some(&key)).await;
        let mut initializer = SessionInitializer::new();
        let (state, source) = match initializer.initialize(defs, loaded.draft(), loaded.is_settled())
        {
            InitOutcome::Initialized { state, source } => (state, source),
            InitOutcome::Pending | InitOutcome::AlreadyInitialized => {
                bail!("draft load did not settle for session {key}")
            }
        };
        let draft_outcome = match loaded {
            DraftLoadState::Settled(outcome) => outcome,
            DraftLoadState::NotStarted | DraftLoadState::Loading => DraftOutcome::Absent,
        };

        let sink = Arc::new(DraftSink::new(store.clone(), key.clone()));
        let autosave = AutosaveScheduler::spawn(state, sink, config.autosave);
        if source == InitSource::Draft {
            autosave.mark_persisted();
        }

        info!(?source, "workout session opened");
        Ok(Self {
            key,
            store,
            autosave,
            source,
            draft_outcome,
        })
    }

    pub fn key(&self) -> &SessionKey {
        &self.key
    }

    pub fn initial_source(&self) -> InitSource {
        self.source
    }

    pub fn draft_outcome(&self) -> &DraftOutcome {
        &self.draft_outcome
    }

    pub fn state(&self) -> SessionState {
        self.autosave.current()
    }

    pub fn progress(&self) -> SessionProgress {
        self.autosave.current().progress()
    }

    /// Applies a user edit. All mutation of the live state goes through here.
    pub fn edit<R>(&self, edit: impl FnOnce(&mut SessionState) -> R) -> R {
        self.autosave.update(edit)
    }

    pub fn telemetry(&self) -> AutosaveTelemetry {
        self.autosave.telemetry()
    }

    pub fn subscribe(&self) -> watch::Receiver<AutosaveTelemetry> {
        self.autosave.subscribe()
    }

    pub fn set_autosave_disabled(&self, disabled: bool) {
        self.autosave.set_disabled(disabled);
    }

    pub async fn force_save(&self) -> bool {
        self.autosave.force_save().await
    }

    /// Flushes pending edits and stops autosaving. The draft is kept.
    #[instrument(skip(self), fields(session_key = %self.key))]
    pub async fn close(self) -> bool {
        let saved = self.autosave.force_save().await;
        if !saved {
            warn!("final draft save failed; latest edits may be lost");
        }
        self.autosave.shutdown().await;
        saved
    }

    /// Ends the workout: stops autosave, deletes the draft, and returns the
    /// final state for submission.
    #[instrument(skip(self), fields(session_key = %self.key))]
    pub async fn complete(self) -> Result<SessionState> {
        let state = self.autosave.current();
        self.autosave.shutdown().await;
        self.store
            .discard_draft(&self.key)
            .await
            .with_context(|| format!("failed discarding draft for {}", self.key))?;
        info!(progress = ?state.progress(), "workout session completed");
        Ok(state)
    }

    /// Abandons the workout and deletes its draft.
    #[instrument(skip(self), fields(session_key = %self.key))]
    pub async fn discard(self) -> Result<bool> {
        self.autosave.shutdown().await;
        let existed = self
            .store
            .discard_draft(&self.key)
            .await
            .with_context(|| format!("failed discarding draft for {}", self.key))?;
        info!(existed, "workout session discarded");
        Ok(existed)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use anyhow::Result;
    use repsync_protocol::{
        DraftError, DraftRecord, ExerciseDescriptor, ExerciseId, ExerciseKind, WorkoutExerciseId,
    };
    use repsync_store::InMemoryDraftStore;

    use super::*;
    use crate::autosave::AutosaveStatus;
    use crate::builder::build_session_state;
    use crate::config::AutosaveOptions;

    fn defs() -> Vec<WorkoutExerciseDefinition> {
        vec![
            WorkoutExerciseDefinition {
                id: Some(WorkoutExerciseId::from("e1")),
                order_index: 0,
                kind: ExerciseKind::Strength,
                target_sets: Some(3),
                target_reps: Some("5".to_owned()),
                exercise: ExerciseDescriptor {
                    id: ExerciseId::from("deadlift"),
                    name: "Deadlift".to_owned(),
                    muscle_group: None,
                    equipment: Some("barbell".to_owned()),
                    instructions: None,
                },
            },
            WorkoutExerciseDefinition {
                id: Some(WorkoutExerciseId::from("e2")),
                order_index: 1,
                kind: ExerciseKind::Run,
                target_sets: None,
                target_reps: None,
                exercise: ExerciseDescriptor {
                    id: ExerciseId::from("run"),
                    name: "Cooldown run".to_owned(),
                    muscle_group: None,
                    equipment: None,
                    instructions: None,
                },
            },
        ]
    }

    fn key() -> SessionKey {
        SessionKey::from("client-9:w-3")
    }

    fn config() -> SessionConfig {
        SessionConfig {
            autosave: AutosaveOptions::default()
                .debounce(Duration::from_millis(100))
                .flush_interval(Duration::from_millis(1_000)),
            ..SessionConfig::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn fresh_session_autosaves_edits() -> Result<()> {
        let store = Arc::new(InMemoryDraftStore::new());
        let session = WorkoutSession::open(store.clone(), key(), &defs(), config()).await?;
        assert_eq!(session.initial_source(), InitSource::Definitions);
        assert_eq!(session.draft_outcome(), &DraftOutcome::Absent);

        let e1 = WorkoutExerciseId::from("e1");
        session.edit(|state| {
            let set = state.set_entry_mut(&e1, 1)?;
            set.weight = Some(140.0);
            set.completed = true;
            Ok::<_, repsync_protocol::StateEditError>(())
        })?;
        tokio::time::sleep(Duration::from_millis(300)).await;

        let stored = store.get(&key()).expect("draft saved");
        assert_eq!(stored.payload, session.state());
        assert_eq!(session.telemetry().status, AutosaveStatus::Saved);
        assert_eq!(session.progress().completed_units, 1);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn stored_draft_is_resumed_without_rewriting_it() -> Result<()> {
        let store = Arc::new(InMemoryDraftStore::new());
        let mut draft = build_session_state(&defs());
        draft.mark_completed(&WorkoutExerciseId::from("e2"), true)?;
        store.insert(DraftRecord::new(key(), draft.clone()));

        let session = WorkoutSession::open(store.clone(), key(), &defs(), config()).await?;
        assert_eq!(session.initial_source(), InitSource::Draft);
        assert_eq!(session.state(), draft);

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(store.save_calls(), 0);
        assert!(session.force_save().await);
        assert_eq!(store.save_calls(), 0);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn unavailable_store_still_opens_fresh_session() -> Result<()> {
        let store = Arc::new(InMemoryDraftStore::new());
        store.fail_next_loads([DraftError::Permanent("token expired".into())]);

        let session = WorkoutSession::open(store.clone(), key(), &defs(), config()).await?;
        assert_eq!(session.initial_source(), InitSource::Definitions);
        assert_eq!(session.state(), build_session_state(&defs()));
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn empty_workout_is_rejected() {
        let store = Arc::new(InMemoryDraftStore::new());
        let result = WorkoutSession::open(store, key(), &[], config()).await;
        assert!(result.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn complete_discards_the_draft() -> Result<()> {
        let store = Arc::new(InMemoryDraftStore::new());
        let session = WorkoutSession::open(store.clone(), key(), &defs(), config()).await?;
        session.edit(|state| state.toggle_expanded(&WorkoutExerciseId::from("e2")))?;
        assert!(session.force_save().await);
        assert!(store.get(&key()).is_some());

        // pending edit; completing must not write it
        session.edit(|state| state.toggle_expanded(&WorkoutExerciseId::from("e2")))?;
        let saves_before = store.save_calls();

        let final_state = session.complete().await?;
        assert!(store.get(&key()).is_none());
        assert_eq!(store.save_calls(), saves_before);
        assert_eq!(
            final_state
                .get(&WorkoutExerciseId::from("e2"))
                .map(|e| e.expanded),
            Some(true)
        );
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn close_flushes_pending_edits() -> Result<()> {
        let store = Arc::new(InMemoryDraftStore::new());
        let session = WorkoutSession::open(store.clone(), key(), &defs(), config()).await?;
        session.edit(|state| state.add_set(&WorkoutExerciseId::from("e1")))?;

        assert!(session.close().await);
        let stored = store.get(&key()).expect("draft saved on close");
        let sets = stored
            .payload
            .get(&WorkoutExerciseId::from("e1"))
            .and_then(|e| e.tracking.sets())
            .map(|sets| sets.len());
        assert_eq!(sets, Some(4));
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn draft_sink_classifies_store_errors() {
        let store = Arc::new(InMemoryDraftStore::new());
        let sink = DraftSink::new(store.clone(), key());
        store.fail_next_saves([
            DraftError::Transient("503".into()),
            DraftError::Permanent("forbidden".into()),
        ]);

        assert_eq!(sink.save(SessionState::new()).await, SaveOutcome::Failed);
        assert_eq!(sink.save(SessionState::new()).await, SaveOutcome::Rejected);
        assert_eq!(sink.save(SessionState::new()).await, SaveOutcome::Saved);
    }
}
