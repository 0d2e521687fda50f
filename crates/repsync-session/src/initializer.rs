use repsync_protocol::{SessionState, WorkoutExerciseDefinition};
use serde::Serialize;
use tracing::{debug, info};

use crate::builder::build_session_state;

/// Where the initial session state came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InitSource {
    Draft,
    Definitions,
}

#[derive(Debug, Clone, PartialEq)]
pub enum InitOutcome {
    /// Definitions or the draft load are not ready yet.
    Pending,
    Initialized {
        state: SessionState,
        source: InitSource,
    },
    /// Initialization already happened for this session instance.
    AlreadyInitialized,
}

/// Produces the authoritative initial state exactly once per session.
///
/// Waits until definitions are present and the draft load has settled, so a
/// freshly built state is never shown and then replaced by a late draft.
#[derive(Debug, Default)]
pub struct SessionInitializer {
    completed: Option<InitSource>,
}

impl SessionInitializer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_initialized(&self) -> bool {
        self.completed.is_some()
    }

    pub fn source(&self) -> Option<InitSource> {
        self.completed
    }

    pub fn initialize(
        &mut self,
        defs: &[WorkoutExerciseDefinition],
        draft: Option<&SessionState>,
        draft_settled: bool,
    ) -> InitOutcome {
        self.initialize_with(defs, draft, draft_settled, build_session_state)
    }

    /// Same as [`SessionInitializer::initialize`] with a caller-supplied
    /// builder for the no-draft path.
    pub fn initialize_with(
        &mut self,
        defs: &[WorkoutExerciseDefinition],
        draft: Option<&SessionState>,
        draft_settled: bool,
        build: impl FnOnce(&[WorkoutExerciseDefinition]) -> SessionState,
    ) -> InitOutcome {
        if self.completed.is_some() {
            return InitOutcome::AlreadyInitialized;
        }
        if defs.is_empty() || !draft_settled {
            debug!(
                definitions = defs.len(),
                draft_settled, "session initialization waiting"
            );
            return InitOutcome::Pending;
        }

        let (state, source) = match draft {
            Some(draft) if !draft.is_empty() => (draft.clone(), InitSource::Draft),
            _ => (build(defs), InitSource::Definitions),
        };
        self.completed = Some(source);
        info!(?source, exercises = state.len(), "session initialized");
        InitOutcome::Initialized { state, source }
    }
}
