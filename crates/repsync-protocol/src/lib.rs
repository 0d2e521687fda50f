//! # repsync-protocol: workout session contract types
//!
//! Shared types and the storage port used by the session engine and the
//! draft-store adapters. Runtime-free (no tokio) so it can be consumed as a
//! pure contract crate.
//!
//! ## Module Overview
//!
//! - [`ids`]: Typed ID wrappers (SessionKey, WorkoutExerciseId, ExerciseId, WorkoutId)
//! - [`workout`]: WorkoutDefinition, WorkoutExerciseDefinition, ExerciseKind
//! - [`state`]: SessionState, ExerciseState and the per-kind tracking payloads
//! - [`draft`]: DraftRecord
//! - [`ports`]: DraftStorePort, the only boundary to draft persistence
//! - [`error`]: DraftError, ErrorKind, DraftResult

pub mod draft;
pub mod error;
pub mod ids;
pub mod ports;
pub mod state;
pub mod workout;

pub use draft::DraftRecord;
pub use error::{DraftError, DraftResult, ErrorKind};
pub use ids::{ExerciseId, SessionKey, WorkoutExerciseId, WorkoutId};
pub use ports::DraftStorePort;
pub use state::{
    CardioEntry, ExerciseState, ExerciseTracking, FlexibilityEntry, SessionProgress,
    SessionState, SetEntry, StateEditError,
};
pub use workout::{ExerciseDescriptor, ExerciseKind, WorkoutDefinition, WorkoutExerciseDefinition};
