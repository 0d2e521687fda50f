//! Client-side persistence engine for in-progress workout sessions.
//!
//! - [`builder`]: initial tracking state from a workout plan (pure)
//! - [`loader`]: single-flight draft hydration with bounded retry
//! - [`autosave`]: debounce + floor autosave with a single in-flight save
//! - [`initializer`]: picks draft or plan exactly once per session
//! - [`session`]: `WorkoutSession`, composing the above over a draft store

pub mod autosave;
pub mod builder;
pub mod config;
pub mod initializer;
pub mod loader;
pub mod session;

pub use autosave::{
    AutosaveScheduler, AutosaveSink, AutosaveStatus, AutosaveTelemetry, FnSink, SaveOutcome,
};
pub use builder::build_session_state;
pub use config::{AutosaveOptions, LoaderConfig, SessionConfig};
pub use initializer::{InitOutcome, InitSource, SessionInitializer};
pub use loader::{DraftLoadState, DraftLoader, DraftOutcome, UnavailableReason};
pub use session::{DraftSink, WorkoutSession};
