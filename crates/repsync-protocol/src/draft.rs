//! Persisted draft records.

use crate::ids::SessionKey;
use crate::state::SessionState;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Snapshot of an unfinished session held by the draft store. One record
/// per session key; saves overwrite it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DraftRecord {
    pub session_key: SessionKey,
    pub payload: SessionState,
    pub saved_at: DateTime<Utc>,
}

impl DraftRecord {
    pub fn new(session_key: SessionKey, payload: SessionState) -> Self {
        Self {
            session_key,
            payload,
            saved_at: Utc::now(),
        }
    }
}
