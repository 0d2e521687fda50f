//! Storage port for session drafts.
//!
//! This trait is the only boundary between the session engine and draft
//! persistence (remote API, local file, test double).
//!
//! Object-safety note: the trait uses `async-trait` for async dyn-dispatch.

use crate::draft::DraftRecord;
use crate::error::DraftResult;
use crate::ids::SessionKey;
use crate::state::SessionState;
use async_trait::async_trait;

#[async_trait]
pub trait DraftStorePort: Send + Sync {
    /// `Ok(None)` means no draft exists, which is distinct from a failure.
    async fn load_draft(&self, key: &SessionKey) -> DraftResult<Option<DraftRecord>>;

    /// Creates or overwrites the single draft for `key`.
    async fn save_draft(&self, key: &SessionKey, payload: &SessionState)
    -> DraftResult<DraftRecord>;

    /// Returns whether a draft was present.
    async fn discard_draft(&self, key: &SessionKey) -> DraftResult<bool>;
}
