//! Draft store adapters implementing [`repsync_protocol::DraftStorePort`].
//!
//! - [`InMemoryDraftStore`]: process-local map with failure injection for tests
//! - [`FileDraftStore`]: one JSON document per session key on local disk

mod file;
mod memory;

pub use file::FileDraftStore;
pub use memory::InMemoryDraftStore;
