use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use repsync_protocol::{
    DraftError, DraftRecord, DraftResult, DraftStorePort, SessionKey, SessionState,
};

/// Draft store backed by a process-local map.
///
/// Queued failures are returned by the next calls before the map is
/// consulted, which lets callers exercise retry and error paths.
#[derive(Debug, Default)]
pub struct InMemoryDraftStore {
    drafts: Mutex<HashMap<SessionKey, DraftRecord>>,
    load_failures: Mutex<VecDeque<DraftError>>,
    save_failures: Mutex<VecDeque<DraftError>>,
    load_delay: Mutex<Option<Duration>>,
    load_calls: AtomicUsize,
    save_calls: AtomicUsize,
}

impl InMemoryDraftStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, record: DraftRecord) {
        self.drafts.lock().insert(record.session_key.clone(), record);
    }

    pub fn get(&self, key: &SessionKey) -> Option<DraftRecord> {
        self.drafts.lock().get(key).cloned()
    }

    pub fn fail_next_loads(&self, errors: impl IntoIterator<Item = DraftError>) {
        self.load_failures.lock().extend(errors);
    }

    pub fn fail_next_saves(&self, errors: impl IntoIterator<Item = DraftError>) {
        self.save_failures.lock().extend(errors);
    }

    /// Delay applied to every load, to widen in-flight windows.
    pub fn set_load_delay(&self, delay: Duration) {
        *self.load_delay.lock() = Some(delay);
    }

    pub fn load_calls(&self) -> usize {
        self.load_calls.load(Ordering::SeqCst)
    }

    pub fn save_calls(&self) -> usize {
        self.save_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DraftStorePort for InMemoryDraftStore {
    async fn load_draft(&self, key: &SessionKey) -> DraftResult<Option<DraftRecord>> {
        self.load_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.load_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let failure = self.load_failures.lock().pop_front();
        if let Some(error) = failure {
            return Err(error);
        }
        Ok(self.get(key))
    }

    async fn save_draft(
        &self,
        key: &SessionKey,
        payload: &SessionState,
    ) -> DraftResult<DraftRecord> {
        self.save_calls.fetch_add(1, Ordering::SeqCst);
        let failure = self.save_failures.lock().pop_front();
        if let Some(error) = failure {
            return Err(error);
        }
        let record = DraftRecord::new(key.clone(), payload.clone());
        self.insert(record.clone());
        Ok(record)
    }

    async fn discard_draft(&self, key: &SessionKey) -> DraftResult<bool> {
        Ok(self.drafts.lock().remove(key).is_some())
    }
}
