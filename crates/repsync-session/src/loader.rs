use std::sync::Arc;

use repsync_protocol::{DraftRecord, DraftStorePort, SessionKey, SessionState};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::config::LoaderConfig;

/// Why a load settled without a usable draft despite a store failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnavailableReason {
    /// The store refused the request (auth, permission, corrupt record).
    Permanent,
    /// Every transient failure was retried and none succeeded.
    RetriesExhausted,
}

/// Terminal result of a draft load.
#[derive(Debug, Clone, PartialEq)]
pub enum DraftOutcome {
    Found(DraftRecord),
    Absent,
    Unavailable(UnavailableReason),
}

impl DraftOutcome {
    /// Only a found record carries a draft; failures read as "no draft".
    pub fn draft(&self) -> Option<&SessionState> {
        match self {
            Self::Found(record) => Some(&record.payload),
            Self::Absent | Self::Unavailable(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DraftLoadState {
    /// No session key yet, or nothing triggered a load.
    NotStarted,
    Loading,
    Settled(DraftOutcome),
}

impl DraftLoadState {
    pub fn is_settled(&self) -> bool {
        matches!(self, Self::Settled(_))
    }

    pub fn draft(&self) -> Option<&SessionState> {
        match self {
            Self::Settled(outcome) => outcome.draft(),
            Self::NotStarted | Self::Loading => None,
        }
    }
}

/// Hydrates a saved draft once per session instance.
///
/// Loads are single-flight: a trigger while a load is running, or after it
/// settled, does not start another fetch. [`DraftLoader::refresh`] is the
/// explicit way back into `Loading`. Dropping the loader (or calling
/// [`DraftLoader::unmount`]) cancels the in-flight fetch and any late result
/// is discarded.
pub struct DraftLoader {
    store: Arc<dyn DraftStorePort>,
    config: LoaderConfig,
    state: watch::Sender<DraftLoadState>,
    cancel: CancellationToken,
}

impl DraftLoader {
    pub fn new(store: Arc<dyn DraftStorePort>, config: LoaderConfig) -> Self {
        Self {
            store,
            config,
            state: watch::Sender::new(DraftLoadState::NotStarted),
            cancel: CancellationToken::new(),
        }
    }

    pub fn state(&self) -> DraftLoadState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<DraftLoadState> {
        self.state.subscribe()
    }

    pub fn is_unmounted(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Starts the load if it has not started yet. `None` means the session
    /// key is not known yet; the loader stays `NotStarted`.
    pub async fn load(&self, key: Option<&SessionKey>) -> DraftLoadState {
        let Some(key) = key else {
            debug!("session key unavailable; draft load deferred");
            return self.state();
        };
        if self.cancel.is_cancelled() {
            return self.state();
        }

        let started = self.state.send_if_modified(|state| {
            if matches!(state, DraftLoadState::NotStarted) {
                *state = DraftLoadState::Loading;
                true
            } else {
                false
            }
        });
        if !started {
            debug!(session_key = %key, "draft load already started");
            return self.state();
        }

        self.run(key).await
    }

    /// Re-enters `Loading` unless a load is already running.
    pub async fn refresh(&self, key: &SessionKey) -> DraftLoadState {
        if self.cancel.is_cancelled() {
            return self.state();
        }
        let started = self.state.send_if_modified(|state| {
            if matches!(state, DraftLoadState::Loading) {
                false
            } else {
                *state = DraftLoadState::Loading;
                true
            }
        });
        if !started {
            debug!(session_key = %key, "draft refresh ignored; load in flight");
            return self.state();
        }

        self.run(key).await
    }

    /// Waits for a terminal state. Returns the current state early if the
    /// loader is unmounted first.
    pub async fn settled(&self) -> DraftLoadState {
        let mut rx = self.subscribe();
        tokio::select! {
            settled = rx.wait_for(DraftLoadState::is_settled) => {
                settled.map(|state| (*state).clone()).unwrap_or_else(|_| self.state())
            }
            _ = self.cancel.cancelled() => self.state(),
        }
    }

    pub fn unmount(&self) {
        self.cancel.cancel();
    }

    #[instrument(skip(self), fields(session_key = %key))]
    async fn run(&self, key: &SessionKey) -> DraftLoadState {
        let mut guard = LoadingGuard {
            state: &self.state,
            armed: true,
        };
        let outcome = tokio::select! {
            outcome = self.fetch_with_retry(key) => outcome,
            _ = self.cancel.cancelled() => {
                guard.armed = false;
                debug!("draft load cancelled by unmount");
                return self.state();
            }
        };
        guard.armed = false;

        match &outcome {
            DraftOutcome::Found(record) => info!(
                exercises = record.payload.len(),
                saved_at = %record.saved_at,
                "draft loaded"
            ),
            DraftOutcome::Absent => info!("no draft stored; starting fresh"),
            DraftOutcome::Unavailable(reason) => {
                warn!(?reason, "draft unavailable; starting fresh")
            }
        }

        let settled = DraftLoadState::Settled(outcome);
        self.state.send_replace(settled.clone());
        settled
    }

    async fn fetch_with_retry(&self, key: &SessionKey) -> DraftOutcome {
        let max_retries = self.config.max_retries;
        let mut attempt = 0_u32;

        loop {
            match self.store.load_draft(key).await {
                Ok(Some(record)) => return DraftOutcome::Found(record),
                Ok(None) => return DraftOutcome::Absent,
                Err(error) if !error.is_retryable() => {
                    warn!(%error, "draft load rejected");
                    return DraftOutcome::Unavailable(UnavailableReason::Permanent);
                }
                Err(error) if attempt < max_retries => {
                    attempt += 1;
                    warn!(%error, attempt, max_retries, "draft load failed; retrying");
                    tokio::time::sleep(self.config.retry_interval).await;
                }
                Err(error) => {
                    warn!(%error, max_retries, "draft load failed after retries");
                    return DraftOutcome::Unavailable(UnavailableReason::RetriesExhausted);
                }
            }
        }
    }
}

/// Rolls `Loading` back to `NotStarted` when the future driving a load is
/// dropped before it settles, so a later trigger can start over.
struct LoadingGuard<'a> {
    state: &'a watch::Sender<DraftLoadState>,
    armed: bool,
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let reset = self.state.send_if_modified(|state| {
            if matches!(state, DraftLoadState::Loading) {
                *state = DraftLoadState::NotStarted;
                true
            } else {
                false
            }
        });
        if reset {
            debug!("draft load abandoned before settling");
        }
    }
}

impl Drop for DraftLoader {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
