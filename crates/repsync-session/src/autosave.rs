//! Debounced autosave with a periodic floor.
//!
//! Two independently armed timers feed one single-flight save routine:
//! a debounce `Sleep` re-armed on every observed change, and a fixed
//! `Interval` that flushes whenever the value differs from the last
//! successfully saved one. The floor bounds staleness even when edits keep
//! re-arming the debounce.
//!
//! Change detection compares SHA-256 fingerprints of the JSON form of the
//! value. Observable state is published as [`AutosaveTelemetry`].

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_stream::wrappers::WatchStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::AutosaveOptions;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AutosaveStatus {
    #[default]
    Idle,
    Saving,
    Saved,
    Error,
}

/// In-memory save status. Never persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutosaveTelemetry {
    pub status: AutosaveStatus,
    pub last_saved: Option<DateTime<Utc>>,
    pub error_count: u32,
}

/// Result reported by an [`AutosaveSink`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    Saved,
    /// The write did not happen; a later trigger may retry the same content.
    Failed,
    /// The store refused the write; the same content is not retried
    /// automatically until the value changes.
    Rejected,
}

impl From<bool> for SaveOutcome {
    fn from(saved: bool) -> Self {
        if saved { Self::Saved } else { Self::Failed }
    }
}

/// Destination of autosaved values. Implementations report failures through
/// [`SaveOutcome`] rather than errors.
#[async_trait]
pub trait AutosaveSink<T: Send + 'static>: Send + Sync {
    async fn save(&self, value: T) -> SaveOutcome;
}

/// Adapts an async closure returning `bool` or [`SaveOutcome`] into a sink.
pub struct FnSink<F>(pub F);

#[async_trait]
impl<T, F, Fut, O> AutosaveSink<T> for FnSink<F>
where
    T: Send + 'static,
    F: Fn(T) -> Fut + Send + Sync,
    Fut: Future<Output = O> + Send,
    O: Into<SaveOutcome>,
{
    async fn save(&self, value: T) -> SaveOutcome {
        (self.0)(value).await.into()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Trigger {
    Debounce,
    Floor,
    Force,
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Debounce => "debounce",
            Self::Floor => "floor",
            Self::Force => "force",
        })
    }
}

#[derive(Debug, Default)]
struct SaveGate {
    in_flight: bool,
    disabled: bool,
    last_saved: Option<String>,
    last_observed: Option<String>,
    rejected: Option<String>,
    changes_since_save: u32,
}

struct AutosaveCore<T: Send + 'static> {
    sink: Arc<dyn AutosaveSink<T>>,
    value: watch::Receiver<T>,
    telemetry: watch::Sender<AutosaveTelemetry>,
    gate: Mutex<SaveGate>,
    min_changes: u32,
    alive: CancellationToken,
}

/// Watches a value and saves it through a sink.
///
/// Dropping the scheduler stops both timers; a save already running is
/// allowed to finish but its result is no longer applied.
pub struct AutosaveScheduler<T: Send + 'static> {
    core: Arc<AutosaveCore<T>>,
    values: watch::Sender<T>,
    task: Option<JoinHandle<()>>,
}

impl<T> AutosaveScheduler<T>
where
    T: Serialize + Clone + Send + Sync + 'static,
{
    /// Starts watching `initial`. Must be called inside a tokio runtime.
    pub fn spawn(initial: T, sink: Arc<dyn AutosaveSink<T>>, options: AutosaveOptions) -> Self {
        let options = options.sanitized();
        let last_observed = fingerprint(&initial).ok();
        let (values, changes) = watch::channel(initial);
        let core = Arc::new(AutosaveCore {
            sink,
            value: changes.clone(),
            telemetry: watch::Sender::new(AutosaveTelemetry::default()),
            gate: Mutex::new(SaveGate {
                disabled: options.disabled,
                last_observed,
                ..SaveGate::default()
            }),
            min_changes: options.min_changes_before_debounced_save,
            alive: CancellationToken::new(),
        });
        let task = tokio::spawn(run_timers(core.clone(), changes, options));

        Self {
            core,
            values,
            task: Some(task),
        }
    }

    /// Replaces the watched value.
    pub fn observe(&self, value: T) {
        self.values.send_replace(value);
    }

    /// Edits a copy of the watched value and publishes it. Edits that leave
    /// the value unchanged are not counted as changes.
    pub fn update<R>(&self, edit: impl FnOnce(&mut T) -> R) -> R {
        let mut value = self.current();
        let result = edit(&mut value);
        self.values.send_replace(value);
        result
    }

    pub fn current(&self) -> T {
        self.values.borrow().clone()
    }

    /// Saves now, bypassing both timers. Returns `true` when the value is
    /// persisted (including when nothing changed since the last save) and
    /// `false` when the save failed or was dropped because another save is
    /// in flight or autosave is disabled.
    pub async fn force_save(&self) -> bool {
        self.core.clone().flush(Trigger::Force).await
    }

    /// Records the current value as already persisted, e.g. right after it
    /// was hydrated from the store.
    pub fn mark_persisted(&self) {
        let Ok(current) = fingerprint(&*self.values.borrow()) else {
            return;
        };
        let mut gate = self.core.gate.lock();
        gate.last_saved = Some(current);
        gate.changes_since_save = 0;
    }

    pub fn set_disabled(&self, disabled: bool) {
        self.core.gate.lock().disabled = disabled;
        if disabled {
            self.core.telemetry.send_modify(|telemetry| {
                telemetry.status = AutosaveStatus::Idle;
                telemetry.error_count = 0;
            });
        }
        debug!(disabled, "autosave toggled");
    }

    pub fn is_disabled(&self) -> bool {
        self.core.gate.lock().disabled
    }

    pub fn telemetry(&self) -> AutosaveTelemetry {
        self.core.telemetry.borrow().clone()
    }

    pub fn status(&self) -> AutosaveStatus {
        self.core.telemetry.borrow().status
    }

    pub fn last_saved(&self) -> Option<DateTime<Utc>> {
        self.core.telemetry.borrow().last_saved
    }

    pub fn error_count(&self) -> u32 {
        self.core.telemetry.borrow().error_count
    }

    pub fn has_unsaved_changes(&self) -> bool {
        self.core.has_unsaved_changes(Trigger::Force)
    }

    pub fn subscribe(&self) -> watch::Receiver<AutosaveTelemetry> {
        self.core.telemetry.subscribe()
    }

    pub fn telemetry_stream(&self) -> WatchStream<AutosaveTelemetry> {
        WatchStream::new(self.subscribe())
    }

    /// Stops the timers and waits for the timer task to exit.
    pub async fn shutdown(mut self) {
        self.core.alive.cancel();
        if let Some(task) = self.task.take()
            && let Err(error) = task.await
        {
            warn!(%error, "autosave task stopped abnormally");
        }
    }
}

impl<T: Send + 'static> Drop for AutosaveScheduler<T> {
    fn drop(&mut self) {
        self.core.alive.cancel();
    }
}

async fn run_timers<T>(
    core: Arc<AutosaveCore<T>>,
    mut changes: watch::Receiver<T>,
    options: AutosaveOptions,
) where
    T: Serialize + Clone + Send + Sync + 'static,
{
    let mut floor = tokio::time::interval_at(
        Instant::now() + options.flush_interval,
        options.flush_interval,
    );
    floor.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let debounce = tokio::time::sleep(options.debounce);
    tokio::pin!(debounce);
    let mut debounce_armed = false;

    loop {
        tokio::select! {
            _ = core.alive.cancelled() => break,
            changed = changes.changed() => {
                if changed.is_err() {
                    break;
                }
                let observed = fingerprint(&*changes.borrow_and_update());
                if core.note_change(observed) {
                    debounce.as_mut().reset(Instant::now() + options.debounce);
                    debounce_armed = true;
                }
            }
            () = &mut debounce, if debounce_armed => {
                debounce_armed = false;
                if core.debounce_ready() {
                    tokio::spawn(core.clone().flush(Trigger::Debounce));
                }
            }
            _ = floor.tick() => {
                if core.has_unsaved_changes(Trigger::Floor) {
                    tokio::spawn(core.clone().flush(Trigger::Floor));
                }
            }
        }
    }
    debug!("autosave timers stopped");
}

impl<T> AutosaveCore<T>
where
    T: Serialize + Clone + Send + Sync + 'static,
{
    /// Returns whether the value really changed.
    fn note_change(&self, observed: serde_json::Result<String>) -> bool {
        let observed = match observed {
            Ok(observed) => observed,
            Err(error) => {
                warn!(%error, "autosave value is not serializable; change ignored");
                return false;
            }
        };
        {
            let mut gate = self.gate.lock();
            if gate.last_observed.as_ref() == Some(&observed) {
                return false;
            }
            gate.last_observed = Some(observed);
            gate.changes_since_save = gate.changes_since_save.saturating_add(1);
        }
        self.telemetry.send_if_modified(|telemetry| {
            if matches!(telemetry.status, AutosaveStatus::Saved | AutosaveStatus::Error) {
                telemetry.status = AutosaveStatus::Idle;
                true
            } else {
                false
            }
        });
        true
    }

    fn debounce_ready(&self) -> bool {
        let gate = self.gate.lock();
        gate.last_saved.is_none() || gate.changes_since_save >= self.min_changes
    }

    fn has_unsaved_changes(&self, trigger: Trigger) -> bool {
        let Ok(current) = fingerprint(&*self.value.borrow()) else {
            return false;
        };
        let gate = self.gate.lock();
        if gate.disabled || gate.in_flight {
            return false;
        }
        if trigger != Trigger::Force && gate.rejected.as_ref() == Some(&current) {
            return false;
        }
        gate.last_saved.as_ref() != Some(&current)
    }

    async fn flush(self: Arc<Self>, trigger: Trigger) -> bool {
        let value = self.value.borrow().clone();
        let current = match fingerprint(&value) {
            Ok(current) => current,
            Err(error) => {
                warn!(%trigger, %error, "autosave value is not serializable");
                self.record_result(SaveOutcome::Failed, false);
                return false;
            }
        };

        let snapshot_changes = {
            let mut gate = self.gate.lock();
            if gate.disabled {
                debug!(%trigger, "autosave disabled; save skipped");
                return false;
            }
            if gate.in_flight {
                debug!(%trigger, "save already in flight; trigger dropped");
                return false;
            }
            if gate.last_saved.as_ref() == Some(&current) {
                debug!(%trigger, "no changes since last save");
                return true;
            }
            if trigger != Trigger::Force && gate.rejected.as_ref() == Some(&current) {
                debug!(%trigger, "content was rejected before; waiting for a new change");
                return false;
            }
            gate.in_flight = true;
            gate.changes_since_save
        };

        self.telemetry
            .send_modify(|telemetry| telemetry.status = AutosaveStatus::Saving);
        let outcome = self.sink.save(value).await;

        if self.alive.is_cancelled() {
            debug!(%trigger, ?outcome, "autosave stopped; save result discarded");
            return outcome == SaveOutcome::Saved;
        }

        // Edits observed while the write was running are not covered by it.
        let superseded = fingerprint(&*self.value.borrow())
            .map(|latest| latest != current)
            .unwrap_or(false);

        let disabled = {
            let mut gate = self.gate.lock();
            gate.in_flight = false;
            match outcome {
                SaveOutcome::Saved => {
                    gate.last_saved = Some(current);
                    gate.rejected = None;
                    gate.changes_since_save =
                        gate.changes_since_save.saturating_sub(snapshot_changes);
                }
                SaveOutcome::Failed => {}
                SaveOutcome::Rejected => gate.rejected = Some(current),
            }
            gate.disabled
        };

        match outcome {
            SaveOutcome::Saved => info!(%trigger, superseded, "autosave complete"),
            SaveOutcome::Failed | SaveOutcome::Rejected => {
                warn!(%trigger, ?outcome, "autosave failed")
            }
        }
        if !disabled {
            self.record_result(outcome, superseded);
        }
        outcome == SaveOutcome::Saved
    }

    /// `superseded` saves still count as successes but leave the status
    /// `Idle`, since newer edits are pending.
    fn record_result(&self, outcome: SaveOutcome, superseded: bool) {
        self.telemetry.send_modify(|telemetry| match outcome {
            SaveOutcome::Saved => {
                telemetry.status = if superseded {
                    AutosaveStatus::Idle
                } else {
                    AutosaveStatus::Saved
                };
                telemetry.last_saved = Some(Utc::now());
                telemetry.error_count = 0;
            }
            SaveOutcome::Failed | SaveOutcome::Rejected => {
                telemetry.status = AutosaveStatus::Error;
                telemetry.error_count = telemetry.error_count.saturating_add(1);
            }
        });
    }
}

fn fingerprint<T: Serialize>(value: &T) -> serde_json::Result<String> {
    let encoded = serde_json::to_vec(value)?;
    Ok(hex::encode(Sha256::digest(&encoded)))
}
