use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Shortest timer period the autosave loop accepts.
pub const MIN_TIMER_PERIOD: Duration = Duration::from_millis(1);

/// Retry policy for draft hydration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderConfig {
    pub max_retries: u32,
    #[serde(rename = "retry_interval_ms", with = "duration_ms")]
    pub retry_interval: Duration,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_interval: Duration::from_millis(1_000),
        }
    }
}

/// Autosave timing. `debounce` coalesces edit bursts; `flush_interval`
/// bounds how stale the remote draft can get under continuous editing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutosaveOptions {
    #[serde(rename = "debounce_ms", with = "duration_ms")]
    pub debounce: Duration,
    #[serde(rename = "flush_interval_ms", with = "duration_ms")]
    pub flush_interval: Duration,
    pub disabled: bool,
    pub min_changes_before_debounced_save: u32,
}

impl Default for AutosaveOptions {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(2_000),
            flush_interval: Duration::from_millis(10_000),
            disabled: false,
            min_changes_before_debounced_save: 0,
        }
    }
}

impl AutosaveOptions {
    pub fn debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    pub fn flush_interval(mut self, flush_interval: Duration) -> Self {
        self.flush_interval = flush_interval;
        self
    }

    pub fn disabled(mut self, disabled: bool) -> Self {
        self.disabled = disabled;
        self
    }

    pub fn min_changes_before_debounced_save(mut self, min_changes: u32) -> Self {
        self.min_changes_before_debounced_save = min_changes;
        self
    }

    /// Raises zero timer periods to [`MIN_TIMER_PERIOD`]. A zero interval
    /// cannot drive a tokio `Interval`.
    pub fn sanitized(mut self) -> Self {
        if self.debounce < MIN_TIMER_PERIOD {
            warn!(debounce = ?self.debounce, "autosave debounce raised to minimum");
            self.debounce = MIN_TIMER_PERIOD;
        }
        if self.flush_interval < MIN_TIMER_PERIOD {
            warn!(
                flush_interval = ?self.flush_interval,
                "autosave flush interval raised to minimum"
            );
            self.flush_interval = MIN_TIMER_PERIOD;
        }
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub loader: LoaderConfig,
    pub autosave: AutosaveOptions,
}

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
