use chrono::{FixedOffset, Offset, Utc};
use serde::Deserialize;

/// Analytics subsystem configuration. Loaded from environment variables with
/// the prefix `MARKETPULSE__`.
#[derive(Debug, Clone, Deserialize)]
pub struct AnalyticsConfig {
    /// Civil timezone for window boundaries, as minutes east of UTC. Window
    /// math is anchored to civil midnight in this offset.
    #[serde(default = "default_utc_offset_minutes")]
    pub utc_offset_minutes: i32,
    /// Upper bound on the recent-completions list in each report.
    #[serde(default = "default_recent_completions_limit")]
    pub recent_completions_limit: usize,
    /// How often the rollup scheduler re-checks for an unwritten "yesterday".
    #[serde(default = "default_rollup_interval_secs")]
    pub rollup_interval_secs: u64,
}

fn default_utc_offset_minutes() -> i32 {
    0
}
fn default_recent_completions_limit() -> usize {
    10
}
fn default_rollup_interval_secs() -> u64 {
    3600
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            utc_offset_minutes: default_utc_offset_minutes(),
            recent_completions_limit: default_recent_completions_limit(),
            rollup_interval_secs: default_rollup_interval_secs(),
        }
    }
}

impl AnalyticsConfig {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self, config::ConfigError> {
        let builder = config::Config::builder().add_source(
            config::Environment::with_prefix("MARKETPULSE")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// The configured civil timezone. An out-of-range offset falls back to
    /// UTC rather than failing the run.
    pub fn civil_offset(&self) -> FixedOffset {
        FixedOffset::east_opt(self.utc_offset_minutes * 60).unwrap_or_else(|| Utc.fix())
    }
}
