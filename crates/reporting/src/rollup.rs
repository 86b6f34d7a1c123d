//! Daily rollups — per-civil-day aggregates and the periodic scheduler that
//! writes yesterday's rollup through the [`RollupStore`] boundary.
//!
//! Rollups are idempotent: upserts are keyed by date, and a tick that finds
//! yesterday already written does nothing. Failures are logged and retried
//! on the next tick; there is no retry state to persist.

use crate::windows::{day_bounds, yesterday};
use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use marketpulse_core::{
    AnalyticsConfig, AnalyticsResult, DailyRollup, DomainEvent, EventSource, RollupStore,
};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Aggregate one civil day of events into per-type counts and a distinct
/// actor count. Events outside the day are ignored, so callers may pass a
/// superset slice.
pub fn compute_daily_rollup(
    events: &[DomainEvent],
    date: NaiveDate,
    tz: FixedOffset,
) -> DailyRollup {
    let window = day_bounds(date, tz);
    let mut event_counts: BTreeMap<String, u64> = BTreeMap::new();
    let mut actors: HashSet<&str> = HashSet::new();

    for event in events.iter().filter(|e| window.contains(e.created_at)) {
        *event_counts.entry(event.event_type.clone()).or_insert(0) += 1;
        if let Some(actor) = event.actor_id.as_deref() {
            actors.insert(actor);
        }
    }

    DailyRollup {
        date,
        event_counts,
        distinct_actors: actors.len() as u64,
    }
}

/// Periodic job that keeps the store's "yesterday" rollup current.
pub struct RollupScheduler {
    source: Arc<dyn EventSource>,
    store: Arc<dyn RollupStore>,
    config: AnalyticsConfig,
}

impl RollupScheduler {
    pub fn new(
        source: Arc<dyn EventSource>,
        store: Arc<dyn RollupStore>,
        config: AnalyticsConfig,
    ) -> Self {
        Self {
            source,
            store,
            config,
        }
    }

    /// One tick: resolve yesterday in the civil timezone, skip if its rollup
    /// is already stored, otherwise fetch the day's events, aggregate, and
    /// upsert. Returns the written rollup, or `None` when nothing was due.
    pub async fn run_once(&self, now: DateTime<Utc>) -> AnalyticsResult<Option<DailyRollup>> {
        let tz = self.config.civil_offset();
        let date = yesterday(now, tz);

        if self.store.rollup_for(date).await?.is_some() {
            debug!(date = %date, "Rollup already written, skipping");
            return Ok(None);
        }

        let window = day_bounds(date, tz);
        let events = self.source.fetch_events(None, &window.time_range()).await?;
        let rollup = compute_daily_rollup(&events, date, tz);
        self.store.upsert_rollup(rollup.clone()).await?;

        metrics::counter!("reporting.rollups_written").increment(1);
        info!(
            date = %date,
            events = rollup.event_counts.values().sum::<u64>(),
            distinct_actors = rollup.distinct_actors,
            "Daily rollup written"
        );
        Ok(Some(rollup))
    }

    /// Interval loop for the scheduler process. A failed tick is retried on
    /// the next interval; the upsert keyed by date keeps retries idempotent.
    pub async fn run(&self) {
        let period = std::time::Duration::from_secs(self.config.rollup_interval_secs);
        let mut interval = tokio::time::interval(period);
        loop {
            interval.tick().await;
            if let Err(e) = self.run_once(Utc::now()).await {
                metrics::counter!("reporting.rollup_failures").increment(1);
                warn!(error = %e, "Rollup tick failed, will retry next interval");
            }
        }
    }
}
