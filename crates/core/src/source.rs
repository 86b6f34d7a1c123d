//! Event source and rollup store boundaries — external collaborators.
//!
//! The aggregator takes an `Arc<dyn EventSource>` by injection, so report
//! runs are deterministic and mockable. In-memory implementations back the
//! tests and the CLI's NDJSON export mode.

use crate::error::{AnalyticsError, AnalyticsResult};
use crate::types::{DailyRollup, DomainEvent, TimeRange};
use async_trait::async_trait;
use chrono::NaiveDate;
use dashmap::DashMap;
use std::collections::HashSet;

/// Read-only view of the append-only event store.
#[async_trait]
pub trait EventSource: Send + Sync {
    /// Events with `created_at` in `[range.start, range.end)`, optionally
    /// restricted to one event type, ordered by `created_at` ascending.
    async fn fetch_events(
        &self,
        event_type: Option<&str>,
        range: &TimeRange,
    ) -> AnalyticsResult<Vec<DomainEvent>>;
}

/// Destination for per-day aggregates. Upserts are keyed by civil date, so
/// re-running a rollup for the same day replaces rather than duplicates.
#[async_trait]
pub trait RollupStore: Send + Sync {
    async fn upsert_rollup(&self, rollup: DailyRollup) -> AnalyticsResult<()>;
    async fn rollup_for(&self, date: NaiveDate) -> AnalyticsResult<Option<DailyRollup>>;
}

// ─── In-memory implementations ──────────────────────────────────────────────

/// Immutable in-memory event source; events are sorted once at construction.
pub struct InMemoryEventSource {
    events: Vec<DomainEvent>,
}

impl InMemoryEventSource {
    pub fn new(mut events: Vec<DomainEvent>) -> Self {
        events.sort_by_key(|e| e.created_at);
        Self { events }
    }

    /// Parse one JSON event per line. Blank lines are skipped; a malformed
    /// line fails the whole load, since a partial import would silently skew
    /// every downstream count.
    pub fn from_ndjson(input: &str) -> AnalyticsResult<Self> {
        let events = input
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(serde_json::from_str::<DomainEvent>)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(events))
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

#[async_trait]
impl EventSource for InMemoryEventSource {
    async fn fetch_events(
        &self,
        event_type: Option<&str>,
        range: &TimeRange,
    ) -> AnalyticsResult<Vec<DomainEvent>> {
        Ok(self
            .events
            .iter()
            .filter(|e| range.contains(e.created_at))
            .filter(|e| event_type.is_none_or(|t| e.event_type == t))
            .cloned()
            .collect())
    }
}

/// Test double that fails queries for the configured event types, or for
/// every query when constructed with [`FailingEventSource::failing_all`].
pub struct FailingEventSource {
    inner: InMemoryEventSource,
    failing: HashSet<String>,
    fail_all: bool,
}

impl FailingEventSource {
    pub fn failing_all(inner: InMemoryEventSource) -> Self {
        Self {
            inner,
            failing: HashSet::new(),
            fail_all: true,
        }
    }

    pub fn failing_types(inner: InMemoryEventSource, types: &[&str]) -> Self {
        Self {
            inner,
            failing: types.iter().map(|t| t.to_string()).collect(),
            fail_all: false,
        }
    }
}

#[async_trait]
impl EventSource for FailingEventSource {
    async fn fetch_events(
        &self,
        event_type: Option<&str>,
        range: &TimeRange,
    ) -> AnalyticsResult<Vec<DomainEvent>> {
        let fails = self.fail_all || event_type.is_some_and(|t| self.failing.contains(t));
        if fails {
            return Err(AnalyticsError::SourceUnavailable(format!(
                "query for {} rejected by test source",
                event_type.unwrap_or("<all>")
            )));
        }
        self.inner.fetch_events(event_type, range).await
    }
}

/// In-memory rollup store used by tests and the CLI scheduler mode.
#[derive(Default)]
pub struct InMemoryRollupStore {
    rollups: DashMap<NaiveDate, DailyRollup>,
}

impl InMemoryRollupStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.rollups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rollups.is_empty()
    }
}

#[async_trait]
impl RollupStore for InMemoryRollupStore {
    async fn upsert_rollup(&self, rollup: DailyRollup) -> AnalyticsResult<()> {
        self.rollups.insert(rollup.date, rollup);
        Ok(())
    }

    async fn rollup_for(&self, date: NaiveDate) -> AnalyticsResult<Option<DailyRollup>> {
        Ok(self.rollups.get(&date).map(|r| r.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::Payload;
    use crate::types::event_types;
    use chrono::{TimeZone, Utc};
    use std::collections::BTreeMap;

    fn event_at(event_type: &str, hour: u32) -> DomainEvent {
        DomainEvent::new(
            event_type,
            Payload::new(),
            Some("u-1"),
            Utc.with_ymd_and_hms(2025, 6, 1, hour, 0, 0).unwrap(),
        )
    }

    fn june_first() -> TimeRange {
        TimeRange {
            start: Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap(),
            end: Utc.with_ymd_and_hms(2025, 6, 2, 0, 0, 0).unwrap(),
        }
    }

    #[tokio::test]
    async fn test_fetch_filters_by_type_and_range() {
        let source = InMemoryEventSource::new(vec![
            event_at(event_types::LISTING_CREATED, 1),
            event_at(event_types::NDA_SIGNED, 2),
            event_at(event_types::NDA_SIGNED, 23),
            DomainEvent::new(
                event_types::NDA_SIGNED,
                Payload::new(),
                None,
                Utc.with_ymd_and_hms(2025, 6, 2, 0, 0, 0).unwrap(),
            ),
        ]);

        let ndas = source
            .fetch_events(Some(event_types::NDA_SIGNED), &june_first())
            .await
            .unwrap();
        assert_eq!(ndas.len(), 2);

        let all = source.fetch_events(None, &june_first()).await.unwrap();
        assert_eq!(all.len(), 3);
    }

    #[tokio::test]
    async fn test_fetch_is_ordered_by_created_at() {
        let source = InMemoryEventSource::new(vec![
            event_at(event_types::LISTING_CREATED, 9),
            event_at(event_types::LISTING_CREATED, 3),
            event_at(event_types::LISTING_CREATED, 6),
        ]);
        let events = source.fetch_events(None, &june_first()).await.unwrap();
        let hours: Vec<u32> = events
            .iter()
            .map(|e| chrono::Timelike::hour(&e.created_at))
            .collect();
        assert_eq!(hours, vec![3, 6, 9]);
    }

    #[tokio::test]
    async fn test_from_ndjson_rejects_malformed_lines() {
        let good = serde_json::to_string(&event_at(event_types::NDA_SIGNED, 1)).unwrap();
        let input = format!("{good}\n\nnot-json\n");
        assert!(InMemoryEventSource::from_ndjson(&input).is_err());

        let input = format!("{good}\n\n{good}\n");
        let source = InMemoryEventSource::from_ndjson(&input).unwrap();
        assert_eq!(source.len(), 2);
    }

    #[tokio::test]
    async fn test_failing_source_rejects_configured_types() {
        let inner = InMemoryEventSource::new(vec![
            event_at(event_types::NDA_SIGNED, 1),
            event_at(event_types::LISTING_CREATED, 2),
        ]);
        let source = FailingEventSource::failing_types(inner, &[event_types::NDA_SIGNED]);

        let err = source
            .fetch_events(Some(event_types::NDA_SIGNED), &june_first())
            .await;
        assert!(matches!(err, Err(AnalyticsError::SourceUnavailable(_))));

        let ok = source
            .fetch_events(Some(event_types::LISTING_CREATED), &june_first())
            .await
            .unwrap();
        assert_eq!(ok.len(), 1);
    }

    #[tokio::test]
    async fn test_rollup_upsert_replaces_same_date() {
        let store = InMemoryRollupStore::new();
        let date = NaiveDate::from_ymd_opt(2025, 6, 1).unwrap();

        let mut counts = BTreeMap::new();
        counts.insert("nda_signed".to_string(), 3);
        store
            .upsert_rollup(DailyRollup {
                date,
                event_counts: counts.clone(),
                distinct_actors: 2,
            })
            .await
            .unwrap();

        counts.insert("nda_signed".to_string(), 5);
        store
            .upsert_rollup(DailyRollup {
                date,
                event_counts: counts,
                distinct_actors: 4,
            })
            .await
            .unwrap();

        assert_eq!(store.len(), 1);
        let stored = store.rollup_for(date).await.unwrap().unwrap();
        assert_eq!(stored.distinct_actors, 4);
        assert_eq!(stored.event_counts.get("nda_signed"), Some(&5));
    }
}
