//! Report assembly — composes windows, counters, correlation, funnel, and
//! deltas into the marketplace KPI report.
//!
//! Every source query is wrapped: a failing query degrades its dependent
//! fields to `null` and the rest of the report still assembles. The run as a
//! whole fails only when every query failed. Computation over the fetched
//! snapshots is pure, so re-running with the same events and the same `now`
//! yields byte-identical output.

use crate::correlation::{self, CorrelatedCompletion};
use crate::counters::{count, distinct_actor_count, EventPredicate};
use crate::delta::KpiDelta;
use crate::funnel::{build_funnel, FunnelStepResult};
use crate::windows::{ReportWindows, WindowSpec};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use marketpulse_core::types::{event_types, payload_fields, TimeRange, UNKNOWN_TRACK};
use marketpulse_core::{
    AnalyticsConfig, AnalyticsError, AnalyticsResult, DomainEvent, EventSource,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};

// ─── KPI catalog ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum KpiKind {
    EventCount,
    DistinctActors,
}

struct KpiDefinition {
    key: &'static str,
    label: &'static str,
    event_type: &'static str,
    kind: KpiKind,
}

const KPI_CATALOG: [KpiDefinition; 6] = [
    KpiDefinition {
        key: "listings_created",
        label: "Listings created",
        event_type: event_types::LISTING_CREATED,
        kind: KpiKind::EventCount,
    },
    KpiDefinition {
        key: "ndas_signed",
        label: "NDAs signed",
        event_type: event_types::NDA_SIGNED,
        kind: KpiKind::EventCount,
    },
    KpiDefinition {
        key: "unique_nda_signers",
        label: "Unique NDA signers",
        event_type: event_types::NDA_SIGNED,
        kind: KpiKind::DistinctActors,
    },
    KpiDefinition {
        key: "deal_rooms_opened",
        label: "Deal rooms opened",
        event_type: event_types::DEAL_ROOM_OPENED,
        kind: KpiKind::EventCount,
    },
    KpiDefinition {
        key: "workflows_started",
        label: "Readiness workflows started",
        event_type: event_types::READINESS_STARTED,
        kind: KpiKind::EventCount,
    },
    KpiDefinition {
        key: "workflows_completed",
        label: "Readiness workflows completed",
        event_type: event_types::READINESS_COMPLETED,
        kind: KpiKind::EventCount,
    },
];

// ─── Report types ───────────────────────────────────────────────────────────

/// Per-track values of one KPI.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricSplit {
    pub value_7d: u64,
    pub value_30d: u64,
}

/// One KPI in the report. `None` means the computation's data source was
/// unavailable; `Some(0)` means it ran and matched nothing. The two are
/// never conflated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metric {
    pub label: String,
    pub value_7d: Option<u64>,
    pub value_30d: Option<u64>,
    pub delta_abs: Option<i64>,
    pub delta_pct: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub splits: Option<BTreeMap<String, MetricSplit>>,
}

impl Metric {
    fn unavailable(label: &str) -> Self {
        Self {
            label: label.to_string(),
            value_7d: None,
            value_30d: None,
            delta_abs: None,
            delta_pct: None,
            splits: None,
        }
    }
}

/// Readiness workflow volume for one track over the 30-day window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackBreakdown {
    pub track: String,
    pub workflows_started_30d: u64,
    pub workflows_completed_30d: u64,
}

/// The assembled report, consumed by dashboards as JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KpiReport {
    /// The caller's `now`; echoed rather than re-read so identical inputs
    /// produce identical bytes.
    pub generated_at: DateTime<Utc>,
    pub windows: ReportWindows,
    pub metrics: BTreeMap<String, Metric>,
    pub funnel: Option<Vec<FunnelStepResult>>,
    pub track_breakdown: Option<Vec<TrackBreakdown>>,
    pub median_completion_secs: Option<f64>,
    pub recent_completions: Option<Vec<CorrelatedCompletion>>,
}

impl KpiReport {
    pub fn to_json_pretty(&self) -> AnalyticsResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

// ─── Assembler ──────────────────────────────────────────────────────────────

/// Orchestrates one report run against an injected [`EventSource`] snapshot
/// and caches the generated reports by run instant.
pub struct ReportAssembler {
    source: Arc<dyn EventSource>,
    config: AnalyticsConfig,
    generated: DashMap<DateTime<Utc>, KpiReport>,
}

impl ReportAssembler {
    pub fn new(source: Arc<dyn EventSource>, config: AnalyticsConfig) -> Self {
        Self {
            source,
            config,
            generated: DashMap::new(),
        }
    }

    /// Run the full aggregation for `now`. Idempotent: same events + same
    /// `now` always yield the same report.
    pub async fn assemble(&self, now: DateTime<Utc>) -> AnalyticsResult<KpiReport> {
        let windows = ReportWindows::resolve(now, self.config.civil_offset());
        let lookback = windows.lookback();

        let mut attempted = 0u32;
        let mut failed = 0u32;

        // One fetch per distinct event type, shared by every section that
        // reads it.
        let mut slices: BTreeMap<&str, Option<Vec<DomainEvent>>> = BTreeMap::new();
        for def in &KPI_CATALOG {
            if !slices.contains_key(def.event_type) {
                let slice = self
                    .fetch(def.event_type, &lookback, &mut attempted, &mut failed)
                    .await;
                slices.insert(def.event_type, slice);
            }
        }

        let mut kpis = BTreeMap::new();
        for def in &KPI_CATALOG {
            let metric = match slices.get(def.event_type).and_then(|s| s.as_ref()) {
                Some(events) => compute_metric(def, events, &windows),
                None => Metric::unavailable(def.label),
            };
            kpis.insert(def.key.to_string(), metric);
        }

        // Funnel over the 30-day window; both step streams must be readable.
        let funnel_range = windows.last_30d.time_range();
        let viewed = self
            .fetch(event_types::STEP_VIEWED, &funnel_range, &mut attempted, &mut failed)
            .await;
        let completed = self
            .fetch(event_types::STEP_COMPLETED, &funnel_range, &mut attempted, &mut failed)
            .await;
        let funnel = match (viewed, completed) {
            (Some(mut step_events), Some(completions)) => {
                step_events.extend(completions);
                Some(build_funnel(&step_events, &windows.last_30d))
            }
            _ => None,
        };

        // Correlation and the track breakdown reuse the workflow slices.
        // Starts span the full lookback so a completion inside the window
        // still matches a start from before it.
        let starts = slices
            .get(event_types::READINESS_STARTED)
            .and_then(|s| s.as_ref());
        let completions = slices
            .get(event_types::READINESS_COMPLETED)
            .and_then(|s| s.as_ref());

        let (median_completion_secs, recent_completions) = match (starts, completions) {
            (Some(starts), Some(completions)) => {
                let in_window: Vec<DomainEvent> = completions
                    .iter()
                    .filter(|e| windows.last_30d.contains(e.created_at))
                    .cloned()
                    .collect();
                let matched =
                    correlation::correlate(starts, &in_window, payload_fields::WORKFLOW_ID);
                let durations: Vec<i64> = matched.iter().map(|m| m.elapsed_secs).collect();
                (
                    correlation::median(&durations),
                    Some(correlation::recent_completions(
                        &matched,
                        self.config.recent_completions_limit,
                    )),
                )
            }
            _ => (None, None),
        };

        let track_breakdown = match (starts, completions) {
            (Some(starts), Some(completions)) => {
                Some(build_track_breakdown(starts, completions, &windows.last_30d))
            }
            _ => None,
        };

        if attempted > 0 && failed == attempted {
            metrics::counter!("reporting.reports_failed").increment(1);
            return Err(AnalyticsError::SourceUnavailable(
                "every source query in the report run failed".to_string(),
            ));
        }

        let report = KpiReport {
            generated_at: now,
            windows,
            metrics: kpis,
            funnel,
            track_breakdown,
            median_completion_secs,
            recent_completions,
        };

        self.generated.insert(now, report.clone());
        metrics::counter!("reporting.reports_generated").increment(1);
        info!(generated_at = %now, failed_queries = failed, "KPI report assembled");
        Ok(report)
    }

    pub fn cached_report(&self, generated_at: DateTime<Utc>) -> Option<KpiReport> {
        self.generated.get(&generated_at).map(|r| r.clone())
    }

    pub fn latest_report(&self) -> Option<KpiReport> {
        self.generated
            .iter()
            .max_by_key(|entry| *entry.key())
            .map(|entry| entry.value().clone())
    }

    async fn fetch(
        &self,
        event_type: &str,
        range: &TimeRange,
        attempted: &mut u32,
        failed: &mut u32,
    ) -> Option<Vec<DomainEvent>> {
        *attempted += 1;
        match self.source.fetch_events(Some(event_type), range).await {
            Ok(events) => Some(events),
            Err(e) => {
                *failed += 1;
                metrics::counter!("reporting.source_failures").increment(1);
                warn!(
                    event_type,
                    error = %e,
                    "Source query failed; dependent fields degrade to null"
                );
                None
            }
        }
    }
}

fn compute_metric(def: &KpiDefinition, events: &[DomainEvent], windows: &ReportWindows) -> Metric {
    let pred = EventPredicate::event_type(def.event_type);
    let counter: fn(&[DomainEvent], &EventPredicate, &WindowSpec) -> u64 = match def.kind {
        KpiKind::EventCount => count,
        KpiKind::DistinctActors => distinct_actor_count,
    };

    let value_7d = counter(events, &pred, &windows.last_7d);
    let value_30d = counter(events, &pred, &windows.last_30d);
    let previous = counter(events, &pred, &windows.prev_30d);
    let delta = KpiDelta::compute(Some(value_30d), Some(previous));

    // Distinct-actor KPIs carry no splits: one actor can appear under
    // several tracks, so per-track distinct counts would not sum to the
    // undimensioned total.
    let splits = match def.kind {
        KpiKind::EventCount => Some(track_splits(events, &pred, windows)),
        KpiKind::DistinctActors => None,
    };

    Metric {
        label: def.label.to_string(),
        value_7d: Some(value_7d),
        value_30d: Some(value_30d),
        delta_abs: delta.delta_abs,
        delta_pct: delta.delta_pct,
        splits,
    }
}

fn track_splits(
    events: &[DomainEvent],
    pred: &EventPredicate,
    windows: &ReportWindows,
) -> BTreeMap<String, MetricSplit> {
    let mut splits: BTreeMap<String, MetricSplit> = BTreeMap::new();
    for event in events {
        if !windows.last_30d.contains(event.created_at) || !pred.matches(event) {
            continue;
        }
        let track = event
            .payload
            .str_field(payload_fields::TRACK)
            .unwrap_or(UNKNOWN_TRACK);
        let split = splits.entry(track.to_string()).or_default();
        split.value_30d += 1;
        if windows.last_7d.contains(event.created_at) {
            split.value_7d += 1;
        }
    }
    splits
}

fn build_track_breakdown(
    starts: &[DomainEvent],
    completions: &[DomainEvent],
    window: &WindowSpec,
) -> Vec<TrackBreakdown> {
    let mut by_track: BTreeMap<String, (u64, u64)> = BTreeMap::new();
    for event in starts.iter().filter(|e| window.contains(e.created_at)) {
        let track = event
            .payload
            .str_field(payload_fields::TRACK)
            .unwrap_or(UNKNOWN_TRACK);
        by_track.entry(track.to_string()).or_default().0 += 1;
    }
    for event in completions.iter().filter(|e| window.contains(e.created_at)) {
        let track = event
            .payload
            .str_field(payload_fields::TRACK)
            .unwrap_or(UNKNOWN_TRACK);
        by_track.entry(track.to_string()).or_default().1 += 1;
    }

    by_track
        .into_iter()
        .map(|(track, (started, completed))| TrackBreakdown {
            track,
            workflows_started_30d: started,
            workflows_completed_30d: completed,
        })
        .collect()
}
