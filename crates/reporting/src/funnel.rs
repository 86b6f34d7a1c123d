//! Funnel construction over the static readiness step catalog.
//!
//! Step order comes from the catalog, never from arrival order or counts —
//! funnel semantics depend on the step sequence. A negative drop-off
//! (completions outrunning views) is a data-quality signal and is surfaced
//! as-is instead of being clamped.

use crate::counters::{count, EventPredicate};
use crate::windows::WindowSpec;
use marketpulse_core::types::{event_types, payload_fields, READINESS_STEPS, UNKNOWN_TRACK};
use marketpulse_core::DomainEvent;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::warn;

/// Viewed/completed counts for one dimension bucket of a step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepSplit {
    pub viewed: u64,
    pub completed: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunnelStepResult {
    pub step_id: String,
    pub step_index: usize,
    pub viewed_count: u64,
    pub completed_count: u64,
    /// `viewed − completed`; negative when instrumentation double-fires a
    /// completion or loses a view.
    pub drop_off: i64,
    /// Percentage of viewers who dropped. Explicitly `0.0` when nothing was
    /// viewed; missing data never reaches here (a failed source degrades the
    /// whole funnel section instead).
    pub drop_off_rate: f64,
    /// Set when `drop_off` is negative, so consumers can flag the step.
    pub data_quality_warning: bool,
    /// Per-track viewed/completed counts; missing or mistyped track values
    /// land in the `"unknown"` bucket, so splits always sum to the totals.
    pub dimension_splits: BTreeMap<String, StepSplit>,
}

/// Compute the funnel for one window from step view/completion events.
pub fn build_funnel(events: &[DomainEvent], window: &WindowSpec) -> Vec<FunnelStepResult> {
    READINESS_STEPS
        .iter()
        .map(|step| {
            let viewed_pred = EventPredicate::event_type(event_types::STEP_VIEWED)
                .with_field(payload_fields::STEP, step.step_id);
            let completed_pred = EventPredicate::event_type(event_types::STEP_COMPLETED)
                .with_field(payload_fields::STEP, step.step_id);

            let viewed_count = count(events, &viewed_pred, window);
            let completed_count = count(events, &completed_pred, window);

            let mut dimension_splits: BTreeMap<String, StepSplit> = BTreeMap::new();
            for event in events.iter().filter(|e| window.contains(e.created_at)) {
                let track = event
                    .payload
                    .str_field(payload_fields::TRACK)
                    .unwrap_or(UNKNOWN_TRACK);
                if viewed_pred.matches(event) {
                    dimension_splits.entry(track.to_string()).or_default().viewed += 1;
                } else if completed_pred.matches(event) {
                    dimension_splits.entry(track.to_string()).or_default().completed += 1;
                }
            }

            let drop_off = viewed_count as i64 - completed_count as i64;
            let drop_off_rate = if viewed_count == 0 {
                0.0
            } else {
                drop_off as f64 / viewed_count as f64 * 100.0
            };
            let data_quality_warning = drop_off < 0;
            if data_quality_warning {
                warn!(
                    step = step.step_id,
                    viewed = viewed_count,
                    completed = completed_count,
                    "Funnel step completed more than it was viewed"
                );
            }

            FunnelStepResult {
                step_id: step.step_id.to_string(),
                step_index: step.order,
                viewed_count,
                completed_count,
                drop_off,
                drop_off_rate,
                data_quality_warning,
                dimension_splits,
            }
        })
        .collect()
}
