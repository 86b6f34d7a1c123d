//! Start/completion correlation — pairs workflow events by a payload
//! correlation key and derives elapsed-time statistics.
//!
//! Matching builds two independent maps (earliest start, earliest completion
//! per key) and intersects them; no shared mutable accumulator, so it is safe
//! to run alongside the other report computations. Pairs with a non-positive
//! elapsed time are clock-skewed or malformed and are excluded rather than
//! counted as zero.

use chrono::{DateTime, Utc};
use marketpulse_core::types::{payload_fields, UNKNOWN_TRACK};
use marketpulse_core::DomainEvent;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One matched start/completion pair. Transient per report run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrelatedCompletion {
    pub correlation_key: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub elapsed_secs: i64,
    /// Track dimension from the completion payload; `"unknown"` when absent.
    pub track: String,
    /// Numeric score from the completion payload, when present.
    pub readiness_score: Option<f64>,
}

/// Match starts to completions sharing `key_field` in their payloads.
///
/// Events without the key (or with a non-string key) cannot be correlated
/// and are skipped. When a key fires more than once on either side, the
/// earliest event wins; later duplicates are instrumentation echoes. Output
/// is ordered by completion time, then key, so results are deterministic.
pub fn correlate(
    starts: &[DomainEvent],
    completions: &[DomainEvent],
    key_field: &str,
) -> Vec<CorrelatedCompletion> {
    let mut start_times: BTreeMap<&str, DateTime<Utc>> = BTreeMap::new();
    for event in starts {
        if let Some(key) = event.payload.str_field(key_field) {
            start_times
                .entry(key)
                .and_modify(|t| *t = (*t).min(event.created_at))
                .or_insert(event.created_at);
        }
    }

    let mut first_completions: BTreeMap<&str, &DomainEvent> = BTreeMap::new();
    for event in completions {
        if let Some(key) = event.payload.str_field(key_field) {
            first_completions
                .entry(key)
                .and_modify(|existing| {
                    if event.created_at < existing.created_at {
                        *existing = event;
                    }
                })
                .or_insert(event);
        }
    }

    let mut matched: Vec<CorrelatedCompletion> = first_completions
        .into_iter()
        .filter_map(|(key, completion)| {
            let started_at = *start_times.get(key)?;
            let elapsed_secs = (completion.created_at - started_at).num_seconds();
            if elapsed_secs <= 0 {
                return None;
            }
            Some(CorrelatedCompletion {
                correlation_key: key.to_string(),
                started_at,
                completed_at: completion.created_at,
                elapsed_secs,
                track: completion
                    .payload
                    .str_field(payload_fields::TRACK)
                    .unwrap_or(UNKNOWN_TRACK)
                    .to_string(),
                readiness_score: completion.payload.f64_field(payload_fields::SCORE),
            })
        })
        .collect();

    matched.sort_by(|a, b| {
        a.completed_at
            .cmp(&b.completed_at)
            .then_with(|| a.correlation_key.cmp(&b.correlation_key))
    });
    matched
}

/// Median of a duration list. Empty input has no median — `None`, which is
/// not the same thing as a zero-second median.
pub fn median(durations: &[i64]) -> Option<f64> {
    if durations.is_empty() {
        return None;
    }
    let mut sorted = durations.to_vec();
    sorted.sort_unstable();
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 1 {
        Some(sorted[mid] as f64)
    } else {
        Some((sorted[mid - 1] + sorted[mid]) as f64 / 2.0)
    }
}

/// The most recent `limit` completions, newest first.
pub fn recent_completions(
    matched: &[CorrelatedCompletion],
    limit: usize,
) -> Vec<CorrelatedCompletion> {
    matched.iter().rev().take(limit).cloned().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use marketpulse_core::types::event_types;
    use marketpulse_core::Payload;

    fn at(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 10, minute, 0).unwrap()
    }

    fn start(key: &str, minute: u32) -> DomainEvent {
        DomainEvent::new(
            event_types::READINESS_STARTED,
            Payload::new().with(payload_fields::WORKFLOW_ID, key),
            Some("s-1"),
            at(minute),
        )
    }

    fn completion(key: &str, minute: u32, track: Option<&str>) -> DomainEvent {
        let mut payload = Payload::new().with(payload_fields::WORKFLOW_ID, key);
        if let Some(track) = track {
            payload = payload.with(payload_fields::TRACK, track);
        }
        DomainEvent::new(event_types::READINESS_COMPLETED, payload, Some("s-1"), at(minute))
    }

    #[test]
    fn test_matches_only_shared_keys() {
        let starts = vec![start("wf-1", 0), start("wf-2", 1)];
        let completions = vec![completion("wf-2", 5, Some("guided")), completion("wf-9", 6, None)];

        let matched = correlate(&starts, &completions, payload_fields::WORKFLOW_ID);
        assert_eq!(matched.len(), 1);
        assert_eq!(matched[0].correlation_key, "wf-2");
        assert_eq!(matched[0].elapsed_secs, 4 * 60);
        assert_eq!(matched[0].track, "guided");
    }

    #[test]
    fn test_non_positive_elapsed_is_excluded() {
        let starts = vec![start("wf-1", 10), start("wf-2", 10)];
        // wf-1 completes before its start (clock skew), wf-2 at the same instant.
        let completions = vec![completion("wf-1", 5, None), completion("wf-2", 10, None)];
        assert!(correlate(&starts, &completions, payload_fields::WORKFLOW_ID).is_empty());
    }

    #[test]
    fn test_duplicate_events_use_earliest_on_each_side() {
        let starts = vec![start("wf-1", 8), start("wf-1", 2)];
        let completions = vec![completion("wf-1", 20, None), completion("wf-1", 12, None)];

        let matched = correlate(&starts, &completions, payload_fields::WORKFLOW_ID);
        assert_eq!(matched.len(), 1);
        assert_eq!(matched[0].elapsed_secs, 10 * 60);
    }

    #[test]
    fn test_events_without_key_are_skipped() {
        let keyless = DomainEvent::new(
            event_types::READINESS_STARTED,
            Payload::new(),
            None,
            at(0),
        );
        let completions = vec![completion("wf-1", 5, None)];
        assert!(correlate(&[keyless], &completions, payload_fields::WORKFLOW_ID).is_empty());
    }

    #[test]
    fn test_median_cases() {
        assert_eq!(median(&[]), None);
        assert_eq!(median(&[10, 20]), Some(15.0));
        assert_eq!(median(&[30, 10, 20]), Some(20.0));
        assert_eq!(median(&[30, 45, 60, 90, 120, 200, 300]), Some(90.0));
    }

    #[test]
    fn test_unknown_track_bucket_and_score() {
        let starts = vec![start("wf-1", 0)];
        let scored = {
            let mut c = completion("wf-1", 3, None);
            c.payload = c.payload.with(payload_fields::SCORE, 82.5);
            c
        };
        let matched = correlate(&starts, &[scored], payload_fields::WORKFLOW_ID);
        assert_eq!(matched[0].track, UNKNOWN_TRACK);
        assert_eq!(matched[0].readiness_score, Some(82.5));
    }

    #[test]
    fn test_recent_completions_is_bounded_and_newest_first() {
        let starts: Vec<_> = (0..5).map(|i| start(&format!("wf-{i}"), i)).collect();
        let completions: Vec<_> = (0..5)
            .map(|i| completion(&format!("wf-{i}"), 10 + i, None))
            .collect();
        let matched = correlate(&starts, &completions, payload_fields::WORKFLOW_ID);

        let recent = recent_completions(&matched, 3);
        assert_eq!(recent.len(), 3);
        assert_eq!(recent[0].correlation_key, "wf-4");
        assert_eq!(recent[2].correlation_key, "wf-2");
    }
}
