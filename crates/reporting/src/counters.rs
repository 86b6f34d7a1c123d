//! Event filtering and counting over an already-fetched snapshot.
//!
//! Both counters are pure: they assume their input slice is valid and return
//! `0` as a successful "no matching events" result. Source failures are the
//! assembler's concern, never fabricated here as zeroes.

use crate::windows::WindowSpec;
use marketpulse_core::DomainEvent;
use serde_json::Value;
use std::collections::HashSet;

/// Predicate over `(event_type, payload)`. Payload fields are compared
/// through the safe accessor, so an event missing a required field (or
/// carrying the wrong type) simply does not match.
#[derive(Debug, Clone)]
pub struct EventPredicate {
    event_type: String,
    payload_equals: Vec<(String, Value)>,
}

impl EventPredicate {
    pub fn event_type(event_type: &str) -> Self {
        Self {
            event_type: event_type.to_string(),
            payload_equals: Vec::new(),
        }
    }

    pub fn with_field(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.payload_equals.push((key.to_string(), value.into()));
        self
    }

    pub fn matches(&self, event: &DomainEvent) -> bool {
        event.event_type == self.event_type
            && self
                .payload_equals
                .iter()
                .all(|(key, expected)| event.payload.get(key).is_some_and(|v| v == expected))
    }
}

/// Number of events matching `predicate` inside `window`.
pub fn count(events: &[DomainEvent], predicate: &EventPredicate, window: &WindowSpec) -> u64 {
    events
        .iter()
        .filter(|e| window.contains(e.created_at) && predicate.matches(e))
        .count() as u64
}

/// Number of distinct actors behind the matching events. Events without an
/// actor carry no identity and are left out of the distinct count.
pub fn distinct_actor_count(
    events: &[DomainEvent],
    predicate: &EventPredicate,
    window: &WindowSpec,
) -> u64 {
    let actors: HashSet<&str> = events
        .iter()
        .filter(|e| window.contains(e.created_at) && predicate.matches(e))
        .filter_map(|e| e.actor_id.as_deref())
        .collect();
    actors.len() as u64
}
