use crate::payload::Payload;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// A single domain event emitted by the marketplace (listing flows, NDA
/// signing, deal rooms, seller readiness workflows). Append-only and
/// immutable once written; this subsystem only ever reads them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainEvent {
    pub event_id: Uuid,
    pub event_type: String,
    /// Free-form key/value pairs set by the producing module. Access through
    /// [`Payload`] accessors only; shape is a convention, not a schema.
    #[serde(default)]
    pub payload: Payload,
    pub actor_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl DomainEvent {
    pub fn new(
        event_type: impl Into<String>,
        payload: Payload,
        actor_id: Option<&str>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            event_type: event_type.into(),
            payload,
            actor_id: actor_id.map(|s| s.to_string()),
            created_at,
        }
    }
}

/// Event type names produced by the marketplace modules.
pub mod event_types {
    pub const LISTING_CREATED: &str = "listing_created";
    pub const NDA_SIGNED: &str = "nda_signed";
    pub const DEAL_ROOM_OPENED: &str = "deal_room_opened";
    pub const READINESS_STARTED: &str = "readiness_started";
    pub const READINESS_COMPLETED: &str = "readiness_completed";
    pub const STEP_VIEWED: &str = "step_viewed";
    pub const STEP_COMPLETED: &str = "step_completed";
}

/// Payload field names used by convention across event producers.
pub mod payload_fields {
    /// Funnel step identifier on `step_viewed` / `step_completed` events.
    pub const STEP: &str = "step";
    /// Product track dimension (e.g. "guided", "self_serve").
    pub const TRACK: &str = "track";
    /// Correlation key pairing a workflow start with its completion.
    pub const WORKFLOW_ID: &str = "workflow_id";
    /// Numeric readiness score attached to workflow completions.
    pub const SCORE: &str = "readiness_score";
}

/// Bucket name for events whose track field is missing or mistyped.
pub const UNKNOWN_TRACK: &str = "unknown";

/// One stage of the seller readiness workflow. The catalog is fixed at build
/// time; output ordering always follows `order`, never arrival order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepDefinition {
    pub step_id: &'static str,
    pub order: usize,
}

/// The seller readiness funnel, in workflow order.
pub const READINESS_STEPS: [StepDefinition; 8] = [
    StepDefinition { step_id: "intent", order: 0 },
    StepDefinition { step_id: "track", order: 1 },
    StepDefinition { step_id: "profile", order: 2 },
    StepDefinition { step_id: "financials", order: 3 },
    StepDefinition { step_id: "risk", order: 4 },
    StepDefinition { step_id: "preview", order: 5 },
    StepDefinition { step_id: "readiness", order: 6 },
    StepDefinition { step_id: "next_actions", order: 7 },
];

/// Half-open time interval `[start, end)` bounding which events a
/// computation includes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeRange {
    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        instant >= self.start && instant < self.end
    }
}

/// Per-calendar-day aggregate written through the [`crate::RollupStore`]
/// boundary. Keyed by civil date; upserts with the same date replace the row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyRollup {
    pub date: NaiveDate,
    pub event_counts: BTreeMap<String, u64>,
    pub distinct_actors: u64,
}
