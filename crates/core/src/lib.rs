//! Core domain model for MarketPulse — the KPI/funnel analytics subsystem of
//! the marketplace platform.
//!
//! Defines the append-only domain event shape, the safe payload accessor, the
//! external `EventSource`/`RollupStore` boundaries, and shared configuration.

pub mod config;
pub mod error;
pub mod payload;
pub mod source;
pub mod types;

pub use config::AnalyticsConfig;
pub use error::{AnalyticsError, AnalyticsResult};
pub use payload::Payload;
pub use source::{EventSource, RollupStore};
pub use types::{DailyRollup, DomainEvent, TimeRange};
