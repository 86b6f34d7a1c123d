//! KPI and funnel aggregation over marketplace domain events — windowed
//! metrics, period-over-period deltas, conversion funnels, per-track splits,
//! start→completion correlation, and daily rollups.

pub mod assembler;
pub mod correlation;
pub mod counters;
pub mod delta;
pub mod funnel;
pub mod rollup;
pub mod windows;

pub use assembler::{KpiReport, Metric, ReportAssembler};
pub use delta::KpiDelta;
pub use funnel::FunnelStepResult;
pub use rollup::RollupScheduler;
pub use windows::{ReportWindows, WindowLabel, WindowSpec};
