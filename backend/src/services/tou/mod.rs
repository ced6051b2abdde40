//! TOU calculation engine.
//!
//! ```text
//! facts ─► records (names) ─► traffic share ─► exclusions ─► groups (stats)
//!       ─► projection (base level, rate, years) ─► seasonality ─► CSV report
//! ```

pub mod aggregate;
pub mod engine;
pub mod projection;
pub mod records;
pub mod report;
pub mod seasonality;
pub mod stats;
pub mod traffic;

pub use engine::{extract, run, EngineOptions, EngineOutcome};
pub use projection::{annual_rate, compound, project, Projection};
pub use report::{composite_key, ReportLayout};
pub use stats::GroupStats;
