/// Analysis over persisted snapshots: two-way comparison and per-path trends.
pub mod compare;
pub mod trend;

pub use compare::{compare, compare_snapshots, ComparisonResult, DiffItem, DiffStatus};
pub use trend::{analyze_trend, trend_of, TrendData, TrendDataPoint};
