pub mod orders;
pub mod positions;
pub mod reconcile;
pub mod stats;
pub mod strategy;

pub use orders::OrderRegistry;
pub use positions::{PositionLedger, PositionSnapshot};
pub use reconcile::{ReconcileOutcome, ReconciliationEngine};
pub use stats::{StatisticsAggregator, StatsSnapshot};
pub use strategy::{Decision, SideState, StrategyEngine, StrategyParams};
