pub mod costs;
pub mod kelly;
pub mod post;
pub mod trend;

pub use costs::{CostBreakdown, ExecutionCostModel};
pub use kelly::{atr_pct, base_allocation, clamp_allocation, volatility_factor};
pub use post::PostProcessor;
pub use trend::{trend_filter, TrendCheck, TrendVerdict};
