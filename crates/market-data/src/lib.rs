pub mod disk_cache;
pub mod indicators;
pub mod market_data;

pub use disk_cache::IndicatorDiskCache;
pub use market_data::{MarketData, SeriesKind};
