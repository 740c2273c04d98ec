use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{EngineError, PriceHistory};

/// Source of historical bars. The only suspension point in the pipeline;
/// fetch failures are non-fatal and become data-stage rejections.
#[async_trait]
pub trait PriceSource: Send + Sync {
    async fn fetch(
        &self,
        ticker: &str,
        as_of: DateTime<Utc>,
        lookback_years: u32,
    ) -> Result<PriceHistory, EngineError>;
}
