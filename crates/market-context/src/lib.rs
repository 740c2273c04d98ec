pub mod context;
pub mod regime;

pub use context::{check_context, ContextCheck};
pub use regime::{
    classify_market_regime, classify_volatility_regime, universe_breadth, MacroSignals,
    RegimeAssessment,
};
