use serde::{Deserialize, Serialize};
use signal_core::{
    CourtageBand, CourtageTiers, FxCostByGeography, Geography, Instrument, LiquidityTier,
    VolatilityRegime,
};

/// Base one-way slippage before the volatility-regime multiplier.
const SLIPPAGE_BASE: f64 = 0.001;

/// Round-trip execution cost, decomposed for reporting. All figures are
/// fractions of the traded notional.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CostBreakdown {
    pub fx: f64,
    pub courtage: f64,
    pub spread: f64,
    pub slippage: f64,
    pub total: f64,
}

/// Regime-based execution cost model.
pub struct ExecutionCostModel {
    fx: FxCostByGeography,
    courtage: CourtageTiers,
}

impl ExecutionCostModel {
    pub fn new(fx: FxCostByGeography, courtage: CourtageTiers) -> Self {
        Self { fx, courtage }
    }

    fn fx_cost(&self, geography: Geography) -> f64 {
        match geography {
            Geography::Sweden => self.fx.sweden,
            Geography::Nordic => self.fx.nordic,
            Geography::Other => self.fx.other,
        }
    }

    fn band_for(&self, notional: f64) -> &CourtageBand {
        if notional <= self.courtage.mini.notional_limit {
            &self.courtage.mini
        } else if notional <= self.courtage.small.notional_limit {
            &self.courtage.small
        } else {
            // Everything above the small band pays medium-tier rates,
            // including notionals past the medium limit.
            &self.courtage.medium
        }
    }

    /// Round-trip courtage as a fraction of notional: max(minimum fee,
    /// notional * rate), doubled for the two legs.
    fn courtage_cost(&self, notional: f64) -> f64 {
        if notional <= 0.0 {
            return 0.0;
        }
        let band = self.band_for(notional);
        let per_leg = band.min_fee.max(notional * band.rate);
        2.0 * per_leg / notional
    }

    fn spread_cost(&self, liquidity: LiquidityTier) -> f64 {
        match liquidity {
            LiquidityTier::LargeCap => 0.0005,
            LiquidityTier::MidCap => 0.0015,
            LiquidityTier::SmallCap => 0.0030,
        }
    }

    fn slippage_cost(&self, regime: VolatilityRegime) -> f64 {
        SLIPPAGE_BASE * regime.slippage_multiplier()
    }

    /// Full round-trip cost for trading `notional` of `instrument` under
    /// the given volatility regime.
    pub fn total_cost(
        &self,
        notional: f64,
        instrument: &Instrument,
        regime: VolatilityRegime,
    ) -> CostBreakdown {
        let fx = self.fx_cost(instrument.fx_geography());
        let courtage = self.courtage_cost(notional);
        let spread = self.spread_cost(instrument.liquidity_tier);
        let slippage = self.slippage_cost(regime);

        CostBreakdown {
            fx,
            courtage,
            spread,
            slippage,
            total: fx + courtage + spread + slippage,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use signal_core::EarningsRisk;

    fn model() -> ExecutionCostModel {
        ExecutionCostModel::new(FxCostByGeography::default(), CourtageTiers::default())
    }

    fn instrument(ticker: &str, geography: Geography, liquidity: LiquidityTier) -> Instrument {
        Instrument {
            ticker: ticker.into(),
            name: "Test".into(),
            sector: "Industrials".into(),
            geography,
            is_all_weather: false,
            liquidity_tier: liquidity,
            earnings_risk: EarningsRisk::None,
        }
    }

    #[test]
    fn swedish_large_cap_is_cheapest() {
        let inst = instrument("VOLV-B.ST", Geography::Sweden, LiquidityTier::LargeCap);
        let costs = model().total_cost(50_000.0, &inst, VolatilityRegime::Stable);

        assert_relative_eq!(costs.fx, 0.0, epsilon = 1e-12);
        // Mini band: max(1, 50_000 * 0.00015) = 7.5 per leg
        assert_relative_eq!(costs.courtage, 15.0 / 50_000.0, epsilon = 1e-12);
        assert_relative_eq!(costs.spread, 0.0005, epsilon = 1e-12);
        assert_relative_eq!(costs.slippage, 0.001, epsilon = 1e-12);
    }

    #[test]
    fn minimum_fee_dominates_tiny_trades() {
        let inst = instrument("SMAL.ST", Geography::Sweden, LiquidityTier::SmallCap);
        let costs = model().total_cost(2_000.0, &inst, VolatilityRegime::Stable);

        // max(1, 2000 * 0.00015) = 1 per leg, 2 round trip
        assert_relative_eq!(costs.courtage, 2.0 / 2_000.0, epsilon = 1e-12);
    }

    #[test]
    fn band_selection_by_notional() {
        let m = model();
        let inst = instrument("MID.ST", Geography::Sweden, LiquidityTier::MidCap);

        let small = m.total_cost(150_000.0, &inst, VolatilityRegime::Stable);
        // Small band: max(7, 150_000 * 0.00035) = 52.5 per leg
        assert_relative_eq!(small.courtage, 105.0 / 150_000.0, epsilon = 1e-12);

        let medium = m.total_cost(500_000.0, &inst, VolatilityRegime::Stable);
        // Medium band: max(15, 500_000 * 0.00056) = 280 per leg
        assert_relative_eq!(medium.courtage, 560.0 / 500_000.0, epsilon = 1e-12);
    }

    #[test]
    fn fx_tiers_by_geography() {
        let m = model();
        let stable = VolatilityRegime::Stable;

        let nordic = instrument("NOVO-B.CO", Geography::Nordic, LiquidityTier::LargeCap);
        assert_relative_eq!(
            m.total_cost(10_000.0, &nordic, stable).fx,
            0.0025,
            epsilon = 1e-12
        );

        let us = instrument("AAPL", Geography::Other, LiquidityTier::LargeCap);
        assert_relative_eq!(m.total_cost(10_000.0, &us, stable).fx, 0.005, epsilon = 1e-12);
    }

    #[test]
    fn slippage_scales_with_volatility_regime() {
        let m = model();
        let inst = instrument("VOLA.ST", Geography::Sweden, LiquidityTier::LargeCap);

        let stable = m.total_cost(10_000.0, &inst, VolatilityRegime::Stable);
        let explosive = m.total_cost(10_000.0, &inst, VolatilityRegime::Explosive);
        let contracting = m.total_cost(10_000.0, &inst, VolatilityRegime::Contracting);

        assert_relative_eq!(stable.slippage, 0.001, epsilon = 1e-12);
        assert_relative_eq!(explosive.slippage, 0.004, epsilon = 1e-12);
        assert_relative_eq!(contracting.slippage, 0.0005, epsilon = 1e-12);
    }

    #[test]
    fn total_is_the_sum_of_parts() {
        let inst = instrument("SUM.ST", Geography::Sweden, LiquidityTier::MidCap);
        let costs = model().total_cost(75_000.0, &inst, VolatilityRegime::Expanding);
        assert_relative_eq!(
            costs.total,
            costs.fx + costs.courtage + costs.spread + costs.slippage,
            epsilon = 1e-12
        );
    }
}
