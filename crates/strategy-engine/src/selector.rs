use std::collections::HashSet;

use tracing::debug;

use trading_core::{IndicatorSeries, MarketRegime, TradeSignal, TrendDirection, VolatilityLevel};

use crate::{RangeReversion, StrategyVariant, TrendFollowing};

/// Owns the regime-to-strategy policy: trend-following in trends,
/// range-reversion in calm sideways markets, nothing otherwise.
#[derive(Debug, Clone)]
pub struct StrategySelector {
    trend_following: StrategyVariant,
    range_reversion: StrategyVariant,
}

impl StrategySelector {
    pub fn new(trend_following: TrendFollowing, range_reversion: RangeReversion) -> Self {
        Self {
            trend_following: StrategyVariant::TrendFollowing(trend_following),
            range_reversion: StrategyVariant::RangeReversion(range_reversion),
        }
    }

    /// Which variant runs under `regime`, if any.
    pub fn select(&self, regime: &MarketRegime) -> Option<&StrategyVariant> {
        if regime.is_trending {
            return Some(&self.trend_following);
        }
        if regime.trend_direction == TrendDirection::Sideways
            && regime.volatility_level != VolatilityLevel::High
        {
            return Some(&self.range_reversion);
        }
        None
    }

    /// Select and evaluate in one step.
    pub fn evaluate(
        &self,
        symbol: &str,
        series: &IndicatorSeries,
        regime: &MarketRegime,
        open_symbols: &HashSet<String>,
    ) -> Option<TradeSignal> {
        let variant = match self.select(regime) {
            Some(v) => v,
            None => {
                debug!(symbol, regime = %regime.label, "no strategy eligible this cycle");
                return None;
            }
        };
        variant.evaluate(symbol, series, regime, open_symbols)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use position_sizer::LeverageTiers;
    use crate::{RangeReversionConfig, TrendFollowingConfig};

    fn selector() -> StrategySelector {
        StrategySelector::new(
            TrendFollowing::new(TrendFollowingConfig::default(), LeverageTiers::default()),
            RangeReversion::new(RangeReversionConfig::default(), LeverageTiers::default()),
        )
    }

    fn regime(
        direction: TrendDirection,
        trending: bool,
        volatility: VolatilityLevel,
    ) -> MarketRegime {
        MarketRegime {
            trend_direction: direction,
            is_trending: trending,
            is_strongly_trending: false,
            volatility_level: volatility,
            adx: None,
            plus_di: None,
            minus_di: None,
            bandwidth: None,
            label: "test".to_string(),
        }
    }

    #[test]
    fn trending_regime_selects_trend_following() {
        let sel = selector();
        let variant = sel
            .select(&regime(TrendDirection::Up, true, VolatilityLevel::Normal))
            .expect("variant");
        assert_eq!(variant.name(), "trend_following");
    }

    #[test]
    fn calm_sideways_selects_range_reversion() {
        let sel = selector();
        let variant = sel
            .select(&regime(TrendDirection::Sideways, false, VolatilityLevel::Low))
            .expect("variant");
        assert_eq!(variant.name(), "range_reversion");
    }

    #[test]
    fn volatile_sideways_selects_nothing() {
        let sel = selector();
        assert!(sel
            .select(&regime(TrendDirection::Sideways, false, VolatilityLevel::High))
            .is_none());
    }

    #[test]
    fn unknown_volatility_sideways_still_ranges() {
        // Unknown is not High; the range variant may still run.
        let sel = selector();
        assert!(sel
            .select(&regime(TrendDirection::Sideways, false, VolatilityLevel::Unknown))
            .is_some());
    }

    #[test]
    fn directional_but_not_trending_selects_nothing() {
        // Degenerate regime (direction set, trending flag off) falls
        // through both arms of the policy.
        let sel = selector();
        assert!(sel
            .select(&regime(TrendDirection::Up, false, VolatilityLevel::Normal))
            .is_none());
    }
}
