//! Strategy variants and regime-based selection.
//!
//! The variant set is closed: `StrategyVariant` is an enum, dispatch
//! is exhaustive, and a new variant is an explicit new case rather
//! than a registry entry.

pub mod range;
pub mod selector;
pub mod trend;

use std::collections::HashSet;

use trading_core::{IndicatorSeries, MarketRegime, TradeSignal};

pub use range::{RangeReversion, RangeReversionConfig};
pub use selector::StrategySelector;
pub use trend::{TrendFollowing, TrendFollowingConfig};

/// One of the configured strategy implementations.
#[derive(Debug, Clone)]
pub enum StrategyVariant {
    TrendFollowing(TrendFollowing),
    RangeReversion(RangeReversion),
}

impl StrategyVariant {
    pub fn name(&self) -> &'static str {
        match self {
            StrategyVariant::TrendFollowing(s) => s.name(),
            StrategyVariant::RangeReversion(s) => s.name(),
        }
    }

    /// Evaluate entry conditions for `symbol`. Returns `None` when the
    /// symbol is already open, required indicator values are
    /// undefined, the risk per unit is non-positive, or the score is
    /// below the variant's minimum strength. Never errors.
    pub fn evaluate(
        &self,
        symbol: &str,
        series: &IndicatorSeries,
        regime: &MarketRegime,
        open_symbols: &HashSet<String>,
    ) -> Option<TradeSignal> {
        match self {
            StrategyVariant::TrendFollowing(s) => s.evaluate(symbol, series, regime, open_symbols),
            StrategyVariant::RangeReversion(s) => s.evaluate(symbol, series, regime, open_symbols),
        }
    }
}
