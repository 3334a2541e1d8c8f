use std::collections::HashSet;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use position_sizer::LeverageTiers;
use trading_core::columns;
use trading_core::{
    IndicatorSeries, MarketRegime, StrategyKind, TradeDirection, TradeSignal, TrendDirection,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrendFollowingConfig {
    /// Minimum accumulated score for a signal to be emitted.
    pub min_strength: f64,
    /// ATR multiple applied beyond the recent extreme for the stop.
    pub atr_multiplier: f64,
    /// Take-profit distance as a multiple of risk distance.
    pub reward_ratio: f64,
    /// Rows scanned for the recent extreme (spec caps this at 20).
    pub lookback: usize,
}

impl Default for TrendFollowingConfig {
    fn default() -> Self {
        Self {
            min_strength: 0.6,
            atr_multiplier: 1.5,
            reward_ratio: 2.0,
            lookback: 20,
        }
    }
}

/// Enters in the direction of an established trend once enough
/// independent confirmations line up.
#[derive(Debug, Clone)]
pub struct TrendFollowing {
    config: TrendFollowingConfig,
    tiers: LeverageTiers,
}

impl TrendFollowing {
    pub fn new(config: TrendFollowingConfig, tiers: LeverageTiers) -> Self {
        Self { config, tiers }
    }

    pub fn name(&self) -> &'static str {
        StrategyKind::TrendFollowing.as_str()
    }

    pub fn evaluate(
        &self,
        symbol: &str,
        series: &IndicatorSeries,
        regime: &MarketRegime,
        open_symbols: &HashSet<String>,
    ) -> Option<TradeSignal> {
        if open_symbols.contains(symbol) {
            debug!(symbol, "skipping evaluation, position already open");
            return None;
        }
        if !regime.is_trending {
            return None;
        }

        let direction = match regime.trend_direction {
            TrendDirection::Up => TradeDirection::Long,
            TrendDirection::Down => TradeDirection::Short,
            TrendDirection::Sideways => return None,
        };

        let latest = series.latest()?;

        let required = [
            columns::CLOSE,
            columns::EMA_FAST,
            columns::EMA_MEDIUM,
            columns::EMA_SLOW,
            columns::ATR,
        ];
        let missing = latest.missing(&required);
        if !missing.is_empty() {
            warn!(symbol, ?missing, "trend evaluation skipped, indicators undefined");
            return None;
        }

        let close = latest.get(columns::CLOSE)?;
        let ema_fast = latest.get(columns::EMA_FAST)?;
        let ema_medium = latest.get(columns::EMA_MEDIUM)?;
        let ema_slow = latest.get(columns::EMA_SLOW)?;
        let atr = latest.get(columns::ATR)?;

        let mut score: f64 = 0.0;

        // EMA stack aligned with the trend and price above/below the
        // medium line.
        let aligned = match direction {
            TradeDirection::Long => {
                ema_fast > ema_medium && ema_medium > ema_slow && close > ema_medium
            }
            TradeDirection::Short => {
                ema_fast < ema_medium && ema_medium < ema_slow && close < ema_medium
            }
        };
        if aligned {
            score += 0.4;
        }

        // MACD line on the right side of its signal line.
        if let (Some(macd), Some(macd_signal)) =
            (latest.get(columns::MACD), latest.get(columns::MACD_SIGNAL))
        {
            let agrees = match direction {
                TradeDirection::Long => macd > macd_signal,
                TradeDirection::Short => macd < macd_signal,
            };
            if agrees {
                score += 0.3;
            }
        }

        // RSI in the directional zone: strong but not exhausted.
        if let Some(rsi) = latest.get(columns::RSI) {
            let in_zone = match direction {
                TradeDirection::Long => rsi > 50.0 && rsi <= 70.0,
                TradeDirection::Short => rsi < 50.0 && rsi >= 30.0,
            };
            if in_zone {
                score += 0.3;
            }
        }

        // Above-average volume.
        if let (Some(volume), Some(volume_sma)) =
            (latest.get(columns::VOLUME), latest.get(columns::VOLUME_SMA))
        {
            if volume > volume_sma {
                score += 0.1;
            }
        }

        let score = score.min(1.0);
        if score < self.config.min_strength {
            debug!(symbol, score, "trend score below minimum strength");
            return None;
        }

        let offset = self.config.atr_multiplier * atr;
        let stop_loss = match direction {
            TradeDirection::Long => series.lookback_min(columns::LOW, self.config.lookback)? - offset,
            TradeDirection::Short => {
                series.lookback_max(columns::HIGH, self.config.lookback)? + offset
            }
        };

        let risk = match direction {
            TradeDirection::Long => close - stop_loss,
            TradeDirection::Short => stop_loss - close,
        };
        if risk <= 0.0 {
            warn!(symbol, close, stop_loss, "non-positive risk per unit, signal discarded");
            return None;
        }

        let take_profit = match direction {
            TradeDirection::Long => close + self.config.reward_ratio * risk,
            TradeDirection::Short => close - self.config.reward_ratio * risk,
        };

        let signal = TradeSignal {
            symbol: symbol.to_string(),
            direction,
            entry_price: close,
            stop_loss,
            take_profit,
            suggested_leverage: self.tiers.leverage_for(score),
            strength: score,
            strategy: StrategyKind::TrendFollowing,
            trigger_price: close,
            created_at: Utc::now(),
        };

        if !signal.has_valid_geometry() {
            warn!(symbol, "invalid signal geometry, discarded");
            return None;
        }

        debug!(
            symbol,
            direction = direction.as_str(),
            score,
            entry = close,
            stop = stop_loss,
            target = take_profit,
            "trend-following signal"
        );
        Some(signal)
    }
}
