use std::collections::HashSet;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use position_sizer::LeverageTiers;
use trading_core::columns;
use trading_core::{IndicatorSeries, MarketRegime, StrategyKind, TradeDirection, TradeSignal};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RangeReversionConfig {
    pub min_strength: f64,
    /// ATR multiple beyond the touched band edge for the stop.
    pub atr_multiplier: f64,
    /// Take-profit distance as a multiple of risk, before the
    /// midline cap.
    pub reward_ratio: f64,
    /// Fixed stop offset used when the ATR-derived stop is unusable.
    pub fallback_stop_pct: f64,
}

impl Default for RangeReversionConfig {
    fn default() -> Self {
        Self {
            min_strength: 0.6,
            atr_multiplier: 1.0,
            reward_ratio: 1.5,
            fallback_stop_pct: 0.01,
        }
    }
}

/// Fades moves into a volatility band edge when a bounded oscillator
/// confirms the extreme. Intended for ranging, non-volatile markets;
/// the selector owns that policy, not this type.
#[derive(Debug, Clone)]
pub struct RangeReversion {
    config: RangeReversionConfig,
    tiers: LeverageTiers,
}

impl RangeReversion {
    pub fn new(config: RangeReversionConfig, tiers: LeverageTiers) -> Self {
        Self { config, tiers }
    }

    pub fn name(&self) -> &'static str {
        StrategyKind::RangeReversion.as_str()
    }

    pub fn evaluate(
        &self,
        symbol: &str,
        series: &IndicatorSeries,
        _regime: &MarketRegime,
        open_symbols: &HashSet<String>,
    ) -> Option<TradeSignal> {
        if open_symbols.contains(symbol) {
            debug!(symbol, "skipping evaluation, position already open");
            return None;
        }

        let latest = series.latest()?;

        let required = [
            columns::CLOSE,
            columns::BB_UPPER,
            columns::BB_MIDDLE,
            columns::BB_LOWER,
            columns::RSI,
        ];
        let missing = latest.missing(&required);
        if !missing.is_empty() {
            warn!(symbol, ?missing, "range evaluation skipped, indicators undefined");
            return None;
        }

        let close = latest.get(columns::CLOSE)?;
        let upper = latest.get(columns::BB_UPPER)?;
        let middle = latest.get(columns::BB_MIDDLE)?;
        let lower = latest.get(columns::BB_LOWER)?;
        let rsi = latest.get(columns::RSI)?;
        let atr = latest.get(columns::ATR);

        // Band touch plus oscillator extreme, deeper extreme scores more.
        let (direction, touched_extreme, mut score): (TradeDirection, f64, f64) = if close
            <= lower
            && rsi < 30.0
        {
            let mut s = 0.5 + 0.3;
            if rsi < 20.0 {
                s += 0.2;
            }
            (TradeDirection::Long, lower, s)
        } else if close >= upper && rsi > 70.0 {
            let mut s = 0.5 + 0.3;
            if rsi > 80.0 {
                s += 0.2;
            }
            (TradeDirection::Short, upper, s)
        } else {
            return None;
        };
        score = score.min(1.0);

        if score < self.config.min_strength {
            debug!(symbol, score, "range score below minimum strength");
            return None;
        }

        let stop_loss = self.stop_for(direction, close, touched_extreme, atr);

        let risk = match direction {
            TradeDirection::Long => close - stop_loss,
            TradeDirection::Short => stop_loss - close,
        };
        if risk <= 0.0 {
            warn!(symbol, close, stop_loss, "non-positive risk per unit, signal discarded");
            return None;
        }

        // Target reverts toward the midline but never through it.
        let take_profit = match direction {
            TradeDirection::Long => (close + self.config.reward_ratio * risk).min(middle),
            TradeDirection::Short => (close - self.config.reward_ratio * risk).max(middle),
        };

        let signal = TradeSignal {
            symbol: symbol.to_string(),
            direction,
            entry_price: close,
            stop_loss,
            take_profit,
            suggested_leverage: self.tiers.leverage_for(score),
            strength: score,
            strategy: StrategyKind::RangeReversion,
            trigger_price: touched_extreme,
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
            "range-reversion signal"
        );
        Some(signal)
    }

    /// ATR-offset stop beyond the touched band edge, falling back to a
    /// fixed percentage offset from entry when ATR is undefined or the
    /// derived stop fails to clear entry.
    fn stop_for(
        &self,
        direction: TradeDirection,
        entry: f64,
        touched_extreme: f64,
        atr: Option<f64>,
    ) -> f64 {
        let atr_stop = atr.map(|atr| {
            let offset = self.config.atr_multiplier * atr;
            match direction {
                TradeDirection::Long => touched_extreme - offset,
                TradeDirection::Short => touched_extreme + offset,
            }
        });

        let usable = atr_stop.filter(|stop| match direction {
            TradeDirection::Long => *stop < entry,
            TradeDirection::Short => *stop > entry,
        });

        usable.unwrap_or_else(|| match direction {
            TradeDirection::Long => entry * (1.0 - self.config.fallback_stop_pct),
            TradeDirection::Short => entry * (1.0 + self.config.fallback_stop_pct),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use trading_core::{IndicatorSnapshot, MarketRegime, TrendDirection, VolatilityLevel};

    fn ranging_regime() -> MarketRegime {
        MarketRegime {
            trend_direction: TrendDirection::Sideways,
            is_trending: false,
            is_strongly_trending: false,
            volatility_level: VolatilityLevel::Normal,
            adx: Some(14.0),
            plus_di: Some(18.0),
            minus_di: Some(19.0),
            bandwidth: Some(0.05),
            label: "test".to_string(),
        }
    }

    fn band_row(close: f64, rsi: f64, atr: Option<f64>) -> IndicatorSnapshot {
        IndicatorSnapshot::new()
            .with(columns::CLOSE, Some(close))
            .with(columns::BB_LOWER, Some(95.0))
            .with(columns::BB_MIDDLE, Some(100.0))
            .with(columns::BB_UPPER, Some(105.0))
            .with(columns::RSI, Some(rsi))
            .with(columns::ATR, atr)
    }

    fn series_of(row: IndicatorSnapshot) -> IndicatorSeries {
        IndicatorSeries::new(vec![row])
    }

    #[test]
    fn lower_band_touch_with_oversold_rsi_goes_long() {
        let strategy = RangeReversion::new(RangeReversionConfig::default(), LeverageTiers::default());
        let signal = strategy
            .evaluate(
                "SOL-USDT-SWAP",
                &series_of(band_row(94.5, 25.0, Some(1.0))),
                &ranging_regime(),
                &HashSet::new(),
            )
            .expect("long signal");

        assert_eq!(signal.direction, TradeDirection::Long);
        assert_relative_eq!(signal.strength, 0.8, epsilon = 1e-9);
        // Stop beyond the touched band edge by one ATR.
        assert_relative_eq!(signal.stop_loss, 94.0, epsilon = 1e-9);
        assert!(signal.has_valid_geometry());
    }

    #[test]
    fn deeper_oversold_scores_higher() {
        let strategy = RangeReversion::new(RangeReversionConfig::default(), LeverageTiers::default());
        let signal = strategy
            .evaluate(
                "SOL-USDT-SWAP",
                &series_of(band_row(94.5, 15.0, Some(1.0))),
                &ranging_regime(),
                &HashSet::new(),
            )
            .expect("long signal");

        assert_relative_eq!(signal.strength, 1.0, epsilon = 1e-9);
    }

    #[test]
    fn target_capped_at_midline() {
        let strategy = RangeReversion::new(RangeReversionConfig::default(), LeverageTiers::default());
        // Entry 94.5, stop 94.0 -> risk 0.5 -> raw target 95.25, well
        // below the midline. Widen the risk to force the cap instead.
        let signal = strategy
            .evaluate(
                "SOL-USDT-SWAP",
                &series_of(band_row(94.5, 25.0, Some(4.0))),
                &ranging_regime(),
                &HashSet::new(),
            )
            .expect("long signal");

        // Stop = 95 - 4 = 91, risk 3.5, raw target 99.75 < 100 midline.
        assert_relative_eq!(signal.take_profit, 99.75, epsilon = 1e-9);

        let capped = strategy
            .evaluate(
                "SOL-USDT-SWAP",
                &series_of(band_row(94.5, 25.0, Some(5.0))),
                &ranging_regime(),
                &HashSet::new(),
            )
            .expect("long signal");

        // Raw target 101.25 exceeds the midline and is capped at it.
        assert_relative_eq!(capped.take_profit, 100.0, epsilon = 1e-9);
    }

    #[test]
    fn undefined_atr_falls_back_to_percentage_stop() {
        let strategy = RangeReversion::new(RangeReversionConfig::default(), LeverageTiers::default());
        let signal = strategy
            .evaluate(
                "SOL-USDT-SWAP",
                &series_of(band_row(94.5, 25.0, None)),
                &ranging_regime(),
                &HashSet::new(),
            )
            .expect("long signal");

        assert_relative_eq!(signal.stop_loss, 94.5 * 0.99, epsilon = 1e-9);
    }

    #[test]
    fn upper_band_touch_with_overbought_rsi_goes_short() {
        let strategy = RangeReversion::new(RangeReversionConfig::default(), LeverageTiers::default());
        let signal = strategy
            .evaluate(
                "SOL-USDT-SWAP",
                &series_of(band_row(105.5, 84.0, Some(1.0))),
                &ranging_regime(),
                &HashSet::new(),
            )
            .expect("short signal");

        assert_eq!(signal.direction, TradeDirection::Short);
        assert_relative_eq!(signal.strength, 1.0, epsilon = 1e-9);
        assert_relative_eq!(signal.stop_loss, 106.0, epsilon = 1e-9);
        assert!(signal.take_profit >= 100.0);
    }

    #[test]
    fn no_touch_no_signal() {
        let strategy = RangeReversion::new(RangeReversionConfig::default(), LeverageTiers::default());
        assert!(strategy
            .evaluate(
                "SOL-USDT-SWAP",
                &series_of(band_row(100.0, 50.0, Some(1.0))),
                &ranging_regime(),
                &HashSet::new(),
            )
            .is_none());
    }

    #[test]
    fn band_touch_without_oscillator_extreme_no_signal() {
        let strategy = RangeReversion::new(RangeReversionConfig::default(), LeverageTiers::default());
        assert!(strategy
            .evaluate(
                "SOL-USDT-SWAP",
                &series_of(band_row(94.5, 45.0, Some(1.0))),
                &ranging_regime(),
                &HashSet::new(),
            )
            .is_none());
    }

    #[test]
    fn missing_band_columns_return_none() {
        let strategy = RangeReversion::new(RangeReversionConfig::default(), LeverageTiers::default());
        let mut row = band_row(94.5, 25.0, Some(1.0));
        row.set(columns::BB_MIDDLE, None);

        assert!(strategy
            .evaluate("SOL-USDT-SWAP", &series_of(row), &ranging_regime(), &HashSet::new())
            .is_none());
    }
}
