use serde::{Deserialize, Serialize};
use tracing::debug;

use trading_core::columns;
use trading_core::{IndicatorSnapshot, MarketRegime, TrendDirection, VolatilityLevel};

/// Thresholds for regime classification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegimeThresholds {
    /// ADX above this means a trend exists at all.
    pub adx_weak: f64,
    /// ADX above this means the trend is strong.
    pub adx_strong: f64,
    /// Normalized Bollinger bandwidth below this is a quiet market.
    pub bandwidth_low: f64,
    /// Normalized Bollinger bandwidth above this is a volatile market.
    pub bandwidth_high: f64,
}

impl Default for RegimeThresholds {
    fn default() -> Self {
        Self {
            adx_weak: 20.0,
            adx_strong: 25.0,
            bandwidth_low: 0.03,
            bandwidth_high: 0.10,
        }
    }
}

/// Maps the latest indicator row to a `MarketRegime`.
///
/// Total function of its inputs: undefined indicator values degrade
/// the regime to `Sideways` / `Unknown` with a label naming what was
/// missing, they never raise.
#[derive(Debug, Clone, Default)]
pub struct RegimeClassifier {
    thresholds: RegimeThresholds,
}

impl RegimeClassifier {
    pub fn new(thresholds: RegimeThresholds) -> Self {
        Self { thresholds }
    }

    pub fn thresholds(&self) -> &RegimeThresholds {
        &self.thresholds
    }

    pub fn classify(&self, snapshot: &IndicatorSnapshot) -> MarketRegime {
        let bandwidth = snapshot.get(columns::BB_WIDTH);
        let adx = snapshot.get(columns::ADX);
        let plus_di = snapshot.get(columns::PLUS_DI);
        let minus_di = snapshot.get(columns::MINUS_DI);

        let volatility_level = match bandwidth {
            None => VolatilityLevel::Unknown,
            Some(bw) if bw < self.thresholds.bandwidth_low => VolatilityLevel::Low,
            Some(bw) if bw > self.thresholds.bandwidth_high => VolatilityLevel::High,
            Some(_) => VolatilityLevel::Normal,
        };

        let (trend_direction, is_trending, is_strongly_trending) =
            match (adx, plus_di, minus_di) {
                (Some(adx), Some(pdi), Some(mdi)) => {
                    // Tie (pdi == mdi) deliberately lands on Down; the
                    // break must stay deterministic.
                    let direction = if pdi > mdi {
                        TrendDirection::Up
                    } else {
                        TrendDirection::Down
                    };
                    if adx > self.thresholds.adx_strong {
                        (direction, true, true)
                    } else if adx > self.thresholds.adx_weak {
                        (direction, true, false)
                    } else {
                        (TrendDirection::Sideways, false, false)
                    }
                }
                _ => (TrendDirection::Sideways, false, false),
            };

        let label = self.build_label(
            volatility_level,
            trend_direction,
            is_strongly_trending,
            &snapshot.missing(&[
                columns::BB_WIDTH,
                columns::ADX,
                columns::PLUS_DI,
                columns::MINUS_DI,
            ]),
        );

        debug!(
            adx = ?adx,
            bandwidth = ?bandwidth,
            label = %label,
            "regime classified"
        );

        MarketRegime {
            trend_direction,
            is_trending,
            is_strongly_trending,
            volatility_level,
            adx,
            plus_di,
            minus_di,
            bandwidth,
            label,
        }
    }

    fn build_label(
        &self,
        volatility: VolatilityLevel,
        direction: TrendDirection,
        strong: bool,
        missing: &[&str],
    ) -> String {
        let trend_desc = match (direction, strong) {
            (TrendDirection::Sideways, _) => "sideways".to_string(),
            (d, true) => format!("strong {}", d.as_str()),
            (d, false) => format!("weak {}", d.as_str()),
        };

        if missing.is_empty() {
            format!("{} / {}", volatility.as_str(), trend_desc)
        } else {
            format!(
                "{} / {} (undefined: {})",
                volatility.as_str(),
                trend_desc,
                missing.join(", ")
            )
        }
    }
}
