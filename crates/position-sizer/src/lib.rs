//! Risk-adjusted position sizing and leverage selection.
//!
//! Sizing never fails: degenerate inputs fall back to a small fixed
//! fraction of balance at the default leverage, so the caller always
//! gets something it can gate and place.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use trading_core::{TradeSignal, VolatilityLevel};

/// Volatility above this is treated as 10% for the adjustment factor.
const VOLATILITY_CAP: f64 = 0.10;
/// Maximum linear reduction as the position count approaches its cap.
const MAX_COUNT_REDUCTION: f64 = 0.30;
/// Hard cap on base size as a fraction of balance.
const MAX_BALANCE_FRACTION: f64 = 0.10;

/// Configuration for the position sizer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SizerConfig {
    /// Per-trade base order size in USD before adjustments.
    pub base_order_usd: f64,
    /// Leverage used when no tier matches or sizing falls back.
    pub default_leverage: u32,
    /// Fraction of balance used by the fallback path.
    pub fallback_fraction: f64,
}

impl Default for SizerConfig {
    fn default() -> Self {
        Self {
            base_order_usd: 100.0,
            default_leverage: 3,
            fallback_fraction: 0.02,
        }
    }
}

/// Sorted `(strength_threshold, leverage)` tiers, highest threshold
/// first. Signal strength picks the highest tier it meets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeverageTiers {
    tiers: Vec<(f64, u32)>,
    default_leverage: u32,
}

impl Default for LeverageTiers {
    fn default() -> Self {
        Self::new(vec![(0.9, 20), (0.8, 10), (0.7, 5), (0.6, 3)], 2)
    }
}

impl LeverageTiers {
    pub fn new(mut tiers: Vec<(f64, u32)>, default_leverage: u32) -> Self {
        tiers.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        Self {
            tiers,
            default_leverage: default_leverage.max(1),
        }
    }

    /// Leverage for `strength`, before any volatility adjustment.
    pub fn leverage_for(&self, strength: f64) -> u32 {
        self.tiers
            .iter()
            .find(|(threshold, _)| strength >= *threshold)
            .map(|(_, leverage)| *leverage)
            .unwrap_or(self.default_leverage)
    }

    /// Tiered leverage, halved (floored at 1) in high volatility.
    pub fn leverage_for_regime(&self, strength: f64, volatility: VolatilityLevel) -> u32 {
        let leverage = self.leverage_for(strength);
        if volatility == VolatilityLevel::High {
            (leverage / 2).max(1)
        } else {
            leverage
        }
    }
}

/// Account and portfolio context for one sizing call.
#[derive(Debug, Clone)]
pub struct SizingContext {
    pub account_balance: f64,
    pub open_position_count: usize,
    pub max_positions: usize,
    /// Maximum fraction of balance allowed into a single trade.
    pub risk_tolerance: f64,
    /// Normalized volatility (e.g. ATR / price), if known.
    pub volatility: Option<f64>,
    pub volatility_level: VolatilityLevel,
}

/// Sizing decision handed to the risk gate and then the executor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionSizing {
    pub order_amount_usd: f64,
    pub leverage: u32,
    pub margin_required: f64,
    /// Capital actually at risk (stop distance x position) as a
    /// percentage of balance.
    pub risk_pct: f64,
    /// True when degenerate inputs forced the fallback path.
    pub is_fallback: bool,
}

pub struct PositionSizer {
    config: SizerConfig,
    tiers: LeverageTiers,
}

impl PositionSizer {
    pub fn new(config: SizerConfig, tiers: LeverageTiers) -> Self {
        Self { config, tiers }
    }

    pub fn tiers(&self) -> &LeverageTiers {
        &self.tiers
    }

    /// Size a proposed trade. Infallible by contract.
    pub fn size(&self, signal: &TradeSignal, ctx: &SizingContext) -> PositionSizing {
        if !self.inputs_usable(signal, ctx) {
            warn!(
                symbol = %signal.symbol,
                balance = ctx.account_balance,
                "degenerate sizing inputs, using fallback size"
            );
            return self.fallback(ctx);
        }

        // Base amount shrinks linearly (up to 30%) as the book fills.
        let fill_ratio = if ctx.max_positions > 0 {
            (ctx.open_position_count as f64 / ctx.max_positions as f64).min(1.0)
        } else {
            0.0
        };
        let base = (self.config.base_order_usd * (1.0 - MAX_COUNT_REDUCTION * fill_ratio))
            .min(ctx.account_balance * MAX_BALANCE_FRACTION);

        // Inverse volatility factor: calm markets size up, 10%+
        // volatility halves the base.
        let vol_factor = match ctx.volatility {
            Some(vol) => {
                let vol = vol.clamp(0.0, VOLATILITY_CAP);
                (1.5 - vol / VOLATILITY_CAP).clamp(0.5, 1.5)
            }
            None => 1.0,
        };

        let strength_factor = (0.5 + signal.strength).clamp(0.5, 1.5);

        let amount = (base * vol_factor * strength_factor)
            .min(ctx.account_balance * ctx.risk_tolerance);

        let leverage = self
            .tiers
            .leverage_for_regime(signal.strength, ctx.volatility_level);

        let margin_required = amount / leverage as f64;

        let risk_pct = if signal.entry_price > 0.0 {
            let risk_fraction = signal.risk_distance() / signal.entry_price;
            (amount * risk_fraction / ctx.account_balance) * 100.0
        } else {
            0.0
        };

        debug!(
            symbol = %signal.symbol,
            amount_usd = amount,
            leverage,
            vol_factor,
            strength_factor,
            "position sized"
        );

        PositionSizing {
            order_amount_usd: amount,
            leverage,
            margin_required,
            risk_pct,
            is_fallback: false,
        }
    }

    fn inputs_usable(&self, signal: &TradeSignal, ctx: &SizingContext) -> bool {
        ctx.account_balance.is_finite()
            && ctx.account_balance > 0.0
            && ctx.risk_tolerance.is_finite()
            && ctx.risk_tolerance > 0.0
            && signal.strength.is_finite()
            && signal.entry_price.is_finite()
            && signal.has_valid_geometry()
    }

    fn fallback(&self, ctx: &SizingContext) -> PositionSizing {
        let balance = if ctx.account_balance.is_finite() && ctx.account_balance > 0.0 {
            ctx.account_balance
        } else {
            0.0
        };
        let amount = balance * self.config.fallback_fraction;
        let leverage = self.config.default_leverage.max(1);

        PositionSizing {
            order_amount_usd: amount,
            leverage,
            margin_required: amount / leverage as f64,
            risk_pct: 0.0,
            is_fallback: true,
        }
    }
}
