use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;

use position_sizer::SizerConfig;
use risk_gate::RiskLimits;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    // Universe
    pub symbols: Vec<String>,
    pub candle_limit: usize,

    // Cycle behavior
    pub scan_interval_seconds: u64,
    /// When false, decisions are logged but no orders are placed.
    pub trading_enabled: bool,

    // Sizing
    pub base_order_usd: f64,
    pub default_leverage: u32,
    pub max_positions: usize,
    /// Maximum fraction of balance committed to one trade.
    pub risk_tolerance: f64,

    // Risk limits
    pub daily_loss_limit_pct: f64,
    pub max_drawdown_pct: f64,
    pub margin_usage_limit: f64,
    pub volatility_threshold: f64,
    pub max_correlated_positions: usize,
    pub max_portfolio_leverage: f64,

    // Reconciliation
    pub fill_lookup_limit: usize,
}

impl AgentConfig {
    pub fn from_env() -> Result<Self> {
        // Missing .env is fine; real env vars still apply.
        dotenvy::dotenv().ok();

        let config = Self {
            symbols: env::var("SYMBOLS")
                .unwrap_or_else(|_| "BTC-USDT-SWAP,ETH-USDT-SWAP,SOL-USDT-SWAP".to_string())
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            candle_limit: env::var("CANDLE_LIMIT")
                .unwrap_or_else(|_| "200".to_string())
                .parse()
                .context("CANDLE_LIMIT must be an integer")?,

            scan_interval_seconds: env::var("SCAN_INTERVAL")
                .unwrap_or_else(|_| "300".to_string())
                .parse()
                .context("SCAN_INTERVAL must be an integer")?,
            trading_enabled: env::var("TRADING_ENABLED")
                .unwrap_or_else(|_| "false".to_string())
                .parse()
                .context("TRADING_ENABLED must be true or false")?,

            base_order_usd: env::var("BASE_ORDER_USD")
                .unwrap_or_else(|_| "100.0".to_string())
                .parse()
                .context("BASE_ORDER_USD must be a number")?,
            default_leverage: env::var("DEFAULT_LEVERAGE")
                .unwrap_or_else(|_| "3".to_string())
                .parse()
                .context("DEFAULT_LEVERAGE must be an integer")?,
            max_positions: env::var("MAX_POSITIONS")
                .unwrap_or_else(|_| "5".to_string())
                .parse()
                .context("MAX_POSITIONS must be an integer")?,
            risk_tolerance: env::var("RISK_TOLERANCE")
                .unwrap_or_else(|_| "0.05".to_string())
                .parse()
                .context("RISK_TOLERANCE must be a number")?,

            daily_loss_limit_pct: env::var("DAILY_LOSS_LIMIT_PCT")
                .unwrap_or_else(|_| "5.0".to_string())
                .parse()
                .context("DAILY_LOSS_LIMIT_PCT must be a number")?,
            max_drawdown_pct: env::var("MAX_DRAWDOWN_PCT")
                .unwrap_or_else(|_| "15.0".to_string())
                .parse()
                .context("MAX_DRAWDOWN_PCT must be a number")?,
            margin_usage_limit: env::var("MARGIN_USAGE_LIMIT")
                .unwrap_or_else(|_| "0.60".to_string())
                .parse()
                .context("MARGIN_USAGE_LIMIT must be a number")?,
            volatility_threshold: env::var("VOLATILITY_THRESHOLD")
                .unwrap_or_else(|_| "0.08".to_string())
                .parse()
                .context("VOLATILITY_THRESHOLD must be a number")?,
            max_correlated_positions: env::var("MAX_CORRELATED_POSITIONS")
                .unwrap_or_else(|_| "2".to_string())
                .parse()
                .context("MAX_CORRELATED_POSITIONS must be an integer")?,
            max_portfolio_leverage: env::var("MAX_PORTFOLIO_LEVERAGE")
                .unwrap_or_else(|_| "10.0".to_string())
                .parse()
                .context("MAX_PORTFOLIO_LEVERAGE must be a number")?,

            fill_lookup_limit: env::var("FILL_LOOKUP_LIMIT")
                .unwrap_or_else(|_| "100".to_string())
                .parse()
                .context("FILL_LOOKUP_LIMIT must be an integer")?,
        };

        Ok(config)
    }

    pub fn sizer_config(&self) -> SizerConfig {
        SizerConfig {
            base_order_usd: self.base_order_usd,
            default_leverage: self.default_leverage,
            ..SizerConfig::default()
        }
    }

    pub fn risk_limits(&self) -> RiskLimits {
        RiskLimits {
            daily_loss_limit_pct: self.daily_loss_limit_pct,
            max_drawdown_pct: self.max_drawdown_pct,
            margin_usage_limit: self.margin_usage_limit,
            volatility_threshold: self.volatility_threshold,
            max_correlated_positions: self.max_correlated_positions,
            max_portfolio_leverage: self.max_portfolio_leverage,
            ..RiskLimits::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_overrides_take_effect() {
        // Pin the variables this test asserts on so an ambient
        // environment cannot change the outcome.
        env::set_var("MAX_POSITIONS", "7");
        env::set_var("RISK_TOLERANCE", "0.03");

        let config = AgentConfig::from_env().expect("config");
        assert_eq!(config.max_positions, 7);
        assert!((config.risk_tolerance - 0.03).abs() < 1e-12);

        env::remove_var("MAX_POSITIONS");
        env::remove_var("RISK_TOLERANCE");
    }

    #[test]
    fn risk_limits_carry_configured_values() {
        let config = AgentConfig::from_env().expect("config");
        let limits = config.risk_limits();
        assert_eq!(limits.daily_loss_limit_pct, config.daily_loss_limit_pct);
        assert_eq!(limits.margin_usage_limit, config.margin_usage_limit);
    }
}
