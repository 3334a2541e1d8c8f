use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    Candle, Fill, IndicatorSeries, OrderResult, Position, Trade, TradeDirection, TradingError,
};

/// Parameters for indicator computation. The computation itself is a
/// black box; the core only reads the resulting columns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndicatorParams {
    pub ema_fast: usize,
    pub ema_medium: usize,
    pub ema_slow: usize,
    pub rsi_period: usize,
    pub atr_period: usize,
    pub adx_period: usize,
    pub bollinger_period: usize,
    pub bollinger_std: f64,
}

impl Default for IndicatorParams {
    fn default() -> Self {
        Self {
            ema_fast: 10,
            ema_medium: 20,
            ema_slow: 50,
            rsi_period: 14,
            atr_period: 14,
            adx_period: 14,
            bollinger_period: 20,
            bollinger_std: 2.0,
        }
    }
}

/// Turns raw candles into an indicator series. Failure is signaled by
/// an empty series or an error, never by a panic into the core.
#[async_trait]
pub trait IndicatorProvider: Send + Sync {
    async fn compute(
        &self,
        candles: &[Candle],
        params: &IndicatorParams,
    ) -> Result<IndicatorSeries, TradingError>;
}

/// Read-only view of the exchange.
#[async_trait]
pub trait ExchangeClient: Send + Sync {
    async fn get_candles(&self, symbol: &str, limit: usize) -> Result<Vec<Candle>, TradingError>;

    async fn get_open_positions(&self, symbol: &str) -> Result<Vec<Position>, TradingError>;

    /// Fills for `symbol` at or after `since`, ascending by timestamp.
    async fn get_recent_fills(
        &self,
        symbol: &str,
        since: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Fill>, TradingError>;

    async fn get_balance(&self) -> Result<AccountBalance, TradingError>;
}

/// Account snapshot used for sizing and risk checks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountBalance {
    pub total_equity: f64,
    pub available_margin: f64,
    pub used_margin: f64,
}

/// Persistence for trade records. Entirely external; the core hands
/// back updated in-memory values.
#[async_trait]
pub trait TradeRepository: Send + Sync {
    async fn create(&self, trade: &Trade) -> Result<(), TradingError>;
    async fn update(&self, trade: &Trade) -> Result<(), TradingError>;
    async fn open_trades(&self) -> Result<Vec<Trade>, TradingError>;
}

/// Places orders. The core produces the inputs, the surrounding
/// system calls the exchange.
#[async_trait]
pub trait OrderExecutor: Send + Sync {
    #[allow(clippy::too_many_arguments)]
    async fn place(
        &self,
        symbol: &str,
        direction: TradeDirection,
        amount_usd: f64,
        leverage: u32,
        stop_loss: f64,
        take_profit: f64,
    ) -> Result<OrderResult, TradingError>;
}
