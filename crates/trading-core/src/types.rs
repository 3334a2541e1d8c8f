use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// OHLCV candle, produced externally and never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candle {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Direction of a position or candidate trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TradeDirection {
    Long,
    Short,
}

impl TradeDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeDirection::Long => "LONG",
            TradeDirection::Short => "SHORT",
        }
    }

    /// The fill side that closes a position in this direction.
    pub fn closing_side(&self) -> FillSide {
        match self {
            TradeDirection::Long => FillSide::Sell,
            TradeDirection::Short => FillSide::Buy,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FillSide {
    Buy,
    Sell,
}

/// Execution record from the exchange. Consumed in ascending
/// timestamp order by the reconciler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fill {
    pub order_id: String,
    pub side: FillSide,
    pub amount: f64,
    pub price: f64,
    pub cost: f64,
    pub fee: f64,
    pub timestamp: DateTime<Utc>,
}

/// Live position as reported by the exchange.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub symbol: String,
    pub direction: TradeDirection,
    pub contracts: f64,
    pub entry_price: f64,
    pub leverage: u32,
    pub margin: f64,
}

/// Lifecycle state of a trade. `Open` transitions exactly once to one
/// of the closed states; closed states are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradeStatus {
    Open,
    ClosedStopLoss,
    ClosedTakeProfit,
    ClosedExchange,
}

impl TradeStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TradeStatus::Open)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TradeStatus::Open => "OPEN",
            TradeStatus::ClosedStopLoss => "CLOSED_SL",
            TradeStatus::ClosedTakeProfit => "CLOSED_TP",
            TradeStatus::ClosedExchange => "CLOSED_EXCHANGE",
        }
    }
}

/// A tracked trade. Owned by an external repository; this core only
/// returns updated in-memory values.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    pub id: String,
    pub symbol: String,
    pub direction: TradeDirection,
    pub status: TradeStatus,
    pub entry_price: f64,
    pub quantity: f64,
    pub leverage: u32,
    pub margin_used: f64,
    pub entry_fee: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
    pub opened_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
    pub exit_price: Option<f64>,
    pub exit_fee: Option<f64>,
    pub pnl: Option<f64>,
    pub pnl_pct: Option<f64>,
    /// Free-form diagnostics about how the close was determined
    /// (e.g. closure detected without matching fills).
    pub exit_note: Option<String>,
}

impl Trade {
    pub fn is_open(&self) -> bool {
        self.status == TradeStatus::Open
    }

    /// Notional value of the position at entry.
    pub fn notional(&self) -> f64 {
        self.entry_price * self.quantity
    }
}

/// Which strategy variant produced a signal. Closed set: adding a
/// variant is an explicit change, not a registry lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StrategyKind {
    TrendFollowing,
    RangeReversion,
}

impl StrategyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyKind::TrendFollowing => "trend_following",
            StrategyKind::RangeReversion => "range_reversion",
        }
    }
}

/// Candidate trade proposed by a strategy variant, consumed once by
/// the position sizer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeSignal {
    pub symbol: String,
    pub direction: TradeDirection,
    pub entry_price: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
    pub suggested_leverage: u32,
    /// Accumulated confirmation score in [0, 1].
    pub strength: f64,
    pub strategy: StrategyKind,
    pub trigger_price: f64,
    pub created_at: DateTime<Utc>,
}

impl TradeSignal {
    /// Distance from entry to stop, positive when the stop is on the
    /// losing side of entry.
    pub fn risk_distance(&self) -> f64 {
        match self.direction {
            TradeDirection::Long => self.entry_price - self.stop_loss,
            TradeDirection::Short => self.stop_loss - self.entry_price,
        }
    }

    /// Distance from entry to target, positive when the target is on
    /// the winning side of entry.
    pub fn reward_distance(&self) -> f64 {
        match self.direction {
            TradeDirection::Long => self.take_profit - self.entry_price,
            TradeDirection::Short => self.entry_price - self.take_profit,
        }
    }

    /// Both risk and reward distances must be strictly positive.
    /// Signals failing this are discarded before leaving a strategy.
    pub fn has_valid_geometry(&self) -> bool {
        self.risk_distance() > 0.0 && self.reward_distance() > 0.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrendDirection {
    Up,
    Down,
    Sideways,
}

impl TrendDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrendDirection::Up => "uptrend",
            TrendDirection::Down => "downtrend",
            TrendDirection::Sideways => "sideways",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VolatilityLevel {
    Low,
    Normal,
    High,
    Unknown,
}

impl VolatilityLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            VolatilityLevel::Low => "low-volatility",
            VolatilityLevel::Normal => "normal-volatility",
            VolatilityLevel::High => "high-volatility",
            VolatilityLevel::Unknown => "unknown-volatility",
        }
    }
}

/// Coarse classification of current market behavior. Built fresh each
/// cycle from the latest indicator row, never mutated afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketRegime {
    pub trend_direction: TrendDirection,
    pub is_trending: bool,
    pub is_strongly_trending: bool,
    pub volatility_level: VolatilityLevel,
    pub adx: Option<f64>,
    pub plus_di: Option<f64>,
    pub minus_di: Option<f64>,
    pub bandwidth: Option<f64>,
    /// Human-readable descriptor, diagnostics only.
    pub label: String,
}

/// Result of placing an order through the executor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderResult {
    pub order_id: String,
    pub filled_amount: f64,
    pub avg_price: f64,
    pub fee: f64,
}
