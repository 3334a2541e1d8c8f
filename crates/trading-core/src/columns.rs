//! Well-known indicator column names.
//!
//! The indicator provider fills a row per candle with these keys; a
//! missing or null cell means the indicator has no value yet (warmup)
//! or could not be computed for that row.

pub const CLOSE: &str = "close";
pub const HIGH: &str = "high";
pub const LOW: &str = "low";
pub const VOLUME: &str = "volume";

pub const EMA_FAST: &str = "EMA_10";
pub const EMA_MEDIUM: &str = "EMA_20";
pub const EMA_SLOW: &str = "EMA_50";

pub const MACD: &str = "MACD_12_26_9";
pub const MACD_SIGNAL: &str = "MACDS_12_26_9";

pub const RSI: &str = "RSI_14";
pub const ATR: &str = "ATR_14";

pub const ADX: &str = "ADX_14";
pub const PLUS_DI: &str = "PLUS_DI_14";
pub const MINUS_DI: &str = "MINUS_DI_14";

pub const BB_UPPER: &str = "BBU_20";
pub const BB_MIDDLE: &str = "BBM_20";
pub const BB_LOWER: &str = "BBL_20";
/// Normalized band width: (upper - lower) / middle.
pub const BB_WIDTH: &str = "BBW_20";

pub const VOLUME_SMA: &str = "VOL_SMA_20";
