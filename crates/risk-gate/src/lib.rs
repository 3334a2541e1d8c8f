pub mod gate;
pub mod models;

pub use gate::{CheckOutcome, GateDecision, RiskGate, TradeContext};
pub use models::{
    AlertSeverity, CorrelationLevel, RiskAlert, RiskLimits, RiskState, RiskSummary,
};
