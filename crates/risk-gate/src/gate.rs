use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::models::{AlertSeverity, CorrelationLevel, RiskAlert, RiskLimits, RiskState};

/// Outcome of one independent check.
#[derive(Debug, Clone)]
pub struct CheckOutcome {
    pub allowed: bool,
    pub alert: Option<RiskAlert>,
}

impl CheckOutcome {
    fn pass() -> Self {
        Self {
            allowed: true,
            alert: None,
        }
    }
}

/// Combined decision across all checks for one candidate trade.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateDecision {
    pub allowed: bool,
    /// Name of the first check that vetoed the trade, if any.
    pub vetoed_by: Option<String>,
    pub alerts: Vec<RiskAlert>,
}

/// Everything the gate needs to judge one candidate trade.
#[derive(Debug, Clone)]
pub struct TradeContext {
    pub symbol: String,
    pub current_balance: f64,
    pub margin_used: f64,
    pub margin_total: f64,
    /// Normalized volatility of the candidate's market, if known.
    pub volatility: Option<f64>,
    pub open_symbols: Vec<String>,
    /// Gross notional across open positions plus the candidate.
    pub gross_notional: f64,
    pub now: DateTime<Utc>,
}

/// Independent, composable veto checks applied to a candidate trade
/// before it reaches order execution. Never errors; a failed check is
/// a disallowed trade plus an alert, not an exception.
pub struct RiskGate {
    limits: RiskLimits,
}

impl RiskGate {
    pub fn new(limits: RiskLimits) -> Self {
        Self { limits }
    }

    pub fn limits(&self) -> &RiskLimits {
        &self.limits
    }

    /// Run every check. The emergency stop short-circuits: while it is
    /// active nothing else matters.
    pub fn evaluate(&self, state: &mut RiskState, ctx: &TradeContext) -> GateDecision {
        let stop = self.check_emergency_stop(state, ctx.now);
        if !stop.allowed {
            return GateDecision {
                allowed: false,
                vetoed_by: Some("emergency_stop".to_string()),
                alerts: stop.alert.into_iter().collect(),
            };
        }

        let checks: [(&str, CheckOutcome); 6] = [
            (
                "daily_loss",
                self.check_daily_loss(state, ctx.current_balance, ctx.now),
            ),
            (
                "margin_usage",
                self.check_margin_usage(state, ctx.margin_used, ctx.margin_total, ctx.now),
            ),
            (
                "volatility",
                self.check_volatility(state, &ctx.symbol, ctx.volatility, ctx.now),
            ),
            (
                "correlation",
                self.check_correlation(state, &ctx.symbol, &ctx.open_symbols, ctx.now),
            ),
            (
                "portfolio_leverage",
                self.check_portfolio_leverage(
                    state,
                    ctx.gross_notional,
                    ctx.current_balance,
                    ctx.now,
                ),
            ),
            (
                "drawdown",
                self.check_drawdown(state, ctx.current_balance, ctx.now),
            ),
        ];

        let mut alerts = Vec::new();
        let mut vetoed_by = None;
        for (name, outcome) in checks {
            if let Some(alert) = outcome.alert {
                alerts.push(alert);
            }
            if !outcome.allowed && vetoed_by.is_none() {
                vetoed_by = Some(name.to_string());
            }
        }

        let allowed = vetoed_by.is_none();
        if !allowed {
            warn!(
                symbol = %ctx.symbol,
                vetoed_by = vetoed_by.as_deref().unwrap_or(""),
                "trade vetoed by risk gate"
            );
        } else {
            debug!(symbol = %ctx.symbol, "risk gate passed");
        }

        GateDecision {
            allowed,
            vetoed_by,
            alerts,
        }
    }

    /// Global manual kill switch, blocks unconditionally while active.
    pub fn check_emergency_stop(&self, state: &mut RiskState, now: DateTime<Utc>) -> CheckOutcome {
        if !state.emergency_stop_active {
            return CheckOutcome::pass();
        }
        let alert = RiskAlert::new(
            "emergency_stop",
            "emergency stop active",
            "all trading blocked by emergency stop".to_string(),
            AlertSeverity::Critical,
            now,
        );
        state.push_alert(alert.clone());
        CheckOutcome {
            allowed: false,
            alert: Some(alert),
        }
    }

    /// Daily loss versus the daily start balance. At the limit the
    /// trade is blocked; at 80% of it, allowed with a warning.
    pub fn check_daily_loss(
        &self,
        state: &mut RiskState,
        current_balance: f64,
        now: DateTime<Utc>,
    ) -> CheckOutcome {
        if state.daily_start_balance <= 0.0 {
            return CheckOutcome::pass();
        }
        let change_pct =
            (current_balance - state.daily_start_balance) / state.daily_start_balance * 100.0;
        let limit = self.limits.daily_loss_limit_pct;

        if change_pct <= -limit {
            let alert = RiskAlert::new(
                "daily_loss",
                "daily loss limit breached",
                format!("daily P&L {change_pct:.2}% breaches -{limit:.2}% limit"),
                AlertSeverity::Critical,
                now,
            );
            state.push_alert(alert.clone());
            return CheckOutcome {
                allowed: false,
                alert: Some(alert),
            };
        }

        if change_pct <= -limit * 0.8 {
            let alert = RiskAlert::new(
                "daily_loss",
                "approaching daily loss limit",
                format!("daily P&L {change_pct:.2}% is within 80% of the -{limit:.2}% limit"),
                AlertSeverity::High,
                now,
            );
            state.push_alert(alert.clone());
            return CheckOutcome {
                allowed: true,
                alert: Some(alert),
            };
        }

        CheckOutcome::pass()
    }

    /// used/total margin ratio against the configured ceiling.
    pub fn check_margin_usage(
        &self,
        state: &mut RiskState,
        used: f64,
        total: f64,
        now: DateTime<Utc>,
    ) -> CheckOutcome {
        if total <= 0.0 {
            return CheckOutcome::pass();
        }
        let ratio = used / total;
        let limit = self.limits.margin_usage_limit;

        if ratio > limit {
            let alert = RiskAlert::new(
                "margin_usage",
                "margin usage limit breached",
                format!("margin usage {:.1}% above {:.1}% limit", ratio * 100.0, limit * 100.0),
                AlertSeverity::Critical,
                now,
            );
            state.push_alert(alert.clone());
            return CheckOutcome {
                allowed: false,
                alert: Some(alert),
            };
        }

        if ratio > limit * 0.9 {
            let alert = RiskAlert::new(
                "margin_usage",
                "approaching margin usage limit",
                format!("margin usage {:.1}% is within 90% of the limit", ratio * 100.0),
                AlertSeverity::High,
                now,
            );
            state.push_alert(alert.clone());
            return CheckOutcome {
                allowed: true,
                alert: Some(alert),
            };
        }

        CheckOutcome::pass()
    }

    /// Volatility ceiling: warn above the threshold, block at 1.5x.
    pub fn check_volatility(
        &self,
        state: &mut RiskState,
        symbol: &str,
        volatility: Option<f64>,
        now: DateTime<Utc>,
    ) -> CheckOutcome {
        let vol = match volatility {
            Some(v) if v.is_finite() => v,
            _ => return CheckOutcome::pass(),
        };
        let threshold = self.limits.volatility_threshold;

        if vol > threshold * 1.5 {
            let alert = RiskAlert::new(
                "volatility",
                "volatility ceiling breached",
                format!("{symbol} volatility {:.2}% above hard ceiling", vol * 100.0),
                AlertSeverity::Critical,
                now,
            );
            state.push_alert(alert.clone());
            return CheckOutcome {
                allowed: false,
                alert: Some(alert),
            };
        }

        if vol > threshold {
            let alert = RiskAlert::new(
                "volatility",
                "elevated volatility",
                format!("{symbol} volatility {:.2}% above threshold", vol * 100.0),
                AlertSeverity::Warning,
                now,
            );
            state.push_alert(alert.clone());
            return CheckOutcome {
                allowed: true,
                alert: Some(alert),
            };
        }

        CheckOutcome::pass()
    }

    /// Heuristic pairwise correlation against every open symbol,
    /// counted against the correlated-positions limit.
    pub fn check_correlation(
        &self,
        state: &mut RiskState,
        symbol: &str,
        open_symbols: &[String],
        now: DateTime<Utc>,
    ) -> CheckOutcome {
        let correlated = open_symbols
            .iter()
            .filter(|open| correlation_between(symbol, open) >= self.limits.correlation_threshold)
            .count();

        if correlated >= self.limits.max_correlated_positions {
            let alert = RiskAlert::new(
                "correlation",
                "correlated exposure limit",
                format!(
                    "{symbol} is correlated with {correlated} open position(s), limit {}",
                    self.limits.max_correlated_positions
                ),
                AlertSeverity::High,
                now,
            );
            state.push_alert(alert.clone());
            return CheckOutcome {
                allowed: false,
                alert: Some(alert),
            };
        }

        CheckOutcome::pass()
    }

    /// Gross notional over equity against the portfolio leverage cap.
    pub fn check_portfolio_leverage(
        &self,
        state: &mut RiskState,
        gross_notional: f64,
        equity: f64,
        now: DateTime<Utc>,
    ) -> CheckOutcome {
        if equity <= 0.0 {
            return CheckOutcome::pass();
        }
        let ratio = gross_notional / equity;
        if ratio > self.limits.max_portfolio_leverage {
            let alert = RiskAlert::new(
                "portfolio_leverage",
                "portfolio leverage limit breached",
                format!(
                    "gross exposure {ratio:.1}x above {:.1}x limit",
                    self.limits.max_portfolio_leverage
                ),
                AlertSeverity::Critical,
                now,
            );
            state.push_alert(alert.clone());
            return CheckOutcome {
                allowed: false,
                alert: Some(alert),
            };
        }
        CheckOutcome::pass()
    }

    /// Drawdown from the tracked peak balance.
    pub fn check_drawdown(
        &self,
        state: &mut RiskState,
        current_balance: f64,
        now: DateTime<Utc>,
    ) -> CheckOutcome {
        state.track_peak(current_balance);
        if state.peak_balance <= 0.0 {
            return CheckOutcome::pass();
        }
        let drawdown_pct = (state.peak_balance - current_balance) / state.peak_balance * 100.0;
        if drawdown_pct > self.limits.max_drawdown_pct {
            let alert = RiskAlert::new(
                "drawdown",
                "max drawdown breached",
                format!(
                    "drawdown {drawdown_pct:.1}% from peak above {:.1}% limit",
                    self.limits.max_drawdown_pct
                ),
                AlertSeverity::Critical,
                now,
            );
            state.push_alert(alert.clone());
            return CheckOutcome {
                allowed: false,
                alert: Some(alert),
            };
        }
        CheckOutcome::pass()
    }
}

/// Heuristic correlation: same base currency is high, same asset
/// cluster is medium, anything else low.
pub fn correlation_between(a: &str, b: &str) -> CorrelationLevel {
    let base_a = base_currency(a);
    let base_b = base_currency(b);

    if base_a == base_b {
        return CorrelationLevel::High;
    }
    match (asset_cluster(base_a), asset_cluster(base_b)) {
        (Some(ca), Some(cb)) if ca == cb => CorrelationLevel::Medium,
        _ => CorrelationLevel::Low,
    }
}

/// `"BTC-USDT-SWAP"` / `"BTC/USDT"` -> `"BTC"`.
fn base_currency(symbol: &str) -> &str {
    symbol
        .split(['-', '/'])
        .next()
        .unwrap_or(symbol)
}

/// Pre-defined clusters of bases that tend to move together.
fn asset_cluster(base: &str) -> Option<&'static str> {
    match base {
        "BTC" | "ETH" => Some("majors"),
        "SOL" | "AVAX" | "ADA" | "DOT" | "NEAR" | "APT" | "SUI" | "ATOM" => Some("layer1"),
        "UNI" | "AAVE" | "LINK" | "MKR" | "CRV" | "LDO" | "SNX" => Some("defi"),
        "DOGE" | "SHIB" | "PEPE" | "WIF" | "BONK" => Some("meme"),
        "OP" | "ARB" | "MATIC" | "STRK" => Some("layer2"),
        _ => None,
    }
}
