use std::collections::VecDeque;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Alerts the state keeps around for reporting.
const MAX_RECENT_ALERTS: usize = 50;

/// Portfolio-wide risk configuration. Loaded once, read-only during a
/// cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskLimits {
    /// Daily loss (as % of the daily start balance) that halts trading.
    pub daily_loss_limit_pct: f64,
    /// Pairwise correlation level at or above which two symbols count
    /// as correlated.
    pub correlation_threshold: CorrelationLevel,
    /// How many correlated open positions are tolerated before a new
    /// one is vetoed. The count is inclusive of the candidate: a trade
    /// correlated with this many open positions would be the one-over
    /// member of the group and is blocked.
    pub max_correlated_positions: usize,
    /// Gross notional / equity ceiling.
    pub max_portfolio_leverage: f64,
    /// Drawdown from the tracked peak balance that halts trading.
    pub max_drawdown_pct: f64,
    /// Normalized volatility above which entries are warned, and at
    /// 1.5x blocked.
    pub volatility_threshold: f64,
    /// used/total margin ratio ceiling.
    pub margin_usage_limit: f64,
}

impl Default for RiskLimits {
    fn default() -> Self {
        Self {
            daily_loss_limit_pct: 5.0,
            correlation_threshold: CorrelationLevel::Medium,
            max_correlated_positions: 2,
            max_portfolio_leverage: 10.0,
            max_drawdown_pct: 15.0,
            volatility_threshold: 0.08,
            margin_usage_limit: 0.60,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CorrelationLevel {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AlertSeverity {
    Warning,
    High,
    Critical,
}

impl AlertSeverity {
    /// Suppression window for repeated alerts with the same source and
    /// title. Critical alerts are never suppressed.
    pub fn cooldown(&self) -> Duration {
        match self {
            AlertSeverity::Warning => Duration::minutes(15),
            AlertSeverity::High => Duration::minutes(10),
            AlertSeverity::Critical => Duration::zero(),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AlertSeverity::Warning => "WARNING",
            AlertSeverity::High => "HIGH",
            AlertSeverity::Critical => "CRITICAL",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskAlert {
    /// Which check raised the alert.
    pub source: String,
    pub title: String,
    pub message: String,
    pub severity: AlertSeverity,
    pub timestamp: DateTime<Utc>,
}

impl RiskAlert {
    pub fn new(
        source: &str,
        title: &str,
        message: String,
        severity: AlertSeverity,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            source: source.to_string(),
            title: title.to_string(),
            message,
            severity,
            timestamp,
        }
    }
}

/// Mutable risk state, reset daily. Exactly one writer: RiskGate
/// methods mutate it, reporting only reads it. No module-level
/// globals.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskState {
    pub daily_start_balance: f64,
    pub daily_start_time: DateTime<Utc>,
    pub peak_balance: f64,
    pub emergency_stop_active: bool,
    recent_alerts: VecDeque<RiskAlert>,
}

impl RiskState {
    pub fn new(starting_balance: f64, now: DateTime<Utc>) -> Self {
        Self {
            daily_start_balance: starting_balance,
            daily_start_time: now,
            peak_balance: starting_balance,
            emergency_stop_active: false,
            recent_alerts: VecDeque::new(),
        }
    }

    /// Reset the daily tracking window when the UTC date has rolled
    /// over since the last reset.
    pub fn roll_daily(&mut self, now: DateTime<Utc>, current_balance: f64) {
        if now.date_naive() != self.daily_start_time.date_naive() {
            info!(
                previous_start = self.daily_start_balance,
                new_start = current_balance,
                "daily risk tracking reset"
            );
            self.daily_start_balance = current_balance;
            self.daily_start_time = now;
        }
        self.track_peak(current_balance);
    }

    pub fn track_peak(&mut self, balance: f64) {
        if balance > self.peak_balance {
            self.peak_balance = balance;
        }
    }

    pub fn set_emergency_stop(&mut self, active: bool, reason: Option<&str>) {
        if active && !self.emergency_stop_active {
            warn!(reason = reason.unwrap_or("unspecified"), "emergency stop engaged");
        } else if !active && self.emergency_stop_active {
            info!("emergency stop released");
        }
        self.emergency_stop_active = active;
    }

    /// Append an alert, applying the per-severity cooldown: a
    /// non-critical alert with the same (source, title) as a recent
    /// one inside its cooldown window is dropped. Returns whether the
    /// alert was recorded.
    pub fn push_alert(&mut self, alert: RiskAlert) -> bool {
        let cooldown = alert.severity.cooldown();
        if cooldown > Duration::zero() {
            let suppressed = self.recent_alerts.iter().rev().any(|a| {
                a.source == alert.source
                    && a.title == alert.title
                    && alert.timestamp - a.timestamp < cooldown
            });
            if suppressed {
                debug!(source = %alert.source, title = %alert.title, "alert suppressed by cooldown");
                return false;
            }
        }

        if self.recent_alerts.len() >= MAX_RECENT_ALERTS {
            self.recent_alerts.pop_front();
        }
        self.recent_alerts.push_back(alert);
        true
    }

    pub fn recent_alerts(&self) -> impl Iterator<Item = &RiskAlert> {
        self.recent_alerts.iter()
    }

    pub fn alert_count(&self) -> usize {
        self.recent_alerts.len()
    }

    /// Read-only snapshot for health reporting.
    pub fn summary(&self, current_balance: f64) -> RiskSummary {
        let daily_pnl_pct = if self.daily_start_balance > 0.0 {
            Some((current_balance - self.daily_start_balance) / self.daily_start_balance * 100.0)
        } else {
            None
        };
        RiskSummary {
            emergency_stop_active: self.emergency_stop_active,
            daily_start_balance: self.daily_start_balance,
            daily_pnl_pct,
            peak_balance: self.peak_balance,
            alert_count: self.recent_alerts.len(),
            last_alert: self.recent_alerts.back().cloned(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskSummary {
    pub emergency_stop_active: bool,
    pub daily_start_balance: f64,
    pub daily_pnl_pct: Option<f64>,
    pub peak_balance: f64,
    pub alert_count: usize,
    pub last_alert: Option<RiskAlert>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alert(severity: AlertSeverity, at: DateTime<Utc>) -> RiskAlert {
        RiskAlert::new("daily_loss", "limit breached", "msg".to_string(), severity, at)
    }

    #[test]
    fn warning_alert_suppressed_inside_cooldown() {
        let now = Utc::now();
        let mut state = RiskState::new(10_000.0, now);

        assert!(state.push_alert(alert(AlertSeverity::Warning, now)));
        // Same key five minutes later: inside the 15 minute window.
        assert!(!state.push_alert(alert(AlertSeverity::Warning, now + Duration::minutes(5))));
        // Past the window it records again.
        assert!(state.push_alert(alert(AlertSeverity::Warning, now + Duration::minutes(16))));
        assert_eq!(state.alert_count(), 2);
    }

    #[test]
    fn critical_alerts_never_suppressed() {
        let now = Utc::now();
        let mut state = RiskState::new(10_000.0, now);

        assert!(state.push_alert(alert(AlertSeverity::Critical, now)));
        assert!(state.push_alert(alert(AlertSeverity::Critical, now + Duration::seconds(1))));
        assert_eq!(state.alert_count(), 2);
    }

    #[test]
    fn alert_ring_is_bounded() {
        let now = Utc::now();
        let mut state = RiskState::new(10_000.0, now);

        for i in 0..60 {
            let a = RiskAlert::new(
                "volatility",
                &format!("alert {i}"),
                "msg".to_string(),
                AlertSeverity::Critical,
                now + Duration::seconds(i),
            );
            state.push_alert(a);
        }
        assert_eq!(state.alert_count(), 50);
        // Oldest were dropped.
        assert_eq!(state.recent_alerts().next().unwrap().title, "alert 10");
    }

    #[test]
    fn daily_roll_resets_on_date_change() {
        let day_one = "2026-03-01T12:00:00Z".parse::<DateTime<Utc>>().unwrap();
        let mut state = RiskState::new(10_000.0, day_one);

        // Same day: start balance untouched.
        state.roll_daily(day_one + Duration::hours(5), 9_500.0);
        assert_eq!(state.daily_start_balance, 10_000.0);

        // Next UTC day: reset to the current balance.
        state.roll_daily(day_one + Duration::hours(13), 9_500.0);
        assert_eq!(state.daily_start_balance, 9_500.0);
    }

    #[test]
    fn peak_only_moves_up() {
        let now = Utc::now();
        let mut state = RiskState::new(10_000.0, now);

        state.track_peak(12_000.0);
        state.track_peak(8_000.0);
        assert_eq!(state.peak_balance, 12_000.0);
    }

    #[test]
    fn summary_reports_daily_pnl() {
        let now = Utc::now();
        let state = RiskState::new(10_000.0, now);
        let summary = state.summary(10_500.0);

        assert!(!summary.emergency_stop_active);
        assert!((summary.daily_pnl_pct.unwrap() - 5.0).abs() < 1e-9);
    }
}
