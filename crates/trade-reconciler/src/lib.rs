//! Matches exchange fill records back to open trades.
//!
//! One pass per open trade per cycle: if the exchange still shows a
//! live position the trade stays open; otherwise closing fills are
//! consumed greedily to compute the exit price, fees, PnL, and a
//! best-effort exit reason. Terminal trades are never touched again.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use trading_core::{Fill, Position, Trade, TradeDirection, TradeStatus};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconcilerConfig {
    /// Remaining quantity at or below this counts as fully consumed.
    pub quantity_epsilon: f64,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            quantity_epsilon: 1e-9,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReconcileOutcome {
    /// Trade was already in a terminal state; nothing recomputed.
    AlreadyTerminal,
    /// Exchange still reports a live position.
    StillOpen,
    /// Trade transitioned to a terminal state this pass.
    Closed,
}

/// Result of one reconciliation pass.
#[derive(Debug, Clone)]
pub struct Reconciliation {
    pub trade: Trade,
    pub outcome: ReconcileOutcome,
    /// The exit reason is a price heuristic, not an exchange-reported
    /// close reason. Callers with an authoritative source should
    /// prefer it whenever this is true.
    pub exit_inferred: bool,
}

pub struct TradeReconciler {
    config: ReconcilerConfig,
}

impl Default for TradeReconciler {
    fn default() -> Self {
        Self::new(ReconcilerConfig::default())
    }
}

impl TradeReconciler {
    pub fn new(config: ReconcilerConfig) -> Self {
        Self { config }
    }

    /// Reconcile one trade against the exchange view. Idempotent on
    /// terminal trades and side-effect free: the caller persists the
    /// returned trade.
    pub fn reconcile(
        &self,
        trade: &Trade,
        live_position: Option<&Position>,
        fills: &[Fill],
        now: DateTime<Utc>,
    ) -> Reconciliation {
        if trade.status.is_terminal() {
            return Reconciliation {
                trade: trade.clone(),
                outcome: ReconcileOutcome::AlreadyTerminal,
                exit_inferred: false,
            };
        }

        if live_position.is_some() {
            debug!(trade_id = %trade.id, symbol = %trade.symbol, "position still live");
            return Reconciliation {
                trade: trade.clone(),
                outcome: ReconcileOutcome::StillOpen,
                exit_inferred: false,
            };
        }

        match self.consume_closing_fills(trade, fills) {
            Some(exit) => self.close_from_exit(trade, exit),
            None => self.close_without_fills(trade, now),
        }
    }

    /// Greedily consume closing-side fills, oldest first, up to the
    /// trade's open quantity. Returns `None` when no closing fill
    /// overlaps the trade at all.
    fn consume_closing_fills(&self, trade: &Trade, fills: &[Fill]) -> Option<ExitFill> {
        let closing_side = trade.direction.closing_side();

        let mut candidates: Vec<&Fill> = fills
            .iter()
            .filter(|f| f.side == closing_side && f.timestamp >= trade.opened_at && f.amount > 0.0)
            .collect();
        // Greedy matching is only correct in ascending time order.
        candidates.sort_by_key(|f| f.timestamp);

        let mut remaining = trade.quantity;
        let mut value = 0.0;
        let mut fees = 0.0;
        let mut last_timestamp = None;

        for fill in candidates {
            if remaining <= self.config.quantity_epsilon {
                break;
            }
            let take = fill.amount.min(remaining);
            let fraction = take / fill.amount;
            value += take * fill.price;
            fees += fill.fee * fraction;
            remaining -= take;
            last_timestamp = Some(fill.timestamp);
        }

        let consumed = trade.quantity - remaining;
        if consumed <= self.config.quantity_epsilon {
            return None;
        }

        Some(ExitFill {
            quantity: consumed,
            avg_price: value / consumed,
            fees,
            remaining,
            closed_at: last_timestamp.unwrap_or(trade.opened_at),
        })
    }

    fn close_from_exit(&self, trade: &Trade, exit: ExitFill) -> Reconciliation {
        let gross = match trade.direction {
            TradeDirection::Long => (exit.avg_price - trade.entry_price) * exit.quantity,
            TradeDirection::Short => (trade.entry_price - exit.avg_price) * exit.quantity,
        };
        let pnl = gross - trade.entry_fee - exit.fees;
        let pnl_pct = if trade.margin_used > 0.0 {
            Some(pnl / trade.margin_used * 100.0)
        } else {
            None
        };

        let status = infer_exit_reason(trade, exit.avg_price);

        let mut closed = trade.clone();
        closed.status = status;
        closed.closed_at = Some(exit.closed_at);
        closed.exit_price = Some(exit.avg_price);
        closed.exit_fee = Some(exit.fees);
        closed.pnl = Some(pnl);
        closed.pnl_pct = pnl_pct;
        if exit.remaining > self.config.quantity_epsilon {
            closed.exit_note = Some(format!(
                "closing fills covered {:.8} of {:.8}",
                exit.quantity, trade.quantity
            ));
        }

        info!(
            trade_id = %closed.id,
            symbol = %closed.symbol,
            status = closed.status.as_str(),
            exit_price = exit.avg_price,
            pnl,
            "trade closed from fills"
        );

        Reconciliation {
            trade: closed,
            outcome: ReconcileOutcome::Closed,
            exit_inferred: true,
        }
    }

    /// The position is gone but no closing fill was found: mark the
    /// trade closed on the exchange rather than leaving it open
    /// forever.
    fn close_without_fills(&self, trade: &Trade, now: DateTime<Utc>) -> Reconciliation {
        warn!(
            trade_id = %trade.id,
            symbol = %trade.symbol,
            "no live position and no closing fills; marking closed with unknown fills"
        );

        let mut closed = trade.clone();
        closed.status = TradeStatus::ClosedExchange;
        closed.closed_at = Some(now);
        closed.exit_note =
            Some("closed on exchange; no matching fills found".to_string());

        Reconciliation {
            trade: closed,
            outcome: ReconcileOutcome::Closed,
            exit_inferred: true,
        }
    }
}

struct ExitFill {
    quantity: f64,
    avg_price: f64,
    fees: f64,
    remaining: f64,
    closed_at: DateTime<Utc>,
}

/// Compare the average exit against the recorded stop and target.
/// Closing at or beyond the stop reads as a stop-loss exit, at or
/// beyond the target as a take-profit exit, anything else as an
/// exchange-side close.
fn infer_exit_reason(trade: &Trade, exit_price: f64) -> TradeStatus {
    match trade.direction {
        TradeDirection::Long => {
            if exit_price <= trade.stop_loss {
                TradeStatus::ClosedStopLoss
            } else if exit_price >= trade.take_profit {
                TradeStatus::ClosedTakeProfit
            } else {
                TradeStatus::ClosedExchange
            }
        }
        TradeDirection::Short => {
            if exit_price >= trade.stop_loss {
                TradeStatus::ClosedStopLoss
            } else if exit_price <= trade.take_profit {
                TradeStatus::ClosedTakeProfit
            } else {
                TradeStatus::ClosedExchange
            }
        }
    }
}
