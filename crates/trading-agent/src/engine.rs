use std::collections::HashSet;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use tracing::{error, info, warn};
use uuid::Uuid;

use position_sizer::{LeverageTiers, PositionSizer, SizingContext};
use regime_classifier::RegimeClassifier;
use risk_gate::{RiskGate, RiskState, TradeContext};
use strategy_engine::{
    RangeReversion, RangeReversionConfig, StrategySelector, TrendFollowing, TrendFollowingConfig,
};
use trade_reconciler::{ReconcileOutcome, TradeReconciler};
use trading_core::columns;
use trading_core::{
    ExchangeClient, IndicatorParams, IndicatorProvider, IndicatorSnapshot, OrderExecutor, Trade,
    TradeRepository, TradeStatus,
};

use crate::config::AgentConfig;

/// Counters for one scan cycle, logged when the cycle completes.
#[derive(Debug, Clone, Default)]
pub struct CycleReport {
    pub trades_reconciled: usize,
    pub trades_closed: usize,
    pub signals: usize,
    pub vetoed: usize,
    pub orders_placed: usize,
}

/// Runs the full decision pipeline once per cycle: reconcile what is
/// already open, then scan the configured symbols for new entries.
/// Per-symbol failures degrade to "no action this cycle"; only
/// balance and persistence failures abort a cycle.
pub struct TradingEngine<E, I, R, O> {
    config: AgentConfig,
    exchange: E,
    indicators: I,
    repository: R,
    executor: O,
    params: IndicatorParams,
    classifier: RegimeClassifier,
    selector: StrategySelector,
    sizer: PositionSizer,
    gate: RiskGate,
    reconciler: TradeReconciler,
    risk_state: RiskState,
}

impl<E, I, R, O> TradingEngine<E, I, R, O>
where
    E: ExchangeClient,
    I: IndicatorProvider,
    R: TradeRepository,
    O: OrderExecutor,
{
    pub fn new(config: AgentConfig, exchange: E, indicators: I, repository: R, executor: O) -> Self {
        let tiers = LeverageTiers::default();
        let selector = StrategySelector::new(
            TrendFollowing::new(TrendFollowingConfig::default(), tiers.clone()),
            RangeReversion::new(RangeReversionConfig::default(), tiers.clone()),
        );
        let sizer = PositionSizer::new(config.sizer_config(), tiers);
        let gate = RiskGate::new(config.risk_limits());

        Self {
            config,
            exchange,
            indicators,
            repository,
            executor,
            params: IndicatorParams::default(),
            classifier: RegimeClassifier::default(),
            selector,
            sizer,
            gate,
            reconciler: TradeReconciler::default(),
            // Seeded with the live balance on the first cycle.
            risk_state: RiskState::new(0.0, Utc::now()),
        }
    }

    pub fn risk_state(&self) -> &RiskState {
        &self.risk_state
    }

    pub fn set_emergency_stop(&mut self, active: bool, reason: Option<&str>) {
        self.risk_state.set_emergency_stop(active, reason);
    }

    /// Run cycles on the configured interval until the task is
    /// cancelled. A failed cycle is logged and the next one runs.
    pub async fn run_forever(&mut self) -> Result<()> {
        let mut interval =
            tokio::time::interval(Duration::from_secs(self.config.scan_interval_seconds));
        loop {
            interval.tick().await;
            match self.run_cycle().await {
                Ok(report) => info!(?report, "cycle complete"),
                Err(e) => error!(error = %e, "cycle failed"),
            }
        }
    }

    pub async fn run_cycle(&mut self) -> Result<CycleReport> {
        let now = Utc::now();
        let balance = self
            .exchange
            .get_balance()
            .await
            .context("fetching account balance")?;
        let equity = balance.total_equity;

        if self.risk_state.daily_start_balance <= 0.0 {
            // First cycle: anchor daily and peak tracking to the
            // balance we just observed.
            self.risk_state.daily_start_balance = equity;
            self.risk_state.daily_start_time = now;
            self.risk_state.peak_balance = equity;
        }
        self.risk_state.roll_daily(now, equity);
        self.risk_state.track_peak(equity);

        let mut report = CycleReport::default();

        let open_trades = self.reconcile_open_trades(&mut report).await?;
        let mut open_symbols: HashSet<String> =
            open_trades.iter().map(|t| t.symbol.clone()).collect();
        let mut open_notional: f64 = open_trades.iter().map(|t| t.notional()).sum();

        if open_trades.len() >= self.config.max_positions {
            info!(open = open_trades.len(), "position book full, skipping scan");
            return Ok(report);
        }

        let symbols = self.config.symbols.clone();
        for symbol in symbols {
            if open_symbols.contains(&symbol) {
                continue;
            }

            let candles = match self
                .exchange
                .get_candles(&symbol, self.config.candle_limit)
                .await
            {
                Ok(c) => c,
                Err(e) => {
                    warn!(symbol = %symbol, error = %e, "candle fetch failed, skipping");
                    continue;
                }
            };

            let series = match self.indicators.compute(&candles, &self.params).await {
                Ok(s) if !s.is_empty() => s,
                Ok(_) => {
                    warn!(symbol = %symbol, "empty indicator series, skipping");
                    continue;
                }
                Err(e) => {
                    warn!(symbol = %symbol, error = %e, "indicator computation failed, skipping");
                    continue;
                }
            };

            let latest = match series.latest() {
                Some(row) => row.clone(),
                None => continue,
            };
            let regime = self.classifier.classify(&latest);
            let volatility = normalized_volatility(&latest);

            let signal = match self
                .selector
                .evaluate(&symbol, &series, &regime, &open_symbols)
            {
                Some(s) => s,
                None => continue,
            };
            report.signals += 1;

            let sizing_ctx = SizingContext {
                account_balance: equity,
                open_position_count: open_symbols.len(),
                max_positions: self.config.max_positions,
                risk_tolerance: self.config.risk_tolerance,
                volatility,
                volatility_level: regime.volatility_level,
            };
            let sizing = self.sizer.size(&signal, &sizing_ctx);

            let gate_ctx = TradeContext {
                symbol: symbol.clone(),
                current_balance: equity,
                margin_used: balance.used_margin,
                margin_total: equity,
                volatility,
                open_symbols: open_symbols.iter().cloned().collect(),
                gross_notional: open_notional + sizing.order_amount_usd,
                now,
            };
            let decision = self.gate.evaluate(&mut self.risk_state, &gate_ctx);
            if !decision.allowed {
                report.vetoed += 1;
                continue;
            }

            if !self.config.trading_enabled {
                info!(
                    symbol = %symbol,
                    strategy = signal.strategy.as_str(),
                    amount_usd = sizing.order_amount_usd,
                    leverage = sizing.leverage,
                    "trading disabled, signal not executed"
                );
                continue;
            }

            let order = match self
                .executor
                .place(
                    &symbol,
                    signal.direction,
                    sizing.order_amount_usd,
                    sizing.leverage,
                    signal.stop_loss,
                    signal.take_profit,
                )
                .await
            {
                Ok(o) => o,
                Err(e) => {
                    warn!(symbol = %symbol, error = %e, "order placement failed");
                    continue;
                }
            };

            let entry_price = if order.avg_price > 0.0 {
                order.avg_price
            } else {
                signal.entry_price
            };
            let trade = Trade {
                id: Uuid::new_v4().to_string(),
                symbol: symbol.clone(),
                direction: signal.direction,
                status: TradeStatus::Open,
                entry_price,
                quantity: order.filled_amount,
                leverage: sizing.leverage,
                margin_used: sizing.margin_required,
                entry_fee: order.fee,
                stop_loss: signal.stop_loss,
                take_profit: signal.take_profit,
                opened_at: now,
                closed_at: None,
                exit_price: None,
                exit_fee: None,
                pnl: None,
                pnl_pct: None,
                exit_note: None,
            };
            self.repository
                .create(&trade)
                .await
                .context("persisting new trade")?;

            info!(
                trade_id = %trade.id,
                symbol = %trade.symbol,
                direction = trade.direction.as_str(),
                strategy = signal.strategy.as_str(),
                amount_usd = sizing.order_amount_usd,
                leverage = sizing.leverage,
                "trade opened"
            );

            open_notional += trade.notional();
            open_symbols.insert(symbol);
            report.orders_placed += 1;

            if open_symbols.len() >= self.config.max_positions {
                break;
            }
        }

        Ok(report)
    }

    /// Sync every open trade against the exchange. Returns the trades
    /// that remain open. Exchange read failures leave the trade open
    /// for the next cycle.
    async fn reconcile_open_trades(&mut self, report: &mut CycleReport) -> Result<Vec<Trade>> {
        let now = Utc::now();
        let open = self
            .repository
            .open_trades()
            .await
            .context("listing open trades")?;

        let mut still_open = Vec::new();
        for trade in open {
            report.trades_reconciled += 1;

            let positions = match self.exchange.get_open_positions(&trade.symbol).await {
                Ok(p) => p,
                Err(e) => {
                    warn!(
                        trade_id = %trade.id,
                        symbol = %trade.symbol,
                        error = %e,
                        "position fetch failed, leaving trade open"
                    );
                    still_open.push(trade);
                    continue;
                }
            };
            let live = positions
                .iter()
                .find(|p| p.direction == trade.direction && p.contracts > 0.0);

            let fills = if live.is_none() {
                match self
                    .exchange
                    .get_recent_fills(&trade.symbol, trade.opened_at, self.config.fill_lookup_limit)
                    .await
                {
                    Ok(f) => f,
                    Err(e) => {
                        warn!(
                            trade_id = %trade.id,
                            symbol = %trade.symbol,
                            error = %e,
                            "fill fetch failed, leaving trade open"
                        );
                        still_open.push(trade);
                        continue;
                    }
                }
            } else {
                Vec::new()
            };

            let result = self.reconciler.reconcile(&trade, live, &fills, now);
            match result.outcome {
                ReconcileOutcome::Closed => {
                    self.repository
                        .update(&result.trade)
                        .await
                        .context("persisting closed trade")?;
                    report.trades_closed += 1;
                }
                ReconcileOutcome::StillOpen | ReconcileOutcome::AlreadyTerminal => {
                    if result.trade.is_open() {
                        still_open.push(result.trade);
                    }
                }
            }
        }
        Ok(still_open)
    }
}

/// ATR relative to price, the volatility figure shared by the sizer
/// and the risk gate.
fn normalized_volatility(snapshot: &IndicatorSnapshot) -> Option<f64> {
    let atr = snapshot.get(columns::ATR)?;
    let close = snapshot.get(columns::CLOSE)?;
    if close > 0.0 {
        Some(atr / close)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::{DateTime, Duration as ChronoDuration};
    use std::sync::Mutex;

    use trading_core::{
        AccountBalance, Candle, Fill, FillSide, IndicatorSeries, OrderResult, Position,
        TradeDirection, TradingError,
    };

    struct MockExchange {
        candles: Vec<Candle>,
        positions: Vec<Position>,
        fills: Vec<Fill>,
        balance: AccountBalance,
    }

    impl MockExchange {
        fn flat(equity: f64) -> Self {
            Self {
                candles: candles(20),
                positions: vec![],
                fills: vec![],
                balance: AccountBalance {
                    total_equity: equity,
                    available_margin: equity,
                    used_margin: 0.0,
                },
            }
        }
    }

    #[async_trait]
    impl ExchangeClient for MockExchange {
        async fn get_candles(&self, _: &str, _: usize) -> Result<Vec<Candle>, TradingError> {
            Ok(self.candles.clone())
        }

        async fn get_open_positions(&self, _: &str) -> Result<Vec<Position>, TradingError> {
            Ok(self.positions.clone())
        }

        async fn get_recent_fills(
            &self,
            _: &str,
            _: DateTime<Utc>,
            _: usize,
        ) -> Result<Vec<Fill>, TradingError> {
            Ok(self.fills.clone())
        }

        async fn get_balance(&self) -> Result<AccountBalance, TradingError> {
            Ok(self.balance.clone())
        }
    }

    struct MockIndicators {
        series: IndicatorSeries,
    }

    #[async_trait]
    impl IndicatorProvider for MockIndicators {
        async fn compute(
            &self,
            _: &[Candle],
            _: &IndicatorParams,
        ) -> Result<IndicatorSeries, TradingError> {
            Ok(self.series.clone())
        }
    }

    #[derive(Default)]
    struct MockRepo {
        open: Mutex<Vec<Trade>>,
        created: Mutex<Vec<Trade>>,
        updated: Mutex<Vec<Trade>>,
    }

    #[async_trait]
    impl TradeRepository for MockRepo {
        async fn create(&self, trade: &Trade) -> Result<(), TradingError> {
            self.created.lock().unwrap().push(trade.clone());
            Ok(())
        }

        async fn update(&self, trade: &Trade) -> Result<(), TradingError> {
            self.updated.lock().unwrap().push(trade.clone());
            Ok(())
        }

        async fn open_trades(&self) -> Result<Vec<Trade>, TradingError> {
            Ok(self.open.lock().unwrap().clone())
        }
    }

    #[derive(Default)]
    struct MockExecutor {
        placed: Mutex<Vec<(String, TradeDirection, f64, u32)>>,
    }

    #[async_trait]
    impl OrderExecutor for MockExecutor {
        async fn place(
            &self,
            symbol: &str,
            direction: TradeDirection,
            amount_usd: f64,
            leverage: u32,
            _stop_loss: f64,
            _take_profit: f64,
        ) -> Result<OrderResult, TradingError> {
            self.placed
                .lock()
                .unwrap()
                .push((symbol.to_string(), direction, amount_usd, leverage));
            Ok(OrderResult {
                order_id: "mock-order".to_string(),
                filled_amount: amount_usd / 100.0,
                avg_price: 100.0,
                fee: 0.05,
            })
        }
    }

    fn config(trading_enabled: bool) -> AgentConfig {
        AgentConfig {
            symbols: vec!["BTC-USDT-SWAP".to_string()],
            candle_limit: 50,
            scan_interval_seconds: 300,
            trading_enabled,
            base_order_usd: 100.0,
            default_leverage: 3,
            max_positions: 5,
            risk_tolerance: 0.05,
            daily_loss_limit_pct: 5.0,
            max_drawdown_pct: 15.0,
            margin_usage_limit: 0.60,
            volatility_threshold: 0.08,
            max_correlated_positions: 2,
            max_portfolio_leverage: 10.0,
            fill_lookup_limit: 100,
        }
    }

    fn candles(n: usize) -> Vec<Candle> {
        (0..n)
            .map(|i| Candle {
                timestamp: Utc::now() - ChronoDuration::minutes((n - i) as i64 * 5),
                open: 100.0,
                high: 102.0,
                low: 98.0,
                close: 100.0,
                volume: 1_000.0,
            })
            .collect()
    }

    /// Twenty rows of an established uptrend with every confirmation
    /// in place.
    fn bullish_series() -> IndicatorSeries {
        let rows = (0..20)
            .map(|i| {
                let close = 100.0 + i as f64 * 0.5;
                IndicatorSnapshot::new()
                    .with(columns::CLOSE, Some(close))
                    .with(columns::LOW, Some(close - 2.0))
                    .with(columns::HIGH, Some(close + 2.0))
                    .with(columns::EMA_FAST, Some(close - 1.0))
                    .with(columns::EMA_MEDIUM, Some(close - 3.0))
                    .with(columns::EMA_SLOW, Some(close - 6.0))
                    .with(columns::MACD, Some(1.2))
                    .with(columns::MACD_SIGNAL, Some(0.8))
                    .with(columns::RSI, Some(62.0))
                    .with(columns::ATR, Some(1.5))
                    .with(columns::VOLUME, Some(2_000.0))
                    .with(columns::VOLUME_SMA, Some(1_200.0))
                    .with(columns::ADX, Some(30.0))
                    .with(columns::PLUS_DI, Some(28.0))
                    .with(columns::MINUS_DI, Some(10.0))
                    .with(columns::BB_WIDTH, Some(0.05))
            })
            .collect();
        IndicatorSeries::new(rows)
    }

    fn open_trade() -> Trade {
        Trade {
            id: "t1".to_string(),
            symbol: "BTC-USDT-SWAP".to_string(),
            direction: TradeDirection::Long,
            status: TradeStatus::Open,
            entry_price: 100.0,
            quantity: 2.0,
            leverage: 4,
            margin_used: 50.0,
            entry_fee: 0.0,
            stop_loss: 95.0,
            take_profit: 110.0,
            opened_at: Utc::now() - ChronoDuration::hours(2),
            closed_at: None,
            exit_price: None,
            exit_fee: None,
            pnl: None,
            pnl_pct: None,
            exit_note: None,
        }
    }

    #[tokio::test]
    async fn full_cycle_opens_a_trade() {
        let mut engine = TradingEngine::new(
            config(true),
            MockExchange::flat(10_000.0),
            MockIndicators {
                series: bullish_series(),
            },
            MockRepo::default(),
            MockExecutor::default(),
        );

        let report = engine.run_cycle().await.expect("cycle");

        assert_eq!(report.signals, 1);
        assert_eq!(report.orders_placed, 1);
        assert_eq!(report.vetoed, 0);

        let created = engine.repository.created.lock().unwrap();
        assert_eq!(created.len(), 1);
        let trade = &created[0];
        assert_eq!(trade.symbol, "BTC-USDT-SWAP");
        assert_eq!(trade.direction, TradeDirection::Long);
        assert!(trade.is_open());
        assert!(trade.stop_loss < trade.entry_price);
        assert!(trade.take_profit > trade.entry_price);
    }

    #[tokio::test]
    async fn disabled_trading_logs_but_does_not_place() {
        let mut engine = TradingEngine::new(
            config(false),
            MockExchange::flat(10_000.0),
            MockIndicators {
                series: bullish_series(),
            },
            MockRepo::default(),
            MockExecutor::default(),
        );

        let report = engine.run_cycle().await.expect("cycle");

        assert_eq!(report.signals, 1);
        assert_eq!(report.orders_placed, 0);
        assert!(engine.executor.placed.lock().unwrap().is_empty());
        assert!(engine.repository.created.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn emergency_stop_vetoes_every_signal() {
        let mut engine = TradingEngine::new(
            config(true),
            MockExchange::flat(10_000.0),
            MockIndicators {
                series: bullish_series(),
            },
            MockRepo::default(),
            MockExecutor::default(),
        );
        engine.set_emergency_stop(true, Some("test"));

        let report = engine.run_cycle().await.expect("cycle");

        assert_eq!(report.signals, 1);
        assert_eq!(report.vetoed, 1);
        assert_eq!(report.orders_placed, 0);
        assert!(engine.executor.placed.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn vanished_position_is_reconciled_closed() {
        let mut exchange = MockExchange::flat(10_000.0);
        let trade = open_trade();
        exchange.fills = vec![Fill {
            order_id: "o1".to_string(),
            side: FillSide::Sell,
            amount: 2.0,
            price: 110.0,
            cost: 220.0,
            fee: 0.5,
            timestamp: trade.opened_at + ChronoDuration::minutes(30),
        }];

        let repo = MockRepo::default();
        repo.open.lock().unwrap().push(trade);

        let mut cfg = config(true);
        cfg.symbols = vec![]; // reconciliation only
        let mut engine = TradingEngine::new(
            cfg,
            exchange,
            MockIndicators {
                series: bullish_series(),
            },
            repo,
            MockExecutor::default(),
        );

        let report = engine.run_cycle().await.expect("cycle");

        assert_eq!(report.trades_reconciled, 1);
        assert_eq!(report.trades_closed, 1);

        let updated = engine.repository.updated.lock().unwrap();
        assert_eq!(updated.len(), 1);
        assert_eq!(updated[0].status, TradeStatus::ClosedTakeProfit);
        assert_eq!(updated[0].exit_price, Some(110.0));
    }

    #[tokio::test]
    async fn live_position_keeps_trade_open_and_symbol_reserved() {
        let mut exchange = MockExchange::flat(10_000.0);
        let trade = open_trade();
        exchange.positions = vec![Position {
            symbol: trade.symbol.clone(),
            direction: TradeDirection::Long,
            contracts: 2.0,
            entry_price: 100.0,
            leverage: 4,
            margin: 50.0,
        }];

        let repo = MockRepo::default();
        repo.open.lock().unwrap().push(trade);

        let mut engine = TradingEngine::new(
            config(true),
            exchange,
            MockIndicators {
                series: bullish_series(),
            },
            repo,
            MockExecutor::default(),
        );

        let report = engine.run_cycle().await.expect("cycle");

        assert_eq!(report.trades_reconciled, 1);
        assert_eq!(report.trades_closed, 0);
        // The open symbol is skipped by the scan, so no new signal.
        assert_eq!(report.signals, 0);
        assert!(engine.repository.created.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn full_book_skips_the_scan() {
        let mut exchange = MockExchange::flat(10_000.0);
        let trade = open_trade();
        exchange.positions = vec![Position {
            symbol: trade.symbol.clone(),
            direction: TradeDirection::Long,
            contracts: 2.0,
            entry_price: 100.0,
            leverage: 4,
            margin: 50.0,
        }];

        let repo = MockRepo::default();
        repo.open.lock().unwrap().push(trade);

        let mut cfg = config(true);
        cfg.max_positions = 1;
        cfg.symbols = vec!["ETH-USDT-SWAP".to_string()];
        let mut engine = TradingEngine::new(
            cfg,
            exchange,
            MockIndicators {
                series: bullish_series(),
            },
            repo,
            MockExecutor::default(),
        );

        let report = engine.run_cycle().await.expect("cycle");
        assert_eq!(report.signals, 0);
        assert_eq!(report.orders_placed, 0);
    }
}
