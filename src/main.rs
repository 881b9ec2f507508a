/// Entry point: wires every component into the boot sequence below. Market
/// data (price feed, order flow, candle stores, historical backfill) comes
/// from the single `[broker]`-configured bridge; each `[[accounts]]` entry
/// gets its own broker connection, kill-switch, open-trades snapshot, exit
/// engine and equity snapshotter so one account's circuit breaker never
/// touches another's.
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Datelike, TimeZone, Utc};
use tokio::sync::watch;
use tracing::{error, info, warn};

use smc_core::broker::{BrokerClient, GuardrailClient};
use smc_core::config::{load_config, Config};
use smc_core::data::{
    CandleBuilder, CandleStoreRegistry, HistoricalBackfill, MarketData, OpenTrades, OrderFlow, PriceFeed,
};
use smc_core::events::EventBus;
use smc_core::exit::ExitEngine;
use smc_core::killswitch::{KillSwitch, KillSwitchContext, Transition};
use smc_core::persistence::{self, Pool};
use smc_core::pipeline::{
    AccountRuntime, AvoidWindowManager, DecisionLog, Dispatcher, ExecutionContext, ExecutionFilter, Guardrail,
    LivePnL, OrderEventSink,
};
use smc_core::risk::RiskManager;
use smc_core::strategy::{SmcStrategy, StrategyOutcome};
use smc_core::types::{DecisionRecord, StrategyTier};
use smc_core::Result;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "smc_core=info,warn".into()),
        )
        .json()
        .init();

    let config_path = std::env::args().nth(1).unwrap_or_else(|| "config.toml".to_string());
    let config = Arc::new(load_config(&config_path)?);
    info!(symbols = ?config.symbols, accounts = config.accounts.len(), "configuration loaded");

    let pool = Pool::connect(&config.database.url, config.database.max_connections).await?;
    pool.ensure_schema().await?;
    info!("database schema ready");

    if config.accounts.is_empty() {
        return Err(smc_core::TradingError::FatalStartup("no accounts configured".to_string()));
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut tasks = Vec::new();

    let event_bus = Arc::new(EventBus::new(config.event_log_path.clone()));
    event_bus.start_processing().await;

    // Market data is account-agnostic: it rides on the bridge configured
    // under `[broker]`, distinct from each account's own trading connection.
    let market_broker = Arc::new(BrokerClient::new(config.broker.base_url.clone(), config.broker.timeout_secs));
    let stores = CandleStoreRegistry::new(config.max_candles_per_symbol);
    let builder = Arc::new(CandleBuilder::new(stores.clone()));
    let market_data = Arc::new(MarketData::new(stores.clone(), builder.clone()));

    let backfill = HistoricalBackfill::new(market_broker.clone(), stores.clone(), config.historical_backfill_days);
    backfill.run(&config.symbols).await;

    let price_feed = Arc::new(PriceFeed::new(market_broker.clone(), builder.clone(), config.market_feed_interval_sec));
    let order_flow = Arc::new(OrderFlow::new(market_broker.clone(), config.order_flow.poll_interval_ms));

    for symbol in &config.symbols {
        let pf = price_feed.clone();
        let sym = symbol.clone();
        let rx = shutdown_rx.clone();
        tasks.push(tokio::spawn(async move { pf.run(sym, rx).await }));

        let of = order_flow.clone();
        let sym = symbol.clone();
        let rx = shutdown_rx.clone();
        tasks.push(tokio::spawn(async move { of.run(sym, rx).await }));
    }

    let guardrail_client = Arc::new(GuardrailClient::new(config.guardrail.base_url.clone(), config.guardrail.timeout_secs));
    let guardrail = Arc::new(Guardrail::new(guardrail_client));

    let strategy = Arc::new(SmcStrategy::new(config.clone(), market_data.clone()));
    let risk = Arc::new(RiskManager::new(config.clone()));
    let decision_log = Arc::new(DecisionLog::new(pool.clone()));

    // Per-account runtimes: own broker connection, kill switch, open-trades
    // snapshot, exit engine and equity snapshotter. The first account's
    // OpenTrades also backs the shared execution filter below.
    let mut account_runtimes = Vec::with_capacity(config.accounts.len());
    let mut primary_open_trades: Option<Arc<OpenTrades>> = None;

    for account_cfg in &config.accounts {
        let broker = Arc::new(BrokerClient::new(account_cfg.broker_base_url.clone(), config.broker.timeout_secs));
        let open_trades = Arc::new(OpenTrades::new(broker.clone()));
        let kill_switch = Arc::new(KillSwitch::new(config.clone()));

        if primary_open_trades.is_none() {
            primary_open_trades = Some(open_trades.clone());
        }

        {
            let ot = open_trades.clone();
            let mut rx = shutdown_rx.clone();
            let poll = Duration::from_secs(config.exposure_poll_interval_sec);
            tasks.push(tokio::spawn(async move {
                let mut ticker = tokio::time::interval(poll);
                loop {
                    tokio::select! {
                        _ = ticker.tick() => { ot.refresh().await; }
                        _ = rx.changed() => { if *rx.borrow() { break; } }
                    }
                }
            }));
        }

        let exit_engine = ExitEngine::new(
            broker.clone(),
            open_trades.clone(),
            kill_switch.clone(),
            event_bus.clone(),
            pool.clone(),
            config.clone(),
        );
        {
            let rx = shutdown_rx.clone();
            tasks.push(tokio::spawn(async move { exit_engine.run(rx).await }));
        }

        let live_pnl = Arc::new(LivePnL::new(broker.clone(), pool.clone(), &config.display_timezone, config.loss_streak.clone()));
        {
            let lp = live_pnl.clone();
            let rx = shutdown_rx.clone();
            let poll = Duration::from_secs(config.exposure_poll_interval_sec);
            tasks.push(tokio::spawn(async move { lp.run(poll, rx).await }));
        }

        let avoid_windows = AvoidWindowManager::new(broker.clone(), event_bus.clone(), pool.clone(), account_cfg.symbols.clone());
        {
            let rx = shutdown_rx.clone();
            let poll = Duration::from_secs(config.exposure_poll_interval_sec);
            tasks.push(tokio::spawn(async move { avoid_windows.run(poll, rx).await }));
        }

        account_runtimes.push((
            AccountRuntime {
                account_id: account_cfg.account_id.clone(),
                symbols: account_cfg.symbols.clone(),
                enabled: account_cfg.enabled,
                broker,
                kill_switch,
                open_trades,
            },
            live_pnl,
        ));
    }

    let order_sink = Arc::new(OrderEventSink::new(pool.clone()));
    for (_, live_pnl) in &account_runtimes {
        let lp = live_pnl.clone();
        order_sink
            .register_position_closed_handler(Arc::new(move |closed| {
                let lp = lp.clone();
                Box::pin(async move { lp.on_position_closed(closed).await })
            }))
            .await;
    }

    {
        let router = order_sink.clone().router();
        let addr = format!("0.0.0.0:{}", config.webhook_port);
        let mut rx = shutdown_rx.clone();
        tasks.push(tokio::spawn(async move {
            let listener = match tokio::net::TcpListener::bind(&addr).await {
                Ok(l) => l,
                Err(e) => {
                    error!(addr = %addr, error = %e, "failed to bind order-event webhook");
                    return;
                }
            };
            info!(addr = %addr, "order-event webhook listening");
            axum::serve(listener, router)
                .with_graceful_shutdown(async move {
                    let _ = rx.changed().await;
                })
                .await
                .ok();
        }));
    }

    let Some(primary_open_trades) = primary_open_trades else {
        return Err(smc_core::TradingError::FatalStartup("no account open-trades snapshot available".to_string()));
    };

    let execution_filter = Arc::new(ExecutionFilter::new(
        config.clone(),
        primary_open_trades,
        order_flow.clone(),
        pool.clone(),
    ));

    let accounts: Vec<AccountRuntime> = account_runtimes.into_iter().map(|(a, _)| a).collect();
    let kill_switches: Vec<Arc<KillSwitch>> = accounts.iter().map(|a| a.kill_switch.clone()).collect();
    let account_ids: Vec<String> = accounts.iter().map(|a| a.account_id.clone()).collect();
    let account_brokers: Vec<Arc<BrokerClient>> = accounts.iter().map(|a| a.broker.clone()).collect();

    let dispatcher = Arc::new(Dispatcher::new(accounts, risk, execution_filter, config.clone(), pool.clone(), event_bus.clone()));

    {
        let rx = shutdown_rx.clone();
        let config = config.clone();
        let pool = pool.clone();
        tasks.push(tokio::spawn(async move {
            run_kill_switch_loop(config, pool, kill_switches, account_ids, account_brokers, rx).await;
        }));
    }

    {
        let rx = shutdown_rx.clone();
        tasks.push(tokio::spawn(run_decision_loop(
            config.clone(),
            market_broker.clone(),
            guardrail,
            strategy,
            dispatcher,
            decision_log,
            rx,
        )));
    }

    tokio::signal::ctrl_c().await.ok();
    info!("shutdown signal received");
    let _ = shutdown_tx.send(true);

    for task in tasks {
        if let Err(e) = task.await {
            warn!(error = %e, "background task panicked during shutdown");
        }
    }

    info!("shutdown complete");
    Ok(())
}

/// Per-account circuit breaker: periodically rebuilds a `KillSwitchContext`
/// from persisted trades/equity and feeds it through `KillSwitch::evaluate`,
/// persisting any transition. Runs at the same cadence as exposure refresh.
async fn run_kill_switch_loop(
    config: Arc<Config>,
    pool: Pool,
    kill_switches: Vec<Arc<KillSwitch>>,
    account_ids: Vec<String>,
    account_brokers: Vec<Arc<BrokerClient>>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(Duration::from_secs(config.exposure_poll_interval_sec));
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let now = Utc::now();
                let day_start = now
                    .date_naive()
                    .and_hms_opt(0, 0, 0)
                    .and_then(|d| Utc.from_local_datetime(&d).single())
                    .unwrap_or(now);
                let week_start = day_start - chrono::Duration::days(now.weekday().num_days_from_monday() as i64);

                for ((kill_switch, account_id), broker) in kill_switches.iter().zip(account_ids.iter()).zip(account_brokers.iter()) {
                    let daily_pnl = persistence::trades::closed_pnl_since(&pool, day_start).await.unwrap_or(0.0);
                    let weekly_pnl = persistence::trades::closed_pnl_since(&pool, week_start).await.unwrap_or(0.0);
                    let daily_trade_count = persistence::trades::trade_count_since(&pool, day_start).await.unwrap_or(0) as u32;
                    let weekly_trade_count = persistence::trades::trade_count_since(&pool, week_start).await.unwrap_or(0) as u32;
                    let recent_trades = persistence::trades::recent(&pool, 20).await.unwrap_or_default();
                    let equity = broker.account_summary().await.map(|s| s.equity).unwrap_or(0.0);

                    let ctx = KillSwitchContext {
                        daily_pnl,
                        weekly_pnl,
                        day_start_equity: equity,
                        week_start_equity: equity,
                        recent_trades,
                        daily_trade_count,
                        weekly_trade_count,
                        current_spread_points: 0.0,
                        global_estimated_risk: 0.0,
                        now,
                    };

                    let transition = kill_switch.evaluate(&ctx).await;
                    if transition != Transition::None {
                        let state = kill_switch.state().await;
                        let active = transition == Transition::BecameActive;
                        if let Err(e) = persistence::kill_switch::record_transition(&pool, Some(account_id), active, &state.reasons).await {
                            error!(account_id = %account_id, error = %e, "failed to persist kill switch transition");
                        }
                    }
                }
            }
            _ = shutdown.changed() => { if *shutdown.borrow() { break; } }
        }
    }
}

type LastTradeTimes = Arc<tokio::sync::Mutex<std::collections::HashMap<String, DateTime<Utc>>>>;

/// Strategy tick loop. Every configured symbol is evaluated concurrently on
/// each tick; a per-symbol mutex still guarantees at most one decision
/// pipeline runs for a given symbol at a time, in case a slow broker/guardrail
/// round-trip makes one symbol's evaluation outlive the tick interval.
/// Strategy-level skips and errors are recorded directly since no account was
/// ever involved; per-account outcomes are already persisted inside
/// `Dispatcher::dispatch`.
async fn run_decision_loop(
    config: Arc<Config>,
    market_broker: Arc<BrokerClient>,
    guardrail: Arc<Guardrail>,
    strategy: Arc<SmcStrategy>,
    dispatcher: Arc<Dispatcher>,
    decision_log: Arc<DecisionLog>,
    mut shutdown: watch::Receiver<bool>,
) {
    let last_trade_time: LastTradeTimes = Arc::new(tokio::sync::Mutex::new(std::collections::HashMap::new()));
    let symbol_locks: std::collections::HashMap<String, Arc<tokio::sync::Mutex<()>>> = config
        .symbols
        .iter()
        .map(|s| (s.clone(), Arc::new(tokio::sync::Mutex::new(()))))
        .collect();
    let mut ticker = tokio::time::interval(Duration::from_secs(config.tick_interval_sec));

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let futures = config.symbols.iter().map(|symbol| {
                    let lock = symbol_locks[symbol].clone();
                    evaluate_symbol(
                        symbol.clone(),
                        lock,
                        market_broker.clone(),
                        guardrail.clone(),
                        strategy.clone(),
                        dispatcher.clone(),
                        decision_log.clone(),
                        last_trade_time.clone(),
                        config.clone(),
                    )
                });
                futures_util::future::join_all(futures).await;
            }
            _ = shutdown.changed() => { if *shutdown.borrow() { break; } }
        }
    }
}

async fn evaluate_symbol(
    symbol: String,
    lock: Arc<tokio::sync::Mutex<()>>,
    market_broker: Arc<BrokerClient>,
    guardrail: Arc<Guardrail>,
    strategy: Arc<SmcStrategy>,
    dispatcher: Arc<Dispatcher>,
    decision_log: Arc<DecisionLog>,
    last_trade_time: LastTradeTimes,
    config: Arc<Config>,
) {
    let _guard = lock.lock().await;

    // No per-symbol tier mapping exists in configuration; every symbol is
    // evaluated at the conservative default tier.
    let tier = StrategyTier::Low;

    let guardrail_decision = guardrail.evaluate(tier).await;

    let outcome = match strategy.evaluate(&symbol).await {
        Ok(outcome) => outcome,
        Err(e) => {
            warn!(symbol = %symbol, error = %e, "strategy evaluation failed");
            let record = DecisionRecord {
                id: uuid::Uuid::new_v4(),
                ts: Utc::now(),
                symbol: symbol.clone(),
                account_id: None,
                traded: false,
                direction: None,
                planned_entry: None,
                planned_sl: None,
                planned_tp: None,
                skip_reasons: vec![],
                strategy_error: Some(e.to_string()),
                guardrail_mode: Some(guardrail_decision.mode),
                ticket: None,
            };
            if let Err(e) = decision_log.record(&record).await {
                error!(symbol = %symbol, error = %e, "failed to record strategy error decision");
            }
            return;
        }
    };

    match outcome {
        StrategyOutcome::Skip { reason } => {
            let record = DecisionRecord {
                id: uuid::Uuid::new_v4(),
                ts: Utc::now(),
                symbol: symbol.clone(),
                account_id: None,
                traded: false,
                direction: None,
                planned_entry: None,
                planned_sl: None,
                planned_tp: None,
                skip_reasons: vec![reason],
                strategy_error: None,
                guardrail_mode: Some(guardrail_decision.mode),
                ticket: None,
            };
            if let Err(e) = decision_log.record(&record).await {
                error!(symbol = %symbol, error = %e, "failed to record skip decision");
            }
        }
        StrategyOutcome::Signal(signal) => {
            let (bid, ask) = match market_broker.price(&symbol).await {
                Ok(p) => (p.bid, p.ask),
                Err(e) => {
                    warn!(symbol = %symbol, error = %e, "price unavailable, skipping dispatch");
                    let record = DecisionRecord {
                        id: uuid::Uuid::new_v4(),
                        ts: Utc::now(),
                        symbol: symbol.clone(),
                        account_id: None,
                        traded: false,
                        direction: Some(signal.direction),
                        planned_entry: Some(signal.entry),
                        planned_sl: Some(signal.sl),
                        planned_tp: Some(signal.tp),
                        skip_reasons: vec!["price_unavailable".to_string()],
                        strategy_error: None,
                        guardrail_mode: Some(guardrail_decision.mode),
                        ticket: None,
                    };
                    if let Err(e) = decision_log.record(&record).await {
                        error!(symbol = %symbol, error = %e, "failed to record price_unavailable decision");
                    }
                    return;
                }
            };

            let meta = config.symbol_meta.get(&symbol);
            let new_trade_risk_estimate = meta
                .map(|m| (signal.risk_distance() / m.pip_size) * m.pip_value_per_lot * m.min_volume)
                .unwrap_or(0.0);

            let last_trade = last_trade_time.lock().await.get(&symbol).copied();

            let exec_ctx = ExecutionContext {
                signal: (*signal).clone(),
                tier,
                bid,
                ask,
                now: Utc::now(),
                last_trade_time: last_trade,
                new_trade_risk_estimate,
                liquidity_swept: signal.meta.liquidity_swept,
                order_block_zone: true,
                bos_direction: Some(signal.direction),
            };

            let records = dispatcher.dispatch(*signal, tier, guardrail_decision.mode, exec_ctx).await;
            if records.iter().any(|r| r.traded) {
                last_trade_time.lock().await.insert(symbol.clone(), Utc::now());
            }
        }
    }
}
