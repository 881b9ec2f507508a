/// Multi-account fan-out (§4.10). Strategy produces a single Signal per
/// symbol; the dispatcher re-evaluates it once per configured account that
/// trades that symbol, using that account's own KillSwitch/OpenTrades/
/// broker instance, so one account's kill-switch activation never touches
/// another. DecisionLog records one row per (signal, account).
use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::broker::BrokerClient;
use crate::config::Config;
use crate::data::OpenTrades;
use crate::events::{Event, EventBus, EventPayload, EventType};
use crate::killswitch::KillSwitch;
use crate::persistence::{self, Pool};
use crate::pipeline::execution_filter::{ExecutionContext, ExecutionFilter};
use crate::risk::{RiskContext, RiskManager};
use crate::types::{DecisionRecord, ExitPlan, GuardrailMode, Signal, StrategyTier, TrailMode};

/// Per-account wiring the dispatcher fans a signal out to. Each field here
/// is instantiated once per account at boot, not shared globally.
pub struct AccountRuntime {
    pub account_id: String,
    pub symbols: Vec<String>,
    pub enabled: bool,
    pub broker: Arc<BrokerClient>,
    pub kill_switch: Arc<KillSwitch>,
    pub open_trades: Arc<OpenTrades>,
}

pub struct Dispatcher {
    accounts: Vec<AccountRuntime>,
    risk: Arc<RiskManager>,
    execution_filter: Arc<ExecutionFilter>,
    config: Arc<Config>,
    pool: Pool,
    event_bus: Arc<EventBus>,
}

impl Dispatcher {
    pub fn new(
        accounts: Vec<AccountRuntime>,
        risk: Arc<RiskManager>,
        execution_filter: Arc<ExecutionFilter>,
        config: Arc<Config>,
        pool: Pool,
        event_bus: Arc<EventBus>,
    ) -> Self {
        Dispatcher { accounts, risk, execution_filter, config, pool, event_bus }
    }

    pub async fn dispatch(
        &self,
        signal: Signal,
        tier: StrategyTier,
        guardrail_mode: GuardrailMode,
        exec_common: ExecutionContext,
    ) -> Vec<DecisionRecord> {
        let mut records = Vec::with_capacity(self.accounts.len());

        for account in &self.accounts {
            if !account.enabled || !account.symbols.contains(&signal.symbol) {
                continue;
            }

            let record = self.dispatch_to_account(account, &signal, tier, guardrail_mode, &exec_common).await;

            if let Err(e) = persistence::decisions::insert(&self.pool, &record).await {
                warn!(account_id = %account.account_id, error = %e, "failed to persist decision record");
            }

            records.push(record);
        }

        records
    }

    async fn dispatch_to_account(
        &self,
        account: &AccountRuntime,
        signal: &Signal,
        tier: StrategyTier,
        guardrail_mode: GuardrailMode,
        exec_common: &ExecutionContext,
    ) -> DecisionRecord {
        let symbol = signal.symbol.clone();

        let ks_state = account.kill_switch.state().await;
        if ks_state.active {
            self.emit_skip(&symbol, Some(&account.account_id), &ks_state.reasons).await;
            return self.skip_record(&symbol, Some(account.account_id.clone()), ks_state.reasons, guardrail_mode);
        }

        let day_start = Utc::now().date_naive().and_hms_opt(0, 0, 0).unwrap().and_utc();
        let trades_today = persistence::decisions::traded_count_since(&self.pool, &symbol, day_start)
            .await
            .unwrap_or(0) as u32;
        let daily_pnl = persistence::trades::closed_pnl_since(&self.pool, day_start).await.unwrap_or(0.0);

        let equity = match account.broker.account_summary().await {
            Ok(summary) => summary.equity,
            Err(e) => {
                warn!(account_id = %account.account_id, error = %e, "account summary unavailable, treating as stale exposure");
                0.0
            }
        };

        let risk_ctx = RiskContext { symbol: symbol.clone(), tier, equity, daily_pnl, trades_today, guardrail_mode };
        let risk_decision = self.risk.can_take_new_trade(&risk_ctx);
        if !risk_decision.allowed {
            let reason = risk_decision.reason.clone().unwrap_or_default();
            self.emit_skip(&symbol, Some(&account.account_id), std::slice::from_ref(&reason)).await;
            return self.skip_record(&symbol, Some(account.account_id.clone()), vec![reason], guardrail_mode);
        }

        let mut account_ctx = exec_common.clone();
        account_ctx.signal = signal.clone();
        account_ctx.tier = tier;

        let verdict = self.execution_filter.evaluate(&account_ctx).await;
        if !verdict.allowed {
            self.emit_skip(&symbol, Some(&account.account_id), &verdict.reasons).await;
            return self.skip_record(&symbol, Some(account.account_id.clone()), verdict.reasons, guardrail_mode);
        }

        let Some(meta) = self.config.symbol_meta.get(&symbol).copied() else {
            let reason = format!("no symbol_meta configured for {}", symbol);
            self.emit_skip(&symbol, Some(&account.account_id), std::slice::from_ref(&reason)).await;
            return self.skip_record(&symbol, Some(account.account_id.clone()), vec![reason], guardrail_mode);
        };

        let adjusted_pct = risk_decision.adjusted_risk_pct.unwrap_or(1.0);
        let sl_distance = signal.risk_distance();
        let lot = self.risk.position_size(equity, adjusted_pct, sl_distance, &meta);

        let open_result = account
            .broker
            .open_trade(
                &symbol,
                signal.direction,
                signal.order_kind,
                signal.entry,
                lot,
                signal.sl,
                signal.tp,
                "smc",
                serde_json::json!({ "confluence_score": signal.meta.confluence_score, "reason": signal.reason }),
            )
            .await;

        match open_result {
            Ok(resp) => {
                info!(account_id = %account.account_id, symbol = %symbol, ticket = ?resp.ticket, "trade opened");
                self.emit(
                    EventType::OrderSent,
                    EventPayload::OrderSent {
                        ticket: resp.ticket.clone(),
                        symbol: symbol.clone(),
                        direction: signal.direction,
                        volume: lot,
                    },
                    &resp.ticket.clone().unwrap_or_else(|| symbol.clone()),
                )
                .await;

                if let Some(ticket) = resp.ticket.clone() {
                    let plan = self.build_exit_plan(ticket, signal);
                    if let Err(e) = persistence::exit_plans::upsert(&self.pool, &plan).await {
                        warn!(account_id = %account.account_id, symbol = %symbol, error = %e, "failed to persist exit plan");
                    }
                }

                DecisionRecord {
                    id: Uuid::new_v4(),
                    ts: Utc::now(),
                    symbol,
                    account_id: Some(account.account_id.clone()),
                    traded: true,
                    direction: Some(signal.direction),
                    planned_entry: Some(signal.entry),
                    planned_sl: Some(signal.sl),
                    planned_tp: Some(signal.tp),
                    skip_reasons: vec![],
                    strategy_error: None,
                    guardrail_mode: Some(guardrail_mode),
                    ticket: resp.ticket,
                }
            }
            Err(e) => {
                warn!(account_id = %account.account_id, symbol = %symbol, error = %e, "order placement failed");
                self.emit(
                    EventType::OrderRejected,
                    EventPayload::OrderRejected { symbol: symbol.clone(), reason: e.to_string() },
                    &symbol,
                )
                .await;
                self.skip_record(&symbol, Some(account.account_id.clone()), vec![e.to_string()], guardrail_mode)
            }
        }
    }

    /// Derives a fresh `ExitPlan` from the signal's own geometry and the
    /// configured exit behavior, so break-even/partial/trailing/time exits
    /// have something to act on from the moment a trade opens.
    fn build_exit_plan(&self, ticket: String, signal: &Signal) -> ExitPlan {
        let exit = &self.config.exit;

        ExitPlan {
            ticket,
            entry: signal.entry,
            tp1: Some(signal.tp),
            tp2: None,
            tp3: None,
            sl_initial: signal.sl,
            be_trigger_r: exit.be_trigger_r,
            be_fired: false,
            partial_pct: if exit.enable_partial_close { Some(exit.partial_pct) } else { None },
            partial_fired: false,
            trail_mode: if exit.enable_trailing_stop { TrailMode::FixedPips } else { TrailMode::None },
            trail_value: exit.trail_pips,
            trail_sl: None,
            last_trail_move: None,
            time_limit: chrono::Duration::hours(exit.time_limit_hours),
            opened_at: Utc::now(),
        }
    }

    fn skip_record(
        &self,
        symbol: &str,
        account_id: Option<String>,
        reasons: Vec<String>,
        guardrail_mode: GuardrailMode,
    ) -> DecisionRecord {
        DecisionRecord {
            id: Uuid::new_v4(),
            ts: Utc::now(),
            symbol: symbol.to_string(),
            account_id,
            traded: false,
            direction: None,
            planned_entry: None,
            planned_sl: None,
            planned_tp: None,
            skip_reasons: reasons,
            strategy_error: None,
            guardrail_mode: Some(guardrail_mode),
            ticket: None,
        }
    }

    async fn emit_skip(&self, symbol: &str, account_id: Option<&str>, reasons: &[String]) {
        let key = format!("{}|{}|signal_skipped|{}", symbol, account_id.unwrap_or("-"), Utc::now().timestamp_nanos_opt().unwrap_or_default());
        let event = Event::new(
            EventType::SignalSkipped,
            EventPayload::SignalSkipped { symbol: symbol.to_string(), reasons: reasons.to_vec() },
            key,
        );
        if let Err(e) = self.event_bus.publish(event).await {
            warn!(symbol, error = %e, "failed to publish skip event");
        }
    }

    async fn emit(&self, event_type: EventType, payload: EventPayload, key_suffix: &str) {
        let key = format!("{}|{}|{}", key_suffix, event_type.as_str(), Utc::now().timestamp_nanos_opt().unwrap_or_default());
        if let Err(e) = self.event_bus.publish(Event::new(event_type, payload, key)).await {
            warn!(error = %e, "failed to publish dispatcher event");
        }
    }
}
