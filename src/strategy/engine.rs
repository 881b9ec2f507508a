/// SMC strategy evaluation: the §4.2 fourteen-step decision rule, wired up
/// per tick per symbol against a consistent MarketData snapshot.
use std::sync::Arc;
use tracing::{debug, info};

use crate::config::{Config, SmcConfig, SymbolMetaConfig};
use crate::data::MarketData;
use crate::error::{Result, TradingError};
use crate::strategy::fvg::find_fvgs;
use crate::strategy::order_blocks::{identify_order_block, mitigate};
use crate::strategy::smt::divergence_present;
use crate::strategy::structure::{find_bos_events, find_choch, is_discount, is_premium, trend_bias};
use crate::strategy::sweep::swept_before_bos;
use crate::strategy::swings::find_swings;
use crate::time::session_active;
use crate::types::{
    Candle, FvgGrade, OrderBlock, OrderKind, Signal, SignalMeta, Timeframe, TradeDirection, Trend,
};

#[derive(Debug, Clone)]
pub enum StrategyOutcome {
    Signal(Box<Signal>),
    Skip { reason: String },
}

pub struct SmcStrategy {
    config: Arc<Config>,
    market_data: Arc<MarketData>,
}

impl SmcStrategy {
    pub fn new(config: Arc<Config>, market_data: Arc<MarketData>) -> Self {
        SmcStrategy { config, market_data }
    }

    fn htf(&self) -> Timeframe {
        match self.config.smc.htf_timeframe.as_str() {
            "H1" => Timeframe::H1,
            _ => Timeframe::H4,
        }
    }

    fn symbol_meta(&self, symbol: &str) -> Result<SymbolMetaConfig> {
        self.config
            .symbol_meta
            .get(symbol)
            .copied()
            .ok_or_else(|| TradingError::InvalidParameter(format!("no symbol_meta configured for {}", symbol)))
    }

    pub async fn evaluate(&self, symbol: &str) -> Result<StrategyOutcome> {
        let smc = &self.config.smc;
        let meta = self.symbol_meta(symbol)?;

        let htf_tf = self.htf();
        let htf = self.market_data.recent_candles(symbol, htf_tf, 500).await;
        let itf = self.market_data.recent_candles(symbol, Timeframe::M15, 500).await;
        let ltf = self.market_data.recent_candles(symbol, Timeframe::M1, 500).await;

        if htf.len() < smc.min_htf_candles || itf.len() < smc.min_itf_candles || ltf.len() < smc.min_ltf_candles {
            return Ok(StrategyOutcome::Skip { reason: "insufficient_history".to_string() });
        }

        let sessions = self
            .config
            .symbol_execution
            .get(symbol)
            .map(|e| e.sessions.clone())
            .unwrap_or_default();
        let now = ltf.last().map(|c| c.end_time).unwrap_or_else(chrono::Utc::now);
        if !session_active(now, &sessions) {
            return Ok(StrategyOutcome::Skip { reason: "outside_session".to_string() });
        }

        let htf_swings = find_swings(&htf, smc.htf_pivot, smc.htf_pivot);
        let htf_bos = find_bos_events(&htf, &htf_swings, smc.bos_lookback);
        let last_price = htf.last().map(|c| c.close).unwrap_or(0.0);
        let htf_bias = trend_bias(&htf_swings, &htf_bos, last_price);

        if htf_bias.trend == Trend::Sideways {
            return Ok(StrategyOutcome::Skip { reason: "htf_sideways".to_string() });
        }

        let want_direction = match htf_bias.trend {
            Trend::Bullish => TradeDirection::Buy,
            Trend::Bearish => TradeDirection::Sell,
            Trend::Sideways => unreachable!(),
        };

        let in_zone = match want_direction {
            TradeDirection::Buy => is_discount(htf_bias.pd_position),
            TradeDirection::Sell => is_premium(htf_bias.pd_position),
        };
        if !in_zone {
            return Ok(StrategyOutcome::Skip { reason: "wrong_pd_zone".to_string() });
        }

        let itf_swings = find_swings(&itf, smc.itf_pivot, smc.itf_pivot);
        let itf_bos = find_bos_events(&itf, &itf_swings, smc.bos_lookback);
        let itf_last_price = itf.last().map(|c| c.close).unwrap_or(0.0);
        let itf_bias = trend_bias(&itf_swings, &itf_bos, itf_last_price);
        if itf_bias.trend != htf_bias.trend {
            return Ok(StrategyOutcome::Skip { reason: "itf_not_aligned".to_string() });
        }

        let ltf_swings = find_swings(&ltf, smc.ltf_pivot, smc.ltf_pivot);
        let ltf_bos = find_bos_events(&ltf, &ltf_swings, smc.bos_lookback);
        let Some(confirming_bos) = ltf_bos.iter().rev().find(|b| b.direction == want_direction) else {
            return Ok(StrategyOutcome::Skip { reason: "no_ltf_bos_confirmation".to_string() });
        };

        let choch = find_choch(&ltf_bos, htf_bias.trend, htf_bias.last_swing_lo.or(htf_bias.last_swing_hi));

        if !swept_before_bos(&ltf, &ltf_swings, confirming_bos.index, smc.sweep_lookback, want_direction) {
            return Ok(StrategyOutcome::Skip { reason: "no_liquidity_sweep".to_string() });
        }

        let Some(mut ob) = identify_order_block(&ltf, confirming_bos, Timeframe::M1) else {
            return Ok(StrategyOutcome::Skip { reason: "no_order_block".to_string() });
        };
        if confirming_bos.index + 1 < ltf.len() {
            mitigate(&mut ob, &ltf[confirming_bos.index + 1..]);
        }
        if ob.mitigated {
            return Ok(StrategyOutcome::Skip { reason: "order_block_mitigated".to_string() });
        }

        let fvgs = find_fvgs(&ltf, Timeframe::M1, smc.fvg_narrow_max_pips, smc.fvg_wide_min_pips, meta.pip_size);
        let aligned_fvg = fvgs.iter().rev().find(|f| f.direction == want_direction && f.grade != FvgGrade::Narrow).copied();
        let volume_imbalance = self.volume_imbalance_present(&ltf, want_direction);
        if aligned_fvg.is_none() && !volume_imbalance {
            return Ok(StrategyOutcome::Skip { reason: "no_fvg_or_volume_imbalance".to_string() });
        }

        let smt = if let Some(pair) = smc.smt_pairs.get(symbol) {
            let correlated = self.market_data.recent_candles(pair, Timeframe::M15, 100).await;
            divergence_present(&itf, &correlated, want_direction, 20)
        } else {
            None
        };
        if smc.require_smt && smt != Some(true) {
            return Ok(StrategyOutcome::Skip { reason: "smt_not_confirmed".to_string() });
        }

        let confluence_score = self.confluence_score(aligned_fvg.is_some(), volume_imbalance, smt);
        if confluence_score < smc.min_confluence_score {
            return Ok(StrategyOutcome::Skip { reason: "confluence_below_threshold".to_string() });
        }

        let current = match ltf.last() {
            Some(c) => c,
            None => return Ok(StrategyOutcome::Skip { reason: "insufficient_history".to_string() }),
        };
        let touch = current.close;

        let (order_kind, entry, sl, tp) = self.build_order(&ob, want_direction, touch, &meta);

        let signal = Signal {
            symbol: symbol.to_string(),
            direction: want_direction,
            entry,
            sl,
            tp,
            order_kind,
            reason: format!(
                "htf={:?} pd={:?} sweep+ob confirmed on M1 bos@{}",
                htf_bias.trend, htf_bias.pd_position, confirming_bos.index
            ),
            meta: SignalMeta {
                htf_trend: htf_bias.trend,
                pd_position: htf_bias.pd_position,
                order_block: ob,
                fvg: aligned_fvg,
                liquidity_swept: true,
                smt_divergence: smt,
                session: "configured".to_string(),
                confluence_score,
            },
        };

        if !signal.is_valid(meta.min_risk_distance) {
            debug!(symbol = %symbol, "signal rejected by geometry/min-risk-distance check");
            return Ok(StrategyOutcome::Skip { reason: "risk_distance_too_small".to_string() });
        }

        if let Some(choch) = choch {
            info!(symbol = %symbol, ?choch, "change of character observed alongside signal");
        }

        Ok(StrategyOutcome::Signal(Box::new(signal)))
    }

    /// A simple stand-in for "volume imbalance": the confirming leg's volume
    /// exceeds the trailing average by a wide margin, suggesting one-sided
    /// participation even where no clean three-candle FVG printed.
    fn volume_imbalance_present(&self, ltf: &[Candle], direction: TradeDirection) -> bool {
        if ltf.len() < 10 {
            return false;
        }
        let window = &ltf[ltf.len() - 10..];
        let avg_volume: f64 = window.iter().map(|c| c.volume as f64).sum::<f64>() / window.len() as f64;
        let last = window.last().unwrap();
        let directional = match direction {
            TradeDirection::Buy => last.is_bullish(),
            TradeDirection::Sell => !last.is_bullish(),
        };
        directional && avg_volume > 0.0 && last.volume as f64 >= avg_volume * 1.5
    }

    fn confluence_score(&self, has_fvg: bool, has_volume_imbalance: bool, smt: Option<bool>) -> f64 {
        let mut score = 1.0;
        if has_fvg {
            score += 1.0;
        }
        if has_volume_imbalance {
            score += 0.5;
        }
        if smt == Some(true) {
            score += 0.5;
        }
        score
    }

    /// Entry sits at the order block's near edge (the retracement target);
    /// SL at its far edge plus a symbol buffer; TP at the configured R
    /// multiple. Order kind compares that entry against the current touch
    /// price per the spec's limit/stop/market selection rule.
    fn build_order(&self, ob: &OrderBlock, direction: TradeDirection, touch: f64, meta: &SymbolMetaConfig) -> (OrderKind, f64, f64, f64) {
        let buffer = self.config.smc.ob_buffer_pips * meta.pip_size;
        let r_multiple = self.config.exit.tp_r_multiple;

        let (entry, sl) = match direction {
            TradeDirection::Buy => (ob.high, ob.low - buffer),
            TradeDirection::Sell => (ob.low, ob.high + buffer),
        };

        let risk = (entry - sl).abs();
        let tp = match direction {
            TradeDirection::Buy => entry + risk * r_multiple,
            TradeDirection::Sell => entry - risk * r_multiple,
        };

        let order_kind = match direction {
            TradeDirection::Buy if entry < touch => OrderKind::Limit,
            TradeDirection::Buy if entry > touch => OrderKind::Stop,
            TradeDirection::Sell if entry > touch => OrderKind::Limit,
            TradeDirection::Sell if entry < touch => OrderKind::Stop,
            _ => OrderKind::Market,
        };

        (order_kind, entry, sl, tp)
    }
}
