/// Decision persistence and the periodic performance report, grounded on
/// the metrics shape of a retired analytics module: win rate, profit
/// factor, drawdown, plus a false-negative pass over skipped setups.
use chrono::{DateTime, Utc};
use tracing::warn;

use crate::data::MarketData;
use crate::persistence::{self, Pool};
use crate::types::{DecisionRecord, Timeframe, TradeDirection};

pub struct DecisionLog {
    pool: Pool,
}

#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct PerformanceReport {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub setups_found: u32,
    pub setups_traded: u32,
    pub setups_skipped: u32,
    pub skip_reason_counts: std::collections::BTreeMap<String, u32>,
    pub total_trades: u32,
    pub winning_trades: u32,
    pub losing_trades: u32,
    pub breakeven_trades: u32,
    pub win_rate: f64,
    pub avg_win: f64,
    pub avg_loss: f64,
    pub largest_win: f64,
    pub largest_loss: f64,
    pub profit_factor: f64,
    pub avg_risk_reward: f64,
    pub max_drawdown_abs: f64,
    pub max_drawdown_pct: f64,
    pub false_negatives: u32,
}

impl DecisionLog {
    pub fn new(pool: Pool) -> Self {
        DecisionLog { pool }
    }

    pub async fn record(&self, record: &DecisionRecord) -> crate::error::Result<()> {
        persistence::decisions::insert(&self.pool, record).await
    }

    /// Builds the period report: setup counts with skip-reason breakdown,
    /// realized-trade metrics, running-peak drawdown, and a false-negative
    /// pass over skipped setups that had a planned entry/sl/tp.
    pub async fn report(&self, from: DateTime<Utc>, to: DateTime<Utc>, market_data: &MarketData) -> crate::error::Result<PerformanceReport> {
        let mut report = PerformanceReport { from: Some(from), to: Some(to), ..Default::default() };

        let decisions = persistence::decisions::in_range(&self.pool, from, to).await?;
        report.setups_found = decisions.len() as u32;
        report.setups_traded = decisions.iter().filter(|d| d.traded).count() as u32;
        report.setups_skipped = report.setups_found - report.setups_traded;
        for d in decisions.iter().filter(|d| !d.traded) {
            for reason in &d.skip_reasons {
                *report.skip_reason_counts.entry(reason.clone()).or_insert(0) += 1;
            }
        }

        let trades = persistence::trades::in_range(&self.pool, from, to).await?;
        report.total_trades = trades.len() as u32;

        let mut gross_profit = 0.0;
        let mut gross_loss = 0.0;
        let mut rr_sum = 0.0;
        let mut rr_count = 0u32;

        for t in &trades {
            if t.profit_net > 0.0 {
                report.winning_trades += 1;
                gross_profit += t.profit_net;
                if t.profit_net > report.largest_win {
                    report.largest_win = t.profit_net;
                }
            } else if t.profit_net < 0.0 {
                report.losing_trades += 1;
                gross_loss += t.profit_net.abs();
                if t.profit_net < report.largest_loss {
                    report.largest_loss = t.profit_net;
                }
            } else {
                report.breakeven_trades += 1;
            }

            if let (Some(sl), Some(tp)) = (t.sl, t.tp) {
                let risk = (t.entry_price - sl).abs();
                let reward = (tp - t.entry_price).abs();
                if risk > 0.0 {
                    rr_sum += reward / risk;
                    rr_count += 1;
                }
            }
        }

        report.win_rate = if report.total_trades > 0 {
            report.winning_trades as f64 / report.total_trades as f64 * 100.0
        } else {
            0.0
        };
        report.avg_win = if report.winning_trades > 0 { gross_profit / report.winning_trades as f64 } else { 0.0 };
        report.avg_loss = if report.losing_trades > 0 { -(gross_loss / report.losing_trades as f64) } else { 0.0 };
        report.profit_factor = if gross_loss > 0.0 {
            gross_profit / gross_loss
        } else if gross_profit > 0.0 {
            f64::INFINITY
        } else {
            0.0
        };
        report.avg_risk_reward = if rr_count > 0 { rr_sum / rr_count as f64 } else { 0.0 };

        let mut equity_series: Vec<f64> = persistence::equity::series_since(&self.pool, from).await.unwrap_or_default();
        if equity_series.is_empty() {
            if let Some(latest) = persistence::equity::latest(&self.pool).await.unwrap_or(None) {
                equity_series.push(latest.equity);
            }
        }
        let (abs, pct) = running_peak_drawdown(&equity_series);
        report.max_drawdown_abs = abs;
        report.max_drawdown_pct = pct;

        report.false_negatives = self.count_false_negatives(&from, &to, market_data).await;

        Ok(report)
    }

    /// For each skipped setup that had a full planned entry/sl/tp, looks
    /// ahead at M1 candles after the decision to see whether price would
    /// have reached the planned target before the planned stop. Counted
    /// as a missed winner, i.e. a false negative of the execution path.
    async fn count_false_negatives(&self, from: &DateTime<Utc>, to: &DateTime<Utc>, market_data: &MarketData) -> u32 {
        let skipped = match persistence::decisions::skipped_with_plan_in_range(&self.pool, *from, *to).await {
            Ok(rows) => rows,
            Err(e) => {
                warn!(error = %e, "failed to load skipped setups for false-negative analysis");
                return 0;
            }
        };

        let mut count = 0;
        for d in skipped {
            if would_have_won(&d, market_data).await {
                count += 1;
            }
        }
        count
    }
}

async fn would_have_won(decision: &DecisionRecord, market_data: &MarketData) -> bool {
    let (Some(entry), Some(sl), Some(tp), Some(direction)) =
        (decision.planned_entry, decision.planned_sl, decision.planned_tp, decision.direction)
    else {
        return false;
    };

    let candles = market_data.recent_candles(&decision.symbol, Timeframe::M1, 4_000).await;
    let following = candles.iter().filter(|c| c.start_time >= decision.ts);

    for c in following {
        match direction {
            TradeDirection::Buy => {
                if c.low <= sl {
                    return false;
                }
                if c.high >= tp {
                    return true;
                }
            }
            TradeDirection::Sell => {
                if c.high >= sl {
                    return false;
                }
                if c.low <= tp {
                    return true;
                }
            }
        }
    }

    let _ = entry;
    false
}

fn running_peak_drawdown(series: &[f64]) -> (f64, f64) {
    let mut peak = f64::MIN;
    let mut max_abs = 0.0;
    let mut max_pct = 0.0;

    for &e in series {
        if e > peak {
            peak = e;
        }
        if peak > 0.0 {
            let drawdown = peak - e;
            let pct = drawdown / peak * 100.0;
            if drawdown > max_abs {
                max_abs = drawdown;
            }
            if pct > max_pct {
                max_pct = pct;
            }
        }
    }

    (max_abs, max_pct)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profit_factor_is_infinite_with_no_losses() {
        let gross_profit = 100.0;
        let gross_loss: f64 = 0.0;
        let pf = if gross_loss > 0.0 { gross_profit / gross_loss } else if gross_profit > 0.0 { f64::INFINITY } else { 0.0 };
        assert!(pf.is_infinite());
    }

    #[test]
    fn drawdown_walk_matches_live_pnl_helper() {
        let series = vec![100.0, 120.0, 90.0];
        let (abs, pct) = running_peak_drawdown(&series);
        assert_eq!(abs, 30.0);
        assert!((pct - 25.0).abs() < 1e-9);
    }
}
