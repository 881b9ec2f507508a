/// Polls the broker's `/open-positions` every 10s and rebuilds the
/// symbol→`ExposureSnapshot` map atomically. On error, the last known
/// snapshots are kept; this never blocks the decision pipeline.
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::warn;

use crate::broker::BrokerClient;
use crate::types::{ExposureSnapshot, GlobalSnapshot, OpenTrade, TradeDirection};

const DEFAULT_RISK_PER_TRADE: f64 = 50.0;

#[derive(Default)]
struct Snapshot {
    per_symbol: HashMap<String, ExposureSnapshot>,
    per_symbol_directional: HashMap<(String, &'static str), u32>,
    global: GlobalSnapshot,
    trades: Vec<OpenTrade>,
}

/// The snapshot is swapped by handle on every refresh; readers hold an
/// `Arc` clone of whichever snapshot was current at the time they read it,
/// so a refresh never blocks or tears a reader's view.
pub struct OpenTrades {
    broker: Arc<BrokerClient>,
    snapshot: RwLock<Arc<Snapshot>>,
}

impl OpenTrades {
    pub fn new(broker: Arc<BrokerClient>) -> Self {
        OpenTrades { broker, snapshot: RwLock::new(Arc::new(Snapshot::default())) }
    }

    pub async fn refresh(&self) {
        match self.broker.open_positions().await {
            Ok(positions) => {
                let mut per_symbol: HashMap<String, ExposureSnapshot> = HashMap::new();
                let mut directional: HashMap<(String, &'static str), u32> = HashMap::new();
                let mut trades = Vec::with_capacity(positions.len());
                let mut total_open = 0u32;
                let mut total_risk = 0.0;

                for p in &positions {
                    let risk = match p.sl {
                        Some(sl) => (p.open_price - sl).abs() * p.volume,
                        None => DEFAULT_RISK_PER_TRADE * p.volume,
                    };

                    let entry = per_symbol.entry(p.symbol.clone()).or_default();
                    entry.total_count += 1;
                    entry.estimated_risk += risk;
                    match p.direction {
                        TradeDirection::Buy => entry.long_count += 1,
                        TradeDirection::Sell => entry.short_count += 1,
                    }

                    let dir_key = (p.symbol.clone(), p.direction.as_str());
                    *directional.entry(dir_key).or_insert(0) += 1;

                    total_open += 1;
                    total_risk += risk;

                    trades.push(OpenTrade {
                        ticket: p.ticket.clone(),
                        symbol: p.symbol.clone(),
                        direction: p.direction,
                        volume: p.volume,
                        open_price: p.open_price,
                        sl: p.sl,
                        tp: p.tp,
                        open_time: p.open_time,
                        float_pnl: p.profit,
                        commission: p.commission,
                        swap: p.swap,
                    });
                }

                let global = GlobalSnapshot { total_open_trades: total_open, total_estimated_risk: total_risk };

                let new_snapshot =
                    Arc::new(Snapshot { per_symbol, per_symbol_directional: directional, global, trades });
                *self.snapshot.write().await = new_snapshot;
            }
            Err(e) => {
                warn!(error = %e, "open-positions poll failed, keeping last known snapshot");
            }
        }
    }

    pub async fn exposure_for(&self, symbol: &str) -> ExposureSnapshot {
        self.snapshot.read().await.per_symbol.get(symbol).copied().unwrap_or_default()
    }

    pub async fn directional_count(&self, symbol: &str, direction: TradeDirection) -> u32 {
        let snap = self.snapshot.read().await;
        snap.per_symbol_directional.get(&(symbol.to_string(), direction.as_str())).copied().unwrap_or(0)
    }

    pub async fn global(&self) -> GlobalSnapshot {
        self.snapshot.read().await.global
    }

    pub async fn open_trades_for(&self, symbol: &str) -> Vec<OpenTrade> {
        self.snapshot.read().await.trades.iter().filter(|t| t.symbol == symbol).cloned().collect()
    }

    pub async fn all_open_trades(&self) -> Vec<OpenTrade> {
        self.snapshot.read().await.trades.clone()
    }
}
