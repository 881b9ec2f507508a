/// Polls the broker's order-flow endpoint at 1 Hz per symbol and maintains a
/// ring of the last 60 snapshots, from which delta/CVD/pressure/imbalance
/// and absorption signals are derived for the execution filter.
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::broker::client::OrderFlowSnapshot as RawSnapshot;
use crate::broker::BrokerClient;

const RING_CAPACITY: usize = 60;

#[derive(Debug, Clone, Copy, Default)]
pub struct OrderFlowMetrics {
    pub delta1s: f64,
    pub delta5s: f64,
    pub delta15s: f64,
    pub delta60s: f64,
    pub cvd: f64,
    pub buy_pressure_score: f64,
    pub sell_pressure_score: f64,
    pub order_imbalance: f64,
    pub large_buy_orders: u32,
    pub large_sell_orders: u32,
    pub absorption_against_buy: bool,
    pub absorption_against_sell: bool,
}

struct SymbolFlow {
    ring: VecDeque<RawSnapshot>,
    cvd: f64,
}

impl SymbolFlow {
    fn new() -> Self {
        SymbolFlow { ring: VecDeque::with_capacity(RING_CAPACITY), cvd: 0.0 }
    }

    fn push(&mut self, snap: RawSnapshot) {
        if self.ring.len() >= RING_CAPACITY {
            self.ring.pop_front();
        }
        self.cvd += snap.delta;
        self.ring.push_back(snap);
    }

    fn windowed_delta(&self, seconds: usize) -> f64 {
        self.ring.iter().rev().take(seconds).map(|s| s.delta).sum()
    }

    fn metrics(&self) -> OrderFlowMetrics {
        let Some(latest) = self.ring.back() else {
            return OrderFlowMetrics::default();
        };

        let large_buy = latest.large_orders.iter().filter(|o| o.side.eq_ignore_ascii_case("buy")).count() as u32;
        let large_sell = latest.large_orders.iter().filter(|o| o.side.eq_ignore_ascii_case("sell")).count() as u32;

        let avg_delta_5s = if self.ring.len() >= 5 {
            self.windowed_delta(5) / 5.0
        } else {
            0.0
        };
        let momentum_roc = if self.ring.len() >= 10 {
            let recent5 = self.windowed_delta(5);
            let prior5: f64 = self.ring.iter().rev().skip(5).take(5).map(|s| s.delta).sum();
            recent5 - prior5
        } else {
            0.0
        };

        OrderFlowMetrics {
            delta1s: latest.delta,
            delta5s: self.windowed_delta(5),
            delta15s: self.windowed_delta(15),
            delta60s: self.windowed_delta(60),
            cvd: self.cvd,
            buy_pressure_score: latest.imbalance_buy_pct,
            sell_pressure_score: latest.imbalance_sell_pct,
            order_imbalance: latest.imbalance_buy_pct - latest.imbalance_sell_pct,
            large_buy_orders: large_buy,
            large_sell_orders: large_sell,
            // Absorption: average 5s delta and momentum rate-of-change carry
            // opposite signs beyond a threshold, i.e. buying is being
            // absorbed without price following through, or vice versa.
            absorption_against_buy: avg_delta_5s > 0.0 && momentum_roc < -avg_delta_5s.abs(),
            absorption_against_sell: avg_delta_5s < 0.0 && momentum_roc > avg_delta_5s.abs(),
        }
    }
}

pub struct OrderFlow {
    broker: Arc<BrokerClient>,
    flows: Arc<RwLock<HashMap<String, SymbolFlow>>>,
    poll_interval: std::time::Duration,
    retry_count: AtomicU32,
}

impl OrderFlow {
    pub fn new(broker: Arc<BrokerClient>, poll_interval_ms: u64) -> Self {
        OrderFlow {
            broker,
            flows: Arc::new(RwLock::new(HashMap::new())),
            poll_interval: std::time::Duration::from_millis(poll_interval_ms),
            retry_count: AtomicU32::new(0),
        }
    }

    /// Runs the polling loop for `symbol` until `shutdown` fires. Intended
    /// to be spawned once per symbol.
    pub async fn run(&self, symbol: String, mut shutdown: tokio::sync::watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(self.poll_interval);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.poll_once(&symbol).await;
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
    }

    async fn poll_once(&self, symbol: &str) {
        match self.broker.order_flow(symbol).await {
            Ok(Some(snapshot)) => {
                self.retry_count.store(0, Ordering::Relaxed);
                let mut flows = self.flows.write().await;
                flows.entry(symbol.to_string()).or_insert_with(SymbolFlow::new).push(snapshot);
            }
            Ok(None) => {
                debug!(symbol = %symbol, "order flow endpoint not available, feature stays silent");
            }
            Err(e) => {
                let n = self.retry_count.fetch_add(1, Ordering::Relaxed) + 1;
                if n == 1 || n % 10 == 0 {
                    warn!(symbol = %symbol, attempt = n, error = %e, "order flow poll failed");
                }
            }
        }
    }

    pub async fn metrics(&self, symbol: &str) -> Option<OrderFlowMetrics> {
        let flows = self.flows.read().await;
        flows.get(symbol).map(|f| f.metrics())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::client::LargeOrder;

    fn snapshot(delta: f64, large_orders: Vec<LargeOrder>) -> RawSnapshot {
        RawSnapshot {
            symbol: "XAUUSD".to_string(),
            timestamp: chrono::Utc::now(),
            bid_volume: 100.0,
            ask_volume: 100.0,
            delta,
            delta_sign: if delta >= 0.0 { 1 } else { -1 },
            imbalance_buy_pct: 55.0,
            imbalance_sell_pct: 45.0,
            large_orders,
        }
    }

    #[test]
    fn cvd_accumulates_across_pushes() {
        let mut flow = SymbolFlow::new();
        flow.push(snapshot(1.0, vec![]));
        flow.push(snapshot(2.0, vec![]));
        flow.push(snapshot(-0.5, vec![]));
        assert_eq!(flow.cvd, 2.5);
    }

    #[test]
    fn ring_caps_at_60_snapshots() {
        let mut flow = SymbolFlow::new();
        for i in 0..100 {
            flow.push(snapshot(i as f64, vec![]));
        }
        assert_eq!(flow.ring.len(), 60);
    }

    #[test]
    fn large_orders_counted_by_side() {
        let mut flow = SymbolFlow::new();
        flow.push(snapshot(
            1.0,
            vec![
                LargeOrder { volume: 10.0, side: "buy".to_string(), price: 100.0 },
                LargeOrder { volume: 12.0, side: "BUY".to_string(), price: 100.1 },
                LargeOrder { volume: 8.0, side: "sell".to_string(), price: 99.9 },
            ],
        ));
        let m = flow.metrics();
        assert_eq!(m.large_buy_orders, 2);
        assert_eq!(m.large_sell_orders, 1);
    }
}
