/// Per-symbol bounded ring of M1 candles, the sole store M1 bars live in.
///
/// Unlike the teacher's `HybridBarStore`, this store is purely in-memory: the
/// spec's capacity default (10,000 M1 bars, ~a week) makes disk paging
/// unnecessary, and persistence of raw ticks/candles is an explicit
/// non-goal.
use std::collections::VecDeque;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::types::Candle;

pub struct CandleStore {
    ring: VecDeque<Candle>,
    capacity: usize,
}

impl CandleStore {
    pub fn new(capacity: usize) -> Self {
        CandleStore { ring: VecDeque::with_capacity(capacity), capacity }
    }

    /// Appends a finalized M1 candle, dropping the oldest on overflow.
    pub fn add_candle(&mut self, candle: Candle) {
        if self.ring.len() >= self.capacity {
            self.ring.pop_front();
        }
        self.ring.push_back(candle);
    }

    /// Returns a defensive copy of up to `limit` most-recent candles,
    /// ascending by time.
    pub fn recent(&self, limit: usize) -> Vec<Candle> {
        let n = limit.min(self.ring.len());
        self.ring.iter().rev().take(n).rev().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.ring.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    pub fn last(&self) -> Option<Candle> {
        self.ring.back().copied()
    }
}

/// Thread-safe, per-symbol registry of `CandleStore`s.
#[derive(Clone)]
pub struct CandleStoreRegistry {
    stores: Arc<RwLock<HashMap<String, Arc<RwLock<CandleStore>>>>>,
    capacity: usize,
}

impl CandleStoreRegistry {
    pub fn new(capacity: usize) -> Self {
        CandleStoreRegistry { stores: Arc::new(RwLock::new(HashMap::new())), capacity }
    }

    async fn store_for(&self, symbol: &str) -> Arc<RwLock<CandleStore>> {
        {
            let stores = self.stores.read().await;
            if let Some(store) = stores.get(symbol) {
                return Arc::clone(store);
            }
        }
        let mut stores = self.stores.write().await;
        Arc::clone(
            stores
                .entry(symbol.to_string())
                .or_insert_with(|| Arc::new(RwLock::new(CandleStore::new(self.capacity)))),
        )
    }

    pub async fn add_candle(&self, symbol: &str, candle: Candle) {
        let store = self.store_for(symbol).await;
        store.write().await.add_candle(candle);
    }

    pub async fn recent(&self, symbol: &str, limit: usize) -> Vec<Candle> {
        let store = self.store_for(symbol).await;
        let store = store.read().await;
        store.recent(limit)
    }

    pub async fn len(&self, symbol: &str) -> usize {
        let store = self.store_for(symbol).await;
        let store = store.read().await;
        store.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn candle(close: f64) -> Candle {
        let now = Utc::now();
        Candle {
            open: close,
            high: close + 1.0,
            low: close - 1.0,
            close,
            volume: 1,
            start_time: now,
            end_time: now + chrono::Duration::minutes(1),
        }
    }

    #[test]
    fn ring_drops_oldest_on_overflow() {
        let mut store = CandleStore::new(3);
        for i in 0..5 {
            store.add_candle(candle(i as f64));
        }
        assert_eq!(store.len(), 3);
        let recent = store.recent(3);
        assert_eq!(recent[0].close, 2.0);
        assert_eq!(recent[2].close, 4.0);
    }

    #[test]
    fn recent_returns_ascending_order() {
        let mut store = CandleStore::new(10);
        for i in 0..5 {
            store.add_candle(candle(i as f64));
        }
        let recent = store.recent(10);
        let closes: Vec<f64> = recent.iter().map(|c| c.close).collect();
        assert_eq!(closes, vec![0.0, 1.0, 2.0, 3.0, 4.0]);
    }
}
