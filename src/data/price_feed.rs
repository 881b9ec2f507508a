/// Polls the broker's `/api/v1/price/{symbol}` at `market_feed_interval_sec`
/// and feeds every quote into the `CandleBuilder` as a `Tick`. One instance
/// is shared across all symbols; `run` is spawned once per symbol so a slow
/// or failing poll for one symbol never delays another's.
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::broker::BrokerClient;
use crate::data::candle_builder::CandleBuilder;
use crate::types::Tick;

pub struct PriceFeed {
    broker: Arc<BrokerClient>,
    builder: Arc<CandleBuilder>,
    poll_interval: std::time::Duration,
    retry_count: AtomicU32,
}

impl PriceFeed {
    pub fn new(broker: Arc<BrokerClient>, builder: Arc<CandleBuilder>, interval_sec: u64) -> Self {
        PriceFeed {
            broker,
            builder,
            poll_interval: std::time::Duration::from_secs(interval_sec.max(1)),
            retry_count: AtomicU32::new(0),
        }
    }

    /// Runs the polling loop for `symbol` until `shutdown` fires.
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
        match self.broker.price(symbol).await {
            Ok(quote) => {
                self.retry_count.store(0, Ordering::Relaxed);
                let tick = Tick { bid: quote.bid, ask: quote.ask, time: quote.time };
                self.builder.on_tick(symbol, tick).await;
            }
            Err(e) => {
                // Rate-limited logging: first failure, then every 10th, the
                // same pattern `OrderFlow` uses for its own poll failures.
                let n = self.retry_count.fetch_add(1, Ordering::Relaxed) + 1;
                if n == 1 || n % 10 == 0 {
                    warn!(symbol = %symbol, attempt = n, error = %e, "price poll failed");
                } else {
                    debug!(symbol = %symbol, error = %e, "price poll failed (suppressed)");
                }
            }
        }
    }
}
