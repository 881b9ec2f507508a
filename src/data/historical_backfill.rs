/// One-shot boot loader: for each symbol, pulls N days of M1 history from
/// the broker bridge and seeds the `CandleStore`. Never fatal — a failure
/// for one symbol is logged and the loop continues with partial data.
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::broker::BrokerClient;
use crate::data::candle_store::CandleStoreRegistry;
use crate::types::Candle;

pub struct HistoricalBackfill {
    broker: Arc<BrokerClient>,
    stores: CandleStoreRegistry,
    days: u32,
}

impl HistoricalBackfill {
    pub fn new(broker: Arc<BrokerClient>, stores: CandleStoreRegistry, days: u32) -> Self {
        HistoricalBackfill { broker, stores, days }
    }

    /// Backfills every symbol. May run concurrently with the live price feed
    /// starting: inserts are time-ordered by construction, so interleaving
    /// with live ticks is safe as long as the broker's time is monotonic.
    pub async fn run(&self, symbols: &[String]) {
        for symbol in symbols {
            match self.broker.history(symbol, "M1", self.days).await {
                Ok(bars) => {
                    let mut sorted = bars;
                    sorted.sort_by_key(|b| b.time);
                    let count = sorted.len();
                    for bar in sorted {
                        self.stores
                            .add_candle(
                                symbol,
                                Candle {
                                    open: bar.open,
                                    high: bar.high,
                                    low: bar.low,
                                    close: bar.close,
                                    volume: bar.volume,
                                    start_time: bar.time,
                                    end_time: bar.time + chrono::Duration::minutes(1),
                                },
                            )
                            .await;
                    }
                    info!(symbol = %symbol, bars = count, "historical backfill complete");
                }
                Err(e) => {
                    warn!(symbol = %symbol, error = %e, "historical backfill failed, continuing with partial data");
                    error!(symbol = %symbol, "backfill error detail: {}", e);
                }
            }
        }
    }
}
