pub mod candle_builder;
pub mod candle_store;
pub mod historical_backfill;
pub mod market_data;
pub mod open_trades;
pub mod order_flow;
pub mod price_feed;

pub use candle_builder::CandleBuilder;
pub use candle_store::{CandleStore, CandleStoreRegistry};
pub use historical_backfill::HistoricalBackfill;
pub use market_data::MarketData;
pub use open_trades::OpenTrades;
pub use order_flow::OrderFlow;
pub use price_feed::PriceFeed;
