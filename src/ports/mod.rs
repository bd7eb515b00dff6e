//! Ports Layer - Trait definitions for external dependencies
//!
//! Adapters implement these traits; the application layer only sees the
//! traits.
//! - Parameter storage and enabled markets
//! - Closed trade history

pub mod parameter_store;
pub mod trade_history;

pub use parameter_store::{
    Coin, Pair, ParameterRecord, ParameterStatus, ParameterStore, ParameterType, StoreError, MODEL_VERSION,
};
pub use trade_history::{MarketTrade, TradeFilter, TradeHistory};
