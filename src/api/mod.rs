//! Alpaca market-data API client.

mod data_client;
mod types;

pub use data_client::DataClient;
pub use types::*;
