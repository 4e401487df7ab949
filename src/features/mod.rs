//! Feature engineering: indicator library and backtest feature preparation.

pub mod indicators;
mod prepare;

pub use prepare::{prepare_features, PLACEHOLDER_IVR, PLACEHOLDER_PROB_BIG_MOVE};
