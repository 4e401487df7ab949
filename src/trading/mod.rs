//! Trading logic: Kelly sizing, signal rules, risk gate.

mod config;
mod position_sizer;
mod risk;
mod strategy;

pub use config::{RiskConfig, SignalConfig};
pub use position_sizer::{conviction_size, kelly_fraction, win_loss_ratio};
pub use risk::{RiskManager, SharedRiskManager};
pub use strategy::generate_signal;
