//! Performance metrics calculation.

mod calculator;

pub use calculator::{PerformanceCalculator, SimulationTally, TRADING_DAYS_PER_YEAR};
