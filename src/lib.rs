//! MarketSage core library.
//!
//! - `trading`: Kelly sizing, the signal rule engine and the daily-loss risk gate
//! - `features`: indicator math and backtest feature preparation
//! - `backtest` / `metrics`: bar-by-bar evaluation and performance statistics
//! - `provider`, `api`, `db`: historical bar sources (CSV, Alpaca, SQLite store)
//! - `config`, `scheduler`, `notify`: environment configuration, recurring jobs
//!   and Telegram report delivery

pub mod api;
pub mod backtest;
pub mod config;
pub mod db;
pub mod features;
pub mod metrics;
pub mod models;
pub mod notify;
pub mod provider;
pub mod scheduler;
pub mod trading;
