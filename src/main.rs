//! MarketSage
//!
//! Rule-based trade signals from forecast features, fractional-Kelly
//! position sizing, a daily-loss circuit breaker, and a bar-by-bar
//! backtester over historical daily bars.

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::{Duration, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use rust_decimal::Decimal;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use market_sage::api::DataClient;
use market_sage::backtest::{parse_date_range, BacktestConfig, Backtester};
use market_sage::config::{mask_secret, AppConfig};
use market_sage::db::{Database, RETENTION_DAYS};
use market_sage::features::{PLACEHOLDER_IVR, PLACEHOLDER_PROB_BIG_MOVE};
use market_sage::models::{BacktestMetrics, FeatureRow};
use market_sage::notify::TelegramNotifier;
use market_sage::provider::CsvBarProvider;
use market_sage::scheduler::{default_jobs, JobScheduler};
use market_sage::trading::{generate_signal, SharedRiskManager, SignalConfig};

/// MarketSage CLI.
#[derive(Parser)]
#[command(name = "marketsage")]
#[command(about = "Rule-based trade signals, Kelly sizing, risk gate and backtests")]
#[command(long_about = None)]
struct Cli {
    /// Bar store database URL
    #[arg(short, long, default_value = "sqlite:./marketsage.db?mode=rwc")]
    database: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

/// Where backtest bars come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Source {
    /// `<data-dir>/<SYMBOL>.csv` files
    Csv,
    /// Alpaca market-data API
    Alpaca,
    /// Local bar store
    Store,
}

#[derive(Subcommand)]
enum Commands {
    /// Produce a trade signal from one set of features
    Signal {
        /// Ensemble probability of an up move (0-1)
        #[arg(long)]
        up_prob: f64,

        /// Ensemble probability of a down move (0-1, defaults to 1 - up)
        #[arg(long)]
        down_prob: Option<f64>,

        /// Forecast move in percent
        #[arg(long, allow_negative_numbers = true)]
        pred_move: f64,

        /// RSI(14)
        #[arg(long, default_value = "50")]
        rsi: f64,

        /// Fractional distance of price from EMA21
        #[arg(long, default_value = "0", allow_negative_numbers = true)]
        px_vs_ema: f64,

        /// Implied-volatility rank (0-1)
        #[arg(long, default_value = "0.5")]
        ivr: f64,

        /// Probability of a large move (0-1)
        #[arg(long, default_value = "0.5")]
        prob_big_move: f64,

        /// Override KELLY_FRACTION_CAP
        #[arg(long)]
        kelly_cap: Option<f64>,

        /// Print the signal as JSON
        #[arg(long)]
        json: bool,
    },

    /// Backtest the signal rules over historical daily bars
    Backtest {
        /// Start date (YYYY-MM-DD or RFC 3339)
        #[arg(short, long)]
        from: String,

        /// End date, inclusive (YYYY-MM-DD, RFC 3339 or "today")
        #[arg(short, long, default_value = "today")]
        to: String,

        /// Comma-separated symbols
        #[arg(short, long, value_delimiter = ',', required = true)]
        symbols: Vec<String>,

        /// Bar source
        #[arg(long, value_enum, default_value = "csv")]
        source: Source,

        /// Directory of CSV bar files
        #[arg(long, default_value = "./data")]
        data_dir: String,

        /// Print results as JSON
        #[arg(long)]
        json: bool,
    },

    /// Fetch daily bars from Alpaca into the local store
    Ingest {
        /// Start date (YYYY-MM-DD or RFC 3339)
        #[arg(short, long)]
        from: String,

        /// End date, inclusive (YYYY-MM-DD, RFC 3339 or "today")
        #[arg(short, long, default_value = "today")]
        to: String,

        /// Comma-separated symbols
        #[arg(short, long, value_delimiter = ',', required = true)]
        symbols: Vec<String>,
    },

    /// Check whether a new position may be opened
    RiskCheck {
        /// Account equity in USD
        #[arg(long)]
        equity: f64,

        /// Current exposure to the symbol (percent of equity)
        #[arg(long, default_value = "0")]
        exposure: f64,

        /// Account is pattern-day-trader restricted
        #[arg(long)]
        pdt: bool,

        /// Today's P&L in percent, recorded before the check
        #[arg(long, allow_negative_numbers = true)]
        daily_pnl: Option<f64>,
    },

    /// Show current configuration
    Config,

    /// Run the job scheduler until Ctrl+C
    Schedule,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let log_level = match cli.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = AppConfig::from_env().context("Invalid configuration")?;

    match cli.command {
        Commands::Signal {
            up_prob,
            down_prob,
            pred_move,
            rsi,
            px_vs_ema,
            ivr,
            prob_big_move,
            kelly_cap,
            json,
        } => {
            let mut signal_config = config.signal_config();
            if let Some(cap) = kelly_cap {
                if !(0.0..=1.0).contains(&cap) {
                    bail!("--kelly-cap must be between 0 and 1, got {cap}");
                }
                signal_config.kelly_fraction_cap = cap;
            }

            let features = FeatureRow {
                ensemble_up_prob: up_prob,
                ensemble_down_prob: down_prob.unwrap_or(1.0 - up_prob),
                predicted_move_pct: pred_move,
                rsi,
                price_vs_ema21: px_vs_ema,
                ivr,
                prob_big_move,
            };

            let signal = generate_signal(&features, &signal_config);
            if json {
                println!("{}", serde_json::to_string_pretty(&signal)?);
            } else {
                println!("{}", signal);
            }
        }

        Commands::Backtest {
            from,
            to,
            symbols,
            source,
            data_dir,
            json,
        } => {
            let (start, end) = parse_date_range(&from, &to)?;
            let symbols = normalize_symbols(&symbols);
            let backtester = Backtester::new(BacktestConfig {
                signal_config: config.signal_config(),
            });

            info!(source = ?source, symbols = symbols.len(), "Running backtest");

            let results = match source {
                Source::Csv => {
                    let provider = CsvBarProvider::new(&data_dir);
                    backtester.run(&provider, &symbols, start, end).await?
                }
                Source::Alpaca => {
                    let client = DataClient::from_config(&config)?;
                    backtester.run(&client, &symbols, start, end).await?
                }
                Source::Store => {
                    let db = Database::new(&cli.database).await?;
                    backtester.run(&db, &symbols, start, end).await?
                }
            };

            if json {
                println!("{}", serde_json::to_string_pretty(&results)?);
            } else {
                println!(
                    "\n=== Backtest {} to {} (cap {}) ===",
                    start.format("%Y-%m-%d"),
                    end.format("%Y-%m-%d"),
                    backtester.config().signal_config.kelly_fraction_cap
                );
                print_results_table(&results);

                let missing: Vec<&str> = symbols
                    .iter()
                    .filter(|s| !results.contains_key(*s))
                    .map(String::as_str)
                    .collect();
                if !missing.is_empty() {
                    println!("\nNo data: {}", missing.join(", "));
                }
                println!(
                    "\nNote: IV rank ({}) and big-move probability ({}) are placeholders; \
                     option plays never fire.",
                    PLACEHOLDER_IVR, PLACEHOLDER_PROB_BIG_MOVE
                );
            }
        }

        Commands::Ingest { from, to, symbols } => {
            let (start, end) = parse_date_range(&from, &to)?;
            let symbols = normalize_symbols(&symbols);
            let client = DataClient::from_config(&config)?;
            let db = Database::new(&cli.database).await?;

            info!(symbols = symbols.len(), url = %client.base_url(), "Ingesting bars");

            println!("\n{:<8} {:>8} {:>8}", "SYMBOL", "FETCHED", "STORED");
            println!("{}", "-".repeat(26));

            let mut failed = 0usize;
            for symbol in &symbols {
                let bars = match client.get_bars(symbol, start, end).await {
                    Ok(bars) => bars,
                    Err(e) => {
                        warn!(symbol = %symbol, error = %e, "Failed to fetch bars");
                        println!("{:<8} {:>8} {:>8}", symbol, "error", "-");
                        failed += 1;
                        continue;
                    }
                };
                let written = db.write_bars(symbol, &bars).await?;
                let stored = db.bar_count(symbol).await?;
                println!("{:<8} {:>8} {:>8}", symbol, written, stored);
            }

            println!(
                "\nStore keeps the last {} days; older bars are pruned on write.",
                RETENTION_DAYS
            );
            if failed > 0 {
                bail!("{failed} of {} symbols failed to ingest", symbols.len());
            }
        }

        Commands::RiskCheck {
            equity,
            exposure,
            pdt,
            daily_pnl,
        } => {
            let equity_usd = Decimal::try_from(equity).context("Invalid equity")?;
            let risk = SharedRiskManager::new(config.risk_config());

            let allowed = match daily_pnl {
                Some(pnl) => risk.record_pnl_and_check(pnl, equity_usd, exposure, pdt).await,
                None => risk.can_open_new(equity_usd, exposure, pdt).await,
            };
            let state = risk.snapshot().await;

            println!("\n=== Risk Check ===");
            println!("Equity:           ${:.2}", equity_usd);
            println!(
                "Exposure:         {:.2}% (cap {}%)",
                exposure,
                state.config().per_symbol_cap_pct
            );
            println!("PDT Restricted:   {}", if pdt { "Yes" } else { "No" });
            println!(
                "Daily P&L:        {:.2}% (limit {}%)",
                state.daily_pnl_pct(),
                state.config().max_daily_loss_pct
            );
            println!("Breaker:          {}", if state.is_disabled() { "TRIPPED" } else { "ok" });
            println!();
            println!("Can Open New:     {}", if allowed { "YES" } else { "NO" });
            for reason in state.veto_reasons(equity_usd, exposure, pdt) {
                println!("  - {}", reason);
            }
        }

        Commands::Config => {
            let risk = config.risk_config();

            println!("\n=== Broker / Data ===\n");
            println!("  Alpaca Key:           {}", mask_secret(config.alpaca_key.as_deref()));
            println!("  Alpaca Secret:        {}", mask_secret(config.alpaca_secret.as_deref()));
            println!("  Trading Endpoint:     {}", config.alpaca_endpoint);
            println!("  Data URL:             {}", config.alpaca_data_url);
            println!("  Database:             {}", cli.database);

            println!("\n=== Sizing ===\n");
            println!("  Kelly Fraction Cap:   {}", config.kelly_fraction_cap);

            println!("\n=== Risk ===\n");
            println!("  Max Daily Loss:       {}%", risk.max_daily_loss_pct);
            println!("  Per-Symbol Cap:       {}%", risk.per_symbol_cap_pct);
            println!("  Min Account Equity:   ${}", risk.min_account_equity);

            println!("\n=== Notifications ===\n");
            println!(
                "  Telegram Token:       {}",
                mask_secret(config.telegram_bot_token.as_deref())
            );
            println!(
                "  Telegram Chat:        {}",
                config.telegram_chat_id.as_deref().unwrap_or("(not set)")
            );

            println!("\n=== Scheduler ===\n");
            println!("  UTC Offset:           {}", config.scheduler_offset()?);
            for job in default_jobs() {
                println!("  {:<22}{:?}", job.name, job.schedule);
            }
        }

        Commands::Schedule => {
            let db = Arc::new(Database::new(&cli.database).await?);
            let notifier = Arc::new(TelegramNotifier::from_config(&config)?);
            let signal_config = config.signal_config();

            let jobs = default_jobs()
                .into_iter()
                .map(|job| match job.name.as_str() {
                    "daily_report" => {
                        let db = db.clone();
                        let notifier = notifier.clone();
                        job.with_action(move || {
                            daily_report(db.clone(), notifier.clone(), signal_config)
                        })
                    }
                    _ => job,
                })
                .collect();

            let mut scheduler = JobScheduler::new(jobs, config.scheduler_offset()?);
            scheduler.start()?;

            println!("\n=== Scheduler Running ===");
            println!("UTC offset: {}", config.scheduler_offset()?);
            for job in scheduler.jobs() {
                println!("  {:<16} {:?}", job.name, job.schedule);
            }
            println!("\nPress Ctrl+C to stop.\n");

            tokio::signal::ctrl_c()
                .await
                .context("Failed to listen for Ctrl+C")?;
            println!("\nStopping scheduler...");
            scheduler.stop().await?;
        }
    }

    Ok(())
}

/// Backtest everything in the store over the retention window, log it and
/// send the summary to Telegram.
async fn daily_report(
    db: Arc<Database>,
    notifier: Arc<TelegramNotifier>,
    signal_config: SignalConfig,
) -> Result<()> {
    let symbols = db.symbols().await?;
    if symbols.is_empty() {
        info!("Daily report: store is empty");
        return Ok(());
    }

    let end = Utc::now();
    let start = end - Duration::days(RETENTION_DAYS);
    let results = Backtester::new(BacktestConfig { signal_config })
        .run(db.as_ref(), &symbols, start, end)
        .await?;

    for (symbol, m) in &results {
        info!(
            symbol = %symbol,
            trades = m.trades,
            equity = m.equity,
            sharpe = m.sharpe,
            max_drawdown = m.max_drawdown,
            "Daily report"
        );
    }

    // Delivery failures are logged; the report itself already ran
    if let Err(e) = notifier.send(&daily_summary(&results)).await {
        warn!(error = %e, "Failed to deliver daily report");
    }
    Ok(())
}

/// One line per symbol, profitable symbols marked with `+`.
fn daily_summary(results: &BTreeMap<String, BacktestMetrics>) -> String {
    let mut lines = vec![format!("MarketSage daily report ({} symbols)", results.len())];
    for (symbol, m) in results {
        lines.push(format!(
            "{} {}: return {:.2}%, trades {}, sharpe {}, max dd {:.2}%",
            if m.is_profitable() { "+" } else { "-" },
            symbol,
            m.total_return() * 100.0,
            m.trades,
            format_ratio(m.sharpe),
            m.max_drawdown * 100.0
        ));
    }
    lines.join("\n")
}

fn print_results_table(results: &BTreeMap<String, BacktestMetrics>) {
    println!(
        "\n{:<8} {:>6} {:>7} {:>9} {:>9} {:>8} {:>8} {:>8} {:>8} {:>7}",
        "SYMBOL", "BARS", "TRADES", "RETURN", "CAGR", "MAX DD", "WIN", "SHARPE", "SORTINO", "PF"
    );
    println!("{}", "-".repeat(88));

    for (symbol, m) in results {
        println!(
            "{:<8} {:>6} {:>7} {:>8.2}% {:>8.2}% {:>7.2}% {:>7.1}% {:>8.2} {:>8} {:>7.2}",
            truncate(symbol, 8),
            m.bars,
            m.trades,
            m.total_return() * 100.0,
            m.cagr * 100.0,
            m.max_drawdown * 100.0,
            m.win_rate * 100.0,
            m.sharpe,
            format_ratio(m.sortino),
            m.profit_factor
        );
    }
}

/// Ratios can be undefined; show those as "n/a".
fn format_ratio(value: f64) -> String {
    if value.is_finite() {
        format!("{:.2}", value)
    } else {
        "n/a".to_string()
    }
}

/// Uppercase, trim and de-duplicate symbols, keeping order.
fn normalize_symbols(symbols: &[String]) -> Vec<String> {
    let mut seen = Vec::new();
    for s in symbols {
        let s = s.trim().to_uppercase();
        if !s.is_empty() && !seen.contains(&s) {
            seen.push(s);
        }
    }
    seen
}

/// Truncate a string with ellipsis if too long.
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let head: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", head)
    }
}
