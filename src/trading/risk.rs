//! Daily-loss circuit breaker and entry gate.
//!
//! `RiskManager` holds the per-account state. `SharedRiskManager` wraps it in
//! a single lock so concurrent order workers see P&L updates and entry checks
//! as one unit.

use std::sync::Arc;

use rust_decimal::Decimal;
use tokio::sync::Mutex;
use tracing::{info, warn};

use super::RiskConfig;

/// Per-account risk state.
#[derive(Debug, Clone)]
pub struct RiskManager {
    config: RiskConfig,
    daily_pnl_pct: f64,
    disabled: bool,
}

impl RiskManager {
    /// Create a fresh, enabled risk manager.
    pub fn new(config: RiskConfig) -> Self {
        Self {
            config,
            daily_pnl_pct: 0.0,
            disabled: false,
        }
    }

    pub fn config(&self) -> &RiskConfig {
        &self.config
    }

    pub fn daily_pnl_pct(&self) -> f64 {
        self.daily_pnl_pct
    }

    pub fn is_disabled(&self) -> bool {
        self.disabled
    }

    /// Record today's P&L. Trips the breaker once the loss limit is reached.
    ///
    /// The breaker is sticky: a later recovery does not re-enable trading.
    pub fn update_daily_pnl(&mut self, pnl_pct: f64) {
        self.daily_pnl_pct = pnl_pct;
        if pnl_pct <= self.config.max_daily_loss_pct && !self.disabled {
            self.disabled = true;
            warn!(
                daily_pnl_pct = pnl_pct,
                limit = self.config.max_daily_loss_pct,
                "Daily loss limit hit, new entries disabled"
            );
        }
    }

    /// Whether a new position may be opened.
    ///
    /// Every condition is checked; any one of them vetoes. The equity floor is
    /// enforced even when the caller reports no PDT restriction.
    pub fn can_open_new(
        &self,
        equity_usd: Decimal,
        open_symbol_exposure_pct: f64,
        is_pdt_restricted: bool,
    ) -> bool {
        self.veto_reasons(equity_usd, open_symbol_exposure_pct, is_pdt_restricted)
            .is_empty()
    }

    /// Every condition currently blocking a new position. Empty means allowed.
    pub fn veto_reasons(
        &self,
        equity_usd: Decimal,
        open_symbol_exposure_pct: f64,
        is_pdt_restricted: bool,
    ) -> Vec<&'static str> {
        let breaker_ok = !self.disabled;
        let exposure_ok = open_symbol_exposure_pct < self.config.per_symbol_cap_pct;
        let pdt_ok = !is_pdt_restricted;
        let equity_ok = equity_usd >= self.config.min_account_equity;

        [
            (breaker_ok, "daily loss limit reached"),
            (exposure_ok, "per-symbol exposure cap reached"),
            (pdt_ok, "pattern day trader restricted"),
            (equity_ok, "equity below minimum"),
        ]
        .into_iter()
        .filter(|(ok, _)| !ok)
        .map(|(_, reason)| reason)
        .collect()
    }

    /// Start a new trading day: clears the breaker and the tracked P&L.
    ///
    /// Never called implicitly; the day boundary is owned by the caller.
    pub fn reset_for_new_day(&mut self) {
        if self.disabled {
            info!(
                previous_pnl_pct = self.daily_pnl_pct,
                "Risk breaker reset for new trading day"
            );
        }
        self.daily_pnl_pct = 0.0;
        self.disabled = false;
    }
}

/// Cloneable handle to one account's risk state behind a single lock.
#[derive(Debug, Clone)]
pub struct SharedRiskManager {
    inner: Arc<Mutex<RiskManager>>,
}

impl SharedRiskManager {
    pub fn new(config: RiskConfig) -> Self {
        Self {
            inner: Arc::new(Mutex::new(RiskManager::new(config))),
        }
    }

    pub async fn update_daily_pnl(&self, pnl_pct: f64) {
        self.inner.lock().await.update_daily_pnl(pnl_pct);
    }

    pub async fn can_open_new(
        &self,
        equity_usd: Decimal,
        open_symbol_exposure_pct: f64,
        is_pdt_restricted: bool,
    ) -> bool {
        self.inner
            .lock()
            .await
            .can_open_new(equity_usd, open_symbol_exposure_pct, is_pdt_restricted)
    }

    /// Record P&L and check the entry gate under one lock acquisition.
    pub async fn record_pnl_and_check(
        &self,
        pnl_pct: f64,
        equity_usd: Decimal,
        open_symbol_exposure_pct: f64,
        is_pdt_restricted: bool,
    ) -> bool {
        let mut risk = self.inner.lock().await;
        risk.update_daily_pnl(pnl_pct);
        risk.can_open_new(equity_usd, open_symbol_exposure_pct, is_pdt_restricted)
    }

    pub async fn reset_for_new_day(&self) {
        self.inner.lock().await.reset_for_new_day();
    }

    pub async fn is_disabled(&self) -> bool {
        self.inner.lock().await.is_disabled()
    }

    /// Copy of the current state, for reporting.
    pub async fn snapshot(&self) -> RiskManager {
        self.inner.lock().await.clone()
    }
}
