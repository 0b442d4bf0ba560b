use chrono::{DateTime, Duration, Local, Utc};
use log::{debug, error, info, warn};
use rust_decimal::Decimal;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{Mutex, OnceCell, RwLock};
use vigil_core::{BrokerPosition, RiskConfig, RiskConfigUpdate, TradeIntent};
use vigil_ports::{Broker, Clock, RegimeSignal, RiskConfigRepository, TradeHistory};

use crate::checks::{self, RiskDecision};
use crate::error::{Error, Result};

/// Pre-trade risk gate
///
/// Holds an in-memory mirror of the persisted [`RiskConfig`]. The mirror is
/// hydrated on first use by whichever caller gets there first; everyone else
/// waits on the same load.
pub struct RiskGatekeeper {
    repo: Arc<dyn RiskConfigRepository>,
    positions: Arc<dyn Broker>,
    history: Arc<dyn TradeHistory>,
    regime: Arc<dyn RegimeSignal>,
    clock: Arc<dyn Clock>,
    /// Written to storage when no row exists yet
    seed: RiskConfig,
    hydrated: OnceCell<()>,
    config: RwLock<RiskConfig>,
    kill_switch: AtomicBool,
    /// Serializes read-modify-write of the persisted row
    writes: Mutex<()>,
}

impl RiskGatekeeper {
    pub fn new(
        repo: Arc<dyn RiskConfigRepository>,
        positions: Arc<dyn Broker>,
        history: Arc<dyn TradeHistory>,
        regime: Arc<dyn RegimeSignal>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            repo,
            positions,
            history,
            regime,
            clock,
            seed: RiskConfig::default(),
            hydrated: OnceCell::new(),
            config: RwLock::new(RiskConfig::default()),
            kill_switch: AtomicBool::new(false),
            writes: Mutex::new(()),
        }
    }

    /// Limits to persist if storage has no configuration yet
    pub fn with_seed(mut self, seed: RiskConfig) -> Self {
        self.seed = seed;
        self
    }

    /// Load the persisted config into the mirror, once per process
    ///
    /// Concurrent first callers await the same load. Every other operation
    /// hydrates implicitly.
    pub async fn hydrate(&self) -> Result<()> {
        self.hydrated
            .get_or_try_init(|| async {
                let config = match self.repo.load().await? {
                    Some(config) => config,
                    None => {
                        let mut seed = self.seed.clone();
                        seed.updated_at = self.clock.now();
                        self.repo.save(&seed).await?;
                        info!("[RISK] No stored risk config, seeded defaults");
                        seed
                    }
                };
                self.mirror(config).await;
                debug!("[RISK] Hydrated risk config");
                Ok::<(), Error>(())
            })
            .await?;
        Ok(())
    }

    async fn mirror(&self, config: RiskConfig) {
        self.kill_switch
            .store(config.kill_switch_active(), Ordering::SeqCst);
        *self.config.write().await = config;
    }

    /// Run every check against the intent
    ///
    /// A rejection is returned as an unapproved decision, not an error;
    /// `Err` means the gate itself could not load its configuration.
    pub async fn check_intent(&self, intent: &TradeIntent) -> Result<RiskDecision> {
        self.hydrate().await?;
        let config = self.config.read().await.clone();
        let kill_switch = self.kill_switch.load(Ordering::SeqCst);

        let positions = self
            .positions
            .get_positions()
            .await
            .map_err(|e| e.to_string());
        let current = positions.as_ref().map(|all| {
            all.iter()
                .filter(|p| p.symbol.eq_ignore_ascii_case(&intent.symbol))
                .map(|p| p.qty)
                .sum::<Decimal>()
        });
        let pnl = self.daily_pnl(positions.as_deref().map_err(Clone::clone)).await;

        let reading = if intent.skip_regime_check {
            None
        } else {
            Some(
                self.regime
                    .current_regime(&intent.symbol)
                    .await
                    .map_err(|e| e.to_string()),
            )
        };
        let (regime_outcome, size_multiplier, regime) = checks::regime_check(reading);

        let outcomes = vec![
            checks::trading_enabled(&config, kill_switch),
            checks::symbol_allowed(&config, &intent.symbol),
            checks::order_size(&config, intent.quantity),
            checks::position_size(&config, intent, current.map_err(|e| e.clone())),
            checks::daily_loss_limit(&config, pnl),
            checks::sanity_check(intent),
            regime_outcome,
        ];
        let decision = RiskDecision::from_checks(outcomes, size_multiplier, regime);

        if decision.approved {
            debug!(
                "[RISK] Approved {} {} {} (size x{})",
                intent.side.as_str(),
                intent.quantity,
                intent.symbol,
                decision.size_multiplier
            );
        } else {
            warn!(
                "[RISK] Rejected {} {} {}: {}",
                intent.side.as_str(),
                intent.quantity,
                intent.symbol,
                decision.reason()
            );
        }
        Ok(decision)
    }

    /// Realized P&L since local midnight plus unrealized P&L of open positions
    async fn daily_pnl(
        &self,
        positions: std::result::Result<&[BrokerPosition], String>,
    ) -> std::result::Result<(Decimal, Decimal), String> {
        let positions = positions?;
        let since = local_day_start(self.clock.now());
        let realized = self
            .history
            .closed_since(since)
            .await
            .map_err(|e| e.to_string())?
            .iter()
            .map(|t| t.realized_pnl)
            .sum::<Decimal>();
        let unrealized = positions.iter().map(BrokerPosition::unrealized_pnl).sum();
        Ok((realized, unrealized))
    }

    pub async fn get_config(&self) -> Result<RiskConfig> {
        self.hydrate().await?;
        Ok(self.config.read().await.clone())
    }

    /// Apply a partial update; limits must stay positive
    pub async fn update_config(&self, update: RiskConfigUpdate) -> Result<RiskConfig> {
        validate(&update)?;
        let config = self
            .write(|config, now| config.apply(&update, now))
            .await?;
        info!(
            "[RISK] Config updated to v{} (order {}, position {}, daily loss {})",
            config.version, config.max_order_size, config.max_position_size, config.max_daily_loss
        );
        Ok(config)
    }

    /// Halt all new trading until deactivated
    pub async fn activate_kill_switch(&self, reason: impl Into<String>) -> Result<RiskConfig> {
        let reason = reason.into();
        let config = self
            .write(|config, now| {
                config.apply(
                    &RiskConfigUpdate {
                        trading_enabled: Some(false),
                        ..Default::default()
                    },
                    now,
                );
                config.kill_switch_reason = Some(reason.clone());
            })
            .await?;
        error!("[RISK] KILL SWITCH ACTIVATED: {reason}");
        Ok(config)
    }

    pub async fn deactivate_kill_switch(&self) -> Result<RiskConfig> {
        let config = self
            .write(|config, now| {
                config.apply(
                    &RiskConfigUpdate {
                        trading_enabled: Some(true),
                        ..Default::default()
                    },
                    now,
                )
            })
            .await?;
        info!("[RISK] Kill switch deactivated, trading resumed");
        Ok(config)
    }

    pub async fn is_kill_switch_active(&self) -> Result<bool> {
        self.hydrate().await?;
        Ok(self.kill_switch.load(Ordering::SeqCst))
    }

    /// Persist a modified copy of the config, then update the mirror
    async fn write<F>(&self, modify: F) -> Result<RiskConfig>
    where
        F: FnOnce(&mut RiskConfig, DateTime<Utc>),
    {
        self.hydrate().await?;
        let _guard = self.writes.lock().await;
        let mut config = self.config.read().await.clone();
        modify(&mut config, self.clock.now());
        self.repo.save(&config).await?;
        self.mirror(config.clone()).await;
        Ok(config)
    }
}

fn validate(update: &RiskConfigUpdate) -> Result<()> {
    let limits = [
        ("max_position_size", update.max_position_size),
        ("max_order_size", update.max_order_size),
        ("max_daily_loss", update.max_daily_loss),
    ];
    for (name, value) in limits {
        if let Some(value) = value
            && value <= Decimal::ZERO
        {
            return Err(Error::InvalidConfig(format!("{name} must be positive, got {value}")));
        }
    }
    Ok(())
}

/// Start of the local calendar day containing `now`
///
/// Falls back to a rolling 24 hours when local midnight does not exist.
fn local_day_start(now: DateTime<Utc>) -> DateTime<Utc> {
    now.with_timezone(&Local)
        .date_naive()
        .and_hms_opt(0, 0, 0)
        .and_then(|midnight| midnight.and_local_timezone(Local).earliest())
        .map(|midnight| midnight.with_timezone(&Utc))
        .unwrap_or_else(|| now - Duration::hours(24))
}
