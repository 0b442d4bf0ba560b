use chrono::Local;
use log::{debug, info};
use tokio::sync::watch;
use tokio::time::{MissedTickBehavior, interval};

use crate::engine::Engine;

/// Tick the engine at the configured cadence until `shutdown` turns true
///
/// Ticks run one after another; a tick that overruns the interval causes
/// the missed ones to be skipped, never queued. Returns the number of ticks
/// run.
pub async fn run_scheduled(engine: Engine, mut shutdown: watch::Receiver<bool>) -> u64 {
    let mut ticker = interval(engine.config().tick_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    info!(
        "[MONITOR] Scheduler started ({} ms interval)",
        engine.config().monitor.tick_interval_ms
    );

    let mut ticks = 0;
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Some(hours) = &engine.config().monitor.market_hours {
                    let local = engine.clock().now().with_timezone(&Local).naive_local();
                    if !hours.is_open(local) {
                        debug!("[MONITOR] Market closed, tick skipped");
                        continue;
                    }
                }
                engine.run_tick().await;
                ticks += 1;
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }
    info!("[MONITOR] Scheduler stopped after {ticks} ticks");
    ticks
}
