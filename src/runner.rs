use crate::engine::strategy::{Decision, StrategyEngine};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

/// Tick the strategy on a fixed interval until `shutdown` flips to true or
/// its sender is dropped, then cancel whatever is still resting. Returns the
/// number of orders cancelled on the way out.
pub async fn run_strategy(
    mut engine: StrategyEngine,
    every: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> usize {
    let mut interval = tokio::time::interval(every);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = interval.tick() => {
                for decision in engine.tick().await {
                    match decision {
                        Decision::NotReady => {}
                        Decision::Placed { side, order_id, price } => {
                            tracing::info!(side = %side, order_id, price, "quote placed");
                        }
                        other => tracing::debug!(?other, "decision"),
                    }
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }

    let cancelled = engine.cancel_all().await;
    tracing::info!(symbol = %engine.symbol(), cancelled, "strategy stopped");
    cancelled
}
