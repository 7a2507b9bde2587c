//! Background task that forgets expired cooldown records.

use tokio::time::{MissedTickBehavior, interval};
use tracing::debug;

use crate::state::AppState;

/// Start the cooldown pruner in a background task.
///
/// Does nothing when cooldowns are disabled.
pub fn start_cooldown_pruner(state: AppState) {
    let cooldown = &state.engine.config().cooldown;
    if !cooldown.enabled {
        return;
    }
    let period = cooldown.prune_interval();

    tokio::spawn(async move {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // The first tick completes immediately.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let removed = state.engine.prune_cooldowns();
            if removed > 0 {
                debug!(removed, "pruned expired cooldown records");
            }
        }
    });
}
