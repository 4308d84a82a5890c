//! Periodic update loop
//!
//! Every tick: pick up external edits of the notebook file, start cells
//! whose refresh interval elapsed, and broadcast the rendered notebook
//! when it differs from the last broadcast.

use std::time::Duration;

use chrono::Utc;
use tokio::time::MissedTickBehavior;

use crate::state::AppState;

pub async fn run_update_loop(state: AppState, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut last = None;

    tracing::debug!(interval_ms = interval.as_millis() as u64, "update loop started");
    loop {
        ticker.tick().await;
        tick(&state, &mut last).await;
    }
}

/// One pass of the loop. Returns whether an update was published.
pub async fn tick(state: &AppState, last: &mut Option<String>) -> bool {
    {
        let mut notebook = state.notebook().write().await;
        match notebook.reload_if_changed() {
            Ok(true) => tracing::info!(path = %notebook.path().display(), "notebook changed on disk"),
            Ok(false) => {}
            Err(e) => tracing::warn!(error = %e, "could not reload notebook"),
        }
    }

    let due = state.notebook().read().await.due_for_refresh(Utc::now());
    for cell_id in due {
        match state.spawn_cell(&cell_id).await {
            Ok(()) => tracing::debug!(cell_id = %cell_id, "refresh run scheduled"),
            Err(e) => tracing::debug!(cell_id = %cell_id, error = %e, "refresh run skipped"),
        }
    }

    let html = state.render().await;
    if last.as_deref() == Some(html.as_str()) {
        return false;
    }
    let receivers = state.publish(html.clone());
    tracing::trace!(receivers, "published update");
    *last = Some(html);
    true
}
