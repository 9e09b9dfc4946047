use std::path::Path;
use std::time::Duration;

use agentlens_core::{ReconstructOptions, SessionView};
use anyhow::Result;

use crate::input;
use crate::output::{now_ms, timers_line};

/// Re-read the log and print the timer line on every tick. Returns once no
/// timer is running, so an idle session arms nothing.
pub async fn run_watch(
    path: &Path,
    session: Option<&str>,
    options: &ReconstructOptions,
    interval_ms: u64,
) -> Result<()> {
    let mut ticker = tokio::time::interval(Duration::from_millis(interval_ms));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    let mut last_generation = None;
    let mut view: Option<SessionView> = None;

    loop {
        ticker.tick().await;

        let log = input::load_log(path)?;
        let session_id = input::resolve_session(&log, session, path)?;
        if last_generation != Some(log.generation()) || view.is_none() {
            last_generation = Some(log.generation());
            view = Some(SessionView::build(
                &session_id,
                log.events(&session_id),
                None,
                options,
            ));
        }
        let Some(current) = view.as_ref() else {
            continue;
        };

        println!("{}", timers_line(current, now_ms()));
        if !current.needs_tick() {
            tracing::debug!(session = %session_id, "no timer running; watch stopped");
            return Ok(());
        }
    }
}
