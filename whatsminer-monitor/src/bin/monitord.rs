//! Polling daemon for one Whatsminer.
//!
//! Configured from the environment (see `config`), polls until SIGINT or
//! SIGTERM, and logs each snapshot. Exits non-zero if the miner rejects the
//! stored credentials.

use anyhow::{Context, Result};
use tokio::signal::unix::{self, SignalKind};
use tokio::sync::watch;
use tokio_util::{sync::CancellationToken, task::TaskTracker};

use whatsminer_monitor::config::MonitorConfig;
use whatsminer_monitor::coordinator::{Coordinator, MinerData, PollState};
use whatsminer_monitor::tracing::{self, prelude::*};

#[tokio::main]
async fn main() -> Result<()> {
    tracing::init_journald_or_stdout();

    let config = MonitorConfig::from_env().context("WHATSMINER_HOST is not set")?;
    info!(
        host = %config.descriptor,
        interval = ?config.coordinator.update_interval,
        "Starting."
    );

    let shutdown = CancellationToken::new();
    let tracker = TaskTracker::new();
    let (state_tx, mut state_rx) = watch::channel(PollState::default());

    let coordinator = Coordinator::new(&config.descriptor, config.coordinator);
    let mut poller = tracker.spawn(coordinator.run(shutdown.clone(), state_tx));

    tracker.spawn({
        let shutdown = shutdown.clone();
        async move {
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    changed = state_rx.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        log_state(&state_rx.borrow_and_update());
                    }
                }
            }
        }
    });

    tracker.close();
    info!("For debugging, set RUST_LOG=whatsminer_monitor=debug or trace.");

    let mut sigint = unix::signal(SignalKind::interrupt())?;
    let mut sigterm = unix::signal(SignalKind::terminate())?;

    let stopped = tokio::select! {
        _ = sigint.recv() => {
            info!("Received SIGINT.");
            None
        },
        _ = sigterm.recv() => {
            info!("Received SIGTERM.");
            None
        },
        joined = &mut poller => Some(joined),
    };

    shutdown.cancel();
    tracker.wait().await;
    info!("Exiting.");

    match stopped {
        Some(Ok(Err(e))) => Err(e).context("poller stopped"),
        Some(Err(e)) => Err(e).context("poller task failed"),
        _ => Ok(()),
    }
}

fn log_state(state: &PollState) {
    // Failures are already logged by the coordinator.
    if state.last_error.is_some() {
        return;
    }

    match &state.data {
        Some(MinerData::Online {
            device_model,
            summary,
            power_unit,
            ..
        }) => info!(
            model = %device_model,
            hashrate_ghs = summary.hash_rate_5s,
            power_w = summary.power,
            temp_c = summary.temperature,
            psu = %power_unit.model,
            "Miner online"
        ),
        Some(data) => info!(model = data.model_or_unknown(), "Miner not mining"),
        None => {}
    }
}
