//! layout-chord: switch the GNOME keyboard layout with a modifier chord
//!
//! Watches raw keyboard events and switches to the previously used input
//! source when two key groups (Ctrl and Shift by default) are pressed
//! together and released, with no other key pressed in between.
//!
//! Events come from one of two sources:
//! - `xinput test-xi2 --root` output (default)
//! - a `/dev/input/event*` device given with `--input`
//!
//! The process runs until the source ends. A source failure exits with a
//! non-zero status.

mod config;
mod hotkey;
mod layout;
mod lifecycle;
mod state;

use anyhow::{Context, Result};
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::hotkey::{EventSource, Source};
use crate::layout::GnomeShellSwitcher;
use crate::lifecycle::ShutdownSignal;
use crate::state::ChordMachine;

/// Raw events buffered between the source and the chord machine
const EVENT_CHANNEL_CAPACITY: usize = 64;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load();

    // Initialize logging
    let filter = if config.debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "layout-chord starting"
    );

    if config.groups.group1.is_empty() || config.groups.group2.is_empty() {
        warn!("a key group has no key codes, the chord can never fire");
    }

    let mut shutdown = ShutdownSignal::new().context("failed to register signal handlers")?;

    // Source -> chord machine
    let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);

    let switcher = GnomeShellSwitcher::new(config.mru_index);
    let machine = ChordMachine::new(config.groups.clone(), switcher);
    let machine_task = tokio::spawn(machine.run(event_rx));

    let source = Source::from_config(&config);
    info!(source = source.name(), input = ?config.input, "configuration loaded");

    let outcome = tokio::select! {
        result = source.run(event_tx) => result,
        _ = shutdown.wait() => {
            info!("shutdown signal received");
            Ok(())
        }
    };

    // The sender is gone either way, so the machine drains and stops
    match machine_task.await {
        Ok(machine) => {
            info!(
                triggers = machine.triggers(),
                state = ?machine.state(),
                "chord machine exited"
            );
        }
        Err(e) => warn!(?e, "chord machine task failed"),
    }

    if let Err(e) = outcome {
        error!(%e, "event source failed");
        return Err(e).context("event source failed");
    }

    info!("layout-chord stopped");

    Ok(())
}
