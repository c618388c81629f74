//! Run command: the sync loop, until Ctrl-C.

use std::fs::{self, File};
use std::path::Path;

use anyhow::{Context, Result};
use fs2::FileExt;
use mbs_core::Scheduler;

use crate::config::dirs_state_path;
use crate::{Collector, Config, TokioClock};

const LOCK_FILE: &str = "mbsync.lock";

pub async fn run(config: &Config) -> Result<()> {
    config.validate()?;

    let state_dir = dirs_state_path().context("could not determine state directory")?;
    let _lock = acquire_lock(&state_dir)?;

    let mut collector = Collector::new(config).context("failed to create backend client")?;
    let mut scheduler =
        Scheduler::new(config.schedule(), TokioClock::new()).context("invalid schedule")?;

    tracing::info!(terminal_id = %config.terminal.id, "collector started");
    tokio::select! {
        () = scheduler.run(&mut collector) => {}
        signal = tokio::signal::ctrl_c() => {
            signal.context("failed to listen for Ctrl-C")?;
            tracing::info!("interrupted, shutting down");
        }
    }
    Ok(())
}

/// Takes the single-instance lock in `dir`.
///
/// The lock is held until the returned file is dropped.
fn acquire_lock(dir: &Path) -> Result<File> {
    fs::create_dir_all(dir).context("failed to create state directory")?;
    let path = dir.join(LOCK_FILE);
    let file = File::create(&path).context("failed to create lock file")?;
    file.try_lock_exclusive().with_context(|| {
        format!(
            "another mbsync instance is already running (lock held on {})",
            path.display()
        )
    })?;
    Ok(file)
}
