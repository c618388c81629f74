//! Once command: every cycle a single time, for manual checks and cron.

use std::io::{self, Write};

use anyhow::{Context, Result, bail};
use mbs_core::{Scheduler, TickReport};

use crate::{Collector, Config, TokioClock};

pub async fn run<W: Write>(writer: &mut W, config: &Config) -> Result<()> {
    config.validate()?;

    let mut collector = Collector::new(config).context("failed to create backend client")?;
    let mut scheduler =
        Scheduler::new(config.schedule(), TokioClock::new()).context("invalid schedule")?;

    let reports = scheduler.run_ticks(&mut collector, 1).await;
    for report in &reports {
        write_report(writer, report)?;
    }

    if reports.iter().any(has_failure) {
        bail!("one or more sync cycles failed");
    }
    Ok(())
}

fn write_report<W: Write>(writer: &mut W, report: &TickReport) -> io::Result<()> {
    writeln!(writer, "heartbeat: {}", report.heartbeat)?;
    if let Some(config) = &report.config {
        writeln!(writer, "config: {config}")?;
    }
    if let Some(data) = &report.data {
        writeln!(writer, "data: {data}")?;
    }
    Ok(())
}

fn has_failure(report: &TickReport) -> bool {
    report.heartbeat.is_failed()
        || report.config.as_ref().is_some_and(|o| o.is_failed())
        || report.data.as_ref().is_some_and(|o| o.is_failed())
}
