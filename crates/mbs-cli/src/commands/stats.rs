//! Stats command for showing the figures the heartbeat reports.

use std::io::Write;

use anyhow::{Result, bail};
use chrono::NaiveDate;
use mbs_db::collect_daily_stats;

use crate::Config;

pub fn run<W: Write>(writer: &mut W, config: &Config, date: NaiveDate) -> Result<()> {
    let path = &config.local.sqlite_path;
    if path.as_os_str().is_empty() {
        bail!("missing required settings: local.sqlite_path");
    }

    writeln!(writer, "Terminal stats for {date}")?;
    writeln!(writer, "Database: {}", path.display())?;

    let Some(stats) = collect_daily_stats(path, &config.schema, date) else {
        writeln!(writer, "No data.")?;
        return Ok(());
    };

    writeln!(writer, "Sales: {:.2}", stats.sales)?;
    writeln!(writer, "Payouts: {:.2}", stats.payouts)?;
    writeln!(writer, "Current race: {}", or_dash(&stats.current_race))?;
    writeln!(writer, "Current ticket: {}", or_dash(&stats.current_ticket))?;
    Ok(())
}

fn or_dash(value: &str) -> &str {
    if value.is_empty() { "-" } else { value }
}
