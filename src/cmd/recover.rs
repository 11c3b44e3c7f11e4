//! `cairn recover`: ingest artifacts a crashed run left behind.

use anyhow::Result;
use console::style;

use cairn::config::Config;
use cairn::ingest::Stores;
use cairn::recovery::{RecoveryAction, recover_all};
use cairn::ui::icons::{CHECK, CROSS, WARN};

pub fn cmd_recover(config: &Config, dry_run: bool) -> Result<()> {
    let stores = Stores::new(&config.sessions_dir);
    let reports = recover_all(&stores, dry_run);

    if reports.is_empty() {
        println!("No stuck sessions found.");
        return Ok(());
    }

    for report in &reports {
        let icon = match report.action {
            RecoveryAction::Found { .. } | RecoveryAction::Recovered { .. } => &CHECK,
            RecoveryAction::Locked => &WARN,
            RecoveryAction::Failed { .. } => &CROSS,
        };
        println!("{}{}", icon, report);
    }

    if dry_run {
        println!();
        println!("{}", style("Dry run: nothing was changed.").dim());
    }
    Ok(())
}
