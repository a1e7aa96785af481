//! History command - recently finished installations.

use console::style;
use respack::manager::{HistoryRecorder, JsonlHistory};

use super::common::styled_status;
use crate::error::CliError;
use crate::runner::CliRunner;

/// Run the history command.
pub fn run(runner: &CliRunner, limit: usize) -> Result<(), CliError> {
    let config = runner.manager_config()?;
    let Some(path) = config.history_path.as_deref() else {
        println!("History is not persisted. Set history_file in config.ini [tasks] section.");
        return Ok(());
    };

    let history = JsonlHistory::new(path, config.history_limit);
    let entries = history.recent(limit)?;

    if entries.is_empty() {
        println!("No installations recorded yet.");
        return Ok(());
    }

    for entry in &entries {
        println!(
            "{}  {:<10} {}  {}",
            entry.finished_at.format("%Y-%m-%d %H:%M:%S"),
            styled_status(entry.status),
            style(&entry.pack_id).bold(),
            style(format!(
                "{} completed, {} skipped, {} failed, {} canceled",
                entry.completed, entry.skipped, entry.failed, entry.canceled
            ))
            .dim()
        );
        for error in &entry.errors {
            println!("    {} {}: {}", style("✗").red(), error.resource_id, error.message);
        }
    }
    Ok(())
}
