//! Install command - install a pack with live progress.
//!
//! Starts the installation through `PackService`, polls task progress and
//! renders one bar per resource. Ctrl+C cancels the task; a second Ctrl+C
//! is ignored while the cancellation settles.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use console::style;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use respack::manager::{InstallationTask, PackService, ResourceState, TaskStatus};
use tracing::{debug, warn};

use super::common::{format_size, styled_state, styled_status};
use crate::error::CliError;
use crate::runner::CliRunner;

/// How often task progress is polled.
const POLL_INTERVAL: Duration = Duration::from_millis(200);

/// How long to wait for the finished task to be recorded.
const HISTORY_WAIT: Duration = Duration::from_secs(5);

/// Arguments for the install command.
pub struct InstallArgs {
    pub pack: String,
    /// Resource ids to install; every resource when empty.
    pub only: Vec<String>,
    pub source: Option<String>,
}

/// Run the install command.
pub fn run(runner: &CliRunner, args: InstallArgs) -> Result<(), CliError> {
    let catalog = runner.load_catalog()?;
    let service = runner.create_service(catalog)?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(CliError::Runtime)?;

    runtime.block_on(install(&service, args))
}

async fn install(service: &PackService, args: InstallArgs) -> Result<(), CliError> {
    let selection = (!args.only.is_empty()).then_some(args.only.as_slice());
    let ticket = service.install(&args.pack, selection, args.source.as_deref())?;
    let initial = service.get_progress(&ticket.task_id)?;

    println!(
        "Installing {} ({} resources)",
        style(&initial.pack_name).bold(),
        initial.resources.len()
    );
    println!("Press Ctrl+C to cancel");
    println!();

    let view = ProgressView::new(&initial);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut interrupted = false;
    let mut ticker = tokio::time::interval(POLL_INTERVAL);

    let task = loop {
        tokio::select! {
            signal = &mut ctrl_c, if !interrupted => {
                interrupted = true;
                match signal {
                    Ok(()) => request_cancel(service, &ticket.task_id),
                    Err(e) => warn!(error = %e, "Failed to listen for Ctrl+C"),
                }
            }
            _ = ticker.tick() => {}
        }

        let task = service.get_progress(&ticket.task_id)?;
        view.update(&task);
        if task.is_terminal() {
            break task;
        }
    };

    view.finish(&task);
    wait_for_history(service, &task.task_id).await;
    print_summary(&task);

    outcome(&task)
}

fn request_cancel(service: &PackService, task_id: &str) {
    match service.cancel(task_id) {
        Ok(response) => debug!(task_id = %task_id, message = %response.message, "Canceled"),
        Err(e) => warn!(task_id = %task_id, error = %e, "Cancel request rejected"),
    }
}

/// History is written after the task ends; give the background task a
/// moment so the runtime does not shut down underneath it.
async fn wait_for_history(service: &PackService, task_id: &str) {
    let deadline = Instant::now() + HISTORY_WAIT;
    while Instant::now() < deadline {
        match service.recent_history(8) {
            Ok(entries) if entries.iter().any(|e| e.task_id == task_id) => return,
            Ok(_) => {}
            Err(e) => {
                warn!(error = %e, "Failed to read history");
                return;
            }
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    debug!(task_id = %task_id, "Task not recorded before exit");
}

fn print_summary(task: &InstallationTask) {
    let summary = task.summary();
    println!();
    println!("Installation {}", styled_status(task.status));
    println!(
        "  {} completed, {} skipped, {} failed, {} canceled",
        summary.completed, summary.skipped, summary.failed, summary.canceled
    );
    for error in &summary.errors {
        println!("  {} {}: {}", style("✗").red(), error.resource_id, error.message);
    }
    if let Some(error) = &task.error {
        println!("  {}", style(error).red());
    }
}

/// Map the finished task onto the command result.
fn outcome(task: &InstallationTask) -> Result<(), CliError> {
    match task.status {
        TaskStatus::Canceled => Err(CliError::Canceled),
        TaskStatus::Error => Err(CliError::TaskFailed(
            task.error
                .clone()
                .unwrap_or_else(|| "unknown error".to_string()),
        )),
        _ => {
            let failed = task.summary().failed;
            if failed > 0 {
                Err(CliError::ResourcesFailed {
                    failed,
                    total: task.resources.len(),
                })
            } else {
                Ok(())
            }
        }
    }
}

/// One progress bar per resource.
struct ProgressView {
    _multi: MultiProgress,
    bars: HashMap<String, ProgressBar>,
}

impl ProgressView {
    fn new(task: &InstallationTask) -> Self {
        let multi = MultiProgress::new();
        let width = task
            .resources
            .iter()
            .map(|r| r.resource_id.len())
            .max()
            .unwrap_or(0);
        let template = format!(
            "  {{prefix:<{}}} [{{bar:30.cyan/blue}}] {{pos:>3}}% {{msg}}",
            width
        );
        let bar_style = ProgressStyle::default_bar()
            .template(&template)
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▓░");

        let bars = task
            .resources
            .iter()
            .map(|resource| {
                let bar = multi.add(ProgressBar::new(100));
                bar.set_style(bar_style.clone());
                bar.set_prefix(resource.resource_id.clone());
                bar.set_message(styled_state(resource.state).to_string());
                (resource.resource_id.clone(), bar)
            })
            .collect();

        Self {
            _multi: multi,
            bars,
        }
    }

    fn update(&self, task: &InstallationTask) {
        for resource in &task.resources {
            let Some(bar) = self.bars.get(&resource.resource_id) else {
                continue;
            };
            bar.set_position(u64::from(resource.progress));

            let mut message = styled_state(resource.state).to_string();
            if resource.state == ResourceState::Downloading && resource.downloaded_bytes > 0 {
                let transferred = match resource.total_bytes {
                    Some(total) => format!(
                        " {} / {}",
                        format_size(resource.downloaded_bytes),
                        format_size(total)
                    ),
                    None => format!(" {}", format_size(resource.downloaded_bytes)),
                };
                message.push_str(&transferred);
            }
            bar.set_message(message);
        }
    }

    fn finish(&self, task: &InstallationTask) {
        self.update(task);
        for bar in self.bars.values() {
            bar.finish();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use respack::manager::ResourceStatus;
    use respack::pack::ResourceType;

    fn status(id: &str, state: ResourceState, error: Option<&str>) -> ResourceStatus {
        ResourceStatus {
            resource_id: id.to_string(),
            resource_name: id.to_string(),
            resource_type: ResourceType::Model,
            optional: false,
            state,
            progress: if state == ResourceState::Error { 0 } else { 100 },
            downloaded_bytes: 0,
            total_bytes: None,
            error: error.map(str::to_string),
            started_at: None,
            finished_at: None,
        }
    }

    fn task(status_value: TaskStatus, resources: Vec<ResourceStatus>) -> InstallationTask {
        InstallationTask {
            task_id: "t".to_string(),
            pack_id: "p".to_string(),
            pack_name: "P".to_string(),
            status: status_value,
            progress: 0,
            resources,
            started_at: Utc::now(),
            finished_at: Some(Utc::now()),
            canceled: status_value == TaskStatus::Canceled,
            error: None,
        }
    }

    #[test]
    fn test_completed_task_succeeds() {
        let t = task(
            TaskStatus::Completed,
            vec![
                status("a", ResourceState::Completed, None),
                status("b", ResourceState::Skipped, None),
            ],
        );
        assert!(outcome(&t).is_ok());
    }

    #[test]
    fn test_failed_resource_fails_command() {
        let t = task(
            TaskStatus::Completed,
            vec![
                status("a", ResourceState::Completed, None),
                status("b", ResourceState::Error, Some("status 404")),
            ],
        );
        match outcome(&t) {
            Err(CliError::ResourcesFailed { failed, total }) => {
                assert_eq!(failed, 1);
                assert_eq!(total, 2);
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_canceled_task_maps_to_interrupt() {
        let t = task(
            TaskStatus::Canceled,
            vec![status("a", ResourceState::Canceled, None)],
        );
        let err = outcome(&t).unwrap_err();
        assert_eq!(err.exit_code(), 130);
    }
}
