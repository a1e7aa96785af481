//! Common formatting shared across CLI commands.

use console::{style, StyledObject};
use respack::manager::{ResourceState, TaskStatus};
use respack::pack::{Resource, ResourceKind, ResourcePack, ResourceType};

/// Format a byte count for display (e.g., "1.5 GB").
pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} {}", bytes, UNITS[0])
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}

/// Colored resource state.
pub fn styled_state(state: ResourceState) -> StyledObject<&'static str> {
    let text = style(state.as_str());
    match state {
        ResourceState::Completed => text.green(),
        ResourceState::Skipped => text.cyan(),
        ResourceState::Error => text.red(),
        ResourceState::Canceled => text.yellow(),
        ResourceState::Downloading | ResourceState::Installing => text.blue(),
        ResourceState::Pending => text.dim(),
    }
}

/// Colored task status.
pub fn styled_status(status: TaskStatus) -> StyledObject<&'static str> {
    let text = style(status.as_str());
    match status {
        TaskStatus::Completed => text.green(),
        TaskStatus::Error => text.red(),
        TaskStatus::Canceled => text.yellow(),
        TaskStatus::Pending | TaskStatus::Downloading | TaskStatus::Installing => text.blue(),
    }
}

/// One-line resource count summary, e.g. "2 models, 1 plugin".
pub fn resource_counts(pack: &ResourcePack) -> String {
    let parts: Vec<String> = [
        ResourceType::Model,
        ResourceType::Plugin,
        ResourceType::Workflow,
        ResourceType::Custom,
    ]
    .into_iter()
    .filter_map(|t| {
        let n = pack.count_of(t);
        match n {
            0 => None,
            1 => Some(format!("1 {}", t)),
            _ => Some(format!("{} {}s", n, t)),
        }
    })
    .collect();

    if parts.is_empty() {
        "no resources".to_string()
    } else {
        parts.join(", ")
    }
}

/// Where a resource comes from and where it goes.
pub fn resource_origin(resource: &Resource) -> String {
    match &resource.kind {
        ResourceKind::Model(spec) => {
            let sources: Vec<&str> = spec.urls.keys().map(String::as_str).collect();
            format!(
                "{}/{} (sources: {})",
                spec.dir,
                spec.filename,
                sources.join(", ")
            )
        }
        ResourceKind::Plugin(spec) => match &spec.branch {
            Some(branch) => format!("{} ({})", spec.repository, branch),
            None => spec.repository.clone(),
        },
        ResourceKind::Workflow(spec) => spec.filename.clone(),
        ResourceKind::Custom(spec) => spec.destination.clone(),
    }
}
