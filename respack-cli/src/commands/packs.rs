//! Pack listing commands: `list` and `show`.

use console::style;
use respack::pack::ResourcePack;

use super::common::{resource_counts, resource_origin};
use crate::error::CliError;
use crate::runner::CliRunner;

/// Run the list command.
pub fn run_list(runner: &CliRunner, json: bool) -> Result<(), CliError> {
    let catalog = runner.load_catalog()?;
    let packs = catalog.list();

    if json {
        println!("{}", serde_json::to_string_pretty(&packs)?);
        return Ok(());
    }

    if packs.is_empty() {
        println!("No packs found in {}", runner.catalog_dir().display());
        return Ok(());
    }

    let width = packs.iter().map(|p| p.id.len()).max().unwrap_or(0);
    for pack in &packs {
        println!(
            "{:<width$}  {}  {}",
            pack.id,
            pack.name,
            style(format!("({})", resource_counts(pack))).dim(),
            width = width
        );
    }
    println!();
    println!("{} pack(s)", packs.len());
    Ok(())
}

/// Run the show command.
pub fn run_show(runner: &CliRunner, pack_id: &str, json: bool) -> Result<(), CliError> {
    let catalog = runner.load_catalog()?;
    let service = runner.create_service(catalog)?;
    let pack = service.get_pack(pack_id)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&pack)?);
        return Ok(());
    }

    print_pack(&pack);
    Ok(())
}

fn print_pack(pack: &ResourcePack) {
    println!("{} ({})", style(&pack.name).bold(), pack.id);
    if let Some(version) = &pack.version {
        println!("Version: {}", version);
    }
    if let Some(author) = &pack.author {
        println!("Author:  {}", author);
    }
    if !pack.tags.is_empty() {
        println!("Tags:    {}", pack.tags.join(", "));
    }
    if let Some(description) = &pack.description {
        println!();
        println!("{}", description);
    }

    println!();
    println!("Resources ({}):", resource_counts(pack));
    for resource in &pack.resources {
        let optional = if resource.optional { " [optional]" } else { "" };
        println!(
            "  {:<9} {}{}",
            resource.resource_type().as_str(),
            style(&resource.id).bold(),
            style(optional).dim()
        );
        println!("            {}", resource.name);
        println!("            {}", style(resource_origin(resource)).dim());
    }
}
