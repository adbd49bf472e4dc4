//! `flowstone tools`

use super::CliError;
use flowstone_tools::ToolRegistry;

pub fn execute() -> Result<(), CliError> {
    let registry = ToolRegistry::with_builtins();
    let specs = registry.specs();

    let id_width = specs.iter().map(|s| s.id.len()).max().unwrap_or(0);
    for spec in specs {
        println!(
            "{:id_width$}  [{}] {}",
            spec.id,
            spec.category,
            spec.description
        );
    }
    Ok(())
}
