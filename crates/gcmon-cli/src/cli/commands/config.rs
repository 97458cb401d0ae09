//! Config command handlers.

use anyhow::{Context, Result};
use gcmon_core::columns::ColumnRegistry;
use gcmon_core::config::{self, Configuration};

pub fn path() {
    println!("{}", config::paths::config_path().display());
}

pub fn init() -> Result<()> {
    let config_path = config::paths::config_path();
    Configuration::init(&config_path)
        .with_context(|| format!("init config at {}", config_path.display()))?;
    println!("Created config at {}", config_path.display());
    Ok(())
}

pub fn generate() -> Result<()> {
    let yaml = Configuration::generate()?;
    print!("{yaml}");
    Ok(())
}

pub fn columns() {
    let registry = ColumnRegistry::builtin();
    let width = registry
        .iter()
        .map(|column| column.name.chars().count())
        .max()
        .unwrap_or(0);
    for column in registry.iter() {
        println!("{:<width$}  {}", column.name, column.description);
    }
}
