use anyhow::Result;
use clap::{Parser, Subcommand};
use std::io::Write;
use std::path::PathBuf;

use crate::config::AppConfig;
use crate::data::EntityRegistry;
use crate::plugins::{TabLoader, TabRegistry};

/// deskshell - tabbed terminal shell with pluggable tabs
#[derive(Parser)]
#[command(name = "deskshell")]
#[command(about = "A tabbed TUI shell whose pages are loaded as plugins")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,

    /// Configuration file path
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Database file (overrides the config file)
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

    /// Entity registry file (overrides the config file)
    #[arg(long, global = true)]
    pub registry: Option<PathBuf>,

    /// Directory scanned for tab modules (overrides the config file)
    #[arg(long, global = true)]
    pub tabs_dir: Option<PathBuf>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Start the terminal interface (default)
    Run,

    /// List the entities declared in the entity registry
    Entities,

    /// Run one tab load pass and report the result
    Tabs,
}

impl Cli {
    /// Apply command-line overrides on top of the loaded configuration
    pub fn apply_overrides(&self, config: &mut AppConfig) {
        if let Some(db) = &self.db {
            config.database_path = db.clone();
        }
        if let Some(registry) = &self.registry {
            config.registry_path = registry.clone();
        }
        if let Some(tabs_dir) = &self.tabs_dir {
            config.tabs_dir = Some(tabs_dir.clone());
        }
    }
}

/// Handles the non-interactive commands
pub struct CliHandler {
    config: AppConfig,
}

impl CliHandler {
    pub fn new(config: AppConfig) -> Self {
        Self { config }
    }

    pub fn handle_command(&self, command: &Commands, tabs: &TabRegistry) -> Result<()> {
        let mut out = std::io::stdout().lock();
        match command {
            Commands::Run => Ok(()),
            Commands::Entities => self.print_entities(&mut out),
            Commands::Tabs => self.print_tabs(&mut out, tabs),
        }
    }

    pub fn print_entities(&self, out: &mut impl Write) -> Result<()> {
        let registry = EntityRegistry::load(&self.config.registry_path);
        writeln!(out, "Entity registry: {}", self.config.registry_path.display())?;

        if registry.is_empty() {
            writeln!(out, "  (no entities)")?;
            return Ok(());
        }

        for entity in registry.all_entities() {
            let operations: Vec<String> = entity
                .operations
                .iter()
                .map(|op| format!("{:?}", op).to_lowercase())
                .collect();
            writeln!(out, "  {} [{}]", entity.name, operations.join(", "))?;
            if let Some(description) = &entity.description {
                writeln!(out, "    {}", description)?;
            }
            for field in &entity.fields {
                match &field.default {
                    Some(default) => {
                        writeln!(out, "    - {}: {} = {}", field.name, field.field_type, default)?
                    }
                    None => writeln!(out, "    - {}: {}", field.name, field.field_type)?,
                }
            }
        }
        Ok(())
    }

    pub fn print_tabs(&self, out: &mut impl Write, tabs: &TabRegistry) -> Result<()> {
        let (instances, errors) = match &self.config.tabs_dir {
            Some(dir) => {
                writeln!(out, "Tabs directory: {}", dir.display())?;
                let mut loader = TabLoader::new(dir, tabs);
                let instances = loader.load_all();
                (instances, loader.load_errors())
            }
            None => {
                writeln!(out, "No tabs directory configured; using built-in tabs")?;
                let mut loader = TabLoader::new("", tabs);
                let instances = loader.load_registered();
                (instances, loader.load_errors())
            }
        };

        writeln!(out, "Loaded {} tab(s):", instances.len())?;
        for tab in &instances {
            writeln!(out, "  {} ({})", tab.display_name(), tab.type_name())?;
        }
        if !errors.is_empty() {
            writeln!(out, "Load errors:")?;
            for error in &errors {
                writeln!(out, "  {}", error)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn config_in(dir: &TempDir) -> AppConfig {
        AppConfig {
            database_path: dir.path().join("app.db"),
            registry_path: dir.path().join("entity_registry.json"),
            ..AppConfig::default()
        }
    }

    #[test]
    fn test_cli_overrides() {
        let cli = Cli::parse_from(["deskshell", "--db", "/tmp/x.db", "--tabs-dir", "/tmp/tabs", "tabs"]);
        assert_eq!(cli.command, Some(Commands::Tabs));

        let mut config = AppConfig::default();
        cli.apply_overrides(&mut config);
        assert_eq!(config.database_path, PathBuf::from("/tmp/x.db"));
        assert_eq!(config.tabs_dir, Some(PathBuf::from("/tmp/tabs")));
    }

    #[test]
    fn test_print_entities() {
        let temp_dir = TempDir::new().unwrap();
        let config = config_in(&temp_dir);
        EntityRegistry::install_default(&config.registry_path).unwrap();

        let mut out = Vec::new();
        CliHandler::new(config).print_entities(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("TimerReminderEntity [read, write]"));
        assert!(text.contains("- minute_cycle: INTEGER = 1"));
    }

    #[test]
    fn test_print_tabs_reports_errors() {
        let temp_dir = TempDir::new().unwrap();
        let tabs_dir = temp_dir.path().join("tabs");
        std::fs::create_dir_all(tabs_dir.join("ghost")).unwrap();
        std::fs::write(tabs_dir.join("ghost").join("tab.toml"), "factory = \"ghost\"").unwrap();

        let mut config = config_in(&temp_dir);
        config.tabs_dir = Some(tabs_dir);

        let mut out = Vec::new();
        CliHandler::new(config)
            .print_tabs(&mut out, &TabRegistry::new())
            .unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("Loaded 0 tab(s)"));
        assert!(text.contains("ghost: No registered tab factory `ghost`"));
    }
}
