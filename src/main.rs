use anyhow::Result;
use clap::Parser;
use deskshell::app::App;
use deskshell::cli::{Cli, CliHandler, Commands};
use deskshell::config::AppConfig;
use deskshell::tabs::builtin_registry;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = AppConfig::load(cli.config.as_deref()).await?;
    cli.apply_overrides(&mut config);

    let tabs = builtin_registry()?;

    // Handle CLI commands
    if let Some(command) = &cli.command {
        if *command != Commands::Run {
            return CliHandler::new(config).handle_command(command, &tabs);
        }
    }

    // Initialize tracing for logging - write to file to avoid interfering with TUI
    let data_dir = AppConfig::data_dir();
    std::fs::create_dir_all(&data_dir)?;
    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(data_dir.join("deskshell.log"))?;

    let log_level = if cli.debug {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_writer(std::sync::Mutex::new(log_file))
        .with_ansi(false)
        .with_max_level(log_level)
        .init();

    if cli.debug {
        tracing::info!("Debug mode enabled - verbose logging active");
    }

    // Create and initialize the application
    let mut app = App::new(config)?;

    // Initialize database connection
    app.initialize_database().await?;

    // Load tab plugins
    app.initialize_tabs(&tabs).await?;

    // Run the application
    app.run().await?;

    Ok(())
}
