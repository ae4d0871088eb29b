use anyhow::Result;
use chrono::Local;
use crossterm::{
    event::{self, Event, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
    tty::IsTty,
};
use ratatui::{backend::CrosstermBackend, Terminal};
use std::io;
use std::sync::Arc;
use tokio::time::{Duration, Instant};

use crate::config::AppConfig;
use crate::data::{DataError, EntityRegistry, SharedDataApi, SqliteDataApi};
use crate::events::{EventHandler, EventResult};
use crate::notifications::DesktopNotifier;
use crate::plugins::{HostMessage, TabRegistry};
use crate::ui::MainWindow;

pub struct App {
    config: AppConfig,
    should_quit: bool,
    window: MainWindow,
    event_handler: EventHandler,
    data: Option<SharedDataApi>,
    notifier: DesktopNotifier,
}

impl App {
    pub fn new(config: AppConfig) -> Result<Self> {
        config.validate()?;

        let notifier = if config.desktop_notifications {
            DesktopNotifier::new(config.title.clone())
        } else {
            DesktopNotifier::disabled()
        };

        Ok(Self {
            window: MainWindow::new(config.title.clone(), None),
            config,
            should_quit: false,
            event_handler: EventHandler::new(),
            data: None,
            notifier,
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Open the entity registry and the SQLite store, then hand the data API
    /// to the main window
    pub async fn initialize_database(&mut self) -> Result<()> {
        if EntityRegistry::install_default(&self.config.registry_path)? {
            tracing::info!(
                "Wrote default entity registry to {}",
                self.config.registry_path.display()
            );
        }
        let registry = Arc::new(EntityRegistry::load(&self.config.registry_path));

        let store = SqliteDataApi::new(&self.config.database_path, registry)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to initialize database: {}", e))?;
        let data: SharedDataApi = Arc::new(store);

        self.window.set_data_api(data.clone());
        self.data = Some(data);

        tracing::info!("Database ready at {}", self.config.database_path.display());
        Ok(())
    }

    /// The data API; fails until [`App::initialize_database`] has run
    pub fn data_api(&self) -> Result<SharedDataApi, DataError> {
        self.data.clone().ok_or(DataError::NotInitialized)
    }

    /// Load tabs from the configured directory, or every registered tab when
    /// no directory is configured. Returns how many tabs were constructed.
    pub async fn initialize_tabs(&mut self, registry: &TabRegistry) -> Result<usize> {
        let loaded = match &self.config.tabs_dir {
            Some(dir) => self.window.load_tabs(dir, registry).await,
            None => self.window.load_registered(registry).await,
        };

        if self.window.load_errors().is_empty() {
            self.window.set_status(format!("{} tab(s) loaded", loaded));
        }
        Ok(loaded)
    }

    pub fn window(&self) -> &MainWindow {
        &self.window
    }

    pub fn window_mut(&mut self) -> &mut MainWindow {
        &mut self.window
    }

    pub async fn run(&mut self) -> Result<()> {
        // Check if we're running in a proper terminal
        if !std::io::stdout().is_tty() {
            return Err(anyhow::anyhow!(
                "deskshell requires a proper terminal (TTY) to run. Please run it in a terminal emulator."
            ));
        }

        // Setup terminal
        enable_raw_mode().map_err(|e| anyhow::anyhow!("Failed to enable raw mode: {}", e))?;
        let mut stdout = io::stdout();
        execute!(stdout, EnterAlternateScreen)
            .map_err(|e| anyhow::anyhow!("Failed to setup terminal: {}", e))?;
        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend)
            .map_err(|e| anyhow::anyhow!("Failed to create terminal: {}", e))?;

        // Run the main loop
        let result = self.run_loop(&mut terminal).await;

        // Restore terminal
        disable_raw_mode()?;
        execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
        terminal.show_cursor()?;

        result
    }

    async fn run_loop(&mut self, terminal: &mut Terminal<CrosstermBackend<std::io::Stdout>>) -> Result<()> {
        let mut last_tick = Instant::now();
        let tick_rate = Duration::from_millis(self.config.tick_rate_ms);

        loop {
            self.process_messages().await;

            // Draw UI
            terminal.draw(|f| self.window.render(f))?;

            // Handle events
            let timeout = tick_rate
                .checked_sub(last_tick.elapsed())
                .unwrap_or_else(|| Duration::from_secs(0));

            if event::poll(timeout)? {
                if let Event::Key(key) = event::read()? {
                    if key.kind == KeyEventKind::Press {
                        let result = self.event_handler.handle_key_event(key, &mut self.window).await;
                        if result == EventResult::Quit || self.event_handler.should_quit() {
                            self.should_quit = true;
                        }
                    }
                }
            }

            if last_tick.elapsed() >= tick_rate {
                self.window.tick(Local::now().naive_local()).await;
                last_tick = Instant::now();
            }

            if self.should_quit {
                break;
            }
        }

        Ok(())
    }

    /// Forward notifications posted by tabs to the desktop
    async fn process_messages(&mut self) {
        for message in self.window.drain_messages() {
            if let HostMessage::Notify { title, body } = message {
                tracing::info!("{}: {}", title, body);
                self.notifier.notify(&title, &body).await;
            }
        }
    }
}
