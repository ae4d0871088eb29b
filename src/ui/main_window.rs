//! Main window: hosts every loaded tab
//!
//! The window owns the tab instances, tracks which one is selected and fires
//! the activation hooks whenever the selection changes. Tabs talk back to it
//! through the [`HostHandle`] they were constructed with.

use crate::data::SharedDataApi;
use crate::plugins::{HostHandle, HostMessage, KeyOutcome, Tab, TabError, TabLoader, TabRegistry};

use chrono::NaiveDateTime;
use crossterm::event::KeyEvent;
use ratatui::{
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    widgets::{Block, Borders, Paragraph, Tabs},
    Frame,
};
use std::path::Path;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

pub struct MainWindow {
    title: String,
    sender: mpsc::UnboundedSender<HostMessage>,
    receiver: mpsc::UnboundedReceiver<HostMessage>,
    handle: HostHandle,
    tabs: Vec<Box<dyn Tab>>,
    current: Option<usize>,
    load_errors: Vec<String>,
    status: Option<String>,
}

impl MainWindow {
    pub fn new(title: impl Into<String>, data: Option<SharedDataApi>) -> Self {
        let title = title.into();
        let (sender, receiver) = mpsc::unbounded_channel();
        let handle = HostHandle::new(title.clone(), sender.clone(), data);

        Self {
            title,
            sender,
            receiver,
            handle,
            tabs: Vec::new(),
            current: None,
            load_errors: Vec::new(),
            status: None,
        }
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    /// Handle given to tabs constructed by this window
    pub fn handle(&self) -> &HostHandle {
        &self.handle
    }

    /// Attach the data API. Only tabs loaded afterwards can reach it.
    pub fn set_data_api(&mut self, data: SharedDataApi) {
        self.handle = HostHandle::new(self.title.clone(), self.sender.clone(), Some(data));
    }

    /// Load every tab found under `root`; returns how many were constructed
    pub async fn load_tabs<P: AsRef<Path>>(&mut self, root: P, registry: &TabRegistry) -> usize {
        let mut loader = TabLoader::new(root, registry).with_parent(self.handle.clone());
        let tabs = loader.load_all();
        self.install(tabs, loader.load_errors()).await;
        loader.tab_count()
    }

    /// Load every registered tab, without scanning a directory
    pub async fn load_registered(&mut self, registry: &TabRegistry) -> usize {
        let mut loader = TabLoader::new("", registry).with_parent(self.handle.clone());
        let tabs = loader.load_registered();
        self.install(tabs, loader.load_errors()).await;
        loader.tab_count()
    }

    async fn install(&mut self, tabs: Vec<Box<dyn Tab>>, errors: Vec<String>) {
        for error in &errors {
            warn!("Tab load error: {}", error);
        }
        if !errors.is_empty() {
            self.status = Some(format!("{} tab(s) failed to load", errors.len()));
        }
        self.load_errors.extend(errors);

        for tab in tabs {
            self.add_tab(tab).await;
        }
        info!("Main window hosts {} tab(s)", self.tabs.len());
    }

    /// Append a tab. The first tab added becomes the selection.
    pub async fn add_tab(&mut self, tab: Box<dyn Tab>) {
        debug!("Adding tab '{}' ({})", tab.display_name(), tab.type_name());
        self.tabs.push(tab);

        if self.current.is_none() {
            self.current = Some(0);
            self.activate(0).await;
        }
    }

    /// Select the tab at `index`. Returns `false` for an out-of-range index.
    pub async fn set_current_index(&mut self, index: usize) -> bool {
        if index >= self.tabs.len() {
            return false;
        }
        if self.current == Some(index) {
            return true;
        }

        let previous = self.current.replace(index);
        self.activate(index).await;
        if let Some(previous) = previous {
            self.deactivate(previous).await;
        }
        true
    }

    pub async fn next_tab(&mut self) {
        if let Some(current) = self.current {
            let next = (current + 1) % self.tabs.len();
            self.set_current_index(next).await;
        }
    }

    pub async fn previous_tab(&mut self) {
        if let Some(current) = self.current {
            let previous = (current + self.tabs.len() - 1) % self.tabs.len();
            self.set_current_index(previous).await;
        }
    }

    pub async fn refresh_current(&mut self) {
        let Some(index) = self.current else {
            return;
        };
        if let Err(e) = self.tabs[index].refresh().await {
            self.report(index, "refresh", e);
        }
    }

    /// Forward the cooperative timer tick to every tab
    pub async fn tick(&mut self, now: NaiveDateTime) {
        for index in 0..self.tabs.len() {
            if let Err(e) = self.tabs[index].tick(now).await {
                self.report(index, "tick", e);
            }
        }
    }

    /// Offer a key to the selected tab
    pub async fn handle_key(&mut self, key: KeyEvent) -> KeyOutcome {
        let Some(index) = self.current else {
            return KeyOutcome::Ignored;
        };

        match self.tabs[index].handle_key(key).await {
            Ok(outcome) => outcome,
            Err(e) => {
                self.report(index, "key handling", e);
                KeyOutcome::Handled
            }
        }
    }

    /// Whether the selected tab wants every key
    pub fn current_captures_input(&self) -> bool {
        self.current_tab().map_or(false, |tab| tab.captures_input())
    }

    /// First tab whose display name is `name`
    pub fn get_tab_by_name(&self, name: &str) -> Option<&dyn Tab> {
        self.tabs
            .iter()
            .find(|tab| tab.display_name() == name)
            .map(|tab| tab.as_ref())
    }

    pub fn get_tab_by_name_mut(&mut self, name: &str) -> Option<&mut Box<dyn Tab>> {
        self.tabs.iter_mut().find(|tab| tab.display_name() == name)
    }

    pub fn current_tab(&self) -> Option<&dyn Tab> {
        self.current.map(|index| self.tabs[index].as_ref())
    }

    pub fn current_index(&self) -> Option<usize> {
        self.current
    }

    pub fn tab_count(&self) -> usize {
        self.tabs.len()
    }

    pub fn tab_names(&self) -> Vec<&str> {
        self.tabs.iter().map(|tab| tab.display_name()).collect()
    }

    /// Errors from every load pass so far
    pub fn load_errors(&self) -> &[String] {
        &self.load_errors
    }

    pub fn status(&self) -> Option<&str> {
        self.status.as_deref()
    }

    pub fn set_status(&mut self, text: impl Into<String>) {
        self.status = Some(text.into());
    }

    /// Take every message tabs have posted. Status messages are applied to
    /// the status bar before being returned.
    pub fn drain_messages(&mut self) -> Vec<HostMessage> {
        let mut messages = Vec::new();
        while let Ok(message) = self.receiver.try_recv() {
            if let HostMessage::Status(text) = &message {
                self.status = Some(text.clone());
            }
            messages.push(message);
        }
        messages
    }

    async fn activate(&mut self, index: usize) {
        if let Err(e) = self.tabs[index].on_activate().await {
            self.report(index, "activation", e);
        }
    }

    async fn deactivate(&mut self, index: usize) {
        if let Err(e) = self.tabs[index].on_deactivate().await {
            self.report(index, "deactivation", e);
        }
    }

    fn report(&mut self, index: usize, hook: &str, error: TabError) {
        let name = self.tabs[index].display_name();
        warn!("Tab '{}' {} failed: {}", name, hook, error);
        self.status = Some(format!("{}: {} failed: {}", name, hook, error));
    }

    pub fn render(&self, frame: &mut Frame) {
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(3), // Tab bar
                Constraint::Min(0),    // Tab body
                Constraint::Length(1), // Status bar
            ])
            .split(frame.size());

        self.render_tab_bar(frame, chunks[0]);

        match self.current_tab() {
            Some(tab) => tab.render(frame, chunks[1]),
            None => {
                let empty = Paragraph::new("No tabs loaded")
                    .block(Block::default().borders(Borders::ALL))
                    .alignment(Alignment::Center)
                    .style(Style::default().fg(Color::DarkGray));
                frame.render_widget(empty, chunks[1]);
            }
        }

        self.render_status_bar(frame, chunks[2]);
    }

    fn render_tab_bar(&self, frame: &mut Frame, area: Rect) {
        let tabs = Tabs::new(self.tab_names())
            .block(Block::default().title(self.title.as_str()).borders(Borders::ALL))
            .highlight_style(
                Style::default()
                    .fg(Color::Cyan)
                    .add_modifier(Modifier::BOLD),
            )
            .select(self.current.unwrap_or(0));

        frame.render_widget(tabs, area);
    }

    fn render_status_bar(&self, frame: &mut Frame, area: Rect) {
        let chunks = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(60), Constraint::Percentage(40)])
            .split(area);

        if let Some(status) = &self.status {
            let status = Paragraph::new(status.as_str()).style(Style::default().fg(Color::Yellow));
            frame.render_widget(status, chunks[0]);
        }

        let help = Paragraph::new("Tab/Shift-Tab: Switch • F5: Refresh • q: Quit")
            .style(Style::default().fg(Color::DarkGray))
            .alignment(Alignment::Right);
        frame.render_widget(help, chunks[1]);
    }
}
