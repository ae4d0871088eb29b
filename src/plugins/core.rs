//! Core tab plugin traits and types
//!
//! This module defines the contract every tab must satisfy, the single
//! construction argument it receives, and the handle through which a tab
//! talks back to the window hosting it.

use crate::data::{DataError, SharedDataApi};

use async_trait::async_trait;
use chrono::NaiveDateTime;
use crossterm::event::KeyEvent;
use ratatui::layout::Rect;
use ratatui::Frame;
use std::any::Any;
use std::fmt;
use thiserror::Error;
use tokio::sync::mpsc;

/// Result type for tab operations
pub type TabResult<T> = Result<T, TabError>;

/// Tab-specific error types
#[derive(Debug, Error)]
pub enum TabError {
    #[error("{type_name} constructor must take only an optional parent: missing required argument `{argument}`")]
    MissingArgument {
        type_name: &'static str,
        argument: &'static str,
    },

    #[error("No registered tab factory `{0}`")]
    UnknownFactory(String),

    #[error("Tab factory already registered: {0}")]
    AlreadyRegistered(String),

    #[error("Invalid tab manifest: {0}")]
    Manifest(String),

    #[error("UI setup failed: {0}")]
    Setup(String),

    #[error("Data error: {0}")]
    Data(#[from] DataError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl TabError {
    /// Constructor contract violation for `type_name`
    pub fn missing_argument(type_name: &'static str, argument: &'static str) -> Self {
        TabError::MissingArgument { type_name, argument }
    }
}

/// Messages a tab can post to its host
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostMessage {
    /// Replace the status bar text
    Status(String),
    /// Raise a user-visible notification
    Notify { title: String, body: String },
}

/// Reference to the hosting window, handed to tabs at construction
#[derive(Clone)]
pub struct HostHandle {
    title: String,
    sender: mpsc::UnboundedSender<HostMessage>,
    data: Option<SharedDataApi>,
}

impl HostHandle {
    pub fn new(
        title: impl Into<String>,
        sender: mpsc::UnboundedSender<HostMessage>,
        data: Option<SharedDataApi>,
    ) -> Self {
        Self {
            title: title.into(),
            sender,
            data,
        }
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    /// The host's data API. Fails when the host was built before the data
    /// layer was initialised.
    pub fn data_api(&self) -> Result<SharedDataApi, DataError> {
        self.data.clone().ok_or(DataError::NotInitialized)
    }

    /// Post a message; silently dropped once the host is gone
    pub fn post(&self, message: HostMessage) {
        let _ = self.sender.send(message);
    }

    pub fn status(&self, text: impl Into<String>) {
        self.post(HostMessage::Status(text.into()));
    }

    pub fn notify(&self, title: impl Into<String>, body: impl Into<String>) {
        self.post(HostMessage::Notify {
            title: title.into(),
            body: body.into(),
        });
    }
}

impl fmt::Debug for HostHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostHandle")
            .field("title", &self.title)
            .field("has_data", &self.data.is_some())
            .finish()
    }
}

/// The one argument every tab constructor receives
#[derive(Debug, Clone, Default)]
pub struct TabContext {
    pub parent: Option<HostHandle>,
}

impl TabContext {
    pub fn new(parent: Option<HostHandle>) -> Self {
        Self { parent }
    }

    /// A context without a hosting window
    pub fn detached() -> Self {
        Self::default()
    }

    /// Data API reachable through the parent
    pub fn data_api(&self) -> Result<SharedDataApi, DataError> {
        self.parent
            .as_ref()
            .ok_or(DataError::NotInitialized)?
            .data_api()
    }
}

/// How a tab responded to a key press
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyOutcome {
    /// The tab consumed the key
    Handled,
    /// Pass the key on to the host's global bindings
    Ignored,
}

/// Contract every tab must implement
#[async_trait]
pub trait Tab: Send {
    /// Name shown in the host's tab bar
    fn display_name(&self) -> &str;

    /// Name of the implementing type, used in diagnostics
    fn type_name(&self) -> &'static str;

    /// Build the tab's widget state.
    /// Called once by the loader right after construction.
    fn setup_ui(&mut self) -> TabResult<()>;

    /// Draw the tab into `area`
    fn render(&self, frame: &mut Frame, area: Rect);

    /// Re-read whatever the tab displays
    async fn refresh(&mut self) -> TabResult<()> {
        Ok(())
    }

    /// Called when the tab becomes the selected one
    async fn on_activate(&mut self) -> TabResult<()> {
        Ok(())
    }

    /// Called when another tab takes over the selection
    async fn on_deactivate(&mut self) -> TabResult<()> {
        Ok(())
    }

    /// Cooperative timer tick from the host loop
    async fn tick(&mut self, _now: NaiveDateTime) -> TabResult<()> {
        Ok(())
    }

    /// Handle a key press while the tab is selected
    async fn handle_key(&mut self, _key: KeyEvent) -> TabResult<KeyOutcome> {
        Ok(KeyOutcome::Ignored)
    }

    /// Whether the tab currently wants every key (e.g. a modal dialog)
    fn captures_input(&self) -> bool {
        false
    }

    /// Get tab as Any trait object for downcasting
    fn as_any(&self) -> &dyn Any;

    /// Get mutable tab as Any trait object for downcasting
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Static side of the tab contract.
///
/// Registering a type through [`TabType`] ties the registry entry to a
/// constructor that takes exactly one [`TabContext`].
pub trait TabType: Tab + Sized + 'static {
    /// Implementing type's name
    const TYPE_NAME: &'static str;

    /// Name shown in the tab bar
    const DISPLAY_NAME: &'static str;

    /// Build the tab. Must not require anything beyond the context.
    fn construct(ctx: TabContext) -> TabResult<Self>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_argument_message_names_type() {
        let error = TabError::missing_argument("ReportTab", "config");
        let message = error.to_string();
        assert!(message.contains("ReportTab"));
        assert!(message.contains("`config`"));
    }

    #[test]
    fn test_detached_context_has_no_data() {
        let ctx = TabContext::detached();
        assert!(matches!(ctx.data_api(), Err(DataError::NotInitialized)));
    }

    #[test]
    fn test_host_handle_posts_messages() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let handle = HostHandle::new("Shell", tx, None);

        handle.status("ready");
        handle.notify("Reminder", "Time is up");

        assert_eq!(rx.try_recv().unwrap(), HostMessage::Status("ready".to_string()));
        assert_eq!(
            rx.try_recv().unwrap(),
            HostMessage::Notify {
                title: "Reminder".to_string(),
                body: "Time is up".to_string()
            }
        );
        assert!(matches!(handle.data_api(), Err(DataError::NotInitialized)));
    }
}
