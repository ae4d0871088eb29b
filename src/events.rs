use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

use crate::plugins::KeyOutcome;
use crate::ui::MainWindow;

pub struct EventHandler {
    should_quit: bool,
}

/// Result of handling a key event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventResult {
    Continue,
    Quit,
}

impl EventHandler {
    pub fn new() -> Self {
        Self { should_quit: false }
    }

    pub fn should_quit(&self) -> bool {
        self.should_quit
    }

    /// Route a key: the selected tab sees it first, then the global bindings
    pub async fn handle_key_event(&mut self, key: KeyEvent, window: &mut MainWindow) -> EventResult {
        if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
            return self.quit();
        }

        // Modal dialogs keep every key
        if window.current_captures_input() {
            window.handle_key(key).await;
            return EventResult::Continue;
        }

        if window.handle_key(key).await == KeyOutcome::Handled {
            return EventResult::Continue;
        }

        match key.code {
            KeyCode::Char('q') | KeyCode::Char('Q') => return self.quit(),
            KeyCode::Tab => window.next_tab().await,
            KeyCode::BackTab => window.previous_tab().await,
            KeyCode::F(5) => window.refresh_current().await,
            KeyCode::Char(c @ '1'..='9') => {
                let index = c as usize - '1' as usize;
                window.set_current_index(index).await;
            }
            _ => {}
        }
        EventResult::Continue
    }

    fn quit(&mut self) -> EventResult {
        self.should_quit = true;
        EventResult::Quit
    }
}

impl Default for EventHandler {
    fn default() -> Self {
        Self::new()
    }
}
