//! Compiled-in tab modules

pub mod timer_reminder;

use crate::plugins::{TabRegistry, TabResult};

pub use timer_reminder::TimerReminderTab;

/// Registry holding every tab shipped with the application
pub fn builtin_registry() -> TabResult<TabRegistry> {
    let mut registry = TabRegistry::new();
    registry.register::<TimerReminderTab>("timer_reminder")?;
    Ok(registry)
}
