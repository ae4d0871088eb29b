//! Timer reminder tab
//!
//! [`TimerReminderLogic`] owns the rule state machine and its persistence;
//! [`TimerReminderTab`] only draws it and turns key presses into calls on it.

pub mod logic;
pub mod tab;

pub use logic::{TimeRule, TimerReminderLogic, TimerStatus};
pub use tab::{RuleInput, TimerReminderTab};
