//! Timer reminder tab: rule editor, countdown and reminder popup
//!
//! The tab edits a pending rule through three numeric inputs, confirms it
//! into the evaluator and checks for a trigger on every host tick while it
//! is the selected tab.

use super::logic::{TimeRule, TimerReminderLogic};
use crate::plugins::{KeyOutcome, Tab, TabContext, TabError, TabResult, TabType};

use async_trait::async_trait;
use chrono::{Local, NaiveDateTime};
use crossterm::event::{KeyCode, KeyEvent};
use ratatui::{
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Paragraph},
    Frame,
};
use std::any::Any;
use tracing::{debug, info};

/// Which rule input has the cursor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleInput {
    Cycle,
    Remainder,
    Second,
}

impl RuleInput {
    const ALL: [RuleInput; 3] = [RuleInput::Cycle, RuleInput::Remainder, RuleInput::Second];

    fn label(self) -> &'static str {
        match self {
            RuleInput::Cycle => "Minute cycle",
            RuleInput::Remainder => "Minute remainder",
            RuleInput::Second => "Trigger second",
        }
    }

    fn range(self) -> (i64, i64) {
        match self {
            RuleInput::Cycle => (1, 1440),
            RuleInput::Remainder => (0, 1439),
            RuleInput::Second => (0, 59),
        }
    }

    fn index(self) -> usize {
        match self {
            RuleInput::Cycle => 0,
            RuleInput::Remainder => 1,
            RuleInput::Second => 2,
        }
    }

    fn next(self) -> Self {
        Self::ALL[(self.index() + 1) % Self::ALL.len()]
    }

    fn previous(self) -> Self {
        Self::ALL[(self.index() + Self::ALL.len() - 1) % Self::ALL.len()]
    }
}

/// Timer reminder page: configures a time rule and pops up a reminder
/// whenever it fires.
pub struct TimerReminderTab {
    ctx: TabContext,
    logic: Option<TimerReminderLogic>,
    inputs: [i64; 3],
    selected: RuleInput,
    /// Clock and trigger checks run only while the tab is active
    timers_running: bool,
    /// Second at which the open reminder fired
    reminder: Option<NaiveDateTime>,
    now: NaiveDateTime,
    ui_ready: bool,
}

impl TimerReminderTab {
    pub fn logic(&self) -> Option<&TimerReminderLogic> {
        self.logic.as_ref()
    }

    pub fn input_value(&self, input: RuleInput) -> i64 {
        self.inputs[input.index()]
    }

    pub fn selected_input(&self) -> RuleInput {
        self.selected
    }

    pub fn timers_running(&self) -> bool {
        self.timers_running
    }

    pub fn reminder_open(&self) -> bool {
        self.reminder.is_some()
    }

    fn input_rule(&self) -> TimeRule {
        TimeRule::new(self.inputs[0], self.inputs[1], self.inputs[2])
    }

    /// Lazily build the evaluator through the host's data API
    async fn ensure_logic(&mut self) -> TabResult<&mut TimerReminderLogic> {
        if self.logic.is_none() {
            let data = self.ctx.data_api()?;
            self.logic = Some(TimerReminderLogic::new(data).await?);
        }
        self.logic
            .as_mut()
            .ok_or_else(|| TabError::Setup("timer reminder state unavailable".to_string()))
    }

    fn sync_inputs_with_rule(&mut self) {
        if let Some(rule) = self.logic.as_ref().and_then(|logic| logic.active_rule()) {
            self.inputs = [
                rule.minute_cycle() as i64,
                rule.minute_remainder() as i64,
                rule.second() as i64,
            ];
        }
    }

    fn status(&self, text: impl Into<String>) {
        if let Some(parent) = &self.ctx.parent {
            parent.status(text);
        }
    }

    async fn adjust_selected(&mut self, delta: i64) -> TabResult<()> {
        let input = self.selected;
        let (min, max) = input.range();
        let value = &mut self.inputs[input.index()];
        let adjusted = (*value + delta).clamp(min, max);
        if adjusted == *value {
            return Ok(());
        }
        *value = adjusted;

        let rule = self.input_rule();
        self.ensure_logic().await?.set_pending_rule(rule);
        Ok(())
    }

    async fn confirm(&mut self) -> TabResult<()> {
        let rule = self.input_rule();
        let logic = self.ensure_logic().await?;
        logic.set_pending_rule(rule);

        if logic.confirm_rule().await? {
            self.status(format!("Trigger rule updated: {}", rule.describe()));
        } else {
            self.status("Could not confirm the trigger rule");
        }
        Ok(())
    }

    async fn cancel_pending(&mut self) -> TabResult<()> {
        self.ensure_logic().await?.cancel_pending_rule();
        self.sync_inputs_with_rule();
        self.status("Pending rule discarded");
        Ok(())
    }

    async fn toggle_running(&mut self) -> TabResult<()> {
        let logic = self.ensure_logic().await?;
        let was_running = logic.is_running();
        let running = logic.toggle().await?;

        if running {
            self.status("Timer reminder running");
        } else if was_running {
            self.status("Timer reminder paused");
        } else {
            self.status("Confirm a trigger rule before starting");
        }
        Ok(())
    }

    fn show_reminder(&mut self, now: NaiveDateTime) {
        info!("Timer reminder fired at {}", now.format("%H:%M:%S"));
        self.reminder = Some(now);
        if let Some(parent) = &self.ctx.parent {
            parent.notify(
                "Reminder!",
                format!("Time trigger reached at {}", now.format("%H:%M:%S")),
            );
        }
    }

    fn render_clock(&self, frame: &mut Frame, area: Rect) {
        let clock = Paragraph::new(vec![
            Line::from(self.now.format("%Y-%m-%d").to_string()),
            Line::from(Span::styled(
                self.now.format("%H:%M:%S").to_string(),
                Style::default().add_modifier(Modifier::BOLD),
            )),
        ])
        .block(Block::default().title("Current Time").borders(Borders::ALL))
        .alignment(Alignment::Center);

        frame.render_widget(clock, area);
    }

    fn render_status(&self, frame: &mut Frame, area: Rect) {
        let running = self.logic.as_ref().map_or(false, |logic| logic.is_running());
        let (text, color) = if running {
            ("Running", Color::Green)
        } else {
            ("Paused", Color::DarkGray)
        };

        let status = Paragraph::new(Line::from(vec![
            Span::styled(
                text,
                Style::default().fg(color).add_modifier(Modifier::BOLD),
            ),
            Span::raw(if running { "  [Space] stop" } else { "  [Space] start" }),
        ]))
        .block(Block::default().title("Status").borders(Borders::ALL))
        .alignment(Alignment::Center);

        frame.render_widget(status, area);
    }

    fn render_inputs(&self, frame: &mut Frame, area: Rect) {
        let mut lines: Vec<Line> = RuleInput::ALL
            .iter()
            .map(|&input| {
                let selected = input == self.selected;
                let marker = if selected { "> " } else { "  " };
                let style = if selected {
                    Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD)
                } else {
                    Style::default()
                };
                Line::from(vec![
                    Span::raw(marker),
                    Span::raw(format!("{:<18}", format!("{}:", input.label()))),
                    Span::styled(format!("{:>5}", self.input_value(input)), style),
                ])
            })
            .collect();
        lines.push(Line::from(Span::styled(
            "Fires when minute % cycle = remainder and second = trigger second",
            Style::default().fg(Color::DarkGray),
        )));

        let inputs = Paragraph::new(lines)
            .block(Block::default().title("Trigger Rule").borders(Borders::ALL));

        frame.render_widget(inputs, area);
    }

    fn render_rules(&self, frame: &mut Frame, area: Rect) {
        let active = self
            .logic
            .as_ref()
            .and_then(|logic| logic.active_rule())
            .map_or_else(|| "not configured".to_string(), |rule| rule.describe());
        let pending = self.logic.as_ref().and_then(|logic| logic.pending_rule());

        let pending_line = match pending {
            Some(rule) => Line::from(Span::styled(
                format!("Pending rule: {} (not applied)", rule.describe()),
                Style::default().fg(Color::Yellow),
            )),
            None => Line::from(Span::styled(
                "Pending rule: none",
                Style::default().fg(Color::DarkGray),
            )),
        };

        let rules = Paragraph::new(vec![
            Line::from(format!("Active rule: {}", active)),
            pending_line,
        ])
        .block(Block::default().title("Rule State").borders(Borders::ALL))
        .alignment(Alignment::Center);

        frame.render_widget(rules, area);
    }

    fn render_next_trigger(&self, frame: &mut Frame, area: Rect) {
        let (text, color) = match &self.logic {
            Some(logic) => {
                let remaining = logic
                    .next_trigger_time(self.now)
                    .map(|next| (next - self.now).num_seconds());
                let color = match remaining {
                    Some(seconds) if seconds < 10 => Color::Red,
                    Some(seconds) if seconds < 60 => Color::Yellow,
                    _ => Color::Blue,
                };
                (logic.next_trigger_display(self.now), color)
            }
            None => ("No trigger rule configured".to_string(), Color::Blue),
        };

        let next = Paragraph::new(Span::styled(
            text,
            Style::default().fg(color).add_modifier(Modifier::BOLD),
        ))
        .block(Block::default().title("Next Trigger").borders(Borders::ALL))
        .alignment(Alignment::Center);

        frame.render_widget(next, area);
    }

    fn render_reminder(&self, frame: &mut Frame, area: Rect, fired_at: NaiveDateTime) {
        let popup = centered_rect(50, 7, area);
        frame.render_widget(Clear, popup);

        let reminder = Paragraph::new(vec![
            Line::from(Span::styled(
                "Time trigger reached!",
                Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
            )),
            Line::from(fired_at.format("%H:%M:%S").to_string()),
            Line::from(""),
            Line::from("Press Enter to dismiss"),
        ])
        .block(
            Block::default()
                .title("Reminder!")
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::Red)),
        )
        .alignment(Alignment::Center);

        frame.render_widget(reminder, popup);
    }
}

#[async_trait]
impl Tab for TimerReminderTab {
    fn display_name(&self) -> &str {
        Self::DISPLAY_NAME
    }

    fn type_name(&self) -> &'static str {
        Self::TYPE_NAME
    }

    fn setup_ui(&mut self) -> TabResult<()> {
        self.inputs = [1, 0, 0];
        self.selected = RuleInput::Cycle;
        self.ui_ready = true;
        Ok(())
    }

    fn render(&self, frame: &mut Frame, area: Rect) {
        if !self.ui_ready {
            return;
        }

        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(4), // Clock
                Constraint::Length(3), // Status
                Constraint::Length(6), // Rule inputs
                Constraint::Length(4), // Rule state
                Constraint::Length(3), // Next trigger
                Constraint::Min(1),    // Help
            ])
            .split(area);

        self.render_clock(frame, chunks[0]);
        self.render_status(frame, chunks[1]);
        self.render_inputs(frame, chunks[2]);
        self.render_rules(frame, chunks[3]);
        self.render_next_trigger(frame, chunks[4]);

        let help = Paragraph::new(
            "↑/↓: Select  ←/→: Adjust  Enter: Confirm  x: Cancel pending  Space: Start/Stop",
        )
        .style(Style::default().fg(Color::DarkGray))
        .alignment(Alignment::Center);
        frame.render_widget(help, chunks[5]);

        if let Some(fired_at) = self.reminder {
            self.render_reminder(frame, area, fired_at);
        }
    }

    async fn on_activate(&mut self) -> TabResult<()> {
        self.ensure_logic().await?.load_from_db().await?;
        self.sync_inputs_with_rule();
        self.now = Local::now().naive_local();
        self.timers_running = true;
        debug!("Timer reminder tab activated");
        Ok(())
    }

    async fn on_deactivate(&mut self) -> TabResult<()> {
        self.timers_running = false;
        debug!("Timer reminder tab deactivated");
        Ok(())
    }

    async fn tick(&mut self, now: NaiveDateTime) -> TabResult<()> {
        if !self.timers_running {
            return Ok(());
        }
        self.now = now;

        // Checks stay suspended while a reminder is on screen
        if self.reminder.is_some() {
            return Ok(());
        }

        let fired = self
            .logic
            .as_mut()
            .map_or(false, |logic| logic.check_trigger(now));
        if fired {
            self.show_reminder(now);
        }
        Ok(())
    }

    async fn handle_key(&mut self, key: KeyEvent) -> TabResult<KeyOutcome> {
        if self.reminder.is_some() {
            if matches!(key.code, KeyCode::Enter | KeyCode::Esc) {
                self.reminder = None;
            }
            return Ok(KeyOutcome::Handled);
        }

        match key.code {
            KeyCode::Up => self.selected = self.selected.previous(),
            KeyCode::Down => self.selected = self.selected.next(),
            KeyCode::Left | KeyCode::Char('-') => self.adjust_selected(-1).await?,
            KeyCode::Right | KeyCode::Char('+') | KeyCode::Char('=') => {
                self.adjust_selected(1).await?
            }
            KeyCode::Enter => self.confirm().await?,
            KeyCode::Char('x') => self.cancel_pending().await?,
            KeyCode::Char(' ') | KeyCode::Char('s') => self.toggle_running().await?,
            _ => return Ok(KeyOutcome::Ignored),
        }
        Ok(KeyOutcome::Handled)
    }

    fn captures_input(&self) -> bool {
        self.reminder.is_some()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

impl TabType for TimerReminderTab {
    const TYPE_NAME: &'static str = "TimerReminderTab";
    const DISPLAY_NAME: &'static str = "Timer Reminder";

    fn construct(ctx: TabContext) -> TabResult<Self> {
        Ok(Self {
            ctx,
            logic: None,
            inputs: [1, 0, 0],
            selected: RuleInput::Cycle,
            timers_running: false,
            reminder: None,
            now: Local::now().naive_local(),
            ui_ready: false,
        })
    }
}

/// Fixed-height rectangle centred in `area`, `percent_x` wide
fn centered_rect(percent_x: u16, height: u16, area: Rect) -> Rect {
    let percent_x = percent_x.min(100);
    let height = height.min(area.height);
    let row = Rect {
        y: area.y + (area.height - height) / 2,
        height,
        ..area
    };

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(row)[1]
}
