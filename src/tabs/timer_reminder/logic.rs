//! Time-rule evaluation and persisted reminder state
//!
//! A rule fires when `minute % minute_cycle == minute_remainder` and the
//! second matches exactly. The evaluator keeps two rule slots: an in-memory
//! pending rule being edited and the active rule that is persisted and used
//! for triggering.

use crate::data::{field_bool, field_i64, DataResult, Record, SharedDataApi};
use crate::record;

use chrono::{Duration, NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

const MAX_SECOND: i64 = 59;

/// Minute/second trigger rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRule {
    minute_cycle: u32,
    minute_remainder: u32,
    second: u32,
}

impl TimeRule {
    /// Build a normalised rule.
    ///
    /// The cycle is clamped to at least 1, the remainder to at least 0 and
    /// then reduced modulo the cycle, and the second into `0..=59`.
    pub fn new(minute_cycle: i64, minute_remainder: i64, second: i64) -> Self {
        let minute_cycle = minute_cycle.clamp(1, u32::MAX as i64);
        let minute_remainder = minute_remainder.max(0) % minute_cycle;
        let second = second.clamp(0, MAX_SECOND);

        Self {
            minute_cycle: minute_cycle as u32,
            minute_remainder: minute_remainder as u32,
            second: second as u32,
        }
    }

    pub fn minute_cycle(&self) -> u32 {
        self.minute_cycle
    }

    pub fn minute_remainder(&self) -> u32 {
        self.minute_remainder
    }

    pub fn second(&self) -> u32 {
        self.second
    }

    pub fn is_match(&self, now: NaiveDateTime) -> bool {
        now.minute() % self.minute_cycle == self.minute_remainder && now.second() == self.second
    }

    /// Earliest matching instant strictly later than `after`.
    ///
    /// Matching only depends on minute-of-hour, so one hour plus one minute
    /// of candidates covers every case. `None` when no minute of the hour
    /// can satisfy the remainder.
    pub fn next_trigger_after(&self, after: NaiveDateTime) -> Option<NaiveDateTime> {
        let base = after.with_nanosecond(0)?.with_second(self.second)?;

        (0..=60)
            .map(|step| base + Duration::minutes(step))
            .find(|candidate| *candidate > after && self.is_match(*candidate))
    }

    pub fn to_record(&self) -> Record {
        record! {
            "minute_cycle" => self.minute_cycle,
            "minute_remainder" => self.minute_remainder,
            "second" => self.second,
        }
    }

    /// Read a rule from a stored record, normalising whatever is found
    pub fn from_record(record: &Record) -> Self {
        Self::new(
            field_i64(record, "minute_cycle").unwrap_or(1),
            field_i64(record, "minute_remainder").unwrap_or(0),
            field_i64(record, "second").unwrap_or(0),
        )
    }

    /// Short human-readable form
    pub fn describe(&self) -> String {
        format!(
            "cycle={}, remainder={}, second={}",
            self.minute_cycle, self.minute_remainder, self.second
        )
    }
}

impl Default for TimeRule {
    fn default() -> Self {
        Self::new(1, 0, 0)
    }
}

/// Serialisable snapshot of the evaluator
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TimerStatus {
    pub is_running: bool,
    pub has_active_rule: bool,
    pub has_pending_rule: bool,
    pub active_rule: Option<TimeRule>,
    pub pending_rule: Option<TimeRule>,
    pub next_trigger_time: Option<String>,
}

/// Reminder state machine backed by the data API
pub struct TimerReminderLogic {
    data: SharedDataApi,
    is_running: bool,
    pending_rule: Option<TimeRule>,
    active_rule: Option<TimeRule>,
    /// Second of the last firing
    last_trigger: Option<NaiveDateTime>,
}

impl TimerReminderLogic {
    pub const ENTITY_NAME: &'static str = "TimerReminderEntity";
    pub const ENTITY_ID: i64 = 1;

    /// Create the evaluator and make sure its state row exists
    pub async fn new(data: SharedDataApi) -> DataResult<Self> {
        let logic = Self {
            data,
            is_running: false,
            pending_rule: None,
            active_rule: None,
            last_trigger: None,
        };
        logic.ensure_record().await?;
        Ok(logic)
    }

    async fn ensure_record(&self) -> DataResult<()> {
        if self.data.get(Self::ENTITY_NAME, Self::ENTITY_ID).await?.is_some() {
            return Ok(());
        }

        let mut fields = TimeRule::default().to_record();
        fields.insert("id".to_string(), Self::ENTITY_ID.into());
        fields.insert("is_active".to_string(), false.into());
        fields.insert("is_running".to_string(), false.into());
        self.data.create(Self::ENTITY_NAME, fields).await?;
        info!("Created timer reminder state row");
        Ok(())
    }

    /// Restore the active rule and running flag from storage
    pub async fn load_from_db(&mut self) -> DataResult<()> {
        let Some(record) = self.data.get(Self::ENTITY_NAME, Self::ENTITY_ID).await? else {
            warn!("Timer reminder state row is missing");
            return Ok(());
        };

        if field_bool(&record, "is_active").unwrap_or(false) {
            self.active_rule = Some(TimeRule::from_record(&record));
        }
        self.is_running = field_bool(&record, "is_running").unwrap_or(false);
        debug!(
            "Loaded timer state: active={:?} running={}",
            self.active_rule, self.is_running
        );
        Ok(())
    }

    async fn save(&self) -> DataResult<()> {
        let mut fields = self.active_rule.unwrap_or_default().to_record();
        fields.insert("is_active".to_string(), self.active_rule.is_some().into());
        fields.insert("is_running".to_string(), self.is_running.into());

        if !self
            .data
            .update(Self::ENTITY_NAME, Self::ENTITY_ID, fields)
            .await?
        {
            warn!("Timer reminder state row vanished; state not persisted");
        }
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.is_running
    }

    pub fn has_active_rule(&self) -> bool {
        self.active_rule.is_some()
    }

    pub fn has_pending_rule(&self) -> bool {
        self.pending_rule.is_some()
    }

    pub fn active_rule(&self) -> Option<TimeRule> {
        self.active_rule
    }

    pub fn pending_rule(&self) -> Option<TimeRule> {
        self.pending_rule
    }

    pub fn set_pending_rule(&mut self, rule: TimeRule) {
        self.pending_rule = Some(rule);
    }

    /// Promote the pending rule. Returns `false` when nothing was pending.
    pub async fn confirm_rule(&mut self) -> DataResult<bool> {
        let Some(rule) = self.pending_rule.take() else {
            return Ok(false);
        };

        self.active_rule = Some(rule);
        self.last_trigger = None;
        self.save().await?;
        info!("Timer rule confirmed: {}", rule.describe());
        Ok(true)
    }

    pub fn cancel_pending_rule(&mut self) {
        self.pending_rule = None;
    }

    /// Start triggering. Requires an active rule.
    pub async fn start(&mut self) -> DataResult<bool> {
        if self.active_rule.is_none() {
            return Ok(false);
        }

        self.is_running = true;
        self.save().await?;
        Ok(true)
    }

    pub async fn stop(&mut self) -> DataResult<()> {
        self.is_running = false;
        self.save().await
    }

    /// Flip the running state and return the new one
    pub async fn toggle(&mut self) -> DataResult<bool> {
        if self.is_running {
            self.stop().await?;
        } else {
            self.start().await?;
        }
        Ok(self.is_running)
    }

    /// Whether the reminder fires at `now`. Fires at most once per second.
    pub fn check_trigger(&mut self, now: NaiveDateTime) -> bool {
        let Some(rule) = self.active_rule else {
            return false;
        };
        if !self.is_running || !rule.is_match(now) {
            return false;
        }

        let second = now.with_nanosecond(0).unwrap_or(now);
        if self.last_trigger == Some(second) {
            return false;
        }

        self.last_trigger = Some(second);
        true
    }

    pub fn next_trigger_time(&self, after: NaiveDateTime) -> Option<NaiveDateTime> {
        self.active_rule?.next_trigger_after(after)
    }

    pub fn status_info(&self, now: NaiveDateTime) -> TimerStatus {
        TimerStatus {
            is_running: self.is_running,
            has_active_rule: self.has_active_rule(),
            has_pending_rule: self.has_pending_rule(),
            active_rule: self.active_rule,
            pending_rule: self.pending_rule,
            next_trigger_time: self
                .next_trigger_time(now)
                .map(|time| time.format("%Y-%m-%dT%H:%M:%S").to_string()),
        }
    }

    /// Countdown text for the next trigger
    pub fn next_trigger_display(&self, now: NaiveDateTime) -> String {
        if self.active_rule.is_none() {
            return "No trigger rule configured".to_string();
        }
        let Some(next) = self.next_trigger_time(now) else {
            return "No matching time".to_string();
        };

        format_countdown((next - now).num_seconds(), next)
    }
}

fn format_countdown(total_seconds: i64, next: NaiveDateTime) -> String {
    if total_seconds <= 0 {
        return format!("Triggering now ({})", next.format("%H:%M:%S"));
    }

    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;
    let at = next.format("%H:%M:%S");

    if hours > 0 {
        format!("{}h {}m {}s ({})", hours, minutes, seconds, at)
    } else if minutes > 0 {
        format!("{}m {}s ({})", minutes, seconds, at)
    } else {
        format!("{}s ({})", seconds, at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(hour: u32, minute: u32, second: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 15)
            .unwrap()
            .and_hms_opt(hour, minute, second)
            .unwrap()
    }

    #[test]
    fn test_rule_normalisation() {
        let rule = TimeRule::new(0, -3, 75);
        assert_eq!(rule.minute_cycle(), 1);
        assert_eq!(rule.minute_remainder(), 0);
        assert_eq!(rule.second(), 59);

        let rule = TimeRule::new(5, 12, -1);
        assert_eq!(rule.minute_remainder(), 2);
        assert_eq!(rule.second(), 0);
    }

    #[test]
    fn test_rule_matching() {
        let rule = TimeRule::new(5, 2, 30);
        assert!(rule.is_match(at(14, 2, 30)));
        assert!(rule.is_match(at(14, 7, 30)));
        assert!(!rule.is_match(at(14, 3, 30)));
        assert!(!rule.is_match(at(14, 2, 31)));
    }

    #[test]
    fn test_next_trigger_rolls_over_hour_and_day() {
        let rule = TimeRule::new(5, 2, 30);
        assert_eq!(rule.next_trigger_after(at(14, 2, 10)), Some(at(14, 2, 30)));
        assert_eq!(rule.next_trigger_after(at(14, 2, 30)), Some(at(14, 7, 30)));
        assert_eq!(rule.next_trigger_after(at(14, 58, 0)), Some(at(15, 2, 30)));

        let next = rule.next_trigger_after(at(23, 59, 59)).unwrap();
        assert_eq!(next.date(), NaiveDate::from_ymd_opt(2024, 3, 16).unwrap());
        assert_eq!((next.hour(), next.minute(), next.second()), (0, 2, 30));
    }

    #[test]
    fn test_next_trigger_unreachable_remainder() {
        let rule = TimeRule::new(120, 90, 0);
        assert_eq!(rule.next_trigger_after(at(10, 0, 0)), None);
    }

    #[test]
    fn test_rule_record_round_trip() {
        let rule = TimeRule::new(15, 4, 45);
        assert_eq!(TimeRule::from_record(&rule.to_record()), rule);
        assert_eq!(TimeRule::from_record(&Record::new()), TimeRule::default());
    }

    #[test]
    fn test_countdown_format() {
        let next = at(15, 4, 5);
        assert_eq!(format_countdown(3723, next), "1h 2m 3s (15:04:05)");
        assert_eq!(format_countdown(125, next), "2m 5s (15:04:05)");
        assert_eq!(format_countdown(9, next), "9s (15:04:05)");
        assert_eq!(format_countdown(0, next), "Triggering now (15:04:05)");
    }
}
