//! Desktop notifications for reminders raised by tabs

use notify_rust::{Notification, Timeout, Urgency};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Minimum gap between two identical notifications
const REPEAT_INTERVAL: Duration = Duration::from_secs(10);

/// Sends native desktop notifications through notify-rust
pub struct DesktopNotifier {
    enabled: bool,
    app_name: String,
    last_sent: HashMap<String, Instant>,
}

impl DesktopNotifier {
    pub fn new(app_name: impl Into<String>) -> Self {
        Self {
            enabled: true,
            app_name: app_name.into(),
            last_sent: HashMap::new(),
        }
    }

    /// A notifier that only logs
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::new("deskshell")
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Show a notification. Returns whether one was handed to the desktop.
    pub async fn notify(&mut self, title: &str, body: &str) -> bool {
        if !self.enabled {
            debug!("Desktop notifications disabled: {} - {}", title, body);
            return false;
        }
        if !self.should_send(title, body, Instant::now()) {
            debug!("Rate limiting notification: {}", title);
            return false;
        }

        let mut notification = Notification::new();
        notification
            .appname(&self.app_name)
            .summary(title)
            .body(body)
            .timeout(Timeout::Milliseconds(10000))
            .urgency(Urgency::Critical);

        // show() talks to the notification daemon synchronously
        let result = tokio::task::spawn_blocking(move || notification.show().map(|_| ())).await;
        match result {
            Ok(Ok(())) => {
                debug!("Desktop notification sent: {}", title);
                true
            }
            Ok(Err(e)) => {
                warn!("Failed to send desktop notification '{}': {}", title, e);
                info!("Notification (fallback): {} - {}", title, body);
                false
            }
            Err(e) => {
                warn!("Notification task failed: {}", e);
                false
            }
        }
    }

    fn should_send(&mut self, title: &str, body: &str, now: Instant) -> bool {
        self.last_sent
            .retain(|_, sent| now.saturating_duration_since(*sent) < REPEAT_INTERVAL);

        let key = format!("{}:{}", title, body);
        if self.last_sent.contains_key(&key) {
            return false;
        }
        self.last_sent.insert(key, now);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_disabled_notifier_sends_nothing() {
        let mut notifier = DesktopNotifier::disabled();
        assert!(!notifier.is_enabled());
        assert!(!notifier.notify("Reminder!", "now").await);
    }

    #[test]
    fn test_identical_notifications_are_rate_limited() {
        let mut notifier = DesktopNotifier::new("test");
        let start = Instant::now();

        assert!(notifier.should_send("Reminder!", "09:10:00", start));
        assert!(!notifier.should_send("Reminder!", "09:10:00", start + Duration::from_secs(1)));
        assert!(notifier.should_send("Reminder!", "09:11:00", start + Duration::from_secs(1)));
        assert!(notifier.should_send("Reminder!", "09:10:00", start + REPEAT_INTERVAL));
    }

    #[test]
    fn test_expired_entries_are_forgotten() {
        let mut notifier = DesktopNotifier::new("test");
        let start = Instant::now();

        for second in 0..5u64 {
            let body = format!("09:10:0{}", second);
            assert!(notifier.should_send("Reminder!", &body, start + Duration::from_secs(second)));
        }
        assert_eq!(notifier.last_sent.len(), 5);

        let later = start + Duration::from_secs(4) + REPEAT_INTERVAL;
        assert!(notifier.should_send("Reminder!", "09:20:00", later));
        assert_eq!(notifier.last_sent.len(), 1);
    }
}
