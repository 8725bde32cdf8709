//! Error-burst detection and notification dispatch
//!
//! A sliding-window counter over records at or above a severity threshold.
//! When the window holds at least `threshold` records, one notification is
//! sent and a cooldown suppresses further firings. The window is not reset
//! on firing, so a persistent error storm keeps counting while the cooldown
//! bounds the notification rate.

use crate::config::AlertConfig;
use crate::record::{Level, LogRecord};
use chrono::{DateTime, Duration as TimeDelta, Local};
use std::sync::{Arc, Mutex};

/// At most this many of the newest window records go into a digest.
pub const DIGEST_RECORD_LIMIT: usize = 15;

/// Downstream delivery of a rendered alert. Fire-and-forget: delivery
/// failures stay inside the transport and never reach the logging path.
pub trait NotifySink: Send + Sync {
    fn send(&self, title: &str, body: &str);
}

struct Window {
    /// Records at or above the threshold level, in non-decreasing time order.
    records: Vec<LogRecord>,
    /// Earliest instant the next notification may fire.
    next_notify: Option<DateTime<Local>>,
}

/// Sliding-window alert policy over a record stream.
pub struct AlertAggregator {
    name: String,
    level: Level,
    threshold: usize,
    evaluate_period: TimeDelta,
    notify_period: TimeDelta,
    notify: Arc<dyn NotifySink>,
    window: Mutex<Window>,
}

impl AlertAggregator {
    pub fn new(config: &AlertConfig, notify: Arc<dyn NotifySink>) -> Self {
        Self {
            name: config.name.clone(),
            level: config.level,
            threshold: config.threshold,
            evaluate_period: TimeDelta::seconds(config.evaluate_period_secs as i64),
            notify_period: TimeDelta::seconds(config.notify_period_secs as i64),
            notify,
            window: Mutex::new(Window {
                records: Vec::new(),
                next_notify: None,
            }),
        }
    }

    /// Inspect one record: append, prune the window, and fire a notification
    /// if the burst threshold is reached outside the cooldown.
    pub fn observe(&self, record: &LogRecord) {
        self.observe_at(Local::now(), record);
    }

    pub(crate) fn observe_at(&self, now: DateTime<Local>, record: &LogRecord) {
        if record.level < self.level {
            return;
        }

        // Append, prune, check and arm the cooldown under one lock; the
        // rendered digest is carried out and sent with the lock released so
        // a slow transport never blocks record ingestion.
        let digest = {
            let mut window = self.window.lock().unwrap();
            window.records.push(record.clone());

            let cutoff = now - self.evaluate_period;
            let keep_from = window.records.partition_point(|r| r.time <= cutoff);
            window.records.drain(..keep_from);

            let due = window.next_notify.map_or(true, |t| now >= t);
            if window.records.len() >= self.threshold && due {
                window.next_notify = Some(now + self.notify_period);
                Some(render_digest(&window.records))
            } else {
                None
            }
        };

        if let Some(body) = digest {
            self.notify.send(&format!("{} [alert]", self.name), &body);
        }
    }
}

/// Render the newest window records into a human-readable digest, one line
/// per record, bounded to [`DIGEST_RECORD_LIMIT`].
fn render_digest(records: &[LogRecord]) -> String {
    let skip = records.len().saturating_sub(DIGEST_RECORD_LIMIT);
    let mut body = String::new();
    for record in &records[skip..] {
        body.push_str(&record.render_line());
        body.push('\n');
    }
    body
}
