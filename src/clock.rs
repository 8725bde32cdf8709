//! Boundary-aligned rotation scheduling

use chrono::{DateTime, Duration as TimeDelta, Local, Timelike};
use crossbeam_channel::{bounded, select, Receiver, Sender};
use std::thread;
use std::time::Duration;

/// Rotation interval applied when the configured value is zero.
pub const DEFAULT_ROTATE_HOURS: u32 = 24;

fn effective_hours(rotate_hours: u32) -> i64 {
    if rotate_hours == 0 {
        i64::from(DEFAULT_ROTATE_HOURS)
    } else {
        i64::from(rotate_hours)
    }
}

/// Compute the next wall-clock boundary that is an exact multiple of the
/// rotation interval: truncate to the hour, advance one hour, then round up
/// to the next hour divisible by the interval. With H=6 this yields 00:00,
/// 06:00, 12:00 or 18:00, regardless of when the process started.
pub fn next_aligned(now: DateTime<Local>, rotate_hours: u32) -> DateTime<Local> {
    let hours = effective_hours(rotate_hours);

    let top_of_hour = now
        .with_minute(0)
        .and_then(|t| t.with_second(0))
        .and_then(|t| t.with_nanosecond(0))
        .map(|t| t + TimeDelta::hours(1));

    // Local-time arithmetic can fail around DST gaps; fall back to a plain
    // interval from now rather than panic.
    let Some(next) = top_of_hour else {
        return now + TimeDelta::hours(hours);
    };

    let rem = i64::from(next.hour()) % hours;
    if rem == 0 {
        next
    } else {
        next + TimeDelta::hours(hours - rem)
    }
}

/// Produces a tick at every aligned rotation boundary.
///
/// The first tick fires at the first boundary after construction, never
/// earlier. Ticks are delivered through a capacity-1 channel; if the consumer
/// has not polled since the last boundary, ticks coalesce. After each tick
/// the next boundary is recomputed from the current wall time, so the clock
/// stays aligned across system clock adjustments.
pub struct RotationClock {
    ticks: Receiver<DateTime<Local>>,
    stop: Sender<()>,
}

impl RotationClock {
    pub fn new(rotate_hours: u32) -> Self {
        let (tick_tx, tick_rx) = bounded(1);
        let (stop_tx, stop_rx) = bounded::<()>(1);

        thread::Builder::new()
            .name("logspool-clock".to_string())
            .spawn(move || Self::run(tick_tx, stop_rx, rotate_hours))
            .expect("failed to spawn rotation clock thread");

        Self {
            ticks: tick_rx,
            stop: stop_tx,
        }
    }

    fn run(tick_tx: Sender<DateTime<Local>>, stop_rx: Receiver<()>, rotate_hours: u32) {
        loop {
            let now = Local::now();
            let next = next_aligned(now, rotate_hours);
            let wait = (next - now).to_std().unwrap_or(Duration::ZERO);

            select! {
                recv(stop_rx) -> _ => return,
                default(wait) => {
                    let _ = tick_tx.try_send(Local::now());
                }
            }
        }
    }

    /// Non-blocking poll for a pending rotation signal.
    pub fn try_tick(&self) -> Option<DateTime<Local>> {
        self.ticks.try_recv().ok()
    }

    /// Cancel the background timer. Safe to call multiple times or never.
    pub fn stop(&self) {
        let _ = self.stop.try_send(());
    }
}

impl Drop for RotationClock {
    fn drop(&mut self) {
        self.stop();
    }
}
