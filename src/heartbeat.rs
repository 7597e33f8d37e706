//! Heartbeat scheduling and liveness tracking.
//!
//! The monitor never reads the clock itself: `parse` marks activity as it
//! decodes and transmits, and the caller's event loop feeds an explicit
//! `Instant` into [`HeartbeatMonitor::tick`], which folds the marks into the
//! send/receive timelines and reports what is due. An outgoing heartbeat is
//! due after one interval of send-side silence; two intervals of
//! receive-side silence mean the peer is gone.

use std::time::{Duration, Instant};

/// What the connection should do after a tick.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HeartbeatDue {
    /// Nothing to do yet.
    Idle,
    /// One interval of send silence passed; transmit a heartbeat frame.
    Send,
    /// Twice the interval passed without any received frame; the
    /// connection is dead.
    Timeout,
}

/// Tracks last-seen and last-sent activity against a negotiated interval.
#[derive(Clone, Copy, Debug)]
pub struct HeartbeatMonitor {
    interval: Option<Duration>,
    last_sent: Instant,
    last_received: Instant,
    sent_since_tick: bool,
    received_since_tick: bool,
}

impl HeartbeatMonitor {
    /// Create a disarmed monitor; [`arm`](Self::arm) enables it.
    #[must_use]
    pub const fn new(now: Instant) -> Self {
        Self {
            interval: None,
            last_sent: now,
            last_received: now,
            sent_since_tick: false,
            received_since_tick: false,
        }
    }

    /// Arm the monitor with the tuned interval; 0 seconds disarms it.
    pub fn arm(&mut self, interval_secs: u16, now: Instant) {
        self.interval = if interval_secs == 0 {
            None
        } else {
            Some(Duration::from_secs(u64::from(interval_secs)))
        };
        self.last_sent = now;
        self.last_received = now;
    }

    /// Whether a non-zero interval is in force.
    #[must_use]
    pub const fn is_armed(&self) -> bool { self.interval.is_some() }

    /// Record that a frame (of any type) was received.
    ///
    /// Clock-free so the decode path never reads the time; the next tick
    /// resolves the mark against its `now`.
    pub fn mark_received(&mut self) { self.received_since_tick = true; }

    /// Record that a frame was transmitted.
    pub fn mark_sent(&mut self) { self.sent_since_tick = true; }

    /// Fold pending activity marks into the timelines and report what is due.
    pub fn tick(&mut self, now: Instant) -> HeartbeatDue {
        if self.received_since_tick {
            self.received_since_tick = false;
            self.last_received = now;
        }
        if self.sent_since_tick {
            self.sent_since_tick = false;
            self.last_sent = now;
        }
        let Some(interval) = self.interval else {
            return HeartbeatDue::Idle;
        };
        if now.saturating_duration_since(self.last_received) >= interval * 2 {
            return HeartbeatDue::Timeout;
        }
        if now.saturating_duration_since(self.last_sent) >= interval {
            return HeartbeatDue::Send;
        }
        HeartbeatDue::Idle
    }

    /// How long the receive side has been silent as of `now`.
    #[must_use]
    pub fn receive_silence(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_received)
    }

    /// The next instant at which [`tick`](Self::tick) can report work.
    ///
    /// `None` while the monitor is disarmed.
    #[must_use]
    pub fn next_deadline(&self) -> Option<Instant> {
        let interval = self.interval?;
        let send_due = self.last_sent + interval;
        let timeout_due = self.last_received + interval * 2;
        Some(send_due.min(timeout_due))
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use super::{HeartbeatDue, HeartbeatMonitor};

    fn armed(now: Instant) -> HeartbeatMonitor {
        let mut monitor = HeartbeatMonitor::new(now);
        monitor.arm(60, now);
        monitor
    }

    #[test]
    fn disarmed_monitor_never_fires() {
        let now = Instant::now();
        let mut monitor = HeartbeatMonitor::new(now);
        monitor.arm(0, now);
        assert!(!monitor.is_armed());
        assert_eq!(
            monitor.tick(now + Duration::from_secs(600)),
            HeartbeatDue::Idle
        );
        assert_eq!(monitor.next_deadline(), None);
    }

    #[test]
    fn send_is_due_after_one_interval_of_send_silence() {
        let now = Instant::now();
        let mut monitor = armed(now);
        assert_eq!(monitor.tick(now + Duration::from_secs(59)), HeartbeatDue::Idle);
        // Receive traffic keeps the peer alive but does not cover our side.
        monitor.mark_received();
        assert_eq!(monitor.tick(now + Duration::from_secs(61)), HeartbeatDue::Send);
    }

    #[test]
    fn sending_resets_the_send_timer() {
        let now = Instant::now();
        let mut monitor = armed(now);
        monitor.mark_sent();
        monitor.mark_received();
        monitor.tick(now + Duration::from_secs(50));
        assert_eq!(
            monitor.tick(now + Duration::from_secs(100)),
            HeartbeatDue::Idle
        );
    }

    #[test]
    fn silence_for_two_intervals_is_fatal() {
        let now = Instant::now();
        let mut monitor = armed(now);
        assert_eq!(
            monitor.tick(now + Duration::from_secs(119)),
            HeartbeatDue::Send
        );
        assert_eq!(
            monitor.tick(now + Duration::from_secs(120)),
            HeartbeatDue::Timeout
        );
    }

    #[test]
    fn any_received_frame_defers_the_timeout() {
        let now = Instant::now();
        let mut monitor = armed(now);
        monitor.mark_received();
        monitor.tick(now + Duration::from_secs(100));
        // Timeout now counts from the tick that observed the mark. Keep the
        // send side covered so only the receive timeout is under test.
        monitor.mark_sent();
        assert_eq!(
            monitor.tick(now + Duration::from_secs(219)),
            HeartbeatDue::Idle
        );
        monitor.mark_sent();
        assert_eq!(
            monitor.tick(now + Duration::from_secs(220)),
            HeartbeatDue::Timeout
        );
    }

    #[test]
    fn deadline_is_the_earlier_of_send_and_timeout() {
        let now = Instant::now();
        let monitor = armed(now);
        assert_eq!(monitor.next_deadline(), Some(now + Duration::from_secs(60)));
    }
}
