//! Heartbeat bookkeeping
//!
//! Pure timer state: the session loop asks for the next deadline and reports
//! sends and acks. No task of its own, so the sequence number is only ever
//! read by the loop that writes it.

use std::time::Duration;
use tokio::time::Instant;
use tracing::trace;

/// What to do when the heartbeat deadline passes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BeatDue {
    Send,
    /// The previous heartbeat was never acknowledged
    Zombied,
}

#[derive(Debug)]
pub(crate) struct Heartbeater {
    interval: Duration,
    ack_timeout: Duration,
    next_beat: Instant,
    /// Set while a heartbeat is waiting for its ack
    sent_at: Option<Instant>,
    latency: Option<Duration>,
}

impl Heartbeater {
    /// First beat goes out after `interval * jitter`
    pub(crate) fn new(interval: Duration, ack_timeout: Duration, jitter: f64) -> Self {
        let first = interval.mul_f64(jitter.clamp(0.0, 1.0));
        trace!(
            interval_ms = interval.as_millis() as u64,
            first_ms = first.as_millis() as u64,
            "Heartbeat timer started"
        );
        Self {
            interval,
            ack_timeout,
            next_beat: Instant::now() + first,
            sent_at: None,
            latency: None,
        }
    }

    pub(crate) fn deadline(&self) -> Instant {
        match self.sent_at {
            Some(sent) => sent + self.ack_timeout,
            None => self.next_beat,
        }
    }

    pub(crate) fn due(&self) -> BeatDue {
        if self.sent_at.is_some() {
            BeatDue::Zombied
        } else {
            BeatDue::Send
        }
    }

    pub(crate) fn record_sent(&mut self) {
        let now = Instant::now();
        self.sent_at = Some(now);
        self.next_beat = now + self.interval;
    }

    /// Returns the round-trip time of the acknowledged heartbeat
    pub(crate) fn record_ack(&mut self) -> Option<Duration> {
        let sent = self.sent_at.take()?;
        let latency = sent.elapsed();
        self.latency = Some(latency);
        Some(latency)
    }

    pub(crate) fn is_awaiting_ack(&self) -> bool {
        self.sent_at.is_some()
    }

    pub(crate) fn interval(&self) -> Duration {
        self.interval
    }
}
