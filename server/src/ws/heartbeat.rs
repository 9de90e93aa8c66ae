//! Ping/pong liveness tracking for a single connection.
//!
//! The heartbeat is polled from the connection's own task, so dropping the
//! task drops every timer with it.

use std::time::Duration;

use tokio::time::{interval_at, sleep_until, Instant, Interval, MissedTickBehavior};

/// Ping interval: server sends a WebSocket ping every 5 seconds.
pub const PING_INTERVAL: Duration = Duration::from_millis(5000);

/// Pong timeout: if no pong arrives within 1 second of a ping, the peer is dead.
pub const PONG_TIMEOUT: Duration = Duration::from_millis(1000);

/// Floor for the ping interval; tokio rejects a zero period.
const MIN_PING_INTERVAL: Duration = Duration::from_millis(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeartbeatConfig {
    pub ping_interval: Duration,
    pub pong_timeout: Duration,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            ping_interval: PING_INTERVAL,
            pong_timeout: PONG_TIMEOUT,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatEvent {
    /// Time to send a ping; a pong deadline is now armed.
    Ping,
    /// The armed deadline passed without a pong.
    TimedOut,
}

pub struct Heartbeat {
    config: HeartbeatConfig,
    ticker: Interval,
    pong_deadline: Option<Instant>,
}

impl Heartbeat {
    /// First ping fires one full interval after creation, not immediately.
    pub fn new(config: HeartbeatConfig) -> Self {
        let period = config.ping_interval.max(MIN_PING_INTERVAL);
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self {
            config,
            ticker,
            pong_deadline: None,
        }
    }

    /// Wait for the next heartbeat event. Cancel-safe: dropping the future
    /// keeps any armed deadline in place.
    pub async fn next_event(&mut self) -> HeartbeatEvent {
        match self.pong_deadline {
            Some(deadline) => {
                sleep_until(deadline).await;
                self.pong_deadline = None;
                HeartbeatEvent::TimedOut
            }
            None => {
                self.ticker.tick().await;
                self.pong_deadline = Some(Instant::now() + self.config.pong_timeout);
                HeartbeatEvent::Ping
            }
        }
    }

    /// Disarm the pong deadline. Returns `false` for unsolicited pongs.
    pub fn pong_received(&mut self) -> bool {
        self.pong_deadline.take().is_some()
    }

    #[cfg(test)]
    fn awaiting_pong(&self) -> bool {
        self.pong_deadline.is_some()
    }
}
