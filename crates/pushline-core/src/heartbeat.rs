//! Heartbeat monitoring for Pushline.
//!
//! Each connection owns a [`HeartbeatMonitor`]: a two-state machine driven
//! by a recurring interval. The monitor lives inside the connection's task,
//! so the state has a single writer and the timer is cancelled when the task
//! drops it.

use std::time::Duration;
use tokio::time::{self, Instant, Interval, MissedTickBehavior};
use tracing::trace;

/// Default probe interval.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Shortest probe interval a monitor runs with.
pub const MIN_HEARTBEAT_INTERVAL: Duration = Duration::from_millis(1);

/// Heartbeat configuration.
#[derive(Debug, Clone)]
pub struct HeartbeatConfig {
    /// Time between probes. Two consecutive unanswered probes terminate the
    /// connection.
    pub interval: Duration,
}

impl HeartbeatConfig {
    /// The interval actually used, never shorter than [`MIN_HEARTBEAT_INTERVAL`].
    #[must_use]
    pub fn effective_interval(&self) -> Duration {
        self.interval.max(MIN_HEARTBEAT_INTERVAL)
    }
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_HEARTBEAT_INTERVAL,
        }
    }
}

/// Liveness state of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatState {
    /// The peer acknowledged since the last probe (or the connection just opened).
    Alive,
    /// A probe is outstanding.
    Probing,
}

/// What the connection must do after an interval elapsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatAction {
    /// Send a liveness probe.
    Probe,
    /// The previous probe went unanswered; terminate the connection.
    Terminate,
}

/// The heartbeat state machine.
#[derive(Debug, Clone)]
pub struct Heartbeat {
    state: HeartbeatState,
    last_ack: Instant,
    probes_sent: u64,
}

impl Heartbeat {
    /// Create a state machine in the [`HeartbeatState::Alive`] state.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: HeartbeatState::Alive,
            last_ack: Instant::now(),
            probes_sent: 0,
        }
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> HeartbeatState {
        self.state
    }

    /// When the peer last acknowledged, or when the connection opened.
    #[must_use]
    pub fn last_ack(&self) -> Instant {
        self.last_ack
    }

    /// Number of probes sent so far.
    #[must_use]
    pub fn probes_sent(&self) -> u64 {
        self.probes_sent
    }

    /// Advance on an interval tick.
    pub fn on_tick(&mut self) -> HeartbeatAction {
        match self.state {
            HeartbeatState::Probing => HeartbeatAction::Terminate,
            HeartbeatState::Alive => {
                self.state = HeartbeatState::Probing;
                self.probes_sent += 1;
                HeartbeatAction::Probe
            }
        }
    }

    /// Record an acknowledgment. Any pong counts, including late ones.
    pub fn on_pong(&mut self) {
        self.state = HeartbeatState::Alive;
        self.last_ack = Instant::now();
    }
}

impl Default for Heartbeat {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-connection heartbeat: the state machine plus its interval timer.
///
/// The first tick fires one full interval after [`start`](Self::start). An
/// acknowledgment restarts the interval, so a silent peer is terminated
/// exactly two intervals after its last pong.
pub struct HeartbeatMonitor {
    heartbeat: Heartbeat,
    interval: Interval,
}

impl HeartbeatMonitor {
    /// Start monitoring.
    #[must_use]
    pub fn start(config: &HeartbeatConfig) -> Self {
        let period = config.effective_interval();
        let mut interval = time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        Self {
            heartbeat: Heartbeat::new(),
            interval,
        }
    }

    /// Wait for the next tick and advance the state machine.
    ///
    /// Cancel safe.
    pub async fn tick(&mut self) -> HeartbeatAction {
        self.interval.tick().await;
        let action = self.heartbeat.on_tick();
        trace!(?action, "Heartbeat tick");
        action
    }

    /// Record a pong from the peer.
    pub fn acknowledge(&mut self) {
        self.heartbeat.on_pong();
        self.interval.reset();
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> HeartbeatState {
        self.heartbeat.state()
    }

    /// The underlying state machine.
    #[must_use]
    pub fn heartbeat(&self) -> &Heartbeat {
        &self.heartbeat
    }
}
