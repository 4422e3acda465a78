//! Timestamped paddle input and position reconciliation

use crate::util::time::{seconds_between, Micros};

use super::court::CourtConfig;
use super::physics::PhysicsSystem;

pub type PlayerId = i32;

/// Keys held by a player from `timestamp` until the next input
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct InputState {
    pub up: bool,
    pub down: bool,
    /// Server-normalized time the input took effect
    pub timestamp: Micros,
    pub sequence: u32,
}

impl InputState {
    /// Exactly one direction held. Both or neither means standing still.
    pub fn is_moving(&self) -> bool {
        self.up != self.down
    }

    /// Signed direction along Y: -1 up, +1 down, 0 idle
    fn direction(&self) -> f32 {
        match (self.up, self.down) {
            (true, false) => -1.0,
            (false, true) => 1.0,
            _ => 0.0,
        }
    }
}

/// Input addressed to a player in a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputEvent {
    pub player_id: PlayerId,
    pub state: InputState,
}

/// Map a client-supplied timestamp onto server time. Anything in the future or
/// older than the configured window is replaced with `now`.
pub fn normalize_timestamp(config: &CourtConfig, client: Micros, now: Micros) -> Micros {
    let oldest = now.saturating_sub(config.input_window_micros());
    if client > now || client < oldest {
        now
    } else {
        client
    }
}

/// Pending inputs for one paddle, in arrival order
#[derive(Debug, Clone, Default)]
pub struct InputBuffer {
    events: Vec<InputState>,
}

impl InputBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, state: InputState) {
        self.events.push(state);
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Most recently received input, if any
    pub fn last(&self) -> Option<&InputState> {
        self.events.last()
    }

    /// Sequence number of the most recently accepted input, 0 if none
    pub fn last_sequence(&self) -> u32 {
        self.last().map(|s| s.sequence).unwrap_or(0)
    }

    /// Integrate the paddle's Y over the buffered inputs up to `now` and prune
    /// the buffer down to its newest entry.
    ///
    /// Each input is held until the timestamp of the one after it; the newest
    /// is held until `now`. The retained entry is re-stamped to `now` so the
    /// next call only covers time after this one. An input stamped before that
    /// point gives the retained entry a negative hold, taking back the movement
    /// already applied past the new input's timestamp.
    pub fn integrate(&mut self, config: &CourtConfig, y: f32, now: Micros) -> f32 {
        let mut integrated = y;

        for (i, state) in self.events.iter().enumerate() {
            let until = self
                .events
                .get(i + 1)
                .map(|next| next.timestamp)
                .unwrap_or(now);
            let held = seconds_between(state.timestamp, until);
            integrated += state.direction() * config.paddle_speed * held;
        }

        if let Some(mut baseline) = self.events.pop() {
            baseline.timestamp = baseline.timestamp.max(now);
            self.events.clear();
            self.events.push(baseline);
        }

        PhysicsSystem::clamp_paddle_y(config, integrated)
    }
}
