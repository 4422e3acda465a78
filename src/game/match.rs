//! Authoritative match state and lifecycle

use bytes::Bytes;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::util::time::Micros;
use crate::ws::protocol::encode_snapshot;

use super::controller::{Controller, SnapshotContext};
use super::court::CourtConfig;
use super::input::{InputBuffer, InputEvent, PlayerId};
use super::physics::{Ball, PhysicsSystem};
use super::session::SessionError;
use super::snapshot::SnapshotBuilder;
use super::SessionId;

/// Match lifecycle. The discriminant is the value sent on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MatchPhase {
    /// Fewer than two players connected
    WaitingForPlayers = 0,
    /// Both players present, countdown to the first serve
    Starting = 1,
    /// Ball in play
    Running = 2,
    /// A point was scored, short pause before the next serve
    InBetweenRounds = 3,
    /// A player won, long pause before a new game
    GameOver = 4,
}

impl MatchPhase {
    pub fn as_byte(self) -> u8 {
        self as u8
    }

    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(Self::WaitingForPlayers),
            1 => Some(Self::Starting),
            2 => Some(Self::Running),
            3 => Some(Self::InBetweenRounds),
            4 => Some(Self::GameOver),
            _ => None,
        }
    }
}

/// What happened during the current tick
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameEvents {
    pub ball_collided: bool,
    pub ball_hit_player: bool,
    pub ball_was_smashed: bool,
    pub new_round: bool,
}

/// Player state in a match (authoritative)
#[derive(Debug)]
pub struct Player {
    pub id: PlayerId,
    /// Paddle's left edge, fixed at registration
    pub x: f32,
    /// Paddle's top edge
    pub y: f32,
    pub score: i32,
    pub inputs: InputBuffer,
    pub controller: Controller,
}

/// One court's simulation. Owned and mutated by a single session task.
pub struct MatchState {
    pub id: SessionId,
    config: Arc<CourtConfig>,
    phase: MatchPhase,
    players: HashMap<PlayerId, Player>,
    ball: Ball,
    /// Seconds since the current round's serve
    round_time: f32,
    /// Pending timed transition out of the current phase
    deadline: Option<Micros>,
    events: FrameEvents,
    rng: ChaCha8Rng,
    last_snapshot: Bytes,
}

impl MatchState {
    pub fn new(id: SessionId, config: Arc<CourtConfig>, seed: u64) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let ball = serve_ball(&config, &mut rng);
        Self {
            id,
            config,
            phase: MatchPhase::WaitingForPlayers,
            players: HashMap::new(),
            ball,
            round_time: 0.0,
            deadline: None,
            events: FrameEvents::default(),
            rng,
            last_snapshot: Bytes::new(),
        }
    }

    pub fn config(&self) -> &CourtConfig {
        &self.config
    }

    pub fn phase(&self) -> MatchPhase {
        self.phase
    }

    pub fn ball(&self) -> &Ball {
        &self.ball
    }

    pub fn events(&self) -> &FrameEvents {
        &self.events
    }

    pub fn deadline(&self) -> Option<Micros> {
        self.deadline
    }

    pub fn players(&self) -> impl Iterator<Item = &Player> {
        self.players.values()
    }

    pub fn player(&self, id: PlayerId) -> Option<&Player> {
        self.players.get(&id)
    }

    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    /// True while at least one player is driven by a remote client
    pub fn has_human(&self) -> bool {
        self.players.values().any(|p| !p.controller.is_autonomous())
    }

    /// Seat a new player. The second arrival starts the game.
    pub fn add_player(&mut self, controller: Controller, now: Micros) -> Result<PlayerId, SessionError> {
        if self.players.len() >= self.config.max_players {
            return Err(SessionError::Full(self.id));
        }

        let id = self.unused_player_id();

        // Take whichever side the current occupant left free
        let x = match self.players.values().next() {
            Some(other) if other.x < self.config.width / 2.0 => {
                self.config.width - self.config.paddle_width
            }
            _ => 0.0,
        };

        self.players.insert(
            id,
            Player {
                id,
                x,
                y: self.config.centered_paddle_y(),
                score: 0,
                inputs: InputBuffer::new(),
                controller,
            },
        );

        info!(
            session_id = self.id,
            player_id = id,
            player_count = self.players.len(),
            "Player joined session"
        );

        if self.phase == MatchPhase::WaitingForPlayers && self.players.len() >= self.config.max_players {
            self.start_game(now);
        } else {
            self.reset_round();
        }

        Ok(id)
    }

    /// Remove a player. Any game in progress is abandoned.
    pub fn remove_player(&mut self, id: PlayerId) -> Option<Player> {
        let player = self.players.remove(&id)?;

        info!(
            session_id = self.id,
            player_id = id,
            player_count = self.players.len(),
            "Player left session"
        );

        self.deadline = None;
        self.reset_game();
        self.phase = MatchPhase::WaitingForPlayers;
        Some(player)
    }

    /// Buffer input for the next tick. Only accepted while the ball is in play.
    pub fn submit_input(&mut self, event: InputEvent) -> bool {
        if self.phase != MatchPhase::Running {
            return false;
        }

        match self.players.get_mut(&event.player_id) {
            Some(player) => {
                player.inputs.push(event.state);
                true
            }
            None => {
                debug!(session_id = self.id, player_id = event.player_id, "Input for unknown player");
                false
            }
        }
    }

    /// Advance the match by one fixed step at wall-clock time `now`.
    ///
    /// A timed transition that fires on this tick takes effect immediately;
    /// physics resumes on the following tick.
    pub fn tick(&mut self, now: Micros) {
        self.events = FrameEvents::default();

        if self.fire_transition(now) {
            return;
        }

        if self.phase == MatchPhase::Running {
            self.update(now);
        }
    }

    /// Encode the current state and keep it as the latest snapshot
    pub fn refresh_snapshot(&mut self) {
        let snapshot = SnapshotBuilder::build(self);
        self.last_snapshot = encode_snapshot(&snapshot);
    }

    /// Hand the latest snapshot to every controller and collect the input the
    /// autonomous ones produce.
    pub fn notify_controllers(&mut self, now: Micros) -> Vec<InputEvent> {
        let config: &CourtConfig = &self.config;
        let body = &self.last_snapshot;
        let ball = self.ball;

        self.players
            .values_mut()
            .filter_map(|player| {
                let ctx = SnapshotContext {
                    config,
                    player_id: player.id,
                    last_sequence: player.inputs.last_sequence(),
                    paddle_x: player.x,
                    paddle_y: player.y,
                    ball,
                    body,
                    now,
                };
                player.controller.on_snapshot(&ctx)
            })
            .collect()
    }

    /// Fire the armed transition if its deadline has passed.
    /// Returns true if the phase changed.
    fn fire_transition(&mut self, now: Micros) -> bool {
        match self.deadline {
            Some(deadline) if now >= deadline => {}
            _ => return false,
        }
        self.deadline = None;

        match self.phase {
            MatchPhase::Starting => {
                self.phase = MatchPhase::Running;
            }
            MatchPhase::InBetweenRounds => {
                self.reset_round();
                self.phase = MatchPhase::Running;
            }
            MatchPhase::GameOver => {
                self.start_game(now);
            }
            MatchPhase::WaitingForPlayers | MatchPhase::Running => return false,
        }

        debug!(session_id = self.id, phase = ?self.phase, "Timed transition");
        true
    }

    /// Per-tick simulation while the ball is in play
    fn update(&mut self, now: Micros) {
        let config = Arc::clone(&self.config);
        let dt = config.tick_delta();
        self.round_time += dt;

        for player in self.players.values_mut() {
            player.y = player.inputs.integrate(&config, player.y, now);
        }

        let scale = PhysicsSystem::velocity_scale(&config, self.round_time);
        let previous = self.ball;
        let mut ball = PhysicsSystem::advance_ball(&config, &previous, dt, scale);

        if PhysicsSystem::reflect_walls(&config, &mut ball) {
            self.events.ball_collided = true;
        }

        for player in self.players.values() {
            if !PhysicsSystem::paddle_overlap(&config, &previous, &ball, player.x, player.y) {
                continue;
            }

            PhysicsSystem::bounce_off_paddle(&config, &mut ball, player.x);
            self.events.ball_collided = true;
            self.events.ball_hit_player = true;

            // A paddle in motion smashes the ball
            if let Some(last) = player.inputs.last().filter(|s| s.is_moving()) {
                let (vx, vy) = PhysicsSystem::smash_velocity(&config, &ball, last.up);
                ball.vx = vx;
                ball.vy = vy;
                self.events.ball_was_smashed = true;
            }
        }

        self.ball = ball;

        if PhysicsSystem::is_out_of_bounds(&config, &self.ball) {
            self.award_point(now);
        }
    }

    /// Credit the paddle farthest from where the ball left the court and move
    /// to the next phase.
    fn award_point(&mut self, now: Micros) {
        let ball_x = self.ball.x;

        // Ties go to the first player iterated, which is not a stable order
        let scorer = self
            .players
            .values()
            .fold(None::<(PlayerId, f32)>, |best, player| {
                let distance = (player.x - ball_x).abs();
                match best {
                    Some((_, best_distance)) if best_distance >= distance => best,
                    _ => Some((player.id, distance)),
                }
            })
            .map(|(id, _)| id);

        let Some(scorer) = scorer else {
            return;
        };

        if let Some(player) = self.players.get_mut(&scorer) {
            player.score += 1;
            info!(session_id = self.id, player_id = scorer, score = player.score, "Point scored");
        }

        if self.is_game_won() {
            self.phase = MatchPhase::GameOver;
            self.arm(self.config.game_over_delay, now);
            info!(session_id = self.id, winner = scorer, "Game over");
        } else {
            self.phase = MatchPhase::InBetweenRounds;
            self.arm(self.config.round_reset_delay, now);
        }
    }

    /// Leader has reached the threshold with the required margin
    fn is_game_won(&self) -> bool {
        let mut scores: Vec<i32> = self.players.values().map(|p| p.score).collect();
        scores.sort_unstable_by(|a, b| b.cmp(a));

        let leader = scores.first().copied().unwrap_or(0);
        let runner_up = scores.get(1).copied().unwrap_or(0);
        leader >= self.config.win_score && leader - runner_up >= self.config.win_margin
    }

    fn start_game(&mut self, now: Micros) {
        self.reset_game();
        self.phase = MatchPhase::Starting;
        self.arm(self.config.game_start_delay, now);
        info!(session_id = self.id, "Game starting");
    }

    fn arm(&mut self, delay: Duration, now: Micros) {
        self.deadline = Some(now + delay.as_micros() as Micros);
    }

    fn reset_game(&mut self) {
        self.reset_round();
        for player in self.players.values_mut() {
            player.score = 0;
        }
    }

    fn reset_round(&mut self) {
        self.ball = serve_ball(&self.config, &mut self.rng);
        self.round_time = 0.0;

        let centered = self.config.centered_paddle_y();
        for player in self.players.values_mut() {
            player.y = centered;
            player.inputs.clear();
        }

        self.events.new_round = true;
    }

    fn unused_player_id(&mut self) -> PlayerId {
        loop {
            let id: PlayerId = self.rng.gen();
            if !self.players.contains_key(&id) {
                return id;
            }
        }
    }
}

/// A fresh ball on the centre line heading along a random diagonal
fn serve_ball(config: &CourtConfig, rng: &mut ChaCha8Rng) -> Ball {
    let r = config.ball_radius;
    let span = (config.height - 2.0 * r).max(0.0);
    let component = config.ball_speed * std::f32::consts::FRAC_1_SQRT_2;

    Ball {
        x: config.width / 2.0,
        y: r + span * rng.gen::<f32>(),
        vx: component * random_sign(rng),
        vy: component * random_sign(rng),
    }
}

fn random_sign(rng: &mut ChaCha8Rng) -> f32 {
    if rng.gen::<bool>() {
        1.0
    } else {
        -1.0
    }
}
