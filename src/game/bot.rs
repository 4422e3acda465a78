//! Autonomous paddle driven by ball prediction and a PID corrector

use super::controller::SnapshotContext;
use super::court::CourtConfig;
use super::input::{InputEvent, InputState};
use super::physics::PhysicsSystem;

#[derive(Debug, Clone)]
pub struct BotController {
    kp: f32,
    ki: f32,
    kd: f32,
    dead_zone: f32,
    sequence_modulus: u32,

    integral: f32,
    prev_err: f32,
    prev_target_y: f32,
    sequence: u32,
}

impl BotController {
    pub fn new(config: &CourtConfig) -> Self {
        Self {
            kp: config.bot_kp,
            ki: config.bot_ki,
            kd: config.bot_kd,
            dead_zone: config.bot_dead_zone,
            sequence_modulus: config.bot_sequence_modulus.max(1),
            integral: 0.0,
            prev_err: 0.0,
            prev_target_y: config.centered_paddle_y(),
            sequence: 0,
        }
    }

    /// Run one control step against the latest match state and produce the
    /// input the bot holds until the next snapshot.
    pub fn step(&mut self, ctx: &SnapshotContext<'_>) -> InputEvent {
        let config = ctx.config;
        self.sequence = (self.sequence + 1) % self.sequence_modulus;

        let target_y = self.target_y(config, ctx);
        self.prev_target_y = target_y;

        let dt = config.tick_delta();
        let err = ctx.paddle_y - target_y;
        self.integral += err * dt;
        let derivative = if dt > 0.0 { (err - self.prev_err) / dt } else { 0.0 };
        let output = self.kp * err + self.ki * self.integral + self.kd * derivative;
        self.prev_err = err;

        InputEvent {
            player_id: ctx.player_id,
            state: InputState {
                up: output > self.dead_zone,
                down: output < -self.dead_zone,
                timestamp: ctx.now,
                sequence: self.sequence,
            },
        }
    }

    /// Where the paddle's top edge should be. A receding ball keeps the last
    /// target so the paddle does not chase it back and forth.
    fn target_y(&self, config: &CourtConfig, ctx: &SnapshotContext<'_>) -> f32 {
        let hit_x = ctx.paddle_x + config.paddle_width / 2.0;
        let receding = (hit_x - ctx.ball.x) * ctx.ball.vx < 0.0;
        if receding {
            return self.prev_target_y;
        }

        PhysicsSystem::predict_ball_y(config, &ctx.ball, hit_x) - config.paddle_height / 2.0
    }
}
