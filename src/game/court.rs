//! Court dimensions and gameplay tuning
//!
//! A `CourtConfig` is built once and shared read-only by every component of a
//! match. Tests construct alternate values to exercise other court sizes.

use std::time::Duration;

use crate::util::time::Micros;

#[derive(Debug, Clone, PartialEq)]
pub struct CourtConfig {
    /// Simulation ticks per second
    pub tick_rate: u32,

    pub width: f32,
    pub height: f32,

    pub paddle_width: f32,
    pub paddle_height: f32,
    /// Paddle travel in pixels per second while a key is held
    pub paddle_speed: f32,

    pub ball_radius: f32,
    /// Ball speed at the start of a round
    pub ball_speed: f32,
    /// Per-second growth of the ball speed during a round
    pub ball_speed_rate: f32,
    /// Ceiling for the time-based speed factor
    pub max_ball_speed_factor: f32,

    /// Deflection angle of a smashed ball, in radians from the horizontal
    pub smash_angle: f32,
    /// Speed multiplier applied on a smash
    pub smash_speed_factor: f32,

    pub win_score: i32,
    pub win_margin: i32,

    pub game_start_delay: Duration,
    pub round_reset_delay: Duration,
    pub game_over_delay: Duration,

    /// How far in the past a client timestamp may lie before it is replaced
    pub input_window: Duration,

    pub max_players: usize,

    // Autonomous controller tuning
    pub bot_kp: f32,
    pub bot_ki: f32,
    pub bot_kd: f32,
    pub bot_dead_zone: f32,
    pub bot_sequence_modulus: u32,
}

impl Default for CourtConfig {
    fn default() -> Self {
        let height = 600.0;
        Self {
            tick_rate: 60,
            width: 800.0,
            height,
            paddle_width: 10.0,
            paddle_height: 100.0,
            paddle_speed: 100.0,
            ball_radius: 10.0,
            ball_speed: 175.0,
            ball_speed_rate: 1.018,
            max_ball_speed_factor: 10.0,
            smash_angle: std::f32::consts::PI / 12.0,
            smash_speed_factor: 2.0,
            win_score: 11,
            win_margin: 2,
            game_start_delay: Duration::from_secs(3),
            round_reset_delay: Duration::from_millis(750),
            game_over_delay: Duration::from_secs(5),
            input_window: Duration::from_secs(1),
            max_players: 2,
            bot_kp: 100.0 / height,
            bot_ki: 0.0 / height,
            bot_kd: 1.0 / height,
            bot_dead_zone: 1.0 / 3.0,
            bot_sequence_modulus: 256,
        }
    }
}

impl CourtConfig {
    /// Fixed simulation step
    pub fn tick_duration(&self) -> Duration {
        Duration::from_micros(1_000_000 / self.tick_rate.max(1) as u64)
    }

    /// Fixed simulation step in seconds
    pub fn tick_delta(&self) -> f32 {
        self.tick_duration().as_secs_f32()
    }

    /// Highest Y a paddle's top edge may reach
    pub fn max_paddle_y(&self) -> f32 {
        self.height - self.paddle_height
    }

    /// Y that vertically centres a paddle
    pub fn centered_paddle_y(&self) -> f32 {
        self.height / 2.0 - self.paddle_height / 2.0
    }

    /// Absolute ball speed ceiling
    pub fn max_ball_speed(&self) -> f32 {
        self.ball_speed * self.max_ball_speed_factor
    }

    pub fn input_window_micros(&self) -> Micros {
        self.input_window.as_micros() as Micros
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_tick_is_sixty_hertz() {
        let config = CourtConfig::default();
        assert_eq!(config.tick_duration(), Duration::from_micros(16_666));
        assert!((config.tick_delta() - 1.0 / 60.0).abs() < 1e-4);
    }

    #[test]
    fn test_derived_limits() {
        let config = CourtConfig::default();
        assert_eq!(config.max_paddle_y(), 500.0);
        assert_eq!(config.centered_paddle_y(), 250.0);
        assert_eq!(config.max_ball_speed(), 1750.0);
    }
}
