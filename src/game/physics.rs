//! Ball physics and paddle collision

use super::court::CourtConfig;

/// Ball position and velocity
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Ball {
    pub x: f32,
    pub y: f32,
    pub vx: f32,
    pub vy: f32,
}

impl Ball {
    pub fn speed(&self) -> f32 {
        (self.vx * self.vx + self.vy * self.vy).sqrt()
    }
}

/// Stateless physics helpers. Every function takes the court explicitly.
pub struct PhysicsSystem;

impl PhysicsSystem {
    /// Clamp a paddle's top edge into the court
    pub fn clamp_paddle_y(config: &CourtConfig, y: f32) -> f32 {
        y.clamp(0.0, config.max_paddle_y().max(0.0))
    }

    /// Time-based ball speed factor for the current round.
    /// Grows as `rate^elapsed` and never exceeds the configured cap.
    pub fn velocity_scale(config: &CourtConfig, elapsed_secs: f32) -> f32 {
        let elapsed = if elapsed_secs.is_finite() {
            elapsed_secs.max(0.0)
        } else {
            0.0
        };
        let scale = config.ball_speed_rate.powf(elapsed);
        if scale.is_finite() {
            scale.min(config.max_ball_speed_factor)
        } else {
            config.max_ball_speed_factor
        }
    }

    /// Move the ball one step. The result may leave the court by at most one
    /// radius on either axis.
    pub fn advance_ball(config: &CourtConfig, ball: &Ball, dt: f32, scale: f32) -> Ball {
        let r = config.ball_radius;
        Ball {
            x: (ball.x + ball.vx * dt * scale).clamp(-r, config.width + r),
            y: (ball.y + ball.vy * dt * scale).clamp(-r, config.height + r),
            ..*ball
        }
    }

    /// Bounce off the top and bottom walls.
    /// Returns true if the ball touched a wall this step.
    pub fn reflect_walls(config: &CourtConfig, ball: &mut Ball) -> bool {
        let r = config.ball_radius;
        if ball.y < r {
            ball.y = r;
            ball.vy = -ball.vy;
            true
        } else if ball.y > config.height - r {
            ball.y = config.height - r;
            ball.vy = -ball.vy;
            true
        } else {
            false
        }
    }

    /// Axis-aligned overlap between a paddle and the box swept by the ball
    /// between its previous and current positions, inflated by the radius.
    pub fn paddle_overlap(
        config: &CourtConfig,
        prev: &Ball,
        next: &Ball,
        paddle_x: f32,
        paddle_y: f32,
    ) -> bool {
        let r = config.ball_radius;
        let min_x = prev.x.min(next.x) - r;
        let max_x = prev.x.max(next.x) + r;
        let min_y = prev.y.min(next.y) - r;
        let max_y = prev.y.max(next.y) + r;

        min_x < paddle_x + config.paddle_width
            && max_x > paddle_x
            && min_y < paddle_y + config.paddle_height
            && max_y > paddle_y
    }

    /// Send the ball back toward the court centre and place it just outside
    /// the paddle face that looks at the centre.
    pub fn bounce_off_paddle(config: &CourtConfig, ball: &mut Ball, paddle_x: f32) {
        let paddle_center = paddle_x + config.paddle_width / 2.0;
        if paddle_center < config.width / 2.0 {
            ball.vx = ball.vx.abs();
            ball.x = paddle_x + config.paddle_width + config.ball_radius;
        } else {
            ball.vx = -ball.vx.abs();
            ball.x = paddle_x - config.ball_radius;
        }
    }

    /// Velocity after a smash: faster, capped, and re-angled along the fixed
    /// deflection angle. Horizontal direction is preserved.
    pub fn smash_velocity(config: &CourtConfig, ball: &Ball, moving_up: bool) -> (f32, f32) {
        let magnitude = (ball.speed() * config.smash_speed_factor).min(config.max_ball_speed());
        let x_sign = if ball.vx < 0.0 { -1.0 } else { 1.0 };
        // Screen coordinates: up is negative Y
        let angle = if moving_up {
            -config.smash_angle
        } else {
            config.smash_angle
        };
        (magnitude * angle.cos() * x_sign, magnitude * angle.sin())
    }

    /// True once the ball has left the court horizontally
    pub fn is_out_of_bounds(config: &CourtConfig, ball: &Ball) -> bool {
        ball.x < 0.0 || ball.x > config.width
    }

    /// Y at which the ball reaches `hit_x`, following wall reflections.
    /// Returns the current Y when the ball never gets there.
    pub fn predict_ball_y(config: &CourtConfig, ball: &Ball, hit_x: f32) -> f32 {
        if ball.vx == 0.0 {
            return ball.y;
        }

        let dt = (hit_x - ball.x) / ball.vx;
        if dt < 0.0 || !dt.is_finite() {
            return ball.y;
        }

        let projected = ball.y + ball.vy * dt;
        Self::fold_into_court(config, projected)
    }

    /// Fold an unbounded Y into the band the ball centre can occupy, the way
    /// repeated wall bounces would.
    fn fold_into_court(config: &CourtConfig, y: f32) -> f32 {
        let low = config.ball_radius;
        let span = config.height - 2.0 * config.ball_radius;
        if span <= 0.0 {
            return config.height / 2.0;
        }

        let period = 2.0 * span;
        let mut offset = (y - low).rem_euclid(period);
        if offset > span {
            offset = period - offset;
        }
        low + offset
    }
}
