//! Producers of paddle input
//!
//! Every player owns exactly one controller. After each tick the session hands
//! the fresh snapshot to every controller: a network controller forwards it to
//! its socket, an autonomous controller consumes it and answers with input.

use bytes::Bytes;
use tokio::sync::mpsc;
use tracing::warn;

use crate::util::time::Micros;
use crate::ws::protocol::encode_recipient_frame;

use super::bot::BotController;
use super::court::CourtConfig;
use super::input::{InputEvent, PlayerId};
use super::physics::Ball;

/// Everything a controller may look at when notified of a snapshot
pub struct SnapshotContext<'a> {
    pub config: &'a CourtConfig,
    pub player_id: PlayerId,
    /// Sequence of the player's most recently accepted input
    pub last_sequence: u32,
    pub paddle_x: f32,
    pub paddle_y: f32,
    pub ball: Ball,
    /// Encoded snapshot shared by all recipients
    pub body: &'a Bytes,
    pub now: Micros,
}

/// Forwards snapshots to a connected client. Its input arrives through the
/// socket reader, not through this type.
#[derive(Debug, Clone)]
pub struct NetworkController {
    outbound: mpsc::Sender<Vec<u8>>,
}

impl NetworkController {
    pub fn new(outbound: mpsc::Sender<Vec<u8>>) -> Self {
        Self { outbound }
    }

    fn forward(&self, ctx: &SnapshotContext<'_>) {
        let frame = encode_recipient_frame(ctx.player_id, ctx.last_sequence, ctx.body);
        match self.outbound.try_send(frame) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(player_id = ctx.player_id, "Outbound queue full, dropping snapshot");
            }
            // The socket is gone; the unregister message is already on its way
            Err(mpsc::error::TrySendError::Closed(_)) => {}
        }
    }
}

#[derive(Debug, Clone)]
pub enum Controller {
    Network(NetworkController),
    Autonomous(BotController),
}

impl Controller {
    pub fn network(outbound: mpsc::Sender<Vec<u8>>) -> Self {
        Self::Network(NetworkController::new(outbound))
    }

    pub fn autonomous(config: &CourtConfig) -> Self {
        Self::Autonomous(BotController::new(config))
    }

    /// Used only by session teardown: a match with no remaining human closes
    pub fn is_autonomous(&self) -> bool {
        matches!(self, Self::Autonomous(_))
    }

    /// Notify the controller of a broadcast tick. Returns input to submit on
    /// the player's behalf, if the controller produces its own.
    pub fn on_snapshot(&mut self, ctx: &SnapshotContext<'_>) -> Option<InputEvent> {
        match self {
            Self::Network(network) => {
                network.forward(ctx);
                None
            }
            Self::Autonomous(bot) => Some(bot.step(ctx)),
        }
    }
}
