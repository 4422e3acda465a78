//! Binary wire format between clients and the server
//!
//! All fields are little-endian.
//!
//! Client to server, one frame per input change:
//! `up:u8 down:u8 timestamp_ms:i64 sequence:u32`
//!
//! Server to client, one frame per tick:
//! `recipient_id:i32 last_sequence:u32` followed by the shared snapshot body
//! `{id:i32 score:i32 x:f32 y:f32}*` `ball{x y vx vy: f32}`
//! `ball_collided:u8 ball_hit_player:u8 ball_was_smashed:u8 new_round:u8`
//! `phase:u8`

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::game::court::CourtConfig;
use crate::game::input::{normalize_timestamp, InputEvent, InputState, PlayerId};
use crate::game::physics::Ball;
use crate::game::r#match::{FrameEvents, MatchPhase};
use crate::util::time::Micros;

pub const INPUT_FRAME_LEN: usize = 1 + 1 + 8 + 4;
pub const RECIPIENT_HEADER_LEN: usize = 4 + 4;
pub const PLAYER_BLOCK_LEN: usize = 4 + 4 + 4 + 4;
/// Ball, frame events and phase
pub const SNAPSHOT_TRAILER_LEN: usize = 16 + 4 + 1;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    #[error("Expected {expected} bytes, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    #[error("Snapshot of {0} bytes does not hold whole player blocks")]
    MalformedSnapshot(usize),

    #[error("Invalid key flag byte: {0}")]
    InvalidFlag(u8),

    #[error("Unknown match phase: {0}")]
    UnknownPhase(u8),
}

/// Input frame exactly as the client sent it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawInput {
    pub up: bool,
    pub down: bool,
    /// Client clock, milliseconds since the UNIX epoch
    pub timestamp_ms: i64,
    pub sequence: u32,
}

/// Player state in a snapshot
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlayerSnapshot {
    pub id: PlayerId,
    pub score: i32,
    pub x: f32,
    pub y: f32,
}

/// Authoritative state shared by every recipient of a tick
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub players: Vec<PlayerSnapshot>,
    pub ball: Ball,
    pub events: FrameEvents,
    pub phase: MatchPhase,
}

/// A snapshot as one particular player receives it
#[derive(Debug, Clone, PartialEq)]
pub struct RecipientFrame {
    pub recipient_id: PlayerId,
    pub last_sequence: u32,
    pub snapshot: Snapshot,
}

pub fn decode_input(frame: &[u8]) -> Result<RawInput, ProtocolError> {
    if frame.len() != INPUT_FRAME_LEN {
        return Err(ProtocolError::InvalidLength {
            expected: INPUT_FRAME_LEN,
            actual: frame.len(),
        });
    }

    let mut buf = frame;
    let up = read_flag(&mut buf)?;
    let down = read_flag(&mut buf)?;
    let timestamp_ms = buf.get_i64_le();
    let sequence = buf.get_u32_le();

    Ok(RawInput {
        up,
        down,
        timestamp_ms,
        sequence,
    })
}

/// Decode an input frame and place its timestamp on the server clock
pub fn read_input(
    config: &CourtConfig,
    frame: &[u8],
    player_id: PlayerId,
    now: Micros,
) -> Result<InputEvent, ProtocolError> {
    let raw = decode_input(frame)?;
    let client_micros = (raw.timestamp_ms.max(0) as u64).saturating_mul(1000);

    Ok(InputEvent {
        player_id,
        state: InputState {
            up: raw.up,
            down: raw.down,
            timestamp: normalize_timestamp(config, client_micros, now),
            sequence: raw.sequence,
        },
    })
}

pub fn encode_input(input: &RawInput) -> Vec<u8> {
    let mut buf = BytesMut::with_capacity(INPUT_FRAME_LEN);
    buf.put_u8(input.up as u8);
    buf.put_u8(input.down as u8);
    buf.put_i64_le(input.timestamp_ms);
    buf.put_u32_le(input.sequence);
    buf.to_vec()
}

/// Encode the body shared by every recipient of a tick
pub fn encode_snapshot(snapshot: &Snapshot) -> Bytes {
    let mut buf =
        BytesMut::with_capacity(snapshot.players.len() * PLAYER_BLOCK_LEN + SNAPSHOT_TRAILER_LEN);

    for player in &snapshot.players {
        buf.put_i32_le(player.id);
        buf.put_i32_le(player.score);
        buf.put_f32_le(player.x);
        buf.put_f32_le(player.y);
    }

    let ball = &snapshot.ball;
    buf.put_f32_le(ball.x);
    buf.put_f32_le(ball.y);
    buf.put_f32_le(ball.vx);
    buf.put_f32_le(ball.vy);

    let events = &snapshot.events;
    buf.put_u8(events.ball_collided as u8);
    buf.put_u8(events.ball_hit_player as u8);
    buf.put_u8(events.ball_was_smashed as u8);
    buf.put_u8(events.new_round as u8);

    buf.put_u8(snapshot.phase.as_byte());

    buf.freeze()
}

pub fn decode_snapshot(body: &[u8]) -> Result<Snapshot, ProtocolError> {
    if body.len() < SNAPSHOT_TRAILER_LEN
        || (body.len() - SNAPSHOT_TRAILER_LEN) % PLAYER_BLOCK_LEN != 0
    {
        return Err(ProtocolError::MalformedSnapshot(body.len()));
    }

    let player_count = (body.len() - SNAPSHOT_TRAILER_LEN) / PLAYER_BLOCK_LEN;
    let mut buf = body;

    let players = (0..player_count)
        .map(|_| PlayerSnapshot {
            id: buf.get_i32_le(),
            score: buf.get_i32_le(),
            x: buf.get_f32_le(),
            y: buf.get_f32_le(),
        })
        .collect();

    let ball = Ball {
        x: buf.get_f32_le(),
        y: buf.get_f32_le(),
        vx: buf.get_f32_le(),
        vy: buf.get_f32_le(),
    };

    let events = FrameEvents {
        ball_collided: read_flag(&mut buf)?,
        ball_hit_player: read_flag(&mut buf)?,
        ball_was_smashed: read_flag(&mut buf)?,
        new_round: read_flag(&mut buf)?,
    };

    let phase_byte = buf.get_u8();
    let phase = MatchPhase::from_byte(phase_byte).ok_or(ProtocolError::UnknownPhase(phase_byte))?;

    Ok(Snapshot {
        players,
        ball,
        events,
        phase,
    })
}

/// Prefix the shared body with the recipient's id and its last accepted input
pub fn encode_recipient_frame(recipient_id: PlayerId, last_sequence: u32, body: &[u8]) -> Vec<u8> {
    let mut buf = BytesMut::with_capacity(RECIPIENT_HEADER_LEN + body.len());
    buf.put_i32_le(recipient_id);
    buf.put_u32_le(last_sequence);
    buf.put_slice(body);
    buf.to_vec()
}

pub fn decode_recipient_frame(frame: &[u8]) -> Result<RecipientFrame, ProtocolError> {
    if frame.len() < RECIPIENT_HEADER_LEN {
        return Err(ProtocolError::InvalidLength {
            expected: RECIPIENT_HEADER_LEN + SNAPSHOT_TRAILER_LEN,
            actual: frame.len(),
        });
    }

    let mut buf = frame;
    let recipient_id = buf.get_i32_le();
    let last_sequence = buf.get_u32_le();
    let snapshot = decode_snapshot(buf)?;

    Ok(RecipientFrame {
        recipient_id,
        last_sequence,
        snapshot,
    })
}

fn read_flag(buf: &mut &[u8]) -> Result<bool, ProtocolError> {
    match buf.get_u8() {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(ProtocolError::InvalidFlag(other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: Micros = 1_700_000_000_000_000;

    fn two_player_snapshot() -> Snapshot {
        Snapshot {
            players: vec![
                PlayerSnapshot { id: -17, score: 4, x: 0.0, y: 123.5 },
                PlayerSnapshot { id: 99_000, score: 11, x: 790.0, y: 500.0 },
            ],
            ball: Ball { x: 401.25, y: 12.0, vx: -175.0, vy: 88.5 },
            events: FrameEvents {
                ball_collided: true,
                ball_hit_player: true,
                ball_was_smashed: false,
                new_round: true,
            },
            phase: MatchPhase::InBetweenRounds,
        }
    }

    #[test]
    fn test_snapshot_round_trip() {
        let snapshot = two_player_snapshot();
        let body = encode_snapshot(&snapshot);
        assert_eq!(body.len(), 2 * PLAYER_BLOCK_LEN + SNAPSHOT_TRAILER_LEN);

        let frame = encode_recipient_frame(99_000, 42, &body);
        let decoded = decode_recipient_frame(&frame).unwrap();
        assert_eq!(decoded.recipient_id, 99_000);
        assert_eq!(decoded.last_sequence, 42);
        assert_eq!(decoded.snapshot, snapshot);
    }

    #[test]
    fn test_snapshot_layout() {
        let body = encode_snapshot(&two_player_snapshot());
        assert_eq!(&body[0..4], &(-17i32).to_le_bytes());
        assert_eq!(&body[4..8], &4i32.to_le_bytes());
        assert_eq!(&body[32..36], &401.25f32.to_le_bytes());
        assert_eq!(&body[48..52], &[1, 1, 0, 1]);
        assert_eq!(body[52], 3);
    }

    #[test]
    fn test_snapshot_rejects_partial_blocks() {
        let body = encode_snapshot(&two_player_snapshot());
        assert_eq!(
            decode_snapshot(&body[1..]),
            Err(ProtocolError::MalformedSnapshot(body.len() - 1))
        );
        assert!(decode_recipient_frame(&[0; 3]).is_err());
    }

    #[test]
    fn test_snapshot_rejects_unknown_phase() {
        let mut body = encode_snapshot(&two_player_snapshot()).to_vec();
        let last = body.len() - 1;
        body[last] = 9;
        assert_eq!(decode_snapshot(&body), Err(ProtocolError::UnknownPhase(9)));
    }

    #[test]
    fn test_input_decoding() {
        let raw = RawInput { up: true, down: false, timestamp_ms: 1_700_000_000_000, sequence: 77 };
        let frame = encode_input(&raw);
        assert_eq!(frame.len(), INPUT_FRAME_LEN);
        assert_eq!(decode_input(&frame), Ok(raw));
    }

    #[test]
    fn test_input_wrong_length() {
        assert_eq!(
            decode_input(&[0; 10]),
            Err(ProtocolError::InvalidLength { expected: INPUT_FRAME_LEN, actual: 10 })
        );
    }

    #[test]
    fn test_input_bad_flag_is_error() {
        let mut frame = encode_input(&RawInput { up: false, down: false, timestamp_ms: 0, sequence: 0 });
        frame[1] = 2;
        assert_eq!(decode_input(&frame), Err(ProtocolError::InvalidFlag(2)));
    }

    #[test]
    fn test_future_client_timestamp_uses_server_time() {
        let config = CourtConfig::default();
        let an_hour_ahead_ms = (NOW / 1000) as i64 + 3_600_000;
        let frame = encode_input(&RawInput { up: false, down: true, timestamp_ms: an_hour_ahead_ms, sequence: 5 });

        let event = read_input(&config, &frame, 8, NOW).unwrap();
        assert_eq!(event.player_id, 8);
        assert_eq!(event.state.timestamp, NOW);
        assert!(event.state.down);
        assert_eq!(event.state.sequence, 5);
    }

    #[test]
    fn test_recent_client_timestamp_kept() {
        let config = CourtConfig::default();
        let recent_ms = (NOW / 1000) as i64 - 200;
        let frame = encode_input(&RawInput { up: true, down: false, timestamp_ms: recent_ms, sequence: 1 });
        let event = read_input(&config, &frame, 8, NOW).unwrap();
        assert_eq!(event.state.timestamp, NOW - 200_000);
    }

    #[test]
    fn test_negative_client_timestamp_uses_server_time() {
        let config = CourtConfig::default();
        let frame = encode_input(&RawInput { up: true, down: false, timestamp_ms: -5, sequence: 1 });
        let event = read_input(&config, &frame, 8, NOW).unwrap();
        assert_eq!(event.state.timestamp, NOW);
    }
}
