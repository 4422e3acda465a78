//! Snapshot building for network transmission

use crate::ws::protocol::{PlayerSnapshot, Snapshot};

use super::r#match::MatchState;

/// Builds the per-tick view of a match that every recipient receives
pub struct SnapshotBuilder;

impl SnapshotBuilder {
    /// Collect players, ball, frame events and phase. Player order follows
    /// the match's map iteration and is not stable between ticks.
    pub fn build(state: &MatchState) -> Snapshot {
        let players = state
            .players()
            .map(|p| PlayerSnapshot {
                id: p.id,
                score: p.score,
                x: p.x,
                y: p.y,
            })
            .collect();

        Snapshot {
            players,
            ball: *state.ball(),
            events: *state.events(),
            phase: state.phase(),
        }
    }
}
