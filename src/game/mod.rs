//! Game simulation modules

pub mod bot;
pub mod controller;
pub mod court;
pub mod input;
pub mod r#match;
pub mod physics;
pub mod registry;
pub mod session;
pub mod snapshot;

pub use court::CourtConfig;
pub use r#match::{MatchPhase, MatchState};
pub use registry::{RegistryHandle, SessionRegistry, SessionSummary};
pub use session::{GameSession, Registration, SessionError, SessionHandle};

/// Session identifier chosen by clients in the `/play` query
pub type SessionId = i64;
