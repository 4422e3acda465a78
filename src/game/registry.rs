//! Registry of live sessions
//!
//! A single task owns the id → session map. Connections ask it to route them
//! into a session; sessions tell it when they shut down. Sessions are created
//! on first use of an id.

use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{info, warn};

use super::controller::Controller;
use super::court::CourtConfig;
use super::session::{
    GameSession, Registration, RegistrationReply, SessionCommand, SessionError, SessionHandle,
};
use super::SessionId;

const REGISTRY_MAILBOX: usize = 256;

/// Messages accepted by the registry
pub enum RegistryCommand {
    /// Route a player into `session_id`, creating the session if needed. When
    /// the session is created by this request and `with_bot` is set, an
    /// autonomous opponent is seated after the player.
    Join {
        session_id: SessionId,
        controller: Controller,
        with_bot: bool,
        reply: RegistrationReply,
    },
    /// Sent by a session as it exits. The registry acks once the entry is gone.
    SessionClosed {
        session_id: SessionId,
        generation: u64,
        ack: oneshot::Sender<()>,
    },
    List {
        reply: oneshot::Sender<Vec<SessionSummary>>,
    },
}

/// Discovery view of a live session
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionSummary {
    pub id: SessionId,
    #[serde(rename = "numPlayers")]
    pub num_players: usize,
}

/// Cloneable front for the registry task
#[derive(Clone)]
pub struct RegistryHandle {
    commands: mpsc::Sender<RegistryCommand>,
}

impl RegistryHandle {
    /// Seat a player in a session
    pub async fn join(
        &self,
        session_id: SessionId,
        controller: Controller,
        with_bot: bool,
    ) -> Result<Registration, SessionError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(RegistryCommand::Join {
                session_id,
                controller,
                with_bot,
                reply,
            })
            .await
            .map_err(|_| SessionError::RegistryUnavailable)?;
        // A dropped reply means the session died with the request queued
        response.await.map_err(|_| SessionError::Closed(session_id))?
    }

    /// Live sessions with their current player counts
    pub async fn list(&self) -> Result<Vec<SessionSummary>, SessionError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(RegistryCommand::List { reply })
            .await
            .map_err(|_| SessionError::RegistryUnavailable)?;
        response.await.map_err(|_| SessionError::RegistryUnavailable)
    }
}

pub struct SessionRegistry {
    sessions: HashMap<SessionId, SessionHandle>,
    config: Arc<CourtConfig>,
    commands: mpsc::Receiver<RegistryCommand>,
    /// Given to each session so it can report its own shutdown
    own_sender: mpsc::Sender<RegistryCommand>,
    next_generation: u64,
}

impl SessionRegistry {
    pub fn new(config: Arc<CourtConfig>) -> (Self, RegistryHandle) {
        let (commands_tx, commands) = mpsc::channel(REGISTRY_MAILBOX);
        let registry = Self {
            sessions: HashMap::new(),
            config,
            commands,
            own_sender: commands_tx.clone(),
            next_generation: 0,
        };
        (registry, RegistryHandle { commands: commands_tx })
    }

    /// Create the registry and run it on its own task
    pub fn spawn(config: Arc<CourtConfig>) -> RegistryHandle {
        let (registry, handle) = Self::new(config);
        tokio::spawn(registry.run());
        handle
    }

    pub async fn run(mut self) {
        info!("Session registry started");
        while let Some(command) = self.commands.recv().await {
            self.handle_command(command);
        }
    }

    fn handle_command(&mut self, command: RegistryCommand) {
        match command {
            RegistryCommand::Join {
                session_id,
                controller,
                with_bot,
                reply,
            } => self.route(session_id, controller, with_bot, reply),
            RegistryCommand::SessionClosed {
                session_id,
                generation,
                ack,
            } => {
                let current = self
                    .sessions
                    .get(&session_id)
                    .map(|h| h.generation == generation)
                    .unwrap_or(false);
                if current {
                    self.sessions.remove(&session_id);
                    info!(session_id, active_sessions = self.sessions.len(), "Unregistered session");
                }
                let _ = ack.send(());
            }
            RegistryCommand::List { reply } => {
                let _ = reply.send(self.summaries());
            }
        }
    }

    fn route(
        &mut self,
        session_id: SessionId,
        controller: Controller,
        with_bot: bool,
        reply: RegistrationReply,
    ) {
        let mut command = SessionCommand::RegisterPlayer {
            controller,
            reply: Some(reply),
        };

        if let Some(handle) = self.sessions.get(&session_id) {
            match handle.try_send(command) {
                Ok(()) => return,
                Err(mpsc::error::TrySendError::Full(SessionCommand::RegisterPlayer {
                    reply: Some(reply),
                    ..
                })) => {
                    warn!(session_id, "Session mailbox full, rejecting join");
                    let _ = reply.send(Err(SessionError::Full(session_id)));
                    return;
                }
                Err(mpsc::error::TrySendError::Full(_)) => return,
                // Exited but its close notice is still in flight: replace it
                Err(mpsc::error::TrySendError::Closed(returned)) => command = returned,
            }
        }

        let handle = self.create_session(session_id);
        // Freshly created mailboxes have room for both registrations
        let _ = handle.try_send(command);
        if with_bot {
            let _ = handle.try_send(SessionCommand::RegisterPlayer {
                controller: Controller::autonomous(&self.config),
                reply: None,
            });
        }
    }

    fn create_session(&mut self, session_id: SessionId) -> SessionHandle {
        self.next_generation += 1;
        let seed = rand::random::<u64>();
        let (session, handle) = GameSession::new(
            session_id,
            self.next_generation,
            Arc::clone(&self.config),
            seed,
            self.own_sender.clone(),
        );

        self.sessions.insert(session_id, handle.clone());
        info!(session_id, active_sessions = self.sessions.len(), "Registered session");

        tokio::spawn(session.run());
        handle
    }

    fn summaries(&self) -> Vec<SessionSummary> {
        self.sessions
            .values()
            .map(|h| SessionSummary {
                id: h.id,
                num_players: h.player_count(),
            })
            .collect()
    }
}
