//! Per-match actor and its tick loop

use std::ops::ControlFlow;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::util::time::{unix_micros, Micros};

use super::controller::Controller;
use super::court::CourtConfig;
use super::input::{InputEvent, PlayerId};
use super::r#match::MatchState;
use super::registry::RegistryCommand;
use super::SessionId;

const SESSION_MAILBOX: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("Session {0} is full")]
    Full(SessionId),

    #[error("Session {0} has shut down")]
    Closed(SessionId),

    #[error("Session registry is unavailable")]
    RegistryUnavailable,
}

/// Successful seating of a player
#[derive(Debug, Clone)]
pub struct Registration {
    pub player_id: PlayerId,
    pub session: SessionHandle,
}

pub type RegistrationReply = oneshot::Sender<Result<Registration, SessionError>>;

/// Messages accepted by a session's mailbox
pub enum SessionCommand {
    /// Seat a player. Without a reply channel the registration is fire and
    /// forget; with one, a dropped receiver undoes the registration.
    RegisterPlayer {
        controller: Controller,
        reply: Option<RegistrationReply>,
    },
    UnregisterPlayer {
        player_id: PlayerId,
    },
    SubmitInput(InputEvent),
}

/// Handle to a running session
#[derive(Clone, Debug)]
pub struct SessionHandle {
    pub id: SessionId,
    /// Distinguishes successive sessions that reuse an id
    pub generation: u64,
    commands: mpsc::Sender<SessionCommand>,
    player_count: Arc<AtomicUsize>,
}

impl SessionHandle {
    pub fn player_count(&self) -> usize {
        self.player_count.load(Ordering::Relaxed)
    }

    /// True once the session has stopped accepting commands
    pub fn is_closed(&self) -> bool {
        self.commands.is_closed()
    }

    /// Queue a command without waiting. Gives the command back if the mailbox
    /// is full or closed.
    pub fn try_send(&self, command: SessionCommand) -> Result<(), mpsc::error::TrySendError<SessionCommand>> {
        self.commands.try_send(command)
    }

    pub async fn register_player(&self, controller: Controller) -> Result<Registration, SessionError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(SessionCommand::RegisterPlayer {
                controller,
                reply: Some(reply),
            })
            .await
            .map_err(|_| SessionError::Closed(self.id))?;
        response.await.map_err(|_| SessionError::Closed(self.id))?
    }

    pub async fn unregister_player(&self, player_id: PlayerId) {
        if self
            .commands
            .send(SessionCommand::UnregisterPlayer { player_id })
            .await
            .is_err()
        {
            debug!(session_id = self.id, player_id, "Session already gone on unregister");
        }
    }

    pub async fn submit_input(&self, event: InputEvent) -> Result<(), SessionError> {
        self.commands
            .send(SessionCommand::SubmitInput(event))
            .await
            .map_err(|_| SessionError::Closed(self.id))
    }
}

/// The session actor. Sole owner of its match state.
pub struct GameSession {
    state: MatchState,
    commands: mpsc::Receiver<SessionCommand>,
    handle: SessionHandle,
    registry: mpsc::Sender<RegistryCommand>,
}

impl GameSession {
    pub fn new(
        id: SessionId,
        generation: u64,
        config: Arc<CourtConfig>,
        seed: u64,
        registry: mpsc::Sender<RegistryCommand>,
    ) -> (Self, SessionHandle) {
        let (commands_tx, commands) = mpsc::channel(SESSION_MAILBOX);

        let handle = SessionHandle {
            id,
            generation,
            commands: commands_tx,
            player_count: Arc::new(AtomicUsize::new(0)),
        };

        let session = Self {
            state: MatchState::new(id, config, seed),
            commands,
            handle: handle.clone(),
            registry,
        };

        (session, handle)
    }

    /// Run the mailbox and tick loop until the last human leaves
    pub async fn run(mut self) {
        let id = self.state.id;
        info!(session_id = id, "Session started");

        let mut ticker = interval(self.state.config().tick_duration());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                command = self.commands.recv() => {
                    let Some(command) = command else { break };
                    if self.handle_command(command, unix_micros()).is_break() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    self.on_tick(unix_micros());
                }
            }
        }

        self.shutdown().await;
        info!(session_id = id, "Session stopped");
    }

    fn handle_command(&mut self, command: SessionCommand, now: Micros) -> ControlFlow<()> {
        match command {
            SessionCommand::RegisterPlayer { controller, reply } => {
                self.register(controller, reply, now)
            }
            SessionCommand::UnregisterPlayer { player_id } => self.unregister(player_id),
            SessionCommand::SubmitInput(event) => {
                self.state.submit_input(event);
                ControlFlow::Continue(())
            }
        }
    }

    fn register(
        &mut self,
        controller: Controller,
        reply: Option<RegistrationReply>,
        now: Micros,
    ) -> ControlFlow<()> {
        let result = self.state.add_player(controller, now);
        self.publish_player_count();

        let Some(reply) = reply else {
            if let Err(e) = result {
                warn!(session_id = self.state.id, error = %e, "Unattended registration failed");
            }
            return ControlFlow::Continue(());
        };

        let registration = result.map(|player_id| Registration {
            player_id,
            session: self.handle.clone(),
        });

        match reply.send(registration) {
            Ok(()) => ControlFlow::Continue(()),
            // The connection gave up waiting; nobody will ever unregister it
            Err(Ok(orphan)) => self.unregister(orphan.player_id),
            Err(Err(_)) => ControlFlow::Continue(()),
        }
    }

    fn unregister(&mut self, player_id: PlayerId) -> ControlFlow<()> {
        if self.state.remove_player(player_id).is_none() {
            debug!(session_id = self.state.id, player_id, "Unregister for unknown player");
        }
        self.publish_player_count();

        if self.state.has_human() {
            ControlFlow::Continue(())
        } else {
            ControlFlow::Break(())
        }
    }

    /// Advance the match, encode the snapshot once and fan it out
    fn on_tick(&mut self, now: Micros) {
        self.state.tick(now);
        self.state.refresh_snapshot();

        for input in self.state.notify_controllers(now) {
            self.state.submit_input(input);
        }
    }

    fn publish_player_count(&self) {
        self.handle
            .player_count
            .store(self.state.player_count(), Ordering::Relaxed);
    }

    /// Stop accepting commands, turn away anything still queued, then wait
    /// for the registry to drop this session.
    async fn shutdown(&mut self) {
        let id = self.state.id;
        self.commands.close();

        while let Ok(command) = self.commands.try_recv() {
            if let SessionCommand::RegisterPlayer { reply: Some(reply), .. } = command {
                let _ = reply.send(Err(SessionError::Closed(id)));
            }
        }

        let (ack, acked) = oneshot::channel();
        let closed = RegistryCommand::SessionClosed {
            session_id: id,
            generation: self.handle.generation,
            ack,
        };
        if self.registry.send(closed).await.is_ok() {
            let _ = acked.await;
        } else {
            warn!(session_id = id, "Registry gone before session close");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::input::InputState;
    use crate::game::r#match::MatchPhase;
    use crate::ws::protocol::decode_recipient_frame;
    use tokio_test::assert_ok;

    fn session() -> (GameSession, SessionHandle, mpsc::Receiver<RegistryCommand>) {
        let (registry_tx, registry_rx) = mpsc::channel(8);
        let (session, handle) = GameSession::new(5, 1, Arc::new(CourtConfig::default()), 99, registry_tx);
        (session, handle, registry_rx)
    }

    fn register(session: &mut GameSession, controller: Controller, now: Micros) -> PlayerId {
        let (reply, mut response) = oneshot::channel();
        let flow = session.handle_command(
            SessionCommand::RegisterPlayer { controller, reply: Some(reply) },
            now,
        );
        assert!(flow.is_continue());
        assert_ok!(response.try_recv().expect("reply sent")).player_id
    }

    #[test]
    fn test_snapshot_fanned_out_with_recipient_prefix() {
        let (mut session, handle, _registry) = session();
        let (tx, mut rx) = mpsc::channel(8);
        let id = register(&mut session, Controller::network(tx), 0);
        assert_eq!(handle.player_count(), 1);

        session.on_tick(1_000);

        let frame = rx.try_recv().expect("snapshot delivered");
        let decoded = decode_recipient_frame(&frame).unwrap();
        assert_eq!(decoded.recipient_id, id);
        assert_eq!(decoded.last_sequence, 0);
        assert_eq!(decoded.snapshot.players.len(), 1);
        assert_eq!(decoded.snapshot.phase, MatchPhase::WaitingForPlayers);
    }

    #[test]
    fn test_bot_input_submitted_each_tick() {
        let (mut session, _handle, _registry) = session();
        let (tx, _rx) = mpsc::channel(64);
        register(&mut session, Controller::network(tx), 0);
        let bot = register(&mut session, Controller::autonomous(&CourtConfig::default()), 0);

        let start = session.state.deadline().unwrap();
        session.on_tick(start);
        assert_eq!(session.state.phase(), MatchPhase::Running);
        session.on_tick(start + 16_666);

        let sequence = session.state.player(bot).map(|p| p.inputs.last_sequence());
        assert_eq!(sequence, Some(2));
    }

    #[test]
    fn test_last_human_leaving_stops_session() {
        let (mut session, _handle, _registry) = session();
        let (tx, _rx) = mpsc::channel(8);
        let human = register(&mut session, Controller::network(tx), 0);
        register(&mut session, Controller::autonomous(&CourtConfig::default()), 0);

        let flow = session.handle_command(SessionCommand::UnregisterPlayer { player_id: human }, 0);
        assert!(flow.is_break());
    }

    #[test]
    fn test_dropped_reply_undoes_registration() {
        let (mut session, handle, _registry) = session();
        let (tx, _rx) = mpsc::channel(8);
        let (reply, response) = oneshot::channel();
        drop(response);

        let flow = session.handle_command(
            SessionCommand::RegisterPlayer { controller: Controller::network(tx), reply: Some(reply) },
            0,
        );
        assert!(flow.is_break());
        assert_eq!(handle.player_count(), 0);
    }

    #[test]
    fn test_input_routed_to_player() {
        let (mut session, _handle, _registry) = session();
        let (tx, _rx) = mpsc::channel(64);
        let first = register(&mut session, Controller::network(tx.clone()), 0);
        register(&mut session, Controller::network(tx), 0);
        let start = session.state.deadline().unwrap();
        session.on_tick(start);

        let event = InputEvent {
            player_id: first,
            state: InputState { up: true, down: false, timestamp: start, sequence: 31 },
        };
        let flow = session.handle_command(SessionCommand::SubmitInput(event), start);
        assert!(flow.is_continue());
        assert_eq!(session.state.player(first).map(|p| p.inputs.last_sequence()), Some(31));
    }

    #[tokio::test]
    async fn test_run_notifies_registry_on_close() {
        let (session, handle, mut registry) = session();
        let task = tokio::spawn(session.run());

        let (tx, _rx) = mpsc::channel(64);
        let registration = assert_ok!(handle.register_player(Controller::network(tx)).await);
        handle.unregister_player(registration.player_id).await;

        match registry.recv().await {
            Some(RegistryCommand::SessionClosed { session_id, generation, ack }) => {
                assert_eq!(session_id, 5);
                assert_eq!(generation, 1);
                let _ = ack.send(());
            }
            _ => panic!("expected session close notice"),
        }

        assert_ok!(task.await);
        assert!(handle.is_closed());
        assert_eq!(
            handle.register_player(Controller::autonomous(&CourtConfig::default())).await.unwrap_err(),
            SessionError::Closed(5)
        );
    }
}
