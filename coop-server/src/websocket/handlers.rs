use std::sync::Arc;

use tracing::{info, warn};

use coop_types::{ClientMessage, RoomStatus, ServerMessage, UserProfile};

use crate::identity::IdentityService;
use crate::room_store::RoomStore;
use crate::websocket::connection::{ConnectionId, ConnectionManager};

#[derive(Clone)]
pub struct MessageHandler {
    connection_id: ConnectionId,
    connections: Arc<ConnectionManager>,
    store: Arc<RoomStore>,
    identity: Arc<IdentityService>,
}

impl MessageHandler {
    pub fn new(
        connection_id: ConnectionId,
        connections: Arc<ConnectionManager>,
        store: Arc<RoomStore>,
        identity: Arc<IdentityService>,
    ) -> Self {
        Self {
            connection_id,
            connections,
            store,
            identity,
        }
    }

    pub async fn handle_message(&self, message: ClientMessage) -> Result<(), String> {
        self.connections.update_activity(self.connection_id).await;

        match message {
            ClientMessage::Authenticate { token } => self.handle_authenticate(&token).await,
            ClientMessage::JoinRoom { room_id } => self.handle_join(&room_id).await,
            ClientMessage::LeaveRoom { room_id } => self.handle_leave(&room_id).await,
            ClientMessage::SubmitGuess { room_id, word } => {
                self.handle_guess(&room_id, &word).await
            }
            ClientMessage::RematchRequest { room_id } => {
                self.handle_rematch_request(&room_id).await
            }
            ClientMessage::RematchResponse { room_id, accepted } => {
                self.handle_rematch_response(&room_id, accepted).await
            }
            // Heartbeat exists only to feed the activity tracker above.
            ClientMessage::Heartbeat => Ok(()),
        }
    }

    /// A dropped socket is not a leave. The subscription dies with the
    /// connection; membership and any live run stay exactly as they are
    /// until an explicit leave/force-leave arrives.
    pub async fn handle_disconnect(&self) {
        info!("Connection {} disconnected", self.connection_id);
    }

    async fn handle_authenticate(&self, token: &str) -> Result<(), String> {
        match self.identity.validate_token(token) {
            Ok(user) => {
                self.connections
                    .authenticate_connection(self.connection_id, user.clone())
                    .await?;
                self.send(ServerMessage::AuthenticationSuccess { user }).await
            }
            Err(e) => {
                warn!("Authentication failed for {}: {}", self.connection_id, e);
                self.send(ServerMessage::AuthenticationFailed {
                    reason: e.to_string(),
                })
                .await
            }
        }
    }

    /// Subscribe this connection to its room's event stream. Idempotent:
    /// re-issuing after a reconnect re-syncs the run snapshot to the caller
    /// only and never duplicates membership (that happened over REST).
    async fn handle_join(&self, room_id: &str) -> Result<(), String> {
        let Some(user) = self.authenticated_user().await? else {
            return Ok(());
        };

        let view = match self.store.room_sync(room_id, user.id).await {
            Ok(view) => view,
            Err(e) => return self.send_error(&e.to_string()).await,
        };

        let newly_subscribed = self
            .connections
            .get_connection(self.connection_id)
            .await
            .is_none_or(|c| c.room_id.as_deref() != Some(room_id));

        self.connections
            .set_connection_room(self.connection_id, Some(room_id.to_string()))
            .await;

        // First subscribe on this connection: let the partner know the
        // seat is live again. A re-issued join stays silent toward them.
        if newly_subscribed {
            if let Some(seat) = view.room.seat_of(user.id) {
                self.connections
                    .send_to_room_except(
                        room_id,
                        self.connection_id,
                        ServerMessage::PlayerJoined {
                            room_id: room_id.to_string(),
                            player: seat.clone(),
                            players_count: view.room.players.len() as u32,
                        },
                    )
                    .await;
            }
        }

        // Late or re-joining subscriber: hand them the authoritative run
        // state directly instead of waiting for the next push.
        if view.room.status == RoomStatus::Playing {
            if let (Some(run), Some(turn)) = (view.run, view.current_turn_player_id) {
                self.send(ServerMessage::GameStarted {
                    room_id: room_id.to_string(),
                    run,
                    current_turn_player_id: turn,
                })
                .await?;
            }
        }

        info!("Connection {} subscribed to room {}", self.connection_id, room_id);
        Ok(())
    }

    async fn handle_leave(&self, room_id: &str) -> Result<(), String> {
        let Some(user) = self.authenticated_user().await? else {
            return Ok(());
        };

        match self.store.leave_room(room_id, user.id).await {
            Ok(report) => {
                // Events first so the departing player's partner hears
                // about it while both are still subscribed.
                self.connections.deliver(room_id, report.events).await;
                self.connections
                    .set_connection_room(self.connection_id, None)
                    .await;
                Ok(())
            }
            Err(e) => self.send_error(&e.to_string()).await,
        }
    }

    async fn handle_guess(&self, room_id: &str, word: &str) -> Result<(), String> {
        let Some(user) = self.authenticated_user().await? else {
            return Ok(());
        };

        match self.store.submit_guess(room_id, user.id, word).await {
            Ok(report) => {
                self.connections.deliver(room_id, report.events).await;
                Ok(())
            }
            Err(e) => self.send_error(&e.to_string()).await,
        }
    }

    async fn handle_rematch_request(&self, room_id: &str) -> Result<(), String> {
        let Some(user) = self.authenticated_user().await? else {
            return Ok(());
        };

        match self.store.request_rematch(room_id, user.id).await {
            Ok(report) => {
                self.connections.deliver(room_id, report.events).await;
                Ok(())
            }
            Err(e) => self.send_error(&e.to_string()).await,
        }
    }

    async fn handle_rematch_response(&self, room_id: &str, accepted: bool) -> Result<(), String> {
        let Some(user) = self.authenticated_user().await? else {
            return Ok(());
        };

        match self.store.respond_rematch(room_id, user.id, accepted).await {
            Ok(report) => {
                self.connections.deliver(room_id, report.events).await;
                Ok(())
            }
            Err(e) => self.send_error(&e.to_string()).await,
        }
    }

    /// `Ok(None)` means the caller isn't authenticated yet: the error has
    /// already been pushed to them and the connection stays open so they
    /// can authenticate and retry.
    async fn authenticated_user(&self) -> Result<Option<UserProfile>, String> {
        let connection = self
            .connections
            .get_connection(self.connection_id)
            .await
            .ok_or("Connection not found")?;

        match connection.user {
            Some(user) => Ok(Some(user)),
            None => {
                self.send_error("Authentication required").await?;
                Ok(None)
            }
        }
    }

    async fn send(&self, message: ServerMessage) -> Result<(), String> {
        self.connections
            .send_to_connection(self.connection_id, message)
            .await
    }

    async fn send_error(&self, message: &str) -> Result<(), String> {
        self.send(ServerMessage::Error {
            message: message.to_string(),
        })
        .await
    }
}
