use std::collections::HashMap;
use std::fmt;
use std::time::{Duration, Instant};

use tokio::sync::{RwLock, mpsc};
use uuid::Uuid;

use coop_types::{RoomId, ServerMessage, UserProfile};

use crate::room_store::Outbound;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One live event-channel session. The room binding is a subscription, not
/// membership: dropping the connection never removes the player from their
/// room.
#[derive(Debug, Clone)]
pub struct Connection {
    pub id: ConnectionId,
    pub user: Option<UserProfile>,
    pub room_id: Option<RoomId>,
    pub connected_at: Instant,
    pub last_activity: Instant,
    pub sender: mpsc::UnboundedSender<ServerMessage>,
}

impl Connection {
    pub fn new(id: ConnectionId) -> (Self, mpsc::UnboundedReceiver<ServerMessage>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let now = Instant::now();

        let connection = Self {
            id,
            user: None,
            room_id: None,
            connected_at: now,
            last_activity: now,
            sender,
        };

        (connection, receiver)
    }

    pub fn is_authenticated(&self) -> bool {
        self.user.is_some()
    }

    pub fn update_activity(&mut self) {
        self.last_activity = Instant::now();
    }

    pub fn send_message(&self, message: ServerMessage) -> Result<(), String> {
        self.sender
            .send(message)
            .map_err(|_| "Connection closed".to_string())
    }

    pub fn is_inactive(&self, timeout: Duration) -> bool {
        self.last_activity.elapsed() > timeout
    }
}

/// Registry of live connections with room-scoped fan-out. A user has at
/// most one registered connection; a reconnect simply takes the slot over.
pub struct ConnectionManager {
    connections: RwLock<HashMap<ConnectionId, Connection>>,
    user_to_connection: RwLock<HashMap<Uuid, ConnectionId>>,
}

impl ConnectionManager {
    pub fn new() -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
            user_to_connection: RwLock::new(HashMap::new()),
        }
    }

    pub async fn create_connection(
        &self,
        id: ConnectionId,
    ) -> mpsc::UnboundedReceiver<ServerMessage> {
        let (conn, receiver) = Connection::new(id);

        {
            let mut connections = self.connections.write().await;
            connections.insert(id, conn);
        }

        receiver
    }

    pub async fn remove_connection(&self, id: ConnectionId) {
        let user_id = {
            let mut connections = self.connections.write().await;
            connections.remove(&id).and_then(|c| c.user.map(|u| u.id))
        };

        if let Some(user_id) = user_id {
            let mut user_to_connection = self.user_to_connection.write().await;
            // Only drop the mapping if it still points at this connection;
            // a reconnect may already own the slot.
            if user_to_connection.get(&user_id) == Some(&id) {
                user_to_connection.remove(&user_id);
            }
        }
    }

    pub async fn get_connection(&self, id: ConnectionId) -> Option<Connection> {
        let connections = self.connections.read().await;
        connections.get(&id).cloned()
    }

    /// Bind an identity to a connection. A user reconnecting before their
    /// old socket is reaped takes the slot over; the latest connection
    /// wins.
    pub async fn authenticate_connection(&self, id: ConnectionId, user: UserProfile) -> Result<(), String> {
        let user_id = user.id;

        {
            let mut connections = self.connections.write().await;
            let connection = connections.get_mut(&id).ok_or("Connection not found")?;
            connection.user = Some(user);
        }

        let previous = {
            let mut user_to_connection = self.user_to_connection.write().await;
            user_to_connection.insert(user_id, id)
        };
        if let Some(previous) = previous {
            if previous != id {
                tracing::info!(
                    "User {} reconnected; superseding connection {}",
                    user_id,
                    previous
                );
            }
        }

        Ok(())
    }

    pub async fn update_activity(&self, id: ConnectionId) {
        let mut connections = self.connections.write().await;
        if let Some(connection) = connections.get_mut(&id) {
            connection.update_activity();
        }
    }

    pub async fn set_connection_room(&self, id: ConnectionId, room_id: Option<RoomId>) {
        let mut connections = self.connections.write().await;
        if let Some(connection) = connections.get_mut(&id) {
            connection.room_id = room_id;
        }
    }

    pub async fn send_to_connection(
        &self,
        id: ConnectionId,
        message: ServerMessage,
    ) -> Result<(), String> {
        let connections = self.connections.read().await;
        match connections.get(&id) {
            Some(connection) => connection.send_message(message),
            None => Err("Connection not found".to_string()),
        }
    }

    pub async fn send_to_user(&self, user_id: Uuid, message: ServerMessage) -> Result<(), String> {
        let connection_id = {
            let user_to_connection = self.user_to_connection.read().await;
            user_to_connection.get(&user_id).copied()
        };

        match connection_id {
            Some(id) => self.send_to_connection(id, message).await,
            None => Err("User not connected".to_string()),
        }
    }

    pub async fn send_to_room(&self, room_id: &str, message: ServerMessage) {
        let connections = self.connections.read().await;
        for connection in connections.values() {
            if connection.room_id.as_deref() == Some(room_id) {
                let _ = connection.send_message(message.clone());
            }
        }
    }

    pub async fn send_to_room_except(
        &self,
        room_id: &str,
        except: ConnectionId,
        message: ServerMessage,
    ) {
        let connections = self.connections.read().await;
        for connection in connections.values() {
            if connection.id != except && connection.room_id.as_deref() == Some(room_id) {
                let _ = connection.send_message(message.clone());
            }
        }
    }

    /// Fan out a batch of store-produced events. A targeted event for a
    /// user with no live connection is dropped; the reconciler re-syncs
    /// them on reconnect.
    pub async fn deliver(&self, room_id: &str, events: Vec<Outbound>) {
        for event in events {
            match event {
                Outbound::Room(message) => self.send_to_room(room_id, message).await,
                Outbound::User(user_id, message) => {
                    let _ = self.send_to_user(user_id, message).await;
                }
            }
        }
    }

    pub async fn cleanup_inactive_connections(&self, timeout: Duration) {
        let inactive: Vec<ConnectionId> = {
            let connections = self.connections.read().await;
            connections
                .values()
                .filter(|c| c.is_inactive(timeout))
                .map(|c| c.id)
                .collect()
        };

        for id in inactive {
            tracing::info!("Removing inactive connection: {}", id);
            self.remove_connection(id).await;
        }
    }

    // Test helper methods
    pub async fn connection_count(&self) -> usize {
        let connections = self.connections.read().await;
        connections.len()
    }

    pub async fn user_connection_count(&self) -> usize {
        let user_connections = self.user_to_connection.read().await;
        user_connections.len()
    }
}

impl Default for ConnectionManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(name: &str) -> UserProfile {
        UserProfile {
            id: Uuid::new_v4(),
            display_name: name.to_string(),
            avatar: None,
        }
    }

    fn error_message(text: &str) -> ServerMessage {
        ServerMessage::Error {
            message: text.to_string(),
        }
    }

    #[tokio::test]
    async fn test_connection_creation_and_removal() {
        let manager = ConnectionManager::new();
        let conn_id = ConnectionId::new();

        let _receiver = manager.create_connection(conn_id).await;
        assert_eq!(manager.connection_count().await, 1);

        manager.remove_connection(conn_id).await;
        assert_eq!(manager.connection_count().await, 0);
    }

    #[tokio::test]
    async fn test_reconnect_supersedes_old_connection() {
        let manager = ConnectionManager::new();
        let user = profile("Alice");

        let old = ConnectionId::new();
        let new = ConnectionId::new();
        let _r1 = manager.create_connection(old).await;
        let _r2 = manager.create_connection(new).await;

        manager.authenticate_connection(old, user.clone()).await.unwrap();
        manager.authenticate_connection(new, user.clone()).await.unwrap();
        assert_eq!(manager.user_connection_count().await, 1);

        // reaping the superseded socket must not evict the new mapping
        manager.remove_connection(old).await;
        let mut receiver = {
            let connections = manager.connections.read().await;
            assert!(connections.contains_key(&new));
            drop(connections);
            manager.create_connection(ConnectionId::new()).await
        };
        manager
            .send_to_user(user.id, error_message("ping"))
            .await
            .unwrap();
        assert!(receiver.try_recv().is_err()); // went to `new`, not this one
    }

    #[tokio::test]
    async fn test_room_fanout_reaches_only_subscribers() {
        let manager = ConnectionManager::new();
        let a = ConnectionId::new();
        let b = ConnectionId::new();
        let c = ConnectionId::new();

        let mut recv_a = manager.create_connection(a).await;
        let mut recv_b = manager.create_connection(b).await;
        let mut recv_c = manager.create_connection(c).await;

        manager.set_connection_room(a, Some("ROOM01".to_string())).await;
        manager.set_connection_room(b, Some("ROOM01".to_string())).await;
        manager.set_connection_room(c, Some("OTHER9".to_string())).await;

        manager.send_to_room("ROOM01", error_message("hello")).await;

        assert!(recv_a.try_recv().is_ok());
        assert!(recv_b.try_recv().is_ok());
        assert!(recv_c.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_send_to_room_except_skips_the_origin() {
        let manager = ConnectionManager::new();
        let a = ConnectionId::new();
        let b = ConnectionId::new();

        let mut recv_a = manager.create_connection(a).await;
        let mut recv_b = manager.create_connection(b).await;

        manager.set_connection_room(a, Some("ROOM01".to_string())).await;
        manager.set_connection_room(b, Some("ROOM01".to_string())).await;

        manager
            .send_to_room_except("ROOM01", a, error_message("partner only"))
            .await;

        assert!(recv_a.try_recv().is_err());
        assert!(recv_b.try_recv().is_ok());
    }

    #[tokio::test]
    async fn test_message_to_closed_connection_errors() {
        let manager = ConnectionManager::new();
        let conn_id = ConnectionId::new();

        let receiver = manager.create_connection(conn_id).await;
        drop(receiver);

        let result = manager.send_to_connection(conn_id, error_message("test")).await;
        assert_eq!(result.unwrap_err(), "Connection closed");
    }

    #[tokio::test]
    async fn test_inactive_connections_are_reaped() {
        let manager = ConnectionManager::new();
        let conn_id = ConnectionId::new();
        let _receiver = manager.create_connection(conn_id).await;

        let short = Duration::from_millis(10);
        manager.cleanup_inactive_connections(short).await;
        assert_eq!(manager.connection_count().await, 1);

        tokio::time::sleep(Duration::from_millis(20)).await;
        manager.cleanup_inactive_connections(short).await;
        assert_eq!(manager.connection_count().await, 0);
    }

    #[tokio::test]
    async fn test_concurrent_connection_churn() {
        let manager = std::sync::Arc::new(ConnectionManager::new());
        let mut handles = Vec::new();

        for i in 0..50 {
            let manager = manager.clone();
            handles.push(tokio::spawn(async move {
                let conn_id = ConnectionId::new();
                let _receiver = manager.create_connection(conn_id).await;
                tokio::time::sleep(Duration::from_millis(1)).await;
                manager
                    .authenticate_connection(conn_id, profile(&format!("user_{}", i)))
                    .await
                    .unwrap();
                manager.remove_connection(conn_id).await;
            }));
        }

        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(manager.connection_count().await, 0);
        assert_eq!(manager.user_connection_count().await, 0);
    }
}
