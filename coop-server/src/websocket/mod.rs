use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tracing::{error, info, warn};
use warp::ws::{Message, WebSocket};

use coop_types::ClientMessage;

use crate::identity::IdentityService;
use crate::room_store::RoomStore;

pub mod connection;
pub mod handlers;
pub mod limiter;

use connection::ConnectionId;
pub use connection::ConnectionManager;
use handlers::MessageHandler;
use limiter::CommandBudget;

pub async fn handle_connection(
    websocket: WebSocket,
    connections: Arc<ConnectionManager>,
    store: Arc<RoomStore>,
    identity: Arc<IdentityService>,
) {
    let connection_id = ConnectionId::new();
    info!("New event channel connection: {}", connection_id);

    let (mut ws_sender, mut ws_receiver) = websocket.split();
    let budget = CommandBudget::new();

    let message_receiver = connections.create_connection(connection_id).await;

    let handler = MessageHandler::new(
        connection_id,
        connections.clone(),
        store.clone(),
        identity.clone(),
    );

    // Inbound: client commands
    let incoming = {
        let handler = handler.clone();
        let mut budget = budget.clone();

        async move {
            while let Some(result) = ws_receiver.next().await {
                match result {
                    Ok(msg) => {
                        if let Err(e) =
                            handle_frame(msg, &mut budget, &handler, connection_id).await
                        {
                            error!("Error handling frame for {}: {}", connection_id, e);
                            break;
                        }
                    }
                    Err(e) => {
                        warn!("WebSocket error for {}: {}", connection_id, e);
                        break;
                    }
                }
            }
        }
    };

    // Outbound: pushed room events
    let outgoing = {
        async move {
            let mut receiver = message_receiver;

            while let Some(message) = receiver.recv().await {
                let json = match serde_json::to_string(&message) {
                    Ok(json) => json,
                    Err(e) => {
                        error!("Failed to serialize message: {:?}", e);
                        continue;
                    }
                };

                if let Err(e) = ws_sender.send(Message::text(json)).await {
                    warn!("Failed to send message to {}: {:?}", connection_id, e);
                    break;
                }
            }
        }
    };

    tokio::select! {
        _ = incoming => {},
        _ = outgoing => {},
    }

    // The drop only tears down the subscription. Room membership survives
    // until an explicit leave command (possibly from a reconnected socket).
    handler.handle_disconnect().await;
    connections.remove_connection(connection_id).await;
}

async fn handle_frame(
    msg: Message,
    budget: &mut CommandBudget,
    handler: &MessageHandler,
    connection_id: ConnectionId,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    if !budget.allow() {
        warn!("Command budget exceeded for connection {}", connection_id);
        return Err("Command budget exceeded".into());
    }

    if !msg.is_text() {
        return Ok(());
    }

    let text = msg.to_str().map_err(|_| "Invalid text frame")?;

    let command: ClientMessage =
        serde_json::from_str(text).map_err(|e| format!("Invalid JSON message: {}", e))?;

    handler
        .handle_message(command)
        .await
        .map_err(|e| format!("Message handling error: {}", e))?;

    Ok(())
}
