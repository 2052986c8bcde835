use serde::{Deserialize, Serialize};
use ts_rs::TS;
use uuid::Uuid;

use crate::{EndReason, Guess, NextWord, RoomId, RoomPlayer, RunState, UserProfile};

/// Commands a client may send over the event channel. Everything except
/// `Authenticate` and `Heartbeat` is scoped to a room.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub enum ClientMessage {
    Authenticate { token: String },
    JoinRoom { room_id: RoomId },
    LeaveRoom { room_id: RoomId },
    SubmitGuess { room_id: RoomId, word: String },
    RematchRequest { room_id: RoomId },
    RematchResponse { room_id: RoomId, accepted: bool },
    Heartbeat,
}

/// Events pushed to room members. Delivery is at-least-once with no
/// ordering guarantee, so every event carries enough context to be applied
/// idempotently (see the reconciler in coop-core).
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub enum ServerMessage {
    AuthenticationSuccess {
        user: UserProfile,
    },
    AuthenticationFailed {
        reason: String,
    },
    PlayerJoined {
        room_id: RoomId,
        player: RoomPlayer,
        players_count: u32,
    },
    GameStarted {
        room_id: RoomId,
        run: RunState,
        current_turn_player_id: Uuid,
    },
    GuessMade {
        room_id: RoomId,
        player_id: Uuid,
        player_name: String,
        guess: Guess,
        attempt_number: u32,
    },
    TurnChanged {
        room_id: RoomId,
        current_turn_player_id: Uuid,
        current_turn_player_name: String,
    },
    WordCompleted {
        room_id: RoomId,
        word: String,
        next_word: Option<NextWord>,
        current_score: u32,
    },
    GameOver {
        room_id: RoomId,
        final_score: u32,
        words_completed: u32,
        reason: EndReason,
    },
    PlayerAbandoned {
        room_id: RoomId,
        player_id: Uuid,
        player_name: String,
    },
    PlayerLeft {
        room_id: RoomId,
        player_id: Uuid,
        player_name: String,
    },
    RematchRequest {
        room_id: RoomId,
        requester_id: Uuid,
        requester_name: String,
    },
    RematchResponse {
        room_id: RoomId,
        accepted: bool,
        responder_id: Uuid,
        responder_name: String,
        new_room_id: Option<RoomId>,
    },
    Error {
        message: String,
    },
}
