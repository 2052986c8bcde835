use serde::{Deserialize, Serialize};
use ts_rs::TS;
use uuid::Uuid;

use crate::RoomId;

/// Typed failures for every room mutation. Membership errors surface to
/// the joining user; turn/state errors mean the caller's view is stale and
/// should be re-fetched; validation errors leave room state untouched and
/// the client just re-prompts.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize, TS)]
#[ts(export)]
pub enum RoomError {
    #[error("room {room_id} not found")]
    RoomNotFound { room_id: RoomId },
    #[error("room {room_id} already has two players")]
    RoomFull { room_id: RoomId },
    #[error("user {user_id} is already in room {room_id}")]
    AlreadyInRoom { room_id: RoomId, user_id: Uuid },
    #[error("it is not your turn")]
    NotYourTurn,
    #[error("room is not in an active run")]
    RoomNotActive,
    #[error("expected a {expected}-letter word, got {actual} letters")]
    InvalidWordLength { expected: u32, actual: u32 },
    #[error("word not allowed: {word}")]
    WordNotAllowed { word: String },
    #[error("word service unavailable")]
    EvaluatorUnavailable,
}

impl RoomError {
    /// Validation errors are locally recoverable: the submitting client
    /// re-prompts without re-fetching anything.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            RoomError::InvalidWordLength { .. } | RoomError::WordNotAllowed { .. }
        )
    }

    /// Turn/state errors signal that the caller's local view is stale and a
    /// forced re-fetch of authoritative state is in order.
    pub fn is_stale_view(&self) -> bool {
        matches!(self, RoomError::NotYourTurn | RoomError::RoomNotActive)
    }
}
