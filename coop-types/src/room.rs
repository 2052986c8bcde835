use serde::{Deserialize, Serialize};
use ts_rs::TS;
use uuid::Uuid;

use crate::RoomId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "lowercase")]
pub enum RoomStatus {
    /// One seat filled, waiting for a partner.
    Waiting,
    /// Both seats filled, a run is in progress.
    Playing,
    /// Terminal. Entered exactly once; afterwards the room only serves
    /// rematch bookkeeping until it is swept.
    Finished,
}

/// Membership record, not identity. Seat order is join order and the first
/// seat is always the creator.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct RoomPlayer {
    pub user_id: Uuid,
    pub name: String,
    #[ts(type = "unknown")]
    pub avatar: Option<serde_json::Value>,
    pub is_creator: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Room {
    pub room_id: RoomId,
    pub status: RoomStatus,
    pub players: Vec<RoomPlayer>,
    pub creator_id: Uuid,
    /// Completed rounds across this room's lifetime, carried into rematches.
    pub games_played: u32,
    pub created_at: String, // ISO 8601 string
    pub started_at: Option<String>,
    pub finished_at: Option<String>,
}

impl Room {
    pub fn seat_of(&self, user_id: Uuid) -> Option<&RoomPlayer> {
        self.players.iter().find(|p| p.user_id == user_id)
    }

    pub fn partner_of(&self, user_id: Uuid) -> Option<&RoomPlayer> {
        self.players.iter().find(|p| p.user_id != user_id)
    }

    pub fn is_full(&self) -> bool {
        self.players.len() >= 2
    }
}
