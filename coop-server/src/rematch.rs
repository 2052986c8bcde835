use std::time::Instant;

use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use coop_core::CoopRun;
use coop_types::{Room, RoomError, RoomId, RoomPlayer, RoomStatus, ServerMessage};

use crate::room_store::{Outbound, RoomStore};

/// A pending two-party agreement to play again. Exists only between the
/// request and the response; any departure from the room discards it.
#[derive(Debug, Clone)]
pub struct RematchOffer {
    pub room_id: RoomId,
    pub requester_id: Uuid,
    pub requester_name: String,
    pub created_at: Instant,
}

#[derive(Debug)]
pub struct RematchReport {
    pub events: Vec<Outbound>,
    pub new_room_id: Option<RoomId>,
}

impl RoomStore {
    /// Offer a rematch to the other member. With no second member this is
    /// a silent no-op, not an error.
    pub async fn request_rematch(
        &self,
        room_id: &str,
        requester_id: Uuid,
    ) -> Result<RematchReport, RoomError> {
        let session = self.session(room_id).await?;
        let mut session = session.lock().await;
        session.touch();

        let requester_name = session
            .room
            .seat_of(requester_id)
            .map(|p| p.name.clone())
            .ok_or_else(|| RoomError::RoomNotFound {
                room_id: room_id.to_string(),
            })?;

        let Some(partner) = session.room.partner_of(requester_id).cloned() else {
            return Ok(RematchReport {
                events: Vec::new(),
                new_room_id: None,
            });
        };

        session.pending_rematch = Some(RematchOffer {
            room_id: room_id.to_string(),
            requester_id,
            requester_name: requester_name.clone(),
            created_at: Instant::now(),
        });

        Ok(RematchReport {
            events: vec![Outbound::User(
                partner.user_id,
                ServerMessage::RematchRequest {
                    room_id: room_id.to_string(),
                    requester_id,
                    requester_name,
                },
            )],
            new_room_id: None,
        })
    }

    /// Resolve a pending offer. Acceptance spins up a fresh room seeded
    /// with the same two players and tells both sides where to go, so it
    /// doesn't matter who pressed accept last.
    pub async fn respond_rematch(
        &self,
        room_id: &str,
        responder_id: Uuid,
        accepted: bool,
    ) -> Result<RematchReport, RoomError> {
        let session_arc = self.session(room_id).await?;
        let (offer, requester_seat, responder_seat, games_played) = {
            let mut session = session_arc.lock().await;
            session.touch();

            let responder_seat = session
                .room
                .seat_of(responder_id)
                .cloned()
                .ok_or_else(|| RoomError::RoomNotFound {
                    room_id: room_id.to_string(),
                })?;

            // No offer on the table (or it was cancelled by a leave):
            // the responder is acting on a stale view.
            let offer = session
                .pending_rematch
                .take()
                .ok_or(RoomError::RoomNotActive)?;

            let requester_seat = session
                .room
                .seat_of(offer.requester_id)
                .cloned()
                .ok_or(RoomError::RoomNotActive)?;

            (offer, requester_seat, responder_seat, session.room.games_played)
        };

        if !accepted {
            info!("Rematch declined in room {}", room_id);
            return Ok(RematchReport {
                events: vec![Outbound::User(
                    offer.requester_id,
                    ServerMessage::RematchResponse {
                        room_id: room_id.to_string(),
                        accepted: false,
                        responder_id,
                        responder_name: responder_seat.name,
                        new_room_id: None,
                    },
                )],
                new_room_id: None,
            });
        }

        let new_room_id = self
            .spawn_rematch_room(requester_seat, responder_seat.clone(), games_played)
            .await?;

        info!("Rematch accepted: {} -> {}", room_id, new_room_id);

        let response = ServerMessage::RematchResponse {
            room_id: room_id.to_string(),
            accepted: true,
            responder_id,
            responder_name: responder_seat.name,
            new_room_id: Some(new_room_id.clone()),
        };

        Ok(RematchReport {
            events: vec![
                Outbound::User(offer.requester_id, response.clone()),
                Outbound::User(responder_id, response),
            ],
            new_room_id: Some(new_room_id),
        })
    }

    /// Build the follow-up room: both seats pre-filled, already `playing`,
    /// requester opens. The word is fetched before any lock is taken.
    async fn spawn_rematch_room(
        &self,
        requester: RoomPlayer,
        responder: RoomPlayer,
        games_played: u32,
    ) -> Result<RoomId, RoomError> {
        let first_word = match self.evaluator().next_word().await {
            Ok(Some(word)) => word,
            _ => return Err(RoomError::EvaluatorUnavailable),
        };

        let code = self.unused_code().await;
        self.reserve_pair(requester.user_id, responder.user_id, &code)?;

        let seats = [requester.user_id, responder.user_id];
        let now = Utc::now().to_rfc3339();
        let room = Room {
            room_id: code.clone(),
            status: RoomStatus::Playing,
            players: vec![
                RoomPlayer {
                    is_creator: true,
                    ..requester
                },
                RoomPlayer {
                    is_creator: false,
                    ..responder
                },
            ],
            creator_id: seats[0],
            games_played,
            created_at: now.clone(),
            started_at: Some(now),
            finished_at: None,
        };

        let run = CoopRun::new(seats, first_word, self.max_attempts());
        Ok(self.insert_session(room, run).await)
    }
}
