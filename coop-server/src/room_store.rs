use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use rand::Rng;
use tokio::sync::{Mutex, RwLock};
use tracing::{info, warn};
use uuid::Uuid;

use coop_core::{CoopRun, EvaluateError, GuessEvaluator, GuessOutcome, WordListEvaluator};
use coop_types::{
    EndReason, PlayerId, Room, RoomError, RoomId, RoomPlayer, RoomStatus, RunState, ServerMessage,
    UserProfile,
};

use crate::rematch::RematchOffer;

const ROOM_CODE_ALPHABET: &[u8] = b"ABCDEFGHJKMNPQRSTUVWXYZ23456789";

/// One push event produced by a store mutation, addressed either to every
/// connection subscribed to the room or to one specific user.
#[derive(Debug, Clone)]
pub enum Outbound {
    Room(ServerMessage),
    User(PlayerId, ServerMessage),
}

/// Everything a mutation wants the transport to fan out, plus the state the
/// caller answers its own request with.
#[derive(Debug)]
pub struct JoinReport {
    pub room: Room,
    pub run: Option<RunState>,
    pub events: Vec<Outbound>,
}

#[derive(Debug)]
pub struct GuessReport {
    pub run: RunState,
    pub events: Vec<Outbound>,
}

#[derive(Debug)]
pub struct LeaveReport {
    pub room_id: RoomId,
    pub events: Vec<Outbound>,
    pub room_deleted: bool,
}

#[derive(Debug)]
pub struct MyRoomView {
    pub room: Room,
    pub run: Option<RunState>,
    pub current_turn_player_id: Option<Uuid>,
}

/// Live state of one room. Guarded by its own mutex, so all commands for a
/// room are processed one at a time while distinct rooms proceed
/// independently.
pub struct RoomSession {
    pub room: Room,
    pub run: Option<CoopRun>,
    pub pending_rematch: Option<RematchOffer>,
    last_activity: Instant,
}

impl RoomSession {
    fn new(room: Room) -> Self {
        Self {
            room,
            run: None,
            pending_rematch: None,
            last_activity: Instant::now(),
        }
    }

    pub fn touch(&mut self) {
        self.last_activity = Instant::now();
    }

    fn is_idle(&self, timeout: Duration) -> bool {
        self.last_activity.elapsed() > timeout
    }
}

/// Authoritative registry of rooms. Owns lifecycle, membership and the
/// one-active-room-per-user rule; delegates run semantics to `CoopRun` and
/// word judgements to the external evaluator.
pub struct RoomStore {
    rooms: RwLock<HashMap<RoomId, Arc<Mutex<RoomSession>>>>,
    /// user -> their single non-finished room. Entry-level atomicity is what
    /// makes the busy check race-free.
    user_index: DashMap<PlayerId, RoomId>,
    evaluator: Arc<dyn GuessEvaluator>,
    max_attempts: u32,
    code_length: usize,
}

impl RoomStore {
    pub fn new(evaluator: Arc<dyn GuessEvaluator>, max_attempts: u32, code_length: usize) -> Self {
        Self {
            rooms: RwLock::new(HashMap::new()),
            user_index: DashMap::new(),
            evaluator,
            max_attempts,
            code_length,
        }
    }

    /// Store over the built-in test vocabulary, for tests.
    pub fn with_test_evaluator() -> Self {
        Self::new(Arc::new(WordListEvaluator::with_test_words()), 5, 6)
    }

    fn generate_code(&self) -> RoomId {
        let mut rng = rand::thread_rng();
        (0..self.code_length)
            .map(|_| ROOM_CODE_ALPHABET[rng.gen_range(0..ROOM_CODE_ALPHABET.len())] as char)
            .collect()
    }

    async fn get_session(&self, room_id: &str) -> Result<Arc<Mutex<RoomSession>>, RoomError> {
        let rooms = self.rooms.read().await;
        rooms
            .get(room_id)
            .cloned()
            .ok_or_else(|| RoomError::RoomNotFound {
                room_id: room_id.to_string(),
            })
    }

    /// Reserve `user` for `room_id`, failing if they already hold a
    /// non-finished room. The entry API makes check-then-insert atomic.
    fn reserve_user(&self, user_id: PlayerId, room_id: &str) -> Result<(), RoomError> {
        match self.user_index.entry(user_id) {
            Entry::Occupied(existing) => Err(RoomError::AlreadyInRoom {
                room_id: existing.get().clone(),
                user_id,
            }),
            Entry::Vacant(slot) => {
                slot.insert(room_id.to_string());
                Ok(())
            }
        }
    }

    /// Drop index entries that still point at this room.
    fn release_members(&self, room: &Room) {
        for player in &room.players {
            self.user_index
                .remove_if(&player.user_id, |_, held| held == &room.room_id);
        }
    }

    pub async fn create_room(&self, user: &UserProfile) -> Result<Room, RoomError> {
        let mut rooms = self.rooms.write().await;

        let mut code = self.generate_code();
        while rooms.contains_key(&code) {
            code = self.generate_code();
        }
        // "create" while already seated somewhere is a rejection, not an
        // implicit move
        self.reserve_user(user.id, &code)?;

        let room = Room {
            room_id: code.clone(),
            status: RoomStatus::Waiting,
            players: vec![seat_for(user, true)],
            creator_id: user.id,
            games_played: 0,
            created_at: Utc::now().to_rfc3339(),
            started_at: None,
            finished_at: None,
        };

        rooms.insert(code.clone(), Arc::new(Mutex::new(RoomSession::new(room.clone()))));
        info!("Created room {} for {}", code, user.id);
        Ok(room)
    }

    /// Second join fills the room, flips it to `playing` and allocates the
    /// run. The word fetch is the one piece of I/O allowed inside the
    /// room's critical section.
    pub async fn join_room(&self, room_id: &str, user: &UserProfile) -> Result<JoinReport, RoomError> {
        let session = self.get_session(room_id).await?;
        let mut session = session.lock().await;
        session.touch();

        if session.room.seat_of(user.id).is_some() {
            return Err(RoomError::AlreadyInRoom {
                room_id: room_id.to_string(),
                user_id: user.id,
            });
        }
        if session.room.status != RoomStatus::Waiting || session.room.is_full() {
            return Err(RoomError::RoomFull {
                room_id: room_id.to_string(),
            });
        }

        self.reserve_user(user.id, room_id)?;

        let first_word = match self.evaluator.next_word().await {
            Ok(Some(word)) => word,
            Ok(None) => {
                self.user_index.remove_if(&user.id, |_, held| held == room_id);
                warn!("Word supply empty while starting room {}", room_id);
                return Err(RoomError::EvaluatorUnavailable);
            }
            Err(e) => {
                self.user_index.remove_if(&user.id, |_, held| held == room_id);
                warn!("Evaluator failed while starting room {}: {}", room_id, e);
                return Err(RoomError::EvaluatorUnavailable);
            }
        };

        let player = seat_for(user, false);
        session.room.players.push(player.clone());
        session.room.status = RoomStatus::Playing;
        session.room.started_at = Some(Utc::now().to_rfc3339());

        let seats = [session.room.players[0].user_id, session.room.players[1].user_id];
        let run = CoopRun::new(seats, first_word, self.max_attempts);
        let run_state = run.snapshot();
        session.run = Some(run);

        info!("Room {} is now playing, first turn {}", room_id, seats[0]);

        let events = vec![
            Outbound::Room(ServerMessage::PlayerJoined {
                room_id: room_id.to_string(),
                player,
                players_count: session.room.players.len() as u32,
            }),
            Outbound::Room(ServerMessage::GameStarted {
                room_id: room_id.to_string(),
                run: run_state.clone(),
                current_turn_player_id: seats[0],
            }),
        ];

        Ok(JoinReport {
            room: session.room.clone(),
            run: Some(run_state),
            events,
        })
    }

    pub async fn submit_guess(
        &self,
        room_id: &str,
        user_id: PlayerId,
        word: &str,
    ) -> Result<GuessReport, RoomError> {
        let session = self.get_session(room_id).await?;
        let mut session = session.lock().await;
        session.touch();

        let RoomSession { room, run, .. } = &mut *session;

        let player_name = room
            .seat_of(user_id)
            .map(|p| p.name.clone())
            .ok_or_else(|| RoomError::RoomNotFound {
                room_id: room_id.to_string(),
            })?;

        let run = run.as_mut().ok_or(RoomError::RoomNotActive)?;
        run.check_guess(user_id, word)?;

        let pattern = match self.evaluator.evaluate(word, run.target_word()).await {
            Ok(pattern) => pattern,
            Err(EvaluateError::WordNotAllowed { word }) => {
                return Err(RoomError::WordNotAllowed { word });
            }
            Err(EvaluateError::Backend { message }) => {
                warn!("Evaluator failed for room {}: {}", room_id, message);
                return Err(RoomError::EvaluatorUnavailable);
            }
        };

        let outcome = run.apply_guess(user_id, word, pattern);
        let guess = outcome.guess().clone();

        let mut events = vec![Outbound::Room(ServerMessage::GuessMade {
            room_id: room_id.to_string(),
            player_id: user_id,
            player_name,
            guess: guess.clone(),
            attempt_number: guess.attempt_number,
        })];

        match outcome {
            GuessOutcome::Continued { .. } => {
                push_turn_event(&mut events, room, run, room_id);
            }
            GuessOutcome::WordCompleted { completed_word, .. } => {
                let next = match self.evaluator.next_word().await {
                    Ok(next) => next,
                    Err(e) => {
                        // The solved word still counts; the run just ends
                        // here instead of rolling over.
                        warn!("Evaluator failed fetching next word for {}: {}", room_id, e);
                        None
                    }
                };
                run.advance_word(next);

                events.push(Outbound::Room(ServerMessage::WordCompleted {
                    room_id: room_id.to_string(),
                    word: completed_word,
                    next_word: run.state().next_word.clone(),
                    current_score: run.state().current_score,
                }));

                if run.is_terminal() {
                    events.push(game_over_event(room_id, run, EndReason::Completed));
                } else {
                    push_turn_event(&mut events, room, run, room_id);
                }
            }
            GuessOutcome::RunFailed { .. } => {
                events.push(game_over_event(room_id, run, EndReason::Failed));
            }
        }

        let run_state = run.snapshot();
        if run.is_terminal() {
            close_room(room);
            self.release_members(room);
            info!(
                "Room {} finished: score {}, {} words",
                room_id,
                run_state.current_score,
                run_state.words_completed
            );
        }

        Ok(GuessReport {
            run: run_state,
            events,
        })
    }

    /// Explicitly give up the current run while staying in the room (a
    /// rematch can still follow). Terminal runs absorb the call.
    pub async fn abandon(&self, room_id: &str, user_id: PlayerId) -> Result<LeaveReport, RoomError> {
        let session = self.get_session(room_id).await?;
        let mut session = session.lock().await;
        session.touch();

        let RoomSession { room, run, .. } = &mut *session;

        let player_name = room
            .seat_of(user_id)
            .map(|p| p.name.clone())
            .ok_or_else(|| RoomError::RoomNotFound {
                room_id: room_id.to_string(),
            })?;

        let run = run.as_mut().ok_or(RoomError::RoomNotActive)?;
        if run.is_terminal() {
            return Err(RoomError::RoomNotActive);
        }
        run.abandon();

        let events = vec![
            Outbound::Room(ServerMessage::PlayerAbandoned {
                room_id: room_id.to_string(),
                player_id: user_id,
                player_name,
            }),
            game_over_event(room_id, run, EndReason::Abandoned),
        ];

        close_room(room);
        self.release_members(room);
        info!("Room {} abandoned by {}", room_id, user_id);

        Ok(LeaveReport {
            room_id: room_id.to_string(),
            events,
            room_deleted: false,
        })
    }

    /// Remove a member. Leaving a playing room is an abandonment first;
    /// leaving a waiting room as the last member deletes it outright.
    pub async fn leave_room(&self, room_id: &str, user_id: PlayerId) -> Result<LeaveReport, RoomError> {
        let session_arc = self.get_session(room_id).await?;
        let mut events = Vec::new();
        let room_deleted;
        {
            let mut session = session_arc.lock().await;
            session.touch();

            let RoomSession {
                room,
                run,
                pending_rematch,
                ..
            } = &mut *session;

            let player_name = room
                .seat_of(user_id)
                .map(|p| p.name.clone())
                .ok_or_else(|| RoomError::RoomNotFound {
                    room_id: room_id.to_string(),
                })?;

            // A departure cancels any rematch negotiation on this room.
            *pending_rematch = None;

            let live_run = run
                .as_mut()
                .filter(|r| room.status == RoomStatus::Playing && !r.is_terminal());
            if let Some(run) = live_run {
                run.abandon();
                events.push(Outbound::Room(ServerMessage::PlayerAbandoned {
                    room_id: room_id.to_string(),
                    player_id: user_id,
                    player_name: player_name.clone(),
                }));
                events.push(game_over_event(room_id, run, EndReason::Abandoned));
                close_room(room);
                self.release_members(room);
            } else {
                self.user_index
                    .remove_if(&user_id, |_, held| held == &room.room_id);
            }

            room.players.retain(|p| p.user_id != user_id);
            events.push(Outbound::Room(ServerMessage::PlayerLeft {
                room_id: room_id.to_string(),
                player_id: user_id,
                player_name,
            }));

            room_deleted = room.players.is_empty();
        }

        if room_deleted {
            let mut rooms = self.rooms.write().await;
            rooms.remove(room_id);
            info!("Removed empty room {}", room_id);
        }

        Ok(LeaveReport {
            room_id: room_id.to_string(),
            events,
            room_deleted,
        })
    }

    /// Leave whatever non-finished room the user currently holds. A no-op
    /// when there is none, so reconnect cleanup can always call it.
    pub async fn force_leave(&self, user_id: PlayerId) -> Result<Option<LeaveReport>, RoomError> {
        let room_id = match self.user_index.get(&user_id) {
            Some(entry) => entry.value().clone(),
            None => return Ok(None),
        };
        match self.leave_room(&room_id, user_id).await {
            Ok(report) => Ok(Some(report)),
            // The room vanished between lookup and leave; that's a no-op.
            Err(RoomError::RoomNotFound { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// "Resume my active room": the one non-finished room this user is in.
    pub async fn find_room_for_user(&self, user_id: PlayerId) -> Option<MyRoomView> {
        let room_id = self.user_index.get(&user_id)?.value().clone();
        let session = self.get_session(&room_id).await.ok()?;
        let session = session.lock().await;

        let run = session.run.as_ref().map(|r| r.snapshot());
        let current_turn_player_id = run.as_ref().and_then(|r| r.current_turn_player_id);
        Some(MyRoomView {
            room: session.room.clone(),
            run,
            current_turn_player_id,
        })
    }

    pub async fn room_status(&self, room_id: &str) -> Result<Room, RoomError> {
        let session = self.get_session(room_id).await?;
        let session = session.lock().await;
        Ok(session.room.clone())
    }

    /// Snapshot for a member re-syncing over the event channel.
    pub async fn room_sync(&self, room_id: &str, user_id: PlayerId) -> Result<MyRoomView, RoomError> {
        let session = self.get_session(room_id).await?;
        let session = session.lock().await;

        if session.room.seat_of(user_id).is_none() {
            return Err(RoomError::RoomNotFound {
                room_id: room_id.to_string(),
            });
        }

        let run = session.run.as_ref().map(|r| r.snapshot());
        let current_turn_player_id = run.as_ref().and_then(|r| r.current_turn_player_id);
        Ok(MyRoomView {
            room: session.room.clone(),
            run,
            current_turn_player_id,
        })
    }

    /// Sweep finished and emptied rooms. Playing rooms are never reaped
    /// here: a stalled turn persists until someone actually leaves.
    pub async fn cleanup_stale_rooms(&self, timeout: Duration) {
        let mut to_remove = Vec::new();

        {
            let rooms = self.rooms.read().await;
            for (room_id, session) in rooms.iter() {
                if let Ok(session) = session.try_lock() {
                    let disposable = session.room.status == RoomStatus::Finished
                        || session.room.players.is_empty();
                    if disposable && session.is_idle(timeout) {
                        to_remove.push(room_id.clone());
                    }
                }
            }
        }

        if to_remove.is_empty() {
            return;
        }

        let mut rooms = self.rooms.write().await;
        for room_id in to_remove {
            if let Some(session) = rooms.remove(&room_id) {
                let session = session.lock().await;
                self.release_members(&session.room);
                info!("Swept stale room {}", room_id);
            }
        }
    }

    pub async fn room_count(&self) -> usize {
        let rooms = self.rooms.read().await;
        rooms.len()
    }

    pub(crate) async fn session(&self, room_id: &str) -> Result<Arc<Mutex<RoomSession>>, RoomError> {
        self.get_session(room_id).await
    }

    pub(crate) fn evaluator(&self) -> Arc<dyn GuessEvaluator> {
        self.evaluator.clone()
    }

    pub(crate) fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub(crate) async fn insert_session(&self, room: Room, run: CoopRun) -> RoomId {
        let room_id = room.room_id.clone();
        let mut session = RoomSession::new(room);
        session.run = Some(run);
        let mut rooms = self.rooms.write().await;
        rooms.insert(room_id.clone(), Arc::new(Mutex::new(session)));
        room_id
    }

    pub(crate) async fn unused_code(&self) -> RoomId {
        let rooms = self.rooms.read().await;
        let mut code = self.generate_code();
        while rooms.contains_key(&code) {
            code = self.generate_code();
        }
        code
    }

    pub(crate) fn reserve_pair(
        &self,
        first: PlayerId,
        second: PlayerId,
        room_id: &str,
    ) -> Result<(), RoomError> {
        self.reserve_user(first, room_id)?;
        if let Err(e) = self.reserve_user(second, room_id) {
            self.user_index.remove_if(&first, |_, held| held == room_id);
            return Err(e);
        }
        Ok(())
    }
}

fn seat_for(user: &UserProfile, is_creator: bool) -> RoomPlayer {
    RoomPlayer {
        user_id: user.id,
        name: user.display_name.clone(),
        avatar: user.avatar.clone(),
        is_creator,
    }
}

fn push_turn_event(events: &mut Vec<Outbound>, room: &Room, run: &CoopRun, room_id: &str) {
    if let Some(turn_id) = run.current_turn() {
        let turn_name = room
            .seat_of(turn_id)
            .map(|p| p.name.clone())
            .unwrap_or_default();
        events.push(Outbound::Room(ServerMessage::TurnChanged {
            room_id: room_id.to_string(),
            current_turn_player_id: turn_id,
            current_turn_player_name: turn_name,
        }));
    }
}

fn game_over_event(room_id: &str, run: &CoopRun, reason: EndReason) -> Outbound {
    Outbound::Room(ServerMessage::GameOver {
        room_id: room_id.to_string(),
        final_score: run.state().current_score,
        words_completed: run.state().words_completed,
        reason,
    })
}

/// Finishing is one-way: status flips once, the round is tallied, and the
/// timestamps freeze.
fn close_room(room: &mut Room) {
    if room.status == RoomStatus::Finished {
        return;
    }
    room.status = RoomStatus::Finished;
    room.finished_at = Some(Utc::now().to_rfc3339());
    room.games_played += 1;
}
