use serde::{Deserialize, Serialize};
use ts_rs::TS;
use uuid::Uuid;

use crate::RunId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Active,
    /// The word supply was exhausted by a correct final guess.
    Completed,
    /// Attempts ran out, or a player abandoned.
    Failed,
}

/// Why a run ended. Abandonment is a first-class outcome, not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "lowercase")]
pub enum EndReason {
    Completed,
    Failed,
    Abandoned,
}

/// What clients may know about the word in play: its shape, never its
/// letters.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct NextWord {
    pub length: u32,
    pub remaining_attempts: u32,
}

/// One recorded guess. Immutable once appended; the pattern comes only
/// from the evaluator.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Guess {
    pub guess_word: String,
    /// One character per position over {0=absent, 1=present, 2=correct}.
    pub pattern: String,
    pub attempt_number: u32,
    pub player_id: Uuid,
    pub created_at: String, // ISO 8601 string
}

/// Wire-facing view of the live run. `guesses` covers the current word
/// only and is cleared when a word completes.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct RunState {
    pub run_id: RunId,
    pub status: RunStatus,
    pub current_score: u32,
    pub words_completed: u32,
    pub max_attempts: u32,
    pub attempts_used: u32,
    pub next_word: Option<NextWord>,
    pub guesses: Vec<Guess>,
    pub current_turn_player_id: Option<Uuid>,
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        self.status != RunStatus::Active
    }
}
