use chrono::Utc;
use uuid::Uuid;

use coop_types::{EndReason, Guess, NextWord, PlayerId, RoomError, RunState, RunStatus};

use crate::evaluator::is_all_correct;

/// What one accepted guess did to the run.
#[derive(Debug, Clone)]
pub enum GuessOutcome {
    /// Same word, run still live, turn has flipped to the other seat.
    Continued { guess: Guess },
    /// The word was solved. The caller must follow up with `advance_word`
    /// once it knows whether the supply has another word.
    WordCompleted { guess: Guess, completed_word: String },
    /// Final attempt missed; the run is failed and absorbing.
    RunFailed { guess: Guess },
}

impl GuessOutcome {
    pub fn guess(&self) -> &Guess {
        match self {
            GuessOutcome::Continued { guess } => guess,
            GuessOutcome::WordCompleted { guess, .. } => guess,
            GuessOutcome::RunFailed { guess } => guess,
        }
    }
}

/// The authoritative run for one playing room: two fixed seats, a hidden
/// target word, and strict turn alternation. All command ordering happens
/// upstream (one room is processed serially), so this type is plain
/// single-threaded state.
#[derive(Debug, Clone)]
pub struct CoopRun {
    state: RunState,
    target_word: String,
    seats: [PlayerId; 2],
    end_reason: Option<EndReason>,
}

impl CoopRun {
    /// Seats are join order; the first seat (the creator) opens the run.
    pub fn new(seats: [PlayerId; 2], first_word: String, max_attempts: u32) -> Self {
        let state = RunState {
            run_id: Uuid::new_v4(),
            status: RunStatus::Active,
            current_score: 0,
            words_completed: 0,
            max_attempts,
            attempts_used: 0,
            next_word: Some(NextWord {
                length: first_word.chars().count() as u32,
                remaining_attempts: max_attempts,
            }),
            guesses: Vec::new(),
            current_turn_player_id: Some(seats[0]),
        };

        Self {
            state,
            target_word: first_word,
            seats,
            end_reason: None,
        }
    }

    pub fn state(&self) -> &RunState {
        &self.state
    }

    pub fn snapshot(&self) -> RunState {
        self.state.clone()
    }

    pub fn seats(&self) -> [PlayerId; 2] {
        self.seats
    }

    pub fn target_word(&self) -> &str {
        &self.target_word
    }

    pub fn current_turn(&self) -> Option<PlayerId> {
        self.state.current_turn_player_id
    }

    pub fn end_reason(&self) -> Option<EndReason> {
        self.end_reason
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// Pre-flight validation, run before the evaluator is consulted.
    /// Failures leave the run untouched so a rejected guess is never
    /// observable.
    pub fn check_guess(&self, player_id: PlayerId, word: &str) -> Result<(), RoomError> {
        if self.state.status != RunStatus::Active {
            return Err(RoomError::RoomNotActive);
        }
        if self.state.current_turn_player_id != Some(player_id) {
            return Err(RoomError::NotYourTurn);
        }
        let expected = self
            .state
            .next_word
            .as_ref()
            .map(|w| w.length)
            .unwrap_or_default();
        let actual = word.chars().count() as u32;
        if actual != expected {
            return Err(RoomError::InvalidWordLength { expected, actual });
        }
        Ok(())
    }

    /// Record a guess the evaluator has already judged. `check_guess` must
    /// have passed for the same player and word.
    pub fn apply_guess(&mut self, player_id: PlayerId, word: &str, pattern: String) -> GuessOutcome {
        let guess = Guess {
            guess_word: word.to_string(),
            pattern: pattern.clone(),
            attempt_number: self.state.attempts_used + 1,
            player_id,
            created_at: Utc::now().to_rfc3339(),
        };

        self.state.guesses.push(guess.clone());
        self.state.attempts_used += 1;
        if let Some(next) = self.state.next_word.as_mut() {
            next.remaining_attempts = self.state.max_attempts - self.state.attempts_used;
        }

        if is_all_correct(&pattern) {
            self.state.current_score += 1;
            self.state.words_completed += 1;
            let completed_word = self.target_word.clone();
            GuessOutcome::WordCompleted {
                guess,
                completed_word,
            }
        } else if self.state.attempts_used >= self.state.max_attempts {
            self.finish(RunStatus::Failed, EndReason::Failed);
            GuessOutcome::RunFailed { guess }
        } else {
            // Turn alternation is the fairness rule: flip only while the
            // run stays active.
            self.flip_turn();
            GuessOutcome::Continued { guess }
        }
    }

    /// Install the word that follows a completion, or close the run out
    /// when the supply is exhausted. Resets the per-word attempt counter
    /// and guess board either way.
    pub fn advance_word(&mut self, next: Option<String>) {
        self.state.guesses.clear();
        self.state.attempts_used = 0;

        match next {
            Some(word) => {
                self.state.next_word = Some(NextWord {
                    length: word.chars().count() as u32,
                    remaining_attempts: self.state.max_attempts,
                });
                self.target_word = word;
                self.flip_turn();
            }
            None => {
                self.state.next_word = None;
                self.finish(RunStatus::Completed, EndReason::Completed);
            }
        }
    }

    /// Terminal regardless of turn; distinct from exhausting attempts.
    /// No-op once the run has already ended (terminal states absorb).
    pub fn abandon(&mut self) {
        if self.state.status != RunStatus::Active {
            return;
        }
        self.finish(RunStatus::Failed, EndReason::Abandoned);
    }

    fn flip_turn(&mut self) {
        if let Some(current) = self.state.current_turn_player_id {
            let other = if current == self.seats[0] {
                self.seats[1]
            } else {
                self.seats[0]
            };
            self.state.current_turn_player_id = Some(other);
        }
    }

    fn finish(&mut self, status: RunStatus, reason: EndReason) {
        tracing::debug!("run {} ended: {:?} ({:?})", self.state.run_id, status, reason);
        self.state.status = status;
        self.state.current_turn_player_id = None;
        self.end_reason = Some(reason);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluator::compute_pattern;

    fn seats() -> [PlayerId; 2] {
        [Uuid::new_v4(), Uuid::new_v4()]
    }

    fn miss_pattern(len: usize) -> String {
        "0".repeat(len)
    }

    #[test]
    fn test_run_opens_on_the_first_seat() {
        let s = seats();
        let run = CoopRun::new(s, "crane".to_string(), 5);

        assert_eq!(run.current_turn(), Some(s[0]));
        assert_eq!(run.state().attempts_used, 0);
        assert_eq!(run.state().next_word.as_ref().unwrap().length, 5);
    }

    #[test]
    fn test_turn_alternates_on_every_accepted_guess() {
        let s = seats();
        let mut run = CoopRun::new(s, "crane".to_string(), 5);

        run.apply_guess(s[0], "about", miss_pattern(5));
        assert_eq!(run.current_turn(), Some(s[1]));

        run.apply_guess(s[1], "house", miss_pattern(5));
        assert_eq!(run.current_turn(), Some(s[0]));

        run.apply_guess(s[0], "world", miss_pattern(5));
        assert_eq!(run.current_turn(), Some(s[1]));
    }

    #[test]
    fn test_not_your_turn_is_rejected_without_state_change() {
        let s = seats();
        let run = CoopRun::new(s, "crane".to_string(), 5);

        let result = run.check_guess(s[1], "about");
        assert_eq!(result, Err(RoomError::NotYourTurn));
        assert_eq!(run.state().attempts_used, 0);
        assert!(run.state().guesses.is_empty());
    }

    #[test]
    fn test_wrong_length_is_rejected() {
        let s = seats();
        let run = CoopRun::new(s, "crane".to_string(), 5);

        let result = run.check_guess(s[0], "lamp");
        assert_eq!(
            result,
            Err(RoomError::InvalidWordLength {
                expected: 5,
                actual: 4
            })
        );
    }

    #[test]
    fn test_attempts_track_guess_count() {
        let s = seats();
        let mut run = CoopRun::new(s, "crane".to_string(), 5);

        for (i, word) in ["about", "house", "world"].iter().enumerate() {
            let player = s[i % 2];
            run.check_guess(player, word).unwrap();
            run.apply_guess(player, word, miss_pattern(5));
            assert_eq!(run.state().attempts_used, i as u32 + 1);
            assert_eq!(run.state().guesses.len(), run.state().attempts_used as usize);
        }
    }

    #[test]
    fn test_exhausted_attempts_fail_the_run_without_a_flip() {
        let s = seats();
        let mut run = CoopRun::new(s, "crane".to_string(), 2);

        run.apply_guess(s[0], "about", miss_pattern(5));
        let outcome = run.apply_guess(s[1], "house", miss_pattern(5));

        assert!(matches!(outcome, GuessOutcome::RunFailed { .. }));
        assert_eq!(run.state().status, RunStatus::Failed);
        assert_eq!(run.end_reason(), Some(EndReason::Failed));
        assert_eq!(run.current_turn(), None);
    }

    #[test]
    fn test_correct_guess_completes_the_word() {
        let s = seats();
        let mut run = CoopRun::new(s, "crane".to_string(), 5);

        let pattern = compute_pattern("crane", "crane");
        let outcome = run.apply_guess(s[0], "crane", pattern);

        match outcome {
            GuessOutcome::WordCompleted { completed_word, .. } => {
                assert_eq!(completed_word, "crane");
            }
            other => panic!("expected WordCompleted, got {:?}", other),
        }
        assert_eq!(run.state().current_score, 1);
        assert_eq!(run.state().words_completed, 1);
    }

    #[test]
    fn test_advance_word_resets_board_and_flips_turn() {
        let s = seats();
        let mut run = CoopRun::new(s, "crane".to_string(), 5);

        run.apply_guess(s[0], "crane", compute_pattern("crane", "crane"));
        run.advance_word(Some("houses".to_string()));

        assert_eq!(run.state().status, RunStatus::Active);
        assert_eq!(run.state().attempts_used, 0);
        assert!(run.state().guesses.is_empty());
        assert_eq!(run.state().next_word.as_ref().unwrap().length, 6);
        assert_eq!(run.target_word(), "houses");
        // s[0] solved the word, so s[1] opens the next one
        assert_eq!(run.current_turn(), Some(s[1]));
    }

    #[test]
    fn test_exhausted_supply_completes_the_run() {
        let s = seats();
        let mut run = CoopRun::new(s, "crane".to_string(), 5);

        run.apply_guess(s[0], "crane", compute_pattern("crane", "crane"));
        run.advance_word(None);

        assert_eq!(run.state().status, RunStatus::Completed);
        assert_eq!(run.end_reason(), Some(EndReason::Completed));
        assert_eq!(run.current_turn(), None);
        assert!(run.state().next_word.is_none());
    }

    #[test]
    fn test_terminal_states_absorb_further_guesses() {
        let s = seats();
        let mut run = CoopRun::new(s, "crane".to_string(), 1);

        run.apply_guess(s[0], "about", miss_pattern(5));
        assert_eq!(run.state().status, RunStatus::Failed);

        for player in s {
            assert_eq!(run.check_guess(player, "house"), Err(RoomError::RoomNotActive));
        }
    }

    #[test]
    fn test_abandon_is_terminal_and_distinct_from_failure() {
        let s = seats();
        let mut run = CoopRun::new(s, "crane".to_string(), 5);

        run.abandon();
        assert_eq!(run.state().status, RunStatus::Failed);
        assert_eq!(run.end_reason(), Some(EndReason::Abandoned));
        assert_eq!(run.check_guess(s[0], "about"), Err(RoomError::RoomNotActive));

        // a second abandon (or a late failure) never rewrites the reason
        run.abandon();
        assert_eq!(run.end_reason(), Some(EndReason::Abandoned));
    }
}
