use std::collections::VecDeque;

use coop_types::{EndReason, Guess, NextWord, RunState, RunStatus, ServerMessage};
use uuid::Uuid;

/// What the reconciler decided to do with one input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    Applied,
    /// Duplicate of (or older than) the local view; dropped.
    Stale,
    /// Held until its precondition arrives: either the initial snapshot,
    /// or the word-completed reset a new-word guess is racing ahead of.
    Buffered,
    /// A gap in the event stream; the caller must re-fetch authoritative
    /// state before applying anything else.
    RefetchNeeded,
}

/// Client-side view of a run, merged from three independent sources: the
/// initial REST snapshot, live push events, and fallback re-fetches. Push
/// delivery is at-least-once and unordered, so every application is keyed
/// off the monotone attempt counter instead of arrival order.
#[derive(Debug, Default)]
pub struct RunReconciler {
    run: Option<RunState>,
    /// Events that arrived before any snapshot did.
    pending: VecDeque<ServerMessage>,
    /// Guesses for a word the view hasn't rolled over to yet.
    held_guesses: Vec<(Guess, u32)>,
}

impl RunReconciler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn run(&self) -> Option<&RunState> {
        self.run.as_ref()
    }

    /// Merge a full-state fetch. A snapshot that is behind the local view
    /// is discarded; a higher attempt count is never overwritten by a
    /// lower one. Buffered events are replayed against the fresh state.
    pub fn merge_snapshot(&mut self, snapshot: RunState) -> MergeOutcome {
        if let Some(local) = &self.run {
            let regressed = snapshot.words_completed < local.words_completed
                || (snapshot.words_completed == local.words_completed
                    && snapshot.attempts_used < local.attempts_used);
            if regressed {
                return MergeOutcome::Stale;
            }
        }

        self.run = Some(snapshot);
        self.held_guesses.clear();
        let buffered: Vec<ServerMessage> = self.pending.drain(..).collect();
        for event in buffered {
            // outcomes of replayed events are the caller's concern only
            // insofar as a refetch is demanded; that surfaces on the next
            // live event anyway
            let _ = self.apply_event(event);
        }
        MergeOutcome::Applied
    }

    /// Apply one push event. Safe against duplication and reordering.
    pub fn apply_event(&mut self, event: ServerMessage) -> MergeOutcome {
        if self.run.is_none() {
            // Nothing to merge into yet: hold everything until the mount
            // fetch lands.
            self.pending.push_back(event);
            return MergeOutcome::Buffered;
        }

        match event {
            ServerMessage::GameStarted { run, .. } => self.merge_snapshot(run),
            ServerMessage::GuessMade {
                guess,
                attempt_number,
                ..
            } => self.apply_guess(guess, attempt_number),
            ServerMessage::TurnChanged {
                current_turn_player_id,
                ..
            } => self.apply_turn(current_turn_player_id),
            ServerMessage::WordCompleted {
                next_word,
                current_score,
                ..
            } => self.apply_word_completed(next_word, current_score),
            ServerMessage::GameOver { reason, .. } => self.apply_game_over(reason),
            // Membership and rematch traffic never touches run state.
            _ => MergeOutcome::Applied,
        }
    }

    /// Append-only: a guess lands only at exactly attempts_used + 1.
    fn apply_guess(&mut self, guess: Guess, attempt_number: u32) -> MergeOutcome {
        let (expected, terminal, current_opener) = {
            let run = self.run.as_ref().expect("checked by apply_event");
            (
                run.attempts_used + 1,
                run.is_terminal(),
                run.guesses
                    .first()
                    .map(|g| (g.guess_word.clone(), g.player_id)),
            )
        };

        if terminal {
            // Echo from before the terminal event.
            return MergeOutcome::Stale;
        }

        if attempt_number == expected {
            let run = self.run.as_mut().expect("checked above");
            run.guesses.push(guess);
            run.attempts_used += 1;
            if let Some(next) = run.next_word.as_mut() {
                next.remaining_attempts = run.max_attempts.saturating_sub(run.attempts_used);
            }
            return MergeOutcome::Applied;
        }

        if attempt_number == 1 {
            // Mid-word, an attempt-1 event is either a redelivery of the
            // current word's opener or the first guess of the next word
            // racing ahead of its word-completed reset.
            let duplicate = current_opener
                .is_some_and(|(word, player)| word == guess.guess_word && player == guess.player_id);
            if duplicate {
                return MergeOutcome::Stale;
            }
            self.held_guesses.push((guess, attempt_number));
            return MergeOutcome::Buffered;
        }

        if attempt_number < expected {
            // Duplicate delivery.
            return MergeOutcome::Stale;
        }

        // A real gap: at least one guess-made was lost.
        MergeOutcome::RefetchNeeded
    }

    /// Single scalar, last write wins.
    fn apply_turn(&mut self, player_id: Uuid) -> MergeOutcome {
        let run = self.run.as_mut().expect("checked by apply_event");
        if run.is_terminal() {
            return MergeOutcome::Stale;
        }
        run.current_turn_player_id = Some(player_id);
        MergeOutcome::Applied
    }

    /// Roll the board over to the next word, then release any guesses that
    /// raced ahead of this reset.
    fn apply_word_completed(
        &mut self,
        next_word: Option<NextWord>,
        current_score: u32,
    ) -> MergeOutcome {
        {
            let run = self.run.as_mut().expect("checked by apply_event");
            if current_score <= run.current_score {
                // Redelivery of a completion we already consumed.
                return MergeOutcome::Stale;
            }
            run.current_score = current_score;
            run.words_completed = current_score;
            run.attempts_used = 0;
            run.guesses.clear();
            run.next_word = next_word.clone();
            if next_word.is_none() {
                run.status = RunStatus::Completed;
                run.current_turn_player_id = None;
            }
        }

        let held = std::mem::take(&mut self.held_guesses);
        for (guess, attempt_number) in held {
            let _ = self.apply_guess(guess, attempt_number);
        }
        MergeOutcome::Applied
    }

    fn apply_game_over(&mut self, reason: EndReason) -> MergeOutcome {
        let run = self.run.as_mut().expect("checked by apply_event");
        run.status = match reason {
            EndReason::Completed => RunStatus::Completed,
            EndReason::Failed | EndReason::Abandoned => RunStatus::Failed,
        };
        run.current_turn_player_id = None;
        MergeOutcome::Applied
    }
}
