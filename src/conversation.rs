//! The ordered turn log behind a conversation.
//!
//! Turns are kept oldest-first.  Insertion order is both the chat chronology and the eviction
//! priority: when a token budget is exceeded, file turns go first (earliest first), then the
//! oldest remaining turns.

use std::collections::VecDeque;

use crate::observability::{
    CONVERSATION_EVICTED_FILE_TURNS, CONVERSATION_EVICTED_TURNS,
    CONVERSATION_SUPERSEDED_FILE_TURNS,
};
use crate::types::{CHARS_PER_TOKEN, Turn};

/// An ordered, oldest-first sequence of turns.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Conversation {
    turns: VecDeque<Turn>,
}

impl Conversation {
    /// Create an empty conversation.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a turn.
    pub fn push(&mut self, turn: Turn) {
        self.turns.push_back(turn);
    }

    /// Replace any earlier copy of the file identified by `label` with a fresh file turn at the
    /// end of the conversation.
    ///
    /// Returns the number of stale file turns removed.
    pub fn stage_file(&mut self, label: &str, text: &str) -> usize {
        let before = self.turns.len();
        self.turns.retain(|turn| !turn.is_file_turn_for(label));
        let superseded = before - self.turns.len();
        if superseded > 0 {
            CONVERSATION_SUPERSEDED_FILE_TURNS.count(superseded as u64);
            tracing::debug!(label, superseded, "superseded stale file context");
        }
        self.turns.push_back(Turn::file(label, text));
        superseded
    }

    /// Remove every turn.
    pub fn clear(&mut self) {
        self.turns.clear();
    }

    /// The number of stored turns.
    pub fn len(&self) -> usize {
        self.turns.len()
    }

    /// True if there are no stored turns.
    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Iterate the turns oldest-first.
    pub fn iter(&self) -> impl Iterator<Item = &Turn> + '_ {
        self.turns.iter()
    }

    /// A copy of the turns, oldest-first.
    pub fn to_vec(&self) -> Vec<Turn> {
        self.turns.iter().cloned().collect()
    }

    /// The most recent turn, if any.
    pub fn last(&self) -> Option<&Turn> {
        self.turns.back()
    }

    /// The estimated token cost of every stored turn.
    pub fn estimated_tokens(&self) -> f64 {
        tokens_for(self.char_count())
    }

    fn char_count(&self) -> usize {
        self.turns.iter().map(Turn::char_count).sum()
    }

    /// Drop turns until the estimated cost fits within `budget`.
    ///
    /// With no budget nothing is removed.  Otherwise, while the estimate exceeds the budget,
    /// the earliest file turn is removed if there is one, and the oldest turn if there is not.
    /// Returns the number of turns removed.
    pub fn evict_to_budget(&mut self, budget: Option<u32>) -> usize {
        let Some(budget) = budget else {
            return 0;
        };
        let budget = f64::from(budget);
        let mut chars = self.char_count();
        let mut evicted = 0;
        while tokens_for(chars) > budget {
            let index = self.turns.iter().position(Turn::is_file_turn);
            let removed = match index {
                Some(index) => {
                    CONVERSATION_EVICTED_FILE_TURNS.click();
                    self.turns.remove(index)
                }
                None => self.turns.pop_front(),
            };
            let Some(removed) = removed else {
                break;
            };
            CONVERSATION_EVICTED_TURNS.click();
            chars -= removed.char_count();
            evicted += 1;
            tracing::debug!(
                role = %removed.role,
                file = index.is_some(),
                remaining = tokens_for(chars),
                budget,
                "evicted turn to fit token budget"
            );
        }
        evicted
    }
}

// Costs are summed in characters and divided once.
fn tokens_for(chars: usize) -> f64 {
    chars as f64 / CHARS_PER_TOKEN
}

impl<'a> IntoIterator for &'a Conversation {
    type Item = &'a Turn;
    type IntoIter = std::collections::vec_deque::Iter<'a, Turn>;

    fn into_iter(self) -> Self::IntoIter {
        self.turns.iter()
    }
}

impl FromIterator<Turn> for Conversation {
    fn from_iter<I: IntoIterator<Item = Turn>>(iter: I) -> Self {
        Self {
            turns: iter.into_iter().collect(),
        }
    }
}
