//! First-come matchmaking with separate casual and ranked queues

use crate::game::{PlayerId, Side};
use rand::Rng;
use std::collections::VecDeque;

/// Two players handed to a new match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pairing {
    /// Longest-waiting player, seated on side A
    pub player_a: PlayerId,
    pub player_b: PlayerId,
    pub starting_picker: Side,
    pub ranked: bool,
}

#[derive(Debug, Default)]
pub struct MatchmakingQueue {
    casual: VecDeque<PlayerId>,
    ranked: VecDeque<PlayerId>,
}

impl MatchmakingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn queue_mut(&mut self, ranked: bool) -> &mut VecDeque<PlayerId> {
        if ranked {
            &mut self.ranked
        } else {
            &mut self.casual
        }
    }

    /// Enqueue `player`; pairs them with the longest waiter if there is one.
    ///
    /// Joining again is a no-op, joining the other queue moves the player.
    pub fn join<R: Rng + ?Sized>(&mut self, player: &str, ranked: bool, rng: &mut R) -> Option<Pairing> {
        if self.queued(player) == Some(ranked) {
            return None;
        }
        self.leave(player);

        let queue = self.queue_mut(ranked);
        match queue.pop_front() {
            Some(waiting) => {
                let starting_picker = if rng.random_bool(0.5) { Side::A } else { Side::B };
                Some(Pairing {
                    player_a: waiting,
                    player_b: player.to_string(),
                    starting_picker,
                    ranked,
                })
            }
            None => {
                queue.push_back(player.to_string());
                None
            }
        }
    }

    /// Put a player back at the head of a queue (their pairing fell through).
    pub fn requeue_front(&mut self, player: &str, ranked: bool) {
        self.leave(player);
        self.queue_mut(ranked).push_front(player.to_string());
    }

    /// Returns true if the player was queued.
    pub fn leave(&mut self, player: &str) -> bool {
        let before = self.casual.len() + self.ranked.len();
        self.casual.retain(|p| p != player);
        self.ranked.retain(|p| p != player);
        before != self.casual.len() + self.ranked.len()
    }

    /// `Some(ranked)` when the player is waiting.
    pub fn queued(&self, player: &str) -> Option<bool> {
        if self.casual.iter().any(|p| p == player) {
            Some(false)
        } else if self.ranked.iter().any(|p| p == player) {
            Some(true)
        } else {
            None
        }
    }

    pub fn len(&self) -> usize {
        self.casual.len() + self.ranked.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
