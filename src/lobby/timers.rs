//! Phase deadline scheduling
//!
//! One scheduler thread serves every match. Arming a match replaces its
//! previous deadline; firings carry the phase sequence they were armed
//! for so the engine can ignore anything stale.

use crate::game::MatchId;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::sync::mpsc::{channel, RecvTimeoutError, Sender};
use std::thread;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::debug;

const LOG_TARGET: &str = "lettermatch::timers";

/// Upper bound on one idle wait, so clock jumps are picked up.
const MAX_IDLE_WAIT: Duration = Duration::from_secs(1);

/// Wall-clock time in Unix milliseconds.
pub fn unix_now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Pending deadlines keyed by match.
///
/// The heap may hold superseded entries; they are discarded by checking
/// against `pending`.
#[derive(Debug, Default)]
pub struct DeadlineQueue {
    /// match -> (fire_at_ms, phase_seq)
    pending: HashMap<MatchId, (u64, u64)>,
    heap: BinaryHeap<Reverse<(u64, u64, MatchId)>>,
}

impl DeadlineQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm `match_id` to fire at `fire_at_ms`, superseding any earlier arm.
    pub fn arm(&mut self, match_id: MatchId, seq: u64, fire_at_ms: u64) {
        if self.pending.get(&match_id) == Some(&(fire_at_ms, seq)) {
            return;
        }
        self.pending.insert(match_id.clone(), (fire_at_ms, seq));
        self.heap.push(Reverse((fire_at_ms, seq, match_id)));
    }

    pub fn cancel(&mut self, match_id: &str) {
        self.pending.remove(match_id);
    }

    #[cfg(test)]
    pub fn is_pending(&self, match_id: &str) -> bool {
        self.pending.contains_key(match_id)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn next_deadline(&mut self) -> Option<u64> {
        self.pop_stale();
        self.heap.peek().map(|Reverse((at, _, _))| *at)
    }

    /// Remove and return every (match, seq) due at `now_ms`.
    pub fn drain_due(&mut self, now_ms: u64) -> Vec<(MatchId, u64)> {
        let mut due = Vec::new();
        loop {
            self.pop_stale();
            let Some(Reverse((at, seq, match_id))) = self.heap.peek().cloned() else {
                break;
            };
            if at > now_ms {
                break;
            }
            let _ = self.heap.pop();
            self.pending.remove(&match_id);
            due.push((match_id, seq));
        }
        due
    }

    fn pop_stale(&mut self) {
        while let Some(Reverse((at, seq, match_id))) = self.heap.peek() {
            match self.pending.get(match_id) {
                Some(current) if *current == (*at, *seq) => break,
                _ => {
                    let _ = self.heap.pop();
                }
            }
        }
    }
}

enum Command {
    Arm {
        match_id: MatchId,
        seq: u64,
        fire_at_ms: u64,
    },
    Cancel(MatchId),
}

/// Handle to the scheduler thread. The thread exits when the handle drops.
pub struct DeadlineScheduler {
    tx: Sender<Command>,
}

impl DeadlineScheduler {
    /// Start the scheduler; `on_fire(match_id, seq)` runs on its thread.
    pub fn spawn<F>(on_fire: F) -> Self
    where
        F: Fn(MatchId, u64) + Send + 'static,
    {
        let (tx, rx) = channel::<Command>();
        thread::spawn(move || {
            let mut queue = DeadlineQueue::new();
            loop {
                let wait = match queue.next_deadline() {
                    Some(at) => Duration::from_millis(at.saturating_sub(unix_now_ms())).min(MAX_IDLE_WAIT),
                    None => MAX_IDLE_WAIT,
                };
                match rx.recv_timeout(wait) {
                    Ok(Command::Arm {
                        match_id,
                        seq,
                        fire_at_ms,
                    }) => queue.arm(match_id, seq, fire_at_ms),
                    Ok(Command::Cancel(match_id)) => queue.cancel(&match_id),
                    Err(RecvTimeoutError::Timeout) => {}
                    Err(RecvTimeoutError::Disconnected) => break,
                }
                for (match_id, seq) in queue.drain_due(unix_now_ms()) {
                    debug!(target: LOG_TARGET, %match_id, seq, "deadline fired");
                    on_fire(match_id, seq);
                }
            }
        });
        Self { tx }
    }

    pub fn arm(&self, match_id: &str, seq: u64, fire_at_ms: u64) {
        let _ = self.tx.send(Command::Arm {
            match_id: match_id.to_string(),
            seq,
            fire_at_ms,
        });
    }

    pub fn cancel(&self, match_id: &str) {
        let _ = self.tx.send(Command::Cancel(match_id.to_string()));
    }
}
