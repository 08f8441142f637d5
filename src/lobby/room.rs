//! One running match: its engine behind a lock plus the last published view

use super::gateway::GateView;
use crate::game::engine::MatchEngine;
use crate::game::{MatchId, PlayerId};
use crate::network::protocol::MatchStatePayload;
use parking_lot::{Mutex, MutexGuard, RwLock};
use std::sync::Arc;

pub struct MatchRoom {
    match_id: MatchId,
    ranked: bool,
    players: [PlayerId; 2],
    /// Single writer; every mutation of the match goes through this lock
    engine: Mutex<MatchEngine>,
    /// Read without touching the engine lock (prechecks, resume)
    published: RwLock<GateView>,
}

impl MatchRoom {
    pub fn new(engine: MatchEngine, ranked: bool, now_ms: u64) -> Self {
        let published = GateView::of(&engine, now_ms);
        let [a, b] = engine.participants();
        Self {
            match_id: engine.match_id().to_string(),
            ranked,
            players: [a.player_id.clone(), b.player_id.clone()],
            engine: Mutex::new(engine),
            published: RwLock::new(published),
        }
    }

    pub fn match_id(&self) -> &str {
        &self.match_id
    }

    pub fn ranked(&self) -> bool {
        self.ranked
    }

    pub fn players(&self) -> &[PlayerId; 2] {
        &self.players
    }

    pub fn is_participant(&self, player_id: &str) -> bool {
        self.players.iter().any(|p| p == player_id)
    }

    pub fn lock(&self) -> MutexGuard<'_, MatchEngine> {
        self.engine.lock()
    }

    pub fn snapshot(&self) -> Arc<MatchStatePayload> {
        self.published.read().snapshot.clone()
    }

    pub fn view(&self) -> GateView {
        self.published.read().clone()
    }

    /// Rebuild the published view from `engine`. Call with the engine lock
    /// held so snapshots are published in mutation order.
    pub fn publish(&self, engine: &MatchEngine, now_ms: u64) -> Arc<MatchStatePayload> {
        let view = GateView::of(engine, now_ms);
        let snapshot = view.snapshot.clone();
        *self.published.write() = view;
        snapshot
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::action::PlayerAction;
    use crate::game::engine::Phase;
    use crate::game::{LetterKind, Side};
    use crate::lobby::tests::test_rules;

    fn room() -> MatchRoom {
        let engine = MatchEngine::new(
            "m1".to_string(),
            [("a".to_string(), "Ada".to_string()), ("b".to_string(), "Bea".to_string())],
            Side::A,
            test_rules(),
            7,
            1_000,
        );
        MatchRoom::new(engine, false, 1_000)
    }

    #[test]
    fn test_initial_snapshot() {
        let room = room();
        let snapshot = room.snapshot();
        assert_eq!(snapshot.match_id, "m1");
        assert_eq!(snapshot.phase, Phase::AwaitingLettersPick);
        assert_eq!(snapshot.picker_player_id.as_deref(), Some("a"));
        assert!(room.is_participant("b"));
        assert!(!room.is_participant("z"));
        assert_eq!(room.view().allowed_picks.len(), 2);
    }

    #[test]
    fn test_snapshot_only_changes_on_publish() {
        let room = room();
        let mut engine = room.lock();
        engine
            .apply("a", PlayerAction::PickLetter { kind: Some(LetterKind::Vowel) }, 1_100)
            .unwrap();
        assert!(room.snapshot().letters.is_empty());

        let published = room.publish(&engine, 1_100);
        assert!(Arc::ptr_eq(&published, &room.view().snapshot));
        assert_eq!(published.letters.len(), 1);
        assert_eq!(room.snapshot().letters.len(), 1);
        assert_eq!(room.snapshot().server_now_ms, 1_100);
    }
}
