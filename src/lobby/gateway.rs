//! Lock-free admission checks for in-match actions
//!
//! Runs against the last published view of a match, so it can reject most
//! bad actions without contending for the engine lock. The engine validates
//! again under its lock; this pass only has to be ordered the same way.

use super::broadcast::build_snapshot;
use crate::game::action::{check_phase, ActionErrorCode, PlayerAction};
use crate::game::engine::{MatchEngine, RoundDetails};
use crate::game::LetterKind;
use crate::network::protocol::MatchStatePayload;
use std::sync::Arc;

/// Published state the gateway checks against.
#[derive(Debug, Clone)]
pub struct GateView {
    pub snapshot: Arc<MatchStatePayload>,
    /// Pick kinds the engine accepted at publish time; empty outside picking
    pub allowed_picks: Vec<LetterKind>,
}

impl GateView {
    pub fn of(engine: &MatchEngine, now_ms: u64) -> Self {
        Self {
            snapshot: Arc::new(build_snapshot(engine, now_ms)),
            allowed_picks: engine.allowed_pick_kinds(),
        }
    }
}

/// Order: participant, active match, phase, round type, picker, pick kind.
pub fn precheck(view: &GateView, player_id: &str, action: &PlayerAction) -> Result<(), ActionErrorCode> {
    let snapshot = view.snapshot.as_ref();
    if !snapshot.players.iter().any(|p| p.player_id == player_id) {
        return Err(ActionErrorCode::NotMatchParticipant);
    }

    let Some(round_action) = action.round_action() else {
        return if snapshot.phase.is_terminal() {
            Err(ActionErrorCode::NotInActiveMatch)
        } else {
            Ok(())
        };
    };

    check_phase(
        snapshot.phase,
        snapshot.round_type,
        round_action,
        conundrum_solved(snapshot),
    )?;

    if let PlayerAction::PickLetter { kind } = action {
        if snapshot.picker_player_id.as_deref() != Some(player_id) {
            return Err(ActionErrorCode::NotPicker);
        }
        match kind {
            Some(kind) if view.allowed_picks.contains(kind) => {}
            _ => return Err(ActionErrorCode::PickConstraintViolation),
        }
    }
    Ok(())
}

fn conundrum_solved(snapshot: &MatchStatePayload) -> bool {
    snapshot
        .round_results
        .last()
        .filter(|r| r.round_number == snapshot.round_number)
        .is_some_and(|r| matches!(r.details, RoundDetails::Conundrum { solved_by: Some(_), .. }))
}
