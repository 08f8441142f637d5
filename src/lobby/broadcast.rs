//! Snapshot construction and fan-out to match participants

use super::session::SessionRegistry;
use crate::game::engine::MatchEngine;
use crate::network::protocol::{encode_event, events, MatchStatePayload, PlayerView};
use tracing::warn;

const LOG_TARGET: &str = "lettermatch::lobby";

/// Full match state as every participant sees it.
pub fn build_snapshot(engine: &MatchEngine, now_ms: u64) -> MatchStatePayload {
    MatchStatePayload {
        match_id: engine.match_id().to_string(),
        phase: engine.phase(),
        phase_ends_at_ms: engine.phase_ends_at_ms(),
        server_now_ms: now_ms,
        round_number: engine.round_number(),
        round_type: engine.round_type(),
        players: engine
            .participants()
            .iter()
            .map(|p| PlayerView {
                player_id: p.player_id.clone(),
                display_name: p.display_name.clone(),
                connected: p.connected,
                score: p.score,
            })
            .collect(),
        picker_player_id: engine.picker_player_id().map(str::to_string),
        letters: engine.letters().to_vec(),
        scrambled: engine.scrambled().map(str::to_string),
        round_results: engine.round_results().to_vec(),
        winner_player_id: engine.winner().map(str::to_string),
    }
}

/// Encode `match:state` once and queue it for both participants.
///
/// Disconnected participants are skipped; they get a fresh snapshot when
/// they resume.
pub fn fan_out(sessions: &SessionRegistry, snapshot: &MatchStatePayload) {
    let frame = match encode_event(events::MATCH_STATE, snapshot) {
        Ok(frame) => frame,
        Err(err) => {
            warn!(target: LOG_TARGET, match_id = %snapshot.match_id, "failed to encode snapshot: {err}");
            return;
        }
    };
    let players = snapshot.players.iter().map(|p| p.player_id.as_str());
    sessions.send_frame_to_players(players, &frame);
}
