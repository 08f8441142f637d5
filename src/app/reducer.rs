//! Pure derivation of what the client shows
//!
//! `reduce` folds everything the client knows into a `UiState`. It keeps no
//! state of its own, so it is called on every tick and on every inbound
//! event; the countdown is recomputed from the snapshot deadline each time
//! rather than decremented.

use crate::game::action::message_for_code;
use crate::game::engine::{Phase, RoundResult};
use crate::game::{MatchId, PlayerId, RoundType};
use crate::network::protocol::{
    ActionErrorPayload, MatchStatePayload, MatchmakingStatus, QueueState, SessionIdentity,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Connecting,
    Connected,
    Disconnected,
}

/// Everything `reduce` reads besides the previous output.
#[derive(Debug, Clone, Copy)]
pub struct ReducerInput<'a> {
    pub connection: ConnectionState,
    pub session: Option<&'a SessionIdentity>,
    pub matchmaking: Option<&'a MatchmakingStatus>,
    pub match_state: Option<&'a MatchStatePayload>,
    pub action_error: Option<&'a ActionErrorPayload>,
    pub local_now_ms: u64,
    pub server_clock_offset_ms: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerLine {
    pub player_id: PlayerId,
    pub display_name: String,
    pub score: u32,
    pub connected: bool,
    pub is_me: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct UiState {
    pub connection: ConnectionState,
    pub my_display_name: Option<String>,
    pub online_count: usize,
    pub queue_label: String,
    pub match_id: Option<MatchId>,
    pub phase: Option<Phase>,
    pub round_number: u32,
    pub round_type: Option<RoundType>,
    pub players: Vec<PlayerLine>,
    pub letters: Vec<char>,
    pub scrambled: Option<String>,
    pub remaining_seconds: Option<u64>,
    pub is_my_turn_to_pick: bool,
    pub status_message: String,
    /// What the local player can do right now
    pub prompt: Option<String>,
    pub last_round: Option<RoundResult>,
    /// The last round closed since the previous `reduce`
    pub last_round_is_new: bool,
    pub winner_line: Option<String>,
    pub error_message: Option<String>,
}

impl UiState {
    pub fn in_match(&self) -> bool {
        self.phase.is_some_and(|p| !p.is_terminal())
    }

    /// True while typed text goes to a word or a conundrum guess.
    pub fn accepts_text(&self) -> bool {
        matches!(
            self.phase,
            Some(Phase::LettersSolving) | Some(Phase::ConundrumSolving)
        )
    }
}

/// Server-minus-local clock offset, taken once at handshake.
pub fn estimate_offset(server_now_ms: u64, local_now_ms: u64) -> i64 {
    server_now_ms as i64 - local_now_ms as i64
}

/// Whole seconds left in the current phase, rounded up and never negative.
/// `None` when the phase has no deadline.
pub fn compute_remaining_seconds(
    state: &MatchStatePayload,
    local_now_ms: u64,
    offset_ms: i64,
) -> Option<u64> {
    let ends_at = state.phase_ends_at_ms? as i64;
    let effective_server_now = local_now_ms as i64 + offset_ms;
    let remaining_ms = ends_at - effective_server_now;
    if remaining_ms <= 0 {
        return Some(0);
    }
    Some((remaining_ms as u64).div_ceil(1000))
}

pub fn is_my_turn_to_pick(state: &MatchStatePayload, session: Option<&SessionIdentity>) -> bool {
    state.phase == Phase::AwaitingLettersPick
        && session.is_some_and(|s| state.picker_player_id.as_deref() == Some(s.player_id.as_str()))
}

/// Headline for the status bar. Connection problems take precedence over
/// anything the last snapshot says.
pub fn status_message(
    phase: Option<Phase>,
    queue: Option<QueueState>,
    connection: ConnectionState,
) -> &'static str {
    match connection {
        ConnectionState::Connecting => return "Connecting to server",
        ConnectionState::Disconnected => return "Disconnected from server",
        ConnectionState::Connected => {}
    }
    match phase {
        Some(Phase::AwaitingLettersPick) => "Letter picking in progress",
        Some(Phase::LettersSolving) => "Find the longest word",
        Some(Phase::RoundResult) => "Round complete",
        Some(Phase::AwaitingConundrumStart) => "Conundrum coming up",
        Some(Phase::ConundrumSolving) => "Solve the conundrum",
        Some(Phase::Completed) => "Match complete",
        Some(Phase::Forfeited) => "Match forfeited",
        None => match queue {
            Some(QueueState::Searching) => "Searching for an opponent",
            Some(QueueState::InMatch) => "Match starting",
            Some(QueueState::Idle) | None => "Ready to play",
        },
    }
}

fn queue_label(status: Option<&MatchmakingStatus>) -> String {
    match status {
        None => "Offline".to_string(),
        Some(s) => {
            let mode = if s.ranked { "ranked" } else { "casual" };
            match s.state {
                QueueState::Idle => "Idle".to_string(),
                QueueState::Searching => format!("Searching ({mode})"),
                QueueState::InMatch => format!("In match ({mode})"),
            }
        }
    }
}

fn prompt(state: &MatchStatePayload, my_turn: bool, players: &[PlayerLine]) -> Option<String> {
    match state.phase {
        Phase::AwaitingLettersPick if my_turn => {
            Some("Your pick: [V] vowel or [C] consonant".to_string())
        }
        Phase::AwaitingLettersPick => {
            let picker = state
                .picker_player_id
                .as_deref()
                .and_then(|id| players.iter().find(|p| p.player_id == id))
                .map(|p| p.display_name.as_str())
                .unwrap_or("Opponent");
            Some(format!("Waiting for {picker} to pick"))
        }
        Phase::LettersSolving => Some("Type a word and press Enter".to_string()),
        Phase::ConundrumSolving => Some("Type your guess and press Enter".to_string()),
        Phase::Completed | Phase::Forfeited => {
            Some("[J] play again  [R] ranked  [Q] quit".to_string())
        }
        Phase::RoundResult | Phase::AwaitingConundrumStart => None,
    }
}

fn winner_line(state: &MatchStatePayload, players: &[PlayerLine]) -> Option<String> {
    let name_of = |id: &str| {
        players
            .iter()
            .find(|p| p.player_id == id)
            .map(|p| (p.is_me, p.display_name.clone()))
    };
    match state.phase {
        Phase::Completed => Some(match state.winner_player_id.as_deref().and_then(name_of) {
            Some((true, _)) => "You won!".to_string(),
            Some((false, name)) => format!("{name} won"),
            None => "It's a draw".to_string(),
        }),
        Phase::Forfeited => Some(match state.winner_player_id.as_deref().and_then(name_of) {
            Some((true, _)) => "You win by forfeit".to_string(),
            Some((false, name)) => format!("{name} wins by forfeit"),
            None => "Match forfeited".to_string(),
        }),
        _ => None,
    }
}

pub fn reduce(previous: Option<&UiState>, input: &ReducerInput<'_>) -> UiState {
    let me = input.session.map(|s| s.player_id.as_str());
    let queue = input.matchmaking.map(|s| s.state);

    let mut ui = UiState {
        connection: input.connection,
        my_display_name: input.session.map(|s| s.display_name.clone()),
        online_count: input.matchmaking.map(|s| s.online_count).unwrap_or(0),
        queue_label: queue_label(input.matchmaking),
        error_message: input.action_error.map(|e| message_for_code(&e.code).to_string()),
        status_message: status_message(None, queue, input.connection).to_string(),
        ..UiState::default()
    };

    let Some(state) = input.match_state else {
        return ui;
    };

    let players: Vec<PlayerLine> = state
        .players
        .iter()
        .map(|p| PlayerLine {
            player_id: p.player_id.clone(),
            display_name: p.display_name.clone(),
            score: p.score,
            connected: p.connected,
            is_me: Some(p.player_id.as_str()) == me,
        })
        .collect();
    let my_turn = is_my_turn_to_pick(state, input.session);
    let last_round = state.round_results.last().cloned();
    let last_round_is_new = match (&last_round, previous) {
        (None, _) => false,
        (Some(_), None) => true,
        (Some(round), Some(prev)) => {
            prev.match_id.as_deref() != Some(state.match_id.as_str())
                || prev.last_round.as_ref().map(|r| r.round_number) != Some(round.round_number)
        }
    };

    ui.match_id = Some(state.match_id.clone());
    ui.phase = Some(state.phase);
    ui.round_number = state.round_number;
    ui.round_type = Some(state.round_type);
    ui.letters = state.letters.clone();
    ui.scrambled = state.scrambled.clone();
    ui.remaining_seconds =
        compute_remaining_seconds(state, input.local_now_ms, input.server_clock_offset_ms);
    ui.is_my_turn_to_pick = my_turn;
    ui.status_message = status_message(Some(state.phase), queue, input.connection).to_string();
    ui.prompt = prompt(state, my_turn, &players);
    ui.winner_line = winner_line(state, &players);
    ui.last_round = last_round;
    ui.last_round_is_new = last_round_is_new;
    ui.players = players;
    ui
}
