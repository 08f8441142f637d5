//! Client application state
//!
//! `App` stores the latest copy of each reducer input and the text being
//! typed. Key handlers return the `ClientMessage` to send, if any; the
//! event loop owns the connection.

use super::reducer::{estimate_offset, reduce, ConnectionState, ReducerInput, UiState};
use crate::game::engine::Phase;
use crate::game::LetterKind;
use crate::network::protocol::{
    ActionErrorPayload, MatchFound, MatchStatePayload, MatchmakingStatus, QueueState,
    SessionIdentity,
};
use crate::network::{ClientMessage, ServerMessage};
use crate::game::action::PlayerAction;

/// Longest word or guess the input box accepts.
pub const MAX_INPUT_LEN: usize = 15;

#[derive(Debug, Default)]
pub struct App {
    pub should_quit: bool,
    /// Word or conundrum guess being typed
    pub input: String,
    connection: ConnectionState,
    session: Option<SessionIdentity>,
    matchmaking: Option<MatchmakingStatus>,
    match_state: Option<MatchStatePayload>,
    opponent: Option<MatchFound>,
    last_error: Option<ActionErrorPayload>,
    clock_offset_ms: i64,
    ui: UiState,
}

impl App {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn quit(&mut self) {
        self.should_quit = true;
    }

    pub fn ui(&self) -> &UiState {
        &self.ui
    }

    pub fn session(&self) -> Option<&SessionIdentity> {
        self.session.as_ref()
    }

    pub fn opponent(&self) -> Option<&MatchFound> {
        self.opponent.as_ref()
    }

    pub fn clock_offset_ms(&self) -> i64 {
        self.clock_offset_ms
    }

    pub fn set_connection(&mut self, connection: ConnectionState, local_now_ms: u64) {
        self.connection = connection;
        self.refresh(local_now_ms);
    }

    /// Recompute the UI state. Called on every tick and after every event.
    pub fn refresh(&mut self, local_now_ms: u64) {
        let input = ReducerInput {
            connection: self.connection,
            session: self.session.as_ref(),
            matchmaking: self.matchmaking.as_ref(),
            match_state: self.match_state.as_ref(),
            action_error: self.last_error.as_ref(),
            local_now_ms,
            server_clock_offset_ms: self.clock_offset_ms,
        };
        self.ui = reduce(Some(&self.ui), &input);
    }

    pub fn on_server_message(&mut self, message: ServerMessage, local_now_ms: u64) {
        match message {
            ServerMessage::SessionIdentified(identity) => {
                self.clock_offset_ms = estimate_offset(identity.server_now_ms, local_now_ms);
                self.session = Some(identity);
                self.last_error = None;
            }
            ServerMessage::MatchmakingStatus(status) => {
                // A finished match stays on screen until the next one is found
                if status.state == QueueState::Searching {
                    self.match_state = None;
                }
                self.matchmaking = Some(status);
            }
            ServerMessage::MatchFound(found) => {
                self.match_state = None;
                self.opponent = Some(found);
                self.input.clear();
                self.last_error = None;
            }
            ServerMessage::MatchState(state) => {
                let phase_changed = self
                    .match_state
                    .as_ref()
                    .is_none_or(|prev| prev.phase != state.phase || prev.round_number != state.round_number);
                if phase_changed {
                    self.input.clear();
                }
                self.match_state = Some(state);
            }
            ServerMessage::ActionError(error) => self.last_error = Some(error),
        }
        self.refresh(local_now_ms);
    }

    fn match_id(&self) -> Option<String> {
        self.match_state.as_ref().map(|s| s.match_id.clone())
    }

    fn in_phase(&self, phase: Phase) -> bool {
        self.match_state.as_ref().is_some_and(|s| s.phase == phase)
    }

    fn action(&mut self, action: PlayerAction) -> Option<ClientMessage> {
        self.last_error = None;
        Some(ClientMessage::Action {
            match_id: self.match_id(),
            action,
        })
    }

    /// Typed character: text while solving, otherwise a command key.
    pub fn on_char(&mut self, c: char) -> Option<ClientMessage> {
        if self.ui.accepts_text() {
            if c.is_ascii_alphabetic() && self.input.len() < MAX_INPUT_LEN {
                self.input.push(c.to_ascii_uppercase());
            }
            return None;
        }

        match c.to_ascii_lowercase() {
            'v' if self.ui.is_my_turn_to_pick => self.action(PlayerAction::PickLetter {
                kind: Some(LetterKind::Vowel),
            }),
            'c' if self.ui.is_my_turn_to_pick => self.action(PlayerAction::PickLetter {
                kind: Some(LetterKind::Consonant),
            }),
            'j' if !self.ui.in_match() => self.join(false),
            'r' if !self.ui.in_match() => self.join(true),
            'l' if !self.ui.in_match() => Some(ClientMessage::LeaveQueue),
            'q' if !self.ui.in_match() => {
                self.quit();
                None
            }
            _ => None,
        }
    }

    fn join(&mut self, ranked: bool) -> Option<ClientMessage> {
        self.last_error = None;
        Some(ClientMessage::JoinQueue { ranked })
    }

    pub fn on_backspace(&mut self) {
        self.input.pop();
    }

    /// Enter: submit the typed word or guess.
    pub fn on_submit(&mut self) -> Option<ClientMessage> {
        if self.input.is_empty() {
            return None;
        }
        let text = std::mem::take(&mut self.input);
        if self.in_phase(Phase::LettersSolving) {
            self.action(PlayerAction::SubmitWord { word: text })
        } else if self.in_phase(Phase::ConundrumSolving) {
            self.action(PlayerAction::SubmitConundrumGuess { guess: text })
        } else {
            None
        }
    }

    pub fn on_forfeit(&mut self) -> Option<ClientMessage> {
        if !self.ui.in_match() {
            return None;
        }
        self.action(PlayerAction::Forfeit)
    }

    /// Request a fresh snapshot of the current match (after reconnecting).
    pub fn on_resume(&mut self) -> Option<ClientMessage> {
        let match_id = self
            .matchmaking
            .as_ref()
            .and_then(|s| s.match_id.clone())
            .or_else(|| self.match_id());
        Some(ClientMessage::Resume { match_id })
    }
}
