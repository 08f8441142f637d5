//! Player actions and the action error taxonomy
//!
//! Error codes are stable wire strings. Each code has exactly one
//! human-readable message; unknown codes resolve to a generic message.

use super::engine::Phase;
use super::{LetterKind, RoundType};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Message used for codes this build does not know.
pub const GENERIC_ACTION_ERROR: &str = "Action failed.";

/// An in-match action from a participant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayerAction {
    /// `kind` is `None` when the inbound payload did not carry a usable kind
    PickLetter { kind: Option<LetterKind> },
    SubmitWord { word: String },
    SubmitConundrumGuess { guess: String },
    Forfeit,
}

impl PlayerAction {
    /// Wire event name of the action, echoed back in `action:error`.
    pub fn event_name(&self) -> &'static str {
        match self {
            PlayerAction::PickLetter { .. } => "round:pick_letter",
            PlayerAction::SubmitWord { .. } => "round:submit_word",
            PlayerAction::SubmitConundrumGuess { .. } => "round:submit_conundrum_guess",
            PlayerAction::Forfeit => "match:forfeit",
        }
    }

    pub fn round_action(&self) -> Option<RoundAction> {
        match self {
            PlayerAction::PickLetter { .. } => Some(RoundAction::PickLetter),
            PlayerAction::SubmitWord { .. } => Some(RoundAction::SubmitWord),
            PlayerAction::SubmitConundrumGuess { .. } => Some(RoundAction::ConundrumGuess),
            PlayerAction::Forfeit => None,
        }
    }
}

/// Round-scoped actions, the ones gated by phase and round type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundAction {
    PickLetter,
    SubmitWord,
    ConundrumGuess,
}

impl RoundAction {
    fn round_type(self) -> RoundType {
        match self {
            RoundAction::PickLetter | RoundAction::SubmitWord => RoundType::Letters,
            RoundAction::ConundrumGuess => RoundType::Conundrum,
        }
    }

    fn phase(self) -> Phase {
        match self {
            RoundAction::PickLetter => Phase::AwaitingLettersPick,
            RoundAction::SubmitWord => Phase::LettersSolving,
            RoundAction::ConundrumGuess => Phase::ConundrumSolving,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionErrorCode {
    UnknownPlayer,
    AlreadyInMatch,
    MatchNotFound,
    NotInActiveMatch,
    NotMatchParticipant,
    InvalidPhase,
    InvalidRound,
    NotPicker,
    PickConstraintViolation,
    LateSubmission,
    DuplicateSubmission,
    RateLimited,
    AlreadySolved,
    AuthRequiredRanked,
    DisplayNameTaken,
    InvalidDisplayName,
}

impl ActionErrorCode {
    pub const ALL: [ActionErrorCode; 16] = [
        ActionErrorCode::UnknownPlayer,
        ActionErrorCode::AlreadyInMatch,
        ActionErrorCode::MatchNotFound,
        ActionErrorCode::NotInActiveMatch,
        ActionErrorCode::NotMatchParticipant,
        ActionErrorCode::InvalidPhase,
        ActionErrorCode::InvalidRound,
        ActionErrorCode::NotPicker,
        ActionErrorCode::PickConstraintViolation,
        ActionErrorCode::LateSubmission,
        ActionErrorCode::DuplicateSubmission,
        ActionErrorCode::RateLimited,
        ActionErrorCode::AlreadySolved,
        ActionErrorCode::AuthRequiredRanked,
        ActionErrorCode::DisplayNameTaken,
        ActionErrorCode::InvalidDisplayName,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ActionErrorCode::UnknownPlayer => "UNKNOWN_PLAYER",
            ActionErrorCode::AlreadyInMatch => "ALREADY_IN_MATCH",
            ActionErrorCode::MatchNotFound => "MATCH_NOT_FOUND",
            ActionErrorCode::NotInActiveMatch => "NOT_IN_ACTIVE_MATCH",
            ActionErrorCode::NotMatchParticipant => "NOT_MATCH_PARTICIPANT",
            ActionErrorCode::InvalidPhase => "INVALID_PHASE",
            ActionErrorCode::InvalidRound => "INVALID_ROUND",
            ActionErrorCode::NotPicker => "NOT_PICKER",
            ActionErrorCode::PickConstraintViolation => "PICK_CONSTRAINT_VIOLATION",
            ActionErrorCode::LateSubmission => "LATE_SUBMISSION",
            ActionErrorCode::DuplicateSubmission => "DUPLICATE_SUBMISSION",
            ActionErrorCode::RateLimited => "RATE_LIMITED",
            ActionErrorCode::AlreadySolved => "ALREADY_SOLVED",
            ActionErrorCode::AuthRequiredRanked => "AUTH_REQUIRED_RANKED",
            ActionErrorCode::DisplayNameTaken => "DISPLAY_NAME_TAKEN",
            ActionErrorCode::InvalidDisplayName => "INVALID_DISPLAY_NAME",
        }
    }

    pub fn parse(code: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|c| c.as_str() == code)
    }

    /// The fixed user-facing message for this code.
    pub fn message(&self) -> &'static str {
        match self {
            ActionErrorCode::UnknownPlayer => "Identify yourself before playing.",
            ActionErrorCode::AlreadyInMatch => "You are already in a match.",
            ActionErrorCode::MatchNotFound => "That match no longer exists.",
            ActionErrorCode::NotInActiveMatch => "You are not in an active match.",
            ActionErrorCode::NotMatchParticipant => "You are not playing in this match.",
            ActionErrorCode::InvalidPhase => "That action is not allowed right now.",
            ActionErrorCode::InvalidRound => "That action does not belong to this round.",
            ActionErrorCode::NotPicker => "It is not your turn to pick.",
            ActionErrorCode::PickConstraintViolation => {
                "The letters need at least one vowel and one consonant."
            }
            ActionErrorCode::LateSubmission => "Time is up for this round.",
            ActionErrorCode::DuplicateSubmission => "You have already submitted a word.",
            ActionErrorCode::RateLimited => "Slow down before guessing again.",
            ActionErrorCode::AlreadySolved => "The conundrum has already been solved.",
            ActionErrorCode::AuthRequiredRanked => "Sign in to play ranked matches.",
            ActionErrorCode::DisplayNameTaken => "That display name is taken.",
            ActionErrorCode::InvalidDisplayName => "Display names use 1-20 letters, digits, spaces, _ or -.",
        }
    }
}

impl fmt::Display for ActionErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Message for a wire code, falling back for codes this build does not know.
pub fn message_for_code(code: &str) -> &'static str {
    ActionErrorCode::parse(code)
        .map(|c| c.message())
        .unwrap_or(GENERIC_ACTION_ERROR)
}

/// Phase and round-type gate shared by the gateway precheck and the engine.
///
/// `conundrum_solved` only matters while a closed conundrum round is settling.
pub fn check_phase(
    phase: Phase,
    round_type: RoundType,
    action: RoundAction,
    conundrum_solved: bool,
) -> Result<(), ActionErrorCode> {
    if phase == Phase::RoundResult && round_type == action.round_type() {
        match action {
            RoundAction::SubmitWord => return Err(ActionErrorCode::LateSubmission),
            RoundAction::ConundrumGuess if conundrum_solved => {
                return Err(ActionErrorCode::AlreadySolved)
            }
            RoundAction::ConundrumGuess => return Err(ActionErrorCode::LateSubmission),
            RoundAction::PickLetter => {}
        }
    }

    if !phase.accepts_round_actions() {
        return Err(ActionErrorCode::InvalidPhase);
    }
    if round_type != action.round_type() {
        return Err(ActionErrorCode::InvalidRound);
    }
    if phase != action.phase() {
        return Err(ActionErrorCode::InvalidPhase);
    }
    Ok(())
}
