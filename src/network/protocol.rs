//! Wire protocol: named events with JSON payloads
//!
//! Every frame is a 4-byte big-endian length followed by a JSON object
//! `{"event": "<name>", "payload": {...}}`. Inbound client payloads are
//! decoded field by field so a malformed field becomes `None` instead of
//! dropping the whole action.

use crate::game::action::{ActionErrorCode, PlayerAction};
use crate::game::engine::{Phase, RoundResult};
use crate::game::{LetterKind, MatchId, PlayerId, RoundType};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::io::{self, Read};
use thiserror::Error;

/// Largest frame body accepted from the wire.
pub const MAX_FRAME_LEN: usize = 1024 * 1024;

pub mod events {
    pub const SESSION_IDENTIFY: &str = "session:identify";
    pub const QUEUE_JOIN: &str = "queue:join";
    pub const QUEUE_LEAVE: &str = "queue:leave";
    pub const MATCH_RESUME: &str = "match:resume";
    pub const MATCH_FORFEIT: &str = "match:forfeit";
    pub const ROUND_PICK_LETTER: &str = "round:pick_letter";
    pub const ROUND_SUBMIT_WORD: &str = "round:submit_word";
    pub const ROUND_SUBMIT_CONUNDRUM_GUESS: &str = "round:submit_conundrum_guess";

    pub const SESSION_IDENTIFIED: &str = "session:identified";
    pub const MATCHMAKING_STATUS: &str = "matchmaking:status";
    pub const MATCH_FOUND: &str = "match:found";
    pub const MATCH_STATE: &str = "match:state";
    pub const ACTION_ERROR: &str = "action:error";
}

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
    #[error("malformed frame: {0}")]
    Json(#[from] serde_json::Error),
    #[error("frame of {0} bytes exceeds the {MAX_FRAME_LEN} byte limit")]
    FrameTooLarge(usize),
    #[error("unknown event `{0}`")]
    UnknownEvent(String),
}

impl ProtocolError {
    /// True when the stream itself is unusable (as opposed to one bad frame).
    pub fn is_fatal(&self) -> bool {
        matches!(self, ProtocolError::Io(_) | ProtocolError::FrameTooLarge(_))
    }
}

/// Raw inbound frame before event dispatch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub event: String,
    #[serde(default)]
    pub payload: Value,
}

/// Serialize `msg` into a length-prefixed frame.
pub fn encode_frame<T: Serialize>(msg: &T) -> Result<Vec<u8>, ProtocolError> {
    let body = serde_json::to_vec(msg)?;
    if body.len() > MAX_FRAME_LEN {
        return Err(ProtocolError::FrameTooLarge(body.len()));
    }
    let len = body.len() as u32;
    let mut bytes = Vec::with_capacity(4 + body.len());
    bytes.extend_from_slice(&len.to_be_bytes());
    bytes.extend_from_slice(&body);
    Ok(bytes)
}

/// Encode `{"event": event, "payload": payload}` without building a `ServerMessage`.
pub fn encode_event<T: Serialize>(event: &str, payload: &T) -> Result<Vec<u8>, ProtocolError> {
    #[derive(Serialize)]
    struct Outbound<'a, T> {
        event: &'a str,
        payload: &'a T,
    }
    encode_frame(&Outbound { event, payload })
}

/// Read one frame. The body is consumed even when it fails to decode,
/// so a `Json` error leaves the stream aligned on the next frame.
pub fn read_frame<R: Read, T: DeserializeOwned>(reader: &mut R) -> Result<T, ProtocolError> {
    let mut len_buf = [0u8; 4];
    reader.read_exact(&mut len_buf)?;
    let len = u32::from_be_bytes(len_buf) as usize;

    if len > MAX_FRAME_LEN {
        return Err(ProtocolError::FrameTooLarge(len));
    }

    let mut body = vec![0u8; len];
    reader.read_exact(&mut body)?;
    Ok(serde_json::from_slice(&body)?)
}

// === Client -> server ===

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct IdentifyRequest {
    pub display_name: Option<String>,
    /// Previously issued id, presented when reconnecting
    pub player_id: Option<PlayerId>,
    /// Secret issued alongside the player id; required to reclaim it
    pub resume_token: Option<String>,
    pub auth_token: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientMessage {
    Identify(IdentifyRequest),
    JoinQueue { ranked: bool },
    LeaveQueue,
    Resume { match_id: Option<MatchId> },
    /// In-match action; without a match id the sender's active match is targeted
    Action {
        match_id: Option<MatchId>,
        action: PlayerAction,
    },
}

/// Best-effort typed read of one payload field.
fn field<T: DeserializeOwned>(payload: &Value, name: &str) -> Option<T> {
    payload
        .get(name)
        .filter(|v| !v.is_null())
        .and_then(|v| serde_json::from_value(v.clone()).ok())
}

fn put<T: Serialize>(map: &mut Map<String, Value>, name: &str, value: &Option<T>) {
    if let Some(value) = value {
        map.insert(name.to_string(), json!(value));
    }
}

impl ClientMessage {
    pub fn event_name(&self) -> &'static str {
        match self {
            ClientMessage::Identify(_) => events::SESSION_IDENTIFY,
            ClientMessage::JoinQueue { .. } => events::QUEUE_JOIN,
            ClientMessage::LeaveQueue => events::QUEUE_LEAVE,
            ClientMessage::Resume { .. } => events::MATCH_RESUME,
            ClientMessage::Action { action, .. } => action.event_name(),
        }
    }

    /// Decode an inbound envelope. Only an unknown event name is an error.
    pub fn from_envelope(envelope: &Envelope) -> Result<Self, ProtocolError> {
        let p = &envelope.payload;
        let match_id = field::<String>(p, "matchId");
        let message = match envelope.event.as_str() {
            events::SESSION_IDENTIFY => ClientMessage::Identify(IdentifyRequest {
                display_name: field(p, "displayName"),
                player_id: field(p, "playerId"),
                resume_token: field(p, "resumeToken"),
                auth_token: field(p, "authToken"),
            }),
            events::QUEUE_JOIN => ClientMessage::JoinQueue {
                ranked: field(p, "ranked").unwrap_or(false),
            },
            events::QUEUE_LEAVE => ClientMessage::LeaveQueue,
            events::MATCH_RESUME => ClientMessage::Resume { match_id },
            events::MATCH_FORFEIT => ClientMessage::Action {
                match_id,
                action: PlayerAction::Forfeit,
            },
            events::ROUND_PICK_LETTER => ClientMessage::Action {
                match_id,
                action: PlayerAction::PickLetter {
                    kind: field::<LetterKind>(p, "kind"),
                },
            },
            events::ROUND_SUBMIT_WORD => ClientMessage::Action {
                match_id,
                action: PlayerAction::SubmitWord {
                    word: field(p, "word").unwrap_or_default(),
                },
            },
            events::ROUND_SUBMIT_CONUNDRUM_GUESS => ClientMessage::Action {
                match_id,
                action: PlayerAction::SubmitConundrumGuess {
                    guess: field(p, "guess").unwrap_or_default(),
                },
            },
            other => return Err(ProtocolError::UnknownEvent(other.to_string())),
        };
        Ok(message)
    }

    pub fn to_envelope(&self) -> Envelope {
        let mut payload = Map::new();
        match self {
            ClientMessage::Identify(req) => {
                put(&mut payload, "displayName", &req.display_name);
                put(&mut payload, "playerId", &req.player_id);
                put(&mut payload, "resumeToken", &req.resume_token);
                put(&mut payload, "authToken", &req.auth_token);
            }
            ClientMessage::JoinQueue { ranked } => {
                payload.insert("ranked".to_string(), json!(ranked));
            }
            ClientMessage::LeaveQueue => {}
            ClientMessage::Resume { match_id } => put(&mut payload, "matchId", match_id),
            ClientMessage::Action { match_id, action } => {
                put(&mut payload, "matchId", match_id);
                match action {
                    PlayerAction::PickLetter { kind } => put(&mut payload, "kind", kind),
                    PlayerAction::SubmitWord { word } => {
                        payload.insert("word".to_string(), json!(word));
                    }
                    PlayerAction::SubmitConundrumGuess { guess } => {
                        payload.insert("guess".to_string(), json!(guess));
                    }
                    PlayerAction::Forfeit => {}
                }
            }
        }
        Envelope {
            event: self.event_name().to_string(),
            payload: Value::Object(payload),
        }
    }
}

// === Server -> client ===

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerView {
    pub player_id: PlayerId,
    pub display_name: String,
    pub connected: bool,
    pub score: u32,
}

/// Full match snapshot; the only channel of match truth for clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchStatePayload {
    pub match_id: MatchId,
    pub phase: Phase,
    pub phase_ends_at_ms: Option<u64>,
    pub server_now_ms: u64,
    pub round_number: u32,
    pub round_type: RoundType,
    pub players: Vec<PlayerView>,
    pub picker_player_id: Option<PlayerId>,
    pub letters: Vec<char>,
    pub scrambled: Option<String>,
    pub round_results: Vec<RoundResult>,
    pub winner_player_id: Option<PlayerId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionIdentity {
    pub player_id: PlayerId,
    pub display_name: String,
    /// Private to the owner; the player id itself is public
    pub resume_token: String,
    pub server_now_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QueueState {
    Idle,
    Searching,
    InMatch,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchmakingStatus {
    pub state: QueueState,
    #[serde(default)]
    pub ranked: bool,
    /// Identified, connected sessions
    pub online_count: usize,
    pub match_id: Option<MatchId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchFound {
    pub match_id: MatchId,
    pub ranked: bool,
    pub opponent_player_id: PlayerId,
    pub opponent_display_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionErrorPayload {
    /// Event name of the rejected action
    pub action: String,
    /// Kept as a string so codes added later still decode
    pub code: String,
    pub message: String,
}

impl ActionErrorPayload {
    pub fn new(action: &str, code: ActionErrorCode) -> Self {
        Self {
            action: action.to_string(),
            code: code.as_str().to_string(),
            message: code.message().to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "payload")]
pub enum ServerMessage {
    #[serde(rename = "session:identified")]
    SessionIdentified(SessionIdentity),
    #[serde(rename = "matchmaking:status")]
    MatchmakingStatus(MatchmakingStatus),
    #[serde(rename = "match:found")]
    MatchFound(MatchFound),
    #[serde(rename = "match:state")]
    MatchState(MatchStatePayload),
    #[serde(rename = "action:error")]
    ActionError(ActionErrorPayload),
}

impl ServerMessage {
    pub fn event_name(&self) -> &'static str {
        match self {
            ServerMessage::SessionIdentified(_) => events::SESSION_IDENTIFIED,
            ServerMessage::MatchmakingStatus(_) => events::MATCHMAKING_STATUS,
            ServerMessage::MatchFound(_) => events::MATCH_FOUND,
            ServerMessage::MatchState(_) => events::MATCH_STATE,
            ServerMessage::ActionError(_) => events::ACTION_ERROR,
        }
    }
}
