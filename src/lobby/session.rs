//! Connected sessions, player identity and presence

use super::auth::Authenticator;
use crate::game::action::ActionErrorCode;
use crate::game::PlayerId;
use crate::network::peer::PeerSender;
use crate::network::protocol::{IdentifyRequest, ServerMessage};
use crate::network::ConnId;
use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

const LOG_TARGET: &str = "lettermatch::session";

pub const MAX_DISPLAY_NAME_LEN: usize = 20;

/// Counts players currently online.
pub trait PresenceStore: Send + Sync {
    fn count(&self) -> usize;
}

/// Trim and check a display name: 1-20 characters of letters, digits,
/// spaces, `_` or `-`.
pub fn validate_display_name(raw: &str) -> Result<String, ActionErrorCode> {
    let name = raw.trim();
    let len = name.chars().count();
    let allowed = name
        .chars()
        .all(|c| c.is_alphanumeric() || c == ' ' || c == '_' || c == '-');
    if len == 0 || len > MAX_DISPLAY_NAME_LEN || !allowed {
        return Err(ActionErrorCode::InvalidDisplayName);
    }
    Ok(name.to_string())
}

/// An identified connection.
#[derive(Debug, Clone)]
pub struct Session {
    pub conn: ConnId,
    pub player_id: PlayerId,
    pub display_name: String,
    /// Secret that lets a later connection reclaim `player_id`
    pub resume_token: String,
    pub authenticated: bool,
}

#[derive(Default)]
pub struct SessionRegistry {
    /// Every open connection, identified or not
    senders: DashMap<ConnId, PeerSender>,
    sessions: DashMap<ConnId, Session>,
    by_player: DashMap<PlayerId, ConnId>,
    /// Resume tokens by player, kept after disconnect
    resume_tokens: DashMap<PlayerId, String>,
    /// Serializes identify so name uniqueness checks cannot interleave
    identify_lock: Mutex<()>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connect(&self, conn: ConnId, sender: PeerSender) {
        self.senders.insert(conn, sender);
    }

    /// Bind `conn` to a player. Reconnecting with a known player id and its
    /// resume token takes that identity over from any older connection.
    pub fn identify(
        &self,
        conn: ConnId,
        request: &IdentifyRequest,
        authenticator: &dyn Authenticator,
    ) -> Result<Session, ActionErrorCode> {
        let display_name =
            validate_display_name(request.display_name.as_deref().unwrap_or_default())?;

        let _guard = self.identify_lock.lock();

        let existing = self.sessions.get(&conn).map(|s| s.player_id.clone());
        let player_id = match existing {
            Some(player_id) => player_id,
            None => self.claim(conn, request)?,
        };

        let wanted = display_name.to_lowercase();
        let taken = self
            .sessions
            .iter()
            .any(|s| s.player_id != player_id && s.display_name.to_lowercase() == wanted);
        if taken {
            return Err(ActionErrorCode::DisplayNameTaken);
        }

        if let Some(old_conn) = self.by_player.get(&player_id).map(|c| *c) {
            if old_conn != conn {
                debug!(target: LOG_TARGET, %player_id, old_conn, conn, "identity moved to new connection");
                self.sessions.remove(&old_conn);
            }
        }

        let authenticated = request
            .auth_token
            .as_deref()
            .is_some_and(|token| authenticator.verify(token));

        let resume_token = self
            .resume_tokens
            .entry(player_id.clone())
            .or_insert_with(|| Uuid::new_v4().simple().to_string())
            .clone();

        let session = Session {
            conn,
            player_id: player_id.clone(),
            display_name,
            resume_token,
            authenticated,
        };
        self.sessions.insert(conn, session.clone());
        self.by_player.insert(player_id, conn);

        info!(
            target: LOG_TARGET,
            player_id = %session.player_id,
            display_name = %session.display_name,
            authenticated,
            "session identified"
        );
        Ok(session)
    }

    /// Player id for a connection that has not identified yet.
    ///
    /// A presented id the server has issued a token for needs that token.
    /// Ids the server has never seen (issued before a restart) are bound
    /// to the first connection that presents them.
    fn claim(&self, conn: ConnId, request: &IdentifyRequest) -> Result<PlayerId, ActionErrorCode> {
        let Some(player_id) = request
            .player_id
            .as_deref()
            .filter(|id| Uuid::parse_str(id).is_ok())
        else {
            return Ok(Uuid::new_v4().to_string());
        };
        match self.resume_tokens.get(player_id) {
            Some(token) if request.resume_token.as_deref() == Some(token.as_str()) => {
                Ok(player_id.to_string())
            }
            Some(_) => {
                warn!(target: LOG_TARGET, %player_id, conn, "resume token mismatch");
                Err(ActionErrorCode::UnknownPlayer)
            }
            None => Ok(player_id.to_string()),
        }
    }

    pub fn session(&self, conn: ConnId) -> Option<Session> {
        self.sessions.get(&conn).map(|s| s.clone())
    }

    pub fn session_for_player(&self, player_id: &str) -> Option<Session> {
        let conn = *self.by_player.get(player_id)?;
        self.session(conn)
    }

    /// Drop a connection. Returns its session if it was identified and
    /// still owned its identity.
    pub fn disconnect(&self, conn: ConnId) -> Option<Session> {
        self.senders.remove(&conn);
        let (_, session) = self.sessions.remove(&conn)?;
        self.by_player
            .remove_if(&session.player_id, |_, bound| *bound == conn);
        Some(session)
    }

    pub fn send_to_conn(&self, conn: ConnId, message: &ServerMessage) {
        if let Some(sender) = self.senders.get(&conn) {
            if let Err(err) = sender.send(message) {
                debug!(target: LOG_TARGET, conn, event = message.event_name(), %err, "dropped outbound message");
            }
        }
    }

    pub fn send_to_player(&self, player_id: &str, message: &ServerMessage) {
        if let Some(conn) = self.by_player.get(player_id).map(|c| *c) {
            self.send_to_conn(conn, message);
        }
    }

    /// Queue one pre-encoded frame to several players.
    pub fn send_frame_to_players<'a>(&self, players: impl IntoIterator<Item = &'a str>, frame: &[u8]) {
        for player_id in players {
            let Some(conn) = self.by_player.get(player_id).map(|c| *c) else {
                continue;
            };
            if let Some(sender) = self.senders.get(&conn) {
                let _ = sender.send_raw(frame.to_vec());
            }
        }
    }

    /// Identified sessions right now.
    pub fn identified(&self) -> Vec<Session> {
        self.sessions.iter().map(|s| s.clone()).collect()
    }
}

impl PresenceStore for SessionRegistry {
    fn count(&self) -> usize {
        self.sessions.len()
    }
}
