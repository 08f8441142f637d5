//! TCP client for a lettermatch server

use super::peer::Peer;
use super::protocol::{ClientMessage, IdentifyRequest, ProtocolError, ServerMessage};
use super::server::DEFAULT_PORT;
#[cfg(test)]
use crate::game::action::PlayerAction;
#[cfg(test)]
use crate::game::{LetterKind, MatchId};
use crate::game::PlayerId;
use std::io;
use std::net::{SocketAddr, ToSocketAddrs};

/// A player's connection to the server
pub struct Client {
    peer: Peer<ServerMessage>,
}

impl Client {
    /// Connect to a server at the given address
    ///
    /// The address can be "IP:PORT", "IP", "hostname:PORT" or "hostname";
    /// without a port the default port is used.
    pub fn connect(addr: &str) -> io::Result<Self> {
        Self::connect_addr(parse_address(addr)?)
    }

    pub fn connect_addr(addr: SocketAddr) -> io::Result<Self> {
        Ok(Client {
            peer: Peer::connect(addr)?,
        })
    }

    pub fn send(&self, message: &ClientMessage) -> Result<(), ProtocolError> {
        self.peer.send(&message.to_envelope())
    }

    /// Identify as `display_name`. Pass a previously issued player id and
    /// its resume token to reclaim that identity.
    pub fn identify(
        &self,
        display_name: &str,
        player_id: Option<PlayerId>,
        resume_token: Option<String>,
        auth_token: Option<String>,
    ) -> Result<(), ProtocolError> {
        self.send(&ClientMessage::Identify(IdentifyRequest {
            display_name: Some(display_name.to_string()),
            player_id,
            resume_token,
            auth_token,
        }))
    }

    /// Poll for incoming messages from the server
    pub fn poll(&mut self) -> Vec<ServerMessage> {
        self.peer.recv_all()
    }

    /// Check if still connected
    pub fn is_connected(&self) -> bool {
        self.peer.is_alive()
    }

    pub fn server_addr(&self) -> SocketAddr {
        self.peer.addr
    }

    pub fn close(&mut self) {
        self.peer.close();
    }
}

/// Typed senders for driving a server from tests.
#[cfg(test)]
impl Client {
    pub fn join_queue(&self, ranked: bool) -> Result<(), ProtocolError> {
        self.send(&ClientMessage::JoinQueue { ranked })
    }

    pub fn leave_queue(&self) -> Result<(), ProtocolError> {
        self.send(&ClientMessage::LeaveQueue)
    }

    pub fn resume(&self, match_id: Option<MatchId>) -> Result<(), ProtocolError> {
        self.send(&ClientMessage::Resume { match_id })
    }

    fn act(&self, match_id: Option<MatchId>, action: PlayerAction) -> Result<(), ProtocolError> {
        self.send(&ClientMessage::Action { match_id, action })
    }

    pub fn pick_letter(&self, match_id: Option<MatchId>, kind: LetterKind) -> Result<(), ProtocolError> {
        self.act(match_id, PlayerAction::PickLetter { kind: Some(kind) })
    }

    pub fn submit_word(&self, match_id: Option<MatchId>, word: &str) -> Result<(), ProtocolError> {
        self.act(
            match_id,
            PlayerAction::SubmitWord {
                word: word.to_string(),
            },
        )
    }

    pub fn forfeit(&self, match_id: Option<MatchId>) -> Result<(), ProtocolError> {
        self.act(match_id, PlayerAction::Forfeit)
    }

    pub fn recv_timeout(&mut self, timeout: std::time::Duration) -> Option<ServerMessage> {
        self.peer.recv_timeout(timeout)
    }
}

/// Parse an address string into a SocketAddr
///
/// Handles formats:
/// - "192.168.1.100:47400" -> parse directly
/// - "192.168.1.100" -> add default port
/// - "hostname:47400" -> resolve and use port
/// - "hostname" -> resolve and use default port
pub fn parse_address(addr: &str) -> io::Result<SocketAddr> {
    let with_port = if addr.contains(':') {
        addr.to_string()
    } else {
        format!("{}:{}", addr, DEFAULT_PORT)
    };
    with_port
        .to_socket_addrs()?
        .next()
        .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "could not resolve address"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::peer::PeerSender;
    use crate::network::protocol::{MatchmakingStatus, QueueState};
    use crate::network::server::{ConnId, ConnectionHandler, Server};
    use parking_lot::Mutex;
    use std::sync::Arc;
    use std::time::Duration;

    /// Answers every queue:join with a SEARCHING status.
    #[derive(Default)]
    struct Echo {
        senders: Mutex<Vec<(ConnId, PeerSender)>>,
    }

    impl ConnectionHandler for Echo {
        fn on_connect(&self, conn: ConnId, sender: PeerSender) {
            self.senders.lock().push((conn, sender));
        }

        fn on_message(&self, conn: ConnId, message: ClientMessage) {
            if let ClientMessage::JoinQueue { ranked } = message {
                let senders = self.senders.lock();
                if let Some((_, sender)) = senders.iter().find(|(c, _)| *c == conn) {
                    let status = ServerMessage::MatchmakingStatus(MatchmakingStatus {
                        state: QueueState::Searching,
                        ranked,
                        online_count: 1,
                        match_id: None,
                    });
                    sender.send(&status).unwrap();
                }
            }
        }

        fn on_disconnect(&self, _conn: ConnId) {}
    }

    #[test]
    fn test_parse_address_with_port() {
        let addr = parse_address("127.0.0.1:47400").unwrap();
        assert_eq!(addr.port(), 47_400);
    }

    #[test]
    fn test_parse_address_without_port() {
        let addr = parse_address("127.0.0.1").unwrap();
        assert_eq!(addr.port(), DEFAULT_PORT);
    }

    #[test]
    fn test_client_round_trip_with_server() {
        let server = Server::bind("127.0.0.1:0", Arc::new(Echo::default())).unwrap();
        let mut client = Client::connect(&format!("127.0.0.1:{}", server.port())).unwrap();

        client.join_queue(true).unwrap();
        let reply = client.recv_timeout(Duration::from_secs(2)).unwrap();
        assert!(matches!(
            reply,
            ServerMessage::MatchmakingStatus(MatchmakingStatus {
                state: QueueState::Searching,
                ranked: true,
                ..
            })
        ));
        assert!(client.is_connected());
    }
}
