//! Peer connection handling
//!
//! A peer owns two threads: a reader that decodes frames into an inbound
//! channel, and a writer that drains pre-encoded frames onto the socket.

use super::protocol::{encode_frame, read_frame, ProtocolError};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io::{self, ErrorKind, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::sync::mpsc::{channel, Receiver, Sender, TryRecvError};
use std::thread;
use std::time::Duration;
use tracing::{debug, warn};

const LOG_TARGET: &str = "lettermatch::network";

/// Cloneable handle for queueing outbound frames to one peer.
#[derive(Debug, Clone)]
pub struct PeerSender {
    addr: SocketAddr,
    tx: Sender<Vec<u8>>,
}

impl PeerSender {
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn send<T: Serialize>(&self, msg: &T) -> Result<(), ProtocolError> {
        let frame = encode_frame(msg)?;
        self.send_raw(frame)?;
        Ok(())
    }

    /// Queue an already encoded frame (used to serialize a broadcast once).
    pub fn send_raw(&self, frame: Vec<u8>) -> io::Result<()> {
        self.tx
            .send(frame)
            .map_err(|_| io::Error::new(ErrorKind::BrokenPipe, "peer disconnected"))
    }
}

/// A connected peer decoding inbound frames as `In`.
pub struct Peer<In> {
    /// Peer's address
    pub addr: SocketAddr,
    sender: PeerSender,
    rx: Receiver<In>,
    stream: TcpStream,
    alive: bool,
}

impl<In: DeserializeOwned + Send + 'static> Peer<In> {
    /// Wrap a TCP stream and start the reader and writer threads
    pub fn new(stream: TcpStream) -> io::Result<Self> {
        let addr = stream.peer_addr()?;

        stream.set_nonblocking(false)?;
        stream.set_nodelay(true)?;
        stream.set_write_timeout(Some(Duration::from_secs(5)))?;

        let (outgoing_tx, outgoing_rx) = channel::<Vec<u8>>();
        let (incoming_tx, incoming_rx) = channel::<In>();

        let mut write_stream = stream.try_clone()?;
        let mut read_stream = stream.try_clone()?;

        // Writer thread
        thread::spawn(move || {
            while let Ok(frame) = outgoing_rx.recv() {
                if write_stream.write_all(&frame).is_err() {
                    break;
                }
            }
            let _ = write_stream.shutdown(Shutdown::Write);
        });

        // Reader thread
        thread::spawn(move || loop {
            match read_frame::<_, In>(&mut read_stream) {
                Ok(msg) => {
                    if incoming_tx.send(msg).is_err() {
                        break;
                    }
                }
                Err(e) if e.is_fatal() => {
                    debug!(target: LOG_TARGET, %addr, error = %e, "peer reader closed");
                    break;
                }
                Err(e) => {
                    warn!(target: LOG_TARGET, %addr, error = %e, "dropping undecodable frame");
                }
            }
        });

        Ok(Peer {
            addr,
            sender: PeerSender {
                addr,
                tx: outgoing_tx,
            },
            rx: incoming_rx,
            stream,
            alive: true,
        })
    }

    /// Connect to a peer at the given address
    pub fn connect(addr: SocketAddr) -> io::Result<Self> {
        let stream = TcpStream::connect_timeout(&addr, Duration::from_secs(5))?;
        Self::new(stream)
    }
}

impl<In> Peer<In> {
    pub fn sender(&self) -> PeerSender {
        self.sender.clone()
    }

    pub fn send<T: Serialize>(&self, msg: &T) -> Result<(), ProtocolError> {
        self.sender.send(msg)
    }

    /// Try to receive a message from this peer (non-blocking)
    pub fn try_recv(&mut self) -> Option<In> {
        match self.rx.try_recv() {
            Ok(msg) => Some(msg),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => {
                self.alive = false;
                None
            }
        }
    }

    /// Block until a message arrives; `None` once the connection is gone
    pub fn recv(&mut self) -> Option<In> {
        match self.rx.recv() {
            Ok(msg) => Some(msg),
            Err(_) => {
                self.alive = false;
                None
            }
        }
    }

    #[cfg(test)]
    pub fn recv_timeout(&mut self, timeout: Duration) -> Option<In> {
        use std::sync::mpsc::RecvTimeoutError;
        match self.rx.recv_timeout(timeout) {
            Ok(msg) => Some(msg),
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => {
                self.alive = false;
                None
            }
        }
    }

    /// Receive all pending messages from this peer
    pub fn recv_all(&mut self) -> Vec<In> {
        let mut messages = Vec::new();
        while let Some(msg) = self.try_recv() {
            messages.push(msg);
        }
        messages
    }

    /// Check if the peer connection is still alive
    pub fn is_alive(&self) -> bool {
        self.alive
    }

    /// Close both directions; the reader thread exits on the resulting EOF.
    pub fn close(&mut self) {
        let _ = self.stream.shutdown(Shutdown::Both);
        self.alive = false;
    }
}

impl<In> Drop for Peer<In> {
    fn drop(&mut self) {
        let _ = self.stream.shutdown(Shutdown::Both);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::protocol::Envelope;
    use serde_json::json;
    use std::net::TcpListener;

    fn pair() -> (Peer<Envelope>, Peer<Envelope>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let client = Peer::connect(addr).unwrap();
        let (stream, _) = listener.accept().unwrap();
        (client, Peer::new(stream).unwrap())
    }

    #[test]
    fn test_peer_connect_and_send() {
        let (client, mut server) = pair();
        client
            .send(&Envelope {
                event: "queue:leave".to_string(),
                payload: json!({}),
            })
            .unwrap();

        let msg = server.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(msg.event, "queue:leave");
    }

    #[test]
    fn test_undecodable_frame_is_skipped() {
        let (client, mut server) = pair();
        // Valid JSON, but not an envelope
        client.send(&json!([1, 2, 3])).unwrap();
        client
            .send(&Envelope {
                event: "queue:join".to_string(),
                payload: json!({"ranked": false}),
            })
            .unwrap();

        let msg = server.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(msg.event, "queue:join");
        assert!(server.is_alive());
    }

    #[test]
    fn test_close_is_observed_by_other_side() {
        let (mut client, mut server) = pair();
        client.close();
        assert!(server.recv().is_none());
        assert!(!server.is_alive());
    }
}
