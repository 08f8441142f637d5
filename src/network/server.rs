//! TCP server accepting player connections

use super::peer::{Peer, PeerSender};
use super::protocol::{ClientMessage, Envelope};
use std::io;
use std::net::{SocketAddr, TcpListener, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};

const LOG_TARGET: &str = "lettermatch::network";

/// Default port for lettermatch servers
pub const DEFAULT_PORT: u16 = 47_400;

/// Maximum port to try when auto-incrementing
const MAX_PORT: u16 = 47_500;

/// Server-assigned id of one connection
pub type ConnId = u64;

/// Receives connection lifecycle and decoded messages.
///
/// Each connection calls in from its own thread, in arrival order for that
/// connection. Different connections call concurrently.
pub trait ConnectionHandler: Send + Sync + 'static {
    fn on_connect(&self, conn: ConnId, sender: PeerSender);
    fn on_message(&self, conn: ConnId, message: ClientMessage);
    fn on_disconnect(&self, conn: ConnId);
}

/// A running server. Dropping it stops accepting new connections.
pub struct Server {
    addr: SocketAddr,
    running: Arc<AtomicBool>,
}

impl Server {
    /// Start on `start_port`, moving up to the next free port if it is taken
    pub fn start_on_port<H: ConnectionHandler>(start_port: u16, handler: Arc<H>) -> io::Result<Self> {
        let mut port = start_port;
        let listener = loop {
            match TcpListener::bind(("0.0.0.0", port)) {
                Ok(l) => break l,
                Err(e) if e.kind() == io::ErrorKind::AddrInUse && port < MAX_PORT => {
                    port += 1;
                }
                Err(e) => return Err(e),
            }
        };
        Self::from_listener(listener, handler)
    }

    /// Start on an exact address (port 0 picks any free port)
    pub fn bind<A: ToSocketAddrs, H: ConnectionHandler>(addr: A, handler: Arc<H>) -> io::Result<Self> {
        Self::from_listener(TcpListener::bind(addr)?, handler)
    }

    fn from_listener<H: ConnectionHandler>(listener: TcpListener, handler: Arc<H>) -> io::Result<Self> {
        let addr = listener.local_addr()?;
        listener.set_nonblocking(true)?;

        let running = Arc::new(AtomicBool::new(true));
        let flag = running.clone();
        thread::spawn(move || accept_loop(listener, handler, flag));

        info!(target: LOG_TARGET, %addr, "listening");
        Ok(Server { addr, running })
    }

    /// Get the address the server is listening on
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Get the port the server is listening on
    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    /// Stop accepting connections; live connections keep running
    pub fn stop(&self) {
        self.running.store(false, Ordering::Relaxed);
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        self.stop();
    }
}

fn accept_loop<H: ConnectionHandler>(listener: TcpListener, handler: Arc<H>, running: Arc<AtomicBool>) {
    let next_id = AtomicU64::new(1);
    while running.load(Ordering::Relaxed) {
        match listener.accept() {
            Ok((stream, addr)) => match Peer::<Envelope>::new(stream) {
                Ok(peer) => {
                    let conn = next_id.fetch_add(1, Ordering::Relaxed);
                    debug!(target: LOG_TARGET, conn, %addr, "connection accepted");
                    let handler = handler.clone();
                    thread::spawn(move || serve_connection(conn, peer, handler));
                }
                Err(e) => warn!(target: LOG_TARGET, %addr, error = %e, "failed to set up connection"),
            },
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                thread::sleep(Duration::from_millis(50));
            }
            Err(e) => {
                warn!(target: LOG_TARGET, error = %e, "accept failed, shutting down listener");
                running.store(false, Ordering::Relaxed);
                break;
            }
        }
    }
}

fn serve_connection<H: ConnectionHandler>(conn: ConnId, mut peer: Peer<Envelope>, handler: Arc<H>) {
    handler.on_connect(conn, peer.sender());
    while let Some(envelope) = peer.recv() {
        match ClientMessage::from_envelope(&envelope) {
            Ok(message) => handler.on_message(conn, message),
            Err(e) => warn!(target: LOG_TARGET, conn, error = %e, "ignoring inbound frame"),
        }
    }
    debug!(target: LOG_TARGET, conn, "connection closed");
    handler.on_disconnect(conn);
}
