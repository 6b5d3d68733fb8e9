use anyhow::{Context, Result};
use std::io::{self, ErrorKind, Read};
use std::net::{SocketAddr, TcpListener, TcpStream};
use tracing::{debug, info, warn};

use crate::config::LayoutConfig;
use crate::opc::{FrameTarget, ProtocolDecoder};

const RECV_BUFFER_SIZE: usize = 16384; // 16KB

/// An accepted client stream
pub trait Connection {
    /// Non-blocking read. `Ok(0)` means no bytes right now, not end of stream.
    fn read_available(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Liveness as of the last read
    fn is_connected(&self) -> bool;

    fn peer(&self) -> String;
}

pub trait Listener {
    type Conn: Connection;

    /// Non-blocking accept
    fn poll_accept(&mut self) -> io::Result<Option<Self::Conn>>;
}

pub struct TcpConnection {
    stream: TcpStream,
    peer: SocketAddr,
    connected: bool,
}

impl TcpConnection {
    fn new(stream: TcpStream, peer: SocketAddr) -> io::Result<Self> {
        stream.set_nonblocking(true)?;
        stream.set_nodelay(true)?;
        Ok(TcpConnection {
            stream,
            peer,
            connected: true,
        })
    }
}

impl Connection for TcpConnection {
    fn read_available(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.stream.read(buf) {
            Ok(0) => {
                // Orderly shutdown by the client
                self.connected = false;
                Ok(0)
            }
            Ok(n) => Ok(n),
            Err(e) if e.kind() == ErrorKind::WouldBlock || e.kind() == ErrorKind::Interrupted => Ok(0),
            Err(e) => {
                self.connected = false;
                Err(e)
            }
        }
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn peer(&self) -> String {
        self.peer.to_string()
    }
}

pub struct TcpOpcListener {
    listener: TcpListener,
}

impl TcpOpcListener {
    pub fn bind(addr: &str) -> Result<Self> {
        let listener = TcpListener::bind(addr).context(format!("Failed to bind to {}", addr))?;
        listener.set_nonblocking(true)?;
        Ok(TcpOpcListener { listener })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }
}

impl Listener for TcpOpcListener {
    type Conn = TcpConnection;

    fn poll_accept(&mut self) -> io::Result<Option<TcpConnection>> {
        match self.listener.accept() {
            Ok((stream, peer)) => TcpConnection::new(stream, peer).map(Some),
            Err(e) if e.kind() == ErrorKind::WouldBlock || e.kind() == ErrorKind::TimedOut => Ok(None),
            Err(e) => Err(e),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    Idle,
    Connected(String),
    Disconnected,
    Data { bytes: usize, messages: usize },
}

struct Client<C> {
    conn: C,
    decoder: ProtocolDecoder,
    bytes: u64,
}

/// Serves one OPC client at a time.
///
/// Each accepted connection gets a fresh decoder, so nothing from a dropped
/// client (half a header, half a payload) can reach the next one.
pub struct ConnectionManager<L: Listener> {
    listener: L,
    layout: LayoutConfig,
    client: Option<Client<L::Conn>>,
    read_buf: Vec<u8>,
}

impl<L: Listener> ConnectionManager<L> {
    pub fn new(listener: L, layout: LayoutConfig) -> Self {
        ConnectionManager {
            listener,
            layout,
            client: None,
            read_buf: vec![0u8; RECV_BUFFER_SIZE],
        }
    }

    pub fn is_client_connected(&self) -> bool {
        self.client.is_some()
    }

    /// One loop iteration: accept, check liveness, or decode one chunk
    pub fn poll<T: FrameTarget + ?Sized>(&mut self, target: &mut T) -> ConnectionEvent {
        let Some(client) = self.client.as_mut() else {
            return self.accept();
        };

        if !client.conn.is_connected() {
            self.disconnect();
            return ConnectionEvent::Disconnected;
        }

        match client.conn.read_available(&mut self.read_buf) {
            Ok(0) => ConnectionEvent::Idle,
            Ok(n) => {
                client.bytes += n as u64;
                let messages = client.decoder.feed(&self.read_buf[..n], target);
                ConnectionEvent::Data { bytes: n, messages }
            }
            Err(e) => {
                // The connection flagged itself dead; torn down on the next poll
                warn!(peer = %client.conn.peer(), error = %e, "read failed");
                ConnectionEvent::Idle
            }
        }
    }

    fn accept(&mut self) -> ConnectionEvent {
        match self.listener.poll_accept() {
            Ok(Some(conn)) => {
                let peer = conn.peer();
                info!(%peer, "client connected");
                self.client = Some(Client {
                    conn,
                    decoder: ProtocolDecoder::new(self.layout),
                    bytes: 0,
                });
                ConnectionEvent::Connected(peer)
            }
            Ok(None) => ConnectionEvent::Idle,
            Err(e) => {
                warn!(error = %e, "error accepting connection");
                ConnectionEvent::Idle
            }
        }
    }

    /// Drop the client and its decoder state
    pub fn disconnect(&mut self) {
        if let Some(client) = self.client.take() {
            if !client.decoder.is_between_messages() {
                debug!("discarding partially received message");
            }
            info!(
                peer = %client.conn.peer(),
                bytes = client.bytes,
                messages = client.decoder.messages(),
                "client disconnected"
            );
        }
    }
}
