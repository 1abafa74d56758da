use std::io::{self, Read, Write};
use std::sync::Arc;

use rustls::pki_types::ServerName;
use rustls::{ClientConfig, ClientConnection, ServerConfig, ServerConnection};
use tracing::warn;

use crate::error::{Error, Result};
use crate::tls::TlsRole;

/// Outcome of one handshake step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeStatus {
    /// The peer owes us bytes; wait for the next read-readiness event.
    InProgress,
    /// Negotiation finished; the session now carries application data.
    Complete,
    /// Negotiation failed; the connection must be destroyed.
    Failed,
}

/// A TLS session bound to one connection.
///
/// rustls performs all cryptography in user space against our non-blocking
/// socket, so the session both negotiates the handshake and, once ready,
/// translates between plaintext and wire records for the engine's read and
/// write paths.
pub struct TlsSession {
    conn: rustls::Connection,
    ready: bool,
}

impl TlsSession {
    /// Create a server-side session.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Tls`] if the configuration is rejected.
    pub fn server(config: Arc<ServerConfig>) -> Result<Self> {
        let conn = ServerConnection::new(config).map_err(|e| Error::Tls(e.to_string()))?;
        Ok(Self {
            conn: conn.into(),
            ready: false,
        })
    }

    /// Create a client-side session for the given server name.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Tls`] if the server name is invalid or the
    /// configuration is rejected.
    pub fn client(config: Arc<ClientConfig>, server_name: &str) -> Result<Self> {
        let name = ServerName::try_from(server_name.to_string())
            .map_err(|_| Error::Tls(format!("invalid server name: {server_name}")))?;
        let conn = ClientConnection::new(config, name).map_err(|e| Error::Tls(e.to_string()))?;
        Ok(Self {
            conn: conn.into(),
            ready: false,
        })
    }

    /// Negotiation direction of this session.
    #[must_use]
    pub fn role(&self) -> TlsRole {
        match self.conn {
            rustls::Connection::Client(_) => TlsRole::Client,
            rustls::Connection::Server(_) => TlsRole::Server,
        }
    }

    /// Check whether the handshake has completed.
    ///
    /// Stored once on completion, not re-derived.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.ready
    }

    /// Check whether encrypted records are waiting to be written out.
    #[must_use]
    pub fn wants_write(&self) -> bool {
        self.conn.wants_write()
    }

    /// Cap the plaintext the session buffers for transmission.
    ///
    /// Aligned with the connection's send buffer limit so backpressure is
    /// not defeated by unbounded buffering inside the record layer.
    pub fn set_buffer_limit(&mut self, limit: Option<usize>) {
        self.conn.set_buffer_limit(limit);
    }

    /// Advance the handshake as far as the socket allows.
    ///
    /// [`HandshakeStatus::InProgress`] means the step consumed everything
    /// available and the caller waits for the next readiness event; there
    /// is no busy looping. On [`HandshakeStatus::Complete`] the ready flag
    /// is set and subsequent reads and writes carry application data.
    pub fn step<S: Read + Write>(&mut self, io: &mut S) -> HandshakeStatus {
        loop {
            while self.conn.wants_write() {
                match self.conn.write_tls(io) {
                    Ok(0) => {
                        warn!("peer closed during handshake");
                        return HandshakeStatus::Failed;
                    }
                    Ok(_) => {}
                    Err(err) if err.kind() == io::ErrorKind::WouldBlock => break,
                    Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
                    Err(err) => {
                        warn!(%err, "handshake write failed");
                        return HandshakeStatus::Failed;
                    }
                }
            }

            if !self.conn.is_handshaking() {
                self.ready = true;
                return HandshakeStatus::Complete;
            }

            match self.conn.read_tls(io) {
                Ok(0) => {
                    warn!("peer closed during handshake");
                    return HandshakeStatus::Failed;
                }
                Ok(_) => {
                    if let Err(err) = self.conn.process_new_packets() {
                        warn!(%err, "handshake negotiation failed");
                        // Best effort: push the pending alert out before
                        // the connection is torn down.
                        while self.conn.wants_write() {
                            if self.conn.write_tls(io).is_err() {
                                break;
                            }
                        }
                        return HandshakeStatus::Failed;
                    }
                }
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => {
                    return HandshakeStatus::InProgress;
                }
                Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
                Err(err) => {
                    warn!(%err, "handshake read failed");
                    return HandshakeStatus::Failed;
                }
            }
        }
    }

    /// Read decrypted plaintext into `buf`.
    ///
    /// Pulls one batch of records off the socket when available, then
    /// drains buffered plaintext. `Ok(0)` means the peer closed;
    /// `WouldBlock` means nothing is available yet.
    pub fn read<S: Read>(&mut self, io: &mut S, buf: &mut [u8]) -> io::Result<usize> {
        match self.conn.read_tls(io) {
            Ok(0) => return Ok(0),
            Ok(_) => {
                self.conn
                    .process_new_packets()
                    .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))?;
            }
            Err(err) if err.kind() == io::ErrorKind::WouldBlock => {}
            Err(err) => return Err(err),
        }
        self.conn.reader().read(buf)
    }

    /// Encrypt `data` and write as much as the socket accepts.
    ///
    /// Plaintext the record layer accepts counts as written even when some
    /// ciphertext remains queued inside the session; the caller checks
    /// [`wants_write`](Self::wants_write) and keeps write interest
    /// registered until the backlog flushes.
    pub fn write<S: Write>(&mut self, io: &mut S, data: &[u8]) -> io::Result<usize> {
        let n = self.conn.writer().write(data)?;
        match self.flush(io) {
            Ok(()) => {}
            Err(err) if err.kind() == io::ErrorKind::WouldBlock => {}
            Err(err) => return Err(err),
        }
        Ok(n)
    }

    /// Push queued ciphertext to the socket.
    ///
    /// # Errors
    ///
    /// `WouldBlock` when the socket stops accepting; the backlog stays
    /// queued in the session.
    pub fn flush<S: Write>(&mut self, io: &mut S) -> io::Result<()> {
        while self.conn.wants_write() {
            match self.conn.write_tls(io) {
                Ok(0) => {
                    return Err(io::Error::new(
                        io::ErrorKind::WriteZero,
                        "socket closed while flushing records",
                    ));
                }
                Ok(_) => {}
                Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
                Err(err) => return Err(err),
            }
        }
        Ok(())
    }
}
