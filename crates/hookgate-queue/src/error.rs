//! Transport error types.

use std::io;

/// Structured classification of a transport failure.
///
/// Callers branch on the kind rather than on message text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    /// Nothing is listening at the target address.
    ConnectionRefused,
    /// Connect, handshake or keepalive did not answer in time.
    Timeout,
    /// Any other socket-level failure.
    Io,
    /// The peer sent something that is not valid RESP, or an unexpected reply.
    Protocol,
    /// The backend rejected our credentials.
    Auth,
    /// The peer closed the connection.
    Closed,
}

/// A failed connect attempt or a dropped session.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{kind:?} ({node}): {message}")]
pub struct TransportError {
    pub kind: TransportErrorKind,
    /// `host:port` of the node involved.
    pub node: String,
    pub message: String,
}

impl TransportError {
    pub fn new(kind: TransportErrorKind, node: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            node: node.into(),
            message: message.into(),
        }
    }

    /// Map an I/O error, keeping refused connections and timeouts distinct.
    pub fn from_io(node: impl Into<String>, err: &io::Error) -> Self {
        let kind = match err.kind() {
            io::ErrorKind::ConnectionRefused => TransportErrorKind::ConnectionRefused,
            io::ErrorKind::TimedOut => TransportErrorKind::Timeout,
            io::ErrorKind::UnexpectedEof
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe => TransportErrorKind::Closed,
            _ => TransportErrorKind::Io,
        };
        Self::new(kind, node, err.to_string())
    }

    /// Refused connections are expected while the backend is restarting.
    pub fn is_connection_refused(&self) -> bool {
        self.kind == TransportErrorKind::ConnectionRefused
    }
}
