//! Connection Handler Module
//!
//! This module glues accepted TCP connections to the session layer.
//! Each client connection is handled by its own task that runs the
//! session's dispatch loop and always closes the session afterwards.
//!
//! ## Connection Lifecycle
//!
//! ```text
//! 1. Client connects (TCP handshake)
//!        │
//!        ▼
//! 2. SessionManager::create_session (registry insert)
//!        │
//!        ▼
//! 3. ┌──────────────────────────────┐
//!    │      Dispatch Loop           │
//!    │                              │
//!    │  read line ─> parse ─>       │
//!    │  handler ─> reply            │
//!    │         [Loop back]          │
//!    └──────────────────────────────┘
//!        │
//!        ▼
//! 4. QUIT / end of stream / transport error
//!        │
//!        ▼
//! 5. SessionManager::close_session (registry remove, stream shutdown)
//! ```

use crate::connection::SessionManager;
use crate::session::Session;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tracing::{debug, info, warn};

/// Statistics for connection handling
#[derive(Debug, Default)]
pub struct ConnectionStats {
    /// Total number of sessions created
    pub sessions_opened: AtomicU64,
    /// Currently registered sessions
    pub active_sessions: AtomicU64,
    /// Total commands processed
    pub commands_processed: AtomicU64,
    /// Messages handed to the delivery queue
    pub messages_queued: AtomicU64,
    /// Total bytes read
    pub bytes_read: AtomicU64,
    /// Total bytes written
    pub bytes_written: AtomicU64,
}

impl ConnectionStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn session_opened(&self) {
        self.sessions_opened.fetch_add(1, Ordering::Relaxed);
        self.active_sessions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn session_closed(&self) {
        self.active_sessions.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn command_processed(&self) {
        self.commands_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn message_queued(&self) {
        self.messages_queued.fetch_add(1, Ordering::Relaxed);
    }

    pub fn bytes_read(&self, count: usize) {
        self.bytes_read.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn bytes_written(&self, count: usize) {
        self.bytes_written
            .fetch_add(count as u64, Ordering::Relaxed);
    }
}

/// A duplex byte stream plus the endpoint strings that identify it.
#[derive(Debug)]
pub struct Connection<S> {
    pub stream: S,
    pub local: String,
    pub peer: String,
}

impl<S> Connection<S> {
    pub fn new(stream: S, local: impl ToString, peer: impl ToString) -> Self {
        Self {
            stream,
            local: local.to_string(),
            peer: peer.to_string(),
        }
    }
}

impl Connection<TcpStream> {
    /// Wraps an accepted TCP stream, reading both socket addresses.
    pub fn from_tcp(stream: TcpStream) -> std::io::Result<Self> {
        let local = stream.local_addr()?;
        let peer = stream.peer_addr()?;
        Ok(Self::new(stream, local, peer))
    }
}

/// Errors that end a session.
///
/// Protocol mistakes by the client are answered in-session and never show up here.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    /// I/O error (network issue)
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// No client activity within the reply timeout
    #[error("no activity for {0:?}")]
    Timeout(Duration),

    /// Stream ended in the middle of a message body
    #[error("Unexpected end of stream")]
    UnexpectedEof,

    /// Client sent a line longer than the limit without a terminator
    #[error("line exceeds {0} bytes")]
    LineTooLong(usize),

    /// Message body grew past the configured limit
    #[error("message body exceeds {0} bytes")]
    MessageTooLarge(usize),

    /// Another live session already hashes to this identity
    #[error("session {0:#018x} is already registered")]
    DuplicateSession(u64),
}

impl ConnectionError {
    /// Returns `true` for failures that just mean the client went away.
    pub fn is_disconnect(&self) -> bool {
        match self {
            ConnectionError::UnexpectedEof => true,
            ConnectionError::IoError(e) => matches!(
                e.kind(),
                std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::BrokenPipe
                    | std::io::ErrorKind::UnexpectedEof
            ),
            _ => false,
        }
    }
}

/// Runs an already-registered TCP session to completion.
///
/// The session is closed whatever way the dispatch loop ends. Errors are
/// logged here and never reach the accept loop.
pub async fn handle_connection(manager: Arc<SessionManager>, mut session: Session<TcpStream>) {
    let peer = session.peer().to_string();
    info!(client = %peer, session = session.id(), "Client connected");

    let result = manager.handle_session(&mut session).await;
    manager.close_session(&mut session).await;

    match result {
        Ok(()) => info!(client = %peer, "Client disconnected gracefully"),
        Err(e) if e.is_disconnect() => debug!(client = %peer, error = %e, "Client disconnected"),
        Err(e) => warn!(client = %peer, error = %e, "Connection error"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delivery::{DeliveryQueue, Envelope};
    use crate::session::SessionConfig;
    use std::net::SocketAddr;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
    use tokio::net::TcpListener;
    use tokio::sync::mpsc;

    async fn create_test_server(
        config: SessionConfig,
    ) -> (SocketAddr, Arc<SessionManager>, mpsc::UnboundedReceiver<Envelope>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (queue, rx) = DeliveryQueue::channel();
        let manager = Arc::new(SessionManager::new(config, queue));

        let server = Arc::clone(&manager);
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let connection = Connection::from_tcp(stream).unwrap();
                let session = server.create_session(connection).unwrap();
                tokio::spawn(handle_connection(Arc::clone(&server), session));
            }
        });

        (addr, manager, rx)
    }

    async fn read_reply(reader: &mut BufReader<TcpStream>) -> String {
        let mut line = String::new();
        reader.read_line(&mut line).await.unwrap();
        line
    }

    #[tokio::test]
    async fn test_full_transaction_over_tcp() {
        let (addr, manager, mut rx) = create_test_server(SessionConfig::default()).await;
        let mut client = BufReader::new(TcpStream::connect(addr).await.unwrap());

        let script: [(&[u8], &str); 6] = [
            (b"HELO a.com\r\n", "250 Hello a.com\r\n"),
            (b"MAIL FROM:<a@b.com>\r\n", "250 Accepting mail from a@b.com\r\n"),
            (b"RCPT TO:<c@d.com>\r\n", "250 Will deliver mail to c@d.com\r\n"),
            (b"DATA\r\n", "354 Enter data with a terminating .\r\n"),
            (b"hello\r\nworld\r\n.\r\n", "250 Ok: queued\r\n"),
            (b"QUIT\r\n", "221 Goodnight and good luck\r\n"),
        ];
        for (request, expected) in script {
            client.get_mut().write_all(request).await.unwrap();
            assert_eq!(read_reply(&mut client).await, expected);
        }

        let envelope = rx.recv().await.unwrap();
        assert_eq!(&envelope.body[..], b"hello\r\nworld\r\n");

        // The server closes its side after QUIT
        assert_eq!(read_reply(&mut client).await, "");
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(manager.is_empty());

        let stats = manager.stats();
        assert_eq!(stats.sessions_opened.load(Ordering::Relaxed), 1);
        assert_eq!(stats.active_sessions.load(Ordering::Relaxed), 0);
        assert_eq!(stats.messages_queued.load(Ordering::Relaxed), 1);
        assert!(stats.commands_processed.load(Ordering::Relaxed) >= 5);
        assert!(stats.bytes_read.load(Ordering::Relaxed) > 0);
        assert!(stats.bytes_written.load(Ordering::Relaxed) > 0);
    }

    #[tokio::test]
    async fn test_banner_greeting() {
        let config = SessionConfig {
            banner: Some("argopost ready".to_string()),
            ..Default::default()
        };
        let (addr, _, _rx) = create_test_server(config).await;
        let mut client = BufReader::new(TcpStream::connect(addr).await.unwrap());

        assert_eq!(read_reply(&mut client).await, "220 argopost ready\r\n");
    }

    #[tokio::test]
    async fn test_registry_tracks_live_connections() {
        let (addr, manager, _rx) = create_test_server(SessionConfig::default()).await;

        let first = TcpStream::connect(addr).await.unwrap();
        let second = TcpStream::connect(addr).await.unwrap();

        // Give the server time to accept the connections
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(manager.len(), 2);

        drop(first);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(manager.len(), 1);

        drop(second);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(manager.is_empty());
    }

    #[tokio::test]
    async fn test_idle_client_times_out() {
        let config = SessionConfig {
            reply_timeout: Duration::from_millis(100),
            ..Default::default()
        };
        let (addr, manager, _rx) = create_test_server(config).await;
        let mut client = BufReader::new(TcpStream::connect(addr).await.unwrap());

        client.get_mut().write_all(b"HELO a.com\r\n").await.unwrap();
        assert_eq!(read_reply(&mut client).await, "250 Hello a.com\r\n");

        // Say nothing; the server should hang up once the deadline passes
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(read_reply(&mut client).await, "");
        assert!(manager.is_empty());
    }

    #[test]
    fn test_disconnect_classification() {
        assert!(ConnectionError::UnexpectedEof.is_disconnect());
        let reset = std::io::Error::from(std::io::ErrorKind::ConnectionReset);
        assert!(ConnectionError::IoError(reset).is_disconnect());
        assert!(!ConnectionError::Timeout(Duration::from_secs(1)).is_disconnect());
        assert!(!ConnectionError::DuplicateSession(1).is_disconnect());
        assert!(!ConnectionError::LineTooLong(10).is_disconnect());
        assert!(!ConnectionError::MessageTooLarge(10).is_disconnect());
    }
}
