//! # Argopost - A Line-Oriented Mail Submission Server
//!
//! Argopost interprets the core of SMTP submission: `HELO`, `MAIL FROM`,
//! `RCPT TO`, `DATA` and `QUIT`. It enforces the command ordering, formats
//! replies per the wire protocol and captures message bodies, then hands each
//! completed message to a delivery queue.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                              Argopost                                   │
//! │                                                                         │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐                  │
//! │  │ TCP Server  │───>│  Session    │───>│  Session    │                  │
//! │  │ (Listener)  │    │  Manager    │    │  Handlers   │                  │
//! │  └─────────────┘    └──────┬──────┘    └──────┬──────┘                  │
//! │                            │                  │                         │
//! │                            ▼                  ▼                         │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐                  │
//! │  │  Command    │    │  Registry   │    │  Delivery   │                  │
//! │  │  Parser     │    │  (sharded)  │    │  Queue      │                  │
//! │  └─────────────┘    └─────────────┘    └──────┬──────┘                  │
//! │                                               ▼                         │
//! │                                        ┌─────────────┐                  │
//! │                                        │  Delivery   │                  │
//! │                                        │  Worker     │                  │
//! │                                        └─────────────┘                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```ignore
//! use argopost::connection::{handle_connection, Connection, SessionManager};
//! use argopost::delivery::{DeliveryQueue, DeliveryWorker};
//! use argopost::session::SessionConfig;
//! use std::sync::Arc;
//! use tokio::net::TcpListener;
//!
//! #[tokio::main]
//! async fn main() {
//!     let (queue, rx) = DeliveryQueue::channel();
//!     let _worker = DeliveryWorker::start(rx);
//!     let manager = Arc::new(SessionManager::new(SessionConfig::default(), queue));
//!
//!     let listener = TcpListener::bind("127.0.0.1:2525").await.unwrap();
//!     loop {
//!         let (stream, _) = listener.accept().await.unwrap();
//!         let session = manager.create_session(Connection::from_tcp(stream).unwrap()).unwrap();
//!         tokio::spawn(handle_connection(Arc::clone(&manager), session));
//!     }
//! }
//! ```
//!
//! ## Module Overview
//!
//! - [`protocol`]: Command parser, reply formatting, rejection taxonomy
//! - [`session`]: Per-connection state machine and command handlers
//! - [`connection`]: Session manager, registry and connection tasks
//! - [`delivery`]: Hand-off of completed messages to the delivery backend
//!
//! ## Design Highlights
//!
//! ### One Task Per Connection
//!
//! Sessions are never shared. The only state touched by more than one task is
//! the registry, and every access to it goes through a shard lock.
//!
//! ### Inactivity Deadline
//!
//! Every reply re-arms a deadline. A client that stays silent past it has its
//! pending read fail, which ends and closes the session.

pub mod connection;
pub mod delivery;
pub mod protocol;
pub mod session;

// Re-export commonly used types for convenience
pub use connection::{
    handle_connection, Connection, ConnectionError, ConnectionStats, SessionManager,
};
pub use delivery::{DeliveryQueue, DeliveryWorker, Envelope};
pub use protocol::{Command, CommandKind, CommandParser, ProtocolError, Reply};
pub use session::{Phase, Session, SessionConfig};

/// The default port Argopost listens on
pub const DEFAULT_PORT: u16 = 2525;

/// The default host Argopost binds to
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Version of Argopost
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
