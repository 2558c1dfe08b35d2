//! Connection Management Module
//!
//! This module manages client connections and the session registry.
//! Each client connection is handled by its own async task, so one slow or
//! failing client never holds up another.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     TCP Listener                            │
//! │                    (main.rs)                                │
//! └──────────────────────┬──────────────────────────────────────┘
//!                        │
//!                        │ accept() + create_session()
//!                        ▼
//!           ┌────────────────────────┐
//!           │   For each client...   │
//!           └────────────┬───────────┘
//!                        │
//!                        │ spawn task
//!                        ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 SessionManager::handle_session              │
//! │                                                             │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐     │
//! │  │ Read line   │───>│ Parse cmd   │───>│ Session     │     │
//! │  └─────────────┘    └─────────────┘    │ handler     │     │
//! │                                        └──────┬──────┘     │
//! │                                               ▼             │
//! │                                      ┌─────────────┐        │
//! │                                      │ Send reply  │        │
//! │                                      └─────────────┘        │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use argopost::connection::{handle_connection, Connection, SessionManager};
//! use argopost::delivery::DeliveryQueue;
//! use argopost::session::SessionConfig;
//! use std::sync::Arc;
//!
//! let (queue, rx) = DeliveryQueue::channel();
//! let manager = Arc::new(SessionManager::new(SessionConfig::default(), queue));
//!
//! // For each accepted connection...
//! let (stream, _) = listener.accept().await?;
//! let session = manager.create_session(Connection::from_tcp(stream)?)?;
//! tokio::spawn(handle_connection(Arc::clone(&manager), session));
//! ```

pub mod handler;
pub mod manager;

// Re-export commonly used types
pub use handler::{handle_connection, Connection, ConnectionError, ConnectionStats};
pub use manager::{SessionInfo, SessionManager};
