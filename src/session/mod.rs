//! Session Module
//!
//! A `Session` holds the per-connection protocol state and implements the
//! command handlers. It is owned by exactly one worker task, so none of its
//! fields need locking.
//!
//! ## Protocol Phases
//!
//! ```text
//!  Start ──HELO──> Greeted ──MAIL FROM──> SenderSet ──RCPT TO──> RecipientSet
//!                     ▲                                               │
//!                     │                                             DATA
//!                     │                                               ▼
//!                     └────────────── terminator "." ─────────── InData
//!
//!  QUIT from any phase ends the dispatch loop.
//! ```
//!
//! The HELO identity survives across transactions; sender, recipient and body
//! are cleared whenever a DATA capture finishes, successfully or not.

pub mod handler;
pub mod mailbox;

use std::fmt;
use std::time::Duration;

// Re-export commonly used types
pub use handler::Session;
pub use mailbox::{parse_mailbox, strip_decorations};

/// Default inactivity timeout, re-armed on every reply.
pub const DEFAULT_REPLY_TIMEOUT: Duration = Duration::from_secs(100);

/// Longest accepted line (64 KB), terminator included
pub const MAX_LINE_LENGTH: usize = 64 * 1024;

/// Default cap on a captured message body (10 MB)
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 10 * 1024 * 1024;

/// Where a session is in the submission sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    /// Connected, no HELO yet
    #[default]
    Start,
    /// HELO accepted
    Greeted,
    /// MAIL FROM accepted
    SenderSet,
    /// RCPT TO accepted
    RecipientSet,
    /// Capturing the message body
    InData,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Start => "start",
            Phase::Greeted => "greeted",
            Phase::SenderSet => "sender-set",
            Phase::RecipientSet => "recipient-set",
            Phase::InData => "in-data",
        };
        f.write_str(name)
    }
}

/// Per-session settings shared by every connection of a server.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// How long to wait for the client after each reply
    pub reply_timeout: Duration,

    /// Optional `220` greeting sent before the first command is read
    pub banner: Option<String>,

    /// Largest body accepted after DATA, in bytes
    pub max_message_size: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            reply_timeout: DEFAULT_REPLY_TIMEOUT,
            banner: None,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
        }
    }
}
