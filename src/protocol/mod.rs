//! SMTP Protocol Implementation
//!
//! This module provides the wire-level pieces of the submission protocol.
//!
//! ## Modules
//!
//! - `command`: Turns one input line into a typed `Command`
//! - `reply`: Reply codes, multi-line reply formatting, and the rejection taxonomy
//!
//! ## Example
//!
//! ```
//! use argopost::protocol::{CommandKind, CommandParser, Reply};
//!
//! // Parsing an incoming line
//! let cmd = CommandParser::new().parse("HELO client.example\r\n").unwrap();
//! assert_eq!(cmd.kind, CommandKind::Helo);
//!
//! // Creating a reply
//! let reply = Reply::ok(format!("Hello {}", cmd.payload));
//! assert_eq!(&reply.serialize()[..], b"250 Hello client.example\r\n");
//! ```

pub mod command;
pub mod reply;

// Re-export commonly used types for convenience
pub use command::{Command, CommandKind, CommandParser};
pub use reply::{codes, format_reply, ProtocolError, Reply};
