//! SMTP Replies
//!
//! This module defines the reply format and the in-session rejection taxonomy.
//!
//! ## Wire Format
//!
//! A reply is a three-digit code followed by one or more text lines.
//! Every line except the last uses a hyphen after the code, the last uses a space:
//!
//! ```text
//! 250-first line\r\n
//! 250-second line\r\n
//! 250 last line\r\n
//! ```
//!
//! A reply with no text lines is written as `"250 \r\n"`.

use bytes::{BufMut, BytesMut};
use thiserror::Error;

/// The CRLF terminator used on the wire
pub const CRLF: &[u8] = b"\r\n";

/// Reply codes used by the session
pub mod codes {
    pub const SERVICE_READY: u16 = 220;
    pub const CLOSING: u16 = 221;
    pub const OK: u16 = 250;
    pub const START_MAIL_INPUT: u16 = 354;
    pub const SYNTAX_ERROR: u16 = 501;
    pub const BAD_SEQUENCE: u16 = 502;
    pub const UNRECOGNIZED: u16 = 503;
    pub const TRANSACTION_FAILED: u16 = 554;
}

/// A reply to be sent to the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    /// Three-digit reply code
    pub code: u16,
    /// Text lines, in order
    pub lines: Vec<String>,
}

impl Reply {
    /// Creates a reply with a single text line.
    pub fn new(code: u16, line: impl Into<String>) -> Self {
        Self {
            code,
            lines: vec![line.into()],
        }
    }

    /// Creates a reply from any number of text lines.
    pub fn multiline<I, S>(code: u16, lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            code,
            lines: lines.into_iter().map(Into::into).collect(),
        }
    }

    /// Creates a `250` reply.
    pub fn ok(line: impl Into<String>) -> Self {
        Self::new(codes::OK, line)
    }

    /// Serializes the reply into its wire format.
    pub fn serialize(&self) -> BytesMut {
        format_reply(self.code, &self.lines)
    }
}

impl From<ProtocolError> for Reply {
    fn from(err: ProtocolError) -> Self {
        Reply::new(err.code(), err.to_string())
    }
}

/// Formats a reply according to the multi-line rules.
pub fn format_reply<S: AsRef<str>>(code: u16, lines: &[S]) -> BytesMut {
    let size: usize = lines.iter().map(|l| l.as_ref().len() + 6).sum();
    let mut buf = BytesMut::with_capacity(size.max(6));

    let Some((last, init)) = lines.split_last() else {
        buf.put_slice(format!("{} ", code).as_bytes());
        buf.put_slice(CRLF);
        return buf;
    };

    for line in init {
        buf.put_slice(format!("{}-{}", code, line.as_ref()).as_bytes());
        buf.put_slice(CRLF);
    }
    buf.put_slice(format!("{} {}", code, last.as_ref()).as_bytes());
    buf.put_slice(CRLF);
    buf
}

/// A protocol-level rejection.
///
/// Each variant is answered with a reply and the session continues.
/// Transport failures are not represented here.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Command issued before its prerequisite
    #[error("{0}")]
    Sequence(&'static str),

    /// Missing or malformed argument
    #[error("{0}")]
    Syntax(&'static str),

    /// Not a supported command; holds the whitespace-normalized line
    #[error("Command {0} is invalid")]
    Unrecognized(String),

    /// The message body could not be captured or handed off
    #[error("Error: transaction failed")]
    TransactionFailed,
}

impl ProtocolError {
    /// The reply code this rejection is reported with.
    pub fn code(&self) -> u16 {
        match self {
            ProtocolError::Sequence(_) => codes::BAD_SEQUENCE,
            ProtocolError::Syntax(_) => codes::SYNTAX_ERROR,
            ProtocolError::Unrecognized(_) => codes::UNRECOGNIZED,
            ProtocolError::TransactionFailed => codes::TRANSACTION_FAILED,
        }
    }

    /// Builds the rejection for an unrecognized line.
    pub fn unrecognized(line: &str) -> Self {
        ProtocolError::Unrecognized(line.split_whitespace().collect::<Vec<_>>().join(" "))
    }
}
