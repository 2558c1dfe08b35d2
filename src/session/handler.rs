//! Session State and Protocol Handlers
//!
//! Each `handle_*` method validates its preconditions, updates the session
//! fields and writes exactly one reply. Protocol rejections are answered in
//! place and never end the session; only transport failures are returned as
//! errors.
//!
//! ## Body Capture
//!
//! After a `354`, lines are read verbatim until a line whose content (line
//! terminator removed) is exactly `.`. A body line starting with `..` is
//! unstuffed to a single leading period.
//!
//! ## Limits
//!
//! No line may exceed `MAX_LINE_LENGTH` bytes and a body may not grow past
//! `SessionConfig::max_message_size`. Either violation ends the session.

use crate::connection::{Connection, ConnectionError, ConnectionStats};
use crate::delivery::{DeliveryQueue, Envelope};
use crate::protocol::{codes, ProtocolError, Reply};
use crate::session::{parse_mailbox, strip_decorations, Phase, SessionConfig, MAX_LINE_LENGTH};
use bytes::BytesMut;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::time::{timeout_at, Instant};
use tracing::{debug, info, trace, warn};

const HELO_REQUIRED: &str = "Domain/address argument is required for HELO";
const HELO_FIRST: &str = "Enter domain/address first before MAIL FROM command";
const MAIL_FROM_REQUIRED: &str = "Email argument is required for MAIL FROM";
const MAIL_FROM_FIRST: &str = "Missing MAIL FROM command";
const RCPT_TO_REQUIRED: &str = "Email argument is required for RCPT TO";
const RCPT_TO_FIRST: &str = "Missing RCPT TO command";
const DATA_NO_ARGS: &str = "There should be no arguments for DATA command";
const INVALID_ADDRESS: &str = "Invalid email address";

/// One client connection's protocol state.
pub struct Session<S> {
    /// Registry key, derived from the connection endpoints
    id: u64,

    /// Local endpoint (for logging)
    local: String,

    /// Client's endpoint (for logging)
    peer: String,

    /// Buffered duplex stream; reads go through the buffer, writes pass through
    stream: BufReader<S>,

    config: SessionConfig,

    /// Reads and writes fail once this passes
    deadline: Instant,

    delivery: DeliveryQueue,

    stats: Arc<ConnectionStats>,

    /// HELO identity, kept across transactions
    identity: Option<String>,

    sender: Option<String>,
    recipient: Option<String>,
    body: BytesMut,
    phase: Phase,

    /// Set once the stream has been shut down
    closed: bool,
}

impl<S> Session<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    pub(crate) fn new(
        id: u64,
        connection: Connection<S>,
        config: SessionConfig,
        delivery: DeliveryQueue,
        stats: Arc<ConnectionStats>,
    ) -> Self {
        let Connection {
            stream,
            local,
            peer,
        } = connection;
        let deadline = Instant::now() + config.reply_timeout;

        Self {
            id,
            local,
            peer,
            stream: BufReader::new(stream),
            config,
            deadline,
            delivery,
            stats,
            identity: None,
            sender: None,
            recipient: None,
            body: BytesMut::new(),
            phase: Phase::Start,
            closed: false,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn local(&self) -> &str {
        &self.local
    }

    pub fn peer(&self) -> &str {
        &self.peer
    }

    pub fn identity(&self) -> Option<&str> {
        self.identity.as_deref()
    }

    pub fn sender(&self) -> Option<&str> {
        self.sender.as_deref()
    }

    pub fn recipient(&self) -> Option<&str> {
        self.recipient.as_deref()
    }

    /// The body captured so far in the current transaction.
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Writes a reply with the given code and text lines.
    ///
    /// The inactivity deadline is re-armed before transmitting.
    pub async fn write(&mut self, code: u16, lines: &[&str]) -> Result<(), ConnectionError> {
        self.send(&Reply::multiline(code, lines.iter().copied())).await
    }

    /// Writes a prepared reply.
    pub async fn send(&mut self, reply: &Reply) -> Result<(), ConnectionError> {
        self.refresh_deadline();

        let bytes = reply.serialize();
        let len = bytes.len();
        let timeout = self.config.reply_timeout;
        let stream = &mut self.stream;

        timeout_at(self.deadline, async move {
            stream.write_all(&bytes).await?;
            stream.flush().await?;
            Ok::<_, std::io::Error>(())
        })
        .await
        .map_err(|_| ConnectionError::Timeout(timeout))??;

        self.stats.bytes_written(len);
        trace!(client = %self.peer, code = reply.code, bytes = len, "Sent reply");
        Ok(())
    }

    /// Reads one raw line, terminator included, into `buf`.
    ///
    /// Returns the number of bytes read; `0` means end of stream. At most
    /// `MAX_LINE_LENGTH` bytes are buffered; a longer line is an error.
    pub(crate) async fn read_line(&mut self, buf: &mut Vec<u8>) -> Result<usize, ConnectionError> {
        let timeout = self.config.reply_timeout;
        let mut limited = (&mut self.stream).take(MAX_LINE_LENGTH as u64);
        let n = timeout_at(self.deadline, limited.read_until(b'\n', buf))
            .await
            .map_err(|_| ConnectionError::Timeout(timeout))??;

        self.stats.bytes_read(n);
        if n == MAX_LINE_LENGTH && buf.last() != Some(&b'\n') {
            warn!(client = %self.peer, session = self.id, "Line length limit exceeded");
            return Err(ConnectionError::LineTooLong(MAX_LINE_LENGTH));
        }
        Ok(n)
    }

    /// Sends the configured `220` greeting, if any.
    pub(crate) async fn greet(&mut self) -> Result<(), ConnectionError> {
        match self.config.banner.clone() {
            Some(banner) => self.send(&Reply::new(codes::SERVICE_READY, banner)).await,
            None => Ok(()),
        }
    }

    pub async fn handle_helo(&mut self, payload: &str) -> Result<(), ConnectionError> {
        let reply = self.helo(payload).unwrap_or_else(Reply::from);
        self.send(&reply).await
    }

    pub async fn handle_mail_from(&mut self, payload: &str) -> Result<(), ConnectionError> {
        let reply = self.mail_from(payload).unwrap_or_else(Reply::from);
        self.send(&reply).await
    }

    pub async fn handle_rcpt_to(&mut self, payload: &str) -> Result<(), ConnectionError> {
        let reply = self.rcpt_to(payload).unwrap_or_else(Reply::from);
        self.send(&reply).await
    }

    /// Handles DATA, including the body-capture sub-protocol.
    ///
    /// A capture failure (read error, end of stream, size limit) is answered
    /// with `554` and then returned.
    pub async fn handle_data(&mut self, payload: &str) -> Result<(), ConnectionError> {
        if let Err(err) = self.check_data(payload) {
            return self.send(&err.into()).await;
        }

        self.write(codes::START_MAIL_INPUT, &["Enter data with a terminating ."])
            .await?;
        self.phase = Phase::InData;

        let captured = self.capture_body().await;
        let reply = match &captured {
            Ok(()) => match self.hand_off() {
                Ok(()) => Reply::ok("Ok: queued"),
                Err(err) => err.into(),
            },
            Err(e) => {
                warn!(client = %self.peer, session = self.id, error = %e, "Body capture failed");
                ProtocolError::TransactionFailed.into()
            }
        };
        self.reset_transaction();

        let sent = self.send(&reply).await;
        captured?;
        sent
    }

    pub async fn handle_quit(&mut self) -> Result<(), ConnectionError> {
        debug!(client = %self.peer, session = self.id, "Client sent QUIT");
        self.write(codes::CLOSING, &["Goodnight and good luck"]).await
    }

    /// Replies `503` for a line that is not a supported command.
    pub async fn invalid_command(&mut self, line: &str) -> Result<(), ConnectionError> {
        let err = ProtocolError::unrecognized(line);
        debug!(client = %self.peer, error = %err, "Unrecognized command");
        self.send(&err.into()).await
    }

    fn helo(&mut self, payload: &str) -> Result<Reply, ProtocolError> {
        let identity = payload
            .split_whitespace()
            .next()
            .map(strip_decorations)
            .filter(|identity| !identity.is_empty())
            .ok_or(ProtocolError::Syntax(HELO_REQUIRED))?;

        self.identity = Some(identity.to_string());
        if self.phase == Phase::Start {
            self.phase = Phase::Greeted;
        }
        debug!(client = %self.peer, identity = %identity, "HELO accepted");
        Ok(Reply::ok(format!("Hello {}", identity)))
    }

    fn mail_from(&mut self, payload: &str) -> Result<Reply, ProtocolError> {
        if self.identity.is_none() {
            return Err(ProtocolError::Sequence(HELO_FIRST));
        }
        let token = payload
            .split_whitespace()
            .next()
            .ok_or(ProtocolError::Syntax(MAIL_FROM_REQUIRED))?;
        let sender = parse_mailbox(token).ok_or(ProtocolError::Syntax(INVALID_ADDRESS))?;

        let reply = Reply::ok(format!("Accepting mail from {}", sender));
        self.sender = Some(sender);
        self.recipient = None;
        self.phase = Phase::SenderSet;
        Ok(reply)
    }

    fn rcpt_to(&mut self, payload: &str) -> Result<Reply, ProtocolError> {
        if self.sender.is_none() {
            return Err(ProtocolError::Sequence(MAIL_FROM_FIRST));
        }
        let token = payload
            .split_whitespace()
            .next()
            .ok_or(ProtocolError::Syntax(RCPT_TO_REQUIRED))?;
        let recipient = parse_mailbox(token).ok_or(ProtocolError::Syntax(INVALID_ADDRESS))?;

        let reply = Reply::ok(format!("Will deliver mail to {}", recipient));
        self.recipient = Some(recipient);
        self.phase = Phase::RecipientSet;
        Ok(reply)
    }

    fn check_data(&self, payload: &str) -> Result<(), ProtocolError> {
        if payload.split_whitespace().next().is_some() {
            return Err(ProtocolError::Syntax(DATA_NO_ARGS));
        }
        if self.sender.is_none() || self.recipient.is_none() {
            return Err(ProtocolError::Sequence(RCPT_TO_FIRST));
        }
        Ok(())
    }

    async fn capture_body(&mut self) -> Result<(), ConnectionError> {
        let mut line = Vec::new();
        loop {
            line.clear();
            if self.read_line(&mut line).await? == 0 {
                return Err(ConnectionError::UnexpectedEof);
            }

            if strip_line_ending(&line) == b"." {
                trace!(client = %self.peer, bytes = self.body.len(), "Body terminator received");
                return Ok(());
            }

            let content = if line.starts_with(b"..") {
                &line[1..]
            } else {
                &line[..]
            };
            let limit = self.config.max_message_size;
            if self.body.len() + content.len() > limit {
                return Err(ConnectionError::MessageTooLarge(limit));
            }
            self.body.extend_from_slice(content);
        }
    }

    /// Passes the completed transaction to the delivery queue.
    fn hand_off(&mut self) -> Result<(), ProtocolError> {
        let (Some(sender), Some(recipient)) = (self.sender.take(), self.recipient.take()) else {
            return Err(ProtocolError::TransactionFailed);
        };
        let envelope = Envelope {
            session: self.id,
            identity: self.identity.clone().unwrap_or_default(),
            sender,
            recipient,
            body: self.body.split().freeze(),
        };
        let bytes = envelope.body.len();

        self.delivery.submit(envelope).map_err(|e| {
            warn!(client = %self.peer, session = self.id, error = %e, "Delivery hand-off failed");
            ProtocolError::TransactionFailed
        })?;

        self.stats.message_queued();
        info!(client = %self.peer, session = self.id, bytes = bytes, "Message queued");
        Ok(())
    }

    /// Clears sender, recipient and body; the HELO identity is kept.
    fn reset_transaction(&mut self) {
        self.sender = None;
        self.recipient = None;
        self.body.clear();
        self.phase = if self.identity.is_some() {
            Phase::Greeted
        } else {
            Phase::Start
        };
    }

    fn refresh_deadline(&mut self) {
        self.deadline = Instant::now() + self.config.reply_timeout;
    }

    /// Shuts the stream down. Safe to call more than once.
    pub(crate) async fn shutdown(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Err(e) = self.stream.get_mut().shutdown().await {
            trace!(client = %self.peer, error = %e, "Shutdown failed");
        }
    }
}

impl<S> std::fmt::Debug for Session<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("peer", &self.peer)
            .field("phase", &self.phase)
            .field("identity", &self.identity)
            .field("sender", &self.sender)
            .field("recipient", &self.recipient)
            .field("body_len", &self.body.len())
            .finish()
    }
}

/// Removes a trailing `\n` or `\r\n`.
fn strip_line_ending(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}
