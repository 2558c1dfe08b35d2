//! Session Manager
//!
//! The manager creates and destroys sessions, owns the session registry and
//! runs the per-connection dispatch loop.
//!
//! ## Registry
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     SessionManager                          │
//! │  ┌─────────┐ ┌─────────┐ ┌─────────┐ ┌─────────┐           │
//! │  │ Shard 0 │ │ Shard 1 │ │ Shard 2 │ │ Shard N │           │
//! │  │ RwLock  │ │ RwLock  │ │ RwLock  │ │ RwLock  │           │
//! │  │ HashMap │ │ HashMap │ │ HashMap │ │ HashMap │           │
//! │  └─────────┘ └─────────┘ └─────────┘ └─────────┘           │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every worker inserts on create and removes on close, so all registry
//! access goes through the shard locks. Session identities are 64-bit hashes
//! of the local and peer endpoint strings. The hash seed belongs to the
//! manager, so two managers (e.g. in tests) never share identities.

use crate::connection::{Connection, ConnectionError, ConnectionStats};
use crate::delivery::DeliveryQueue;
use crate::protocol::{CommandKind, CommandParser};
use crate::session::{Session, SessionConfig};
use std::collections::hash_map::{Entry, RandomState};
use std::collections::HashMap;
use std::hash::BuildHasher;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Instant;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, trace};

/// Number of registry shards.
const NUM_SHARDS: usize = 16;

/// What the registry knows about a live session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    pub id: u64,
    pub local: String,
    pub peer: String,
    pub opened_at: Instant,
}

#[derive(Debug, Default)]
struct Shard {
    sessions: RwLock<HashMap<u64, SessionInfo>>,
}

/// Creates, runs and closes sessions.
///
/// The registry only holds `SessionInfo` metadata; each `Session` is owned by
/// the worker task that runs it.
///
/// Meant to be wrapped in an `Arc` and shared by the accept loop and every
/// connection task.
pub struct SessionManager {
    /// Sharded registry of live sessions
    shards: Vec<Shard>,

    /// Seed for session identities, fixed for the manager's lifetime
    hasher: RandomState,

    parser: CommandParser,
    config: SessionConfig,
    delivery: DeliveryQueue,
    stats: Arc<ConnectionStats>,
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("shards", &self.shards.len())
            .field("sessions", &self.len())
            .field("config", &self.config)
            .finish()
    }
}

impl SessionManager {
    /// Creates a manager with an empty registry and a fresh identity seed.
    pub fn new(config: SessionConfig, delivery: DeliveryQueue) -> Self {
        Self {
            shards: (0..NUM_SHARDS).map(|_| Shard::default()).collect(),
            hasher: RandomState::new(),
            parser: CommandParser::new(),
            config,
            delivery,
            stats: Arc::new(ConnectionStats::new()),
        }
    }

    pub fn stats(&self) -> &Arc<ConnectionStats> {
        &self.stats
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Computes the identity for a pair of endpoint strings.
    pub fn session_id(&self, local: &str, peer: &str) -> u64 {
        self.hasher.hash_one((local, peer))
    }

    #[inline]
    fn shard(&self, id: u64) -> &Shard {
        &self.shards[(id as usize) % NUM_SHARDS]
    }

    /// Registers a new session for `connection`.
    ///
    /// Fails with `DuplicateSession` if a live session already has the same identity.
    pub fn create_session<S>(
        &self,
        connection: Connection<S>,
    ) -> Result<Session<S>, ConnectionError>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send,
    {
        let id = self.session_id(&connection.local, &connection.peer);

        {
            let mut sessions = self
                .shard(id)
                .sessions
                .write()
                .unwrap_or_else(PoisonError::into_inner);

            match sessions.entry(id) {
                Entry::Occupied(_) => return Err(ConnectionError::DuplicateSession(id)),
                Entry::Vacant(slot) => {
                    slot.insert(SessionInfo {
                        id,
                        local: connection.local.clone(),
                        peer: connection.peer.clone(),
                        opened_at: Instant::now(),
                    });
                }
            }
        }

        self.stats.session_opened();
        debug!(client = %connection.peer, session = id, "Session created");

        Ok(Session::new(
            id,
            connection,
            self.config.clone(),
            self.delivery.clone(),
            Arc::clone(&self.stats),
        ))
    }

    /// Removes a registry entry. Returns `false` if it was already gone.
    pub fn unregister(&self, id: u64) -> bool {
        let removed = self
            .shard(id)
            .sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id)
            .is_some();

        if removed {
            self.stats.session_closed();
        }
        removed
    }

    /// Removes the session from the registry and shuts its stream down.
    ///
    /// Safe to call more than once.
    pub async fn close_session<S>(&self, session: &mut Session<S>)
    where
        S: AsyncRead + AsyncWrite + Unpin + Send,
    {
        if self.unregister(session.id()) {
            debug!(client = %session.peer(), session = session.id(), "Session closed");
        }
        session.shutdown().await;
    }

    /// Runs the dispatch loop until QUIT, end of stream, or a transport error.
    pub async fn handle_session<S>(&self, session: &mut Session<S>) -> Result<(), ConnectionError>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send,
    {
        session.greet().await?;

        let mut raw = Vec::new();
        loop {
            raw.clear();
            if session.read_line(&mut raw).await? == 0 {
                return Ok(());
            }

            let line = String::from_utf8_lossy(&raw);
            let Some(command) = self.parser.parse(&line) else {
                continue;
            };
            self.stats.command_processed();
            trace!(
                client = %session.peer(),
                command = %command,
                phase = %session.phase(),
                "Dispatching command"
            );

            match command.kind {
                CommandKind::Helo => session.handle_helo(&command.payload).await?,
                CommandKind::MailFrom => session.handle_mail_from(&command.payload).await?,
                CommandKind::RcptTo => session.handle_rcpt_to(&command.payload).await?,
                CommandKind::Data => session.handle_data(&command.payload).await?,
                CommandKind::Quit => {
                    session.handle_quit().await?;
                    return Ok(());
                }
                CommandKind::Unrecognized => session.invalid_command(&line).await?,
            }
        }
    }

    /// Creates, runs and closes a session for one connection.
    pub async fn run<S>(&self, connection: Connection<S>) -> Result<(), ConnectionError>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send,
    {
        let mut session = self.create_session(connection)?;
        let result = self.handle_session(&mut session).await;
        self.close_session(&mut session).await;
        result
    }

    /// Number of live sessions.
    pub fn len(&self) -> usize {
        self.shards
            .iter()
            .map(|shard| {
                shard
                    .sessions
                    .read()
                    .unwrap_or_else(PoisonError::into_inner)
                    .len()
            })
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, id: u64) -> bool {
        self.shard(id)
            .sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&id)
    }

    /// Snapshot of the registry, oldest session first.
    pub fn sessions(&self) -> Vec<SessionInfo> {
        let mut all: Vec<SessionInfo> = self
            .shards
            .iter()
            .flat_map(|shard| {
                shard
                    .sessions
                    .read()
                    .unwrap_or_else(PoisonError::into_inner)
                    .values()
                    .cloned()
                    .collect::<Vec<_>>()
            })
            .collect();
        all.sort_by_key(|info| info.opened_at);
        all
    }
}
