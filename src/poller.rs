//! The polling cycle.
//!
//! One call to [`MailPoller::pull`] runs one cycle:
//!
//! 1. open a session (connect, log in, select the mailbox),
//! 2. fetch every message, flag each one deleted right after fetching it, and parse it,
//! 3. expunge, close and log out,
//! 4. write each accepted attachment into the drop directory,
//! 5. advance [`MailPoller::last_checked_at`].
//!
//! Rejected messages are deleted too, so a message that can never be ingested is not
//! fetched again. Deletion only becomes permanent at the expunge, after every message
//! has been fetched; if the cycle fails before that point the mailbox keeps its
//! messages and the next cycle sees them again. If the expunge itself fails, accepted
//! attachments are still written before the error is returned.
//!
//! # Example
//!
//! ```no_run
//! use mail_drop::{MailPoller, MailboxConfig};
//!
//! # async fn example() -> mail_drop::Result<()> {
//! let config = MailboxConfig::builder()
//!     .host("imap.example.com")
//!     .username("scanner@example.com")
//!     .password("app-password")
//!     .build()?;
//!
//! let poller = MailPoller::new(config, "/srv/consume");
//! let report = poller.pull().await?;
//! println!("stored {} file(s)", report.stored.len());
//! # Ok(())
//! # }
//! ```

use crate::clock::{Clock, SystemClock};
use crate::config::MailboxConfig;
use crate::error::{Error, Rejection, Result};
use crate::mailbox::{ImapConnector, MailboxConnector, MailboxSession};
use crate::parser::{MessageParser, ParsedMessage};
use crate::storage::DropDirectory;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, error, info, instrument, warn, Span};

/// Outcome of one polling cycle.
#[derive(Debug, Default)]
pub struct PollReport {
    /// `true` if the configuration is disabled and no session was opened.
    pub skipped: bool,
    /// Files written to the drop directory, in mailbox order.
    pub stored: Vec<PathBuf>,
    /// Number of messages discarded by the parser.
    pub rejected: usize,
    /// Attachments that could not be written. Their messages are already deleted.
    pub failures: Vec<Error>,
}

/// Messages drained from the mailbox in one session.
#[derive(Debug, Default)]
struct Drained {
    accepted: Vec<ParsedMessage>,
    rejected: usize,
}

/// Moves single-attachment messages from a mailbox into a drop directory.
///
/// Cycles on one poller never overlap: concurrent [`pull`](Self::pull) calls wait for
/// each other.
pub struct MailPoller<C = ImapConnector> {
    config: MailboxConfig,
    drop_dir: DropDirectory,
    connector: C,
    parser: MessageParser,
    clock: Arc<dyn Clock>,
    cycle: tokio::sync::Mutex<()>,
    last_checked_at: Mutex<DateTime<Utc>>,
}

impl MailPoller<ImapConnector> {
    /// Creates a poller that talks IMAP over TLS.
    pub fn new(config: MailboxConfig, drop_dir: impl AsRef<Path>) -> Self {
        Self::with_connector(config, drop_dir, ImapConnector)
    }
}

impl<C: MailboxConnector> MailPoller<C> {
    /// Creates a poller on top of any mailbox backend.
    pub fn with_connector(config: MailboxConfig, drop_dir: impl AsRef<Path>, connector: C) -> Self {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        Self {
            config,
            drop_dir: DropDirectory::new(drop_dir),
            connector,
            parser: MessageParser::new(),
            last_checked_at: Mutex::new(clock.now()),
            clock,
            cycle: tokio::sync::Mutex::new(()),
        }
    }

    /// Replaces the message parser.
    #[must_use]
    pub fn with_parser(mut self, parser: MessageParser) -> Self {
        self.parser = parser;
        self
    }

    /// Replaces the clock used for [`last_checked_at`](Self::last_checked_at).
    #[must_use]
    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        let clock: Arc<dyn Clock> = Arc::new(clock);
        *self
            .last_checked_at
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner) = clock.now();
        self.clock = clock;
        self
    }

    /// Returns the mailbox configuration.
    #[must_use]
    pub fn config(&self) -> &MailboxConfig {
        &self.config
    }

    /// Returns the drop directory.
    #[must_use]
    pub fn drop_dir(&self) -> &Path {
        self.drop_dir.path()
    }

    /// Returns when the last cycle ended, or when the poller was created if no cycle
    /// has run yet.
    #[must_use]
    pub fn last_checked_at(&self) -> DateTime<Utc> {
        *self
            .last_checked_at
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Runs one polling cycle.
    ///
    /// With a disabled configuration nothing is contacted and only
    /// [`last_checked_at`](Self::last_checked_at) advances. It advances after every
    /// cycle, failed ones included.
    ///
    /// # Errors
    ///
    /// Returns session-level errors: connection failures, [`Error::AuthFailed`],
    /// [`Error::MailboxNotFound`], and protocol failures up to and including the
    /// expunge. Rejected messages and failed file writes are not errors; they are
    /// counted in the returned [`PollReport`]. On an expunge failure the accepted
    /// attachments have already been written when the error is returned.
    #[instrument(
        name = "MailPoller::pull",
        skip(self),
        fields(
            imap_host = %self.config.host(),
            mailbox = %self.config.mailbox(),
            drop_dir = %self.drop_dir.path().display()
        )
    )]
    pub async fn pull(&self) -> Result<PollReport> {
        let _cycle = self.cycle.lock().await;

        let outcome = if self.config.is_enabled() {
            self.run_cycle().await
        } else {
            debug!("Mail polling disabled, skipping cycle");
            Ok(PollReport {
                skipped: true,
                ..PollReport::default()
            })
        };

        if let Err(e) = &outcome {
            error!(error = %e, code = e.code(), "Polling cycle failed");
        }

        *self
            .last_checked_at
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = self.clock.now();

        outcome
    }

    async fn run_cycle(&self) -> Result<PollReport> {
        let mut session = self.connector.open(&self.config).await?;

        let drained = match self.drain(&mut session).await {
            Ok(drained) => drained,
            Err(e) => {
                abandon(&mut session).await;
                return Err(e);
            }
        };

        let expunged = session.expunge().await;
        if expunged.is_ok() {
            if let Err(e) = session.close().await {
                warn!(error = %e, "Failed to close mailbox");
            }
            if let Err(e) = session.logout().await {
                warn!(error = %e, "Failed to log out");
            }
        } else {
            abandon(&mut session).await;
        }

        // A failed or timed-out expunge may still have been applied by the server, so
        // accepted attachments are written either way. Rewriting them next cycle only
        // replaces files of the same name.
        let mut report = PollReport {
            rejected: drained.rejected,
            ..PollReport::default()
        };
        self.persist(drained.accepted, &mut report).await?;
        expunged?;

        info!(
            stored = report.stored.len(),
            rejected = report.rejected,
            failed = report.failures.len(),
            "Polling cycle complete"
        );

        Ok(report)
    }

    /// Fetches, flags and parses every message.
    async fn drain(&self, session: &mut C::Session) -> Result<Drained> {
        let ids = session.search_all().await?;
        let mut drained = Drained::default();

        debug!(message_count = ids.len(), "Draining mailbox");

        for seq in ids {
            let raw = session.fetch(seq).await?;
            session.flag_deleted(seq).await?;

            let parsed = match raw {
                Some(raw) => self.parser.parse(&raw),
                None => Err(Rejection::Malformed {
                    reason: "server returned no message body".into(),
                }),
            };

            match parsed {
                Ok(message) => {
                    info!(seq, subject = %message.subject(), "Fetched message");
                    drained.accepted.push(message);
                }
                Err(rejection) => {
                    warn!(
                        seq,
                        reason = rejection.code(),
                        detail = %rejection,
                        "Discarding message"
                    );
                    drained.rejected += 1;
                }
            }
        }

        Ok(drained)
    }

    /// Writes accepted attachments on the blocking pool, in mailbox order.
    async fn persist(&self, messages: Vec<ParsedMessage>, report: &mut PollReport) -> Result<()> {
        if messages.is_empty() {
            return Ok(());
        }

        let drop_dir = self.drop_dir.clone();
        let span = Span::current();
        let outcomes = tokio::task::spawn_blocking(move || {
            let _entered = span.enter();
            messages
                .into_iter()
                .map(|message| {
                    let outcome = drop_dir.store(&message);
                    (message, outcome)
                })
                .collect::<Vec<_>>()
        })
        .await
        .map_err(|source| Error::PersistTask { source })?;

        for (message, outcome) in outcomes {
            match outcome {
                Ok(path) => {
                    info!(subject = %message.subject(), path = %path.display(), "Stored message");
                    report.stored.push(path);
                }
                Err(e) => {
                    error!(subject = %message.subject(), error = %e, "Failed to store attachment");
                    report.failures.push(e);
                }
            }
        }

        Ok(())
    }
}

/// Ends a session without `CLOSE`, which would expunge the messages flagged so far.
async fn abandon<S: MailboxSession>(session: &mut S) {
    if let Err(e) = session.logout().await {
        debug!(error = %e, "Logout after failed cycle also failed");
    }
}

impl<C> std::fmt::Debug for MailPoller<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MailPoller")
            .field("config", &self.config)
            .field("drop_dir", &self.drop_dir)
            .finish_non_exhaustive()
    }
}
