//! Mailbox access.
//!
//! A polling cycle needs a small operation set from the remote mailbox: open an
//! authenticated session on one mailbox, search everything, fetch a message, flag it
//! deleted, expunge, close and log out. [`MailboxConnector`] and [`MailboxSession`]
//! describe that set; [`ImapConnector`] implements it with IMAP over TLS.

use crate::config::{MailboxConfig, TimeoutConfig};
use crate::connection;
use crate::error::{Error, Result};
use crate::session::{self, AuthConfig, ImapSession};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, instrument};

/// Opens authenticated sessions on a configured mailbox.
pub trait MailboxConnector: Send + Sync {
    /// Session type produced by [`open`](Self::open).
    type Session: MailboxSession;

    /// Connects, authenticates and selects the configured mailbox.
    ///
    /// # Errors
    ///
    /// Connection failures, [`Error::AuthFailed`] and [`Error::MailboxNotFound`].
    fn open(&self, config: &MailboxConfig) -> impl Future<Output = Result<Self::Session>> + Send;
}

/// A live session on a selected mailbox.
///
/// Message ids are only meaningful within the session that produced them.
pub trait MailboxSession: Send {
    /// Returns the ids of every message in the mailbox, in mailbox order.
    fn search_all(&mut self) -> impl Future<Output = Result<Vec<u32>>> + Send;

    /// Fetches the full raw message, or `None` if the server returned no content.
    fn fetch(&mut self, id: u32) -> impl Future<Output = Result<Option<Vec<u8>>>> + Send;

    /// Marks a message for deletion. Reversible until [`expunge`](Self::expunge).
    fn flag_deleted(&mut self, id: u32) -> impl Future<Output = Result<()>> + Send;

    /// Permanently removes all messages marked for deletion.
    fn expunge(&mut self) -> impl Future<Output = Result<()>> + Send;

    /// Closes the selected mailbox.
    fn close(&mut self) -> impl Future<Output = Result<()>> + Send;

    /// Ends the session.
    fn logout(&mut self) -> impl Future<Output = Result<()>> + Send;
}

/// Connects to a real IMAP server over TLS.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImapConnector;

impl MailboxConnector for ImapConnector {
    type Session = ImapMailbox;

    #[instrument(
        name = "ImapConnector::open",
        skip_all,
        fields(
            imap_host = %config.host(),
            username = %config.username(),
            mailbox = %config.mailbox()
        )
    )]
    async fn open(&self, config: &MailboxConfig) -> Result<ImapMailbox> {
        let target_addr = config.server_address();
        let timeouts = &config.timeouts;

        let tls_stream = tokio::time::timeout(
            timeouts.connect,
            connection::establish_tls_connection(config.host(), &target_addr),
        )
        .await
        .map_err(|_| Error::ConnectTimeout {
            target: target_addr.clone(),
            timeout: timeouts.connect,
        })??;

        debug!("TLS connection established");

        let auth_config = AuthConfig {
            username: config.username(),
            password: config.password(),
        };

        let mut session = tokio::time::timeout(
            timeouts.auth,
            session::authenticate(tls_stream, &auth_config),
        )
        .await
        .map_err(|_| Error::StepTimeout {
            step: "login",
            timeout: timeouts.auth,
        })??;

        debug!("Authenticated");

        let selected = tokio::time::timeout(
            timeouts.select,
            session::select_mailbox(&mut session, config.mailbox()),
        )
        .await
        .map_err(|_| Error::StepTimeout {
            step: "select",
            timeout: timeouts.select,
        })
        .and_then(|result| result);

        if let Err(e) = selected {
            best_effort("logout", timeouts.logout, session::logout(&mut session)).await;
            return Err(e);
        }

        Ok(ImapMailbox {
            session: Box::new(session),
            timeouts: timeouts.clone(),
        })
    }
}

/// An IMAP session with the configured mailbox selected.
pub struct ImapMailbox {
    session: Box<ImapSession>,
    timeouts: TimeoutConfig,
}

impl ImapMailbox {
    async fn bounded<T>(
        step: &'static str,
        limit: Duration,
        op: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        tokio::time::timeout(limit, op)
            .await
            .map_err(|_| Error::StepTimeout {
                step,
                timeout: limit,
            })?
    }
}

/// Runs a teardown step whose failure must not replace an earlier error. The failure
/// is logged and handed back.
async fn best_effort(
    step: &'static str,
    limit: Duration,
    op: impl Future<Output = Result<()>>,
) -> Option<Error> {
    let err = ImapMailbox::bounded(step, limit, op).await.err()?;
    debug!(step, error = %err, "Best-effort step failed");
    Some(err)
}

impl MailboxSession for ImapMailbox {
    async fn search_all(&mut self) -> Result<Vec<u32>> {
        Self::bounded(
            "search",
            self.timeouts.command,
            session::search_all(&mut self.session),
        )
        .await
    }

    async fn fetch(&mut self, id: u32) -> Result<Option<Vec<u8>>> {
        Self::bounded(
            "fetch",
            self.timeouts.command,
            session::fetch_message(&mut self.session, id),
        )
        .await
    }

    async fn flag_deleted(&mut self, id: u32) -> Result<()> {
        Self::bounded(
            "store",
            self.timeouts.command,
            session::flag_deleted(&mut self.session, id),
        )
        .await
    }

    async fn expunge(&mut self) -> Result<()> {
        Self::bounded(
            "expunge",
            self.timeouts.command,
            session::expunge(&mut self.session),
        )
        .await
    }

    async fn close(&mut self) -> Result<()> {
        Self::bounded(
            "close",
            self.timeouts.logout,
            session::close(&mut self.session),
        )
        .await
    }

    async fn logout(&mut self) -> Result<()> {
        Self::bounded(
            "logout",
            self.timeouts.logout,
            session::logout(&mut self.session),
        )
        .await
    }
}

impl std::fmt::Debug for ImapMailbox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImapMailbox")
            .field("timeouts", &self.timeouts)
            .finish_non_exhaustive()
    }
}
