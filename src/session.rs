//! Internal IMAP session management.
//!
//! This module wraps async-imap operations with proper error handling. Message
//! addressing uses sequence numbers, which stay stable for the whole cycle because
//! nothing is expunged until the end.

use crate::connection::TlsStream;
use crate::error::{Error, Result};
use async_imap::Session;
use futures::TryStreamExt;
use tracing::{debug, instrument};

/// Type alias for IMAP session over TLS.
pub(crate) type ImapSession = Session<TlsStream>;

/// Authentication configuration for IMAP.
pub(crate) struct AuthConfig<'a> {
    pub username: &'a str,
    pub password: &'a str,
}

/// Authenticates to IMAP server and returns a session.
#[instrument(
    name = "session::authenticate",
    skip_all,
    fields(username = %config.username)
)]
pub(crate) async fn authenticate(
    tls_stream: TlsStream,
    config: &AuthConfig<'_>,
) -> Result<ImapSession> {
    let client = async_imap::Client::new(tls_stream);

    debug!("Authenticating to IMAP server");

    client
        .login(config.username, config.password)
        .await
        .map_err(|e| Error::AuthFailed {
            username: config.username.to_string(),
            source: e.0,
        })
}

/// Selects the mailbox to poll.
#[instrument(name = "session::select", skip(session), fields(mailbox = %mailbox))]
pub(crate) async fn select_mailbox(session: &mut ImapSession, mailbox: &str) -> Result<()> {
    debug!("Selecting mailbox");

    let selected = session
        .select(mailbox)
        .await
        .map_err(|source| Error::MailboxNotFound {
            mailbox: mailbox.to_string(),
            source,
        })?;

    debug!(exists = selected.exists, "Mailbox selected");

    Ok(())
}

/// Searches for every message in the selected mailbox.
///
/// The server returns an unordered set; sequence numbers are sorted so messages are
/// processed in mailbox order.
#[instrument(name = "session::search_all", skip(session))]
pub(crate) async fn search_all(session: &mut ImapSession) -> Result<Vec<u32>> {
    let found = session
        .search("ALL")
        .await
        .map_err(|source| Error::Search { source })?;

    let mut seqs: Vec<u32> = found.into_iter().collect();
    seqs.sort_unstable();

    debug!(message_count = seqs.len(), "Found messages");

    Ok(seqs)
}

/// Fetches the full RFC 822 content of one message.
///
/// Returns `None` if the server answered without a body.
#[instrument(name = "session::fetch", skip(session))]
pub(crate) async fn fetch_message(session: &mut ImapSession, seq: u32) -> Result<Option<Vec<u8>>> {
    let fetches: Vec<async_imap::types::Fetch> = session
        .fetch(seq.to_string(), "BODY[]")
        .await
        .map_err(|source| Error::Fetch { seq, source })?
        .try_collect()
        .await
        .map_err(|source| Error::Fetch { seq, source })?;

    let body = fetches
        .iter()
        .find_map(|fetch| fetch.body().map(<[u8]>::to_vec));

    debug!(
        found = body.is_some(),
        size = body.as_ref().map_or(0, Vec::len),
        "Fetched message"
    );

    Ok(body)
}

/// Sets the `\Deleted` flag on one message.
#[instrument(name = "session::flag_deleted", skip(session))]
pub(crate) async fn flag_deleted(session: &mut ImapSession, seq: u32) -> Result<()> {
    let _updates: Vec<async_imap::types::Fetch> = session
        .store(seq.to_string(), "+FLAGS (\\Deleted)")
        .await
        .map_err(|source| Error::FlagDeleted { seq, source })?
        .try_collect()
        .await
        .map_err(|source| Error::FlagDeleted { seq, source })?;

    Ok(())
}

/// Permanently removes every message flagged `\Deleted`.
#[instrument(name = "session::expunge", skip(session))]
pub(crate) async fn expunge(session: &mut ImapSession) -> Result<()> {
    let removed: Vec<u32> = session
        .expunge()
        .await
        .map_err(|source| Error::Expunge { source })?
        .try_collect()
        .await
        .map_err(|source| Error::Expunge { source })?;

    debug!(removed = removed.len(), "Expunged messages");

    Ok(())
}

/// Closes the selected mailbox.
#[instrument(name = "session::close", skip(session))]
pub(crate) async fn close(session: &mut ImapSession) -> Result<()> {
    session
        .close()
        .await
        .map_err(|source| Error::Close { source })
}

/// Logs out from IMAP session.
#[instrument(name = "session::logout", skip(session))]
pub(crate) async fn logout(session: &mut ImapSession) -> Result<()> {
    debug!("Logging out");

    session
        .logout()
        .await
        .map_err(|source| Error::Logout { source })
}
