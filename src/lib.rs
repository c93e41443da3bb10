//! # mail-drop
//!
//! Polls an IMAP mailbox and turns each message carrying a single document
//! attachment into a file in a local drop directory, where a document indexer picks
//! it up.
//!
//! Every polling cycle:
//! - Connects over TLS, logs in and selects the configured mailbox
//! - Fetches every message, validates it and extracts its attachment
//! - Deletes every fetched message, valid or not, with one expunge per cycle
//! - Writes each attachment as `{subject}.{suffix}`, stamped with the message's `Date`
//!
//! ## Quick Start
//!
//! ```no_run
//! use mail_drop::{MailPoller, MailboxConfig};
//!
//! # async fn example() -> mail_drop::Result<()> {
//! let config = MailboxConfig::builder()
//!     .host("imap.example.com")
//!     .username("scanner@example.com")
//!     .password("app-password")
//!     .mailbox("INBOX")
//!     .build()?;
//!
//! let poller = MailPoller::new(config, "/srv/consume");
//!
//! // Scheduling is up to the caller.
//! let report = poller.pull().await?;
//! println!("stored {} file(s), rejected {}", report.stored.len(), report.rejected);
//! # Ok(())
//! # }
//! ```
//!
//! ## What gets ingested
//!
//! A message is accepted when its subject only contains word characters, spaces,
//! hyphens, commas, periods and apostrophes, and exactly one part is marked
//! `Content-Disposition: attachment` with one of these types:
//!
//! | Content type      | Suffix |
//! |-------------------|--------|
//! | `application/pdf` | `pdf`  |
//! | `image/png`       | `png`  |
//! | `image/jpeg`      | `jpeg` |
//! | `image/gif`       | `gif`  |
//! | `image/tiff`      | `tiff` |
//!
//! Anything else is a [`Rejection`]: logged, deleted, never retried.
//!
//! ```
//! use mail_drop::{MessageParser, Rejection};
//!
//! let raw = b"From: someone@example.com\r\n\r\nno subject here";
//! assert_eq!(MessageParser::new().parse(raw), Err(Rejection::NoSubject));
//! ```
//!
//! ## Error Handling
//!
//! [`MailPoller::pull`] returns an [`Error`] only for failures that abort the cycle
//! (connection, login, mailbox selection, protocol errors up to the expunge). Before
//! the expunge nothing has been deleted. A failed expunge may or may not have been
//! applied, so the accepted attachments are written before it is reported. Use
//! [`Error::code`] for a stable classification:
//!
//! ```
//! use mail_drop::Error;
//!
//! fn handle_error(error: &Error) {
//!     match error.code() {
//!         "auth_failed" => eprintln!("check the mailbox credentials"),
//!         _ if error.is_retryable() => eprintln!("will try again next cycle: {error}"),
//!         _ => eprintln!("permanent error: {error}"),
//!     }
//! }
//! ```
//!
//! ## Observability
//!
//! The crate uses `tracing` for instrumentation. Spans:
//!
//! - `MailPoller::pull` - One polling cycle
//! - `ImapConnector::open` - Connect, login, select
//! - `connection::establish_tls` - TLS connection
//! - `session::*` - Individual IMAP commands
//! - `DropDirectory::store` - One file write
//!
//! Standard fields: `imap_host`, `mailbox`, `username`, `seq`, `subject`, `reason`,
//! `path`. Passwords are never recorded.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

// Public modules
pub mod clock;
pub mod config;
pub mod error;
pub mod mailbox;
pub mod parser;
pub mod poller;
pub mod storage;

// Internal modules
mod connection;
mod session;

// Re-exports for ergonomic API
pub use clock::{Clock, RandomStem, StemSource, SystemClock};
pub use config::{MailboxConfig, MailboxConfigBuilder, TimeoutConfig};
pub use error::{Error, ErrorCategory, Rejection, Result};
pub use mailbox::{ImapConnector, ImapMailbox, MailboxConnector, MailboxSession};
pub use parser::{Attachment, AttachmentKind, MessageParser, ParsedMessage};
pub use poller::{MailPoller, PollReport};
pub use storage::DropDirectory;
