//! Error types for the mail-drop crate.
//!
//! Two kinds of failure live here:
//!
//! - [`Error`] is fatal to a polling cycle (connection, login, mailbox selection,
//!   protocol failures) or to the persistence of a single file.
//! - [`Rejection`] classifies a single message that cannot be ingested. Rejections
//!   never abort a cycle; the message is discarded and deleted from the mailbox.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Result type alias using [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while polling a mailbox or persisting attachments.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    // ─────────────────────────────────────────────────────────────────────────
    // Configuration errors (NOT retryable)
    // ─────────────────────────────────────────────────────────────────────────
    /// Invalid configuration provided.
    #[error("invalid configuration: {message}")]
    InvalidConfig {
        /// Description of the configuration error.
        message: String,
    },

    /// Invalid DNS name for TLS.
    #[error("invalid DNS name for host '{host}'")]
    InvalidDnsName {
        /// The invalid hostname.
        host: String,
        /// The underlying DNS name error.
        #[source]
        source: rustls::client::InvalidDnsNameError,
    },

    // ─────────────────────────────────────────────────────────────────────────
    // Network / connection errors (RETRYABLE)
    // ─────────────────────────────────────────────────────────────────────────
    /// Failed to establish TCP connection.
    #[error("failed to connect to {target}")]
    Connect {
        /// The target address that failed.
        target: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to establish TLS connection.
    #[error("failed to establish TLS connection to {target}")]
    Tls {
        /// The target address that failed.
        target: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    // ─────────────────────────────────────────────────────────────────────────
    // Timeout errors (RETRYABLE)
    // ─────────────────────────────────────────────────────────────────────────
    /// Connection timeout.
    #[error("connection timeout to {target} after {timeout:?}")]
    ConnectTimeout {
        /// The target address.
        target: String,
        /// The timeout duration that was exceeded.
        timeout: Duration,
    },

    /// A session step did not complete in time.
    #[error("IMAP {step} timed out after {timeout:?}")]
    StepTimeout {
        /// The session step that timed out (`login`, `select`, `fetch`, ...).
        step: &'static str,
        /// The timeout duration that was exceeded.
        timeout: Duration,
    },

    // ─────────────────────────────────────────────────────────────────────────
    // Session setup errors
    // ─────────────────────────────────────────────────────────────────────────
    /// The server rejected the credentials.
    #[error("IMAP login failed for {username}")]
    AuthFailed {
        /// The username used for login.
        username: String,
        /// The underlying IMAP error.
        #[source]
        source: async_imap::error::Error,
    },

    /// The configured mailbox could not be selected.
    #[error("failed to select mailbox '{mailbox}'")]
    MailboxNotFound {
        /// The mailbox name.
        mailbox: String,
        /// The underlying IMAP error.
        #[source]
        source: async_imap::error::Error,
    },

    // ─────────────────────────────────────────────────────────────────────────
    // IMAP protocol errors during a cycle (RETRYABLE)
    // ─────────────────────────────────────────────────────────────────────────
    /// IMAP search failed.
    #[error("IMAP search failed")]
    Search {
        /// The underlying IMAP error.
        #[source]
        source: async_imap::error::Error,
    },

    /// IMAP fetch failed.
    #[error("IMAP fetch failed for message {seq}")]
    Fetch {
        /// Sequence number of the message.
        seq: u32,
        /// The underlying IMAP error.
        #[source]
        source: async_imap::error::Error,
    },

    /// Setting the `\Deleted` flag failed.
    #[error("failed to flag message {seq} for deletion")]
    FlagDeleted {
        /// Sequence number of the message.
        seq: u32,
        /// The underlying IMAP error.
        #[source]
        source: async_imap::error::Error,
    },

    /// IMAP expunge failed.
    #[error("IMAP expunge failed")]
    Expunge {
        /// The underlying IMAP error.
        #[source]
        source: async_imap::error::Error,
    },

    /// IMAP close failed.
    #[error("IMAP close failed")]
    Close {
        /// The underlying IMAP error.
        #[source]
        source: async_imap::error::Error,
    },

    /// IMAP logout failed.
    #[error("IMAP logout failed")]
    Logout {
        /// The underlying IMAP error.
        #[source]
        source: async_imap::error::Error,
    },

    // ─────────────────────────────────────────────────────────────────────────
    // Persistence errors (NOT retryable, the message is already gone)
    // ─────────────────────────────────────────────────────────────────────────
    /// Writing an attachment into the drop directory failed.
    #[error("failed to write {}", path.display())]
    WriteFile {
        /// Destination path of the attachment.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The background task writing attachments did not finish.
    #[error("persistence task failed")]
    PersistTask {
        /// The join error reported by the runtime.
        #[source]
        source: tokio::task::JoinError,
    },
}

impl Error {
    /// Returns `true` if this error represents a transient failure that might succeed on
    /// a later cycle.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Connect { .. }
            | Error::Tls { .. }
            | Error::ConnectTimeout { .. }
            | Error::StepTimeout { .. }
            | Error::Search { .. }
            | Error::Fetch { .. }
            | Error::FlagDeleted { .. }
            | Error::Expunge { .. } => true,

            // Credentials and mailbox names don't fix themselves.
            Error::InvalidConfig { .. }
            | Error::InvalidDnsName { .. }
            | Error::AuthFailed { .. }
            | Error::MailboxNotFound { .. }
            | Error::Close { .. }
            | Error::Logout { .. }
            | Error::WriteFile { .. }
            | Error::PersistTask { .. } => false,
        }
    }

    /// Returns the error category for metrics/logging purposes.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::InvalidConfig { .. } | Error::InvalidDnsName { .. } => {
                ErrorCategory::Configuration
            }

            Error::Connect { .. } | Error::Tls { .. } => ErrorCategory::Network,

            Error::ConnectTimeout { .. } | Error::StepTimeout { .. } => ErrorCategory::Timeout,

            Error::AuthFailed { .. } => ErrorCategory::Authentication,

            Error::MailboxNotFound { .. } => ErrorCategory::Mailbox,

            Error::Search { .. }
            | Error::Fetch { .. }
            | Error::FlagDeleted { .. }
            | Error::Expunge { .. }
            | Error::Close { .. }
            | Error::Logout { .. } => ErrorCategory::Protocol,

            Error::WriteFile { .. } | Error::PersistTask { .. } => ErrorCategory::Persistence,
        }
    }

    /// Returns a stable snake_case classification code.
    ///
    /// ```
    /// use mail_drop::Error;
    ///
    /// let err = Error::InvalidConfig { message: "username is required".into() };
    /// assert_eq!(err.code(), "invalid_config");
    /// ```
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Error::InvalidConfig { .. } => "invalid_config",
            Error::InvalidDnsName { .. } | Error::Connect { .. } | Error::Tls { .. } => {
                "connection_failed"
            }
            Error::ConnectTimeout { .. } | Error::StepTimeout { .. } => "timeout",
            Error::AuthFailed { .. } => "auth_failed",
            Error::MailboxNotFound { .. } => "mailbox_not_found",
            Error::Search { .. } => "search_failed",
            Error::Fetch { .. } => "fetch_failed",
            Error::FlagDeleted { .. } => "flag_failed",
            Error::Expunge { .. } => "expunge_failed",
            Error::Close { .. } => "close_failed",
            Error::Logout { .. } => "logout_failed",
            Error::WriteFile { .. } | Error::PersistTask { .. } => "write_failed",
        }
    }
}

/// Error categories for metrics and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Configuration or validation errors.
    Configuration,
    /// Network connectivity errors.
    Network,
    /// Timeout errors.
    Timeout,
    /// Rejected credentials.
    Authentication,
    /// Mailbox selection errors.
    Mailbox,
    /// IMAP protocol errors.
    Protocol,
    /// Drop directory write errors.
    Persistence,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorCategory::Configuration => write!(f, "configuration"),
            ErrorCategory::Network => write!(f, "network"),
            ErrorCategory::Timeout => write!(f, "timeout"),
            ErrorCategory::Authentication => write!(f, "authentication"),
            ErrorCategory::Mailbox => write!(f, "mailbox"),
            ErrorCategory::Protocol => write!(f, "protocol"),
            ErrorCategory::Persistence => write!(f, "persistence"),
        }
    }
}

/// Why a message was not ingested.
///
/// Every rejected message is still flagged for deletion, so a message that can never
/// be ingested doesn't come back on the next cycle.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    /// The raw bytes could not be decoded as a MIME message.
    #[error("message could not be decoded: {reason}")]
    Malformed {
        /// Decoder error text.
        reason: String,
    },

    /// The message has no `Subject` header.
    #[error("message does not have a subject")]
    NoSubject,

    /// The subject contains characters that are not safe in a file name.
    #[error("message subject is unsafe: {subject:?}")]
    UnsafeSubject {
        /// The offending subject.
        subject: String,
    },

    /// An attachment has a content type outside the allow-list.
    #[error("unsupported attachment type: {content_type}")]
    UnsupportedType {
        /// The declared content type.
        content_type: String,
    },

    /// No part is marked as an attachment.
    #[error("message has no attachment")]
    NoAttachment,

    /// More than one part is marked as an attachment.
    #[error("message has {count} attachments, only one is supported")]
    MultipleAttachments {
        /// Number of qualifying attachment parts.
        count: usize,
    },
}

impl Rejection {
    /// Returns a stable snake_case reason code.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Rejection::Malformed { .. } => "malformed",
            Rejection::NoSubject => "no_subject",
            Rejection::UnsafeSubject { .. } => "unsafe_subject",
            Rejection::UnsupportedType { .. } => "unsupported_type",
            Rejection::NoAttachment => "no_attachment",
            Rejection::MultipleAttachments { .. } => "multiple_attachments",
        }
    }
}
