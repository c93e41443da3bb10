//! Mailbox configuration.
//!
//! Use [`MailboxConfigBuilder`] to create a configuration with sensible defaults:
//!
//! ```
//! use mail_drop::MailboxConfig;
//!
//! let config = MailboxConfig::builder()
//!     .host("imap.example.com")
//!     .username("scanner@example.com")
//!     .password("app-password")
//!     .build()
//!     .expect("valid config");
//!
//! assert!(config.is_enabled());
//! assert_eq!(config.mailbox(), "INBOX");
//! ```
//!
//! A configuration with an empty host is *disabled*: polling it is a no-op.

use crate::error::{Error, Result};
use secrecy::{ExposeSecret, SecretString};
use std::time::Duration;

/// Default IMAPS port.
pub const DEFAULT_PORT: u16 = 993;

/// Default mailbox to poll.
pub const DEFAULT_MAILBOX: &str = "INBOX";

/// Configuration for the mailbox being polled.
///
/// Create using [`MailboxConfig::builder()`] or [`MailboxConfig::disabled()`].
///
/// The `password` is stored as a [`SecretString`] and never shows up in `Debug` output.
#[derive(Clone)]
pub struct MailboxConfig {
    host: String,
    port: u16,
    username: String,
    password: SecretString,
    mailbox: String,
    /// Timeout configuration.
    pub timeouts: TimeoutConfig,
}

impl std::fmt::Debug for MailboxConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MailboxConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .field("mailbox", &self.mailbox)
            .field("timeouts", &self.timeouts)
            .finish()
    }
}

impl MailboxConfig {
    /// Creates a new configuration builder.
    #[must_use]
    pub fn builder() -> MailboxConfigBuilder {
        MailboxConfigBuilder::default()
    }

    /// Returns a configuration with no host. Polling it only advances the poller's
    /// last-checked timestamp.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            host: String::new(),
            port: DEFAULT_PORT,
            username: String::new(),
            password: SecretString::from(String::new()),
            mailbox: DEFAULT_MAILBOX.to_string(),
            timeouts: TimeoutConfig::default(),
        }
    }

    /// Returns `true` if a host is configured.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        !self.host.is_empty()
    }

    /// Returns the IMAP server hostname.
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Returns the IMAP server port.
    #[must_use]
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Returns the login name.
    #[must_use]
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Returns the password as a string slice.
    ///
    /// Only meant to be handed to the login command.
    #[must_use]
    pub fn password(&self) -> &str {
        self.password.expose_secret()
    }

    /// Returns the mailbox to select.
    #[must_use]
    pub fn mailbox(&self) -> &str {
        &self.mailbox
    }

    /// Returns the full IMAP server address as "host:port".
    #[must_use]
    pub fn server_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Timeout configuration for the steps of a polling cycle.
#[derive(Debug, Clone)]
pub struct TimeoutConfig {
    /// Timeout for establishing TCP/TLS connection.
    pub connect: Duration,
    /// Timeout for IMAP authentication.
    pub auth: Duration,
    /// Timeout for selecting the mailbox.
    pub select: Duration,
    /// Timeout for each search, fetch, store and expunge command.
    pub command: Duration,
    /// Timeout for close and logout.
    pub logout: Duration,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(30),
            auth: Duration::from_secs(30),
            select: Duration::from_secs(10),
            command: Duration::from_secs(60),
            logout: Duration::from_secs(5),
        }
    }
}

/// Builder for [`MailboxConfig`].
#[derive(Debug, Default)]
pub struct MailboxConfigBuilder {
    host: Option<String>,
    port: Option<u16>,
    username: Option<String>,
    password: Option<String>,
    mailbox: Option<String>,
    timeouts: Option<TimeoutConfig>,
}

impl MailboxConfigBuilder {
    /// Sets the IMAP server hostname.
    ///
    /// Leaving it unset (or empty) produces a disabled configuration.
    #[must_use]
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    /// Sets the IMAP server port. Default is 993 (IMAPS).
    #[must_use]
    pub fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Sets the login name (required when a host is set).
    #[must_use]
    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    /// Sets the password (required when a host is set).
    #[must_use]
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Sets the mailbox to poll. Default is `INBOX`.
    #[must_use]
    pub fn mailbox(mut self, mailbox: impl Into<String>) -> Self {
        self.mailbox = Some(mailbox.into());
        self
    }

    /// Sets timeout configuration.
    #[must_use]
    pub fn timeouts(mut self, timeouts: TimeoutConfig) -> Self {
        self.timeouts = Some(timeouts);
        self
    }

    /// Sets the connection timeout.
    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.timeouts
            .get_or_insert_with(TimeoutConfig::default)
            .connect = timeout;
        self
    }

    /// Sets the per-command timeout.
    #[must_use]
    pub fn command_timeout(mut self, timeout: Duration) -> Self {
        self.timeouts
            .get_or_insert_with(TimeoutConfig::default)
            .command = timeout;
        self
    }

    /// Builds the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if a host is set but the username or password is
    /// missing, or if the mailbox name is empty.
    pub fn build(self) -> Result<MailboxConfig> {
        let host = self.host.unwrap_or_default().trim().to_string();
        let mailbox = self
            .mailbox
            .unwrap_or_else(|| DEFAULT_MAILBOX.to_string());

        if mailbox.trim().is_empty() {
            return Err(Error::InvalidConfig {
                message: "mailbox name must not be empty".into(),
            });
        }

        let username = self.username.unwrap_or_default();
        let password = self.password.unwrap_or_default();

        if !host.is_empty() {
            if username.is_empty() {
                return Err(Error::InvalidConfig {
                    message: "username is required".into(),
                });
            }
            if password.is_empty() {
                return Err(Error::InvalidConfig {
                    message: "password is required".into(),
                });
            }
        }

        Ok(MailboxConfig {
            host,
            port: self.port.unwrap_or(DEFAULT_PORT),
            username,
            password: SecretString::from(password),
            mailbox,
            timeouts: self.timeouts.unwrap_or_default(),
        })
    }
}
