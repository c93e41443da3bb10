//! Shared fixtures: an in-memory mailbox and message builders.

#![allow(dead_code)]

use chrono::{DateTime, Duration, TimeZone, Utc};
use mail_drop::{Clock, Error, MailboxConfig, MailboxConnector, MailboxSession, Result};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};

pub const PDF_B64: &str = "JVBERi0xLjQgZmFrZSBpbnZvaWNl";
pub const PDF_BYTES: &[u8] = b"%PDF-1.4 fake invoice";
pub const PNG_B64: &str = "iVBORw0KGgo=";

// ─────────────────────────────────────────────────────────────────────────────
// Message builders
// ─────────────────────────────────────────────────────────────────────────────

/// A multipart message with a text body and one attachment part.
pub fn with_attachment(subject: &str, date: &str, content_type: &str, body_b64: &str) -> Vec<u8> {
    format!(
        "From: scanner@example.com\r\n\
         Subject: {subject}\r\n\
         Date: {date}\r\n\
         MIME-Version: 1.0\r\n\
         Content-Type: multipart/mixed; boundary=\"BOUNDARY\"\r\n\r\n\
         --BOUNDARY\r\nContent-Type: text/plain\r\n\r\nScanned document.\r\n\
         --BOUNDARY\r\nContent-Type: {content_type}\r\n\
         Content-Disposition: attachment; filename=\"scan\"\r\n\
         Content-Transfer-Encoding: base64\r\n\r\n{body_b64}\r\n\
         --BOUNDARY--\r\n"
    )
    .into_bytes()
}

/// A valid message carrying one PDF.
pub fn pdf_message(subject: &str) -> Vec<u8> {
    with_attachment(
        subject,
        "Mon, 01 Jan 2024 10:00:00 +0000",
        "application/pdf",
        PDF_B64,
    )
}

/// The authored time of [`pdf_message`].
pub fn pdf_message_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap()
}

// ─────────────────────────────────────────────────────────────────────────────
// Clock
// ─────────────────────────────────────────────────────────────────────────────

/// A clock that moves one minute forward every time it is read.
#[derive(Debug)]
pub struct TickingClock {
    minutes: AtomicI64,
}

impl TickingClock {
    pub fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap()
    }
}

impl Default for TickingClock {
    fn default() -> Self {
        Self {
            minutes: AtomicI64::new(0),
        }
    }
}

impl Clock for TickingClock {
    fn now(&self) -> DateTime<Utc> {
        let minutes = self.minutes.fetch_add(1, Ordering::SeqCst);
        Self::start() + Duration::minutes(minutes)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// In-memory mailbox
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug)]
struct Stored {
    raw: Vec<u8>,
    deleted: bool,
}

#[derive(Debug, Default)]
struct State {
    messages: Vec<Stored>,
    password: String,
    mailbox: String,
    fail_fetch_of: Option<u32>,
    empty_fetch_of: Option<u32>,
    fail_expunge: Option<bool>,
    fail_close: bool,
    commands: Vec<String>,
    active_sessions: usize,
    max_active_sessions: usize,
}

/// An in-memory mailbox reachable through [`FakeConnector`].
#[derive(Debug, Clone)]
pub struct FakeMailbox {
    state: Arc<Mutex<State>>,
}

impl FakeMailbox {
    /// A mailbox named `INBOX` accepting the password `secret`.
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(State {
                password: "secret".into(),
                mailbox: "INBOX".into(),
                ..State::default()
            })),
        }
    }

    pub fn deliver(&self, raw: Vec<u8>) {
        self.with(|s| s.messages.push(Stored {
            raw,
            deleted: false,
        }));
    }

    pub fn message_count(&self) -> usize {
        self.with(|s| s.messages.len())
    }

    pub fn flagged_count(&self) -> usize {
        self.with(|s| s.messages.iter().filter(|m| m.deleted).count())
    }

    /// Every command received, in order.
    pub fn commands(&self) -> Vec<String> {
        self.with(|s| s.commands.clone())
    }

    pub fn max_active_sessions(&self) -> usize {
        self.with(|s| s.max_active_sessions)
    }

    /// Makes the fetch of the given sequence number fail.
    pub fn fail_fetch_of(&self, seq: u32) {
        self.with(|s| s.fail_fetch_of = Some(seq));
    }

    /// Makes the fetch of the given sequence number come back without a body.
    pub fn empty_fetch_of(&self, seq: u32) {
        self.with(|s| s.empty_fetch_of = Some(seq));
    }

    /// Makes the next expunge report a failure, after removing the flagged messages
    /// if `applied` is set.
    pub fn fail_next_expunge(&self, applied: bool) {
        self.with(|s| s.fail_expunge = Some(applied));
    }

    pub fn fail_close(&self) {
        self.with(|s| s.fail_close = true);
    }

    pub fn connector(&self) -> FakeConnector {
        FakeConnector {
            mailbox: self.clone(),
        }
    }

    fn with<T>(&self, f: impl FnOnce(&mut State) -> T) -> T {
        f(&mut self.state.lock().unwrap())
    }
}

fn rejected(reason: &str) -> async_imap::error::Error {
    async_imap::error::Error::No(reason.to_string())
}

/// Opens sessions on a [`FakeMailbox`].
#[derive(Debug, Clone)]
pub struct FakeConnector {
    mailbox: FakeMailbox,
}

impl MailboxConnector for FakeConnector {
    type Session = FakeSession;

    async fn open(&self, config: &MailboxConfig) -> Result<FakeSession> {
        let mailbox = self.mailbox.clone();

        mailbox.with(|s| {
            s.commands.push("LOGIN".into());
            if config.password() != s.password {
                return Err(Error::AuthFailed {
                    username: config.username().to_string(),
                    source: rejected("[AUTHENTICATIONFAILED] Invalid credentials"),
                });
            }

            s.commands.push(format!("SELECT {}", config.mailbox()));
            if config.mailbox() != s.mailbox {
                return Err(Error::MailboxNotFound {
                    mailbox: config.mailbox().to_string(),
                    source: rejected("[NONEXISTENT] Unknown Mailbox"),
                });
            }

            s.active_sessions += 1;
            s.max_active_sessions = s.max_active_sessions.max(s.active_sessions);
            Ok(())
        })?;

        Ok(FakeSession {
            mailbox,
            open: true,
        })
    }
}

/// A session on a [`FakeMailbox`]. Sequence numbers are 1-based positions.
#[derive(Debug)]
pub struct FakeSession {
    mailbox: FakeMailbox,
    open: bool,
}

impl MailboxSession for FakeSession {
    async fn search_all(&mut self) -> Result<Vec<u32>> {
        tokio::task::yield_now().await;
        Ok(self.mailbox.with(|s| {
            s.commands.push("SEARCH ALL".into());
            (1..=s.messages.len())
                .map(|n| u32::try_from(n).unwrap())
                .collect()
        }))
    }

    async fn fetch(&mut self, id: u32) -> Result<Option<Vec<u8>>> {
        tokio::task::yield_now().await;
        self.mailbox.with(|s| {
            s.commands.push(format!("FETCH {id}"));
            if s.fail_fetch_of == Some(id) {
                return Err(Error::Fetch {
                    seq: id,
                    source: rejected("message vanished"),
                });
            }
            if s.empty_fetch_of == Some(id) {
                return Ok(None);
            }
            Ok(s.messages
                .get(id as usize - 1)
                .map(|m| m.raw.clone()))
        })
    }

    async fn flag_deleted(&mut self, id: u32) -> Result<()> {
        self.mailbox.with(|s| {
            s.commands.push(format!("STORE {id} +FLAGS (\\Deleted)"));
            if let Some(m) = s.messages.get_mut(id as usize - 1) {
                m.deleted = true;
            }
        });
        Ok(())
    }

    async fn expunge(&mut self) -> Result<()> {
        self.mailbox.with(|s| {
            s.commands.push("EXPUNGE".into());
            let failure = s.fail_expunge.take();
            if failure != Some(false) {
                s.messages.retain(|m| !m.deleted);
            }
            match failure {
                Some(_) => Err(Error::Expunge {
                    source: rejected("connection reset"),
                }),
                None => Ok(()),
            }
        })
    }

    async fn close(&mut self) -> Result<()> {
        self.mailbox.with(|s| {
            s.commands.push("CLOSE".into());
            if s.fail_close {
                return Err(Error::Close {
                    source: rejected("server going away"),
                });
            }
            s.messages.retain(|m| !m.deleted);
            Ok(())
        })
    }

    async fn logout(&mut self) -> Result<()> {
        let was_open = std::mem::replace(&mut self.open, false);
        self.mailbox.with(|s| {
            s.commands.push("LOGOUT".into());
            if was_open {
                s.active_sessions -= 1;
            }
        });
        Ok(())
    }
}
