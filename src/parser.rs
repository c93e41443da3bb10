//! Message validation and attachment extraction.
//!
//! [`MessageParser::parse`] turns the raw bytes of one mailbox entry into a
//! [`ParsedMessage`] carrying exactly one allow-listed attachment, or a [`Rejection`]
//! saying why the message can't be ingested.
//!
//! ```
//! use mail_drop::MessageParser;
//!
//! let raw = b"Subject: Invoice March\r\n\
//! Date: Mon, 01 Jan 2024 10:00:00 +0000\r\n\
//! Content-Type: application/pdf\r\n\
//! Content-Disposition: attachment; filename=\"scan.pdf\"\r\n\
//! Content-Transfer-Encoding: base64\r\n\
//! \r\n\
//! JVBERi0xLjQ=\r\n";
//!
//! let message = MessageParser::new().parse(raw).expect("valid message");
//! assert_eq!(message.file_name(), "Invoice March.pdf");
//! assert_eq!(message.attachment().data(), b"%PDF-1.4");
//! ```

use crate::clock::{Clock, RandomStem, StemSource, SystemClock};
use crate::error::Rejection;
use chrono::{DateTime, Utc};
use mailparse::{parse_mail, MailHeaderMap, ParsedMail};
use regex::Regex;
use std::sync::{Arc, LazyLock};
use tracing::debug;

/// Subjects become file names, so only a conservative character set is accepted.
static SAFE_SUBJECT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[\w\- ,.']+$").expect("valid regex"));

/// Longest subject used verbatim as a file stem, in bytes.
pub const MAX_STEM_LEN: usize = 200;

/// Returns `true` if `subject` is safe to reuse as a file name stem.
///
/// ```
/// use mail_drop::parser::is_safe_subject;
///
/// assert!(is_safe_subject("Invoice March, 2024"));
/// assert!(!is_safe_subject("../../etc/passwd"));
/// assert!(!is_safe_subject("a..b"));
/// ```
#[must_use]
pub fn is_safe_subject(subject: &str) -> bool {
    SAFE_SUBJECT.is_match(subject) && !subject.contains("..")
}

/// Content types accepted as attachments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttachmentKind {
    /// `application/pdf`
    Pdf,
    /// `image/png`
    Png,
    /// `image/jpeg`
    Jpeg,
    /// `image/gif`
    Gif,
    /// `image/tiff`
    Tiff,
}

impl AttachmentKind {
    /// Every accepted kind.
    pub const ALL: [AttachmentKind; 5] = [
        AttachmentKind::Pdf,
        AttachmentKind::Png,
        AttachmentKind::Jpeg,
        AttachmentKind::Gif,
        AttachmentKind::Tiff,
    ];

    /// Classifies a MIME type (without parameters), ignoring case.
    #[must_use]
    pub fn from_content_type(content_type: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.content_type().eq_ignore_ascii_case(content_type.trim()))
    }

    /// The canonical MIME type.
    #[must_use]
    pub fn content_type(self) -> &'static str {
        match self {
            AttachmentKind::Pdf => "application/pdf",
            AttachmentKind::Png => "image/png",
            AttachmentKind::Jpeg => "image/jpeg",
            AttachmentKind::Gif => "image/gif",
            AttachmentKind::Tiff => "image/tiff",
        }
    }

    /// File suffix, without the dot.
    #[must_use]
    pub fn suffix(self) -> &'static str {
        match self {
            AttachmentKind::Pdf => "pdf",
            AttachmentKind::Png => "png",
            AttachmentKind::Jpeg => "jpeg",
            AttachmentKind::Gif => "gif",
            AttachmentKind::Tiff => "tiff",
        }
    }
}

/// The decoded payload of an attachment part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    kind: AttachmentKind,
    data: Vec<u8>,
}

impl Attachment {
    /// Returns the attachment kind.
    #[must_use]
    pub fn kind(&self) -> AttachmentKind {
        self.kind
    }

    /// Returns the MIME type.
    #[must_use]
    pub fn content_type(&self) -> &'static str {
        self.kind.content_type()
    }

    /// Returns the file suffix derived from the MIME type.
    #[must_use]
    pub fn suffix(&self) -> &'static str {
        self.kind.suffix()
    }

    /// Returns the decoded bytes.
    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.data
    }
}

/// A message that passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedMessage {
    subject: String,
    authored_at: DateTime<Utc>,
    attachment: Attachment,
    file_name: String,
}

impl ParsedMessage {
    /// Returns the (safe) subject.
    #[must_use]
    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// Returns the time the message was written, or the parse time if the `Date`
    /// header was missing or unreadable.
    #[must_use]
    pub fn authored_at(&self) -> DateTime<Utc> {
        self.authored_at
    }

    /// Returns the single attachment.
    #[must_use]
    pub fn attachment(&self) -> &Attachment {
        &self.attachment
    }

    /// Returns the file name to write the attachment under, `{stem}.{suffix}`.
    #[must_use]
    pub fn file_name(&self) -> &str {
        &self.file_name
    }
}

/// Validates raw messages and extracts their attachment.
///
/// Parsing does no I/O. Time and fallback file stems come from the injected
/// [`Clock`] and [`StemSource`].
#[derive(Clone)]
pub struct MessageParser {
    clock: Arc<dyn Clock>,
    stems: Arc<dyn StemSource>,
}

impl Default for MessageParser {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MessageParser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageParser").finish_non_exhaustive()
    }
}

impl MessageParser {
    /// Creates a parser using wall-clock time and random fallback stems.
    #[must_use]
    pub fn new() -> Self {
        Self {
            clock: Arc::new(SystemClock),
            stems: Arc::new(RandomStem),
        }
    }

    /// Replaces the clock used when a message has no usable `Date` header.
    #[must_use]
    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// Replaces the generator of fallback file stems.
    #[must_use]
    pub fn with_stem_source(mut self, stems: impl StemSource + 'static) -> Self {
        self.stems = Arc::new(stems);
        self
    }

    /// Validates one raw message.
    ///
    /// # Errors
    ///
    /// Returns the first [`Rejection`] that applies, checked in this order: decoding,
    /// subject presence, subject safety, then attachments in part order (an
    /// unsupported type wins over a later valid part), then the attachment count.
    pub fn parse(&self, raw: &[u8]) -> Result<ParsedMessage, Rejection> {
        let mail = parse_mail(raw).map_err(|e| Rejection::Malformed {
            reason: e.to_string(),
        })?;

        let subject = mail
            .headers
            .get_first_value("Subject")
            .ok_or(Rejection::NoSubject)?;

        if !is_safe_subject(&subject) {
            return Err(Rejection::UnsafeSubject { subject });
        }

        let authored_at = self.authored_at(&mail);

        debug!(subject = %subject, %authored_at, "Parsing message");

        let attachment = single_attachment(&mail)?;
        let file_name = self.file_name(&subject, attachment.kind);

        Ok(ParsedMessage {
            subject,
            authored_at,
            attachment,
            file_name,
        })
    }

    fn authored_at(&self, mail: &ParsedMail<'_>) -> DateTime<Utc> {
        mail.headers
            .get_first_value("Date")
            .and_then(|date| parse_date(&date))
            .unwrap_or_else(|| self.clock.now())
    }

    fn file_name(&self, subject: &str, kind: AttachmentKind) -> String {
        // A leading dot would hide the file and collide with partial-file names.
        if is_safe_subject(subject) && !subject.starts_with('.') && subject.len() <= MAX_STEM_LEN
        {
            format!("{subject}.{}", kind.suffix())
        } else {
            format!("{}.{}", self.stems.next_stem(), kind.suffix())
        }
    }
}

/// Parses a `Date` header value, strict RFC 2822 first.
///
/// `mailparse::dateparse` is lenient and yields `0` for input it can't read, so its
/// result only counts when it lands after the epoch.
fn parse_date(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(date) = DateTime::parse_from_rfc2822(value) {
        return Some(date.with_timezone(&Utc));
    }

    mailparse::dateparse(value)
        .ok()
        .filter(|&timestamp| timestamp > 0)
        .and_then(|timestamp| DateTime::from_timestamp(timestamp, 0))
}

/// Walks every part depth-first, root included, and returns the only attachment.
fn single_attachment(mail: &ParsedMail<'_>) -> Result<Attachment, Rejection> {
    let mut found = Vec::new();
    let mut pending = vec![mail];

    while let Some(part) = pending.pop() {
        pending.extend(part.subparts.iter().rev());

        if !is_attachment(part) {
            continue;
        }

        let data = part.get_body_raw().map_err(|e| Rejection::Malformed {
            reason: e.to_string(),
        })?;

        let content_type = part.ctype.mimetype.to_ascii_lowercase();
        let kind = AttachmentKind::from_content_type(&content_type)
            .ok_or(Rejection::UnsupportedType { content_type })?;

        found.push(Attachment { kind, data });
    }

    match found.len() {
        0 => Err(Rejection::NoAttachment),
        1 => Ok(found.remove(0)),
        count => Err(Rejection::MultipleAttachments { count }),
    }
}

/// A part is an attachment iff its disposition type is `attachment`.
fn is_attachment(part: &ParsedMail<'_>) -> bool {
    part.headers
        .get_first_value("Content-Disposition")
        .is_some_and(|value| {
            value
                .split(';')
                .next()
                .is_some_and(|disposition| disposition.trim().eq_ignore_ascii_case("attachment"))
        })
}
