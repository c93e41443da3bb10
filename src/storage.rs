//! Drop directory persistence.
//!
//! Attachments are written to a hidden temporary sibling, stamped with the message's
//! authored time, and renamed into place. A watcher on the drop directory only ever
//! sees complete files.

use crate::error::{Error, Result};
use crate::parser::ParsedMessage;
use std::fs::{File, FileTimes};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{debug, instrument, warn};

/// The directory consumed by the downstream indexer.
#[derive(Debug, Clone)]
pub struct DropDirectory {
    path: PathBuf,
}

impl DropDirectory {
    /// Wraps an existing, writable directory.
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Returns the directory path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Writes the message's attachment as `{dir}/{file_name}` with modification and
    /// access times set to the authored time. An existing file of that name is
    /// replaced.
    ///
    /// # Errors
    ///
    /// Returns [`Error::WriteFile`] if any step fails. The temporary file is removed
    /// on a best-effort basis.
    #[instrument(
        name = "DropDirectory::store",
        skip_all,
        fields(file_name = %message.file_name())
    )]
    pub fn store(&self, message: &ParsedMessage) -> Result<PathBuf> {
        let target = self.path.join(message.file_name());
        let partial = self.path.join(format!(".{}.part", message.file_name()));
        let stamp = SystemTime::from(message.authored_at());

        if let Err(source) = write_stamped(&partial, message.attachment().data(), stamp)
            .and_then(|()| std::fs::rename(&partial, &target))
        {
            if let Err(e) = std::fs::remove_file(&partial) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!(path = %partial.display(), error = %e, "Failed to remove partial file");
                }
            }
            return Err(Error::WriteFile {
                path: target,
                source,
            });
        }

        debug!(
            path = %target.display(),
            size = message.attachment().data().len(),
            "Stored attachment"
        );

        Ok(target)
    }
}

/// Writes `data` to a fresh file and stamps it. Times are set after the last write so
/// the write doesn't bump them again.
fn write_stamped(path: &Path, data: &[u8], stamp: SystemTime) -> std::io::Result<()> {
    let mut file = File::create(path)?;
    file.write_all(data)?;
    file.sync_all()?;
    file.set_times(FileTimes::new().set_accessed(stamp).set_modified(stamp))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::Clock;
    use crate::parser::MessageParser;
    use chrono::{DateTime, TimeZone, Utc};

    struct FixedClock;

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap()
        }
    }

    fn message(subject: &str) -> ParsedMessage {
        let raw = format!(
            "Subject: {subject}\r\n\
             Content-Type: application/pdf\r\n\
             Content-Disposition: attachment\r\n\
             Content-Transfer-Encoding: base64\r\n\r\n\
             JVBERi0xLjQ=\r\n"
        );
        MessageParser::new()
            .with_clock(FixedClock)
            .parse(raw.as_bytes())
            .unwrap()
    }

    #[test]
    fn test_store_writes_and_stamps() {
        let dir = tempfile::tempdir().unwrap();
        let drop_dir = DropDirectory::new(dir.path());

        let path = drop_dir.store(&message("Invoice March")).unwrap();

        assert_eq!(path, dir.path().join("Invoice March.pdf"));
        assert_eq!(std::fs::read(&path).unwrap(), b"%PDF-1.4");

        let modified = std::fs::metadata(&path).unwrap().modified().unwrap();
        assert_eq!(
            DateTime::<Utc>::from(modified),
            Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_store_leaves_no_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let drop_dir = DropDirectory::new(dir.path());

        drop_dir.store(&message("Scan")).unwrap();

        let names: Vec<String> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["Scan.pdf".to_string()]);
    }

    #[test]
    fn test_store_replaces_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("Scan.pdf"), b"old").unwrap();

        let drop_dir = DropDirectory::new(dir.path());
        drop_dir.store(&message("Scan")).unwrap();

        assert_eq!(
            std::fs::read(dir.path().join("Scan.pdf")).unwrap(),
            b"%PDF-1.4"
        );
    }

    #[test]
    fn test_store_into_missing_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        let drop_dir = DropDirectory::new(dir.path().join("missing"));

        let err = drop_dir.store(&message("Scan")).unwrap_err();
        assert!(matches!(err, Error::WriteFile { .. }));
        assert_eq!(err.code(), "write_failed");
    }
}
