//! Audit trail of inbound commands and outbound answers.
//!
//! Each record lands at `<root>/<query>.<TXN>/request` or `.../answer` as an
//! indented JSON object of the command's fields. Only the latest record per
//! `(query, TXN, direction)` is kept; the trail exists to see what a given
//! command looks like on the wire, not to keep history.
//!
//! Writing never fails the caller. Errors are logged at `warn` and the
//! command carries on.

use std::fmt;
use std::path::PathBuf;

use greenroom_protocol::{Answer, Codec, Command, JsonCodec, ProtocolError};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::AuditConfig;

/// Errors raised when reading records back.
#[derive(Debug, thiserror::Error)]
pub enum AuditError {
    #[error("audit log is disabled")]
    Disabled,

    #[error("failed to read audit record {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Decode(#[from] ProtocolError),
}

/// Which side of an exchange a record holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Request,
    Answer,
}

impl Direction {
    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Request => "request",
            Direction::Answer => "answer",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Writes and reads audit records.
#[derive(Debug, Clone)]
pub struct AuditLog {
    root: Option<PathBuf>,
    codec: JsonCodec,
}

impl AuditLog {
    /// An audit log writing under `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: Some(root.into()),
            codec: JsonCodec::pretty(),
        }
    }

    /// An audit log that drops everything.
    pub fn disabled() -> Self {
        Self {
            root: None,
            codec: JsonCodec::pretty(),
        }
    }

    pub fn from_config(config: &AuditConfig) -> Self {
        if config.enabled {
            Self::new(config.root.clone())
        } else {
            Self::disabled()
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.root.is_some()
    }

    /// Path of the record for `(query, txn, direction)`, or `None` when
    /// disabled.
    pub fn record_path(&self, query: &str, txn: &str, direction: Direction) -> Option<PathBuf> {
        let root = self.root.as_ref()?;
        let dir = format!("{}.{}", path_safe(query), path_safe(txn));
        Some(root.join(dir).join(direction.as_str()))
    }

    /// Records an inbound command.
    pub async fn request(&self, command: &Command) {
        self.write(&command.query, command.txn(), Direction::Request, &command.message)
            .await;
    }

    /// Records an answer sent as `query`.
    pub async fn answer(&self, query: &str, answer: &Answer) {
        let txn = answer.get("TXN").unwrap_or("");
        self.write(query, txn, Direction::Answer, answer).await;
    }

    async fn write<T: Serialize>(&self, query: &str, txn: &str, direction: Direction, value: &T) {
        let Some(path) = self.record_path(query, txn, direction) else {
            return;
        };

        let bytes = match self.codec.encode(value) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(query, txn, %direction, error = %e, "failed to encode audit record");
                return;
            }
        };

        if let Some(dir) = path.parent() {
            if let Err(e) = tokio::fs::create_dir_all(dir).await {
                tracing::warn!(path = %dir.display(), error = %e, "failed to create audit directory");
                return;
            }
        }
        if let Err(e) = tokio::fs::write(&path, bytes).await {
            tracing::warn!(path = %path.display(), error = %e, "failed to write audit record");
        }
    }

    /// Reads a record back, e.g. to replay a command offline.
    ///
    /// Returns `Ok(None)` when no record exists.
    ///
    /// # Errors
    /// [`AuditError::Disabled`] on a disabled log, [`AuditError::Read`] on
    /// I/O failure, [`AuditError::Decode`] if the file is not a record.
    pub async fn load<T: DeserializeOwned>(
        &self,
        query: &str,
        txn: &str,
        direction: Direction,
    ) -> Result<Option<T>, AuditError> {
        let path = self
            .record_path(query, txn, direction)
            .ok_or(AuditError::Disabled)?;

        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(AuditError::Read { path, source }),
        };
        Ok(Some(self.codec.decode(&bytes)?))
    }
}

/// Keeps client-supplied names inside the audit root.
fn path_safe(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '-' | '_' => c,
            _ => '_',
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use indexmap::IndexMap;

    use super::*;

    #[test]
    fn test_record_path_layout() {
        let audit = AuditLog::new("/tmp/audit");
        let path = audit.record_path("pnow", "Status", Direction::Answer).unwrap();
        assert_eq!(path, PathBuf::from("/tmp/audit/pnow.Status/answer"));
    }

    #[test]
    fn test_record_path_without_txn_keeps_trailing_dot() {
        let audit = AuditLog::new("/tmp/audit");
        let path = audit.record_path("CGAM", "", Direction::Request).unwrap();
        assert_eq!(path, PathBuf::from("/tmp/audit/CGAM./request"));
    }

    #[test]
    fn test_record_path_escapes_separators() {
        let audit = AuditLog::new("/tmp/audit");
        let path = audit.record_path("../etc", "a/b", Direction::Request).unwrap();
        assert_eq!(path, PathBuf::from("/tmp/audit/___etc.a_b/request"));
    }

    #[test]
    fn test_disabled_log_has_no_paths() {
        assert!(AuditLog::disabled().record_path("CONN", "", Direction::Request).is_none());
        assert!(!AuditLog::from_config(&AuditConfig::default()).is_enabled());
    }

    #[tokio::test]
    async fn test_request_and_answer_round_trip_through_files() {
        let dir = tempfile::tempdir().unwrap();
        let audit = AuditLog::new(dir.path());

        let command = Command::new("pnow")
            .with("TXN", "Status")
            .with("partition.partition", "/eagames/BFBC2");
        audit.request(&command).await;
        let answer = Answer::new().with("TXN", "Status").with("props.{games}.[]", 0);
        audit.answer("pnow", &answer).await;

        let request: IndexMap<String, String> = audit
            .load("pnow", "Status", Direction::Request)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(request, command.message);

        let stored: Answer = audit
            .load("pnow", "Status", Direction::Answer)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored, answer);
    }

    #[tokio::test]
    async fn test_load_missing_record_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let audit = AuditLog::new(dir.path());
        let record: Option<Answer> = audit.load("ECNL", "", Direction::Answer).await.unwrap();
        assert!(record.is_none());
    }

    #[tokio::test]
    async fn test_write_failure_does_not_panic() {
        let file = tempfile::NamedTempFile::new().unwrap();
        // A file where the root directory should be.
        let audit = AuditLog::new(file.path());
        audit.request(&Command::new("CONN")).await;
    }
}
