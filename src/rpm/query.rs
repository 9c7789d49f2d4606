//! Decode an rpm package database through the `rpm` tool.
//!
//! The database files are copied into a scratch directory first so the
//! scanned image is never touched by `rpm` rebuilding its indexes.

use std::path::Path;
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::model::PackageEntry;

/// `--queryformat` used for every database query, one package per line.
pub const QUERY_FORMAT: &str = "%{NAME}|%{EPOCH}|%{VERSION}|%{RELEASE}|%{ARCH}|%{SOURCERPM}\n";

const FIELD_COUNT: usize = 6;

/// rpm prints this for tags that are unset on a package.
const NONE_PLACEHOLDER: &str = "(none)";

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("rpm command not found: {command}")]
    CommandNotFound { command: String },
    #[error("failed to run {command}")]
    CommandFailed {
        command: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{command} exited with status {status}: {stderr}")]
    NonZeroExit {
        command: String,
        status: i32,
        stderr: String,
    },
    #[error("failed to stage package database from {path}")]
    Stage {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("rpm output is not valid UTF-8")]
    InvalidOutput(#[from] std::string::FromUtf8Error),
}

/// Runs `rpm -qa` against a package database directory.
#[derive(Debug, Clone)]
pub struct RpmQuery {
    command: String,
}

impl RpmQuery {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }

    /// Decodes every package row in the database stored in `db_dir`.
    ///
    /// # Errors
    ///
    /// Returns a [`QueryError`] when the database cannot be staged or the
    /// `rpm` command is missing or fails.
    pub async fn entries(&self, db_dir: &Path) -> Result<Vec<PackageEntry>, QueryError> {
        let staged = stage_database(db_dir).await?;

        debug!(command = %self.command, db = %db_dir.display(), "querying rpm database");
        let output = Command::new(&self.command)
            .arg("--dbpath")
            .arg(staged.path())
            .args(["-qa", "--queryformat", QUERY_FORMAT])
            .output()
            .await
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    QueryError::CommandNotFound {
                        command: self.command.clone(),
                    }
                } else {
                    QueryError::CommandFailed {
                        command: self.command.clone(),
                        source: e,
                    }
                }
            })?;

        if !output.status.success() {
            return Err(QueryError::NonZeroExit {
                command: self.command.clone(),
                status: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let stdout = String::from_utf8(output.stdout)?;
        Ok(parse_query_output(&stdout))
    }
}

impl Default for RpmQuery {
    fn default() -> Self {
        Self::new("rpm")
    }
}

/// Copies the regular files of `db_dir` into a fresh temporary directory.
///
/// `db_dir` must be a real directory. Symlinks inside it are not copied.
async fn stage_database(db_dir: &Path) -> Result<tempfile::TempDir, QueryError> {
    let stage_err = |source| QueryError::Stage {
        path: db_dir.display().to_string(),
        source,
    };

    let metadata = tokio::fs::symlink_metadata(db_dir)
        .await
        .map_err(stage_err)?;
    if !metadata.is_dir() {
        return Err(stage_err(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "package database path is not a directory",
        )));
    }

    let staged = tempfile::Builder::new()
        .prefix("rpmscan-db")
        .tempdir()
        .map_err(stage_err)?;

    let mut dir = tokio::fs::read_dir(db_dir).await.map_err(stage_err)?;
    while let Some(entry) = dir.next_entry().await.map_err(stage_err)? {
        if entry.file_type().await.map_err(stage_err)?.is_file() {
            tokio::fs::copy(entry.path(), staged.path().join(entry.file_name()))
                .await
                .map_err(stage_err)?;
        }
    }

    Ok(staged)
}

/// Decodes `rpm -qa --queryformat` output produced with [`QUERY_FORMAT`].
///
/// Lines that do not have the expected fields are skipped; some rpm versions
/// print warnings such as "Generating 12 missing index(es)" on stdout.
///
/// # Example
///
/// ```
/// use rpmscan::rpm::parse_query_output;
///
/// let output = "\
/// bash|(none)|4.4.23|1.fc28|x86_64|bash-4.4.23-1.fc28.src.rpm
/// warning: Generating 12 missing index(es), please wait...
/// ";
///
/// let entries = parse_query_output(output);
/// assert_eq!(entries.len(), 1);
/// assert_eq!(entries[0].epoch, "");
/// ```
pub fn parse_query_output(output: &str) -> Vec<PackageEntry> {
    output
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| {
            let entry = parse_query_line(line);
            if entry.is_none() {
                warn!(line, "skipping unexpected rpm query output line");
            }
            entry
        })
        .collect()
}

/// Decodes a single query-output line.
pub fn parse_query_line(line: &str) -> Option<PackageEntry> {
    let fields: Vec<&str> = line.trim_end_matches(['\r', '\n']).split('|').collect();
    if fields.len() != FIELD_COUNT {
        return None;
    }

    let field = |i: usize| {
        let value = fields[i].trim();
        if value == NONE_PLACEHOLDER {
            String::new()
        } else {
            value.to_string()
        }
    };

    let name = field(0);
    if name.is_empty() {
        return None;
    }

    Some(PackageEntry {
        name,
        epoch: field(1),
        version: field(2),
        release: field(3),
        architecture: field(4),
        source_rpm: field(5),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_query_line() {
        let entry = parse_query_line(
            "openssl-libs|1|1.1.0h|3.fc28|x86_64|openssl-1.1.0h-3.fc28.src.rpm",
        )
        .unwrap();

        assert_eq!(entry.name, "openssl-libs");
        assert_eq!(entry.epoch, "1");
        assert_eq!(entry.version, "1.1.0h");
        assert_eq!(entry.release, "3.fc28");
        assert_eq!(entry.architecture, "x86_64");
        assert_eq!(entry.source_rpm, "openssl-1.1.0h-3.fc28.src.rpm");
    }

    #[test]
    fn test_parse_query_line_none_placeholders() {
        let entry = parse_query_line("gpg-pubkey|(none)|9db62fb1|59920156|(none)|(none)").unwrap();

        assert_eq!(entry.epoch, "");
        assert_eq!(entry.architecture, "");
        assert_eq!(entry.source_rpm, "");
    }

    #[test]
    fn test_parse_query_line_rejects_bad_lines() {
        assert!(parse_query_line("warning: Generating 12 missing index(es), please wait...").is_none());
        assert!(parse_query_line("bash|(none)|4.4.23|1.fc28|x86_64").is_none());
        assert!(parse_query_line("|(none)|4.4.23|1.fc28|x86_64|(none)").is_none());
    }

    #[test]
    fn test_parse_query_output_skips_noise() {
        let output = "\
warning: Generating 12 missing index(es), please wait...
filesystem|(none)|3.2|18.el7|x86_64|filesystem-3.2-18.el7.src.rpm

centos-release|(none)|7|1.1503.el7.centos.2.8|x86_64|centos-release-7-1.1503.el7.centos.2.8.src.rpm
";

        let entries = parse_query_output(output);

        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].name, "filesystem");
        assert_eq!(entries[1].release, "1.1503.el7.centos.2.8");
    }

    #[test]
    fn test_parse_query_output_crlf() {
        let entries = parse_query_output("sed|(none)|4.5|1.fc28|x86_64|sed-4.5-1.fc28.src.rpm\r\n");
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].source_rpm, "sed-4.5-1.fc28.src.rpm");
    }

    #[tokio::test]
    async fn test_missing_database_dir_fails_to_stage() {
        let root = tempfile::tempdir().unwrap();
        let err = RpmQuery::default()
            .entries(&root.path().join("does-not-exist"))
            .await
            .unwrap_err();

        assert!(matches!(err, QueryError::Stage { .. }));
    }

    #[tokio::test]
    async fn test_missing_command() {
        let db = tempfile::tempdir().unwrap();
        std::fs::write(db.path().join("Packages"), b"").unwrap();

        let err = RpmQuery::new("rpmscan-no-such-binary")
            .entries(db.path())
            .await
            .unwrap_err();

        assert!(matches!(err, QueryError::CommandNotFound { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_stage_skips_symlinked_files() {
        let host = tempfile::tempdir().unwrap();
        std::fs::write(host.path().join("Packages"), b"host").unwrap();

        let db = tempfile::tempdir().unwrap();
        std::fs::write(db.path().join("Index"), b"image").unwrap();
        std::os::unix::fs::symlink(host.path().join("Packages"), db.path().join("Packages"))
            .unwrap();

        let staged = stage_database(db.path()).await.unwrap();

        assert!(staged.path().join("Index").is_file());
        assert!(!staged.path().join("Packages").exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_stage_rejects_symlinked_directory() {
        let host = tempfile::tempdir().unwrap();
        std::fs::write(host.path().join("Packages"), b"host").unwrap();

        let root = tempfile::tempdir().unwrap();
        let link = root.path().join("rpm");
        std::os::unix::fs::symlink(host.path(), &link).unwrap();

        let err = stage_database(&link).await.unwrap_err();

        assert!(matches!(err, QueryError::Stage { .. }));
    }
}
