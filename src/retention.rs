//! Backup retention sweep
//!
//! Runs synchronously inside the rotation step, never concurrently with
//! itself. Keeps the newest `max_backups` files matching the logical path's
//! rotation-suffix pattern and deletes the rest, oldest first.

use crate::{Error, Result};
use chrono::NaiveDateTime;
use std::fs;
use std::path::{Path, PathBuf};

/// Timestamp suffix appended to rotated files (sortable, second precision).
pub const BACKUP_TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S";

/// One enumerated backup file. Files whose suffix fails to parse carry no
/// timestamp and are treated as the oldest, so malformed files are deleted
/// first instead of accumulating.
#[derive(Debug, Clone, PartialEq, Eq)]
struct BackupFile {
    time: Option<NaiveDateTime>,
    path: PathBuf,
}

impl BackupFile {
    fn sort_key(&self) -> (Option<NaiveDateTime>, &Path) {
        // None orders before Some, and equal timestamps fall back to the
        // path, lexicographically.
        (self.time, &self.path)
    }
}

/// Outcome of one completed sweep.
#[derive(Debug, Default, Clone, Copy)]
pub struct SweepReport {
    /// Backup files found matching the pattern.
    pub examined: usize,
    /// Files deleted this pass.
    pub removed: usize,
}

/// Deletes backups beyond the retention count after each rotation.
pub struct RetentionSweeper {
    base_path: PathBuf,
    max_backups: usize,
}

impl RetentionSweeper {
    pub fn new(base_path: impl Into<PathBuf>, max_backups: usize) -> Self {
        Self {
            base_path: base_path.into(),
            max_backups,
        }
    }

    /// Enumerate backups and delete the oldest until `max_backups` remain.
    ///
    /// A delete failure for one file does not stop the pass; the last error
    /// encountered is reported after every candidate has been attempted.
    /// `max_backups == 0` disables the sweep.
    pub fn sweep(&self) -> Result<SweepReport> {
        let mut report = SweepReport::default();
        if self.max_backups == 0 {
            return Ok(report);
        }

        let mut backups = self.enumerate()?;
        report.examined = backups.len();
        if backups.len() <= self.max_backups {
            return Ok(report);
        }

        backups.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
        let excess = backups.len() - self.max_backups;

        let mut last_err = None;
        for backup in &backups[..excess] {
            match fs::remove_file(&backup.path) {
                Ok(()) => report.removed += 1,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    tracing::warn!(
                        file = %backup.path.display(),
                        error = %e,
                        "failed to remove expired backup"
                    );
                    last_err = Some((backup.path.clone(), e));
                }
            }
        }

        if let Some((path, e)) = last_err {
            return Err(Error::Retention {
                message: format!("removing {}: {}", path.display(), e),
            });
        }

        tracing::debug!(
            examined = report.examined,
            removed = report.removed,
            "retention sweep completed"
        );
        Ok(report)
    }

    /// All siblings of the logical path named `{file_name}.{suffix}`.
    fn enumerate(&self) -> Result<Vec<BackupFile>> {
        let dir = self.base_path.parent().unwrap_or(Path::new("."));
        let Some(file_name) = self.base_path.file_name().and_then(|n| n.to_str()) else {
            return Ok(Vec::new());
        };
        let prefix = format!("{file_name}.");

        let mut backups = Vec::new();
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            let Some(suffix) = name.strip_prefix(&prefix) else {
                continue;
            };
            if suffix.is_empty() {
                continue;
            }
            backups.push(BackupFile {
                time: NaiveDateTime::parse_from_str(suffix, BACKUP_TIMESTAMP_FORMAT).ok(),
                path: entry.path(),
            });
        }
        Ok(backups)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn touch(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, name).unwrap();
        path
    }

    #[test]
    fn test_keeps_newest_backups() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "app.log.20260101000000");
        touch(dir.path(), "app.log.20260102000000");
        touch(dir.path(), "app.log.20260103000000");
        touch(dir.path(), "app.log.20260104000000");

        let sweeper = RetentionSweeper::new(dir.path().join("app.log"), 2);
        let report = sweeper.sweep().unwrap();

        assert_eq!(report.examined, 4);
        assert_eq!(report.removed, 2);
        assert!(!dir.path().join("app.log.20260101000000").exists());
        assert!(!dir.path().join("app.log.20260102000000").exists());
        assert!(dir.path().join("app.log.20260103000000").exists());
        assert!(dir.path().join("app.log.20260104000000").exists());
    }

    #[test]
    fn test_under_limit_removes_nothing() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "app.log.20260101000000");

        let sweeper = RetentionSweeper::new(dir.path().join("app.log"), 3);
        let report = sweeper.sweep().unwrap();
        assert_eq!(report.examined, 1);
        assert_eq!(report.removed, 0);
    }

    #[test]
    fn test_malformed_suffix_deleted_first() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "app.log.garbage");
        touch(dir.path(), "app.log.20260101000000");
        touch(dir.path(), "app.log.20260102000000");

        let sweeper = RetentionSweeper::new(dir.path().join("app.log"), 1);
        let report = sweeper.sweep().unwrap();

        assert_eq!(report.removed, 2);
        assert!(!dir.path().join("app.log.garbage").exists());
        assert!(!dir.path().join("app.log.20260101000000").exists());
        assert!(dir.path().join("app.log.20260102000000").exists());
    }

    #[test]
    fn test_ignores_unrelated_files() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "other.log.20260101000000");
        touch(dir.path(), "app.log.20260101000000");
        touch(dir.path(), "app.log.20260102000000");

        let sweeper = RetentionSweeper::new(dir.path().join("app.log"), 1);
        let report = sweeper.sweep().unwrap();

        assert_eq!(report.examined, 2);
        assert_eq!(report.removed, 1);
        assert!(dir.path().join("other.log.20260101000000").exists());
    }

    #[test]
    fn test_zero_max_backups_disables_sweep() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "app.log.20260101000000");
        touch(dir.path(), "app.log.20260102000000");

        let sweeper = RetentionSweeper::new(dir.path().join("app.log"), 0);
        let report = sweeper.sweep().unwrap();
        assert_eq!(report.removed, 0);
        assert!(dir.path().join("app.log.20260101000000").exists());
    }

    #[test]
    fn test_sort_key_orders_missing_time_first_and_ties_by_path() {
        let t = NaiveDateTime::parse_from_str("20260101000000", BACKUP_TIMESTAMP_FORMAT).ok();
        let malformed = BackupFile {
            time: None,
            path: PathBuf::from("z/app.log.garbage"),
        };
        let a = BackupFile {
            time: t,
            path: PathBuf::from("a/app.log.20260101000000"),
        };
        let b = BackupFile {
            time: t,
            path: PathBuf::from("b/app.log.20260101000000"),
        };

        let mut files = vec![b.clone(), malformed.clone(), a.clone()];
        files.sort_by(|x, y| x.sort_key().cmp(&y.sort_key()));
        assert_eq!(files, vec![malformed, a, b]);
    }
}
