//! Timestamped image log directories with bounded retention.
//!
//! Each session gets `<base>/<YYYYMMDDHHMMSS>/` with `proc` and `raw`
//! trees split into `pass` and `fail`. Only the newest
//! [`KEEP_DIRECTORIES`] session directories are kept.

use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tracing::{debug, info};

pub const KEEP_DIRECTORIES: usize = 4;

const TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S";

const SUBDIRECTORIES: [&str; 4] = ["proc/fail/A", "proc/pass/A", "raw/fail/A", "raw/pass/A"];

pub struct ImageLogDirs;

impl ImageLogDirs {
    /// Create the session directory for `now` and prune old ones.
    ///
    /// An existing directory with the same timestamp is reused. Returns the
    /// session directory path.
    pub fn prepare(base: &Path, now: DateTime<Utc>) -> io::Result<PathBuf> {
        let path = base.join(now.format(TIMESTAMP_FORMAT).to_string());
        if path.is_dir() {
            debug!("Reusing image log directory {}", path.display());
        } else {
            for sub in SUBDIRECTORIES {
                std::fs::create_dir_all(path.join(sub))?;
            }
            info!("Created image log directory {}", path.display());
        }

        let mut sessions = Self::sessions(base)?;
        while sessions.len() > KEEP_DIRECTORIES {
            let oldest = sessions.remove(0);
            info!("Removing old image log directory {}", oldest.display());
            std::fs::remove_dir_all(&oldest)?;
        }
        Ok(path)
    }

    /// Session directories under `base`, oldest first.
    pub fn sessions(base: &Path) -> io::Result<Vec<PathBuf>> {
        let mut sessions = Vec::new();
        for entry in std::fs::read_dir(base)? {
            let entry = entry?;
            let path = entry.path();
            let is_session = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(is_timestamp);
            if is_session && path.is_dir() {
                sessions.push(path);
            }
        }
        // Fixed-width timestamps sort chronologically
        sessions.sort();
        Ok(sessions)
    }
}

fn is_timestamp(name: &str) -> bool {
    name.len() == 14 && name.bytes().all(|b| b.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use tempfile::TempDir;

    fn at(seconds: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap() + Duration::seconds(seconds)
    }

    #[test]
    fn test_creates_layout() {
        let dir = TempDir::new().unwrap();
        let path = ImageLogDirs::prepare(dir.path(), at(0)).unwrap();

        assert_eq!(path, dir.path().join("20240301120000"));
        for sub in SUBDIRECTORIES {
            assert!(path.join(sub).is_dir(), "{sub}");
        }
    }

    #[test]
    fn test_keeps_at_most_four() {
        let dir = TempDir::new().unwrap();
        for i in 0..6 {
            ImageLogDirs::prepare(dir.path(), at(i)).unwrap();
        }

        let sessions = ImageLogDirs::sessions(dir.path()).unwrap();
        assert_eq!(sessions.len(), KEEP_DIRECTORIES);
        assert_eq!(sessions[0], dir.path().join("20240301120002"));
        assert_eq!(sessions[3], dir.path().join("20240301120005"));
    }

    #[test]
    fn test_same_second_reuses_directory() {
        let dir = TempDir::new().unwrap();
        let first = ImageLogDirs::prepare(dir.path(), at(0)).unwrap();
        std::fs::write(first.join("raw/pass/A/img.png"), b"x").unwrap();

        let second = ImageLogDirs::prepare(dir.path(), at(0)).unwrap();
        assert_eq!(first, second);
        assert!(second.join("raw/pass/A/img.png").exists());
        assert_eq!(ImageLogDirs::sessions(dir.path()).unwrap().len(), 1);
    }

    #[test]
    fn test_ignores_other_entries() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join("notes")).unwrap();
        std::fs::write(dir.path().join("20240101000000"), b"file").unwrap();

        ImageLogDirs::prepare(dir.path(), at(0)).unwrap();
        assert_eq!(ImageLogDirs::sessions(dir.path()).unwrap().len(), 1);
        assert!(dir.path().join("notes").is_dir());
    }
}
