//! Time-rotated log file with retention and a stable alias
//!
//! Files are named `{prefix}.%Y%m%d%H%M` after the local start time of their
//! period. Periods are aligned to multiples of the rotation interval since the
//! Unix epoch, so hourly files always start on the hour. On Unix a symlink
//! named `{prefix}` points at the current file. Whenever a new file is opened,
//! files with the same prefix whose mtime is older than the retention age are
//! deleted.
//!
//! [`RotatingFile`] is a cheap handle around shared state and can be passed to
//! `tracing_subscriber` as a writer.
//!
//! Nothing in here may emit tracing events: this type is the subscriber's
//! output, and logging from inside a write would re-enter it.

use crate::{CoreError, Result};
use chrono::{DateTime, Local, Utc};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, SystemTime};

/// Default rotation interval (1 hour)
pub const DEFAULT_ROTATION_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Default retention age for rotated files (48 hours)
pub const DEFAULT_MAX_AGE: Duration = Duration::from_secs(48 * 60 * 60);

/// When to rotate and how long to keep old files
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RotationPolicy {
    /// Length of one file's period
    pub interval: Duration,
    /// Files whose mtime is older than this are deleted on rotation
    pub max_age: Duration,
}

impl Default for RotationPolicy {
    fn default() -> Self {
        Self {
            interval: DEFAULT_ROTATION_INTERVAL,
            max_age: DEFAULT_MAX_AGE,
        }
    }
}

/// Shared handle to the rotating log file
#[derive(Debug, Clone)]
pub struct RotatingFile {
    inner: Arc<Mutex<Inner>>,
}

#[derive(Debug)]
struct Inner {
    dir: PathBuf,
    prefix: String,
    policy: RotationPolicy,
    /// Start of the current period, in seconds since the epoch
    period: i64,
    path: PathBuf,
    file: File,
}

impl RotatingFile {
    /// Open (or create) the file for the current period in `dir`
    ///
    /// Fails with [`CoreError::Sink`] if the directory or file cannot be
    /// created, and with [`CoreError::ConfigurationError`] for an invalid
    /// prefix or a zero interval.
    pub fn open(dir: impl Into<PathBuf>, prefix: impl Into<String>, policy: RotationPolicy) -> Result<Self> {
        Self::open_at(dir, prefix, policy, Utc::now())
    }

    /// Like [`RotatingFile::open`] with an explicit clock reading
    pub fn open_at(
        dir: impl Into<PathBuf>,
        prefix: impl Into<String>,
        policy: RotationPolicy,
        now: DateTime<Utc>,
    ) -> Result<Self> {
        let dir = dir.into();
        let prefix = prefix.into();

        if prefix.is_empty() || prefix.contains(['/', '\\']) {
            return Err(CoreError::ConfigurationError(format!(
                "Invalid log file prefix '{prefix}'"
            )));
        }
        if policy.interval.as_secs() == 0 {
            return Err(CoreError::ConfigurationError(
                "Rotation interval must be at least one second".to_string(),
            ));
        }

        fs::create_dir_all(&dir).map_err(|e| {
            CoreError::Sink(format!("Failed to create log directory {}: {}", dir.display(), e))
        })?;

        let period = period_start(now, policy.interval);
        let path = dir.join(period_file_name(&prefix, period));
        let file = open_append(&path)
            .map_err(|e| CoreError::Sink(format!("Failed to open {}: {}", path.display(), e)))?;

        let inner = Inner {
            dir,
            prefix,
            policy,
            period,
            path,
            file,
        };
        // The alias and pruning are best-effort; the file itself is what must open.
        let _ = inner.update_link();
        let _ = inner.prune(now);

        Ok(Self {
            inner: Arc::new(Mutex::new(inner)),
        })
    }

    /// Path of the file currently being written
    pub fn current_path(&self) -> PathBuf {
        self.lock().path.clone()
    }

    /// Path of the stable alias pointing at the current file
    pub fn link_path(&self) -> PathBuf {
        let inner = self.lock();
        inner.dir.join(&inner.prefix)
    }

    /// Write `buf`, rotating first if `now` falls in a new period
    pub fn write_at(&self, buf: &[u8], now: DateTime<Utc>) -> io::Result<usize> {
        let mut inner = self.lock();
        let period = period_start(now, inner.policy.interval);
        if period != inner.period {
            inner.rotate(period, now)?;
        }
        inner.file.write_all(buf)?;
        Ok(buf.len())
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl Inner {
    fn rotate(&mut self, period: i64, now: DateTime<Utc>) -> io::Result<()> {
        let path = self.dir.join(period_file_name(&self.prefix, period));
        let file = open_append(&path)?;
        let _ = self.file.flush();

        self.file = file;
        self.path = path;
        self.period = period;

        let _ = self.update_link();
        let _ = self.prune(now);
        Ok(())
    }

    #[cfg(unix)]
    fn update_link(&self) -> io::Result<()> {
        let link = self.dir.join(&self.prefix);
        let tmp = self.dir.join(format!(".{}.link", self.prefix));
        let target = self
            .path
            .file_name()
            .map(PathBuf::from)
            .unwrap_or_else(|| self.path.clone());

        let _ = fs::remove_file(&tmp);
        std::os::unix::fs::symlink(&target, &tmp)?;
        fs::rename(&tmp, &link)
    }

    #[cfg(not(unix))]
    fn update_link(&self) -> io::Result<()> {
        Ok(())
    }

    /// Delete rotated files older than the retention age
    fn prune(&self, now: DateTime<Utc>) -> io::Result<usize> {
        let cutoff = match SystemTime::from(now).checked_sub(self.policy.max_age) {
            Some(cutoff) => cutoff,
            None => return Ok(0),
        };
        let rotated_prefix = format!("{}.", self.prefix);

        let mut removed = 0;
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            let path = entry.path();
            if path == self.path {
                continue;
            }
            let is_ours = entry
                .file_name()
                .to_str()
                .is_some_and(|name| name.starts_with(&rotated_prefix));
            if !is_ours {
                continue;
            }

            let metadata = match fs::symlink_metadata(&path) {
                Ok(metadata) if metadata.is_file() => metadata,
                _ => continue,
            };
            if metadata.modified().is_ok_and(|mtime| mtime < cutoff) && fs::remove_file(&path).is_ok() {
                removed += 1;
            }
        }
        Ok(removed)
    }
}

impl Write for RotatingFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.write_at(buf, Utc::now())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.lock().file.flush()
    }
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for RotatingFile {
    type Writer = RotatingFile;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

fn open_append(path: &Path) -> io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}

fn period_start(now: DateTime<Utc>, interval: Duration) -> i64 {
    let step = i64::try_from(interval.as_secs()).unwrap_or(i64::MAX).max(1);
    let secs = now.timestamp();
    secs - secs.rem_euclid(step)
}

fn period_file_name(prefix: &str, period: i64) -> String {
    let stamp = DateTime::from_timestamp(period, 0)
        .map(|start| start.with_timezone(&Local).format("%Y%m%d%H%M").to_string())
        .unwrap_or_else(|| period.to_string());
    format!("{prefix}.{stamp}")
}
