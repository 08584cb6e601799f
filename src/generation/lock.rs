//! Single-writer lock for a generation store.

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use chrono::Utc;

use crate::error::{IndexError, IndexResult, IoResultExt};

pub const LOCK_FILE: &str = ".build.lock";

/// Held for the duration of a build or rollback; released on drop.
///
/// The lock file is created with create-new semantics, so only one
/// holder can exist per store root. The file records the holder's pid;
/// a lock whose process is gone is taken over on the next acquire.
#[derive(Debug)]
pub struct BuildLock {
    path: PathBuf,
}

impl BuildLock {
    /// Takes the lock under `root`, creating `root` if needed.
    ///
    /// # Errors
    /// `BuildLocked` naming the current holder if the lock is taken.
    pub fn acquire(root: &Path) -> IndexResult<Self> {
        fs::create_dir_all(root).write_context(root)?;
        let path = root.join(LOCK_FILE);

        match Self::create(&path) {
            Err(IndexError::BuildLocked { path, holder }) if !holder_alive(&holder) => {
                tracing::warn!(
                    path = %path.display(),
                    holder = %holder,
                    "taking over build lock left by a dead process"
                );
                // Only remove the file we inspected; a new holder may have raced us.
                if read_holder(&path).as_deref() == Some(holder.as_str()) {
                    match fs::remove_file(&path) {
                        Err(e) if e.kind() != ErrorKind::NotFound => {
                            return Err(IndexError::FileWrite { path, source: e });
                        }
                        _ => {}
                    }
                }
                Self::create(&path)
            }
            other => other,
        }
    }

    fn create(path: &Path) -> IndexResult<Self> {
        let mut file = match OpenOptions::new().write(true).create_new(true).open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                let holder = read_holder(path).unwrap_or_else(|| "unknown holder".to_string());
                return Err(IndexError::BuildLocked {
                    path: path.to_path_buf(),
                    holder,
                });
            }
            Err(source) => {
                return Err(IndexError::FileWrite {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };

        let holder = format!("pid={} started={}", std::process::id(), Utc::now().to_rfc3339());
        // Remove the file again if we cannot record ourselves in it.
        let lock = Self {
            path: path.to_path_buf(),
        };
        file.write_all(holder.as_bytes()).write_context(&lock.path)?;
        file.sync_all().write_context(&lock.path)?;

        tracing::debug!(path = %lock.path.display(), "acquired build lock");
        Ok(lock)
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for BuildLock {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            tracing::warn!(path = %self.path.display(), error = %e, "failed to release build lock");
        }
    }
}

fn read_holder(path: &Path) -> Option<String> {
    fs::read_to_string(path).ok().map(|s| s.trim().to_string())
}

fn holder_pid(holder: &str) -> Option<u32> {
    holder
        .split_whitespace()
        .find_map(|field| field.strip_prefix("pid="))
        .and_then(|pid| pid.parse().ok())
}

/// Whether the process named in a lock file may still be running.
///
/// Unparseable holders and platforms without `/proc` count as alive.
fn holder_alive(holder: &str) -> bool {
    match holder_pid(holder) {
        Some(pid) if pid == std::process::id() => true,
        Some(pid) => process_exists(pid),
        None => true,
    }
}

#[cfg(target_os = "linux")]
fn process_exists(pid: u32) -> bool {
    Path::new("/proc").join(pid.to_string()).exists()
}

#[cfg(not(target_os = "linux"))]
fn process_exists(_pid: u32) -> bool {
    true
}
