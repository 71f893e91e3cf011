//! Per-file advisory locking with staleness-based theft.
//!
//! Uses `libc` for PID-liveness checks. A lock is a sidecar
//! `<file>.lock` JSON recording `{ pid, acquired_at_ms, mode }`. Acquisition
//! retries with capped exponential backoff; a lock recorded past the
//! staleness threshold whose holder process is no longer live may be stolen,
//! with ties between racing stealers broken deterministically by comparing
//! PIDs (lowest PID wins).

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::errors::StoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    Shared,
    Exclusive,
}

impl LockMode {
    fn as_str(&self) -> &'static str {
        match self {
            LockMode::Shared => "shared",
            LockMode::Exclusive => "exclusive",
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct LockInfo {
    pid: u32,
    acquired_at_ms: u64,
    mode: String,
}

/// Tuning knobs for acquisition.
#[derive(Debug, Clone, Copy)]
pub struct LockPolicy {
    pub base_backoff: Duration,
    pub max_backoff: Duration,
    pub timeout: Duration,
    pub stale_after: Duration,
}

impl Default for LockPolicy {
    fn default() -> Self {
        LockPolicy {
            base_backoff: Duration::from_millis(50),
            max_backoff: Duration::from_secs(2),
            timeout: Duration::from_secs(5),
            stale_after: Duration::from_secs(60),
        }
    }
}

/// Held lock; removes its sidecar file on drop if we're still the recorded
/// holder (avoids deleting a lock someone else has since stolen from us).
pub struct LockGuard {
    path: PathBuf,
    pid: u32,
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if let Ok(info) = read_lock_info(&self.path) {
            if info.pid == self.pid {
                let _ = fs::remove_file(&self.path);
            }
        }
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

fn is_pid_alive(pid: u32) -> bool {
    // signal 0: no signal sent, just existence/permission checked.
    unsafe { libc::kill(pid as libc::pid_t, 0) == 0 || *libc::__errno_location() == libc::EPERM }
}

fn read_lock_info(path: &Path) -> std::io::Result<LockInfo> {
    let content = fs::read_to_string(path)?;
    serde_json::from_str(&content)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
}

fn lock_content(pid: u32, mode: LockMode) -> Vec<u8> {
    let info = LockInfo {
        pid,
        acquired_at_ms: now_ms(),
        mode: mode.as_str().to_string(),
    };
    serde_json::to_vec(&info).expect("LockInfo serializes")
}

/// Overwrite the lock file via temp-then-rename in the same directory, the
/// same atomic-write discipline the store uses for item records.
fn write_lock_atomic(path: &Path, pid: u32, mode: LockMode) -> std::io::Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let tmp_name = format!(
        ".{}.tmp-{}",
        path.file_name().unwrap_or_default().to_string_lossy(),
        std::process::id()
    );
    let tmp_path = dir.join(tmp_name);
    {
        let mut f = File::create(&tmp_path)?;
        f.write_all(&lock_content(pid, mode))?;
        f.sync_all()?;
    }
    fs::rename(&tmp_path, path)?;
    Ok(())
}

/// Acquire a scoped lock on `lock_path`, creating it if absent, stealing it
/// if stale and the holder is dead, otherwise retrying with backoff until
/// `policy.timeout` elapses.
pub fn acquire(lock_path: &Path, mode: LockMode, policy: LockPolicy) -> Result<LockGuard, StoreError> {
    let my_pid = std::process::id();
    let start = Instant::now();
    let mut backoff = policy.base_backoff;
    let mut steal_contests = 0u8;

    loop {
        match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(lock_path)
        {
            Ok(mut file) => {
                file.write_all(&lock_content(my_pid, mode)).map_err(|e| StoreError::Io {
                    path: lock_path.to_path_buf(),
                    source: e,
                })?;
                return Ok(LockGuard {
                    path: lock_path.to_path_buf(),
                    pid: my_pid,
                });
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                if let Ok(info) = read_lock_info(lock_path) {
                    let age_ms = now_ms().saturating_sub(info.acquired_at_ms);
                    let stale = age_ms as u128 > policy.stale_after.as_millis()
                        && !is_pid_alive(info.pid);
                    if stale && steal_contests < 3 {
                        steal_contests += 1;
                        if write_lock_atomic(lock_path, my_pid, mode).is_ok() {
                            // Re-read: if a concurrent stealer overwrote us,
                            // the lower PID is the deterministic winner.
                            if let Ok(after) = read_lock_info(lock_path) {
                                if after.pid == my_pid {
                                    return Ok(LockGuard {
                                        path: lock_path.to_path_buf(),
                                        pid: my_pid,
                                    });
                                }
                                if after.pid < my_pid {
                                    // We lost the contest; fall through to backoff.
                                } else {
                                    continue; // contest again immediately, bounded by steal_contests
                                }
                            }
                        }
                    }
                }
                // Corrupt, not-stale, or lost-contest: back off and retry.
            }
            Err(e) => {
                return Err(StoreError::Io {
                    path: lock_path.to_path_buf(),
                    source: e,
                });
            }
        }

        if start.elapsed() >= policy.timeout {
            return Err(StoreError::LockTimeout {
                path: lock_path.to_path_buf(),
                mode: mode.as_str(),
                timeout_ms: policy.timeout.as_millis() as u64,
            });
        }
        std::thread::sleep(backoff.min(policy.timeout.saturating_sub(start.elapsed())));
        backoff = (backoff * 2).min(policy.max_backoff);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn fast_policy() -> LockPolicy {
        LockPolicy {
            base_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(5),
            timeout: Duration::from_millis(200),
            stale_after: Duration::from_millis(10),
        }
    }

    #[test]
    fn acquire_creates_lock_file_and_drop_removes_it() {
        let dir = tempfile::tempdir().unwrap();
        let lock_path = dir.path().join("item.json.lock");
        {
            let _guard = acquire(&lock_path, LockMode::Exclusive, fast_policy()).unwrap();
            assert!(lock_path.exists());
        }
        assert!(!lock_path.exists());
    }

    #[test]
    fn acquire_times_out_against_a_live_holder() {
        let dir = tempfile::tempdir().unwrap();
        let lock_path = dir.path().join("item.json.lock");
        // Simulate a live holder: our own pid, so liveness check says alive.
        write_lock_atomic(&lock_path, std::process::id(), LockMode::Exclusive).unwrap();

        let result = acquire(&lock_path, LockMode::Exclusive, fast_policy());
        assert!(matches!(result, Err(StoreError::LockTimeout { .. })));
    }

    #[test]
    fn acquire_steals_a_stale_lock_from_a_dead_pid() {
        let dir = tempfile::tempdir().unwrap();
        let lock_path = dir.path().join("item.json.lock");
        // A PID essentially guaranteed not to be alive in any test sandbox.
        let dead_pid = 999_999u32;
        let stale_info = LockInfo {
            pid: dead_pid,
            acquired_at_ms: 0, // ancient
            mode: "exclusive".into(),
        };
        fs::write(&lock_path, serde_json::to_vec(&stale_info).unwrap()).unwrap();

        let guard = acquire(&lock_path, LockMode::Exclusive, fast_policy()).unwrap();
        assert_eq!(guard.pid, std::process::id());
    }
}
