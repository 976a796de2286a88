use anyhow::{anyhow, Context, Result};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Persisted counter state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct QuotaState {
    month: String,
    count: u64,
}

/// Monthly limit on tiles fetched from the provider
///
/// The counter is stored as JSON and starts again at zero when the
/// calendar month changes.
pub struct FetchQuota {
    path: PathBuf,
    limit: Option<u64>,
    state: Mutex<QuotaState>,
}

fn current_month() -> String {
    chrono::Local::now().format("%Y-%m").to_string()
}

impl FetchQuota {
    /// Load the quota file, starting a fresh counter if it does not exist yet
    pub fn load<P: AsRef<Path>>(path: P, limit: Option<u64>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let state = if path.exists() {
            let text = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read quota file {}", path.display()))?;
            match serde_json::from_str(&text) {
                Ok(state) => state,
                Err(e) => {
                    warn!("Resetting unreadable quota file {}: {}", path.display(), e);
                    QuotaState { month: current_month(), count: 0 }
                }
            }
        } else {
            QuotaState { month: current_month(), count: 0 }
        };

        Ok(Self {
            path,
            limit,
            state: Mutex::new(state),
        })
    }

    pub fn limit(&self) -> Option<u64> {
        self.limit
    }

    /// Fetches recorded for the stored month
    pub fn used(&self) -> Result<u64> {
        let state = self.state.lock().map_err(|_| anyhow!("Quota lock poisoned"))?;
        Ok(state.count)
    }

    /// Reserve one fetch in the current month
    /// Returns false when the limit has been reached
    pub fn try_acquire(&self) -> Result<bool> {
        self.try_acquire_in(&current_month())
    }

    /// Reserve one fetch in `month` (formatted `YYYY-MM`)
    pub fn try_acquire_in(&self, month: &str) -> Result<bool> {
        let mut state = self.state.lock().map_err(|_| anyhow!("Quota lock poisoned"))?;

        if state.month != month {
            info!("New quota month {}, {} fetches used in {}", month, state.count, state.month);
            state.month = month.to_string();
            state.count = 0;
        }

        if let Some(limit) = self.limit {
            if state.count >= limit {
                return Ok(false);
            }
        }

        state.count += 1;
        self.persist(&state)?;
        Ok(true)
    }

    fn persist(&self, state: &QuotaState) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)
                    .context("Failed to create quota directory")?;
            }
        }
        let json = serde_json::to_string_pretty(state)
            .context("Failed to serialize quota")?;
        fs::write(&self.path, json)
            .with_context(|| format!("Failed to write quota file {}", self.path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limit_is_enforced() {
        let dir = tempfile::tempdir().unwrap();
        let quota = FetchQuota::load(dir.path().join("quota.json"), Some(2)).unwrap();

        assert!(quota.try_acquire_in("2026-10").unwrap());
        assert!(quota.try_acquire_in("2026-10").unwrap());
        assert!(!quota.try_acquire_in("2026-10").unwrap());
        assert_eq!(quota.used().unwrap(), 2);
    }

    #[test]
    fn test_counter_resets_each_month() {
        let dir = tempfile::tempdir().unwrap();
        let quota = FetchQuota::load(dir.path().join("quota.json"), Some(1)).unwrap();

        assert!(quota.try_acquire_in("2026-10").unwrap());
        assert!(!quota.try_acquire_in("2026-10").unwrap());
        assert!(quota.try_acquire_in("2026-11").unwrap());
    }

    #[test]
    fn test_counter_survives_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("quota.json");

        let quota = FetchQuota::load(&path, None).unwrap();
        for _ in 0..3 {
            assert!(quota.try_acquire_in("2026-10").unwrap());
        }
        drop(quota);

        let reloaded = FetchQuota::load(&path, Some(4)).unwrap();
        assert_eq!(reloaded.used().unwrap(), 3);
        assert!(reloaded.try_acquire_in("2026-10").unwrap());
        assert!(!reloaded.try_acquire_in("2026-10").unwrap());
    }

    #[test]
    fn test_corrupt_file_starts_over() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("quota.json");
        fs::write(&path, "not json").unwrap();

        let quota = FetchQuota::load(&path, None).unwrap();
        assert_eq!(quota.used().unwrap(), 0);
    }
}
