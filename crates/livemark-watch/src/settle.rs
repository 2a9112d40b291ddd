use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// Tracks write activity per path and reports paths whose writes have
/// settled: no further activity for the threshold duration. A burst of
/// writes therefore collapses into one settled notification.
#[derive(Debug)]
pub(crate) struct WriteSettle {
    pending: HashMap<PathBuf, Instant>,
    threshold: Duration,
}

impl WriteSettle {
    pub(crate) fn new(threshold: Duration) -> Self {
        Self {
            pending: HashMap::new(),
            threshold,
        }
    }

    /// Record write activity, restarting the settle clock for `path`.
    pub(crate) fn record(&mut self, path: PathBuf) {
        self.pending.insert(path, Instant::now());
    }

    pub(crate) fn forget(&mut self, path: &Path) {
        self.pending.remove(path);
    }

    /// Take every path whose last write is older than the threshold.
    pub(crate) fn take_settled(&mut self) -> Vec<PathBuf> {
        let now = Instant::now();
        let mut settled = Vec::new();
        self.pending.retain(|path, last_write| {
            if now.duration_since(*last_write) >= self.threshold {
                settled.push(path.clone());
                false
            } else {
                true
            }
        });
        settled
    }

    #[cfg(test)]
    pub(crate) fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }
}
