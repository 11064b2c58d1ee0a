//! Plain-text invocation counter kept next to the compilation cache.
//!
//! Bookkeeping only: failures are logged and never fail a request.

use std::path::{Path, PathBuf};

use tokio::sync::Mutex;
use tracing::{info, warn};

const COUNTER_FILE: &str = "invocations.txt";

#[derive(Debug)]
pub struct InvocationCounter {
    path: PathBuf,
    lock: Mutex<()>,
}

impl InvocationCounter {
    pub fn new(cache_dir: impl AsRef<Path>) -> Self {
        Self {
            path: cache_dir.as_ref().join(COUNTER_FILE),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Increment the counter and return the new value, or `None` if the
    /// file could not be updated.
    pub async fn increment(&self) -> Option<u64> {
        let _guard = self.lock.lock().await;

        let current = match tokio::fs::read_to_string(&self.path).await {
            Ok(text) => text.trim().parse::<u64>().unwrap_or_else(|_| {
                warn!(path = %self.path.display(), "invocation counter is corrupt, restarting at 0");
                0
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => 0,
            Err(e) => {
                warn!(path = %self.path.display(), "failed to read invocation counter: {e}");
                return None;
            }
        };
        let next = current + 1;

        if let Some(dir) = self.path.parent() {
            if let Err(e) = tokio::fs::create_dir_all(dir).await {
                warn!(dir = %dir.display(), "failed to create cache dir: {e}");
                return None;
            }
        }
        if let Err(e) = tokio::fs::write(&self.path, next.to_string()).await {
            warn!(path = %self.path.display(), "failed to write invocation counter: {e}");
            return None;
        }

        info!(invocation = next, "invocation recorded");
        Some(next)
    }
}
