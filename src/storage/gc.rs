//! Background collection of orphaned spill files.

use std::sync::Arc;
use std::time::Duration;
use tokio::time;
use tracing::{debug, info, warn};

use super::SpillDirectory;

/// Periodically removes spill files that no live LOB owns.
///
/// Files are normally deleted when their LOB is released. Files left behind by
/// a crashed process, or whose removal failed, are picked up here.
pub struct SpillCollector {
    directory: Arc<SpillDirectory>,
    interval: Duration,
}

impl SpillCollector {
    pub fn new(directory: Arc<SpillDirectory>, interval: Duration) -> Self {
        Self { directory, interval }
    }

    /// Starts the collection loop.
    pub async fn run(&self) {
        let mut interval = time::interval(self.interval);

        loop {
            interval.tick().await;
            if let Err(e) = self.collect().await {
                warn!("Spill collection failed: {}", e);
            }
        }
    }

    /// Performs a single collection pass and returns the number of files removed.
    pub async fn collect(&self) -> std::io::Result<usize> {
        debug!("Starting spill collection in {}", self.directory.root().display());
        let directory = Arc::clone(&self.directory);
        let removed = tokio::task::spawn_blocking(move || directory.collect_orphans())
            .await
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))??;
        if removed > 0 {
            info!("Removed {} orphaned spill files", removed);
        }
        Ok(removed)
    }
}
