use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::observability::WAL_COMPACTIONS_TOTAL;
use crate::store::{Store, StoreError};

const CHECK_INTERVAL: Duration = Duration::from_secs(30);

/// Compact once the WAL holds at least `threshold` appends since the last compaction.
/// Returns whether a compaction ran.
pub async fn compact_if_needed(store: &Store, threshold: u64) -> Result<bool, StoreError> {
    let appends = store.wal_appends_since_compact().await;
    if appends < threshold {
        debug!(appends, threshold, "WAL below compaction threshold");
        return Ok(false);
    }
    store.compact_wal().await?;
    info!(appends, "WAL compacted");
    Ok(true)
}

/// Background task checking the WAL every 30 seconds.
pub async fn run_compactor(store: Arc<Store>, threshold: u64) {
    let mut interval = tokio::time::interval(CHECK_INTERVAL);
    loop {
        interval.tick().await;
        match compact_if_needed(&store, threshold).await {
            Ok(true) => metrics::counter!(WAL_COMPACTIONS_TOTAL, "status" => "ok").increment(1),
            Ok(false) => {}
            Err(e) => {
                metrics::counter!(WAL_COMPACTIONS_TOTAL, "status" => "error").increment(1);
                warn!("WAL compaction failed: {e}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ulid::Ulid;

    fn test_wal_path(name: &str) -> std::path::PathBuf {
        let dir = std::env::temp_dir().join("venuebook_test_compactor");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        let _ = std::fs::remove_file(&path);
        path
    }

    #[tokio::test]
    async fn compacts_only_past_threshold() {
        let path = test_wal_path("threshold.wal");
        let store = Store::open(path.clone()).unwrap();
        for i in 0..3 {
            let id = Ulid::new();
            store.create_venue(id, format!("Temp {i}")).await.unwrap();
            store.delete_venue(id).await.unwrap();
        }

        assert!(!compact_if_needed(&store, 10).await.unwrap());
        assert_eq!(store.wal_appends_since_compact().await, 6);

        assert!(compact_if_needed(&store, 6).await.unwrap());
        assert_eq!(store.wal_appends_since_compact().await, 0);
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 0);
    }
}
