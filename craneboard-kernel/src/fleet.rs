//! Cache partagé de la flotte : liste complète remplacée à chaque refresh
//! API, patchée entre-temps par la télémétrie. Un échec garde l'ancienne liste.

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::api::CraneSource;
use crate::poller::{spawn_periodic, PollHandle};
use crate::state::{CraneCache, Shared};

pub fn spawn_crane_refresh(
    source: Arc<dyn CraneSource>,
    limit: u32,
    cache: Shared<CraneCache>,
    period: Duration,
) -> PollHandle {
    spawn_periodic("fleet-refresh", period, move || {
        let source = source.clone();
        let cache = cache.clone();
        async move {
            match source.list_cranes(limit).await {
                Ok(cranes) => {
                    debug!("fleet refreshed: {} cranes", cranes.len());
                    *cache.lock() = cranes;
                }
                Err(e) => warn!("fleet refresh failed, keeping {} cached cranes: {}", cache.lock().len(), e),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ApiError;
    use crate::models::{Crane, CraneAnalytics};
    use crate::state::new_state;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Premier appel OK (2 grues), ensuite en échec
    struct FlakySource {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl CraneSource for FlakySource {
        async fn list_cranes(&self, limit: u32) -> Result<Vec<Crane>, ApiError> {
            assert_eq!(limit, 25);
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                Ok(vec![Crane::new("TC-1"), Crane::new("TC-2")])
            } else {
                Err(ApiError::Decode("down".into()))
            }
        }

        async fn crane_analytics(&self, crane: &Crane) -> CraneAnalytics {
            CraneAnalytics::empty_for(crane)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_refresh_keeps_cache() {
        let source = Arc::new(FlakySource { calls: AtomicUsize::new(0) });
        let cache = new_state(CraneCache::new());
        let handle = spawn_crane_refresh(source.clone(), 25, cache.clone(), Duration::from_secs(10));

        tokio::time::sleep(Duration::from_secs(15)).await;
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
        assert_eq!(cache.lock().len(), 2);
        handle.stop().await;
    }
}
