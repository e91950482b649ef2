use std::sync::Arc;

use chrono::Utc;
use futures::future::join_all;
use serde_json::Map;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::config::SourceConfig;
use crate::error::{BuildError, FetchError, StoreError};
use crate::fetcher::SourceFetcher;
use crate::store::{Item, Pack, PackStore};

/// Runs refreshes: fetch every source, apply the pack policy, and persist.
///
/// Builds are serialized on an internal lock so an older, slower build can
/// never overwrite the result of a newer one.
pub struct PackBuilder {
    fetcher: Arc<dyn SourceFetcher>,
    store: Arc<PackStore>,
    build_lock: Mutex<()>,
}

impl PackBuilder {
    pub fn new(fetcher: Arc<dyn SourceFetcher>, store: Arc<PackStore>) -> Self {
        Self {
            fetcher,
            store,
            build_lock: Mutex::new(()),
        }
    }

    pub fn is_refreshing(&self) -> bool {
        self.build_lock.try_lock().is_err()
    }

    pub async fn build(&self, config: &SourceConfig) -> Result<Pack, BuildError> {
        let _guard = self.build_lock.lock().await;
        info!(
            "Building pack from {} sources (limit={}, window={})",
            config.sources.len(),
            config.limit,
            config.window
        );

        let extras = self.previous_extras().await?;

        let results = self.fetch_all(config).await;
        let failed = results.iter().filter(|(_, r)| r.is_err()).count();
        let items = apply_policy(collect_successes(results), config.limit);

        let pack = Pack {
            updated_at: Some(Utc::now()),
            items,
            extras,
        };

        self.store.save(&pack).await.map_err(BuildError::Persist)?;

        info!(
            "Pack built with {} items ({} of {} sources failed)",
            pack.items.len(),
            failed,
            config.sources.len()
        );
        Ok(pack)
    }

    /// Fetch all sources concurrently. Results come back in configured order
    /// regardless of which request finished first.
    async fn fetch_all(
        &self,
        config: &SourceConfig,
    ) -> Vec<(String, Result<Vec<Item>, FetchError>)> {
        let fetches = config.sources.iter().map(|source| async move {
            let result = self
                .fetcher
                .fetch(source, config.limit, config.window)
                .await;
            (source.clone(), result)
        });

        join_all(fetches).await
    }

    /// Fields owned by other subsystems, carried over from the current
    /// document. An unreadable document aborts the build rather than being
    /// overwritten without them.
    async fn previous_extras(&self) -> Result<Map<String, serde_json::Value>, BuildError> {
        match self.store.load_extras().await {
            Ok(extras) => Ok(extras),
            Err(StoreError::NotFound(_)) => Ok(Map::new()),
            Err(e) => Err(BuildError::Load(e)),
        }
    }
}

/// Concatenate the items of every source that succeeded, in the given order.
/// Failed sources are logged and contribute nothing.
pub fn collect_successes(
    results: Vec<(String, Result<Vec<Item>, FetchError>)>,
) -> Vec<Item> {
    results
        .into_iter()
        .fold(Vec::new(), |mut acc, (source, result)| {
            match result {
                Ok(items) => acc.extend(items),
                Err(e) => warn!("Skipping source '{}': {}", source, e),
            }
            acc
        })
}

/// Drop items without an image or flagged adult, then keep the first `limit`.
pub fn apply_policy(items: Vec<Item>, limit: u32) -> Vec<Item> {
    items
        .into_iter()
        .filter(|item| item.image.is_some() && !item.adult)
        .take(limit as usize)
        .collect()
}
