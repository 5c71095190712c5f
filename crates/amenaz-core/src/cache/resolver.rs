use std::future::Future;

use anyhow::Result;
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, warn};

use super::CacheManager;

impl CacheManager {
    /// Return the cached value for `key`, or run `fetch` and cache its result.
    ///
    /// A missing, unreadable or malformed entry counts as a miss. Errors from
    /// `fetch` are returned to the caller. Writing the fetched value back is
    /// best-effort: a failed write is logged and the value is still returned.
    pub async fn resolve<T, F, Fut>(&self, key: &str, fetch: F) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        match self.load::<T>(key) {
            Ok(Some(cached)) => {
                debug!(cache = key, age = %cached.age_display(), "Cache hit");
                return Ok(cached.data);
            }
            Ok(None) => debug!(cache = key, "Cache miss"),
            Err(e) => debug!(cache = key, error = %e, "Unreadable cache entry, fetching"),
        }

        let data = fetch().await?;

        if let Err(e) = self.save(key, &data) {
            warn!(cache = key, error = %e, "Failed to cache fetched data");
        }

        Ok(data)
    }
}
