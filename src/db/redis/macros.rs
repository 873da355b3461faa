/// Read-through caching for an optional [`Cache`](crate::db::Cache).
///
/// `$cache` is an `Option<&Cache>`. With a cache present, a hit returns the
/// stored value; a miss awaits `$fetch`, queues the result for `$ttl` seconds
/// and returns it. Without a cache, `$fetch` is simply awaited. Must be used
/// inside a function returning `AppResult`.
///
/// ```rust,ignore
/// let track = cached!(self.cache.as_ref(), CacheKey::TrackMetadata(id), 3600, async {
///     self.fetch_track(&id).await
/// })?;
/// ```
#[macro_export]
macro_rules! cached {
    ($cache:expr, $key:expr, $ttl:expr, $fetch:expr) => {{
        match $cache {
            Some(cache) => {
                let key = $key;
                match cache.get_from_cache(&key).await? {
                    Some(hit) => Ok(hit),
                    None => {
                        let value = $fetch.await?;
                        cache.set_in_background(&key, &value, $ttl);
                        Ok(value)
                    }
                }
            }
            None => $fetch.await,
        }
    }};
}
