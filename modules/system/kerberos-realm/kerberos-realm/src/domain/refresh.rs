//! Timer-driven role mapping refresh.

use std::sync::Arc;
use std::time::Duration;

use kerberos_realm_sdk::RefreshTrigger;
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::role_mapping::RoleMappingCache;

/// Rebuilds the role mapping every `interval` until cancelled.
pub struct CacheRefreshScheduler {
    cache: Arc<RoleMappingCache>,
    interval: Duration,
}

impl CacheRefreshScheduler {
    #[must_use]
    pub fn new(cache: Arc<RoleMappingCache>, interval: Duration) -> Self {
        Self { cache, interval }
    }

    /// Sleep, rebuild, repeat. Cancellation interrupts the sleep and any
    /// rebuild in progress; an interrupted rebuild publishes nothing.
    pub async fn run(self, cancel: CancellationToken) {
        info!(
            interval = %humantime::format_duration(self.interval),
            "role mapping refresh scheduler started"
        );
        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                () = tokio::time::sleep(self.interval) => {}
            }
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                () = self.cache.refresh(RefreshTrigger::Timer) => {}
            }
        }
        info!("role mapping refresh scheduler stopped");
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::io::Write as _;

    use super::*;
    use crate::domain::role_mapping::RoleMappingSettings;
    use crate::testing::InMemoryDirectory;

    fn cache_for(file: &tempfile::NamedTempFile) -> Arc<RoleMappingCache> {
        Arc::new(RoleMappingCache::new(
            Arc::new(InMemoryDirectory::new().with_group("CN=Admins")),
            RoleMappingSettings {
                path: file.path().to_path_buf(),
                strip_realm: true,
                max_nested_group_depth: 15,
                max_nested_group_workers: 4,
            },
        ))
    }

    fn mapping_file() -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"admin: [\"CN=Admins\"]\n").unwrap();
        file
    }

    #[tokio::test]
    async fn rebuilds_after_each_interval() {
        let file = mapping_file();
        let cache = cache_for(&file);
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(
            CacheRefreshScheduler::new(Arc::clone(&cache), Duration::from_millis(20))
                .run(cancel.clone()),
        );

        tokio::time::timeout(Duration::from_secs(5), async {
            while cache.current_snapshot().is_empty() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        cancel.cancel();
        handle.await.unwrap();
        assert_eq!(cache.current_snapshot().group_roles("cn=admins"), ["admin"]);
    }

    #[tokio::test]
    async fn cancellation_interrupts_a_long_sleep() {
        let file = mapping_file();
        let cache = cache_for(&file);
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(
            CacheRefreshScheduler::new(Arc::clone(&cache), Duration::from_secs(3600))
                .run(cancel.clone()),
        );

        tokio::time::sleep(Duration::from_millis(10)).await;
        cancel.cancel();

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
        assert!(cache.current_snapshot().is_empty());
    }
}
