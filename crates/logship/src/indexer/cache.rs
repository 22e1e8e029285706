// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::sync::{Arc, Mutex, PoisonError};

use tracing::debug;

use crate::config::IndexerConfig;
use crate::error::ConfigError;
use crate::indexer::{build_indexer, Indexer};

type Entry = (IndexerConfig, Arc<dyn Indexer>);

/// Keeps the most recently built indexer and the configuration it came from.
///
/// Runs under an unchanged configuration share one instance; any field change
/// replaces it. The lock is held while building so concurrent callers never
/// construct twice.
#[derive(Default)]
pub struct IndexerCache {
    current: Mutex<Option<Entry>>,
}

impl IndexerCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached indexer when `config` equals the cached
    /// configuration, otherwise builds and caches a new one.
    pub fn get(&self, config: &IndexerConfig) -> Result<Arc<dyn Indexer>, ConfigError> {
        let mut current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some((cached, indexer)) = current.as_ref() {
            if cached == config {
                return Ok(Arc::clone(indexer));
            }
        }

        let indexer = build_indexer(config)?;
        debug!(
            "LOGSHIP | Built {} indexer for {}",
            indexer.kind(),
            indexer.describe()
        );
        *current = Some((config.clone(), Arc::clone(&indexer)));
        Ok(indexer)
    }

    /// Caches `indexer` as the instance for `config`.
    pub fn install(&self, config: IndexerConfig, indexer: Arc<dyn Indexer>) {
        *self.current.lock().unwrap_or_else(PoisonError::into_inner) = Some((config, indexer));
    }

    pub fn clear(&self) {
        *self.current.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

impl std::fmt::Debug for IndexerCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        f.debug_struct("IndexerCache")
            .field("config", &current.as_ref().map(|(config, _)| config))
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::config::{HttpConfig, TcpConfig};
    use crate::indexer::MemoryIndexer;
    use std::thread;

    fn tcp(port: u16) -> IndexerConfig {
        IndexerConfig::Tcp(TcpConfig {
            host: "localhost".to_string(),
            port,
        })
    }

    fn same(a: &Arc<dyn Indexer>, b: &Arc<dyn Indexer>) -> bool {
        std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
    }

    #[test]
    fn test_equal_configuration_reuses_instance() {
        let cache = IndexerCache::new();
        let first = cache.get(&tcp(9000)).unwrap();
        let second = cache.get(&tcp(9000)).unwrap();
        assert!(same(&first, &second));
    }

    #[test]
    fn test_changed_field_builds_new_instance() {
        let cache = IndexerCache::new();
        let first = cache.get(&tcp(9000)).unwrap();
        let second = cache.get(&tcp(9001)).unwrap();
        assert!(!same(&first, &second));
        assert_eq!(second.describe(), "localhost:9001");

        // The previous configuration is no longer cached.
        let third = cache.get(&tcp(9000)).unwrap();
        assert!(!same(&first, &third));
    }

    #[test]
    fn test_construction_error_propagates_and_keeps_cache() {
        let cache = IndexerCache::new();
        let first = cache.get(&tcp(9000)).unwrap();

        let error = cache
            .get(&IndexerConfig::Http(HttpConfig::new("http://es:9200/")))
            .err()
            .unwrap();
        assert_eq!(error.to_string(), "HTTP indexer: index key is required");

        let again = cache.get(&tcp(9000)).unwrap();
        assert!(same(&first, &again));
    }

    #[test]
    fn test_install_injects_instance() {
        let cache = IndexerCache::new();
        let memory: Arc<dyn Indexer> = Arc::new(MemoryIndexer::new());
        cache.install(tcp(9000), Arc::clone(&memory));

        let got = cache.get(&tcp(9000)).unwrap();
        assert!(same(&got, &memory));

        cache.clear();
        let rebuilt = cache.get(&tcp(9000)).unwrap();
        assert!(!same(&rebuilt, &memory));
    }

    #[test]
    fn test_concurrent_callers_share_one_instance() {
        let cache = Arc::new(IndexerCache::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = Arc::clone(&cache);
                thread::spawn(move || cache.get(&IndexerConfig::Memory).unwrap())
            })
            .collect();
        let indexers: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(indexers.iter().all(|i| same(i, &indexers[0])));
    }
}
