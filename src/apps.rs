// Copyright 2025 vitalflow
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

// App category lookups with a bounded TTL cache

use crate::error::PipelineError;
use crate::stream::UsageEvent;
use crate::util::epoch_secs;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::debug;

const CACHE_CAPACITY: usize = 1_000_000;
const CACHE_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Category resolution result; `fetch_time` is epoch seconds.
#[derive(Debug, Clone, PartialEq)]
pub struct AppCategory {
    pub category_name: Option<String>,
    pub fetch_time: f64,
}

/// Where categories come from. Tests use a table; deployments plug in a
/// store-backed implementation.
#[async_trait]
pub trait CategoryProvider: Send + Sync {
    async fn fetch(&self, package_name: &str) -> Result<Option<String>, PipelineError>;
}

/// Caches provider results per package with a per-entry TTL and a hard
/// capacity. Provider failures produce an uncached `None` entry, so a
/// flaky provider degrades lookups without poisoning the cache. At
/// capacity, the entry with the oldest fetch time is evicted.
pub struct AppCategoryCache {
    provider: Arc<dyn CategoryProvider>,
    ttl: Duration,
    capacity: usize,
    entries: Mutex<HashMap<String, AppCategory>>,
}

impl AppCategoryCache {
    pub fn new(provider: Arc<dyn CategoryProvider>) -> Self {
        Self::with_limits(provider, CACHE_TTL, CACHE_CAPACITY)
    }

    pub fn with_limits(provider: Arc<dyn CategoryProvider>, ttl: Duration, capacity: usize) -> Self {
        Self {
            provider,
            ttl,
            capacity: capacity.max(1),
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub async fn lookup(&self, package_name: &str) -> AppCategory {
        {
            let entries = self.entries.lock().await;
            if let Some(entry) = entries.get(package_name) {
                if epoch_secs() - entry.fetch_time < self.ttl.as_secs_f64() {
                    return entry.clone();
                }
            }
        }

        match self.provider.fetch(package_name).await {
            Ok(category_name) => {
                let entry = AppCategory {
                    category_name,
                    fetch_time: epoch_secs(),
                };
                let mut entries = self.entries.lock().await;
                if entries.len() >= self.capacity && !entries.contains_key(package_name) {
                    let stalest = entries
                        .iter()
                        .min_by(|a, b| {
                            a.1.fetch_time
                                .partial_cmp(&b.1.fetch_time)
                                .unwrap_or(std::cmp::Ordering::Equal)
                        })
                        .map(|(name, _)| name.clone());
                    if let Some(stalest) = stalest {
                        entries.remove(&stalest);
                    }
                }
                entries.insert(package_name.to_string(), entry.clone());
                entry
            }
            Err(e) => {
                debug!("Category lookup failed for '{}': {}", package_name, e);
                AppCategory {
                    category_name: None,
                    fetch_time: epoch_secs(),
                }
            }
        }
    }

    /// Fill the event's category when the producer left it unset. This is
    /// how cache results reach the usage aggregation path.
    pub async fn annotate(&self, event: &mut UsageEvent) {
        if event.category.is_none() {
            event.category = self.lookup(&event.package_name).await.category_name;
        }
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct TableProvider {
        calls: AtomicUsize,
        fail: bool,
    }

    impl TableProvider {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                fail: false,
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                fail: true,
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl CategoryProvider for TableProvider {
        async fn fetch(&self, package_name: &str) -> Result<Option<String>, PipelineError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(PipelineError::transport("lookup backend unavailable"));
            }
            Ok(match package_name {
                "com.example.social" => Some("SOCIAL".to_string()),
                _ => None,
            })
        }
    }

    #[tokio::test]
    async fn test_lookup_hits_cache_within_ttl() {
        let provider = TableProvider::new();
        let cache = AppCategoryCache::new(provider.clone() as Arc<dyn CategoryProvider>);
        let first = cache.lookup("com.example.social").await;
        let second = cache.lookup("com.example.social").await;
        assert_eq!(first.category_name.as_deref(), Some("SOCIAL"));
        assert_eq!(second, first);
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test]
    async fn test_expired_entry_is_refetched() {
        let provider = TableProvider::new();
        let cache = AppCategoryCache::with_limits(
            provider.clone() as Arc<dyn CategoryProvider>,
            Duration::ZERO,
            16,
        );
        cache.lookup("com.example.social").await;
        cache.lookup("com.example.social").await;
        assert_eq!(provider.calls(), 2);
    }

    #[tokio::test]
    async fn test_provider_failure_is_not_cached() {
        let provider = TableProvider::failing();
        let cache = AppCategoryCache::new(provider.clone() as Arc<dyn CategoryProvider>);
        let entry = cache.lookup("com.example.social").await;
        assert_eq!(entry.category_name, None);
        assert_eq!(cache.len().await, 0);
        cache.lookup("com.example.social").await;
        assert_eq!(provider.calls(), 2);
    }

    #[tokio::test]
    async fn test_capacity_evicts_stalest_entry() {
        let provider = TableProvider::new();
        let cache =
            AppCategoryCache::with_limits(provider.clone() as Arc<dyn CategoryProvider>, CACHE_TTL, 2);
        cache.lookup("a").await;
        tokio::time::sleep(Duration::from_millis(5)).await;
        cache.lookup("b").await;
        tokio::time::sleep(Duration::from_millis(5)).await;
        cache.lookup("c").await;
        assert_eq!(cache.len().await, 2);
        // 'a' was the stalest entry; looking it up again misses.
        cache.lookup("a").await;
        assert_eq!(provider.calls(), 4);
    }
}
