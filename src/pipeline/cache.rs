//! コレクタ応答のインメモリキャッシュ。
//!
//! キーはソース・メディア種別・日付範囲から決定的に作られる。値はコレクタが返した
//! 生レコード列で、ヒットした場合はネットワーク呼び出しを丸ごと省略する。

use std::collections::HashMap;
use std::time::Duration;

use prometheus::Counter;
use tokio::sync::RwLock;
use tokio::time::Instant;

use super::record::{MediaType, RawRelease};
use super::window::DateWindow;
use crate::observability::metrics::Metrics;

/// キャッシュキーを作る。例: `tmdb:movie:2024-01-01:2024-01-07`
#[must_use]
pub fn cache_key(source: &str, media_type: Option<MediaType>, window: &DateWindow) -> String {
    format!(
        "{source}:{}:{}:{}",
        media_type.map_or("all", MediaType::as_str),
        window.start(),
        window.end()
    )
}

#[derive(Debug, Clone)]
struct CacheEntry {
    releases: Vec<RawRelease>,
    stored_at: Instant,
}

/// 複数コレクタからの同時アクセスに耐えるキャッシュ。
#[derive(Debug, Default)]
pub struct ResponseCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
    ttl: Option<Duration>,
    counters: Option<LookupCounters>,
}

#[derive(Debug, Clone)]
struct LookupCounters {
    hits: Counter,
    misses: Counter,
}

impl ResponseCache {
    /// `ttl` が `None` の場合、エントリは失効しない。
    #[must_use]
    pub fn new(ttl: Option<Duration>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
            counters: None,
        }
    }

    /// ヒット・ミスを `metrics` のカウンターに記録する。
    #[must_use]
    pub fn with_metrics(mut self, metrics: &Metrics) -> Self {
        self.counters = Some(LookupCounters {
            hits: metrics.cache_hits.clone(),
            misses: metrics.cache_misses.clone(),
        });
        self
    }

    pub async fn get(&self, key: &str) -> Option<Vec<RawRelease>> {
        let found = {
            let entries = self.entries.read().await;
            entries
                .get(key)
                .filter(|entry| {
                    self.ttl
                        .is_none_or(|ttl| entry.stored_at.elapsed() < ttl)
                })
                .map(|entry| entry.releases.clone())
        };

        if let Some(counters) = &self.counters {
            if found.is_some() {
                counters.hits.inc();
            } else {
                counters.misses.inc();
            }
        }
        found
    }

    pub async fn insert(&self, key: impl Into<String>, releases: Vec<RawRelease>) {
        let mut entries = self.entries.write().await;
        if let Some(ttl) = self.ttl {
            entries.retain(|_, entry| entry.stored_at.elapsed() < ttl);
        }
        entries.insert(
            key.into(),
            CacheEntry {
                releases,
                stored_at: Instant::now(),
            },
        );
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }
}
