//! Result cache for agents with a cache policy.
//!
//! Keys are SHA-256 fingerprints of the agent id and the task inputs (query,
//! document and conversation history), so a repeated query or an unchanged
//! document in the same conversation maps to the same entry. Entries
//! expire after the policy TTL and the least recently used entry is evicted
//! once `max_size` is reached.

use crate::types::{AgentResult, AgentTask};
use crate::utils::toml_config::CachePolicy;
use lru::LruCache;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::num::NonZeroUsize;
use std::time::Duration;
use tokio::time::Instant;

/// Statistics for cache performance monitoring
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub expired: u64,
    pub entry_count: usize,
}

struct CachedResult {
    result: AgentResult,
    inserted_at: Instant,
}

pub struct ResultCache {
    policy: CachePolicy,
    entries: LruCache<String, CachedResult>,
    stats: CacheStats,
}

impl ResultCache {
    pub fn new(policy: CachePolicy) -> Self {
        let capacity = NonZeroUsize::new(policy.max_size).unwrap_or(NonZeroUsize::MIN);
        Self {
            policy,
            entries: LruCache::new(capacity),
            stats: CacheStats::default(),
        }
    }

    pub fn policy(&self) -> CachePolicy {
        self.policy
    }

    /// Compute the cache key for a task handled by `agent_id`.
    pub fn compute_key(agent_id: &str, task: &AgentTask) -> String {
        let mut hasher = Sha256::new();
        hasher.update(agent_id.as_bytes());
        hasher.update([0u8]);
        if let Some(query) = &task.query {
            hasher.update(query.as_bytes());
        }
        hasher.update([0u8]);
        if let Some(document) = &task.document {
            hasher.update(document.id.as_bytes());
            hasher.update([0u8]);
            hasher.update(document.title.as_bytes());
            hasher.update([0u8]);
            hasher.update(document.content.as_bytes());
        }
        hasher.update([0u8]);
        for message in &task.history {
            hasher.update(message.question.as_bytes());
            hasher.update([0u8]);
            hasher.update(message.answer.as_bytes());
            hasher.update([0u8]);
            if let Some(agent_id) = &message.agent_id {
                hasher.update(agent_id.as_bytes());
            }
            hasher.update([1u8]);
        }
        hex::encode(hasher.finalize())
    }

    pub fn get(&mut self, key: &str) -> Option<AgentResult> {
        let ttl = Duration::from_millis(self.policy.ttl_ms);
        let fresh = match self.entries.get(key) {
            Some(entry) => entry.inserted_at.elapsed() < ttl,
            None => {
                self.stats.misses += 1;
                return None;
            }
        };

        if !fresh {
            self.entries.pop(key);
            self.stats.expired += 1;
            self.stats.misses += 1;
            return None;
        }

        self.stats.hits += 1;
        self.entries.get(key).map(|entry| entry.result.clone())
    }

    pub fn insert(&mut self, key: String, result: AgentResult) {
        self.entries.put(
            key,
            CachedResult {
                result,
                inserted_at: Instant::now(),
            },
        );
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entry_count: self.entries.len(),
            ..self.stats
        }
    }
}
