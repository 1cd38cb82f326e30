/*  This file is part of OneModel, a program to manage knowledge.
    Copyright in each year of 2025-2026 inclusive, Luke A. Call.
    OneModel is free software, distributed under a license that includes honesty, the Golden Rule,
    and the GNU Affero General Public License as published by the Free Software Foundation;
    see the file LICENSE for license version and details.
    OneModel is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranty of
    MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU Affero General Public License for more details.
    You should have received a copy of the GNU Affero General Public License along with OneModel.  If not, see <http://www.gnu.org/licenses/>
*/
use crate::cache::{CacheDefinition, CachedRows, QueryCache, QueryKey};
use dashmap::DashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use tracing::*;

#[derive(Debug, Clone)]
struct Entry {
    rows: CachedRows,
    created: Instant,
    last_access: Instant,
    lifespan: Option<Duration>,
    max_idle: Option<Duration>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        let too_old = self.lifespan.map(|l| now.duration_since(self.created) > l).unwrap_or(false);
        let too_idle = self.max_idle.map(|m| now.duration_since(self.last_access) > m).unwrap_or(false);
        too_old || too_idle
    }
}

/// Puts between two sweeps of expired entries.
const SWEEP_INTERVAL: usize = 64;

/// The in-process query cache.  Expired entries are dropped when next looked at, and by a
/// sweep every `SWEEP_INTERVAL` puts.
pub struct MemoryQueryCache {
    entries: DashMap<QueryKey, Entry>,
    puts: AtomicUsize,
}

impl MemoryQueryCache {
    pub fn new() -> MemoryQueryCache {
        MemoryQueryCache {
            entries: DashMap::new(),
            puts: AtomicUsize::new(0),
        }
    }
}

impl Default for MemoryQueryCache {
    fn default() -> Self {
        Self::new()
    }
}

impl QueryCache for MemoryQueryCache {
    fn get(&self, key: &QueryKey) -> Option<CachedRows> {
        let now = Instant::now();
        if let Some(mut e) = self.entries.get_mut(key) {
            if !e.is_expired(now) {
                e.last_access = now;
                return Some(e.rows.clone());
            }
        }
        // only an entry still expired goes; a fresh put in between stays
        if self.entries.remove_if(key, |_, e| e.is_expired(now)).is_some() {
            debug!("Query cache entry for '{}' expired.", key.get_logical());
        }
        None
    }

    fn put(&self, key: QueryKey, rows: CachedRows, definition: &CacheDefinition) {
        let now = Instant::now();
        self.entries.insert(
            key,
            Entry {
                rows,
                created: now,
                last_access: now,
                lifespan: definition.get_lifespan(),
                max_idle: definition.get_max_idle(),
            },
        );
        if (self.puts.fetch_add(1, Ordering::Relaxed) + 1) % SWEEP_INTERVAL == 0 {
            self.evict_expired();
        }
    }

    fn clean_by_key(&self, logical: &str) -> usize {
        let before = self.entries.len();
        self.entries.retain(|k, _| k.get_logical() != logical);
        let removed = before.saturating_sub(self.entries.len());
        if removed > 0 {
            debug!("Removed {} query cache entries for '{}'.", removed, logical);
        }
        removed
    }

    fn evict_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, e| !e.is_expired(now));
        let removed = before.saturating_sub(self.entries.len());
        if removed > 0 {
            debug!("Evicted {} expired query cache entries.", removed);
        }
        removed
    }

    fn clear(&self) {
        self.entries.clear();
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn is_enabled(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::model::database::{DataType, DbRow};
    use std::sync::Arc;

    fn rows(n: i64) -> CachedRows {
        Arc::new(vec![vec![Some(DataType::Bigint(n))] as DbRow])
    }

    #[test]
    fn test_put_then_get() {
        let cache = MemoryQueryCache::new();
        let key = QueryKey::new("k", "SELECT ID FROM T");
        assert!(cache.get(&key).is_none());
        cache.put(key.clone(), rows(7), &CacheDefinition::new("k"));
        assert_eq!(cache.get(&key).unwrap(), rows(7));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_lifespan_and_idle_expiry() {
        let cache = MemoryQueryCache::new();
        let short = QueryKey::new("k", "SELECT 1");
        let idle = QueryKey::new("k", "SELECT 2");
        let forever = QueryKey::new("k", "SELECT 3");
        cache.put(short.clone(), rows(1), &CacheDefinition::new("k").with_lifespan(Duration::from_millis(5)));
        cache.put(idle.clone(), rows(2), &CacheDefinition::new("k").with_max_idle(Duration::from_millis(5)));
        cache.put(forever.clone(), rows(3), &CacheDefinition::new("k"));
        std::thread::sleep(Duration::from_millis(30));
        assert!(cache.get(&short).is_none());
        assert!(cache.get(&idle).is_none());
        assert!(cache.get(&forever).is_some());
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_evict_expired_without_reading() {
        let cache = MemoryQueryCache::new();
        let key = QueryKey::new("k", "SELECT 1");
        cache.put(key, rows(1), &CacheDefinition::new("k").with_lifespan(Duration::from_millis(5)));
        assert_eq!(cache.len(), 1);
        std::thread::sleep(Duration::from_millis(30));
        assert_eq!(cache.evict_expired(), 1);
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn test_puts_sweep_expired_entries() {
        let cache = MemoryQueryCache::new();
        cache.put(
            QueryKey::new("k", "SELECT 0"),
            rows(0),
            &CacheDefinition::new("k").with_lifespan(Duration::from_millis(5)),
        );
        std::thread::sleep(Duration::from_millis(30));
        for n in 1..SWEEP_INTERVAL as i64 {
            cache.put(QueryKey::new("k", &format!("SELECT {}", n)), rows(n), &CacheDefinition::new("k"));
        }
        // the SWEEP_INTERVAL-th put swept the expired one
        assert_eq!(cache.len(), SWEEP_INTERVAL - 1);
    }

    #[test]
    fn test_expired_get_keeps_a_fresh_put() {
        let cache = MemoryQueryCache::new();
        let key = QueryKey::new("k", "SELECT 1");
        cache.put(key.clone(), rows(1), &CacheDefinition::new("k").with_lifespan(Duration::from_millis(5)));
        std::thread::sleep(Duration::from_millis(30));
        let now = Instant::now();
        cache.put(key.clone(), rows(2), &CacheDefinition::new("k"));
        // what get does after seeing the old entry expired
        assert!(cache.entries.remove_if(&key, |_, e| e.is_expired(now)).is_none());
        assert_eq!(cache.get(&key).unwrap(), rows(2));
    }

    #[test]
    fn test_clean_by_key_only_takes_that_key() {
        let cache = MemoryQueryCache::new();
        cache.put(QueryKey::new("req-1", "SELECT 1"), rows(1), &CacheDefinition::new("req-1"));
        cache.put(QueryKey::new("req-1", "SELECT 2"), rows(2), &CacheDefinition::new("req-1"));
        cache.put(QueryKey::new("req-2", "SELECT 1"), rows(1), &CacheDefinition::new("req-2"));
        assert_eq!(cache.clean_by_key("req-1"), 2);
        assert!(cache.get(&QueryKey::new("req-1", "SELECT 1")).is_none());
        assert!(cache.get(&QueryKey::new("req-2", "SELECT 1")).is_some());
        cache.clear();
        assert!(cache.is_empty());
    }
}
