/*  This file is part of OneModel, a program to manage knowledge.
    Copyright in each year of 2025-2026 inclusive, Luke A. Call.
    OneModel is free software, distributed under a license that includes honesty, the Golden Rule,
    and the GNU Affero General Public License as published by the Free Software Foundation;
    see the file LICENSE for license version and details.
    OneModel is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranty of
    MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU Affero General Public License for more details.
    You should have received a copy of the GNU Affero General Public License along with OneModel.  If not, see <http://www.gnu.org/licenses/>
*/
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// How a caller names a cached metadata entity.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    Id(i64),
    Name(String),
    Uuid(Uuid),
}

impl CacheKey {
    /// A number is an id, something that parses as a uuid is a uuid, anything else is a name.
    pub fn parse(s: &str) -> CacheKey {
        let trimmed = s.trim();
        if let Ok(id) = trimmed.parse::<i64>() {
            CacheKey::Id(id)
        } else if let Ok(uuid) = Uuid::parse_str(trimmed) {
            CacheKey::Uuid(uuid)
        } else {
            CacheKey::Name(trimmed.to_string())
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheKey::Id(id) => write!(f, "id {}", id),
            CacheKey::Name(name) => write!(f, "'{}'", name),
            CacheKey::Uuid(uuid) => write!(f, "uuid {}", uuid),
        }
    }
}

impl From<i64> for CacheKey {
    fn from(id: i64) -> Self {
        CacheKey::Id(id)
    }
}

impl From<i32> for CacheKey {
    fn from(id: i32) -> Self {
        CacheKey::Id(id as i64)
    }
}

impl From<&str> for CacheKey {
    fn from(name: &str) -> Self {
        CacheKey::Name(name.to_string())
    }
}

impl From<String> for CacheKey {
    fn from(name: String) -> Self {
        CacheKey::Name(name)
    }
}

impl From<&String> for CacheKey {
    fn from(name: &String) -> Self {
        CacheKey::Name(name.clone())
    }
}

impl From<Uuid> for CacheKey {
    fn from(uuid: Uuid) -> Self {
        CacheKey::Uuid(uuid)
    }
}

/// Anything kept in a CacheIndex.  Entities without a name or uuid are only found by id.
pub trait CacheObject: Send + Sync {
    fn get_id(&self) -> i64;
    fn get_cache_name(&self) -> Option<&str>;
    fn get_cache_uuid(&self) -> Option<Uuid>;
}

struct Indexes<T> {
    by_id: HashMap<i64, Arc<T>>,
    by_name: HashMap<String, Arc<T>>,
    by_uuid: HashMap<Uuid, Arc<T>>,
}

/// Three lookups (id, name, uuid) over one set of entities.  All three are replaced under one
/// write lock, so a reader never sees an entity in one index and its predecessor in another.
pub struct CacheIndex<T: CacheObject> {
    label: &'static str,
    inner: RwLock<Indexes<T>>,
}

impl<T: CacheObject> CacheIndex<T> {
    pub fn new(label: &'static str) -> CacheIndex<T> {
        CacheIndex {
            label,
            inner: RwLock::new(Indexes {
                by_id: HashMap::new(),
                by_name: HashMap::new(),
                by_uuid: HashMap::new(),
            }),
        }
    }

    pub fn get_label(&self) -> &'static str {
        self.label
    }

    pub fn get(&self, key: &CacheKey) -> Option<Arc<T>> {
        let inner = self.inner.read();
        match key {
            CacheKey::Id(id) => inner.by_id.get(id).cloned(),
            CacheKey::Name(name) => inner.by_name.get(name).cloned(),
            CacheKey::Uuid(uuid) => inner.by_uuid.get(uuid).cloned(),
        }
    }

    /// Puts the entity in all its indexes, replacing whatever was there for the same id (last
    /// writer wins).  If the name or uuid changed, the old ones stop resolving.
    pub fn publish(&self, entity: Arc<T>) {
        let mut inner = self.inner.write();
        let id = entity.get_id();
        if let Some(old) = inner.by_id.get(&id).cloned() {
            if let Some(old_name) = old.get_cache_name() {
                if Some(old_name) != entity.get_cache_name() {
                    inner.by_name.remove(old_name);
                }
            }
            if let Some(old_uuid) = old.get_cache_uuid() {
                if Some(old_uuid) != entity.get_cache_uuid() {
                    inner.by_uuid.remove(&old_uuid);
                }
            }
        }
        if let Some(name) = entity.get_cache_name() {
            inner.by_name.insert(name.to_string(), entity.clone());
        }
        if let Some(uuid) = entity.get_cache_uuid() {
            inner.by_uuid.insert(uuid, entity.clone());
        }
        inner.by_id.insert(id, entity);
    }

    pub fn remove(&self, id: i64) -> Option<Arc<T>> {
        let mut inner = self.inner.write();
        let old = inner.by_id.remove(&id)?;
        if let Some(name) = old.get_cache_name() {
            inner.by_name.remove(name);
        }
        if let Some(uuid) = old.get_cache_uuid() {
            inner.by_uuid.remove(&uuid);
        }
        Some(old)
    }

    pub fn clear(&self) {
        let mut inner = self.inner.write();
        inner.by_id.clear();
        inner.by_name.clear();
        inner.by_uuid.clear();
    }

    pub fn len(&self) -> usize {
        self.inner.read().by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// A snapshot; later publications are not reflected in it.
    pub fn values(&self) -> Vec<Arc<T>> {
        self.inner.read().by_id.values().cloned().collect()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    struct Thing {
        id: i64,
        name: String,
        uuid: Uuid,
    }

    impl CacheObject for Thing {
        fn get_id(&self) -> i64 {
            self.id
        }
        fn get_cache_name(&self) -> Option<&str> {
            Some(&self.name)
        }
        fn get_cache_uuid(&self) -> Option<Uuid> {
            Some(self.uuid)
        }
    }

    #[test]
    fn test_publish_and_lookup_all_three_ways() {
        let index: CacheIndex<Thing> = CacheIndex::new("things");
        let uuid = Uuid::new_v4();
        index.publish(Arc::new(Thing { id: 7, name: "seven".to_string(), uuid }));
        assert_eq!(index.get(&CacheKey::Id(7)).unwrap().id, 7);
        assert_eq!(index.get(&"seven".into()).unwrap().id, 7);
        assert_eq!(index.get(&uuid.into()).unwrap().id, 7);
        assert!(index.get(&CacheKey::Id(8)).is_none());
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn test_republish_with_new_name_drops_the_old_name() {
        let index: CacheIndex<Thing> = CacheIndex::new("things");
        let uuid = Uuid::new_v4();
        index.publish(Arc::new(Thing { id: 7, name: "seven".to_string(), uuid }));
        index.publish(Arc::new(Thing { id: 7, name: "sieben".to_string(), uuid }));
        assert!(index.get(&"seven".into()).is_none());
        assert_eq!(index.get(&"sieben".into()).unwrap().id, 7);
        assert_eq!(index.len(), 1);
        index.remove(7);
        assert!(index.get(&uuid.into()).is_none());
        assert!(index.is_empty());
    }

    #[test]
    fn test_parse_key() {
        assert_eq!(CacheKey::parse("42"), CacheKey::Id(42));
        assert_eq!(CacheKey::parse("Invoice"), CacheKey::Name("Invoice".to_string()));
        let u = Uuid::new_v4();
        assert_eq!(CacheKey::parse(&u.to_string()), CacheKey::Uuid(u));
    }
}
