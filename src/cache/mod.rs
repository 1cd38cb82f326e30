/*  This file is part of OneModel, a program to manage knowledge.
    Copyright in each year of 2025-2026 inclusive, Luke A. Call.
    OneModel is free software, distributed under a license that includes honesty, the Golden Rule,
    and the GNU Affero General Public License as published by the Free Software Foundation;
    see the file LICENSE for license version and details.
    OneModel is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranty of
    MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU Affero General Public License for more details.
    You should have received a copy of the GNU Affero General Public License along with OneModel.  If not, see <http://www.gnu.org/licenses/>
*/
//! Results of compiled queries, kept by (logical key, SQL).
pub mod noop;
pub mod query_cache;

use crate::model::database::DbRow;
use crate::util::Util;
use std::sync::Arc;
use std::time::Duration;

pub use noop::NoOpQueryCache;
pub use query_cache::MemoryQueryCache;

/// The rows one statement returned, shared between the cache and its readers.
pub type CachedRows = Arc<Vec<DbRow>>;

/// Identical SQL under two logical keys (say, two requests) is two entries.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueryKey {
    logical: String,
    sql_hash: String,
}

impl QueryKey {
    pub fn new(logical: &str, sql: &str) -> QueryKey {
        QueryKey {
            logical: logical.to_string(),
            sql_hash: Util::md5_hex(sql.as_bytes()),
        }
    }

    pub fn get_logical(&self) -> &str {
        &self.logical
    }

    pub fn get_sql_hash(&self) -> &str {
        &self.sql_hash
    }
}

/// How a query asks to be cached.  No lifespan and no max idle means the entry stays until it
/// is cleaned out by key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheDefinition {
    key: String,
    lifespan: Option<Duration>,
    max_idle: Option<Duration>,
}

impl CacheDefinition {
    pub fn new(key: &str) -> CacheDefinition {
        CacheDefinition {
            key: key.to_string(),
            lifespan: None,
            max_idle: None,
        }
    }

    pub fn with_lifespan(mut self, lifespan: Duration) -> CacheDefinition {
        self.lifespan = Some(lifespan);
        self
    }

    pub fn with_max_idle(mut self, max_idle: Duration) -> CacheDefinition {
        self.max_idle = Some(max_idle);
        self
    }

    pub fn get_key(&self) -> &str {
        &self.key
    }

    pub fn get_lifespan(&self) -> Option<Duration> {
        self.lifespan
    }

    pub fn get_max_idle(&self) -> Option<Duration> {
        self.max_idle
    }
}

/// Shared by every context.  Callers must be correct whichever implementation they get: with
/// the no-op one, every get misses.
pub trait QueryCache: Send + Sync {
    fn get(&self, key: &QueryKey) -> Option<CachedRows>;
    fn put(&self, key: QueryKey, rows: CachedRows, definition: &CacheDefinition);
    /// Drops every entry whose logical key is `logical`.  Returns how many went.
    fn clean_by_key(&self, logical: &str) -> usize;
    /// Drops every entry past its lifespan or idle time.  Returns how many went.
    fn evict_expired(&self) -> usize;
    fn clear(&self);
    fn len(&self) -> usize;
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
    fn is_enabled(&self) -> bool;
}
