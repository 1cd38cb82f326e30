/*  This file is part of OneModel, a program to manage knowledge.
    Copyright in each year of 2025-2026 inclusive, Luke A. Call.
    OneModel is free software, distributed under a license that includes honesty, the Golden Rule,
    and the GNU Affero General Public License as published by the Free Software Foundation;
    see the file LICENSE for license version and details.
    OneModel is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranty of
    MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU Affero General Public License for more details.
    You should have received a copy of the GNU Affero General Public License along with OneModel.  If not, see <http://www.gnu.org/licenses/>
*/
use crate::access::{AccessCheck, GrantAll};
use crate::cache::{MemoryQueryCache, NoOpQueryCache, QueryCache};
use crate::config::PersistConfig;
use crate::context::store::{MemoryStore, StoreResourceFactory};
use crate::context::transaction::{LocalTransactionManager, TransactionManager};
use crate::context::{BeginOptions, Context};
use crate::error::Result;
use crate::meta::MetadataCache;
use crate::model::database::{Database, PoolProvider};
use crate::model::sqlx_database::SqlxDatabase;
use std::sync::Arc;
use tracing::*;

/// Everything shared by the contexts of one process: the backing store, the metadata and query
/// caches, and the pluggable collaborators.  Built once and passed around; there are no globals.
pub struct Persistence {
    config: PersistConfig,
    database: Arc<dyn Database>,
    metadata: MetadataCache,
    query_cache: Arc<dyn QueryCache>,
    transaction_manager: Arc<dyn TransactionManager>,
    access_check: Arc<dyn AccessCheck>,
    store_factory: Arc<dyn StoreResourceFactory>,
}

pub struct PersistenceBuilder {
    database: Arc<dyn Database>,
    config: PersistConfig,
    query_cache: Option<Arc<dyn QueryCache>>,
    transaction_manager: Option<Arc<dyn TransactionManager>>,
    access_check: Option<Arc<dyn AccessCheck>>,
    store_factory: Option<Arc<dyn StoreResourceFactory>>,
}

impl PersistenceBuilder {
    pub fn config(mut self, config: PersistConfig) -> PersistenceBuilder {
        self.config = config;
        self
    }

    pub fn query_cache(mut self, cache: Arc<dyn QueryCache>) -> PersistenceBuilder {
        self.query_cache = Some(cache);
        self
    }

    pub fn transaction_manager(mut self, tm: Arc<dyn TransactionManager>) -> PersistenceBuilder {
        self.transaction_manager = Some(tm);
        self
    }

    pub fn access_check(mut self, check: Arc<dyn AccessCheck>) -> PersistenceBuilder {
        self.access_check = Some(check);
        self
    }

    pub fn store_factory(mut self, factory: Arc<dyn StoreResourceFactory>) -> PersistenceBuilder {
        self.store_factory = Some(factory);
        self
    }

    /// Fills in whatever was not given: the query cache the config asks for, a local
    /// transaction manager with the configured timeout, GrantAll, and a MemoryStore.
    pub fn build(self) -> Arc<Persistence> {
        let config = self.config;
        let query_cache: Arc<dyn QueryCache> = match self.query_cache {
            Some(c) => c,
            None if config.query_cache_enabled => Arc::new(MemoryQueryCache::new()),
            None => Arc::new(NoOpQueryCache::default()),
        };
        let transaction_manager = self
            .transaction_manager
            .unwrap_or_else(|| Arc::new(LocalTransactionManager::new(config.get_transaction_timeout())));
        let metadata = MetadataCache::new(self.database.get_dialect().clone());
        Arc::new(Persistence {
            database: self.database,
            metadata,
            query_cache,
            transaction_manager,
            access_check: self.access_check.unwrap_or_else(|| Arc::new(GrantAll::default())),
            store_factory: self.store_factory.unwrap_or_else(|| Arc::new(MemoryStore::new())),
            config,
        })
    }
}

impl Persistence {
    /// Connects to the configured database with all the defaults.
    pub fn connect(config: PersistConfig) -> Result<Arc<Persistence>> {
        let database = SqlxDatabase::connect(&config)?;
        let p = Self::builder(Arc::new(database)).config(config).build();
        info!(
            "Persistence ready; query cache {}.",
            if p.query_cache.is_enabled() { "enabled" } else { "disabled" }
        );
        Ok(p)
    }

    pub fn builder(database: Arc<dyn Database>) -> PersistenceBuilder {
        PersistenceBuilder {
            database,
            config: PersistConfig::default(),
            query_cache: None,
            transaction_manager: None,
            access_check: None,
            store_factory: None,
        }
    }

    pub fn begin(self: &Arc<Self>, options: BeginOptions) -> Result<Arc<Context>> {
        Context::begin(self.clone(), options)
    }

    pub fn get_config(&self) -> &PersistConfig {
        &self.config
    }

    pub fn get_database(&self) -> &Arc<dyn Database> {
        &self.database
    }

    pub fn get_metadata(&self) -> &MetadataCache {
        &self.metadata
    }

    pub fn get_query_cache(&self) -> &Arc<dyn QueryCache> {
        &self.query_cache
    }

    pub fn get_transaction_manager(&self) -> &Arc<dyn TransactionManager> {
        &self.transaction_manager
    }

    pub fn get_access_check(&self) -> &Arc<dyn AccessCheck> {
        &self.access_check
    }

    pub fn get_store_factory(&self) -> &Arc<dyn StoreResourceFactory> {
        &self.store_factory
    }

    /// For metadata lookups made outside any context.  Must not be used on a thread whose
    /// context holds the only pooled connection.
    pub fn pool_provider(&self) -> PoolProvider {
        PoolProvider::new(self.database.clone())
    }

    pub fn clear_caches(&self) {
        self.metadata.clear_all();
        self.query_cache.clear();
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::cache::{CacheDefinition, QueryKey};
    use crate::test_support::Fixture;
    use crate::util::Util;

    #[test]
    fn test_disabled_query_cache_is_the_no_op() {
        Util::initialize_tracing();
        let f = Fixture::new();
        let mut config = PersistConfig::with_url("sqlite::memory:");
        config.query_cache_enabled = false;
        let p = Persistence::builder(f.database()).config(config).build();
        assert!(!p.get_query_cache().is_enabled());
        assert!(f.persistence().get_query_cache().is_enabled());
    }

    #[test]
    fn test_clear_caches() {
        Util::initialize_tracing();
        let f = Fixture::new();
        let p = f.persistence();
        p.get_metadata().get_type(&p.pool_provider(), "Invoice").unwrap();
        p.get_query_cache()
            .put(QueryKey::new("k", "SELECT 1"), Arc::new(vec![]), &CacheDefinition::new("k"));
        p.clear_caches();
        assert!(p.get_metadata().get_cached_type("Invoice").is_none());
        assert!(p.get_query_cache().is_empty());
    }
}
