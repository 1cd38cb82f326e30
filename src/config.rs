/*  This file is part of OneModel, a program to manage knowledge.
    Copyright in each year of 2025-2026 inclusive, Luke A. Call.
    OneModel is free software, distributed under a license that includes honesty, the Golden Rule,
    and the GNU Affero General Public License as published by the Free Software Foundation;
    see the file LICENSE for license version and details.
    OneModel is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranty of
    MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU Affero General Public License for more details.
    You should have received a copy of the GNU Affero General Public License along with OneModel.  If not, see <http://www.gnu.org/licenses/>
*/
//! Settings for the persistence layer.
//!
//! Resolved in priority order: environment variables (`OM_*`), then an optional TOML file, then
//! the compiled defaults below.
//!
//! | Key | Env | Default |
//! |-----|-----|---------|
//! | `database_url` | `OM_DATABASE_URL` | `postgres://t1:x@localhost/om_t1` |
//! | `max_connections` | `OM_MAX_CONNECTIONS` | 10 |
//! | `query_cache_enabled` | `OM_QUERY_CACHE_ENABLED` | true |
//! | `transaction_timeout_secs` | `OM_TRANSACTION_TIMEOUT_SECS` | 300 |
//! | `max_in_list` | `OM_MAX_IN_LIST` | (dialect default) |
//! | `default_locale` | `OM_DEFAULT_LOCALE` | `en` |
use crate::error::{PersistError, Result};
use confique::Config;
use std::path::Path;

pub const DEFAULT_DATABASE_URL: &str = "postgres://t1:x@localhost/om_t1";

#[derive(Config, Debug, Clone, PartialEq, Eq)]
pub struct PersistConfig {
    /// sqlx connection url. "postgres://..." in production; "sqlite::memory:" works for tests.
    #[config(env = "OM_DATABASE_URL", default = "postgres://t1:x@localhost/om_t1")]
    pub database_url: String,

    #[config(env = "OM_MAX_CONNECTIONS", default = 10)]
    pub max_connections: u32,

    /// When false, the no-op query cache is used.
    #[config(env = "OM_QUERY_CACHE_ENABLED", default = true)]
    pub query_cache_enabled: bool,

    #[config(env = "OM_TRANSACTION_TIMEOUT_SECS", default = 300)]
    pub transaction_timeout_secs: u64,

    /// Overrides the dialect's limit on expressions in one IN (...) list.
    #[config(env = "OM_MAX_IN_LIST")]
    pub max_in_list: Option<usize>,

    #[config(env = "OM_DEFAULT_LOCALE", default = "en")]
    pub default_locale: String,
}

impl Default for PersistConfig {
    fn default() -> Self {
        Self {
            database_url: DEFAULT_DATABASE_URL.to_string(),
            max_connections: 10,
            query_cache_enabled: true,
            transaction_timeout_secs: 300,
            max_in_list: None,
            default_locale: "en".to_string(),
        }
    }
}

impl PersistConfig {
    /// Reads the environment, then the file if one is given and exists, then the defaults.
    pub fn load(file: Option<&Path>) -> Result<PersistConfig> {
        let mut builder = PersistConfig::builder().env();
        if let Some(path) = file {
            builder = builder.file(path);
        }
        builder
            .load()
            .map_err(|e| PersistError::configuration(format!("loading settings: {}", e)))
    }

    /// Convenience for tests and tools: everything default except the url.
    pub fn with_url(url: &str) -> PersistConfig {
        PersistConfig {
            database_url: url.to_string(),
            ..Default::default()
        }
    }

    pub fn get_transaction_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.transaction_timeout_secs)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_default_config() {
        let c = PersistConfig::default();
        assert_eq!(c.database_url, DEFAULT_DATABASE_URL);
        assert_eq!(c.max_connections, 10);
        assert!(c.query_cache_enabled);
        assert_eq!(c.get_transaction_timeout().as_secs(), 300);
        assert_eq!(c.max_in_list, None);
        assert_eq!(c.default_locale, "en");
    }

    #[test]
    fn test_load_from_file() {
        let dir = std::env::temp_dir().join(format!("om-config-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("om.toml");
        std::fs::write(
            &path,
            "database_url = \"sqlite::memory:\"\nmax_in_list = 5\nquery_cache_enabled = false\n",
        )
        .unwrap();
        let c = PersistConfig::load(Some(&path)).unwrap();
        // environment variables win over the file, so only check what a test run would not set.
        if std::env::var("OM_MAX_IN_LIST").is_err() {
            assert_eq!(c.max_in_list, Some(5));
        }
        if std::env::var("OM_QUERY_CACHE_ENABLED").is_err() {
            assert!(!c.query_cache_enabled);
        }
        if std::env::var("OM_MAX_CONNECTIONS").is_err() {
            assert_eq!(c.max_connections, 10);
        }
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_with_url() {
        let c = PersistConfig::with_url("sqlite::memory:");
        assert_eq!(c.database_url, "sqlite::memory:");
        assert_eq!(c.default_locale, "en");
    }
}
