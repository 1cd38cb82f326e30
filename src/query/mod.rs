/*  This file is part of OneModel, a program to manage knowledge.
    Copyright in each year of 2025-2026 inclusive, Luke A. Call.
    OneModel is free software, distributed under a license that includes honesty, the Golden Rule,
    and the GNU Affero General Public License as published by the Free Software Foundation;
    see the file LICENSE for license version and details.
    OneModel is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranty of
    MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU Affero General Public License for more details.
    You should have received a copy of the GNU Affero General Public License along with OneModel.  If not, see <http://www.gnu.org/licenses/>
*/
pub mod attribute_query;
pub mod builder;
pub mod compiler;
pub mod instance_query;
pub mod predicate;
pub mod print;
pub mod select_path;
pub mod sql;

pub use attribute_query::AttributeQuery;
pub use builder::{CompanyScope, OrderBy, QueryBuilder, QueryDefinition};
pub use compiler::{CompiledQuery, Compiler, QueryScope};
pub use instance_query::InstanceQuery;
pub use predicate::{Comparison, Where};
pub use print::{PrintQuery, PrintState};
pub use select_path::SelectPath;

use crate::cache::{CacheDefinition, CachedRows, QueryKey};
use crate::context::Context;
use crate::error::Result;
use crate::model::database::ColumnType;
use std::sync::Arc;
use tracing::*;

/// Runs a select through the context, going by the query cache first when a cache definition
/// is given.  Rows read from the store are put in the cache under (definition key, sql).
pub(crate) fn run_cached(
    ctx: &Context,
    operation: &str,
    cache: Option<&CacheDefinition>,
    sql: &str,
    types: &[ColumnType],
) -> Result<CachedRows> {
    let query_cache = ctx.get_persistence().get_query_cache();
    let key = cache.map(|c| QueryKey::new(c.get_key(), sql));
    if let Some(k) = &key {
        if let Some(rows) = query_cache.get(k) {
            debug!("{}: {} rows from the query cache.", operation, rows.len());
            return Ok(rows);
        }
    }
    let rows: CachedRows = Arc::new(ctx.query(operation, sql, types)?);
    debug!("{}: {} rows.", operation, rows.len());
    if let (Some(k), Some(c)) = (key, cache) {
        query_cache.put(k, rows.clone(), c);
    }
    Ok(rows)
}
