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

/// Used when query caching is turned off: remembers nothing.
#[derive(Debug, Default)]
pub struct NoOpQueryCache {}

impl QueryCache for NoOpQueryCache {
    fn get(&self, _key: &QueryKey) -> Option<CachedRows> {
        None
    }

    fn put(&self, _key: QueryKey, _rows: CachedRows, _definition: &CacheDefinition) {}

    fn clean_by_key(&self, _logical: &str) -> usize {
        0
    }

    fn evict_expired(&self) -> usize {
        0
    }

    fn clear(&self) {}

    fn len(&self) -> usize {
        0
    }

    fn is_enabled(&self) -> bool {
        false
    }
}
