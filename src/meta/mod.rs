/*  This file is part of OneModel, a program to manage knowledge.
    Copyright in each year of 2025-2026 inclusive, Luke A. Call.
    OneModel is free software, distributed under a license that includes honesty, the Golden Rule,
    and the GNU Affero General Public License as published by the Free Software Foundation;
    see the file LICENSE for license version and details.
    OneModel is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranty of
    MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU Affero General Public License for more details.
    You should have received a copy of the GNU Affero General Public License along with OneModel.  If not, see <http://www.gnu.org/licenses/>
*/
pub mod attribute;
pub mod attribute_set;
pub mod attribute_type;
pub mod cache_index;
pub mod classification;
pub mod dimension;
pub mod entity_type;
mod loader;
pub mod sql_table;
pub mod status;

use crate::error::{PersistError, Result};
use crate::meta::attribute::Attribute;
use crate::meta::attribute_type::AttributeType;
use crate::meta::cache_index::{CacheIndex, CacheKey};
use crate::meta::dimension::{Dimension, Uom};
use crate::meta::entity_type::Type;
use crate::meta::sql_table::SqlTable;
use crate::meta::status::{Status, StatusGroup};
use crate::model::database::{with_connection, ConnectionProvider};
use crate::model::dialect::Dialect;
use crate::util::Util;
use std::collections::{BTreeSet, VecDeque};
use std::sync::Arc;
use tracing::*;

/// All metadata, loaded on first use and kept until cleared.  Entries are immutable once
/// published; a reader that finds an entry flagged dirty republishes it (and its dirty
/// descendants) as clean copies before using it.
pub struct MetadataCache {
    dialect: Dialect,
    pub(crate) tables: CacheIndex<SqlTable>,
    pub(crate) attribute_types: CacheIndex<AttributeType>,
    pub(crate) attributes: CacheIndex<Attribute>,
    pub(crate) types: CacheIndex<Type>,
    pub(crate) status_groups: CacheIndex<StatusGroup>,
    pub(crate) statuses: CacheIndex<Status>,
    pub(crate) dimensions: CacheIndex<Dimension>,
    pub(crate) uoms: CacheIndex<Uom>,
}

impl MetadataCache {
    pub fn new(dialect: Dialect) -> MetadataCache {
        MetadataCache {
            dialect,
            tables: CacheIndex::new("SQL table"),
            attribute_types: CacheIndex::new("attribute type"),
            attributes: CacheIndex::new("attribute"),
            types: CacheIndex::new("type"),
            status_groups: CacheIndex::new("status group"),
            statuses: CacheIndex::new("status"),
            dimensions: CacheIndex::new("dimension"),
            uoms: CacheIndex::new("unit of measure"),
        }
    }

    pub fn get_dialect(&self) -> &Dialect {
        &self.dialect
    }

    pub fn get_table(&self, provider: &dyn ConnectionProvider, key: impl Into<CacheKey>) -> Result<Arc<SqlTable>> {
        let key = key.into();
        if let Some(t) = self.tables.get(&key) {
            return Ok(t);
        }
        with_connection(provider, |conn| self.get_table_with(conn, &key))
    }

    pub fn get_attribute_type(
        &self,
        provider: &dyn ConnectionProvider,
        key: impl Into<CacheKey>,
    ) -> Result<Arc<AttributeType>> {
        let key = key.into();
        if let Some(t) = self.attribute_types.get(&key) {
            return Ok(t);
        }
        with_connection(provider, |conn| self.get_attribute_type_with(conn, &key))
    }

    /// By id, as bound to the type that declares it.
    pub fn get_attribute(&self, provider: &dyn ConnectionProvider, id: i64) -> Result<Arc<Attribute>> {
        if let Some(a) = self.attributes.get(&CacheKey::Id(id)) {
            return Ok(a);
        }
        with_connection(provider, |conn| self.load_attribute_owner_with(conn, id))?;
        self.attributes
            .get(&CacheKey::Id(id))
            .ok_or_else(|| PersistError::cache_reload(format!("Attribute id {} was not loaded with its type", id)))
    }

    /// Finds a type by id, name or uuid, loading it (and its ancestors) on a miss.
    pub fn get_type(&self, provider: &dyn ConnectionProvider, key: impl Into<CacheKey>) -> Result<Arc<Type>> {
        let key = key.into();
        if let Some(t) = self.types.get(&key) {
            return Ok(self.recache_if_dirty(t));
        }
        with_connection(provider, |conn| self.get_type_with(conn, &key, 0))
    }

    /// The type, without loading anything.
    pub fn get_cached_type(&self, key: impl Into<CacheKey>) -> Option<Arc<Type>> {
        self.types.get(&key.into())
    }

    /// The type with its menu, icon and form looked up.
    pub fn resolve_linkages(&self, provider: &dyn ConnectionProvider, key: impl Into<CacheKey>) -> Result<Arc<Type>> {
        let t = self.get_type(provider, key)?;
        if t.are_linkages_resolved() {
            return Ok(t);
        }
        let resolved = with_connection(provider, |conn| self.resolve_linkages_with(conn, &t))?;
        Ok(self.recache_if_dirty(resolved))
    }

    pub fn get_status_group(
        &self,
        provider: &dyn ConnectionProvider,
        key: impl Into<CacheKey>,
    ) -> Result<Arc<StatusGroup>> {
        let key = key.into();
        if let Some(g) = self.status_groups.get(&key) {
            return Ok(g);
        }
        with_connection(provider, |conn| self.get_status_group_with(conn, &key))
    }

    pub fn get_status(&self, provider: &dyn ConnectionProvider, id: i64) -> Result<Arc<Status>> {
        if let Some(s) = self.statuses.get(&CacheKey::Id(id)) {
            return Ok(s);
        }
        with_connection(provider, |conn| self.get_status_with(conn, id))
    }

    /// The status of a group by its key, e.g. ("InvoiceStatus", "Open").
    pub fn get_status_by_key(
        &self,
        provider: &dyn ConnectionProvider,
        group: impl Into<CacheKey>,
        key: &str,
    ) -> Result<Arc<Status>> {
        let g = self.get_status_group(provider, group)?;
        g.get(key).cloned().ok_or_else(|| {
            PersistError::invalid_value(format!("Status group '{}' has no status '{}'", g.get_type_name(), key))
        })
    }

    pub fn get_dimension(&self, provider: &dyn ConnectionProvider, key: impl Into<CacheKey>) -> Result<Arc<Dimension>> {
        let key = key.into();
        if let Some(d) = self.dimensions.get(&key) {
            return Ok(d);
        }
        with_connection(provider, |conn| self.get_dimension_with(conn, &key))
    }

    pub fn get_uom(&self, provider: &dyn ConnectionProvider, id: i64) -> Result<Arc<Uom>> {
        if let Some(u) = self.uoms.get(&CacheKey::Id(id)) {
            return Ok(u);
        }
        let d = with_connection(provider, |conn| self.get_dimension_of_uom_with(conn, id))?;
        d.get_uom(id)
            .cloned()
            .ok_or_else(|| PersistError::cache_reload(format!("Unit of measure id {} is not in its dimension", id)))
    }

    /// The dimension a quantity attribute measures in.
    pub fn get_dimension_of(&self, provider: &dyn ConnectionProvider, attribute: &Attribute) -> Result<Arc<Dimension>> {
        let uuid = attribute.get_dimension_uuid().ok_or_else(|| {
            PersistError::configuration(format!("Attribute '{}' has no dimension", attribute.get_name()))
        })?;
        self.get_dimension(provider, uuid)
    }

    pub fn get_child_types(&self, provider: &dyn ConnectionProvider, t: &Type) -> Result<Vec<Arc<Type>>> {
        t.get_child_type_ids()
            .iter()
            .map(|id| self.get_type(provider, *id))
            .collect()
    }

    /// Ids of every type below `t`, breadth first, not including `t`.
    pub fn get_descendant_ids(&self, provider: &dyn ConnectionProvider, t: &Type) -> Result<Vec<i64>> {
        let mut seen = BTreeSet::new();
        let mut out = Vec::new();
        let mut queue: VecDeque<i64> = t.get_child_type_ids().iter().copied().collect();
        while let Some(id) = queue.pop_front() {
            if id == t.get_id() || !seen.insert(id) {
                continue;
            }
            if seen.len() > Util::MAX_HIERARCHY_DEPTH * Util::MAX_HIERARCHY_DEPTH {
                return Err(PersistError::configuration(format!(
                    "Too many descendants below type '{}'",
                    t.get_name()
                )));
            }
            out.push(id);
            let child = self.get_type(provider, id)?;
            queue.extend(child.get_child_type_ids().iter().copied());
        }
        Ok(out)
    }

    /// The type and its ancestors, nearest first.
    pub fn get_ancestry(&self, provider: &dyn ConnectionProvider, t: &Arc<Type>) -> Result<Vec<Arc<Type>>> {
        let mut chain = vec![t.clone()];
        let mut current = t.clone();
        while let Some(pid) = current.get_parent_type_id() {
            if chain.len() > Util::MAX_HIERARCHY_DEPTH {
                return Err(PersistError::configuration(format!(
                    "Type hierarchy above '{}' is deeper than {}",
                    t.get_name(),
                    Util::MAX_HIERARCHY_DEPTH
                )));
            }
            current = self.get_type(provider, pid)?;
            chain.push(current.clone());
        }
        Ok(chain)
    }

    /// True when `t` is `ancestor_id` or descends from it.
    pub fn is_kind_of(&self, provider: &dyn ConnectionProvider, t: &Arc<Type>, ancestor_id: i64) -> Result<bool> {
        Ok(self.get_ancestry(provider, t)?.iter().any(|a| a.get_id() == ancestor_id))
    }

    /// The nearest type that every one of `types` is a kind of.
    pub fn get_common_ancestor(&self, provider: &dyn ConnectionProvider, types: &[Arc<Type>]) -> Result<Arc<Type>> {
        let first = types
            .first()
            .ok_or_else(|| PersistError::query_compilation("No types given to find a common ancestor of"))?;
        let mut candidates = self.get_ancestry(provider, first)?;
        for t in &types[1..] {
            let ids: BTreeSet<i64> = self.get_ancestry(provider, t)?.iter().map(|a| a.get_id()).collect();
            candidates.retain(|c| ids.contains(&c.get_id()));
        }
        candidates.into_iter().next().ok_or_else(|| {
            let names: Vec<&str> = types.iter().map(|t| t.get_name()).collect();
            PersistError::query_compilation(format!("Types {:?} have no common ancestor", names))
        })
    }

    /// Flags the type and every cached descendant for republication.  Returns how many were flagged.
    pub fn invalidate_type(&self, id: i64) -> usize {
        let mut count = 0;
        let mut queue = VecDeque::from([id]);
        let mut seen = BTreeSet::new();
        while let Some(id) = queue.pop_front() {
            if !seen.insert(id) {
                continue;
            }
            if let Some(t) = self.types.get(&CacheKey::Id(id)) {
                t.mark_dirty();
                count += 1;
                queue.extend(t.get_child_type_ids().iter().copied());
            }
        }
        debug!("Invalidated {} cached type(s) from type id {}.", count, id);
        count
    }

    pub(crate) fn recache_if_dirty(&self, t: Arc<Type>) -> Arc<Type> {
        if !t.is_dirty() {
            return t;
        }
        match self.recache(&t) {
            Ok(()) => self.types.get(&CacheKey::Id(t.get_id())).unwrap_or(t),
            Err(e) => {
                warn!("Could not recache type '{}', using the stale entry: {}", t.get_name(), e);
                t
            }
        }
    }

    /// Walks up to the root of `t`'s hierarchy, then republishes every dirty cached type below
    /// it as a clean copy.
    fn recache(&self, t: &Arc<Type>) -> Result<()> {
        let mut root = t.clone();
        let mut depth = 0;
        while let Some(pid) = root.get_parent_type_id() {
            depth += 1;
            if depth > Util::MAX_HIERARCHY_DEPTH {
                return Err(PersistError::cache_reload(format!(
                    "Type hierarchy above '{}' is deeper than {}",
                    t.get_name(),
                    Util::MAX_HIERARCHY_DEPTH
                )));
            }
            root = match self.types.get(&CacheKey::Id(pid)) {
                Some(p) => p,
                None => break,
            };
        }
        let mut queue = VecDeque::from([root]);
        let mut seen = BTreeSet::new();
        while let Some(current) = queue.pop_front() {
            if !seen.insert(current.get_id()) {
                continue;
            }
            if current.is_dirty() {
                self.types.publish(Arc::new(current.clean_copy()));
            }
            for cid in current.get_child_type_ids() {
                if let Some(c) = self.types.get(&CacheKey::Id(*cid)) {
                    queue.push_back(c);
                }
            }
        }
        Ok(())
    }

    pub fn clear_tables(&self) {
        self.tables.clear();
    }

    pub fn clear_attribute_types(&self) {
        self.attribute_types.clear();
    }

    /// Types and the attributes they hold.
    pub fn clear_types(&self) {
        self.types.clear();
        self.attributes.clear();
    }

    pub fn clear_statuses(&self) {
        self.status_groups.clear();
        self.statuses.clear();
    }

    pub fn clear_dimensions(&self) {
        self.dimensions.clear();
        self.uoms.clear();
    }

    pub fn clear_all(&self) {
        self.clear_tables();
        self.clear_attribute_types();
        self.clear_types();
        self.clear_statuses();
        self.clear_dimensions();
        info!("Cleared all metadata caches.");
    }

    /// Entry counts per cache, for diagnostics.
    pub fn get_sizes(&self) -> Vec<(&'static str, usize)> {
        vec![
            (self.tables.get_label(), self.tables.len()),
            (self.attribute_types.get_label(), self.attribute_types.len()),
            (self.attributes.get_label(), self.attributes.len()),
            (self.types.get_label(), self.types.len()),
            (self.status_groups.get_label(), self.status_groups.len()),
            (self.statuses.get_label(), self.statuses.len()),
            (self.dimensions.get_label(), self.dimensions.len()),
            (self.uoms.get_label(), self.uoms.len()),
        ]
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::error::ErrorKind;
    use crate::meta::entity_type::Linkage;
    use crate::test_support::Fixture;

    #[test]
    fn test_type_loads_with_ancestors_and_children() {
        Util::initialize_tracing();
        let f = Fixture::new();
        let cache = f.metadata();
        let employee = cache.get_type(f.provider(), "Employee").unwrap();
        assert_eq!(employee.get_id(), 102);
        assert!(cache.get_cached_type(101).is_some());
        assert!(cache.get_cached_type(100).is_some());
        // inherited from Entity, rebound to Employee
        let name = employee.get_attribute("Name").unwrap();
        assert_eq!(name.get_parent_type_id(), 102);
        assert!(employee.get_attribute("Email").is_some());
        assert!(employee.is_general_instance());
        assert_eq!(employee.get_main_table().unwrap().get_sql_table(), "T_ENTITY");

        let same = cache.get_type(f.provider(), 102).unwrap();
        assert!(Arc::ptr_eq(&employee, &same));
        let by_uuid = cache.get_type(f.provider(), Fixture::uuid(102)).unwrap();
        assert!(Arc::ptr_eq(&employee, &by_uuid));

        let entity = cache.get_type(f.provider(), 100).unwrap();
        let descendants = cache.get_descendant_ids(f.provider(), &entity).unwrap();
        assert_eq!(descendants, vec![101, 102]);
        assert!(cache.is_kind_of(f.provider(), &employee, 100).unwrap());
        assert!(!cache.is_kind_of(f.provider(), &entity, 102).unwrap());
    }

    #[test]
    fn test_missing_type_is_a_reload_error() {
        Util::initialize_tracing();
        let f = Fixture::new();
        let e = f.metadata().get_type(f.provider(), "NoSuchType").unwrap_err();
        assert!(e.is_kind(ErrorKind::CacheReload), "{}", e);
        assert!(e.get_message().contains("NoSuchType"));
    }

    #[test]
    fn test_attribute_by_id_loads_its_type() {
        Util::initialize_tracing();
        let f = Fixture::new();
        let cache = f.metadata();
        let total = cache.get_attribute(f.provider(), 1106).unwrap();
        assert_eq!(total.get_name(), "Total");
        assert_eq!(total.get_parent_type_id(), 110);
        assert!(cache.get_cached_type(110).is_some());
    }

    #[test]
    fn test_classification_back_reference_and_parent() {
        Util::initialize_tracing();
        let f = Fixture::new();
        let cache = f.metadata();
        let invoice = cache.get_type(f.provider(), "Invoice").unwrap();
        assert!(invoice.get_classified_by().contains(&130));

        let urgent = cache.get_type(f.provider(), "InvoiceClassUrgent").unwrap();
        let c = urgent.get_classification().unwrap();
        assert!(!c.is_root());
        assert_eq!(c.get_root_id(), 130);
        assert_eq!(c.get_classified_type_id(), Some(110));
        assert!(c.is_multiple_select());
        let root = cache.get_type(f.provider(), 130).unwrap();
        assert_eq!(root.get_classification().unwrap().get_child_classification_ids(), &[132]);
    }

    #[test]
    fn test_attribute_set_and_status_group() {
        Util::initialize_tracing();
        let f = Fixture::new();
        let cache = f.metadata();
        let taxes = cache.get_type(f.provider(), "Invoice_Taxes").unwrap();
        let set = taxes.get_attribute_set().unwrap();
        assert_eq!(set.get_owner_type_id(), 110);
        assert_eq!(set.get_link_attribute_name(), "Invoice");
        assert!(set.contains("Rate"));

        let open = cache.get_status_by_key(f.provider(), "InvoiceStatus", "Open").unwrap();
        assert_eq!(open.get_id(), 1);
        let paid = cache.get_status(f.provider(), 2).unwrap();
        assert_eq!(paid.get_key(), "Paid");
        assert!(cache.get_status_by_key(f.provider(), "InvoiceStatus", "Lost").is_err());
    }

    #[test]
    fn test_dimension_and_uoms() {
        Util::initialize_tracing();
        let f = Fixture::new();
        let cache = f.metadata();
        let position = cache.get_type(f.provider(), "InvoicePosition").unwrap();
        let length = position.get_attribute("Length").unwrap();
        let d = cache.get_dimension_of(f.provider(), length).unwrap();
        assert_eq!(d.get_name(), "Length");
        assert_eq!(d.get_base_uom().unwrap().get_name(), "m");
        let km = cache.get_uom(f.provider(), 3).unwrap();
        assert_eq!(km.base_value(2.0), 2000.0);
    }

    #[test]
    fn test_invalidate_and_recache() {
        Util::initialize_tracing();
        let f = Fixture::new();
        let cache = f.metadata();
        let employee = cache.get_type(f.provider(), "Employee").unwrap();
        assert_eq!(cache.invalidate_type(101), 2);
        assert!(employee.is_dirty());
        let fresh = cache.get_type(f.provider(), "Employee").unwrap();
        assert!(!fresh.is_dirty());
        assert!(!Arc::ptr_eq(&employee, &fresh));
        assert!(!cache.get_cached_type(101).unwrap().is_dirty());
        assert_eq!(cache.invalidate_type(999), 0);
    }

    #[test]
    fn test_linkages_inherit_from_parent() {
        Util::initialize_tracing();
        let f = Fixture::new();
        f.execute("INSERT INTO om_type_link (ID, TYPE_ID, LINK_KIND, TARGET_ID) VALUES (1, 110, 'menu', 500)");
        f.execute("INSERT INTO om_type_link (ID, TYPE_ID, LINK_KIND, TARGET_ID) VALUES (2, 111, 'form', 600)");
        let cache = f.metadata();
        let credit = cache.resolve_linkages(f.provider(), "CreditNote").unwrap();
        assert_eq!(credit.get_menu(), Linkage::Resolved(500));
        assert_eq!(credit.get_form(), Linkage::Resolved(600));
        assert_eq!(credit.get_icon(), Linkage::None);
        assert!(!credit.is_dirty());
    }

    #[test]
    fn test_clear_all_empties_every_cache() {
        Util::initialize_tracing();
        let f = Fixture::new();
        let cache = f.metadata();
        cache.get_type(f.provider(), "InvoicePosition").unwrap();
        assert!(cache.get_sizes().iter().any(|(_, n)| *n > 0));
        cache.clear_all();
        assert!(cache.get_sizes().iter().all(|(_, n)| *n == 0));
        assert!(cache.get_type(f.provider(), "InvoicePosition").is_ok());
    }

    #[test]
    fn test_common_ancestor() {
        Util::initialize_tracing();
        let f = Fixture::new();
        let cache = f.metadata();
        let employee = cache.get_type(f.provider(), "Employee").unwrap();
        let person = cache.get_type(f.provider(), "Person").unwrap();
        let invoice = cache.get_type(f.provider(), "Invoice").unwrap();
        let common = cache.get_common_ancestor(f.provider(), &[employee.clone(), person]).unwrap();
        assert_eq!(common.get_id(), 101);
        let e = cache.get_common_ancestor(f.provider(), &[employee, invoice]).unwrap_err();
        assert!(e.is_kind(ErrorKind::QueryCompilation));
    }
}
