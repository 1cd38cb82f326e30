/*  This file is part of OneModel, a program to manage knowledge.
    Copyright in each year of 2025-2026 inclusive, Luke A. Call.
    OneModel is free software, distributed under a license that includes honesty, the Golden Rule,
    and the GNU Affero General Public License as published by the Free Software Foundation;
    see the file LICENSE for license version and details.
    OneModel is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranty of
    MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU Affero General Public License for more details.
    You should have received a copy of the GNU Affero General Public License along with OneModel.  If not, see <http://www.gnu.org/licenses/>
*/
//! The single loader path of each metadata cache.  Everything here works on a connection it
//! was handed, so that loading one entity can load others (a type's parent, its tables) on the
//! same connection without asking for it again.
use crate::error::{ErrorKind, PersistError, Result};
use crate::meta::attribute::{Attribute, AttributeRow};
use crate::meta::attribute_set::AttributeSetData;
use crate::meta::attribute_type::AttributeType;
use crate::meta::cache_index::CacheKey;
use crate::meta::classification::ClassificationData;
use crate::meta::dimension::Dimension;
use crate::meta::entity_type::{Type, TypeRow, TypeVariant};
use crate::meta::sql_table::SqlTable;
use crate::meta::status::{Status, StatusGroup};
use crate::meta::MetadataCache;
use crate::model::database::{get_i64, get_string, opt_i64, opt_string, ColumnType, DbConnection};
use crate::util::Util;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::*;

/// Leaves configuration errors as they are; anything else becomes a cache reload error that
/// says what was being loaded.
fn as_reload_error(what: &str, key: &CacheKey, e: PersistError) -> PersistError {
    match e.get_kind() {
        ErrorKind::Configuration | ErrorKind::CacheReload => e,
        _ => PersistError::wrap(ErrorKind::CacheReload, &format!("loading {} {}", what, key), &e),
    }
}

fn key_condition(key: &CacheKey) -> String {
    match key {
        CacheKey::Id(id) => format!("ID = {}", id),
        CacheKey::Name(name) => format!("NAME = {}", Util::quote(name)),
        CacheKey::Uuid(uuid) => format!("UUID = '{}'", uuid),
    }
}

impl MetadataCache {
    pub(crate) fn get_table_with(&self, conn: &mut dyn DbConnection, key: &CacheKey) -> Result<Arc<SqlTable>> {
        if let Some(t) = self.tables.get(key) {
            return Ok(t);
        }
        let table = SqlTable::load(conn, &self.dialect, key).map_err(|e| as_reload_error("SQL table", key, e))?;
        debug!("Loaded SQL table '{}' ({}).", table.get_name(), table.get_sql_table());
        let table = Arc::new(table);
        self.tables.publish(table.clone());
        Ok(table)
    }

    pub(crate) fn get_attribute_type_with(
        &self,
        conn: &mut dyn DbConnection,
        key: &CacheKey,
    ) -> Result<Arc<AttributeType>> {
        if let Some(t) = self.attribute_types.get(key) {
            return Ok(t);
        }
        let at = AttributeType::load(conn, key).map_err(|e| as_reload_error("attribute type", key, e))?;
        let at = Arc::new(at);
        self.attribute_types.publish(at.clone());
        Ok(at)
    }

    pub(crate) fn get_type_with(&self, conn: &mut dyn DbConnection, key: &CacheKey, depth: usize) -> Result<Arc<Type>> {
        if let Some(t) = self.types.get(key) {
            return Ok(self.recache_if_dirty(t));
        }
        if depth > Util::MAX_HIERARCHY_DEPTH {
            return Err(PersistError::configuration(format!(
                "Type hierarchy deeper than {} while loading type {} (a loop in the parent links?)",
                Util::MAX_HIERARCHY_DEPTH,
                key
            )));
        }
        let t = self.load_type(conn, key, depth).map_err(|e| as_reload_error("type", key, e))?;
        Ok(t)
    }

    fn load_type(&self, conn: &mut dyn DbConnection, key: &CacheKey, depth: usize) -> Result<Arc<Type>> {
        let sql = format!(
            "SELECT {} FROM {} WHERE {}",
            TypeRow::SELECT_COLUMNS,
            Util::TYPE_TABLE,
            key_condition(key)
        );
        let rows = conn.query(&sql, &TypeRow::SELECT_TYPES)?;
        let row = match rows.first() {
            Some(r) => TypeRow::from_row(r)?,
            None => return Err(PersistError::cache_reload(format!("Type {}{}", key, Util::DOES_NOT_EXIST))),
        };

        let parent = match row.parent_type_id {
            Some(pid) => Some(self.get_type_with(conn, &CacheKey::Id(pid), depth + 1)?),
            None => None,
        };

        let own_attributes = self.load_own_attributes(conn, &row)?;

        let child_sql = format!(
            "SELECT ID FROM {} WHERE PARENT_TYPE_ID = {} ORDER BY ID",
            Util::TYPE_TABLE,
            row.id
        );
        let child_type_ids: Vec<i64> = conn
            .query(&child_sql, &[ColumnType::Bigint])?
            .iter()
            .filter_map(|r| opt_i64(r, 0))
            .collect();

        // root classifications that classify this type
        let classified_sql = format!(
            "SELECT ID, PURPOSE FROM {} WHERE OWNER_TYPE_ID = {} AND PARENT_CLASSIFICATION_ID IS NULL",
            Util::TYPE_TABLE,
            row.id
        );
        let classified_by: BTreeSet<i64> = conn
            .query(&classified_sql, &[ColumnType::Bigint, ColumnType::Bigint])?
            .iter()
            .filter(|r| opt_i64(r, 1).unwrap_or(0) & Util::PURPOSE_CLASSIFICATION != 0)
            .filter_map(|r| opt_i64(r, 0))
            .collect();

        let variant = if row.has_purpose(Util::PURPOSE_CLASSIFICATION) {
            let sub_sql = format!(
                "SELECT ID FROM {} WHERE PARENT_CLASSIFICATION_ID = {} ORDER BY ID",
                Util::TYPE_TABLE,
                row.id
            );
            let child_classification_ids: Vec<i64> = conn
                .query(&sub_sql, &[ColumnType::Bigint])?
                .iter()
                .filter_map(|r| opt_i64(r, 0))
                .collect();
            let parent_classification = match row.parent_classification_id {
                Some(pcid) => {
                    let pc = self.get_type_with(conn, &CacheKey::Id(pcid), depth + 1)?;
                    match pc.get_classification() {
                        Some(data) => Some(data.clone()),
                        None => {
                            return Err(PersistError::configuration(format!(
                                "Classification '{}' names '{}' as its parent classification, which is not a classification",
                                row.name,
                                pc.get_name()
                            )))
                        }
                    }
                }
                None => None,
            };
            TypeVariant::Classification(ClassificationData::new(
                row.id,
                &row,
                child_classification_ids,
                parent_classification.as_ref(),
            ))
        } else if row.has_purpose(Util::PURPOSE_ATTRIBUTE_SET) {
            let owner = row.owner_type_id.ok_or_else(|| {
                PersistError::configuration(format!("Attribute set '{}' has no owner type", row.name))
            })?;
            let link = row.link_attr.clone().ok_or_else(|| {
                PersistError::configuration(format!("Attribute set '{}' has no link attribute", row.name))
            })?;
            if !own_attributes.iter().any(|a| a.get_name() == link) {
                return Err(PersistError::configuration(format!(
                    "Attribute set '{}' has no attribute '{}' to link it to its owner",
                    row.name, link
                )));
            }
            let names = own_attributes.iter().map(|a| a.get_name().to_string()).collect();
            TypeVariant::AttributeSet(AttributeSetData::new(owner, &link, names))
        } else {
            TypeVariant::Plain
        };

        let own_for_index: Vec<Attribute> = own_attributes.clone();
        let t = Type::new(&row, parent.as_deref(), own_attributes, child_type_ids, classified_by, variant)?;
        let t = Arc::new(t);
        self.types.publish(t.clone());
        for a in own_for_index {
            self.attributes.publish(Arc::new(a));
        }
        debug!(
            "Loaded type '{}' (id {}) with {} attribute(s).",
            t.get_name(),
            t.get_id(),
            t.get_attributes().len()
        );

        if let Some(c) = t.get_classification() {
            if c.is_root() {
                if let Some(classified_id) = c.get_classified_type_id() {
                    self.add_classified_by(classified_id, t.get_id());
                }
            }
        }
        Ok(t)
    }

    /// The attributes whose om_attribute.TYPE_ID is this type, with their properties.
    fn load_own_attributes(&self, conn: &mut dyn DbConnection, row: &TypeRow) -> Result<Vec<Attribute>> {
        let sql = format!(
            "SELECT {} FROM {} WHERE TYPE_ID = {} ORDER BY ID",
            AttributeRow::SELECT_COLUMNS,
            Util::ATTRIBUTE_TABLE,
            row.id
        );
        let rows = conn.query(&sql, &AttributeRow::SELECT_TYPES)?;
        let attribute_rows: Vec<AttributeRow> = rows.iter().map(AttributeRow::from_row).collect::<Result<_>>()?;
        if attribute_rows.is_empty() {
            return Ok(vec![]);
        }

        let property_sql = format!(
            "SELECT ATTRIBUTE_ID, NAME, VALUE FROM {} WHERE ATTRIBUTE_ID IN (SELECT ID FROM {} WHERE TYPE_ID = {}) ORDER BY ID",
            Util::PROPERTY_TABLE,
            Util::ATTRIBUTE_TABLE,
            row.id
        );
        let mut properties: BTreeMap<i64, BTreeMap<String, String>> = BTreeMap::new();
        for p in conn.query(&property_sql, &[ColumnType::Bigint, ColumnType::String, ColumnType::String])? {
            properties
                .entry(get_i64(&p, 0, "ATTRIBUTE_ID")?)
                .or_default()
                .insert(get_string(&p, 1, "NAME")?, opt_string(&p, 2).unwrap_or_default());
        }

        let mut attributes = Vec::with_capacity(attribute_rows.len());
        for ar in &attribute_rows {
            let table = self.get_table_with(conn, &CacheKey::Id(ar.table_id))?;
            let attribute_type = self.get_attribute_type_with(conn, &CacheKey::Id(ar.attribute_type_id))?;
            let props = properties.remove(&ar.id).unwrap_or_default();
            let a = Attribute::new(ar, table, attribute_type, props).map_err(|e| {
                PersistError::wrap(e.get_kind(), &format!("type '{}'", row.name), &e)
            })?;
            attributes.push(a);
        }
        Ok(attributes)
    }

    /// Republishes the classified type, if it is cached, with the back-reference added.  If it
    /// is not cached, its own load will find the classification.
    fn add_classified_by(&self, classified_type_id: i64, classification_id: i64) {
        if let Some(classified) = self.types.get(&CacheKey::Id(classified_type_id)) {
            if !classified.get_classified_by().contains(&classification_id) {
                self.types.publish(Arc::new(classified.with_classified_by(classification_id)));
            }
        }
    }

    pub(crate) fn get_status_group_with(&self, conn: &mut dyn DbConnection, key: &CacheKey) -> Result<Arc<StatusGroup>> {
        if let Some(g) = self.status_groups.get(key) {
            return Ok(g);
        }
        let group_type = self.get_type_with(conn, key, 0)?;
        let group = StatusGroup::load(conn, &group_type).map_err(|e| as_reload_error("status group", key, e))?;
        let group = Arc::new(group);
        for s in group.get_statuses() {
            self.statuses.publish(s.clone());
        }
        self.status_groups.publish(group.clone());
        Ok(group)
    }

    pub(crate) fn get_status_with(&self, conn: &mut dyn DbConnection, id: i64) -> Result<Arc<Status>> {
        if let Some(s) = self.statuses.get(&CacheKey::Id(id)) {
            return Ok(s);
        }
        let sql = format!("SELECT TYPE_ID FROM {} WHERE ID = {}", Util::STATUS_TABLE, id);
        let rows = conn.query(&sql, &[ColumnType::Bigint])?;
        let group_type_id = rows
            .first()
            .and_then(|r| opt_i64(r, 0))
            .ok_or_else(|| PersistError::cache_reload(format!("Status id {}{}", id, Util::DOES_NOT_EXIST)))?;
        let group = self.get_status_group_with(conn, &CacheKey::Id(group_type_id))?;
        group
            .get_by_id(id)
            .cloned()
            .ok_or_else(|| PersistError::cache_reload(format!("Status id {} is not in its group", id)))
    }

    pub(crate) fn get_dimension_with(&self, conn: &mut dyn DbConnection, key: &CacheKey) -> Result<Arc<Dimension>> {
        if let Some(d) = self.dimensions.get(key) {
            return Ok(d);
        }
        let d = Dimension::load(conn, key).map_err(|e| as_reload_error("dimension", key, e))?;
        let d = Arc::new(d);
        for u in d.get_uoms() {
            self.uoms.publish(u.clone());
        }
        self.dimensions.publish(d.clone());
        Ok(d)
    }

    pub(crate) fn get_dimension_of_uom_with(&self, conn: &mut dyn DbConnection, uom_id: i64) -> Result<Arc<Dimension>> {
        let sql = format!("SELECT DIMENSION_ID FROM {} WHERE ID = {}", Util::UOM_TABLE, uom_id);
        let rows = conn.query(&sql, &[ColumnType::Bigint])?;
        let dimension_id = rows
            .first()
            .and_then(|r| opt_i64(r, 0))
            .ok_or_else(|| PersistError::cache_reload(format!("Unit of measure id {}{}", uom_id, Util::DOES_NOT_EXIST)))?;
        self.get_dimension_with(conn, &CacheKey::Id(dimension_id))
    }

    /// Finds which type declares attribute `id`, and loads that type.
    pub(crate) fn load_attribute_owner_with(&self, conn: &mut dyn DbConnection, id: i64) -> Result<Arc<Type>> {
        let sql = format!("SELECT TYPE_ID FROM {} WHERE ID = {}", Util::ATTRIBUTE_TABLE, id);
        let rows = conn.query(&sql, &[ColumnType::Bigint])?;
        let type_id = rows
            .first()
            .and_then(|r| opt_i64(r, 0))
            .ok_or_else(|| PersistError::cache_reload(format!("Attribute id {}{}", id, Util::DOES_NOT_EXIST)))?;
        self.get_type_with(conn, &CacheKey::Id(type_id), 0)
    }

    /// Reads the menu/icon/form rows of a type.  Unset ones come from the parent, when it has them.
    pub(crate) fn load_linkages_with(
        &self,
        conn: &mut dyn DbConnection,
        t: &Type,
    ) -> Result<(Option<i64>, Option<i64>, Option<i64>)> {
        let sql = format!(
            "SELECT LINK_KIND, TARGET_ID FROM {} WHERE TYPE_ID = {} ORDER BY ID",
            Util::TYPE_LINK_TABLE,
            t.get_id()
        );
        let mut menu = None;
        let mut icon = None;
        let mut form = None;
        for r in conn.query(&sql, &[ColumnType::String, ColumnType::Bigint])? {
            let kind = opt_string(&r, 0).unwrap_or_default();
            let target = opt_i64(&r, 1);
            match kind.as_str() {
                Util::LINK_KIND_MENU => menu = menu.or(target),
                Util::LINK_KIND_ICON => icon = icon.or(target),
                Util::LINK_KIND_FORM => form = form.or(target),
                other => warn!("Ignoring unknown link kind '{}' on type '{}'.", other, t.get_name()),
            }
        }
        if menu.is_none() || icon.is_none() || form.is_none() {
            if let Some(pid) = t.get_parent_type_id() {
                let parent = self.get_type_with(conn, &CacheKey::Id(pid), 0)?;
                let parent = self.resolve_linkages_with(conn, &parent)?;
                menu = menu.or(parent.get_menu().get().copied());
                icon = icon.or(parent.get_icon().get().copied());
                form = form.or(parent.get_form().get().copied());
            }
        }
        Ok((menu, icon, form))
    }

    pub(crate) fn resolve_linkages_with(&self, conn: &mut dyn DbConnection, t: &Arc<Type>) -> Result<Arc<Type>> {
        if t.are_linkages_resolved() {
            return Ok(t.clone());
        }
        let (menu, icon, form) = self.load_linkages_with(conn, t)?;
        let resolved = Arc::new(t.with_linkages(menu, icon, form));
        self.types.publish(resolved.clone());
        Ok(resolved)
    }
}
