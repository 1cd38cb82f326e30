/*  This file is part of OneModel, a program to manage knowledge.
    Copyright in each year of 2025-2026 inclusive, Luke A. Call.
    OneModel is free software, distributed under a license that includes honesty, the Golden Rule,
    and the GNU Affero General Public License as published by the Free Software Foundation;
    see the file LICENSE for license version and details.
    OneModel is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranty of
    MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU Affero General Public License for more details.
    You should have received a copy of the GNU Affero General Public License along with OneModel.  If not, see <http://www.gnu.org/licenses/>
*/
use crate::error::{PersistError, Result};
use crate::meta::attribute::Attribute;
use crate::meta::attribute_set::AttributeSetData;
use crate::meta::attribute_type::AttributeKind;
use crate::meta::cache_index::CacheObject;
use crate::meta::classification::ClassificationData;
use crate::meta::sql_table::SqlTable;
use crate::model::database::{get_i64, get_string, opt_bool, opt_i64, opt_string, ColumnType, DbRow};
use crate::util::Util;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use uuid::Uuid;

/// One om_type row.
#[derive(Debug, Clone, Default)]
pub struct TypeRow {
    pub id: i64,
    pub uuid: Uuid,
    pub name: String,
    pub purpose: i64,
    pub parent_type_id: Option<i64>,
    pub parent_classification_id: Option<i64>,
    /// the classified type for a classification, the owner type for an attribute set
    pub owner_type_id: Option<i64>,
    pub link_attr: Option<String>,
    pub relation_type_id: Option<i64>,
    pub relation_link_attr: Option<String>,
    pub relation_class_attr: Option<String>,
    pub multiple_select: Option<bool>,
    pub company_dependent: Option<bool>,
}

impl TypeRow {
    pub const SELECT_COLUMNS: &'static str = "ID, UUID, NAME, PURPOSE, PARENT_TYPE_ID, PARENT_CLASSIFICATION_ID, \
         OWNER_TYPE_ID, LINK_ATTR, RELATION_TYPE_ID, RELATION_LINK_ATTR, RELATION_CLASS_ATTR, MULTIPLE_SELECT, \
         COMPANY_DEPENDENT";
    pub const SELECT_TYPES: [ColumnType; 13] = [
        ColumnType::Bigint,
        ColumnType::String,
        ColumnType::String,
        ColumnType::Bigint,
        ColumnType::Bigint,
        ColumnType::Bigint,
        ColumnType::Bigint,
        ColumnType::String,
        ColumnType::Bigint,
        ColumnType::String,
        ColumnType::String,
        ColumnType::Boolean,
        ColumnType::Boolean,
    ];

    pub fn from_row(row: &DbRow) -> Result<TypeRow> {
        let not_blank = |s: String| if s.trim().is_empty() { None } else { Some(s) };
        Ok(TypeRow {
            id: get_i64(row, 0, "ID")?,
            uuid: Uuid::parse_str(&get_string(row, 1, "UUID")?)?,
            name: get_string(row, 2, "NAME")?,
            purpose: opt_i64(row, 3).unwrap_or(0),
            parent_type_id: opt_i64(row, 4).filter(|id| *id > 0),
            parent_classification_id: opt_i64(row, 5).filter(|id| *id > 0),
            owner_type_id: opt_i64(row, 6).filter(|id| *id > 0),
            link_attr: opt_string(row, 7).and_then(not_blank),
            relation_type_id: opt_i64(row, 8).filter(|id| *id > 0),
            relation_link_attr: opt_string(row, 9).and_then(not_blank),
            relation_class_attr: opt_string(row, 10).and_then(not_blank),
            multiple_select: opt_bool(row, 11),
            company_dependent: opt_bool(row, 12),
        })
    }

    pub fn has_purpose(&self, bit: i64) -> bool {
        self.purpose & bit == bit
    }
}

/// A lazily looked-up reference: not looked up yet, looked up and absent, or present.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Linkage<T> {
    Unresolved,
    None,
    Resolved(T),
}

impl<T> Linkage<T> {
    pub fn is_resolved(&self) -> bool {
        !matches!(self, Linkage::Unresolved)
    }

    pub fn get(&self) -> Option<&T> {
        match self {
            Linkage::Resolved(t) => Some(t),
            _ => None,
        }
    }
}

impl<T> From<Option<T>> for Linkage<T> {
    fn from(o: Option<T>) -> Self {
        match o {
            Some(t) => Linkage::Resolved(t),
            None => Linkage::None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeVariant {
    Plain,
    Classification(ClassificationData),
    AttributeSet(AttributeSetData),
}

/// A dynamically defined kind of persisted thing.  Structural fields never change after
/// construction; anything that does change (linkages, back-references) is applied to a copy
/// which then replaces this one in the cache.
#[derive(Debug)]
pub struct Type {
    id: i64,
    uuid: Uuid,
    name: String,
    purpose: i64,
    parent_type_id: Option<i64>,
    child_type_ids: Vec<i64>,
    attributes: BTreeMap<String, Arc<Attribute>>,
    own_attribute_ids: BTreeSet<i64>,
    tables: Vec<Arc<SqlTable>>,
    main_table: Option<Arc<SqlTable>>,
    general_instance: bool,
    status_attribute_name: Option<String>,
    company_attribute_name: Option<String>,
    consortium_attribute_name: Option<String>,
    group_attribute_name: Option<String>,
    association_attribute_name: Option<String>,
    type_attribute_name: Option<String>,
    menu: Linkage<i64>,
    icon: Linkage<i64>,
    form: Linkage<i64>,
    classified_by: BTreeSet<i64>,
    variant: TypeVariant,
    dirty: AtomicBool,
}

impl Clone for Type {
    fn clone(&self) -> Self {
        Type {
            id: self.id,
            uuid: self.uuid,
            name: self.name.clone(),
            purpose: self.purpose,
            parent_type_id: self.parent_type_id,
            child_type_ids: self.child_type_ids.clone(),
            attributes: self.attributes.clone(),
            own_attribute_ids: self.own_attribute_ids.clone(),
            tables: self.tables.clone(),
            main_table: self.main_table.clone(),
            general_instance: self.general_instance,
            status_attribute_name: self.status_attribute_name.clone(),
            company_attribute_name: self.company_attribute_name.clone(),
            consortium_attribute_name: self.consortium_attribute_name.clone(),
            group_attribute_name: self.group_attribute_name.clone(),
            association_attribute_name: self.association_attribute_name.clone(),
            type_attribute_name: self.type_attribute_name.clone(),
            menu: self.menu,
            icon: self.icon,
            form: self.form,
            classified_by: self.classified_by.clone(),
            variant: self.variant.clone(),
            dirty: AtomicBool::new(self.dirty.load(Ordering::Acquire)),
        }
    }
}

impl Type {
    /// Assembles a type from its row, its already-loaded parent, and its own attributes.  Every
    /// attribute of the parent that this type does not itself define is copied down, rebound to
    /// this type.
    pub fn new(
        row: &TypeRow,
        parent: Option<&Type>,
        own_attributes: Vec<Attribute>,
        child_type_ids: Vec<i64>,
        classified_by: BTreeSet<i64>,
        variant: TypeVariant,
    ) -> Result<Type> {
        if row.parent_type_id == Some(row.id) {
            return Err(PersistError::configuration(format!(
                "Type '{}' (id {}) names itself as its parent",
                row.name, row.id
            )));
        }
        match (row.parent_type_id, parent) {
            (Some(pid), Some(p)) if p.get_id() != pid => {
                return Err(PersistError::configuration(format!(
                    "Type '{}' was given parent {} but its row says {}",
                    row.name,
                    p.get_id(),
                    pid
                )))
            }
            (Some(pid), None) => {
                return Err(PersistError::configuration(format!(
                    "Type '{}' needs its parent type (id {}) loaded first",
                    row.name, pid
                )))
            }
            _ => {}
        }

        let mut attributes: BTreeMap<String, Arc<Attribute>> = BTreeMap::new();
        let mut own_attribute_ids = BTreeSet::new();
        for a in own_attributes {
            if attributes.contains_key(a.get_name()) {
                return Err(PersistError::configuration(format!(
                    "Type '{}' defines attribute '{}' more than once",
                    row.name,
                    a.get_name()
                )));
            }
            own_attribute_ids.insert(a.get_id());
            attributes.insert(a.get_name().to_string(), Arc::new(a.copy(row.id)));
        }
        if let Some(p) = parent {
            for (name, a) in p.get_attributes() {
                if !attributes.contains_key(name) {
                    attributes.insert(name.clone(), Arc::new(a.copy(row.id)));
                }
            }
        }

        // the main table is the parent's; failing that, the first table of our own that is not an
        // extension of another.
        let mut main_table: Option<Arc<SqlTable>> = parent.and_then(|p| p.get_main_table().cloned());
        let mut tables: Vec<Arc<SqlTable>> = parent.map(|p| p.get_tables().to_vec()).unwrap_or_default();
        for a in attributes.values() {
            if a.get_kind() == AttributeKind::AttributeSet {
                continue;
            }
            let t = a.get_table();
            if main_table.is_none() && t.get_parent_table_id().is_none() {
                main_table = Some(t.clone());
            }
            if !tables.iter().any(|x| x.get_id() == t.get_id()) {
                tables.push(t.clone());
            }
        }
        if let Some(m) = &main_table {
            tables.retain(|t| t.get_id() != m.get_id());
            tables.insert(0, m.clone());
        }

        let general_instance = if row.has_purpose(Util::PURPOSE_GENERAL_INSTANCE) {
            true
        } else if row.has_purpose(Util::PURPOSE_NO_GENERAL_INSTANCE) {
            false
        } else {
            parent.map(|p| p.is_general_instance()).unwrap_or(false)
        };

        let find = |kind: AttributeKind| -> Option<String> {
            attributes
                .values()
                .find(|a| a.get_kind() == kind)
                .map(|a| a.get_name().to_string())
        };
        let status_attribute_name = find(AttributeKind::Status);
        let company_attribute_name = find(AttributeKind::CompanyLink);
        let consortium_attribute_name = find(AttributeKind::ConsortiumLink);
        let group_attribute_name = find(AttributeKind::GroupLink);
        let association_attribute_name = find(AttributeKind::AssociationLink);
        let type_attribute_name = find(AttributeKind::Type);

        Ok(Type {
            id: row.id,
            uuid: row.uuid,
            name: row.name.clone(),
            purpose: row.purpose,
            parent_type_id: row.parent_type_id,
            child_type_ids,
            attributes,
            own_attribute_ids,
            tables,
            main_table,
            general_instance,
            status_attribute_name,
            company_attribute_name,
            consortium_attribute_name,
            group_attribute_name,
            association_attribute_name,
            type_attribute_name,
            menu: Linkage::Unresolved,
            icon: Linkage::Unresolved,
            form: Linkage::Unresolved,
            classified_by,
            variant,
            dirty: AtomicBool::new(false),
        })
    }

    pub fn get_id(&self) -> i64 {
        self.id
    }

    pub fn get_uuid(&self) -> Uuid {
        self.uuid
    }

    pub fn get_name(&self) -> &str {
        &self.name
    }

    pub fn get_purpose(&self) -> i64 {
        self.purpose
    }

    pub fn get_parent_type_id(&self) -> Option<i64> {
        self.parent_type_id
    }

    pub fn get_child_type_ids(&self) -> &[i64] {
        &self.child_type_ids
    }

    /// Own and inherited attributes, by name.
    pub fn get_attributes(&self) -> &BTreeMap<String, Arc<Attribute>> {
        &self.attributes
    }

    pub fn get_attribute(&self, name: &str) -> Option<&Arc<Attribute>> {
        self.attributes.get(name)
    }

    pub fn get_attribute_by_id(&self, id: i64) -> Option<&Arc<Attribute>> {
        self.attributes.values().find(|a| a.get_id() == id)
    }

    /// The attribute, or a query compilation error naming this type.
    pub fn require_attribute(&self, name: &str) -> Result<&Arc<Attribute>> {
        self.get_attribute(name).ok_or_else(|| {
            PersistError::query_compilation(format!("Type '{}' has no attribute '{}'", self.name, name))
        })
    }

    pub fn is_own_attribute(&self, attribute: &Attribute) -> bool {
        self.own_attribute_ids.contains(&attribute.get_id())
    }

    pub fn get_tables(&self) -> &[Arc<SqlTable>] {
        &self.tables
    }

    pub fn get_main_table(&self) -> Option<&Arc<SqlTable>> {
        self.main_table.as_ref()
    }

    /// For queries: the main table, or an error naming this type.
    pub fn require_main_table(&self) -> Result<&Arc<SqlTable>> {
        self.main_table.as_ref().ok_or_else(|| {
            PersistError::query_compilation(format!(
                "Type '{}' (id {}) has no main table",
                self.name, self.id
            ))
        })
    }

    pub fn is_abstract(&self) -> bool {
        self.purpose & Util::PURPOSE_ABSTRACT != 0
    }

    pub fn has_history(&self) -> bool {
        self.purpose & Util::PURPOSE_HISTORY != 0
    }

    pub fn is_general_instance(&self) -> bool {
        self.general_instance
    }

    pub fn get_status_attribute(&self) -> Option<&Arc<Attribute>> {
        self.status_attribute_name.as_ref().and_then(|n| self.attributes.get(n))
    }

    pub fn get_company_attribute(&self) -> Option<&Arc<Attribute>> {
        self.company_attribute_name.as_ref().and_then(|n| self.attributes.get(n))
    }

    pub fn get_consortium_attribute(&self) -> Option<&Arc<Attribute>> {
        self.consortium_attribute_name.as_ref().and_then(|n| self.attributes.get(n))
    }

    pub fn get_group_attribute(&self) -> Option<&Arc<Attribute>> {
        self.group_attribute_name.as_ref().and_then(|n| self.attributes.get(n))
    }

    pub fn get_association_attribute(&self) -> Option<&Arc<Attribute>> {
        self.association_attribute_name.as_ref().and_then(|n| self.attributes.get(n))
    }

    pub fn get_type_attribute(&self) -> Option<&Arc<Attribute>> {
        self.type_attribute_name.as_ref().and_then(|n| self.attributes.get(n))
    }

    /// Rows of this type belong to one company (or consortium) each.
    pub fn is_company_dependent(&self) -> bool {
        self.company_attribute_name.is_some() || self.consortium_attribute_name.is_some()
    }

    pub fn is_association_dependent(&self) -> bool {
        self.association_attribute_name.is_some()
    }

    pub fn get_menu(&self) -> Linkage<i64> {
        self.menu
    }

    pub fn get_icon(&self) -> Linkage<i64> {
        self.icon
    }

    pub fn get_form(&self) -> Linkage<i64> {
        self.form
    }

    pub fn are_linkages_resolved(&self) -> bool {
        self.menu.is_resolved() && self.icon.is_resolved() && self.form.is_resolved()
    }

    /// Ids of classifications that classify this type.
    pub fn get_classified_by(&self) -> &BTreeSet<i64> {
        &self.classified_by
    }

    pub fn get_variant(&self) -> &TypeVariant {
        &self.variant
    }

    pub fn get_classification(&self) -> Option<&ClassificationData> {
        match &self.variant {
            TypeVariant::Classification(c) => Some(c),
            _ => None,
        }
    }

    pub fn is_classification(&self) -> bool {
        self.get_classification().is_some()
    }

    pub fn get_attribute_set(&self) -> Option<&AttributeSetData> {
        match &self.variant {
            TypeVariant::AttributeSet(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_attribute_set(&self) -> bool {
        self.get_attribute_set().is_some()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Acquire)
    }

    /// Flags this entry for re-publication by the next reader.  The flag is the only thing ever
    /// changed on a published Type.
    pub fn mark_dirty(&self) {
        self.dirty.store(true, Ordering::Release);
    }

    pub fn clean_copy(&self) -> Type {
        let c = self.clone();
        c.dirty.store(false, Ordering::Release);
        c
    }

    /// A dirty copy with one more classification back-reference.
    pub fn with_classified_by(&self, classification_id: i64) -> Type {
        let mut c = self.clone();
        c.classified_by.insert(classification_id);
        c.dirty.store(true, Ordering::Release);
        c
    }

    /// A dirty copy with the UI linkages resolved.
    pub fn with_linkages(&self, menu: Option<i64>, icon: Option<i64>, form: Option<i64>) -> Type {
        let mut c = self.clone();
        c.menu = menu.into();
        c.icon = icon.into();
        c.form = form.into();
        c.dirty.store(true, Ordering::Release);
        c
    }
}

impl CacheObject for Type {
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

#[cfg(test)]
mod test {
    use super::*;
    use crate::meta::attribute::AttributeRow;
    use crate::meta::attribute_type::AttributeType;
    use crate::model::dialect::ColumnInfo;

    fn col(name: &str, nullable: bool, size: i64) -> ColumnInfo {
        ColumnInfo { name: name.to_string(), nullable, size, scale: 0 }
    }

    fn entity_table() -> Arc<SqlTable> {
        Arc::new(SqlTable::new(
            10,
            Uuid::new_v4(),
            "Entity",
            "T_ENTITY",
            "ID",
            Some("TYPEID"),
            None,
            vec![col("ID", false, 0), col("TYPEID", false, 0), col("NAME", false, 64)],
        ))
    }

    fn person_table() -> Arc<SqlTable> {
        Arc::new(SqlTable::new(
            11,
            Uuid::new_v4(),
            "Person",
            "T_PERSON",
            "ID",
            None,
            Some(10),
            vec![col("ID", false, 0), col("EMAIL", true, 128)],
        ))
    }

    fn attribute(id: i64, name: &str, type_id: i64, table: Arc<SqlTable>, class_name: &str, column: &str) -> Attribute {
        let at = Arc::new(AttributeType::new(id, Uuid::new_v4(), class_name, class_name, None, false, false).unwrap());
        let row = AttributeRow {
            id,
            name: name.to_string(),
            type_id,
            table_id: table.get_id(),
            attribute_type_id: at.get_id(),
            link_type_id: None,
            set_id: None,
            sql_columns: column.to_string(),
            default_value: None,
            dimension_uuid: None,
            class_name: None,
        };
        Attribute::new(&row, table, at, BTreeMap::new()).unwrap()
    }

    fn type_row(id: i64, name: &str, purpose: i64, parent: Option<i64>) -> TypeRow {
        TypeRow {
            id,
            uuid: Uuid::new_v4(),
            name: name.to_string(),
            purpose,
            parent_type_id: parent,
            ..TypeRow::default()
        }
    }

    fn entity() -> Type {
        Type::new(
            &type_row(100, "Entity", Util::PURPOSE_ABSTRACT, None),
            None,
            vec![
                attribute(1, "Type", 100, entity_table(), "TypeType", "TYPEID"),
                attribute(2, "Name", 100, entity_table(), "StringType", "NAME"),
            ],
            vec![101],
            BTreeSet::new(),
            TypeVariant::Plain,
        )
        .unwrap()
    }

    #[test]
    fn test_child_inherits_every_parent_attribute() {
        let entity = entity();
        let person = Type::new(
            &type_row(101, "Person", Util::PURPOSE_GENERAL_INSTANCE, Some(100)),
            Some(&entity),
            vec![attribute(3, "Email", 101, person_table(), "StringType", "EMAIL")],
            vec![],
            BTreeSet::new(),
            TypeVariant::Plain,
        )
        .unwrap();
        for name in entity.get_attributes().keys() {
            let a = person.get_attribute(name).unwrap();
            assert_eq!(a.get_parent_type_id(), 101);
        }
        let name = person.get_attribute("Name").unwrap();
        assert_eq!(name.get_id(), entity.get_attribute("Name").unwrap().get_id());
        assert!(name.is_required());
        assert_eq!(name.get_size(), 64);
        assert!(!person.is_own_attribute(name));
        assert!(person.is_own_attribute(person.get_attribute("Email").unwrap()));
        // main table comes from the parent; the extension table is second
        assert_eq!(person.get_main_table().unwrap().get_id(), 10);
        assert_eq!(person.get_tables().len(), 2);
        assert!(person.is_general_instance());
        assert!(!person.is_abstract());
        assert!(entity.is_abstract());
        assert_eq!(person.get_type_attribute().unwrap().get_name(), "Type");
        assert!(!person.is_company_dependent());
    }

    #[test]
    fn test_self_parent_is_refused() {
        let e = Type::new(
            &type_row(5, "Loop", 0, Some(5)),
            None,
            vec![],
            vec![],
            BTreeSet::new(),
            TypeVariant::Plain,
        )
        .unwrap_err();
        assert!(e.is_kind(crate::error::ErrorKind::Configuration));
    }

    #[test]
    fn test_type_without_tables_has_no_main_table() {
        let t = Type::new(&type_row(120, "InvoiceStatus", 1, None), None, vec![], vec![], BTreeSet::new(), TypeVariant::Plain)
            .unwrap();
        let e = t.require_main_table().unwrap_err();
        assert!(e.is_kind(crate::error::ErrorKind::QueryCompilation));
        assert!(e.get_message().contains("InvoiceStatus"));
    }

    #[test]
    fn test_copies_for_linkages_and_back_references_are_dirty() {
        let entity = entity();
        assert!(!entity.is_dirty());
        assert!(!entity.are_linkages_resolved());
        let linked = entity.with_linkages(Some(7), None, None);
        assert!(linked.is_dirty());
        assert_eq!(linked.get_menu(), Linkage::Resolved(7));
        assert_eq!(linked.get_icon(), Linkage::None);
        assert!(linked.are_linkages_resolved());
        let classified = linked.with_classified_by(130);
        assert!(classified.get_classified_by().contains(&130));
        let clean = classified.clean_copy();
        assert!(!clean.is_dirty());
        assert_eq!(clean.get_id(), entity.get_id());
    }
}
