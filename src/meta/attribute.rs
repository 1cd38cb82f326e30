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
use crate::meta::attribute_type::{AttributeKind, AttributeType};
use crate::meta::cache_index::CacheObject;
use crate::meta::sql_table::SqlTable;
use crate::model::database::{get_i64, get_string, opt_i64, opt_string, ColumnType, DbRow};
use crate::util::Util;
use crate::value::Value;
use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use uuid::Uuid;

/// A named field of a Type, stored in one or more columns of one table.
///
/// Identity is the numeric id alone: two attributes are equal if their ids are, whatever their
/// names (names are only unique within one type).
#[derive(Debug, Clone)]
pub struct Attribute {
    id: i64,
    name: String,
    parent_type_id: i64,
    table: Arc<SqlTable>,
    attribute_type: Arc<AttributeType>,
    sql_columns: Vec<String>,
    link_type_id: Option<i64>,
    set_id: Option<i64>,
    default_value: Option<String>,
    dimension_uuid: Option<Uuid>,
    class_name: Option<String>,
    required: bool,
    size: i64,
    scale: i64,
    properties: BTreeMap<String, String>,
}

/// One om_attribute row, before its table and attribute type are resolved.
#[derive(Debug, Clone)]
pub struct AttributeRow {
    pub id: i64,
    pub name: String,
    pub type_id: i64,
    pub table_id: i64,
    pub attribute_type_id: i64,
    pub link_type_id: Option<i64>,
    pub set_id: Option<i64>,
    pub sql_columns: String,
    pub default_value: Option<String>,
    pub dimension_uuid: Option<String>,
    pub class_name: Option<String>,
}

impl AttributeRow {
    pub const SELECT_COLUMNS: &'static str = "ID, NAME, TYPE_ID, TABLE_ID, ATTRIBUTE_TYPE_ID, LINK_TYPE_ID, \
         SET_ID, SQL_COLUMNS, DEFAULT_VALUE, DIMENSION_UUID, CLASS_NAME";
    pub const SELECT_TYPES: [ColumnType; 11] = [
        ColumnType::Bigint,
        ColumnType::String,
        ColumnType::Bigint,
        ColumnType::Bigint,
        ColumnType::Bigint,
        ColumnType::Bigint,
        ColumnType::Bigint,
        ColumnType::String,
        ColumnType::String,
        ColumnType::String,
        ColumnType::String,
    ];

    pub fn from_row(row: &DbRow) -> Result<AttributeRow> {
        Ok(AttributeRow {
            id: get_i64(row, 0, "ID")?,
            name: get_string(row, 1, "NAME")?,
            type_id: get_i64(row, 2, "TYPE_ID")?,
            table_id: get_i64(row, 3, "TABLE_ID")?,
            attribute_type_id: get_i64(row, 4, "ATTRIBUTE_TYPE_ID")?,
            link_type_id: opt_i64(row, 5).filter(|id| *id > 0),
            set_id: opt_i64(row, 6).filter(|id| *id > 0),
            sql_columns: opt_string(row, 7).unwrap_or_default(),
            default_value: opt_string(row, 8),
            dimension_uuid: opt_string(row, 9).filter(|s| !s.trim().is_empty()),
            class_name: opt_string(row, 10).filter(|s| !s.trim().is_empty()),
        })
    }
}

impl Attribute {
    /// Builds the attribute from its row, checking every named column against the live facts of
    /// its table.  Required/size/scale come from the first column.
    pub fn new(
        row: &AttributeRow,
        table: Arc<SqlTable>,
        attribute_type: Arc<AttributeType>,
        properties: BTreeMap<String, String>,
    ) -> Result<Attribute> {
        let kind = attribute_type.get_kind();
        let sql_columns = Util::split_columns(&row.sql_columns);
        if sql_columns.len() != kind.column_count() {
            return Err(PersistError::configuration(format!(
                "Attribute '{}' (id {}) of kind {:?} names {} column(s) \"{}\" but needs {}",
                row.name,
                row.id,
                kind,
                sql_columns.len(),
                row.sql_columns,
                kind.column_count()
            )));
        }
        let mut required = false;
        let mut size = 0;
        let mut scale = 0;
        for (i, column) in sql_columns.iter().enumerate() {
            Util::check_identifier(column)?;
            let info = table.check_column(column).map_err(|e| {
                PersistError::configuration(format!("Attribute '{}' (id {}): {}", row.name, row.id, e.get_message()))
            })?;
            if i == 0 {
                required = !info.nullable;
                size = info.size;
                scale = info.scale;
            }
        }
        // the id and discriminator columns are filled in by the store and the mutation code
        if let Some(first) = sql_columns.first() {
            if first.eq_ignore_ascii_case(table.get_sql_column_id())
                || table.get_sql_column_type().map(|c| c.eq_ignore_ascii_case(first)).unwrap_or(false)
            {
                required = false;
            }
        }
        let dimension_uuid = match &row.dimension_uuid {
            Some(s) => Some(Uuid::parse_str(s.trim())?),
            None => None,
        };
        if kind == AttributeKind::AttributeSet && row.link_type_id.is_none() {
            return Err(PersistError::configuration(format!(
                "Attribute set attribute '{}' (id {}) has no set type",
                row.name, row.id
            )));
        }
        Ok(Attribute {
            id: row.id,
            name: row.name.clone(),
            parent_type_id: row.type_id,
            table,
            attribute_type,
            sql_columns,
            link_type_id: row.link_type_id,
            set_id: row.set_id,
            default_value: row.default_value.clone(),
            dimension_uuid,
            class_name: row.class_name.clone(),
            required,
            size,
            scale,
            properties,
        })
    }

    /// The same attribute as seen from a descendant type: everything is kept except the owning
    /// type id, which becomes `parent_type_id`.
    pub fn copy(&self, parent_type_id: i64) -> Attribute {
        let mut c = self.clone();
        c.parent_type_id = parent_type_id;
        c
    }

    pub fn get_id(&self) -> i64 {
        self.id
    }

    pub fn get_name(&self) -> &str {
        &self.name
    }

    pub fn get_parent_type_id(&self) -> i64 {
        self.parent_type_id
    }

    pub fn get_table(&self) -> &Arc<SqlTable> {
        &self.table
    }

    pub fn get_attribute_type(&self) -> &Arc<AttributeType> {
        &self.attribute_type
    }

    pub fn get_kind(&self) -> AttributeKind {
        self.attribute_type.get_kind()
    }

    pub fn get_sql_columns(&self) -> &[String] {
        &self.sql_columns
    }

    pub fn get_link_type_id(&self) -> Option<i64> {
        self.link_type_id
    }

    /// For a member of an attribute set, the id of the attribute that declares the set.
    pub fn get_set_id(&self) -> Option<i64> {
        self.set_id
    }

    pub fn get_default_value(&self) -> Option<&str> {
        self.default_value.as_deref()
    }

    /// The default as a value of this attribute's kind.
    pub fn get_default(&self) -> Option<Value> {
        let raw = self.default_value.as_ref()?;
        let kind = self.get_kind();
        let v = match kind {
            AttributeKind::String => Value::String(raw.clone()),
            AttributeKind::Boolean => Value::from(raw.as_str()).as_bool().map(Value::Boolean)?,
            AttributeKind::Decimal => Value::Decimal(raw.trim().parse().ok()?),
            _ if kind.column_count() == 1 => Value::Long(raw.trim().parse().ok()?),
            _ => return None,
        };
        Some(v)
    }

    pub fn get_dimension_uuid(&self) -> Option<Uuid> {
        self.dimension_uuid
    }

    pub fn get_class_name(&self) -> Option<&str> {
        self.class_name.as_deref()
    }

    pub fn is_required(&self) -> bool {
        self.required
    }

    pub fn get_size(&self) -> i64 {
        self.size
    }

    pub fn get_scale(&self) -> i64 {
        self.scale
    }

    pub fn get_properties(&self) -> &BTreeMap<String, String> {
        &self.properties
    }

    pub fn get_property(&self, name: &str) -> Option<&str> {
        self.properties.get(name).map(|s| s.as_str())
    }

    pub fn has_uom(&self) -> bool {
        self.dimension_uuid.is_some()
    }
}

impl PartialEq for Attribute {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Attribute {}

impl Hash for Attribute {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl CacheObject for Attribute {
    fn get_id(&self) -> i64 {
        self.id
    }
    // names are not unique across types
    fn get_cache_name(&self) -> Option<&str> {
        None
    }
    fn get_cache_uuid(&self) -> Option<Uuid> {
        None
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::model::dialect::ColumnInfo;
    use std::collections::HashSet;

    fn table() -> Arc<SqlTable> {
        Arc::new(SqlTable::new(
            10,
            Uuid::new_v4(),
            "Entity",
            "T_ENTITY",
            "ID",
            Some("TYPEID"),
            None,
            vec![
                ColumnInfo { name: "ID".into(), nullable: false, size: 0, scale: 0 },
                ColumnInfo { name: "TYPEID".into(), nullable: false, size: 0, scale: 0 },
                ColumnInfo { name: "NAME".into(), nullable: false, size: 64, scale: 0 },
                ColumnInfo { name: "AMOUNT".into(), nullable: true, size: 0, scale: 0 },
                ColumnInfo { name: "AMOUNTUOM".into(), nullable: true, size: 0, scale: 0 },
            ],
        ))
    }

    fn attr_type(class_name: &str) -> Arc<AttributeType> {
        Arc::new(AttributeType::new(1, Uuid::new_v4(), class_name, class_name, None, false, false).unwrap())
    }

    fn row(id: i64, name: &str, columns: &str) -> AttributeRow {
        AttributeRow {
            id,
            name: name.to_string(),
            type_id: 100,
            table_id: 10,
            attribute_type_id: 1,
            link_type_id: None,
            set_id: None,
            sql_columns: columns.to_string(),
            default_value: None,
            dimension_uuid: None,
            class_name: None,
        }
    }

    #[test]
    fn test_required_and_size_come_from_the_column() {
        let a = Attribute::new(&row(1, "Name", "NAME"), table(), attr_type("StringType"), BTreeMap::new()).unwrap();
        assert!(a.is_required());
        assert_eq!(a.get_size(), 64);
        let id = Attribute::new(&row(2, "ID", "ID"), table(), attr_type("LongType"), BTreeMap::new()).unwrap();
        assert!(!id.is_required());
    }

    #[test]
    fn test_missing_column_is_a_configuration_error() {
        let e = Attribute::new(&row(1, "Email", "EMAIL"), table(), attr_type("StringType"), BTreeMap::new())
            .unwrap_err();
        assert!(e.is_kind(crate::error::ErrorKind::Configuration));
        assert!(e.get_message().contains("Email"));
        // a quantity needs two columns
        assert!(Attribute::new(&row(3, "Amount", "AMOUNT"), table(), attr_type("QuantityType"), BTreeMap::new()).is_err());
        assert!(Attribute::new(
            &row(3, "Amount", "AMOUNT, AMOUNTUOM"),
            table(),
            attr_type("QuantityType"),
            BTreeMap::new()
        )
        .is_ok());
    }

    #[test]
    fn test_identity_is_the_id_and_copy_rebinds_the_parent() {
        let mut props = BTreeMap::new();
        props.insert("Width".to_string(), "20".to_string());
        let a = Attribute::new(&row(1, "Name", "NAME"), table(), attr_type("StringType"), props).unwrap();
        let c = a.copy(101);
        assert_eq!(c.get_parent_type_id(), 101);
        assert_eq!(a, c);
        assert_eq!(c.get_property("Width"), Some("20"));
        assert_eq!(c.get_sql_columns(), a.get_sql_columns());
        let mut set = HashSet::new();
        set.insert(a);
        set.insert(c);
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_defaults_take_the_kind_of_the_attribute() {
        let mut r = row(4, "Paid", "NAME");
        r.default_value = Some("false".to_string());
        let a = Attribute::new(&r, table(), attr_type("BooleanType"), BTreeMap::new()).unwrap();
        assert_eq!(a.get_default(), Some(Value::Boolean(false)));
    }
}
