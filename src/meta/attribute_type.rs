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
use crate::meta::cache_index::{CacheKey, CacheObject};
use crate::model::database::{get_i64, get_string, opt_bool, opt_string, ColumnType, DataType, DbConnection};
use crate::model::dialect::Dialect;
use crate::util::Util;
use crate::value::Value;
use uuid::Uuid;

/// The conversion strategies an attribute can have.  Resolved once, from the class name stored
/// in om_attribute_type, when the attribute type is loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttributeKind {
    String,
    Long,
    Integer,
    Decimal,
    Boolean,
    Date,
    DateTime,
    /// set once, on insert, to the current time
    Created,
    /// set on every insert and update, to the current time
    Modified,
    CreatorLink,
    ModifierLink,
    /// a link to an instance of the attribute's link type
    Link,
    /// the id of a Status of the attribute's link type (a status group)
    Status,
    /// the type discriminator
    Type,
    CompanyLink,
    ConsortiumLink,
    GroupLink,
    AssociationLink,
    /// stored as a number, the enum being named by the attribute's class name
    Enum,
    /// two columns: the amount and the Uom id
    Quantity,
    /// declares an attribute set; has no columns of its own
    AttributeSet,
}

impl AttributeKind {
    /// Accepts a bare name ("StringType") or one with a package-like prefix
    /// ("org.onemodel.attributetype.StringType").
    pub fn from_class_name(class_name: &str) -> Result<AttributeKind> {
        let short = class_name.rsplit('.').next().unwrap_or(class_name).trim();
        let kind = match short {
            "StringType" => AttributeKind::String,
            "LongType" => AttributeKind::Long,
            "IntegerType" => AttributeKind::Integer,
            "DecimalType" => AttributeKind::Decimal,
            "BooleanType" => AttributeKind::Boolean,
            "DateType" => AttributeKind::Date,
            "DateTimeType" => AttributeKind::DateTime,
            "CreatedType" => AttributeKind::Created,
            "ModifiedType" => AttributeKind::Modified,
            "CreatorLinkType" => AttributeKind::CreatorLink,
            "ModifierLinkType" => AttributeKind::ModifierLink,
            "LinkType" => AttributeKind::Link,
            "StatusType" => AttributeKind::Status,
            "TypeType" => AttributeKind::Type,
            "CompanyLinkType" => AttributeKind::CompanyLink,
            "ConsortiumLinkType" => AttributeKind::ConsortiumLink,
            "GroupLinkType" => AttributeKind::GroupLink,
            "AssociationLinkType" => AttributeKind::AssociationLink,
            "EnumType" => AttributeKind::Enum,
            "QuantityType" => AttributeKind::Quantity,
            "AttributeSetType" => AttributeKind::AttributeSet,
            _ => {
                return Err(PersistError::configuration(format!(
                    "Unknown attribute type class name: {}",
                    class_name
                )))
            }
        };
        Ok(kind)
    }

    /// How many physical columns an attribute of this kind maps to.
    pub fn column_count(&self) -> usize {
        match self {
            AttributeKind::Quantity => 2,
            AttributeKind::AttributeSet => 0,
            _ => 1,
        }
    }

    /// What to decode each column as, in column order.
    pub fn column_types(&self) -> Vec<ColumnType> {
        match self {
            AttributeKind::String => vec![ColumnType::String],
            AttributeKind::Decimal => vec![ColumnType::Float],
            AttributeKind::Boolean => vec![ColumnType::Boolean],
            AttributeKind::Quantity => vec![ColumnType::Float, ColumnType::Bigint],
            AttributeKind::AttributeSet => vec![],
            _ => vec![ColumnType::Bigint],
        }
    }

    /// Kinds whose value is the id of a row of some other type.
    pub fn is_link(&self) -> bool {
        matches!(
            self,
            AttributeKind::Link
                | AttributeKind::CreatorLink
                | AttributeKind::ModifierLink
                | AttributeKind::CompanyLink
                | AttributeKind::ConsortiumLink
                | AttributeKind::GroupLink
                | AttributeKind::AssociationLink
        )
    }

    pub fn is_date(&self) -> bool {
        matches!(
            self,
            AttributeKind::Date | AttributeKind::DateTime | AttributeKind::Created | AttributeKind::Modified
        )
    }

    /// The value generated for this kind when its attribute always takes part in an insert or
    /// update.  None for the kinds that only ever take the caller's value, and when the stamp
    /// lacks what the kind needs (no person, no company).
    pub fn generated_value(&self, stamp: &Stamp) -> Option<Value> {
        match self {
            AttributeKind::Created | AttributeKind::Modified => Some(Value::Long(stamp.now_millis)),
            AttributeKind::CreatorLink | AttributeKind::ModifierLink => stamp.person_id.map(Value::Long),
            AttributeKind::CompanyLink => stamp.company_id.map(Value::Long),
            AttributeKind::Type => Some(Value::Long(stamp.type_id)),
            _ => None,
        }
    }

    /// Converts the decoded columns of one attribute into a presentation value.
    pub fn read_value(&self, columns: &[Option<DataType>]) -> Result<Value> {
        let first = columns.first().cloned().flatten();
        let value = match self {
            AttributeKind::AttributeSet => Value::Null,
            AttributeKind::Quantity => {
                let amount = first.as_ref().and_then(|d| d.as_f64());
                let uom = columns.get(1).cloned().flatten().and_then(|d| d.as_i64());
                match (amount, uom) {
                    (Some(value), Some(uom_id)) => Value::Quantity { value, uom_id },
                    (None, _) => Value::Null,
                    (Some(_), None) => {
                        return Err(PersistError::invalid_value(format!(
                            "A quantity amount without a unit: {:?}",
                            columns
                        )))
                    }
                }
            }
            _ => match first {
                None => Value::Null,
                Some(d) => match self {
                    AttributeKind::String => Value::String(d.as_string()),
                    AttributeKind::Decimal => Value::Decimal(d.as_f64().ok_or_else(|| bad(self, &d))?),
                    AttributeKind::Boolean => Value::Boolean(d.as_bool().ok_or_else(|| bad(self, &d))?),
                    AttributeKind::Date | AttributeKind::DateTime | AttributeKind::Created | AttributeKind::Modified => {
                        let millis = d.as_i64().ok_or_else(|| bad(self, &d))?;
                        Value::DateTime(Util::millis_to_date(millis).ok_or_else(|| bad(self, &d))?)
                    }
                    _ => Value::Long(d.as_i64().ok_or_else(|| bad(self, &d))?),
                },
            },
        };
        Ok(value)
    }

    /// Converts a presentation value into one literal per column.
    pub fn to_sql_literals(&self, value: &Value, dialect: &Dialect) -> Result<Vec<String>> {
        if let AttributeKind::AttributeSet = self {
            return Ok(vec![]);
        }
        if value.is_null() {
            return Ok(vec!["NULL".to_string(); self.column_count()]);
        }
        let wrong = || PersistError::invalid_value(format!("{:?} can not hold {:?}", self, value));
        let literals = match self {
            AttributeKind::Quantity => match value {
                Value::Quantity { value, uom_id } => vec![
                    Value::Decimal(*value).to_sql_literal(dialect)?,
                    uom_id.to_string(),
                ],
                _ => return Err(wrong()),
            },
            AttributeKind::String => match value {
                Value::String(_) => vec![value.to_sql_literal(dialect)?],
                Value::Long(_) | Value::Decimal(_) | Value::Boolean(_) => {
                    vec![Value::String(value.to_string()).to_sql_literal(dialect)?]
                }
                _ => return Err(wrong()),
            },
            AttributeKind::Decimal => {
                vec![Value::Decimal(value.as_f64().ok_or_else(wrong)?).to_sql_literal(dialect)?]
            }
            AttributeKind::Boolean => {
                vec![Value::Boolean(value.as_bool().ok_or_else(wrong)?).to_sql_literal(dialect)?]
            }
            AttributeKind::Date | AttributeKind::DateTime | AttributeKind::Created | AttributeKind::Modified => {
                match value {
                    Value::DateTime(d) => vec![d.timestamp_millis().to_string()],
                    Value::Long(n) => vec![n.to_string()],
                    Value::String(s) => {
                        let parsed = chrono::DateTime::parse_from_rfc3339(s.trim()).map_err(|_| wrong())?;
                        vec![parsed.timestamp_millis().to_string()]
                    }
                    _ => return Err(wrong()),
                }
            }
            _ => vec![value.as_i64().ok_or_else(wrong)?.to_string()],
        };
        Ok(literals)
    }
}

fn bad(kind: &AttributeKind, d: &DataType) -> PersistError {
    PersistError::invalid_value(format!("{:?} can not be read from {:?}", kind, d))
}

/// What generated values are made of: when, by whom, for which company, of which type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stamp {
    pub now_millis: i64,
    pub person_id: Option<i64>,
    pub company_id: Option<i64>,
    pub type_id: i64,
}

/// A named conversion strategy shared by attributes, plus whether attributes of it always take
/// part in updates and inserts (whether or not the caller gave a value).
#[derive(Debug, Clone)]
pub struct AttributeType {
    id: i64,
    uuid: Uuid,
    name: String,
    class_name_db: String,
    class_name_ui: Option<String>,
    kind: AttributeKind,
    always_update: bool,
    always_insert: bool,
}

impl AttributeType {
    pub fn new(
        id: i64,
        uuid: Uuid,
        name: &str,
        class_name_db: &str,
        class_name_ui: Option<&str>,
        always_update: bool,
        always_insert: bool,
    ) -> Result<AttributeType> {
        Ok(AttributeType {
            id,
            uuid,
            name: name.to_string(),
            class_name_db: class_name_db.to_string(),
            class_name_ui: class_name_ui.map(|s| s.to_string()),
            kind: AttributeKind::from_class_name(class_name_db)?,
            always_update,
            always_insert,
        })
    }

    pub fn load(conn: &mut dyn DbConnection, key: &CacheKey) -> Result<AttributeType> {
        let condition = match key {
            CacheKey::Id(id) => format!("ID = {}", id),
            CacheKey::Name(name) => format!("NAME = {}", Util::quote(name)),
            CacheKey::Uuid(uuid) => format!("UUID = '{}'", uuid),
        };
        let sql = format!(
            "SELECT ID, UUID, NAME, CLASSNAME_DB, CLASSNAME_UI, ALWAYS_UPDATE, ALWAYS_INSERT FROM {} WHERE {}",
            Util::ATTRIBUTE_TYPE_TABLE,
            condition
        );
        let rows = conn.query(
            &sql,
            &[
                ColumnType::Bigint,
                ColumnType::String,
                ColumnType::String,
                ColumnType::String,
                ColumnType::String,
                ColumnType::Boolean,
                ColumnType::Boolean,
            ],
        )?;
        let row = rows.first().ok_or_else(|| {
            PersistError::configuration(format!("Attribute type {}{}", key, Util::DOES_NOT_EXIST))
        })?;
        AttributeType::new(
            get_i64(row, 0, "ID")?,
            Uuid::parse_str(&get_string(row, 1, "UUID")?)?,
            &get_string(row, 2, "NAME")?,
            &get_string(row, 3, "CLASSNAME_DB")?,
            opt_string(row, 4).as_deref(),
            opt_bool(row, 5).unwrap_or(false),
            opt_bool(row, 6).unwrap_or(false),
        )
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

    pub fn get_kind(&self) -> AttributeKind {
        self.kind
    }

    pub fn get_class_name_db(&self) -> &str {
        &self.class_name_db
    }

    pub fn get_class_name_ui(&self) -> Option<&str> {
        self.class_name_ui.as_deref()
    }

    pub fn is_always_update(&self) -> bool {
        self.always_update
    }

    pub fn is_always_insert(&self) -> bool {
        self.always_insert
    }
}

impl CacheObject for AttributeType {
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
