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
use crate::model::dialect::Dialect;
use crate::util::Util;
use chrono::{DateTime, Utc};
use std::fmt;

/// A typed attribute value as callers see it (the "presentation" side of an AttributeKind).
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Boolean(bool),
    Long(i64),
    Decimal(f64),
    String(String),
    DateTime(DateTime<Utc>),
    /// An amount in some unit of measure (a Uom id).
    Quantity { value: f64, uom_id: i64 },
    /// What one-to-many selects (linkfrom, class, attributeset) give per instance.
    List(Vec<Value>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Long(n) => Some(*n),
            Value::Decimal(d) if d.fract() == 0.0 => Some(*d as i64),
            Value::Boolean(b) => Some(i64::from(*b)),
            Value::String(s) => s.trim().parse().ok(),
            Value::DateTime(d) => Some(d.timestamp_millis()),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Long(n) => Some(*n as f64),
            Value::Decimal(d) => Some(*d),
            Value::Quantity { value, .. } => Some(*value),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(b) => Some(*b),
            Value::Long(n) => Some(*n != 0),
            Value::String(s) => match s.trim().to_lowercase().as_str() {
                "true" | "t" | "yes" | "1" => Some(true),
                "false" | "f" | "no" | "0" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(v) => Some(v),
            _ => None,
        }
    }

    /// Renders a single-column value as a SQL literal.  Text is quoted and escaped; dates are
    /// the bigint milliseconds they are stored as.  Quantities and lists span more than one
    /// column or row and have no single literal.
    pub fn to_sql_literal(&self, dialect: &Dialect) -> Result<String> {
        match self {
            Value::Null => Ok("NULL".to_string()),
            Value::Boolean(b) => Ok(dialect.boolean_literal(*b).to_string()),
            Value::Long(n) => Ok(n.to_string()),
            Value::Decimal(d) => {
                if d.is_finite() {
                    Ok(format!("{:?}", d))
                } else {
                    Err(PersistError::invalid_value(format!("{} can not be stored", d)))
                }
            }
            Value::String(s) => Ok(Util::quote(s)),
            Value::DateTime(d) => Ok(d.timestamp_millis().to_string()),
            Value::Quantity { .. } | Value::List(_) => Err(PersistError::invalid_value(format!(
                "{:?} has no single-column sql literal",
                self
            ))),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Long(n) => write!(f, "{}", n),
            Value::Decimal(d) => write!(f, "{}", d),
            Value::String(s) => f.write_str(s),
            Value::DateTime(d) => write!(f, "{}", d.to_rfc3339()),
            Value::Quantity { value, uom_id } => write!(f, "{} (uom {})", value, uom_id),
            Value::List(values) => {
                let parts: Vec<String> = values.iter().map(|v| v.to_string()).collect();
                write!(f, "[{}]", parts.join(", "))
            }
        }
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Long(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Long(n as i64)
    }
}

impl From<f64> for Value {
    fn from(d: f64) -> Self {
        Value::Decimal(d)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(d: DateTime<Utc>) -> Self {
        Value::DateTime(d)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        match v {
            Some(x) => x.into(),
            None => Value::Null,
        }
    }
}
