/*  This file is part of OneModel, a program to manage knowledge.
    Copyright in each year of 2025-2026 inclusive, Luke A. Call.
    OneModel is free software, distributed under a license that includes honesty, the Golden Rule,
    and the GNU Affero General Public License as published by the Free Software Foundation;
    see the file LICENSE for license version and details.
    OneModel is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranty of
    MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU Affero General Public License for more details.
    You should have received a copy of the GNU Affero General Public License along with OneModel.  If not, see <http://www.gnu.org/licenses/>
*/
//! Changing instances: insert, update, delete, and storing or reading an instance's content.
//! Each checks access first.  A failing statement marks the context's transaction rollback-only
//! before the error comes back.
pub mod checkin;
pub mod delete;
pub mod insert;
pub mod update;

pub use checkin::{Checkin, Checkout};
pub use delete::Delete;
pub use insert::Insert;
pub use update::Update;

use crate::context::Context;
use crate::error::{PersistError, Result};
use crate::meta::attribute_type::{AttributeKind, Stamp};
use crate::meta::entity_type::Type;
use crate::meta::sql_table::SqlTable;
use crate::model::dialect::Dialect;
use crate::util::Util;
use crate::value::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::*;

/// The columns of one table and the literals going into them.
#[derive(Debug)]
pub(crate) struct TableValues {
    pub table: Arc<SqlTable>,
    pub columns: Vec<String>,
    pub literals: Vec<String>,
}

impl TableValues {
    /// "INSERT INTO t (c, ..) VALUES (v, ..)", with the id column first when an id is given.
    pub fn insert_sql(&self, id: Option<i64>) -> String {
        let mut columns: Vec<&str> = vec![];
        let mut literals: Vec<String> = vec![];
        if let Some(id) = id {
            columns.push(self.table.get_sql_column_id());
            literals.push(id.to_string());
        }
        columns.extend(self.columns.iter().map(|c| c.as_str()));
        literals.extend(self.literals.iter().cloned());
        if columns.is_empty() {
            format!("INSERT INTO {} DEFAULT VALUES", self.table.get_sql_table())
        } else {
            format!(
                "INSERT INTO {} ({}) VALUES ({})",
                self.table.get_sql_table(),
                columns.join(", "),
                literals.join(", ")
            )
        }
    }

    pub fn update_sql(&self, id: i64) -> String {
        let sets: Vec<String> = self
            .columns
            .iter()
            .zip(&self.literals)
            .map(|(c, l)| format!("{} = {}", c, l))
            .collect();
        format!(
            "UPDATE {} SET {} WHERE {} = {}",
            self.table.get_sql_table(),
            sets.join(", "),
            self.table.get_sql_column_id(),
            id
        )
    }
}

/// Rejects names that are not attributes of `t`, or that are attribute sets (those rows are
/// instances of their own).
pub(crate) fn check_names(t: &Type, values: &BTreeMap<String, Value>) -> Result<()> {
    for name in values.keys() {
        match t.get_attribute(name) {
            None => {
                return Err(PersistError::invalid_value(format!(
                    "Type '{}' has no attribute '{}'",
                    t.get_name(),
                    name
                )))
            }
            Some(a) if a.get_kind() == AttributeKind::AttributeSet => {
                return Err(PersistError::invalid_value(format!(
                    "Attribute set '{}' of type '{}' can not be given a value",
                    name,
                    t.get_name()
                )))
            }
            Some(_) => {}
        }
    }
    Ok(())
}

/// Splits attribute values by table, one entry per table of `t` (main table first) even when
/// it gets no values.  Id columns are left out; the store or the caller fills those in.
pub(crate) fn by_table(t: &Type, values: &BTreeMap<String, Value>, dialect: &Dialect) -> Result<Vec<TableValues>> {
    let mut tables: Vec<TableValues> = t
        .get_tables()
        .iter()
        .map(|table| TableValues {
            table: table.clone(),
            columns: vec![],
            literals: vec![],
        })
        .collect();
    for (name, value) in values {
        let a = t.require_attribute(name)?;
        let table_id = a.get_table().get_id();
        let entry = tables.iter_mut().find(|x| x.table.get_id() == table_id).ok_or_else(|| {
            PersistError::configuration(format!(
                "Attribute '{}' is kept in table {}, which is not one of type '{}'",
                name,
                a.get_table().get_sql_table(),
                t.get_name()
            ))
        })?;
        let literals = a
            .get_kind()
            .to_sql_literals(value, dialect)
            .map_err(|e| PersistError::invalid_value(format!("Attribute '{}': {}", name, e.get_message())))?;
        for (column, literal) in a.get_sql_columns().iter().zip(literals) {
            if column.eq_ignore_ascii_case(entry.table.get_sql_column_id()) {
                continue;
            }
            entry.columns.push(column.clone());
            entry.literals.push(literal);
        }
    }
    Ok(tables)
}

pub(crate) fn stamp(ctx: &Context, type_id: i64) -> Stamp {
    Stamp {
        now_millis: Util::now_millis(),
        person_id: ctx.get_person_id(),
        company_id: ctx.get_company(),
        type_id,
    }
}

/// Marks the context rollback-only and hands back `e`, for failures that did not come through
/// the context's own statements.
pub(crate) fn abort_with(ctx: &Context, e: PersistError) -> PersistError {
    if let Err(abort_error) = ctx.abort() {
        debug!("Could not mark context {} rollback-only: {}", ctx.get_request_id(), abort_error);
    }
    e
}
