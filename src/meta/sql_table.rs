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
use crate::model::database::{get_i64, get_string, opt_i64, opt_string, ColumnType, DbConnection, DbRow};
use crate::model::dialect::{ColumnInfo, Dialect};
use crate::util::Util;
use std::collections::HashMap;
use uuid::Uuid;

/// One physical table.  A table with a parent table holds extra columns for rows of the parent
/// table, keyed by the same id (for example, a person table extending an entity table).
#[derive(Debug, Clone)]
pub struct SqlTable {
    id: i64,
    uuid: Uuid,
    name: String,
    sql_table: String,
    sql_column_id: String,
    sql_column_type: Option<String>,
    parent_table_id: Option<i64>,
    // keyed by upper-cased column name
    columns: HashMap<String, ColumnInfo>,
}

impl SqlTable {
    pub const SELECT_COLUMNS: &'static str =
        "ID, UUID, NAME, SQLTABLE, SQLCOLUMNID, SQLCOLUMNTYPE, PARENT_TABLE_ID";
    pub const SELECT_TYPES: [ColumnType; 7] = [
        ColumnType::Bigint,
        ColumnType::String,
        ColumnType::String,
        ColumnType::String,
        ColumnType::String,
        ColumnType::String,
        ColumnType::Bigint,
    ];

    pub fn new(
        id: i64,
        uuid: Uuid,
        name: &str,
        sql_table: &str,
        sql_column_id: &str,
        sql_column_type: Option<&str>,
        parent_table_id: Option<i64>,
        columns: Vec<ColumnInfo>,
    ) -> SqlTable {
        SqlTable {
            id,
            uuid,
            name: name.to_string(),
            sql_table: sql_table.to_string(),
            sql_column_id: sql_column_id.to_string(),
            sql_column_type: sql_column_type.map(|s| s.to_string()),
            parent_table_id,
            columns: columns
                .into_iter()
                .map(|c| (c.name.to_uppercase(), c))
                .collect(),
        }
    }

    /// The single loader path: reads the om_sqltable row, then the live column facts of the
    /// physical table it names.  A physical table that does not exist is a configuration error.
    pub fn load(conn: &mut dyn DbConnection, dialect: &Dialect, key: &CacheKey) -> Result<SqlTable> {
        let condition = match key {
            CacheKey::Id(id) => format!("ID = {}", id),
            CacheKey::Name(name) => format!("NAME = {}", Util::quote(name)),
            CacheKey::Uuid(uuid) => format!("UUID = '{}'", uuid),
        };
        let sql = format!(
            "SELECT {} FROM {} WHERE {}",
            Self::SELECT_COLUMNS,
            Util::SQL_TABLE_TABLE,
            condition
        );
        let rows = conn.query(&sql, &Self::SELECT_TYPES)?;
        let row: &DbRow = rows.first().ok_or_else(|| {
            PersistError::configuration(format!("SQL table {}{}", key, Util::DOES_NOT_EXIST))
        })?;
        let id = get_i64(row, 0, "ID")?;
        let uuid = Uuid::parse_str(&get_string(row, 1, "UUID")?)?;
        let name = get_string(row, 2, "NAME")?;
        let sql_table = get_string(row, 3, "SQLTABLE")?;
        let sql_column_id = get_string(row, 4, "SQLCOLUMNID")?;
        let sql_column_type = opt_string(row, 5).filter(|s| !s.trim().is_empty());
        let parent_table_id = opt_i64(row, 6).filter(|id| *id > 0);

        Util::check_identifier(&sql_table)?;
        Util::check_identifier(&sql_column_id)?;
        if let Some(c) = &sql_column_type {
            Util::check_identifier(c)?;
        }
        let columns = dialect.get_columns(conn, &sql_table)?;
        if columns.is_empty() {
            return Err(PersistError::configuration(format!(
                "Physical table {} of SQL table '{}'{}",
                sql_table,
                name,
                Util::DOES_NOT_EXIST
            )));
        }
        let table = SqlTable::new(
            id,
            uuid,
            &name,
            &sql_table,
            &sql_column_id,
            sql_column_type.as_deref(),
            parent_table_id,
            columns,
        );
        table.check_column(&table.sql_column_id)?;
        if let Some(c) = &table.sql_column_type {
            table.check_column(c)?;
        }
        Ok(table)
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

    pub fn get_sql_table(&self) -> &str {
        &self.sql_table
    }

    pub fn get_sql_column_id(&self) -> &str {
        &self.sql_column_id
    }

    /// The type discriminator column, when rows of more than one type share this table.
    pub fn get_sql_column_type(&self) -> Option<&str> {
        self.sql_column_type.as_deref()
    }

    pub fn get_parent_table_id(&self) -> Option<i64> {
        self.parent_table_id
    }

    pub fn get_column(&self, name: &str) -> Option<&ColumnInfo> {
        self.columns.get(&name.to_uppercase())
    }

    pub fn check_column(&self, name: &str) -> Result<&ColumnInfo> {
        self.get_column(name).ok_or_else(|| {
            PersistError::configuration(format!(
                "Column {} of SQL table '{}' (physical table {}){}",
                name,
                self.name,
                self.sql_table,
                Util::DOES_NOT_EXIST
            ))
        })
    }
}

impl CacheObject for SqlTable {
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

    fn table() -> SqlTable {
        SqlTable::new(
            10,
            Uuid::new_v4(),
            "Entity",
            "T_ENTITY",
            "ID",
            Some("TYPEID"),
            None,
            vec![
                ColumnInfo { name: "ID".to_string(), nullable: false, size: 0, scale: 0 },
                ColumnInfo { name: "name".to_string(), nullable: false, size: 64, scale: 0 },
            ],
        )
    }

    #[test]
    fn test_columns_are_found_regardless_of_case() {
        let t = table();
        assert_eq!(t.get_column("NAME").unwrap().size, 64);
        assert!(t.get_column("Name").is_some());
        assert!(t.check_column("EMAIL").is_err());
        assert_eq!(t.get_sql_column_type(), Some("TYPEID"));
    }
}
