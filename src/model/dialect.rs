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
use crate::model::database::{opt_i64, opt_string, ColumnType, DbConnection};
use crate::util::Util;
use once_cell::sync::Lazy;
use regex::Regex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DialectKind {
    PostgreSql,
    Sqlite,
}

/// Live facts about one physical column, however the product reports them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnInfo {
    pub name: String,
    pub nullable: bool,
    /// character length for text, precision for numerics, 0 when the store does not say.
    pub size: i64,
    pub scale: i64,
}

/// Everything the rest of the crate may know about the SQL product behind the connection.
/// Nothing outside this file matches on DialectKind.
#[derive(Debug, Clone)]
pub struct Dialect {
    kind: DialectKind,
    max_in_list: Option<usize>,
}

// "VARCHAR(64)", "DECIMAL(12, 4)", "bigint"
static SQLITE_TYPE_SIZE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*[A-Za-z ]+\(\s*(\d+)\s*(?:,\s*(\d+)\s*)?\)").unwrap());

impl Dialect {
    pub const SQLITE_MAX_IN_LIST: usize = 999;

    pub fn new(kind: DialectKind, max_in_list: Option<usize>) -> Dialect {
        let max_in_list = match (kind, max_in_list) {
            (_, Some(0)) => None,
            (_, Some(n)) => Some(n),
            (DialectKind::PostgreSql, None) => None,
            (DialectKind::Sqlite, None) => Some(Self::SQLITE_MAX_IN_LIST),
        };
        Dialect { kind, max_in_list }
    }

    pub fn from_url(url: &str, max_in_list: Option<usize>) -> Result<Dialect> {
        let kind = if url.starts_with("postgres://") || url.starts_with("postgresql://") {
            DialectKind::PostgreSql
        } else if url.starts_with("sqlite:") {
            DialectKind::Sqlite
        } else {
            return Err(PersistError::configuration(format!(
                "Unsupported database url (expected postgres:// or sqlite:): {}",
                url
            )));
        };
        Ok(Self::new(kind, max_in_list))
    }

    pub fn get_kind(&self) -> DialectKind {
        self.kind
    }

    /// The most expressions the store accepts in one IN (...) list, if it limits them.
    pub fn get_max_in_list(&self) -> Option<usize> {
        self.max_in_list
    }

    pub fn id_column_ddl(&self) -> &'static str {
        match self.kind {
            DialectKind::PostgreSql => "BIGSERIAL PRIMARY KEY",
            DialectKind::Sqlite => "INTEGER PRIMARY KEY AUTOINCREMENT",
        }
    }

    /// Appended to an INSERT so that it returns the new row id as a one-column result.
    pub fn returning_id(&self, id_column: &str) -> String {
        format!(" RETURNING {}", id_column)
    }

    pub fn boolean_literal(&self, b: bool) -> &'static str {
        match (self.kind, b) {
            (DialectKind::PostgreSql, true) => "TRUE",
            (DialectKind::PostgreSql, false) => "FALSE",
            (DialectKind::Sqlite, true) => "1",
            (DialectKind::Sqlite, false) => "0",
        }
    }

    /// Empty when neither is given.
    pub fn limit_clause(&self, limit: Option<u64>, offset: Option<u64>) -> String {
        match (self.kind, limit, offset) {
            (_, None, None) => String::new(),
            (_, Some(l), None) => format!(" LIMIT {}", l),
            (_, Some(l), Some(o)) => format!(" LIMIT {} OFFSET {}", l, o),
            (DialectKind::PostgreSql, None, Some(o)) => format!(" OFFSET {}", o),
            (DialectKind::Sqlite, None, Some(o)) => format!(" LIMIT -1 OFFSET {}", o),
        }
    }

    /// Reads the live column facts for one table.  An empty result means the table does not exist.
    pub fn get_columns(&self, conn: &mut dyn DbConnection, table: &str) -> Result<Vec<ColumnInfo>> {
        Util::check_identifier(table)?;
        match self.kind {
            DialectKind::PostgreSql => {
                let sql = format!(
                    "SELECT CAST(column_name AS VARCHAR), CAST(is_nullable AS VARCHAR), \
                     CAST(character_maximum_length AS BIGINT), CAST(numeric_precision AS BIGINT), \
                     CAST(numeric_scale AS BIGINT) FROM information_schema.columns \
                     WHERE table_name = lower('{}') ORDER BY ordinal_position",
                    table
                );
                let rows = conn.query(
                    &sql,
                    &[ColumnType::String, ColumnType::String, ColumnType::Bigint, ColumnType::Bigint, ColumnType::Bigint],
                )?;
                let mut columns = Vec::with_capacity(rows.len());
                for row in rows {
                    let name = opt_string(&row, 0).unwrap_or_default();
                    let nullable = opt_string(&row, 1).map(|s| s.eq_ignore_ascii_case("YES")).unwrap_or(true);
                    let size = opt_i64(&row, 2).or_else(|| opt_i64(&row, 3)).unwrap_or(0);
                    let scale = opt_i64(&row, 4).unwrap_or(0);
                    columns.push(ColumnInfo { name, nullable, size, scale });
                }
                Ok(columns)
            }
            DialectKind::Sqlite => {
                let sql = format!(
                    "SELECT name, \"notnull\", type, pk FROM pragma_table_info('{}')",
                    table
                );
                let rows = conn.query(
                    &sql,
                    &[ColumnType::String, ColumnType::Bigint, ColumnType::String, ColumnType::Bigint],
                )?;
                let mut columns = Vec::with_capacity(rows.len());
                for row in rows {
                    let name = opt_string(&row, 0).unwrap_or_default();
                    let not_null = opt_i64(&row, 1).unwrap_or(0) != 0 || opt_i64(&row, 3).unwrap_or(0) != 0;
                    let declared = opt_string(&row, 2).unwrap_or_default();
                    let (size, scale) = Self::parse_declared_size(&declared);
                    columns.push(ColumnInfo { name, nullable: !not_null, size, scale });
                }
                Ok(columns)
            }
        }
    }

    /// "VARCHAR(64)" gives (64, 0); "DECIMAL(12,4)" gives (12, 4); no parentheses gives (0, 0).
    pub fn parse_declared_size(declared: &str) -> (i64, i64) {
        match SQLITE_TYPE_SIZE.captures(declared) {
            Some(c) => {
                let size = c.get(1).and_then(|m| m.as_str().parse().ok()).unwrap_or(0);
                let scale = c.get(2).and_then(|m| m.as_str().parse().ok()).unwrap_or(0);
                (size, scale)
            }
            None => (0, 0),
        }
    }

    /// Splits `ids` into pieces no longer than the max IN-list size (one piece when unlimited).
    pub fn chunk<'a, T>(&self, ids: &'a [T]) -> Vec<&'a [T]> {
        match self.max_in_list {
            Some(n) if ids.len() > n => ids.chunks(n).collect(),
            _ => vec![ids],
        }
    }
}
