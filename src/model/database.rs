/*  This file is part of OneModel, a program to manage knowledge.
    Copyright in each year of 2016-2017 inclusive, 2020, 2023, and 2025-2026 inclusive, Luke A. Call.
    OneModel is free software, distributed under a license that includes honesty, the Golden Rule,
    and the GNU Affero General Public License as published by the Free Software Foundation;
    see the file LICENSE for license version and details.
    OneModel is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranty of
    MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU Affero General Public License for more details.
    You should have received a copy of the GNU Affero General Public License along with OneModel.  If not, see <http://www.gnu.org/licenses/>
*/
use crate::error::{PersistError, Result};
use crate::model::dialect::Dialect;

/// One value of one column of one returned row.  A SQL NULL is the None of the Option<DataType>
/// that holds it.
#[derive(Debug, Clone, PartialEq)]
pub enum DataType {
    Bigint(i64),
    Boolean(bool),
    String(String),
    Float(f64),
}

/// What the caller expects back in each selected column, in order.  Decoding is by these, not
/// by asking the driver what it thinks the column is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Bigint,
    Boolean,
    String,
    Float,
}

pub type DbRow = Vec<Option<DataType>>;

impl DataType {
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            DataType::Bigint(x) => Some(*x),
            DataType::Float(x) => Some(*x as i64),
            DataType::Boolean(b) => Some(if *b { 1 } else { 0 }),
            DataType::String(s) => s.trim().parse::<i64>().ok(),
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            DataType::Bigint(x) => Some(*x as f64),
            DataType::Float(x) => Some(*x),
            DataType::Boolean(_) => None,
            DataType::String(s) => s.trim().parse::<f64>().ok(),
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            DataType::Boolean(b) => Some(*b),
            DataType::Bigint(x) => Some(*x != 0),
            DataType::Float(_) => None,
            DataType::String(s) => match s.as_str() {
                "t" | "true" | "TRUE" | "1" => Some(true),
                "f" | "false" | "FALSE" | "0" => Some(false),
                _ => None,
            },
        }
    }

    pub fn as_string(&self) -> String {
        match self {
            DataType::Bigint(x) => x.to_string(),
            DataType::Float(x) => x.to_string(),
            DataType::Boolean(b) => b.to_string(),
            DataType::String(s) => s.clone(),
        }
    }
}

/// Reads column `i` of a row as an i64, with a useful message when it is missing or null.
pub fn get_i64(row: &DbRow, i: usize, what: &str) -> Result<i64> {
    opt_i64(row, i).ok_or_else(|| {
        PersistError::execution(format!("Expected a number in column {} ({}), got {:?}", i, what, row.get(i)))
    })
}

pub fn opt_i64(row: &DbRow, i: usize) -> Option<i64> {
    row.get(i).and_then(|v| v.as_ref()).and_then(|v| v.as_i64())
}

pub fn opt_f64(row: &DbRow, i: usize) -> Option<f64> {
    row.get(i).and_then(|v| v.as_ref()).and_then(|v| v.as_f64())
}

pub fn opt_bool(row: &DbRow, i: usize) -> Option<bool> {
    row.get(i).and_then(|v| v.as_ref()).and_then(|v| v.as_bool())
}

pub fn opt_string(row: &DbRow, i: usize) -> Option<String> {
    row.get(i).and_then(|v| v.as_ref()).map(|v| v.as_string())
}

pub fn get_string(row: &DbRow, i: usize, what: &str) -> Result<String> {
    opt_string(row, i).ok_or_else(|| {
        PersistError::execution(format!("Expected text in column {} ({}), got {:?}", i, what, row.get(i)))
    })
}

/// One connection, exclusively held by whoever opened it.  Every call blocks until the store
/// answers.  Implementations must refuse statements that fail Util::check_for_bad_sql, and
/// must roll back an open transaction if dropped without commit or rollback.
pub trait DbConnection: Send {
    /// Returns the results (a collection of rows, each row being its own collection), decoded
    /// per `types`, which must have one entry per selected column.
    fn query(&mut self, sql: &str, types: &[ColumnType]) -> Result<Vec<DbRow>>;

    /// Runs an insert/update/delete/ddl statement, returning the count of rows affected.
    fn execute(&mut self, sql: &str) -> Result<u64>;

    fn begin(&mut self) -> Result<()>;
    fn commit(&mut self) -> Result<()>;
    fn rollback(&mut self) -> Result<()>;
    fn is_in_transaction(&self) -> bool;

    fn query_one_row(&mut self, sql: &str, types: &[ColumnType]) -> Result<DbRow> {
        let mut rows = self.query(sql, types)?;
        if rows.len() != 1 {
            return Err(PersistError::execution(format!(
                "Got {} instead of 1 result from sql \"{}\" ??",
                rows.len(),
                sql
            )));
        }
        Ok(rows.remove(0))
    }

    fn does_this_exist(&mut self, sql: &str) -> Result<bool> {
        let row = self.query_one_row(sql, &[ColumnType::Bigint])?;
        Ok(opt_i64(&row, 0).unwrap_or(0) > 0)
    }
}

/// The backing relational store, as far as this crate needs to know it.
pub trait Database: Send + Sync {
    fn open_connection(&self) -> Result<Box<dyn DbConnection>>;
    fn get_dialect(&self) -> &Dialect;
}

/// Something that can lend out a connection for the duration of a call, like a Context does
/// with the one it holds.  Not reentrant: `f` must do all its work on the connection it is given.
pub trait ConnectionProvider {
    fn with_connection(&self, f: &mut dyn FnMut(&mut dyn DbConnection) -> Result<()>) -> Result<()>;
}

impl ConnectionProvider for parking_lot::Mutex<Box<dyn DbConnection>> {
    fn with_connection(&self, f: &mut dyn FnMut(&mut dyn DbConnection) -> Result<()>) -> Result<()> {
        let mut conn = self.lock();
        f(conn.as_mut())
    }
}

/// Lends a freshly pooled connection for each call, for lookups made outside of any Context.
pub struct PoolProvider {
    database: std::sync::Arc<dyn Database>,
}

impl PoolProvider {
    pub fn new(database: std::sync::Arc<dyn Database>) -> PoolProvider {
        PoolProvider { database }
    }
}

impl ConnectionProvider for PoolProvider {
    fn with_connection(&self, f: &mut dyn FnMut(&mut dyn DbConnection) -> Result<()>) -> Result<()> {
        let mut conn = self.database.open_connection()?;
        f(conn.as_mut())
    }
}

/// Runs `f` on a provider's connection and hands back what it returns.
pub fn with_connection<R>(
    provider: &dyn ConnectionProvider,
    mut f: impl FnMut(&mut dyn DbConnection) -> Result<R>,
) -> Result<R> {
    let mut out: Option<R> = None;
    provider.with_connection(&mut |conn| {
        out = Some(f(conn)?);
        Ok(())
    })?;
    out.ok_or_else(|| PersistError::execution("The connection provider did not run the request."))
}
