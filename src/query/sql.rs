/*  This file is part of OneModel, a program to manage knowledge.
    Copyright in each year of 2025-2026 inclusive, Luke A. Call.
    OneModel is free software, distributed under a license that includes honesty, the Golden Rule,
    and the GNU Affero General Public License as published by the Free Software Foundation;
    see the file LICENSE for license version and details.
    OneModel is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranty of
    MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU Affero General Public License for more details.
    You should have received a copy of the GNU Affero General Public License along with OneModel.  If not, see <http://www.gnu.org/licenses/>
*/
//! Assembling one SELECT statement.  Every table the statement touches gets an index, and from
//! it an alias: `T0` is always the main table, and a subquery's aliases carry its own prefix
//! (`S1T0`, `S1T1`, ...) so they never collide with the outer statement's.
use crate::meta::attribute::Attribute;
use crate::meta::sql_table::SqlTable;
use crate::model::dialect::Dialect;
use std::collections::HashMap;

/// Hands out table indices.  A table reached twice along the same path (the queried type's own
/// extension table, say) shares one index; reached along different paths (two different links
/// to the same type) it gets two.
#[derive(Debug)]
pub struct TableIndexer {
    prefix: String,
    indices: HashMap<(String, i64), usize>,
    next: usize,
}

impl TableIndexer {
    pub fn new(prefix: &str) -> TableIndexer {
        TableIndexer {
            prefix: prefix.to_string(),
            indices: HashMap::new(),
            next: 0,
        }
    }

    /// The index for `table_id` along `path`, and whether it was just assigned.
    pub fn get_index(&mut self, path: &str, table_id: i64) -> (usize, bool) {
        if let Some(i) = self.indices.get(&(path.to_string(), table_id)) {
            return (*i, false);
        }
        let i = self.next;
        self.next += 1;
        self.indices.insert((path.to_string(), table_id), i);
        (i, true)
    }

    pub fn alias(&self, index: usize) -> String {
        format!("{}T{}", self.prefix, index)
    }

    pub fn get_prefix(&self) -> &str {
        &self.prefix
    }

    pub fn len(&self) -> usize {
        self.next
    }

    pub fn is_empty(&self) -> bool {
        self.next == 0
    }
}

/// The parts of a statement, filled in by the compiler and then rendered.
#[derive(Debug)]
pub struct SqlSelect {
    indexer: TableIndexer,
    from: String,
    joins: Vec<String>,
    columns: Vec<String>,
    conditions: Vec<String>,
    order: Vec<String>,
    limit: Option<u64>,
    offset: Option<u64>,
}

impl SqlSelect {
    /// Starts a statement over `main_table`, which takes index 0.
    pub fn new(prefix: &str, main_table: &SqlTable) -> SqlSelect {
        let mut indexer = TableIndexer::new(prefix);
        let (index, _) = indexer.get_index("", main_table.get_id());
        let from = format!("{} {}", main_table.get_sql_table(), indexer.alias(index));
        SqlSelect {
            indexer,
            from,
            joins: vec![],
            columns: vec![],
            conditions: vec![],
            order: vec![],
            limit: None,
            offset: None,
        }
    }

    pub fn main_alias(&self) -> String {
        self.indexer.alias(0)
    }

    pub fn get_prefix(&self) -> &str {
        self.indexer.get_prefix()
    }

    /// The alias of `table` along `path`, LEFT JOINed on its id column equal to `on` the first
    /// time it is asked for.
    pub fn join(&mut self, path: &str, table: &SqlTable, on: &str) -> String {
        let (index, new) = self.indexer.get_index(path, table.get_id());
        let alias = self.indexer.alias(index);
        if new {
            self.joins.push(format!(
                "LEFT JOIN {} {} ON {}.{} = {}",
                table.get_sql_table(),
                alias,
                alias,
                table.get_sql_column_id(),
                on
            ));
        }
        alias
    }

    /// The qualified columns of `attribute`, reached from the type whose main table is aliased
    /// `base_alias` along `path`.  Attributes kept in an extension table pull that table in.
    pub fn attribute_columns(
        &mut self,
        path: &str,
        base_alias: &str,
        base_table: &SqlTable,
        attribute: &Attribute,
    ) -> Vec<String> {
        let table = attribute.get_table();
        let alias = if table.get_id() == base_table.get_id() {
            base_alias.to_string()
        } else {
            let on = format!("{}.{}", base_alias, base_table.get_sql_column_id());
            self.join(path, table, &on)
        };
        attribute
            .get_sql_columns()
            .iter()
            .map(|c| format!("{}.{}", alias, c))
            .collect()
    }

    /// Adds a selected expression, returning its position.
    pub fn add_column(&mut self, expression: String) -> usize {
        self.columns.push(expression);
        self.columns.len() - 1
    }

    pub fn get_column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn add_condition(&mut self, condition: String) {
        self.conditions.push(condition);
    }

    pub fn add_order(&mut self, expression: String) {
        self.order.push(expression);
    }

    pub fn set_limit(&mut self, limit: Option<u64>, offset: Option<u64>) {
        self.limit = limit;
        self.offset = offset;
    }

    fn from_and_where(&self) -> String {
        let mut sql = format!(" FROM {}", self.from);
        for j in &self.joins {
            sql.push(' ');
            sql.push_str(j);
        }
        if !self.conditions.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&self.conditions.join(" AND "));
        }
        sql
    }

    pub fn to_sql(&self, dialect: &Dialect) -> String {
        let mut sql = format!("SELECT {}", self.columns.join(", "));
        sql.push_str(&self.from_and_where());
        if !self.order.is_empty() {
            sql.push_str(" ORDER BY ");
            sql.push_str(&self.order.join(", "));
        }
        sql.push_str(&dialect.limit_clause(self.limit, self.offset));
        sql
    }

    /// Counts what the statement would select; ordering and paging do not apply.
    pub fn to_count_sql(&self) -> String {
        format!("SELECT COUNT(*){}", self.from_and_where())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::model::dialect::DialectKind;

    #[test]
    fn test_indexer_shares_per_path() {
        let mut t = TableIndexer::new("S1");
        assert_eq!(t.get_index("", 12), (0, true));
        assert_eq!(t.get_index("", 12), (0, false));
        assert_eq!(t.get_index("linkto[Contact]", 10), (1, true));
        assert_eq!(t.get_index("linkto[Creator]", 10), (2, true));
        assert_eq!(t.alias(2), "S1T2");
        assert_eq!(t.len(), 3);
    }

    #[test]
    fn test_select_rendering() {
        let main = SqlTable::new(12, uuid::Uuid::nil(), "Invoice", "T_INVOICE", "ID", Some("TYPEID"), None, vec![]);
        let ext = SqlTable::new(11, uuid::Uuid::nil(), "Person", "T_PERSON", "ID", None, Some(10), vec![]);
        let mut s = SqlSelect::new("", &main);
        let t0 = s.main_alias();
        s.add_column(format!("{}.ID", t0));
        let a = s.join("linkto[Contact]", &ext, "T0.CONTACT");
        assert_eq!(a, "T1");
        assert_eq!(s.join("linkto[Contact]", &ext, "T0.CONTACT"), "T1");
        s.add_column(format!("{}.EMAIL", a));
        s.add_condition("T0.TYPEID = 110".to_string());
        s.add_order("T0.ID".to_string());
        s.set_limit(Some(2), None);
        let dialect = Dialect::new(DialectKind::Sqlite, None);
        assert_eq!(
            s.to_sql(&dialect),
            "SELECT T0.ID, T1.EMAIL FROM T_INVOICE T0 LEFT JOIN T_PERSON T1 ON T1.ID = T0.CONTACT \
             WHERE T0.TYPEID = 110 ORDER BY T0.ID LIMIT 2"
        );
        assert_eq!(
            s.to_count_sql(),
            "SELECT COUNT(*) FROM T_INVOICE T0 LEFT JOIN T_PERSON T1 ON T1.ID = T0.CONTACT WHERE T0.TYPEID = 110"
        );
    }
}
