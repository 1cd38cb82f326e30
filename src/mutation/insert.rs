/*  This file is part of OneModel, a program to manage knowledge.
    Copyright in each year of 2025-2026 inclusive, Luke A. Call.
    OneModel is free software, distributed under a license that includes honesty, the Golden Rule,
    and the GNU Affero General Public License as published by the Free Software Foundation;
    see the file LICENSE for license version and details.
    OneModel is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranty of
    MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU Affero General Public License for more details.
    You should have received a copy of the GNU Affero General Public License along with OneModel.  If not, see <http://www.gnu.org/licenses/>
*/
use crate::access::{require_access, AccessType};
use crate::context::Context;
use crate::error::{PersistError, Result};
use crate::instance::Instance;
use crate::meta::cache_index::CacheKey;
use crate::model::database::{get_i64, ColumnType, DbRow};
use crate::mutation::{abort_with, by_table, check_names, stamp};
use crate::util::Util;
use crate::value::Value;
use std::collections::BTreeMap;
use tracing::*;

/// Creates an instance of a type from attribute values.
#[derive(Debug, Clone)]
#[must_use]
pub struct Insert {
    type_key: CacheKey,
    values: BTreeMap<String, Value>,
}

impl Insert {
    pub fn new(type_key: impl Into<CacheKey>) -> Insert {
        Insert {
            type_key: type_key.into(),
            values: BTreeMap::new(),
        }
    }

    pub fn set(mut self, attribute: &str, value: impl Into<Value>) -> Insert {
        self.values.insert(attribute.to_string(), value.into());
        self
    }

    /// Writes the main table row (getting the new id back), then one row in each extension
    /// table, then the general instance row if the type keeps one.
    pub fn execute(&self, ctx: &Context) -> Result<Instance> {
        let persistence = ctx.get_persistence();
        let t = persistence.get_metadata().get_type(ctx, self.type_key.clone())?;
        if t.is_abstract() {
            return Err(PersistError::invalid_value(format!(
                "Type '{}' is abstract; only its descendants can be inserted",
                t.get_name()
            )));
        }
        require_access(ctx, &t, None, AccessType::Create)?;
        check_names(&t, &self.values)?;

        let stamp = stamp(ctx, t.get_id());
        let mut values = self.values.clone();
        for a in t.get_attributes().values() {
            if a.get_attribute_type().is_always_insert() {
                if let Some(v) = a.get_kind().generated_value(&stamp) {
                    values.insert(a.get_name().to_string(), v);
                    continue;
                }
            }
            if !values.contains_key(a.get_name()) {
                if let Some(default) = a.get_default() {
                    values.insert(a.get_name().to_string(), default);
                }
            }
        }
        for a in t.get_attributes().values().filter(|a| a.is_required()) {
            if values.get(a.get_name()).map(|v| v.is_null()).unwrap_or(true) {
                return Err(PersistError::invalid_value(format!(
                    "Attribute '{}' of type '{}' is required",
                    a.get_name(),
                    t.get_name()
                )));
            }
        }

        let dialect = persistence.get_metadata().get_dialect();
        let tables = by_table(&t, &values, dialect)?;
        let (main, extensions) = tables
            .split_first()
            .ok_or_else(|| PersistError::query_compilation(format!("Type '{}' has no tables", t.get_name())))?;
        let sql = format!(
            "{}{}",
            main.insert_sql(None),
            dialect.returning_id(main.table.get_sql_column_id())
        );
        let rows = ctx.query("Insert", &sql, &[ColumnType::Bigint])?;
        let id = returned_id(ctx, rows.first(), &sql)?;
        for extension in extensions {
            ctx.execute("Insert", &extension.insert_sql(Some(id)))?;
        }

        let instance = Instance::new(t.get_id(), id);
        if t.is_general_instance() {
            let sql = format!(
                "INSERT INTO {} (INSTANCE_TYPE_ID, INSTANCE_ID) VALUES ({}, {}){}",
                Util::GENERAL_INSTANCE_TABLE,
                t.get_id(),
                id,
                dialect.returning_id("ID")
            );
            let rows = ctx.query("Insert", &sql, &[ColumnType::Bigint])?;
            if let Some(row) = rows.first() {
                instance.set_general_id(get_i64(row, 0, "ID")?);
            }
        }
        debug!("Inserted {} into {} table(s).", instance, tables.len());
        Ok(instance)
    }
}

/// The id in the first row a main table insert returned.  No row aborts the context.
fn returned_id(ctx: &Context, row: Option<&DbRow>, sql: &str) -> Result<i64> {
    match row {
        Some(row) => get_i64(row, 0, "ID").map_err(|e| abort_with(ctx, e)),
        None => Err(abort_with(
            ctx,
            PersistError::execution(format!("No id came back from \"{}\"", sql)),
        )),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::access::AccessCheck;
    use crate::context::transaction::TransactionStatus;
    use crate::context::{BeginOptions, UserIdentity};
    use crate::error::ErrorKind;
    use crate::meta::entity_type::Type;
    use crate::test_support::Fixture;
    use std::sync::Arc;

    struct ReadOnly {}

    impl AccessCheck for ReadOnly {
        fn check(&self, _ctx: &Context, _t: &Type, _i: Option<&Instance>, access: AccessType) -> Result<bool> {
            Ok(access == AccessType::Read)
        }
    }

    #[test]
    fn test_insert_fills_generated_and_default_values() {
        Util::initialize_tracing();
        let f = Fixture::new();
        let p = f.persistence();
        let alice = UserIdentity::new(1, "alice").with_companies(vec![1, 2]).with_default_company(1);
        let ctx = p.begin(BeginOptions::new().user(alice)).unwrap();
        let i = Insert::new("Invoice")
            .set("Name", "INV-4")
            .set("Total", 9.5)
            .set("Contact", 1)
            .execute(&ctx)
            .unwrap();
        assert_eq!(i, Instance::new(110, 4));
        assert_eq!(i.get_general_id(&*ctx).unwrap(), None);
        ctx.commit().unwrap();
        assert_eq!(f.query_i64("SELECT COMPANYID FROM T_INVOICE WHERE ID = 4"), Some(1));
        assert_eq!(f.query_i64("SELECT TYPEID FROM T_INVOICE WHERE ID = 4"), Some(110));
        assert_eq!(f.query_i64("SELECT PAID FROM T_INVOICE WHERE ID = 4"), Some(0));
        assert!(f.query_i64("SELECT CREATED FROM T_INVOICE WHERE ID = 4").unwrap() > 0);
    }

    #[test]
    fn test_insert_extension_and_general_instance_rows() {
        Util::initialize_tracing();
        let f = Fixture::new();
        let p = f.persistence();
        let ctx = p.begin(BeginOptions::new()).unwrap();
        let i = Insert::new("Employee")
            .set("Name", "Carol")
            .set("Email", "carol@example.com")
            .execute(&ctx)
            .unwrap();
        assert_eq!(i, Instance::new(102, 3));
        assert!(i.get_general_id(&*ctx).unwrap().is_some());
        ctx.commit().unwrap();
        assert_eq!(f.query_i64("SELECT TYPEID FROM T_ENTITY WHERE ID = 3"), Some(102));
        assert_eq!(f.query_i64("SELECT COUNT(*) FROM T_PERSON WHERE ID = 3 AND EMAIL = 'carol@example.com'"), Some(1));
        assert_eq!(
            f.query_i64("SELECT COUNT(*) FROM om_general_instance WHERE INSTANCE_TYPE_ID = 102 AND INSTANCE_ID = 3"),
            Some(1)
        );
    }

    #[test]
    fn test_no_returned_id_marks_rollback() {
        Util::initialize_tracing();
        let f = Fixture::new();
        let p = f.persistence();
        let ctx = p.begin(BeginOptions::new()).unwrap();
        let e = returned_id(&ctx, None, "INSERT INTO T_INVOICE (NAME) VALUES ('x')").unwrap_err();
        assert!(e.is_kind(ErrorKind::Execution));
        assert_eq!(ctx.get_status(), TransactionStatus::MarkedRollback);
        ctx.close().unwrap();

        let ctx = p.begin(BeginOptions::new()).unwrap();
        let row: DbRow = vec![Some(crate::model::database::DataType::Bigint(8))];
        assert_eq!(returned_id(&ctx, Some(&row), "").unwrap(), 8);
        assert_eq!(ctx.get_status(), TransactionStatus::Active);
        ctx.close().unwrap();
    }

    #[test]
    fn test_rejected_inserts() {
        Util::initialize_tracing();
        let f = Fixture::new();
        let p = f.persistence();
        let ctx = p.begin(BeginOptions::new()).unwrap();
        let e = Insert::new("Entity").set("Name", "x").execute(&ctx).unwrap_err();
        assert!(e.is_kind(ErrorKind::InvalidValue));
        // no company to generate one from
        let e = Insert::new("Invoice").set("Name", "x").execute(&ctx).unwrap_err();
        assert!(e.get_message().contains("Company"), "{}", e);
        let e = Insert::new("Invoice").set("Colour", "red").execute(&ctx).unwrap_err();
        assert!(e.is_kind(ErrorKind::InvalidValue));
        let e = Insert::new("Invoice").set("Taxes", 1).execute(&ctx).unwrap_err();
        assert!(e.is_kind(ErrorKind::InvalidValue));
        // nothing ran, so the transaction is still good
        assert_eq!(ctx.get_status(), TransactionStatus::Active);
        ctx.close().unwrap();

        let p = f.persistence_with(|b| b.access_check(Arc::new(ReadOnly {})));
        let ctx = p.begin(BeginOptions::new()).unwrap();
        let e = Insert::new("Person").set("Name", "x").execute(&ctx).unwrap_err();
        assert!(e.is_kind(ErrorKind::Access));
        ctx.close().unwrap();
    }
}
