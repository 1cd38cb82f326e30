/*  This file is part of OneModel, a program to manage knowledge.
    Copyright in each year of 2025-2026 inclusive, Luke A. Call.
    OneModel is free software, distributed under a license that includes honesty, the Golden Rule,
    and the GNU Affero General Public License as published by the Free Software Foundation;
    see the file LICENSE for license version and details.
    OneModel is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranty of
    MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU Affero General Public License for more details.
    You should have received a copy of the GNU Affero General Public License along with OneModel.  If not, see <http://www.gnu.org/licenses/>
*/
use crate::context::Context;
use crate::error::{PersistError, Result};
use crate::instance::Instance;
use crate::model::database::{get_i64, opt_i64, ColumnType};
use crate::query::builder::QueryDefinition;
use crate::query::compiler::{CompiledQuery, Compiler, QueryScope};
use crate::query::run_cached;

/// Finds instances: the id and concrete type of every row a definition matches.
#[derive(Debug, Clone)]
pub struct InstanceQuery {
    definition: QueryDefinition,
}

impl InstanceQuery {
    pub fn new(definition: QueryDefinition) -> InstanceQuery {
        InstanceQuery { definition }
    }

    pub fn get_definition(&self) -> &QueryDefinition {
        &self.definition
    }

    /// Compiles for the context's user and tenant.
    pub fn compile(&self, ctx: &Context) -> Result<CompiledQuery> {
        let scope = QueryScope::of(ctx);
        Compiler::new(ctx.get_persistence().get_metadata(), ctx, &scope).compile_instances(&self.definition)
    }

    pub fn get_sql(&self, ctx: &Context) -> Result<String> {
        Ok(self.compile(ctx)?.sql)
    }

    pub fn execute(&self, ctx: &Context) -> Result<Vec<Instance>> {
        let compiled = self.compile(ctx)?;
        let types: &[ColumnType] = if compiled.has_type_column {
            &[ColumnType::Bigint, ColumnType::Bigint]
        } else {
            &[ColumnType::Bigint]
        };
        let rows = run_cached(ctx, "InstanceQuery.execute", self.definition.get_cache(), &compiled.sql, types)?;
        let main_type_id = compiled.main_type.get_id();
        rows.iter()
            .map(|row| {
                let id = get_i64(row, 0, "ID")?;
                let type_id = if compiled.has_type_column {
                    opt_i64(row, 1).unwrap_or(main_type_id)
                } else {
                    main_type_id
                };
                Ok(Instance::new(type_id, id))
            })
            .collect()
    }

    /// How many instances execute would find, ignoring limit and offset.
    pub fn count(&self, ctx: &Context) -> Result<i64> {
        let compiled = self.compile(ctx)?;
        let rows = run_cached(
            ctx,
            "InstanceQuery.count",
            self.definition.get_cache(),
            &compiled.count_sql,
            &[ColumnType::Bigint],
        )?;
        let row = rows
            .first()
            .ok_or_else(|| PersistError::execution(format!("No count from \"{}\"", compiled.count_sql)))?;
        get_i64(row, 0, "COUNT")
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::cache::CacheDefinition;
    use crate::context::{BeginOptions, UserIdentity};
    use crate::error::ErrorKind;
    use crate::query::builder::{CompanyScope, QueryBuilder};
    use crate::query::predicate::Where;
    use crate::test_support::Fixture;
    use crate::util::Util;

    fn alice() -> UserIdentity {
        UserIdentity::new(1, "alice").with_companies(vec![1, 2]).with_default_company(1)
    }

    #[test]
    fn test_tenant_a_excludes_tenant_b_rows() {
        Util::initialize_tracing();
        let f = Fixture::new();
        let p = f.persistence();
        let ctx = p.begin(BeginOptions::new().user(alice())).unwrap();
        let q = InstanceQuery::new(QueryBuilder::new("Invoice").order_by("Name").build());
        let found = q.execute(&ctx).unwrap();
        assert_eq!(found, vec![Instance::new(111, 2), Instance::new(110, 1)]);
        assert_eq!(q.count(&ctx).unwrap(), 2);

        ctx.set_company(2).unwrap();
        assert_eq!(q.execute(&ctx).unwrap(), vec![Instance::new(110, 3)]);

        let all = InstanceQuery::new(
            QueryBuilder::new("Invoice")
                .company_scope(CompanyScope::Visible)
                .order_by_desc("Total")
                .limit(2)
                .build(),
        );
        assert_eq!(all.execute(&ctx).unwrap(), vec![Instance::new(110, 1), Instance::new(111, 2)]);
        assert_eq!(all.count(&ctx).unwrap(), 3);
        ctx.commit().unwrap();
    }

    #[test]
    fn test_child_types_and_predicates() {
        Util::initialize_tracing();
        let f = Fixture::new();
        let p = f.persistence();
        let ctx = p.begin(BeginOptions::new()).unwrap();
        let exact = InstanceQuery::new(QueryBuilder::new("Invoice").include_child_types(false).build());
        assert_eq!(exact.count(&ctx).unwrap(), 2);
        let paid = InstanceQuery::new(QueryBuilder::new("Invoice").filter(Where::equal("Paid", true)).build());
        assert_eq!(paid.execute(&ctx).unwrap(), vec![Instance::new(111, 2)]);
        let classified = InstanceQuery::new(
            QueryBuilder::new("Invoice")
                .filter(Where::class_equal("InvoiceClassUrgent"))
                .build(),
        );
        assert_eq!(classified.execute(&ctx).unwrap(), vec![Instance::new(110, 3)]);
        let any_class = InstanceQuery::new(
            QueryBuilder::new("Invoice")
                .filter(Where::class_equal("InvoiceClass"))
                .order_by("Name")
                .build(),
        );
        assert_eq!(any_class.execute(&ctx).unwrap().len(), 2);
        let employees = InstanceQuery::new(QueryBuilder::new("Person").filter(Where::matches("Email", "b*")).build());
        assert_eq!(employees.execute(&ctx).unwrap(), vec![Instance::new(102, 2)]);
        ctx.close().unwrap();
    }

    #[test]
    fn test_results_are_cached_per_request() {
        Util::initialize_tracing();
        let f = Fixture::new();
        let p = f.persistence();
        let ctx = p.begin(BeginOptions::new()).unwrap();
        let q = InstanceQuery::new(
            QueryBuilder::new("Invoice")
                .cache(CacheDefinition::new(ctx.get_request_id()))
                .build(),
        );
        assert_eq!(q.execute(&ctx).unwrap().len(), 3);
        assert_eq!(p.get_query_cache().len(), 1);
        ctx.execute("test", "DELETE FROM T_INVOICE WHERE ID = 3").unwrap();
        // still answered from the cache
        assert_eq!(q.execute(&ctx).unwrap().len(), 3);
        ctx.close().unwrap();
        assert!(p.get_query_cache().is_empty());
    }

    #[test]
    fn test_user_without_tenant() {
        Util::initialize_tracing();
        let f = Fixture::new();
        let p = f.persistence();
        let ctx = p.begin(BeginOptions::new().user(UserIdentity::new(2, "bob"))).unwrap();
        let e = InstanceQuery::new(QueryBuilder::new("Invoice").build()).execute(&ctx).unwrap_err();
        assert!(e.is_kind(ErrorKind::NoTenant));
        let persons = InstanceQuery::new(QueryBuilder::new("Person").build()).get_sql(&ctx).unwrap();
        assert!(persons.contains("T_ENTITY"));
        ctx.close().unwrap();
    }
}
