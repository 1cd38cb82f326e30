/*  This file is part of OneModel, a program to manage knowledge.
    Copyright in each year of 2025-2026 inclusive, Luke A. Call.
    OneModel is free software, distributed under a license that includes honesty, the Golden Rule,
    and the GNU Affero General Public License as published by the Free Software Foundation;
    see the file LICENSE for license version and details.
    OneModel is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranty of
    MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU Affero General Public License for more details.
    You should have received a copy of the GNU Affero General Public License along with OneModel.  If not, see <http://www.gnu.org/licenses/>
*/
//! Turns a QueryDefinition into SQL.  Besides what the caller asked for, every statement gets
//! the type discriminator, the tenant filter and the association filter its type calls for.
use crate::context::{Context, UserIdentity};
use crate::error::{PersistError, Result};
use crate::meta::attribute::Attribute;
use crate::meta::attribute_type::AttributeKind;
use crate::meta::entity_type::Type;
use crate::meta::MetadataCache;
use crate::model::database::ConnectionProvider;
use crate::query::builder::{CompanyScope, QueryDefinition};
use crate::query::predicate::{like_pattern, Comparison, Where};
use crate::query::sql::SqlSelect;
use crate::util::Util;
use crate::value::Value;
use std::cell::Cell;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::*;

/// The tenant facts a compilation depends on.  A scope without a user is the system's: it sees
/// every tenant and gets no tenant or association filter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryScope {
    user: bool,
    company: Option<i64>,
    companies: Vec<i64>,
    consortia: Vec<i64>,
    associations: Vec<i64>,
}

impl QueryScope {
    pub fn system() -> QueryScope {
        QueryScope::default()
    }

    pub fn for_user(user: &UserIdentity, company: Option<i64>) -> QueryScope {
        QueryScope {
            user: true,
            company,
            companies: user.get_companies().to_vec(),
            consortia: user.get_consortia().to_vec(),
            associations: user.get_associations().to_vec(),
        }
    }

    pub fn of(ctx: &Context) -> QueryScope {
        match ctx.get_user() {
            Some(u) => Self::for_user(u, ctx.get_company()),
            None => Self::system(),
        }
    }

    pub fn is_system(&self) -> bool {
        !self.user
    }
}

/// A definition resolved against the metadata: the type its attributes come from, the types
/// queried, and the statement so far (joins and conditions, no selected columns yet).
#[derive(Debug)]
pub struct Prepared {
    pub main_type: Arc<Type>,
    pub types: Vec<Arc<Type>>,
    pub select: SqlSelect,
    /// where the concrete type of each row can be read, if the main table has a type column
    pub type_column: Option<String>,
}

impl Prepared {
    /// The main table's id column, qualified.
    pub fn id_column(&self) -> Result<String> {
        Ok(format!(
            "{}.{}",
            self.select.main_alias(),
            self.main_type.require_main_table()?.get_sql_column_id()
        ))
    }

    /// The qualified columns of one of the main type's attributes, joining its table if needed.
    pub fn columns_of(&mut self, attribute: &Attribute) -> Result<Vec<String>> {
        let main_table = self.main_type.require_main_table()?.clone();
        let alias = self.select.main_alias();
        Ok(self.select.attribute_columns("", &alias, &main_table, attribute))
    }
}

pub struct Compiler<'a> {
    metadata: &'a MetadataCache,
    provider: &'a dyn ConnectionProvider,
    scope: &'a QueryScope,
    subqueries: Cell<usize>,
}

impl<'a> Compiler<'a> {
    pub fn new(metadata: &'a MetadataCache, provider: &'a dyn ConnectionProvider, scope: &'a QueryScope) -> Compiler<'a> {
        Compiler {
            metadata,
            provider,
            scope,
            subqueries: Cell::new(0),
        }
    }

    pub fn get_metadata(&self) -> &MetadataCache {
        self.metadata
    }

    pub fn get_provider(&self) -> &dyn ConnectionProvider {
        self.provider
    }

    fn next_prefix(&self) -> String {
        let n = self.subqueries.get() + 1;
        self.subqueries.set(n);
        format!("S{}", n)
    }

    pub fn prepare(&self, definition: &QueryDefinition) -> Result<Prepared> {
        self.prepare_with_prefix(definition, "")
    }

    fn prepare_with_prefix(&self, definition: &QueryDefinition, prefix: &str) -> Result<Prepared> {
        let types = definition
            .get_types()
            .iter()
            .map(|k| self.metadata.get_type(self.provider, k.clone()))
            .collect::<Result<Vec<_>>>()?;
        let main_type = if types.len() == 1 {
            types[0].clone()
        } else {
            self.metadata.get_common_ancestor(self.provider, &types)?
        };
        let main_table = main_type.require_main_table()?.clone();
        let mut select = SqlSelect::new(prefix, &main_table);
        let main_alias = select.main_alias();

        let type_column = main_table
            .get_sql_column_type()
            .map(|c| format!("{}.{}", main_alias, c));
        if let Some(column) = &type_column {
            let mut ids = BTreeSet::new();
            for t in &types {
                ids.insert(t.get_id());
                if definition.is_include_child_types() {
                    ids.extend(self.metadata.get_descendant_ids(self.provider, t)?);
                }
            }
            select.add_condition(self.id_list(column, &ids.into_iter().collect::<Vec<_>>()));
        }

        let mut prepared = Prepared {
            main_type,
            types,
            select,
            type_column,
        };
        self.add_tenant_condition(&mut prepared, definition.get_company_scope())?;
        self.add_association_condition(&mut prepared)?;

        if let Some(filter) = definition.get_filter() {
            let condition = self.where_sql(&mut prepared, filter)?;
            prepared.select.add_condition(condition);
        }
        for order in definition.get_order() {
            let attribute = prepared.main_type.require_attribute(&order.attribute)?.clone();
            let column = self.single_column(&mut prepared, &attribute)?;
            prepared
                .select
                .add_order(if order.descending { format!("{} DESC", column) } else { column });
        }
        prepared.select.set_limit(definition.get_limit(), definition.get_offset());
        Ok(prepared)
    }

    fn add_tenant_condition(&self, prepared: &mut Prepared, scope: CompanyScope) -> Result<()> {
        if scope == CompanyScope::Disabled || self.scope.is_system() {
            return Ok(());
        }
        let t = prepared.main_type.clone();
        let (attribute, tenants) = if let Some(a) = t.get_company_attribute() {
            let tenants = match scope {
                CompanyScope::Current => self.scope.company.into_iter().collect(),
                _ => self.scope.companies.clone(),
            };
            (a.clone(), tenants)
        } else if let Some(a) = t.get_consortium_attribute() {
            (a.clone(), self.scope.consortia.clone())
        } else {
            return Ok(());
        };
        if tenants.is_empty() {
            return Err(PersistError::no_tenant(format!(
                "Type '{}' is company dependent, but there is no {} tenant to restrict it to",
                t.get_name(),
                if scope == CompanyScope::Current { "current" } else { "visible" }
            )));
        }
        let column = self.single_column(prepared, &attribute)?;
        prepared.select.add_condition(in_list(&column, &tenants));
        Ok(())
    }

    fn add_association_condition(&self, prepared: &mut Prepared) -> Result<()> {
        if self.scope.is_system() || self.scope.associations.is_empty() {
            return Ok(());
        }
        if let Some(a) = prepared.main_type.get_association_attribute().cloned() {
            let column = self.single_column(prepared, &a)?;
            prepared.select.add_condition(in_list(&column, &self.scope.associations));
        }
        Ok(())
    }

    fn single_column(&self, prepared: &mut Prepared, attribute: &Attribute) -> Result<String> {
        prepared.columns_of(attribute)?.into_iter().next().ok_or_else(|| {
            PersistError::query_compilation(format!(
                "Attribute '{}' has no column to query by",
                attribute.get_name()
            ))
        })
    }

    fn where_sql(&self, prepared: &mut Prepared, w: &Where) -> Result<String> {
        let sql = match w {
            Where::Compare {
                attribute,
                comparison,
                value,
            } => {
                let a = prepared.main_type.require_attribute(attribute)?.clone();
                let column = self.single_column(prepared, &a)?;
                match (comparison, value) {
                    (Comparison::Equal, Value::Null) => format!("{} IS NULL", column),
                    (Comparison::NotEqual, Value::Null) => format!("{} IS NOT NULL", column),
                    (_, Value::Null) => {
                        return Err(PersistError::query_compilation(format!(
                            "'{}' can not be compared with NULL by {:?}",
                            attribute, comparison
                        )))
                    }
                    (Comparison::Match, v) => {
                        format!("{} LIKE {}", column, Util::quote(&like_pattern(&v.to_string())))
                    }
                    (c, v) => format!("{} {} {}", column, c.sql_operator(), self.literal(&a, v)?),
                }
            }
            Where::In {
                attribute,
                values,
                negate,
            } => {
                let a = prepared.main_type.require_attribute(attribute)?.clone();
                let column = self.single_column(prepared, &a)?;
                let literals = values
                    .iter()
                    .map(|v| self.literal(&a, v))
                    .collect::<Result<Vec<_>>>()?;
                self.chunked_in(&column, &literals, *negate)
            }
            Where::Null { attribute, negate } => {
                let a = prepared.main_type.require_attribute(attribute)?.clone();
                let column = self.single_column(prepared, &a)?;
                format!("{} IS {}NULL", column, if *negate { "NOT " } else { "" })
            }
            Where::InQuery {
                attribute,
                query,
                negate,
            } => {
                let a = prepared.main_type.require_attribute(attribute)?.clone();
                let column = self.single_column(prepared, &a)?;
                let mut inner = self.prepare_with_prefix(query.get_definition(), &self.next_prefix())?;
                let selected = inner.main_type.require_attribute(query.get_attribute())?.clone();
                let inner_column = self.single_column(&mut inner, &selected)?;
                inner.select.add_column(inner_column);
                format!(
                    "{} {}IN ({})",
                    column,
                    if *negate { "NOT " } else { "" },
                    inner.select.to_sql(self.metadata.get_dialect())
                )
            }
            Where::ClassEqual(name) => self.class_sql(prepared, name)?,
            Where::IdIn(ids) => {
                let column = prepared.id_column()?;
                let literals: Vec<String> = ids.iter().map(|i| i.to_string()).collect();
                self.chunked_in(&column, &literals, false)
            }
            Where::And(all) => {
                if all.is_empty() {
                    return Ok("1 = 1".to_string());
                }
                let parts = all
                    .iter()
                    .map(|w| self.where_sql(prepared, w))
                    .collect::<Result<Vec<_>>>()?;
                format!("({})", parts.join(" AND "))
            }
            Where::Or(any) => {
                if any.is_empty() {
                    return Ok("1 = 0".to_string());
                }
                let parts = any
                    .iter()
                    .map(|w| self.where_sql(prepared, w))
                    .collect::<Result<Vec<_>>>()?;
                format!("({})", parts.join(" OR "))
            }
            Where::Not(inner) => format!("NOT ({})", self.where_sql(prepared, inner)?),
        };
        Ok(sql)
    }

    /// An IN list split where the store limits its length.
    /// `column = id` for one id, else an IN list split to the dialect's maximum size.
    fn id_list(&self, column: &str, ids: &[i64]) -> String {
        if ids.len() == 1 {
            return in_list(column, ids);
        }
        let literals: Vec<String> = ids.iter().map(|i| i.to_string()).collect();
        self.chunked_in(column, &literals, false)
    }

    fn chunked_in(&self, column: &str, literals: &[String], negate: bool) -> String {
        if literals.is_empty() {
            return if negate { "1 = 1" } else { "1 = 0" }.to_string();
        }
        let (op, joiner) = if negate { ("NOT IN", " AND ") } else { ("IN", " OR ") };
        let parts: Vec<String> = self
            .metadata
            .get_dialect()
            .chunk(literals)
            .into_iter()
            .map(|chunk| format!("{} {} ({})", column, op, chunk.join(", ")))
            .collect();
        if parts.len() == 1 {
            parts.into_iter().collect()
        } else {
            format!("({})", parts.join(joiner))
        }
    }

    /// EXISTS over the classification's relation type, matching the classification or any of
    /// its children.
    fn class_sql(&self, prepared: &mut Prepared, name: &str) -> Result<String> {
        let class_type = self.metadata.get_type(self.provider, name)?;
        let data = class_type.get_classification().ok_or_else(|| {
            PersistError::query_compilation(format!("Type '{}' is not a classification", name))
        })?;
        let unusable = |what: &str| {
            PersistError::query_compilation(format!("Classification '{}' has no {}", name, what))
        };
        let classified = data.get_classified_type_id().ok_or_else(|| unusable("classified type"))?;
        if !self.metadata.is_kind_of(self.provider, &prepared.main_type, classified)? {
            return Err(PersistError::query_compilation(format!(
                "Classification '{}' does not classify type '{}'",
                name,
                prepared.main_type.get_name()
            )));
        }
        let relation_id = data.get_relation_type_id().ok_or_else(|| unusable("relation type"))?;
        let link_name = data
            .get_relation_link_attribute_name()
            .ok_or_else(|| unusable("relation link attribute"))?
            .to_string();
        let class_name = data
            .get_relation_class_attribute_name()
            .ok_or_else(|| unusable("relation class attribute"))?
            .to_string();

        let relation = self.metadata.get_type(self.provider, relation_id)?;
        let relation_table = relation.require_main_table()?.clone();
        let mut inner = SqlSelect::new(&self.next_prefix(), &relation_table);
        let inner_alias = inner.main_alias();
        let link_column = inner
            .attribute_columns("", &inner_alias, &relation_table, relation.require_attribute(&link_name)?)
            .into_iter()
            .next()
            .ok_or_else(|| unusable("relation link column"))?;
        let class_column = inner
            .attribute_columns("", &inner_alias, &relation_table, relation.require_attribute(&class_name)?)
            .into_iter()
            .next()
            .ok_or_else(|| unusable("relation class column"))?;
        let mut ids = vec![class_type.get_id()];
        ids.extend(self.metadata.get_descendant_ids(self.provider, &class_type)?);
        inner.add_column("1".to_string());
        inner.add_condition(format!("{} = {}", link_column, prepared.id_column()?));
        inner.add_condition(self.id_list(&class_column, &ids));
        Ok(format!("EXISTS ({})", inner.to_sql(self.metadata.get_dialect())))
    }

    /// The literal a value is compared as, in the attribute's first column.
    fn literal(&self, attribute: &Attribute, value: &Value) -> Result<String> {
        let dialect = self.metadata.get_dialect();
        let wrong = || {
            PersistError::query_compilation(format!(
                "Attribute '{}' can not be compared with {:?}",
                attribute.get_name(),
                value
            ))
        };
        match attribute.get_kind() {
            AttributeKind::AttributeSet => Err(wrong()),
            AttributeKind::Quantity => match value {
                Value::Quantity { value, .. } => Value::Decimal(*value).to_sql_literal(dialect),
                v => Value::Decimal(v.as_f64().ok_or_else(wrong)?).to_sql_literal(dialect),
            },
            AttributeKind::Status => match (value, attribute.get_link_type_id()) {
                (Value::String(key), Some(group)) if key.trim().parse::<i64>().is_err() => {
                    let status = self.metadata.get_status_by_key(self.provider, group, key)?;
                    Ok(status.get_id().to_string())
                }
                (v, _) => Ok(v.as_i64().ok_or_else(wrong)?.to_string()),
            },
            kind => kind
                .to_sql_literals(value, dialect)
                .map_err(|e| PersistError::wrap(crate::error::ErrorKind::QueryCompilation, attribute.get_name(), &e))?
                .into_iter()
                .next()
                .ok_or_else(wrong),
        }
    }

    /// SQL selecting the ids (and concrete type ids, where the main table keeps them) of the
    /// instances a definition finds.
    pub fn compile_instances(&self, definition: &QueryDefinition) -> Result<CompiledQuery> {
        let mut prepared = self.prepare(definition)?;
        let id_column = prepared.id_column()?;
        prepared.select.add_column(id_column);
        if let Some(c) = prepared.type_column.clone() {
            prepared.select.add_column(c);
        }
        let dialect = self.metadata.get_dialect();
        let compiled = CompiledQuery {
            sql: prepared.select.to_sql(dialect),
            count_sql: prepared.select.to_count_sql(),
            has_type_column: prepared.type_column.is_some(),
            main_type: prepared.main_type,
        };
        debug!("Compiled query over '{}': {}", compiled.main_type.get_name(), compiled.sql);
        Ok(compiled)
    }
}

/// `column = x` for one value, `column IN (..)` for more.
fn in_list(column: &str, ids: &[i64]) -> String {
    if ids.len() == 1 {
        format!("{} = {}", column, ids[0])
    } else {
        let list: Vec<String> = ids.iter().map(|i| i.to_string()).collect();
        format!("{} IN ({})", column, list.join(", "))
    }
}

#[derive(Debug, Clone)]
pub struct CompiledQuery {
    pub sql: String,
    pub count_sql: String,
    pub main_type: Arc<Type>,
    /// whether the second selected column is the row's concrete type id
    pub has_type_column: bool,
}
