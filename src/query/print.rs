/*  This file is part of OneModel, a program to manage knowledge.
    Copyright in each year of 2025-2026 inclusive, Luke A. Call.
    OneModel is free software, distributed under a license that includes honesty, the Golden Rule,
    and the GNU Affero General Public License as published by the Free Software Foundation;
    see the file LICENSE for license version and details.
    OneModel is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranty of
    MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU Affero General Public License for more details.
    You should have received a copy of the GNU Affero General Public License along with OneModel.  If not, see <http://www.gnu.org/licenses/>
*/
//! Reading values of many instances at once.  One statement reads everything that is one value
//! per instance (attributes, also across links); each one-to-many path (linkfrom, class,
//! attributeset) is read by one more statement over all the instances together.
use crate::context::Context;
use crate::error::{PersistError, Result};
use crate::instance::Instance;
use crate::meta::attribute_type::AttributeKind;
use crate::meta::entity_type::Type;
use crate::model::database::{get_i64, opt_i64, ColumnType, DbRow};
use crate::query::builder::{CompanyScope, QueryBuilder, QueryDefinition};
use crate::query::compiler::{Compiler, Prepared, QueryScope};
use crate::query::predicate::Where;
use crate::query::run_cached;
use crate::query::select_path::{PathLeaf, PathStep, SelectPath};
use crate::value::Value;
use std::collections::{BTreeMap, HashMap};
use std::fmt::Write;
use std::sync::Arc;
use tracing::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrintState {
    Unprepared,
    /// the statement is compiled
    Prepared,
    /// rows are read, the cursor is before the first
    Executed,
    Iterating,
    Exhausted,
}

#[derive(Debug, Clone)]
enum Source {
    Query(QueryDefinition),
    Instances(Vec<Instance>),
}

#[derive(Debug, Clone, Copy)]
enum Reader {
    Attribute(AttributeKind),
    Id,
    /// id column, then type column
    Oid,
    TypeName,
    StatusKey,
}

#[derive(Debug, Clone)]
enum Plan {
    /// read from `width` columns of the main statement, starting at `start`; `own` when the
    /// value is of the printed instance itself rather than of one reached over links
    Columns {
        start: usize,
        width: usize,
        reader: Reader,
        own: bool,
    },
    /// read by a second statement over `type_key`, whose `link` attribute holds the id found in
    /// column `anchor` of the main statement
    Secondary {
        anchor: usize,
        type_key: String,
        include_child_types: bool,
        link: String,
        rest: SelectPath,
    },
}

#[derive(Debug)]
struct Statement {
    sql: String,
    types: Vec<ColumnType>,
    plans: Vec<Plan>,
    main_type_id: i64,
}

/// Selects values by select path for the instances of a query, or for a given list of
/// instances.  Goes Unprepared, Prepared, Executed, then Iterating row by row until Exhausted.
#[derive(Debug)]
pub struct PrintQuery {
    source: Source,
    selects: Vec<SelectPath>,
    enforce_sorted: bool,
    state: PrintState,
    statement: Option<Statement>,
    instances: Vec<Instance>,
    rows: Vec<Vec<Value>>,
    cursor: usize,
}

impl PrintQuery {
    pub fn new(definition: QueryDefinition) -> PrintQuery {
        Self::with_source(Source::Query(definition))
    }

    pub fn for_instances(instances: Vec<Instance>) -> PrintQuery {
        Self::with_source(Source::Instances(instances))
    }

    fn with_source(source: Source) -> PrintQuery {
        PrintQuery {
            source,
            selects: vec![],
            enforce_sorted: false,
            state: PrintState::Unprepared,
            statement: None,
            instances: vec![],
            rows: vec![],
            cursor: 0,
        }
    }

    fn require_unprepared(&self) -> Result<()> {
        if self.state == PrintState::Unprepared {
            Ok(())
        } else {
            Err(PersistError::query_compilation(format!(
                "Nothing can be added to a print query once {:?}",
                self.state
            )))
        }
    }

    /// Adds a select path, e.g. "linkto[Contact].attribute[Name]".
    pub fn select(&mut self, path: &str) -> Result<&mut PrintQuery> {
        self.require_unprepared()?;
        self.selects.push(SelectPath::parse(path)?);
        Ok(self)
    }

    pub fn select_attribute(&mut self, name: &str) -> Result<&mut PrintQuery> {
        self.require_unprepared()?;
        self.selects.push(SelectPath::attribute(name));
        Ok(self)
    }

    fn select_path(&mut self, path: SelectPath) {
        self.selects.push(path);
    }

    /// Keep the order of the given instance list instead of taking the store's.
    pub fn enforce_sorted(&mut self, enforce: bool) -> &mut PrintQuery {
        self.enforce_sorted = enforce;
        self
    }

    pub fn get_state(&self) -> PrintState {
        self.state
    }

    /// The statement's sql, once prepared.
    pub fn get_sql(&self) -> Option<&str> {
        self.statement.as_ref().map(|s| s.sql.as_str())
    }

    /// The instances, in the order rows come; set by execute.
    pub fn get_instances(&self) -> &[Instance] {
        &self.instances
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    fn definition(&self) -> Option<QueryDefinition> {
        match &self.source {
            Source::Query(d) => Some(d.clone()),
            Source::Instances(list) => {
                let mut type_ids: Vec<i64> = list.iter().map(|i| i.get_type_id()).collect();
                type_ids.sort_unstable();
                type_ids.dedup();
                let (first, others) = type_ids.split_first()?;
                let mut builder = QueryBuilder::new(*first)
                    .include_child_types(false)
                    .company_scope(CompanyScope::Disabled)
                    .filter(Where::id_in(list.iter().map(|i| i.get_id()).collect()));
                for t in others {
                    builder = builder.also_type(*t);
                }
                Some(builder.build())
            }
        }
    }

    /// Compiles the main statement.  Returns false, leaving the query unprepared, when it is
    /// over an empty instance list.
    pub fn prepare(&mut self, ctx: &Context) -> Result<bool> {
        if self.state != PrintState::Unprepared {
            return Ok(true);
        }
        let definition = match self.definition() {
            Some(d) => d,
            None => return Ok(false),
        };
        let scope = QueryScope::of(ctx);
        let compiler = Compiler::new(ctx.get_persistence().get_metadata(), ctx, &scope);
        let mut prepared = compiler.prepare(&definition)?;
        let id_column = prepared.id_column()?;
        prepared.select.add_column(id_column);
        let type_expression = prepared
            .type_column
            .clone()
            .unwrap_or_else(|| prepared.main_type.get_id().to_string());
        prepared.select.add_column(type_expression);
        let mut types = vec![ColumnType::Bigint, ColumnType::Bigint];
        let mut plans = Vec::with_capacity(self.selects.len());
        for path in &self.selects {
            plans.push(plan_path(&compiler, &mut prepared, &mut types, path)?);
        }
        let sql = prepared.select.to_sql(ctx.get_persistence().get_metadata().get_dialect());
        debug!("Prepared print query: {}", sql);
        self.statement = Some(Statement {
            sql,
            types,
            plans,
            main_type_id: prepared.main_type.get_id(),
        });
        self.state = PrintState::Prepared;
        Ok(true)
    }

    /// Reads all rows.  Over an empty instance list nothing runs and false comes back.
    pub fn execute(&mut self, ctx: &Context) -> Result<bool> {
        if !self.prepare(ctx)? {
            debug!("Print query over no instances; nothing to do.");
            return Ok(false);
        }
        let statement = self
            .statement
            .as_ref()
            .ok_or_else(|| PersistError::query_compilation("The print query was not prepared"))?;
        let cache = match &self.source {
            Source::Query(d) => d.get_cache().cloned(),
            Source::Instances(_) => None,
        };
        let rows = run_cached(ctx, "PrintQuery.execute", cache.as_ref(), &statement.sql, &statement.types)?;

        let mut instances = Vec::with_capacity(rows.len());
        let mut values = Vec::with_capacity(rows.len());
        for row in rows.iter() {
            let id = get_i64(row, 0, "ID")?;
            let instance = Instance::new(opt_i64(row, 1).unwrap_or(statement.main_type_id), id);
            let mut row_values = Vec::with_capacity(statement.plans.len());
            for (plan, path) in statement.plans.iter().zip(&self.selects) {
                let v = match plan {
                    Plan::Columns {
                        start,
                        width,
                        reader,
                        own,
                    } => {
                        let v = read(ctx, row, *start, *width, *reader, if *own { Some(&instance) } else { None })?;
                        match path.get_format() {
                            Some(pattern) => apply_format(v, pattern)?,
                            None => v,
                        }
                    }
                    Plan::Secondary { .. } => Value::List(vec![]),
                };
                row_values.push(v);
            }
            instances.push(instance);
            values.push(row_values);
        }

        for (i, plan) in statement.plans.iter().enumerate() {
            if let Plan::Secondary {
                anchor,
                type_key,
                include_child_types,
                link,
                rest,
            } = plan
            {
                let anchors: Vec<Option<i64>> = rows.iter().map(|r| opt_i64(r, *anchor)).collect();
                let lists = read_secondary(ctx, &anchors, type_key, *include_child_types, link, rest)?;
                for (row_values, a) in values.iter_mut().zip(&anchors) {
                    if let Some(list) = (*a).and_then(|a| lists.get(&a)) {
                        row_values[i] = Value::List(list.clone());
                    }
                }
            }
        }

        match &mut self.source {
            Source::Instances(given) if self.enforce_sorted => {
                let mut by_instance: HashMap<Instance, Vec<Value>> = instances.into_iter().zip(values).collect();
                let mut sorted_instances = Vec::with_capacity(given.len());
                let mut sorted_values = Vec::with_capacity(given.len());
                for i in given.iter() {
                    if let Some(v) = by_instance.remove(i) {
                        sorted_instances.push(i.clone());
                        sorted_values.push(v);
                    }
                }
                self.instances = sorted_instances;
                self.rows = sorted_values;
            }
            source => {
                if let Source::Instances(given) = source {
                    given.clone_from(&instances);
                }
                self.instances = instances;
                self.rows = values;
            }
        }
        self.cursor = 0;
        self.state = PrintState::Executed;
        Ok(true)
    }

    /// Moves to the next row.  False once there is none.
    pub fn next(&mut self) -> bool {
        match self.state {
            PrintState::Executed if !self.rows.is_empty() => {
                self.cursor = 0;
                self.state = PrintState::Iterating;
                true
            }
            PrintState::Iterating if self.cursor + 1 < self.rows.len() => {
                self.cursor += 1;
                true
            }
            PrintState::Executed | PrintState::Iterating => {
                self.state = PrintState::Exhausted;
                false
            }
            _ => false,
        }
    }

    fn index_of(&self, select: &str) -> Option<usize> {
        let select = select.trim();
        self.selects.iter().position(|p| p.get_text() == select).or_else(|| {
            self.selects.iter().position(|p| {
                p.get_steps().is_empty() && *p.get_leaf() == PathLeaf::Attribute(select.to_string())
            })
        })
    }

    /// The current row's value for a select path (or a bare attribute name).
    pub fn get(&self, select: &str) -> Option<&Value> {
        if self.state != PrintState::Iterating {
            return None;
        }
        let i = self.index_of(select)?;
        self.rows.get(self.cursor).and_then(|r| r.get(i))
    }

    pub fn get_current_instance(&self) -> Option<&Instance> {
        if self.state != PrintState::Iterating {
            return None;
        }
        self.instances.get(self.cursor)
    }

    /// The value for a select path of any executed instance.
    pub fn get_value_of(&self, instance: &Instance, select: &str) -> Option<&Value> {
        let i = self.index_of(select)?;
        let row = self.instances.iter().position(|x| x == instance)?;
        self.rows.get(row).and_then(|r| r.get(i))
    }
}

/// Works out how a path is read, adding what it needs to the main statement.
fn plan_path(compiler: &Compiler, prepared: &mut Prepared, types: &mut Vec<ColumnType>, path: &SelectPath) -> Result<Plan> {
    let metadata = compiler.get_metadata();
    let provider = compiler.get_provider();
    let mut current: Arc<Type> = prepared.main_type.clone();
    let mut table = current.require_main_table()?.clone();
    let mut alias = prepared.select.main_alias();
    let mut path_key = String::new();

    for (n, step) in path.get_steps().iter().enumerate() {
        if step.is_one_to_many() {
            let anchor = if n == 0 {
                0
            } else {
                types.push(ColumnType::Bigint);
                prepared.select.add_column(format!("{}.{}", alias, table.get_sql_column_id()))
            };
            let (type_key, link) = match step {
                PathStep::LinkFrom { type_name, attribute } => (type_name.clone(), attribute.clone()),
                PathStep::Class(name) => {
                    let c = metadata.get_type(provider, name.as_str())?;
                    let link = c
                        .get_classification()
                        .and_then(|d| d.get_link_attribute_name())
                        .ok_or_else(|| {
                            PersistError::query_compilation(format!(
                                "'{}' in \"{}\" is not a classification with a link attribute",
                                name, path
                            ))
                        })?;
                    (name.clone(), link.to_string())
                }
                PathStep::AttributeSet(name) => {
                    let a = current.require_attribute(name)?;
                    let set_type_id = match (a.get_kind(), a.get_link_type_id()) {
                        (AttributeKind::AttributeSet, Some(id)) => id,
                        _ => {
                            return Err(PersistError::query_compilation(format!(
                                "'{}' in \"{}\" is not an attribute set",
                                name, path
                            )))
                        }
                    };
                    let set_type = metadata.get_type(provider, set_type_id)?;
                    let link = set_type
                        .get_attribute_set()
                        .map(|s| s.get_link_attribute_name().to_string())
                        .ok_or_else(|| {
                            PersistError::query_compilation(format!("Type '{}' is not an attribute set", set_type.get_name()))
                        })?;
                    (set_type.get_name().to_string(), link)
                }
                PathStep::LinkTo(name) => {
                    return Err(PersistError::query_compilation(format!("linkto[{}] read as one to many", name)))
                }
            };
            return Ok(Plan::Secondary {
                anchor,
                type_key,
                include_child_types: true,
                link,
                rest: path.rest(n + 1),
            });
        }
        if let PathStep::LinkTo(name) = step {
            let a = current.require_attribute(name)?.clone();
            let target_id = a.get_link_type_id().ok_or_else(|| {
                PersistError::query_compilation(format!("'{}' in \"{}\" is not a link", name, path))
            })?;
            let from = prepared
                .select
                .attribute_columns(&path_key, &alias, &table, &a)
                .into_iter()
                .next()
                .ok_or_else(|| PersistError::query_compilation(format!("Link '{}' has no column", name)))?;
            path_key.push_str(&step.to_string());
            path_key.push('.');
            current = metadata.get_type(provider, target_id)?;
            table = current.require_main_table()?.clone();
            alias = prepared.select.join(&path_key, &table, &from);
        }
    }

    let own = path.get_steps().is_empty();
    let id_expression = format!("{}.{}", alias, table.get_sql_column_id());
    let type_expression = table
        .get_sql_column_type()
        .map(|c| format!("{}.{}", alias, c))
        .unwrap_or_else(|| current.get_id().to_string());
    let (expressions, column_types, reader) = match path.get_leaf() {
        PathLeaf::Attribute(name) => {
            let a = current.require_attribute(name)?.clone();
            if a.get_kind() == AttributeKind::AttributeSet {
                return Err(PersistError::query_compilation(format!(
                    "Attribute set '{}' is read with attributeset[{}], not as an attribute",
                    name, name
                )));
            }
            let columns = prepared.select.attribute_columns(&path_key, &alias, &table, &a);
            (columns, a.get_kind().column_types(), Reader::Attribute(a.get_kind()))
        }
        PathLeaf::Id => (vec![id_expression], vec![ColumnType::Bigint], Reader::Id),
        PathLeaf::Oid => (
            vec![id_expression, type_expression],
            vec![ColumnType::Bigint, ColumnType::Bigint],
            Reader::Oid,
        ),
        PathLeaf::Type => (
            vec![id_expression, type_expression],
            vec![ColumnType::Bigint, ColumnType::Bigint],
            Reader::TypeName,
        ),
        PathLeaf::Status => {
            let a = current
                .get_status_attribute()
                .ok_or_else(|| PersistError::query_compilation(format!("Type '{}' has no status", current.get_name())))?
                .clone();
            (
                prepared.select.attribute_columns(&path_key, &alias, &table, &a),
                vec![ColumnType::Bigint],
                Reader::StatusKey,
            )
        }
    };
    let width = expressions.len();
    let mut start = None;
    for e in expressions {
        let i = prepared.select.add_column(e);
        start.get_or_insert(i);
    }
    types.extend(column_types);
    Ok(Plan::Columns {
        start: start.unwrap_or(prepared.select.get_column_count()),
        width,
        reader,
        own,
    })
}

fn read(ctx: &Context, row: &DbRow, start: usize, width: usize, reader: Reader, own: Option<&Instance>) -> Result<Value> {
    let columns = row.get(start..start + width).ok_or_else(|| {
        PersistError::execution(format!("A row has {} columns, not the {} expected", row.len(), start + width))
    })?;
    let metadata = ctx.get_persistence().get_metadata();
    let id = columns.first().cloned().flatten().and_then(|d| d.as_i64());
    let type_id = || own.map(|i| i.get_type_id()).or_else(|| columns.get(1).cloned().flatten().and_then(|d| d.as_i64()));
    let value = match reader {
        Reader::Attribute(kind) => kind.read_value(columns)?,
        Reader::Id => id.map(Value::Long).unwrap_or(Value::Null),
        Reader::Oid => match (id, type_id()) {
            (Some(id), Some(t)) => Value::String(Instance::new(t, id).get_key().to_string()),
            _ => Value::Null,
        },
        Reader::TypeName => match (id, type_id()) {
            (Some(_), Some(t)) => Value::String(metadata.get_type(ctx, t)?.get_name().to_string()),
            _ => Value::Null,
        },
        Reader::StatusKey => match id {
            Some(status_id) => Value::String(metadata.get_status(ctx, status_id)?.get_key().to_string()),
            None => Value::Null,
        },
    };
    Ok(value)
}

/// Runs the second statement of a one-to-many path, giving each anchor id its list of values in
/// the order of the rows' ids.
fn read_secondary(
    ctx: &Context,
    anchors: &[Option<i64>],
    type_key: &str,
    include_child_types: bool,
    link: &str,
    rest: &SelectPath,
) -> Result<BTreeMap<i64, Vec<Value>>> {
    let mut ids: Vec<i64> = anchors.iter().flatten().copied().collect();
    ids.sort_unstable();
    ids.dedup();
    let mut lists: BTreeMap<i64, Vec<(i64, Value)>> = BTreeMap::new();
    if !ids.is_empty() {
        let definition = QueryBuilder::new(type_key)
            .include_child_types(include_child_types)
            .company_scope(CompanyScope::Disabled)
            .filter(Where::in_values(link, ids.into_iter().map(Value::Long).collect()))
            .build();
        let mut nested = PrintQuery::new(definition);
        nested.select_path(SelectPath::attribute(link));
        nested.select_path(rest.clone());
        nested.execute(ctx)?;
        for (instance, values) in nested.instances.iter().zip(&nested.rows) {
            if let (Some(Value::Long(owner)), Some(v)) = (values.first(), values.get(1)) {
                lists.entry(*owner).or_default().push((instance.get_id(), v.clone()));
            }
        }
    }
    Ok(lists
        .into_iter()
        .map(|(owner, mut entries)| {
            entries.sort_by_key(|(id, _)| *id);
            (owner, entries.into_iter().map(|(_, v)| v).collect())
        })
        .collect())
}

/// Formats a value for display: dates by a chrono pattern ("%Y-%m-%d"), numbers to a count of
/// decimal places, given either as "2" or by example as "0.00".
fn apply_format(value: Value, pattern: &str) -> Result<Value> {
    let decimals = || -> usize {
        match pattern.split_once('.') {
            Some((_, fraction)) => fraction.len(),
            None => pattern.trim().parse().unwrap_or(0),
        }
    };
    let formatted = match value {
        Value::Null => Value::Null,
        Value::DateTime(d) => {
            let mut s = String::new();
            write!(s, "{}", d.format(pattern))
                .map_err(|_| PersistError::invalid_value(format!("\"{}\" is not a usable date format", pattern)))?;
            Value::String(s)
        }
        Value::Decimal(x) => Value::String(format!("{:.*}", decimals(), x)),
        Value::Long(n) => Value::String(format!("{:.*}", decimals(), n as f64)),
        Value::Quantity { value, .. } => Value::String(format!("{:.*}", decimals(), value)),
        Value::List(values) => Value::List(
            values
                .into_iter()
                .map(|v| apply_format(v, pattern))
                .collect::<Result<Vec<_>>>()?,
        ),
        other => Value::String(other.to_string()),
    };
    Ok(formatted)
}
