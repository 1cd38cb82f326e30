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
use crate::mutation::{abort_with, by_table, check_names, stamp};
use crate::value::Value;
use std::collections::BTreeMap;
use tracing::*;

/// Changes attribute values of one instance.
#[derive(Debug, Clone)]
#[must_use]
pub struct Update {
    instance: Instance,
    values: BTreeMap<String, Value>,
}

impl Update {
    pub fn new(instance: Instance) -> Update {
        Update {
            instance,
            values: BTreeMap::new(),
        }
    }

    pub fn set(mut self, attribute: &str, value: impl Into<Value>) -> Update {
        self.values.insert(attribute.to_string(), value.into());
        self
    }

    /// One UPDATE per table that gets values.  An extension table without a row for the
    /// instance gets one inserted; a missing main table row is an error.
    pub fn execute(&self, ctx: &Context) -> Result<()> {
        let persistence = ctx.get_persistence();
        let t = persistence.get_metadata().get_type(ctx, self.instance.get_type_id())?;
        require_access(ctx, &t, Some(&self.instance), AccessType::Modify)?;
        check_names(&t, &self.values)?;

        let mut values = self.values.clone();
        if !values.is_empty() {
            let stamp = stamp(ctx, t.get_id());
            for a in t.get_attributes().values() {
                if a.get_attribute_type().is_always_update() {
                    if let Some(v) = a.get_kind().generated_value(&stamp) {
                        values.insert(a.get_name().to_string(), v);
                    }
                }
            }
        }
        let id = self.instance.get_id();
        let tables = by_table(&t, &values, persistence.get_metadata().get_dialect())?;
        let mut updated = 0;
        for (i, table_values) in tables.iter().enumerate() {
            if table_values.columns.is_empty() {
                continue;
            }
            if ctx.execute("Update", &table_values.update_sql(id))? > 0 {
                updated += 1;
            } else if i == 0 {
                return Err(abort_with(
                    ctx,
                    PersistError::execution(format!(
                        "Update: {} has no row in {}",
                        self.instance,
                        table_values.table.get_sql_table()
                    )),
                ));
            } else {
                ctx.execute("Update", &table_values.insert_sql(Some(id)))?;
                updated += 1;
            }
        }
        debug!("Updated {} in {} table(s).", self.instance, updated);
        Ok(())
    }
}
