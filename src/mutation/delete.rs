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
use crate::error::Result;
use crate::instance::Instance;
use crate::util::Util;
use tracing::*;

/// Removes one instance: its extension table rows, then its main table row, then its general
/// instance row.
#[derive(Debug, Clone)]
pub struct Delete {
    instance: Instance,
}

impl Delete {
    pub fn new(instance: Instance) -> Delete {
        Delete { instance }
    }

    /// Returns whether there was a main table row to delete.
    pub fn execute(&self, ctx: &Context) -> Result<bool> {
        let t = ctx.get_persistence().get_metadata().get_type(ctx, self.instance.get_type_id())?;
        require_access(ctx, &t, Some(&self.instance), AccessType::Delete)?;
        let id = self.instance.get_id();
        let main = t.require_main_table()?;
        for table in t.get_tables().iter().filter(|x| x.get_id() != main.get_id()).rev() {
            ctx.execute(
                "Delete",
                &format!("DELETE FROM {} WHERE {} = {}", table.get_sql_table(), table.get_sql_column_id(), id),
            )?;
        }
        let deleted = ctx.execute(
            "Delete",
            &format!("DELETE FROM {} WHERE {} = {}", main.get_sql_table(), main.get_sql_column_id(), id),
        )?;
        if t.is_general_instance() {
            ctx.execute(
                "Delete",
                &format!(
                    "DELETE FROM {} WHERE INSTANCE_TYPE_ID = {} AND INSTANCE_ID = {}",
                    Util::GENERAL_INSTANCE_TABLE,
                    t.get_id(),
                    id
                ),
            )?;
        }
        debug!("Deleted {} ({} main row).", self.instance, deleted);
        Ok(deleted > 0)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::context::BeginOptions;
    use crate::mutation::Insert;
    use crate::test_support::Fixture;

    #[test]
    fn test_delete_all_rows_of_an_instance() {
        Util::initialize_tracing();
        let f = Fixture::new();
        let p = f.persistence();
        let ctx = p.begin(BeginOptions::new()).unwrap();
        let i = Insert::new("Person")
            .set("Name", "Erin")
            .set("Email", "erin@example.com")
            .execute(&ctx)
            .unwrap();
        assert!(Delete::new(i.clone()).execute(&ctx).unwrap());
        assert!(!Delete::new(i.clone()).execute(&ctx).unwrap());
        assert!(Delete::new(Instance::new(112, 2)).execute(&ctx).unwrap());
        ctx.commit().unwrap();
        let id = i.get_id();
        assert_eq!(f.query_i64(&format!("SELECT COUNT(*) FROM T_ENTITY WHERE ID = {}", id)), Some(0));
        assert_eq!(f.query_i64(&format!("SELECT COUNT(*) FROM T_PERSON WHERE ID = {}", id)), Some(0));
        assert_eq!(f.query_i64("SELECT COUNT(*) FROM om_general_instance"), Some(0));
        assert_eq!(f.query_i64("SELECT COUNT(*) FROM T_INVOICEPOS"), Some(1));
    }
}
