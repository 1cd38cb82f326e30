/*  This file is part of OneModel, a program to manage knowledge.
    Copyright in each year of 2025-2026 inclusive, Luke A. Call.
    OneModel is free software, distributed under a license that includes honesty, the Golden Rule,
    and the GNU Affero General Public License as published by the Free Software Foundation;
    see the file LICENSE for license version and details.
    OneModel is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranty of
    MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU Affero General Public License for more details.
    You should have received a copy of the GNU Affero General Public License along with OneModel.  If not, see <http://www.gnu.org/licenses/>
*/
use crate::error::Result;
use crate::meta::cache_index::CacheObject;
use crate::meta::entity_type::Type;
use crate::model::database::{get_i64, get_string, opt_string, ColumnType, DbConnection};
use crate::util::Util;
use std::collections::BTreeMap;
use std::sync::Arc;
use uuid::Uuid;

/// One value of a status group.  Never changes once created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Status {
    id: i64,
    group_type_id: i64,
    key: String,
    description: Option<String>,
}

impl Status {
    pub fn new(id: i64, group_type_id: i64, key: &str, description: Option<&str>) -> Status {
        Status {
            id,
            group_type_id,
            key: key.to_string(),
            description: description.map(|s| s.to_string()),
        }
    }

    pub fn get_id(&self) -> i64 {
        self.id
    }

    pub fn get_group_type_id(&self) -> i64 {
        self.group_type_id
    }

    pub fn get_key(&self) -> &str {
        &self.key
    }

    pub fn get_description(&self) -> Option<&str> {
        self.description.as_deref()
    }
}

impl CacheObject for Status {
    fn get_id(&self) -> i64 {
        self.id
    }
    // keys are only unique within a group
    fn get_cache_name(&self) -> Option<&str> {
        None
    }
    fn get_cache_uuid(&self) -> Option<Uuid> {
        None
    }
}

/// The statuses of one status-group type, by key.  Cached under the owning type's id, name and
/// uuid.
#[derive(Debug, Clone)]
pub struct StatusGroup {
    type_id: i64,
    type_name: String,
    type_uuid: Uuid,
    statuses: BTreeMap<String, Arc<Status>>,
}

impl StatusGroup {
    pub fn new(group_type: &Type, statuses: Vec<Status>) -> StatusGroup {
        StatusGroup {
            type_id: group_type.get_id(),
            type_name: group_type.get_name().to_string(),
            type_uuid: group_type.get_uuid(),
            statuses: statuses
                .into_iter()
                .map(|s| (s.key.clone(), Arc::new(s)))
                .collect(),
        }
    }

    /// Reads the om_status rows of the group type.
    pub fn load(conn: &mut dyn DbConnection, group_type: &Type) -> Result<StatusGroup> {
        let sql = format!(
            "SELECT ID, TYPE_ID, STATUS_KEY, DESCRIPTION FROM {} WHERE TYPE_ID = {} ORDER BY ID",
            Util::STATUS_TABLE,
            group_type.get_id()
        );
        let rows = conn.query(
            &sql,
            &[ColumnType::Bigint, ColumnType::Bigint, ColumnType::String, ColumnType::String],
        )?;
        let mut statuses = Vec::with_capacity(rows.len());
        for row in &rows {
            statuses.push(Status::new(
                get_i64(row, 0, "ID")?,
                get_i64(row, 1, "TYPE_ID")?,
                &get_string(row, 2, "STATUS_KEY")?,
                opt_string(row, 3).as_deref(),
            ));
        }
        Ok(StatusGroup::new(group_type, statuses))
    }

    pub fn get_type_id(&self) -> i64 {
        self.type_id
    }

    pub fn get_type_name(&self) -> &str {
        &self.type_name
    }

    pub fn get(&self, key: &str) -> Option<&Arc<Status>> {
        self.statuses.get(key)
    }

    pub fn get_by_id(&self, id: i64) -> Option<&Arc<Status>> {
        self.statuses.values().find(|s| s.get_id() == id)
    }

    pub fn get_statuses(&self) -> impl Iterator<Item = &Arc<Status>> {
        self.statuses.values()
    }

    pub fn len(&self) -> usize {
        self.statuses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.statuses.is_empty()
    }
}

impl CacheObject for StatusGroup {
    fn get_id(&self) -> i64 {
        self.type_id
    }
    fn get_cache_name(&self) -> Option<&str> {
        Some(&self.type_name)
    }
    fn get_cache_uuid(&self) -> Option<Uuid> {
        Some(self.type_uuid)
    }
}
