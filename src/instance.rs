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
use crate::model::database::{opt_i64, with_connection, ColumnType, ConnectionProvider};
use crate::util::Util;
use once_cell::sync::OnceCell;
use std::fmt;
use std::hash::{Hash, Hasher};

/// Identifies one persisted row of one type.  The textual form ("oid") is "<typeId>.<rowId>".
///
/// The type is held by id and looked up through the metadata cache when needed, so an Instance
/// stays valid across a recache of its type.
#[derive(Debug, Clone)]
pub struct Instance {
    type_id: i64,
    id: i64,
    key: String,
    general_id: OnceCell<i64>,
}

impl Instance {
    pub fn new(type_id: i64, id: i64) -> Instance {
        Instance {
            type_id,
            id,
            key: format!("{}.{}", type_id, id),
            general_id: OnceCell::new(),
        }
    }

    /// An instance that identifies nothing.
    pub fn invalid() -> Instance {
        Instance::new(0, 0)
    }

    /// Parses an oid.  Anything unusable (empty, no dot, non-numeric or zero parts) gives an
    /// invalid instance rather than an error.
    pub fn parse(oid: &str) -> Instance {
        let mut parts = oid.trim().splitn(2, '.');
        let type_id = parts.next().and_then(|s| s.trim().parse::<i64>().ok()).unwrap_or(0);
        let id = parts.next().and_then(|s| s.trim().parse::<i64>().ok()).unwrap_or(0);
        if type_id > 0 && id > 0 {
            Instance::new(type_id, id)
        } else {
            Instance::invalid()
        }
    }

    pub fn is_valid(&self) -> bool {
        self.type_id > 0 && self.id > 0
    }

    pub fn get_type_id(&self) -> i64 {
        self.type_id
    }

    pub fn get_id(&self) -> i64 {
        self.id
    }

    /// The oid.
    pub fn get_key(&self) -> &str {
        &self.key
    }

    /// The id of this instance's om_general_instance row, looked up once and then remembered.
    /// None if the instance has no such row (its type does not keep them, or it is invalid).
    pub fn get_general_id(&self, provider: &dyn ConnectionProvider) -> Result<Option<i64>> {
        if let Some(g) = self.general_id.get() {
            return Ok(Some(*g));
        }
        if !self.is_valid() {
            return Ok(None);
        }
        let sql = format!(
            "SELECT ID FROM {} WHERE INSTANCE_TYPE_ID = {} AND INSTANCE_ID = {}",
            Util::GENERAL_INSTANCE_TABLE,
            self.type_id,
            self.id
        );
        let found = with_connection(provider, |conn| {
            Ok(conn.query(&sql, &[ColumnType::Bigint])?.first().and_then(|r| opt_i64(r, 0)))
        })?;
        if let Some(g) = found {
            let _ = self.general_id.set(g);
        }
        Ok(found)
    }

    /// Remembers the general id of a row just created.
    pub(crate) fn set_general_id(&self, general_id: i64) {
        let _ = self.general_id.set(general_id);
    }
}

impl PartialEq for Instance {
    fn eq(&self, other: &Self) -> bool {
        self.type_id == other.type_id && self.id == other.id
    }
}

impl Eq for Instance {}

impl Hash for Instance {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.type_id.hash(state);
        self.id.hash(state);
    }
}

impl fmt::Display for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::test_support::Fixture;

    #[test]
    fn test_parse_tolerates_garbage() {
        let i = Instance::parse("110.5");
        assert!(i.is_valid());
        assert_eq!((i.get_type_id(), i.get_id()), (110, 5));
        assert_eq!(i.get_key(), "110.5");
        assert_eq!(i, Instance::new(110, 5));
        for bad in ["", "110", ".5", "110.", "110.0", "x.5", "0.5", "110.y"] {
            assert!(!Instance::parse(bad).is_valid(), "{}", bad);
        }
    }

    #[test]
    fn test_general_id_is_looked_up_once() {
        Util::initialize_tracing();
        let f = Fixture::new();
        f.execute("INSERT INTO om_general_instance (INSTANCE_TYPE_ID, INSTANCE_ID) VALUES (101, 1)");
        let i = Instance::new(101, 1);
        let g = i.get_general_id(f.provider()).unwrap();
        assert!(g.is_some());
        f.execute("DELETE FROM om_general_instance");
        assert_eq!(i.get_general_id(f.provider()).unwrap(), g);
        assert_eq!(Instance::new(101, 2).get_general_id(f.provider()).unwrap(), None);
        assert_eq!(Instance::invalid().get_general_id(f.provider()).unwrap(), None);
    }
}
