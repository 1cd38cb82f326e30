/*  This file is part of OneModel, a program to manage knowledge.
    Copyright in each year of 2025-2026 inclusive, Luke A. Call.
    OneModel is free software, distributed under a license that includes honesty, the Golden Rule,
    and the GNU Affero General Public License as published by the Free Software Foundation;
    see the file LICENSE for license version and details.
    OneModel is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranty of
    MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU Affero General Public License for more details.
    You should have received a copy of the GNU Affero General Public License along with OneModel.  If not, see <http://www.gnu.org/licenses/>
*/
use crate::error::{PersistError, Result};
use crate::meta::cache_index::{CacheKey, CacheObject};
use crate::model::database::{get_i64, get_string, opt_i64, opt_string, ColumnType, DbConnection};
use crate::util::Util;
use std::sync::Arc;
use uuid::Uuid;

/// A unit of measure.  value * numerator / denominator is the value in the dimension's base unit.
#[derive(Debug, Clone, PartialEq)]
pub struct Uom {
    id: i64,
    dimension_id: i64,
    name: String,
    numerator: i64,
    denominator: i64,
}

impl Uom {
    pub fn new(id: i64, dimension_id: i64, name: &str, numerator: i64, denominator: i64) -> Result<Uom> {
        if denominator == 0 {
            return Err(PersistError::configuration(format!(
                "Unit of measure '{}' (id {}) has a zero denominator",
                name, id
            )));
        }
        Ok(Uom {
            id,
            dimension_id,
            name: name.to_string(),
            numerator,
            denominator,
        })
    }

    pub fn get_id(&self) -> i64 {
        self.id
    }

    pub fn get_dimension_id(&self) -> i64 {
        self.dimension_id
    }

    pub fn get_name(&self) -> &str {
        &self.name
    }

    pub fn get_numerator(&self) -> i64 {
        self.numerator
    }

    pub fn get_denominator(&self) -> i64 {
        self.denominator
    }

    pub fn base_value(&self, value: f64) -> f64 {
        value * self.numerator as f64 / self.denominator as f64
    }
}

impl CacheObject for Uom {
    fn get_id(&self) -> i64 {
        self.id
    }
    fn get_cache_name(&self) -> Option<&str> {
        None
    }
    fn get_cache_uuid(&self) -> Option<Uuid> {
        None
    }
}

/// A physical dimension (length, weight, ...) with its units, one of them the base.
#[derive(Debug, Clone)]
pub struct Dimension {
    id: i64,
    uuid: Uuid,
    name: String,
    description: Option<String>,
    base_uom_id: Option<i64>,
    uoms: Vec<Arc<Uom>>,
}

impl Dimension {
    pub fn new(
        id: i64,
        uuid: Uuid,
        name: &str,
        description: Option<&str>,
        base_uom_id: Option<i64>,
        uoms: Vec<Uom>,
    ) -> Result<Dimension> {
        if let Some(base) = base_uom_id {
            if !uoms.iter().any(|u| u.id == base) {
                return Err(PersistError::configuration(format!(
                    "Base unit {} of dimension '{}' is not one of its units",
                    base, name
                )));
            }
        }
        Ok(Dimension {
            id,
            uuid,
            name: name.to_string(),
            description: description.map(|s| s.to_string()),
            base_uom_id,
            uoms: uoms.into_iter().map(Arc::new).collect(),
        })
    }

    /// The single loader path: the om_dimension row, then its om_uom rows in id order.
    pub fn load(conn: &mut dyn DbConnection, key: &CacheKey) -> Result<Dimension> {
        let condition = match key {
            CacheKey::Id(id) => format!("ID = {}", id),
            CacheKey::Name(name) => format!("NAME = {}", Util::quote(name)),
            CacheKey::Uuid(uuid) => format!("UUID = '{}'", uuid),
        };
        let sql = format!(
            "SELECT ID, UUID, NAME, DESCRIPTION, BASE_UOM_ID FROM {} WHERE {}",
            Util::DIMENSION_TABLE,
            condition
        );
        let rows = conn.query(
            &sql,
            &[
                ColumnType::Bigint,
                ColumnType::String,
                ColumnType::String,
                ColumnType::String,
                ColumnType::Bigint,
            ],
        )?;
        let row = rows.first().ok_or_else(|| {
            PersistError::configuration(format!("Dimension {}{}", key, Util::DOES_NOT_EXIST))
        })?;
        let id = get_i64(row, 0, "ID")?;
        let uuid = Uuid::parse_str(&get_string(row, 1, "UUID")?)?;
        let name = get_string(row, 2, "NAME")?;
        let description = opt_string(row, 3);
        let base_uom_id = opt_i64(row, 4).filter(|id| *id > 0);

        let uom_sql = format!(
            "SELECT ID, DIMENSION_ID, NAME, NUMERATOR, DENOMINATOR FROM {} WHERE DIMENSION_ID = {} ORDER BY ID",
            Util::UOM_TABLE,
            id
        );
        let uom_rows = conn.query(
            &uom_sql,
            &[
                ColumnType::Bigint,
                ColumnType::Bigint,
                ColumnType::String,
                ColumnType::Bigint,
                ColumnType::Bigint,
            ],
        )?;
        let mut uoms = Vec::with_capacity(uom_rows.len());
        for r in &uom_rows {
            uoms.push(Uom::new(
                get_i64(r, 0, "ID")?,
                get_i64(r, 1, "DIMENSION_ID")?,
                &get_string(r, 2, "NAME")?,
                get_i64(r, 3, "NUMERATOR")?,
                get_i64(r, 4, "DENOMINATOR")?,
            )?);
        }
        Dimension::new(id, uuid, &name, description.as_deref(), base_uom_id, uoms)
    }

    pub fn get_id(&self) -> i64 {
        self.id
    }

    pub fn get_uuid(&self) -> Uuid {
        self.uuid
    }

    pub fn get_name(&self) -> &str {
        &self.name
    }

    pub fn get_description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn get_uoms(&self) -> &[Arc<Uom>] {
        &self.uoms
    }

    pub fn get_uom(&self, id: i64) -> Option<&Arc<Uom>> {
        self.uoms.iter().find(|u| u.get_id() == id)
    }

    pub fn get_uom_by_name(&self, name: &str) -> Option<&Arc<Uom>> {
        self.uoms.iter().find(|u| u.get_name() == name)
    }

    pub fn get_base_uom(&self) -> Option<&Arc<Uom>> {
        self.base_uom_id.and_then(|id| self.get_uom(id))
    }
}

impl CacheObject for Dimension {
    fn get_id(&self) -> i64 {
        self.id
    }
    fn get_cache_name(&self) -> Option<&str> {
        Some(&self.name)
    }
    fn get_cache_uuid(&self) -> Option<Uuid> {
        Some(self.uuid)
    }
}
