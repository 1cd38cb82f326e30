/*  This file is part of OneModel, a program to manage knowledge.
    Copyright in each year of 2025-2026 inclusive, Luke A. Call.
    OneModel is free software, distributed under a license that includes honesty, the Golden Rule,
    and the GNU Affero General Public License as published by the Free Software Foundation;
    see the file LICENSE for license version and details.
    OneModel is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranty of
    MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU Affero General Public License for more details.
    You should have received a copy of the GNU Affero General Public License along with OneModel.  If not, see <http://www.gnu.org/licenses/>
*/
//! The tables the metadata cache reads.  Everything else about the schema is rows in these.
use crate::error::Result;
use crate::model::database::DbConnection;
use crate::model::dialect::Dialect;
use crate::util::Util;
use tracing::*;

/// Creates the bootstrap tables, in dependency order.  Fails if they already exist.
///
/// All integer columns are BIGINT so that every product decodes them the same way.  Ids of the
/// metadata rows are assigned by whoever writes them (they are stable across databases); only
/// om_general_instance generates its own.
pub fn create_tables(conn: &mut dyn DbConnection, dialect: &Dialect) -> Result<()> {
    let statements: Vec<String> = vec![
        format!(
            "CREATE TABLE {} (ID BIGINT PRIMARY KEY, UUID VARCHAR(36) NOT NULL, NAME VARCHAR(128) NOT NULL, \
             SQLTABLE VARCHAR(64) NOT NULL, SQLCOLUMNID VARCHAR(64) NOT NULL, SQLCOLUMNTYPE VARCHAR(64), \
             PARENT_TABLE_ID BIGINT)",
            Util::SQL_TABLE_TABLE
        ),
        format!(
            "CREATE TABLE {} (ID BIGINT PRIMARY KEY, UUID VARCHAR(36) NOT NULL, NAME VARCHAR({}) NOT NULL, \
             PURPOSE BIGINT NOT NULL, PARENT_TYPE_ID BIGINT, PARENT_CLASSIFICATION_ID BIGINT, \
             OWNER_TYPE_ID BIGINT, LINK_ATTR VARCHAR(128), RELATION_TYPE_ID BIGINT, \
             RELATION_LINK_ATTR VARCHAR(128), RELATION_CLASS_ATTR VARCHAR(128), \
             MULTIPLE_SELECT BOOLEAN, COMPANY_DEPENDENT BOOLEAN)",
            Util::TYPE_TABLE,
            Util::TYPE_NAME_LENGTH
        ),
        format!(
            "CREATE TABLE {} (ID BIGINT PRIMARY KEY, UUID VARCHAR(36) NOT NULL, NAME VARCHAR(128) NOT NULL, \
             CLASSNAME_DB VARCHAR(128) NOT NULL, CLASSNAME_UI VARCHAR(128), \
             ALWAYS_UPDATE BOOLEAN NOT NULL, ALWAYS_INSERT BOOLEAN NOT NULL)",
            Util::ATTRIBUTE_TYPE_TABLE
        ),
        format!(
            "CREATE TABLE {} (ID BIGINT PRIMARY KEY, NAME VARCHAR({}) NOT NULL, TYPE_ID BIGINT NOT NULL, \
             TABLE_ID BIGINT NOT NULL, ATTRIBUTE_TYPE_ID BIGINT NOT NULL, LINK_TYPE_ID BIGINT, SET_ID BIGINT, \
             SQL_COLUMNS VARCHAR(256) NOT NULL, DEFAULT_VALUE VARCHAR(256), DIMENSION_UUID VARCHAR(36), \
             CLASS_NAME VARCHAR(128))",
            Util::ATTRIBUTE_TABLE,
            Util::ATTRIBUTE_NAME_LENGTH
        ),
        format!(
            "CREATE TABLE {} (ID BIGINT PRIMARY KEY, ATTRIBUTE_ID BIGINT NOT NULL, NAME VARCHAR(128) NOT NULL, \
             VALUE VARCHAR(256))",
            Util::PROPERTY_TABLE
        ),
        format!(
            "CREATE TABLE {} (ID BIGINT PRIMARY KEY, TYPE_ID BIGINT NOT NULL, STATUS_KEY VARCHAR(64) NOT NULL, \
             DESCRIPTION VARCHAR(256))",
            Util::STATUS_TABLE
        ),
        format!(
            "CREATE TABLE {} (ID BIGINT PRIMARY KEY, UUID VARCHAR(36) NOT NULL, NAME VARCHAR(128) NOT NULL, \
             DESCRIPTION VARCHAR(256), BASE_UOM_ID BIGINT)",
            Util::DIMENSION_TABLE
        ),
        format!(
            "CREATE TABLE {} (ID BIGINT PRIMARY KEY, DIMENSION_ID BIGINT NOT NULL, NAME VARCHAR(64) NOT NULL, \
             NUMERATOR BIGINT NOT NULL, DENOMINATOR BIGINT NOT NULL)",
            Util::UOM_TABLE
        ),
        format!(
            "CREATE TABLE {} (ID BIGINT PRIMARY KEY, TYPE_ID BIGINT NOT NULL, LINK_KIND VARCHAR(16) NOT NULL, \
             TARGET_ID BIGINT NOT NULL)",
            Util::TYPE_LINK_TABLE
        ),
        format!(
            "CREATE TABLE {} (ID {}, INSTANCE_TYPE_ID BIGINT NOT NULL, INSTANCE_ID BIGINT NOT NULL)",
            Util::GENERAL_INSTANCE_TABLE,
            dialect.id_column_ddl()
        ),
    ];
    for sql in &statements {
        conn.execute(sql)?;
    }
    info!("Created the bootstrap tables.");
    Ok(())
}

/// Drops the bootstrap tables, ignoring any that are already gone.  The data tables that the
/// metadata describes are left alone.
pub fn destroy_tables(conn: &mut dyn DbConnection) -> Result<()> {
    for table in BOOTSTRAP_TABLES.iter().rev() {
        conn.execute(&format!("DROP TABLE IF EXISTS {}", table))?;
    }
    info!("Dropped the bootstrap tables.");
    Ok(())
}

/// Indicates whether the bootstrap setup has been done.
pub fn tables_exist(conn: &mut dyn DbConnection, dialect: &Dialect) -> Result<bool> {
    Ok(!dialect.get_columns(conn, Util::TYPE_TABLE)?.is_empty())
}

pub const BOOTSTRAP_TABLES: [&str; 10] = [
    Util::SQL_TABLE_TABLE,
    Util::TYPE_TABLE,
    Util::ATTRIBUTE_TYPE_TABLE,
    Util::ATTRIBUTE_TABLE,
    Util::PROPERTY_TABLE,
    Util::STATUS_TABLE,
    Util::DIMENSION_TABLE,
    Util::UOM_TABLE,
    Util::TYPE_LINK_TABLE,
    Util::GENERAL_INSTANCE_TABLE,
];

#[cfg(test)]
mod test {
    use super::*;
    use crate::config::PersistConfig;
    use crate::model::database::Database;
    use crate::model::sqlx_database::SqlxDatabase;

    #[test]
    fn test_create_and_destroy_tables() {
        Util::initialize_tracing();
        let db = SqlxDatabase::connect(&PersistConfig::with_url("sqlite::memory:")).unwrap();
        let mut conn = db.open_connection().unwrap();
        assert!(!tables_exist(conn.as_mut(), db.get_dialect()).unwrap());
        create_tables(conn.as_mut(), db.get_dialect()).unwrap();
        assert!(tables_exist(conn.as_mut(), db.get_dialect()).unwrap());
        let columns = db.get_dialect().get_columns(conn.as_mut(), Util::TYPE_TABLE).unwrap();
        let name = columns.iter().find(|c| c.name.eq_ignore_ascii_case("NAME")).unwrap();
        assert!(!name.nullable);
        assert_eq!(name.size, Util::TYPE_NAME_LENGTH as i64);
        assert!(create_tables(conn.as_mut(), db.get_dialect()).is_err());
        destroy_tables(conn.as_mut()).unwrap();
        assert!(!tables_exist(conn.as_mut(), db.get_dialect()).unwrap());
        // again is harmless
        destroy_tables(conn.as_mut()).unwrap();
    }
}
