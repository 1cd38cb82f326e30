/*  This file is part of OneModel, a program to manage knowledge.
    Copyright in each year of 2003-2004 and 2008-2017 inclusive, 2019, 2023, and 2025-2026 inclusive, Luke A. Call.
    OneModel is free software, distributed under a license that includes honesty, the Golden Rule,
    and the GNU Affero General Public License as published by the Free Software Foundation;
    see the file LICENSE for license version and details.
    OneModel is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranty of
    MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU Affero General Public License for more details.
    You should have received a copy of the GNU Affero General Public License along with OneModel.  If not, see <http://www.gnu.org/licenses/>
*/
use crate::error::{PersistError, Result};
use chrono::{DateTime, TimeZone, Utc};
use md5::{Digest, Md5};
use tracing::Level;

/// This is just a place to put shared code ("Utility") until a grouping for some, or a better idea emerges.
pub struct Util {}

// for explanation, see fn initialize_tracing() below
static TRACING_INIT: std::sync::Once = std::sync::Once::new();

impl Util {
    // Names of the bootstrap tables.  The metadata cache reads these (and only these) to learn
    // everything else about the schema.  If one ever changes, also change model/bootstrap.rs .
    pub const SQL_TABLE_TABLE: &'static str = "om_sqltable";
    pub const TYPE_TABLE: &'static str = "om_type";
    pub const ATTRIBUTE_TYPE_TABLE: &'static str = "om_attribute_type";
    pub const ATTRIBUTE_TABLE: &'static str = "om_attribute";
    pub const PROPERTY_TABLE: &'static str = "om_property";
    pub const STATUS_TABLE: &'static str = "om_status";
    pub const DIMENSION_TABLE: &'static str = "om_dimension";
    pub const UOM_TABLE: &'static str = "om_uom";
    pub const TYPE_LINK_TABLE: &'static str = "om_type_link";
    pub const GENERAL_INSTANCE_TABLE: &'static str = "om_general_instance";

    // Bits of om_type.purpose.
    pub const PURPOSE_ABSTRACT: i64 = 1;
    pub const PURPOSE_CLASSIFICATION: i64 = 2;
    pub const PURPOSE_GENERAL_INSTANCE: i64 = 4;
    pub const PURPOSE_NO_GENERAL_INSTANCE: i64 = 8;
    pub const PURPOSE_HISTORY: i64 = 16;
    pub const PURPOSE_ATTRIBUTE_SET: i64 = 32;

    // om_type_link.link_kind values.
    pub const LINK_KIND_MENU: &'static str = "menu";
    pub const LINK_KIND_ICON: &'static str = "icon";
    pub const LINK_KIND_FORM: &'static str = "form";

    /// Guards the walk up (or down) a type hierarchy, so a bad row (a type that is its own
    /// grandparent, say) gives an error instead of a hang.
    pub const MAX_HIERARCHY_DEPTH: usize = 64;

    pub const DOES_NOT_EXIST: &'static str = " does not exist in database.";

    pub const TYPE_NAME_LENGTH: u32 = 128;
    pub const ATTRIBUTE_NAME_LENGTH: u32 = 128;

    /// For text values that go into a SQL literal (and which by the way must then be surrounded
    /// with single-quotes ').  Uses the SQL-standard doubling, which postgresql and sqlite both
    /// accept, so the stored text is exactly what was given.
    pub fn escape_quotes_etc(s: &str) -> String {
        s.replace('\'', "''")
    }

    /// Surrounds with single quotes, after escaping.
    pub fn quote(s: &str) -> String {
        format!("'{}'", Self::escape_quotes_etc(s))
    }

    /// A ';' outside of a quoted literal could mean somehow an embedded sql is in a normal
    /// command, as an attack vector. We don't write like that, nor accept it from outside. This
    /// check happens at the lowest level before the database.
    pub fn check_for_bad_sql(sql: &str) -> Result<()> {
        let mut in_literal = false;
        for c in sql.chars() {
            match c {
                // a doubled '' inside a literal toggles twice, which is what we want.
                '\'' => in_literal = !in_literal,
                ';' if !in_literal => {
                    return Err(PersistError::execution(format!(
                        "Statement can't contain ';' outside of a quoted value: {}",
                        sql
                    )))
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Identifiers (table and column names) come from the bootstrap tables, not from users, but
    /// they still end up spliced into statements, so refuse anything that is not plainly a name.
    pub fn check_identifier(name: &str) -> Result<()> {
        let ok = !name.is_empty()
            && name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.');
        if ok {
            Ok(())
        } else {
            Err(PersistError::configuration(format!(
                "\"{}\" is not a usable sql identifier",
                name
            )))
        }
    }

    /// Splits the comma-separated column list stored in om_attribute.sql_columns.
    pub fn split_columns(columns: &str) -> Vec<String> {
        columns
            .split(',')
            .map(|c| c.trim())
            .filter(|c| !c.is_empty())
            .map(|c| c.to_string())
            .collect()
    }

    /// Dates are stored as milliseconds since 1970 (the java-style number), in bigint columns.
    pub fn millis_to_date(millis: i64) -> Option<DateTime<Utc>> {
        Utc.timestamp_millis_opt(millis).single()
    }

    pub fn now_millis() -> i64 {
        Utc::now().timestamp_millis()
    }

    /// Lowercase hex of the md5 digest, as stored for file content and used for cache keys.
    pub fn md5_hex(bytes: &[u8]) -> String {
        base16ct::lower::encode_string(&Md5::digest(bytes))
    }

    /// Installs the fmt subscriber, once per process.  The level comes from OM_LOG_LEVEL
    /// (trace, debug, info, warn, error), defaulting to info.  The test writer is used so that
    /// output from tests is captured like println! output is.
    pub fn initialize_tracing() {
        TRACING_INIT.call_once(|| {
            let level: Level = std::env::var("OM_LOG_LEVEL")
                .ok()
                .and_then(|s| s.parse::<Level>().ok())
                .unwrap_or(Level::INFO);
            // try_init only fails if some other subscriber is already installed, which is fine.
            let _ = tracing_subscriber::fmt()
                .with_max_level(level)
                .with_test_writer()
                .try_init();
        });
    }
}

#[cfg(test)]
mod test {
    use super::Util;

    #[test]
    fn escape_quotes_doubles_single_ticks() {
        assert_eq!(Util::escape_quotes_etc("it's"), "it''s");
        assert_eq!(Util::quote("a'b"), "'a''b'");
    }

    #[test]
    fn md5_hex_is_lowercase_hex() {
        assert_eq!(Util::md5_hex(b""), "d41d8cd98f00b204e9800998ecf8427e");
        assert_eq!(Util::md5_hex(b"abc"), "900150983cd24fb0d6963f7d28e17f72");
    }

    #[test]
    fn bad_sql_is_only_a_semicolon_outside_literals() {
        assert!(Util::check_for_bad_sql("SELECT 1 FROM t WHERE n = 'a;b'").is_ok());
        assert!(Util::check_for_bad_sql("SELECT 1 FROM t WHERE n = 'it''s;'").is_ok());
        assert!(Util::check_for_bad_sql("SELECT 1; DROP TABLE t").is_err());
    }

    #[test]
    fn identifiers_are_plain_names() {
        assert!(Util::check_identifier("T_ENTITY").is_ok());
        assert!(Util::check_identifier("ID").is_ok());
        assert!(Util::check_identifier("T_ENTITY; drop").is_err());
        assert!(Util::check_identifier("").is_err());
    }

    #[test]
    fn split_columns_trims() {
        assert_eq!(
            Util::split_columns("AMOUNT, AMOUNTUOM"),
            vec!["AMOUNT".to_string(), "AMOUNTUOM".to_string()]
        );
        assert!(Util::split_columns("").is_empty());
    }

    #[test]
    fn millis_round_trip_through_dates() {
        let d = Util::millis_to_date(1_700_000_000_123).unwrap();
        assert_eq!(d.timestamp_millis(), 1_700_000_000_123);
    }
}
