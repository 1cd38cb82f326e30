/*  This file is part of OneModel, a program to manage knowledge.
    Copyright in each year of 2025-2026 inclusive, Luke A. Call.
    OneModel is free software, distributed under a license that includes honesty, the Golden Rule,
    and the GNU Affero General Public License as published by the Free Software Foundation;
    see the file LICENSE for license version and details.
    OneModel is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranty of
    MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU Affero General Public License for more details.
    You should have received a copy of the GNU Affero General Public License along with OneModel.  If not, see <http://www.gnu.org/licenses/>
*/
//! A test database: in-memory sqlite with the bootstrap tables, a small schema described in
//! them, and a few rows.
//!
//! Types: Entity (abstract) > Person (general instance) > Employee; Invoice (company dependent,
//! with status, contact link, taxes attribute set) > CreditNote; InvoicePosition (with a Length
//! quantity); InvoiceStatus (Open, Paid); the InvoiceClass classification with its child
//! InvoiceClassUrgent, related through Invoice2Class.
//!
//! Rows: persons 1 Alice and 2 Bob (an Employee); invoices 1 INV-1 (company 1, Open), 2 CN-2
//! (a CreditNote of company 1, Paid) and 3 INV-3 (company 2, Open); two positions and two
//! taxes on invoice 1; invoice 1 classified InvoiceClass, invoice 3 InvoiceClassUrgent.
use crate::config::PersistConfig;
use crate::context::store::MemoryStore;
use crate::meta::MetadataCache;
use crate::model::bootstrap;
use crate::model::database::{opt_i64, ColumnType, ConnectionProvider, Database, PoolProvider};
use crate::model::sqlx_database::SqlxDatabase;
use crate::persistence::{Persistence, PersistenceBuilder};
use std::sync::Arc;
use uuid::Uuid;

pub struct Fixture {
    database: Arc<dyn Database>,
    provider: PoolProvider,
    metadata: MetadataCache,
    store: MemoryStore,
}

const DATA_TABLES: [&str; 7] = [
    "CREATE TABLE T_ENTITY (ID INTEGER PRIMARY KEY AUTOINCREMENT, TYPEID BIGINT NOT NULL, NAME VARCHAR(64) NOT NULL, \
     CREATED BIGINT, CREATOR BIGINT, MODIFIED BIGINT, MODIFIER BIGINT)",
    "CREATE TABLE T_PERSON (ID BIGINT PRIMARY KEY, EMAIL VARCHAR(128), BIRTHDAY BIGINT)",
    "CREATE TABLE T_INVOICE (ID INTEGER PRIMARY KEY AUTOINCREMENT, TYPEID BIGINT NOT NULL, COMPANYID BIGINT NOT NULL, \
     NAME VARCHAR(32) NOT NULL, STATUSID BIGINT, TOTAL DOUBLE PRECISION, CONTACT BIGINT, DUE BIGINT, PAID BOOLEAN, \
     CREATED BIGINT, MODIFIED BIGINT)",
    "CREATE TABLE T_INVOICEPOS (ID INTEGER PRIMARY KEY AUTOINCREMENT, INVOICE BIGINT NOT NULL, POS BIGINT, \
     DESCR VARCHAR(128), QUANTITY DOUBLE PRECISION, QUANTITYUOM BIGINT)",
    "CREATE TABLE T_INVOICETAX (ID INTEGER PRIMARY KEY AUTOINCREMENT, INVOICE BIGINT NOT NULL, LABEL VARCHAR(32), \
     RATE DOUBLE PRECISION)",
    "CREATE TABLE T_CLASS (ID INTEGER PRIMARY KEY AUTOINCREMENT, TYPEID BIGINT NOT NULL, INVOICE BIGINT NOT NULL, \
     NOTE VARCHAR(128))",
    "CREATE TABLE T_CLASSREL (ID INTEGER PRIMARY KEY AUTOINCREMENT, INVOICE BIGINT NOT NULL, CLASSTYPEID BIGINT NOT NULL)",
];

// (id, name, sql table, id column, type column, parent table)
const SQL_TABLES: [(i64, &str, &str, &str, Option<&str>, Option<i64>); 7] = [
    (10, "Entity", "T_ENTITY", "ID", Some("TYPEID"), None),
    (11, "Person", "T_PERSON", "ID", None, Some(10)),
    (12, "Invoice", "T_INVOICE", "ID", Some("TYPEID"), None),
    (13, "InvoicePosition", "T_INVOICEPOS", "ID", None, None),
    (14, "InvoiceTax", "T_INVOICETAX", "ID", None, None),
    (15, "InvoiceClass", "T_CLASS", "ID", Some("TYPEID"), None),
    (16, "Invoice2Class", "T_CLASSREL", "ID", None, None),
];

// (id, class name, always update, always insert)
const ATTRIBUTE_TYPES: [(i64, &str, bool, bool); 21] = [
    (1, "StringType", false, false),
    (2, "LongType", false, false),
    (3, "IntegerType", false, false),
    (4, "DecimalType", false, false),
    (5, "BooleanType", false, false),
    (6, "DateType", false, false),
    (7, "DateTimeType", false, false),
    (8, "CreatedType", false, true),
    (9, "ModifiedType", true, true),
    (10, "CreatorLinkType", false, true),
    (11, "ModifierLinkType", true, true),
    (12, "LinkType", false, false),
    (13, "StatusType", false, false),
    (14, "TypeType", false, true),
    (15, "CompanyLinkType", false, true),
    (16, "ConsortiumLinkType", false, false),
    (17, "GroupLinkType", false, false),
    (18, "AssociationLinkType", false, false),
    (19, "EnumType", false, false),
    (20, "QuantityType", false, false),
    (21, "AttributeSetType", false, false),
];

const TYPES: [&str; 11] = [
    "(100, 'Entity', 1, NULL, NULL, NULL, NULL, NULL, NULL, NULL, NULL, NULL)",
    "(101, 'Person', 4, 100, NULL, NULL, NULL, NULL, NULL, NULL, NULL, NULL)",
    "(102, 'Employee', 0, 101, NULL, NULL, NULL, NULL, NULL, NULL, NULL, NULL)",
    "(110, 'Invoice', 0, NULL, NULL, NULL, NULL, NULL, NULL, NULL, NULL, NULL)",
    "(111, 'CreditNote', 0, 110, NULL, NULL, NULL, NULL, NULL, NULL, NULL, NULL)",
    "(112, 'InvoicePosition', 0, NULL, NULL, NULL, NULL, NULL, NULL, NULL, NULL, NULL)",
    "(113, 'Invoice_Taxes', 32, NULL, NULL, 110, 'Invoice', NULL, NULL, NULL, NULL, NULL)",
    "(120, 'InvoiceStatus', 1, NULL, NULL, NULL, NULL, NULL, NULL, NULL, NULL, NULL)",
    "(130, 'InvoiceClass', 2, NULL, NULL, 110, 'Invoice', 131, 'Invoice', 'ClassType', 1, 0)",
    "(131, 'Invoice2Class', 0, NULL, NULL, NULL, NULL, NULL, NULL, NULL, NULL, NULL)",
    "(132, 'InvoiceClassUrgent', 2, 130, 130, NULL, NULL, NULL, NULL, NULL, NULL, NULL)",
];

// (id, name, type, table, attribute type, link type, set, columns, default, dimension)
type AttributeDef = (i64, &'static str, i64, i64, i64, Option<i64>, Option<i64>, &'static str, Option<&'static str>, Option<i64>);
const ATTRIBUTES: [AttributeDef; 31] = [
    (1001, "ID", 100, 10, 2, None, None, "ID", None, None),
    (1002, "Type", 100, 10, 14, None, None, "TYPEID", None, None),
    (1003, "Name", 100, 10, 1, None, None, "NAME", None, None),
    (1004, "Created", 100, 10, 8, None, None, "CREATED", None, None),
    (1005, "Creator", 100, 10, 10, Some(101), None, "CREATOR", None, None),
    (1006, "Modified", 100, 10, 9, None, None, "MODIFIED", None, None),
    (1007, "Modifier", 100, 10, 11, Some(101), None, "MODIFIER", None, None),
    (1011, "Email", 101, 11, 1, None, None, "EMAIL", None, None),
    (1012, "Birthday", 101, 11, 6, None, None, "BIRTHDAY", None, None),
    (1101, "ID", 110, 12, 2, None, None, "ID", None, None),
    (1102, "Type", 110, 12, 14, None, None, "TYPEID", None, None),
    (1103, "Company", 110, 12, 15, None, None, "COMPANYID", None, None),
    (1104, "Name", 110, 12, 1, None, None, "NAME", None, None),
    (1105, "Status", 110, 12, 13, Some(120), None, "STATUSID", None, None),
    (1106, "Total", 110, 12, 4, None, None, "TOTAL", None, None),
    (1107, "Contact", 110, 12, 12, Some(101), None, "CONTACT", None, None),
    (1108, "Due", 110, 12, 6, None, None, "DUE", None, None),
    (1109, "Paid", 110, 12, 5, None, None, "PAID", Some("false"), None),
    (1110, "Created", 110, 12, 8, None, None, "CREATED", None, None),
    (1111, "Modified", 110, 12, 9, None, None, "MODIFIED", None, None),
    (1112, "Taxes", 110, 12, 21, Some(113), None, "", None, None),
    (1201, "ID", 112, 13, 2, None, None, "ID", None, None),
    (1202, "Invoice", 112, 13, 12, Some(110), None, "INVOICE", None, None),
    (1203, "Position", 112, 13, 3, None, None, "POS", None, None),
    (1204, "Description", 112, 13, 1, None, None, "DESCR", None, None),
    (1205, "Length", 112, 13, 20, None, None, "QUANTITY,QUANTITYUOM", None, Some(5001)),
    (1301, "ID", 113, 14, 2, None, Some(1112), "ID", None, None),
    (1302, "Invoice", 113, 14, 12, Some(110), Some(1112), "INVOICE", None, None),
    (1303, "Label", 113, 14, 1, None, Some(1112), "LABEL", None, None),
    (1304, "Rate", 113, 14, 4, None, Some(1112), "RATE", None, None),
    (1401, "ID", 130, 15, 2, None, None, "ID", None, None),
];

const MORE_ATTRIBUTES: [AttributeDef; 6] = [
    (1402, "Type", 130, 15, 14, None, None, "TYPEID", None, None),
    (1403, "Invoice", 130, 15, 12, Some(110), None, "INVOICE", None, None),
    (1404, "Note", 130, 15, 1, None, None, "NOTE", None, None),
    (1501, "ID", 131, 16, 2, None, None, "ID", None, None),
    (1502, "Invoice", 131, 16, 12, Some(110), None, "INVOICE", None, None),
    (1503, "ClassType", 131, 16, 2, None, None, "CLASSTYPEID", None, None),
];

const OTHER_ROWS: [&str; 9] = [
    "INSERT INTO om_property (ID, ATTRIBUTE_ID, NAME, VALUE) VALUES (1, 1106, 'Format', '0.00')",
    "INSERT INTO om_status (ID, TYPE_ID, STATUS_KEY, DESCRIPTION) VALUES (1, 120, 'Open', 'Not yet paid')",
    "INSERT INTO om_status (ID, TYPE_ID, STATUS_KEY, DESCRIPTION) VALUES (2, 120, 'Paid', NULL)",
    "INSERT INTO om_uom (ID, DIMENSION_ID, NAME, NUMERATOR, DENOMINATOR) VALUES (1, 1, 'm', 1, 1)",
    "INSERT INTO om_uom (ID, DIMENSION_ID, NAME, NUMERATOR, DENOMINATOR) VALUES (2, 1, 'cm', 1, 100)",
    "INSERT INTO om_uom (ID, DIMENSION_ID, NAME, NUMERATOR, DENOMINATOR) VALUES (3, 1, 'km', 1000, 1)",
    "INSERT INTO T_ENTITY (ID, TYPEID, NAME) VALUES (1, 101, 'Alice')",
    "INSERT INTO T_ENTITY (ID, TYPEID, NAME) VALUES (2, 102, 'Bob')",
    "INSERT INTO T_PERSON (ID, EMAIL) VALUES (1, 'alice@example.com')",
];

const DATA_ROWS: [&str; 12] = [
    "INSERT INTO T_PERSON (ID, EMAIL) VALUES (2, 'bob@example.com')",
    "INSERT INTO T_INVOICE (ID, TYPEID, COMPANYID, NAME, STATUSID, TOTAL, CONTACT, DUE, PAID) \
     VALUES (1, 110, 1, 'INV-1', 1, 100.5, 1, 1767225600000, 0)",
    "INSERT INTO T_INVOICE (ID, TYPEID, COMPANYID, NAME, STATUSID, TOTAL, CONTACT, DUE, PAID) \
     VALUES (2, 111, 1, 'CN-2', 2, 20.0, 2, NULL, 1)",
    "INSERT INTO T_INVOICE (ID, TYPEID, COMPANYID, NAME, STATUSID, TOTAL, CONTACT, DUE, PAID) \
     VALUES (3, 110, 2, 'INV-3', 1, 7.25, NULL, NULL, 0)",
    "INSERT INTO T_INVOICEPOS (ID, INVOICE, POS, DESCR, QUANTITY, QUANTITYUOM) VALUES (1, 1, 1, 'Cable', 250.0, 2)",
    "INSERT INTO T_INVOICEPOS (ID, INVOICE, POS, DESCR, QUANTITY, QUANTITYUOM) VALUES (2, 1, 2, 'Rope', 1.5, 3)",
    "INSERT INTO T_INVOICETAX (ID, INVOICE, LABEL, RATE) VALUES (1, 1, 'VAT', 0.2)",
    "INSERT INTO T_INVOICETAX (ID, INVOICE, LABEL, RATE) VALUES (2, 1, 'Eco', 0.01)",
    "INSERT INTO T_CLASS (ID, TYPEID, INVOICE, NOTE) VALUES (1, 130, 1, 'checked')",
    "INSERT INTO T_CLASS (ID, TYPEID, INVOICE, NOTE) VALUES (2, 132, 3, 'rush')",
    "INSERT INTO T_CLASSREL (ID, INVOICE, CLASSTYPEID) VALUES (1, 1, 130)",
    "INSERT INTO T_CLASSREL (ID, INVOICE, CLASSTYPEID) VALUES (2, 3, 132)",
];

fn opt_sql<T: std::fmt::Display>(o: Option<T>, quoted: bool) -> String {
    match o {
        Some(v) if quoted => format!("'{}'", v),
        Some(v) => v.to_string(),
        None => "NULL".to_string(),
    }
}

impl Fixture {
    pub fn new() -> Fixture {
        crate::util::Util::initialize_tracing();
        let config = PersistConfig::with_url("sqlite::memory:");
        let db = SqlxDatabase::connect(&config).expect("connecting to in-memory sqlite");
        let database: Arc<dyn Database> = Arc::new(db);
        let f = Fixture {
            provider: PoolProvider::new(database.clone()),
            metadata: MetadataCache::new(database.get_dialect().clone()),
            database,
            store: MemoryStore::new(),
        };
        f.load_schema();
        f
    }

    fn load_schema(&self) {
        {
            let mut conn = self.database.open_connection().expect("opening a connection");
            bootstrap::create_tables(conn.as_mut(), self.database.get_dialect()).expect("creating bootstrap tables");
        }
        for sql in DATA_TABLES {
            self.execute(sql);
        }
        for (id, name, table, id_col, type_col, parent) in SQL_TABLES {
            self.execute(&format!(
                "INSERT INTO om_sqltable (ID, UUID, NAME, SQLTABLE, SQLCOLUMNID, SQLCOLUMNTYPE, PARENT_TABLE_ID) \
                 VALUES ({}, '{}', '{}', '{}', '{}', {}, {})",
                id,
                Self::uuid(id),
                name,
                table,
                id_col,
                opt_sql(type_col, true),
                opt_sql(parent, false)
            ));
        }
        for (id, class_name, always_update, always_insert) in ATTRIBUTE_TYPES {
            self.execute(&format!(
                "INSERT INTO om_attribute_type (ID, UUID, NAME, CLASSNAME_DB, CLASSNAME_UI, ALWAYS_UPDATE, ALWAYS_INSERT) \
                 VALUES ({}, '{}', '{}', '{}', NULL, {}, {})",
                id,
                Self::uuid(900 + id),
                class_name.strip_suffix("Type").unwrap_or(class_name),
                class_name,
                always_update as i32,
                always_insert as i32
            ));
        }
        for values in TYPES {
            // the uuid is derived from the id, which leads the values list
            let id: i64 = values[1..4].parse().expect("type id");
            self.execute(&format!(
                "INSERT INTO om_type (ID, UUID, NAME, PURPOSE, PARENT_TYPE_ID, PARENT_CLASSIFICATION_ID, OWNER_TYPE_ID, \
                 LINK_ATTR, RELATION_TYPE_ID, RELATION_LINK_ATTR, RELATION_CLASS_ATTR, MULTIPLE_SELECT, COMPANY_DEPENDENT) \
                 VALUES ({}, '{}', {}",
                id,
                Self::uuid(id),
                &values[6..]
            ));
        }
        for (id, name, type_id, table_id, at, link, set, columns, default, dimension) in
            ATTRIBUTES.iter().chain(MORE_ATTRIBUTES.iter()).copied()
        {
            self.execute(&format!(
                "INSERT INTO om_attribute (ID, NAME, TYPE_ID, TABLE_ID, ATTRIBUTE_TYPE_ID, LINK_TYPE_ID, SET_ID, \
                 SQL_COLUMNS, DEFAULT_VALUE, DIMENSION_UUID, CLASS_NAME) VALUES ({}, '{}', {}, {}, {}, {}, {}, '{}', {}, {}, NULL)",
                id,
                name,
                type_id,
                table_id,
                at,
                opt_sql(link, false),
                opt_sql(set, false),
                columns,
                opt_sql(default, true),
                opt_sql(dimension.map(Self::uuid), true)
            ));
        }
        self.execute(&format!(
            "INSERT INTO om_dimension (ID, UUID, NAME, DESCRIPTION, BASE_UOM_ID) VALUES (1, '{}', 'Length', NULL, 1)",
            Self::uuid(5001)
        ));
        for sql in OTHER_ROWS.iter().chain(DATA_ROWS.iter()) {
            self.execute(sql);
        }
    }

    /// The uuid the fixture gives the entity with this id.
    pub fn uuid(id: i64) -> Uuid {
        Uuid::parse_str(&format!("00000000-0000-0000-0000-{:012}", id)).expect("fixture uuid")
    }

    pub fn database(&self) -> Arc<dyn Database> {
        self.database.clone()
    }

    /// A provider that borrows a pooled connection per call.  There is only one, so this must
    /// not be used while a context of this fixture holds it.
    pub fn provider(&self) -> &dyn ConnectionProvider {
        &self.provider
    }

    pub fn metadata(&self) -> &MetadataCache {
        &self.metadata
    }

    pub fn store(&self) -> &MemoryStore {
        &self.store
    }

    pub fn persistence(&self) -> Arc<Persistence> {
        self.persistence_with(|b| b)
    }

    pub fn persistence_with(&self, f: impl FnOnce(PersistenceBuilder) -> PersistenceBuilder) -> Arc<Persistence> {
        let builder = Persistence::builder(self.database.clone())
            .config(PersistConfig::with_url("sqlite::memory:"))
            .store_factory(Arc::new(self.store.clone()));
        f(builder).build()
    }

    pub fn execute(&self, sql: &str) {
        let mut conn = self.database.open_connection().expect("opening a connection");
        conn.execute(sql).unwrap_or_else(|e| panic!("{}: {}", sql, e));
    }

    pub fn query_i64(&self, sql: &str) -> Option<i64> {
        let mut conn = self.database.open_connection().expect("opening a connection");
        let rows = conn.query(sql, &[ColumnType::Bigint]).unwrap_or_else(|e| panic!("{}: {}", sql, e));
        rows.first().and_then(|r| opt_i64(r, 0))
    }
}
