/*  This file is part of OneModel, a program to manage knowledge.
    Copyright in each year of 2025-2026 inclusive, Luke A. Call.
    OneModel is free software, distributed under a license that includes honesty, the Golden Rule,
    and the GNU Affero General Public License as published by the Free Software Foundation;
    see the file LICENSE for license version and details.
    OneModel is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranty of
    MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU Affero General Public License for more details.
    You should have received a copy of the GNU Affero General Public License along with OneModel.  If not, see <http://www.gnu.org/licenses/>
*/
pub mod store;
pub mod transaction;

use crate::context::store::{StoreEvent, StoreHandle};
use crate::context::transaction::{TransactionId, TransactionStatus};
use crate::error::{ErrorKind, PersistError, Result};
use crate::instance::Instance;
use crate::model::database::{with_connection, ConnectionProvider, ColumnType, DbConnection, DbRow};
use crate::persistence::Persistence;
use parking_lot::{Mutex, RwLock};
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::*;

thread_local! {
    /// Seen by this thread and by workers started with Context::spawn_inheriting.
    static INHERITABLE: RefCell<Option<Arc<Context>>> = const { RefCell::new(None) };
    /// Seen by this thread only.
    static THREAD: RefCell<Option<Arc<Context>>> = const { RefCell::new(None) };
}

/// Which thread-local slot(s) a context occupies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Inheritance {
    Inheritable,
    #[default]
    Local,
    /// both slots
    Standalone,
}

impl Inheritance {
    fn uses_inheritable(&self) -> bool {
        matches!(self, Inheritance::Inheritable | Inheritance::Standalone)
    }

    fn uses_thread(&self) -> bool {
        matches!(self, Inheritance::Local | Inheritance::Standalone)
    }
}

/// Who the context acts for.  A context without one is a system context: it sees every tenant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserIdentity {
    person_id: i64,
    name: String,
    companies: Vec<i64>,
    consortia: Vec<i64>,
    associations: Vec<i64>,
    default_company: Option<i64>,
}

impl UserIdentity {
    pub fn new(person_id: i64, name: &str) -> UserIdentity {
        UserIdentity {
            person_id,
            name: name.to_string(),
            companies: vec![],
            consortia: vec![],
            associations: vec![],
            default_company: None,
        }
    }

    pub fn with_companies(mut self, companies: Vec<i64>) -> UserIdentity {
        self.companies = companies;
        self
    }

    pub fn with_consortia(mut self, consortia: Vec<i64>) -> UserIdentity {
        self.consortia = consortia;
        self
    }

    pub fn with_associations(mut self, associations: Vec<i64>) -> UserIdentity {
        self.associations = associations;
        self
    }

    pub fn with_default_company(mut self, company: i64) -> UserIdentity {
        self.default_company = Some(company);
        self
    }

    pub fn get_person_id(&self) -> i64 {
        self.person_id
    }

    pub fn get_name(&self) -> &str {
        &self.name
    }

    pub fn get_companies(&self) -> &[i64] {
        &self.companies
    }

    pub fn get_consortia(&self) -> &[i64] {
        &self.consortia
    }

    pub fn get_associations(&self) -> &[i64] {
        &self.associations
    }

    /// The explicit default, else the first company.
    pub fn get_default_company(&self) -> Option<i64> {
        self.default_company.or_else(|| self.companies.first().copied())
    }
}

/// An uploaded file handed in with a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileParameter {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

/// What Context::begin takes.  Everything is optional.
#[derive(Debug, Clone, Default)]
pub struct BeginOptions {
    user: Option<UserIdentity>,
    locale: Option<String>,
    session_attributes: BTreeMap<String, String>,
    request_parameters: BTreeMap<String, Vec<String>>,
    file_parameters: BTreeMap<String, FileParameter>,
    inheritance: Inheritance,
}

impl BeginOptions {
    pub fn new() -> BeginOptions {
        BeginOptions::default()
    }

    pub fn user(mut self, user: UserIdentity) -> BeginOptions {
        self.user = Some(user);
        self
    }

    pub fn locale(mut self, locale: &str) -> BeginOptions {
        self.locale = Some(locale.to_string());
        self
    }

    pub fn session_attribute(mut self, name: &str, value: &str) -> BeginOptions {
        self.session_attributes.insert(name.to_string(), value.to_string());
        self
    }

    pub fn request_parameter(mut self, name: &str, values: Vec<String>) -> BeginOptions {
        self.request_parameters.insert(name.to_string(), values);
        self
    }

    pub fn file_parameter(mut self, name: &str, file: FileParameter) -> BeginOptions {
        self.file_parameters.insert(name.to_string(), file);
        self
    }

    pub fn inheritance(mut self, inheritance: Inheritance) -> BeginOptions {
        self.inheritance = inheritance;
        self
    }
}

/// One unit of work: a transaction, the one connection all its SQL goes through, and who it
/// is done for.  Bound to the beginning thread until closed.
///
/// Locks are taken connection first, then transaction.
pub struct Context {
    persistence: Arc<Persistence>,
    request_id: String,
    user: Option<UserIdentity>,
    company: RwLock<Option<i64>>,
    locale: String,
    session_attributes: RwLock<BTreeMap<String, String>>,
    request_attributes: RwLock<BTreeMap<String, String>>,
    request_parameters: BTreeMap<String, Vec<String>>,
    file_parameters: BTreeMap<String, FileParameter>,
    inheritance: Inheritance,
    connection: Mutex<Option<Box<dyn DbConnection>>>,
    transaction: Mutex<Option<TransactionId>>,
    store_resources: Mutex<Vec<StoreHandle>>,
    closed: AtomicBool,
}

impl Context {
    /// Starts a transaction and binds the new context to this thread.  Fails if a context
    /// already holds a slot the requested inheritance needs.
    pub fn begin(persistence: Arc<Persistence>, options: BeginOptions) -> Result<Arc<Context>> {
        let inheritance = options.inheritance;
        let occupied = (inheritance.uses_inheritable() && INHERITABLE.with(|s| s.borrow().is_some()))
            || (inheritance.uses_thread() && THREAD.with(|s| s.borrow().is_some()));
        if occupied {
            return Err(PersistError::context(format!(
                "A context is already bound to this thread ({:?} requested)",
                inheritance
            )));
        }
        let tx = persistence.get_transaction_manager().begin()?;
        let company = options.user.as_ref().and_then(|u| u.get_default_company());
        let locale = options
            .locale
            .clone()
            .unwrap_or_else(|| persistence.get_config().default_locale.clone());
        let ctx = Arc::new(Context {
            persistence,
            request_id: uuid::Uuid::new_v4().to_string(),
            user: options.user,
            company: RwLock::new(company),
            locale,
            session_attributes: RwLock::new(options.session_attributes),
            request_attributes: RwLock::new(BTreeMap::new()),
            request_parameters: options.request_parameters,
            file_parameters: options.file_parameters,
            inheritance,
            connection: Mutex::new(None),
            transaction: Mutex::new(Some(tx)),
            store_resources: Mutex::new(vec![]),
            closed: AtomicBool::new(false),
        });
        if inheritance.uses_inheritable() {
            INHERITABLE.with(|s| *s.borrow_mut() = Some(ctx.clone()));
        }
        if inheritance.uses_thread() {
            THREAD.with(|s| *s.borrow_mut() = Some(ctx.clone()));
        }
        info!(
            "Began context {} for {} ({:?}).",
            ctx.request_id,
            ctx.user.as_ref().map(|u| u.get_name()).unwrap_or("the system"),
            inheritance
        );
        Ok(ctx)
    }

    /// The context bound to this thread: its own first, else an inherited one.
    pub fn get() -> Option<Arc<Context>> {
        THREAD
            .with(|s| s.borrow().clone())
            .or_else(|| INHERITABLE.with(|s| s.borrow().clone()))
    }

    pub fn get_thread_context() -> Result<Arc<Context>> {
        Self::get().ok_or_else(|| PersistError::context("No context is bound to this thread"))
    }

    /// Runs `f` on a new thread that sees this context as its inherited one.  The worker must
    /// finish before this context's transaction does.
    pub fn spawn_inheriting<F, T>(self: &Arc<Self>, f: F) -> Result<std::thread::JoinHandle<T>>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        if !self.inheritance.uses_inheritable() {
            return Err(PersistError::context(format!(
                "Context {} is not inheritable",
                self.request_id
            )));
        }
        let ctx = self.clone();
        Ok(std::thread::spawn(move || {
            INHERITABLE.with(|s| *s.borrow_mut() = Some(ctx));
            let result = f();
            INHERITABLE.with(|s| s.borrow_mut().take());
            result
        }))
    }

    pub fn get_persistence(&self) -> &Arc<Persistence> {
        &self.persistence
    }

    pub fn get_request_id(&self) -> &str {
        &self.request_id
    }

    pub fn get_user(&self) -> Option<&UserIdentity> {
        self.user.as_ref()
    }

    pub fn get_person_id(&self) -> Option<i64> {
        self.user.as_ref().map(|u| u.get_person_id())
    }

    pub fn get_locale(&self) -> &str {
        &self.locale
    }

    pub fn get_inheritance(&self) -> Inheritance {
        self.inheritance
    }

    pub fn get_company(&self) -> Option<i64> {
        *self.company.read()
    }

    /// Switches the current company to one the user belongs to.
    pub fn set_company(&self, company_id: i64) -> Result<()> {
        let user = self
            .user
            .as_ref()
            .ok_or_else(|| PersistError::context("A system context has no company to switch"))?;
        if !user.get_companies().contains(&company_id) {
            return Err(PersistError::access(format!(
                "'{}' does not belong to company {}",
                user.get_name(),
                company_id
            )));
        }
        *self.company.write() = Some(company_id);
        Ok(())
    }

    pub fn get_session_attribute(&self, name: &str) -> Option<String> {
        self.session_attributes.read().get(name).cloned()
    }

    pub fn set_session_attribute(&self, name: &str, value: &str) {
        self.session_attributes.write().insert(name.to_string(), value.to_string());
    }

    pub fn get_request_attribute(&self, name: &str) -> Option<String> {
        self.request_attributes.read().get(name).cloned()
    }

    pub fn set_request_attribute(&self, name: &str, value: &str) {
        self.request_attributes.write().insert(name.to_string(), value.to_string());
    }

    pub fn get_parameter(&self, name: &str) -> Option<&str> {
        self.request_parameters.get(name).and_then(|v| v.first()).map(|s| s.as_str())
    }

    pub fn get_parameter_values(&self, name: &str) -> Option<&[String]> {
        self.request_parameters.get(name).map(|v| v.as_slice())
    }

    pub fn get_file_parameter(&self, name: &str) -> Option<&FileParameter> {
        self.file_parameters.get(name)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn get_status(&self) -> TransactionStatus {
        match *self.transaction.lock() {
            Some(tx) => self.persistence.get_transaction_manager().get_status(tx),
            None => TransactionStatus::NoTransaction,
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self.get_status(), TransactionStatus::Active | TransactionStatus::MarkedRollback)
    }

    /// Runs a select through this context's connection.  On failure the transaction is marked
    /// rollback-only and the error names `operation`.
    pub fn query(&self, operation: &str, sql: &str, types: &[ColumnType]) -> Result<Vec<DbRow>> {
        with_connection(self, |conn| conn.query(sql, types)).map_err(|e| self.fail(operation, e))
    }

    /// Like query, for statements that change rows.
    pub fn execute(&self, operation: &str, sql: &str) -> Result<u64> {
        with_connection(self, |conn| conn.execute(sql)).map_err(|e| self.fail(operation, e))
    }

    fn fail(&self, operation: &str, e: PersistError) -> PersistError {
        if let Err(abort_error) = self.abort() {
            debug!("Could not mark context {} rollback-only: {}", self.request_id, abort_error);
        }
        let kind = match e.get_kind() {
            ErrorKind::Context => ErrorKind::Context,
            _ => ErrorKind::Execution,
        };
        PersistError::wrap(kind, operation, &e)
    }

    /// Marks the transaction rollback-only, leaving the context open.
    pub fn abort(&self) -> Result<()> {
        match *self.transaction.lock() {
            Some(tx) => self.persistence.get_transaction_manager().set_rollback_only(tx),
            None => Err(PersistError::context("No transaction to abort")),
        }
    }

    /// Ends the transaction (committing if asked and allowed) on both the transaction manager
    /// and the connection.
    fn finish(&self, commit: bool) -> Result<()> {
        let mut conn = self.connection.lock();
        let mut transaction = self.transaction.lock();
        let tx = transaction
            .take()
            .ok_or_else(|| PersistError::context(format!("Context {} has no active transaction", self.request_id)))?;
        let tm = self.persistence.get_transaction_manager();
        let enlisted = conn.as_mut().filter(|c| c.is_in_transaction());
        if commit {
            match tm.commit(tx) {
                Ok(()) => match enlisted {
                    Some(c) => c.commit(),
                    None => Ok(()),
                },
                Err(e) => {
                    if let Some(c) = enlisted {
                        c.rollback()?;
                    }
                    Err(e)
                }
            }
        } else {
            let result = tm.rollback(tx);
            if let Some(c) = enlisted {
                c.rollback()?;
            }
            result
        }
    }

    /// Commits and starts a new transaction, keeping everything else.
    pub fn save(&self) -> Result<()> {
        self.finish(true)?;
        let tx = self.persistence.get_transaction_manager().begin()?;
        *self.transaction.lock() = Some(tx);
        debug!("Saved context {}.", self.request_id);
        Ok(())
    }

    /// Commits, then closes whatever the outcome.
    pub fn commit(&self) -> Result<()> {
        let result = self.finish(true);
        self.close()?;
        result
    }

    /// Rolls back, then closes.
    pub fn rollback(&self) -> Result<()> {
        let result = self.finish(false);
        self.close()?;
        result
    }

    /// Opens a store resource for one instance and one event.  The caller must commit or
    /// abort it; the context only aborts the ones still open when it closes.
    pub fn get_store_resource(&self, instance: &Instance, event: StoreEvent) -> Result<StoreHandle> {
        let general_id = instance.get_general_id(self)?;
        let resource = self.persistence.get_store_factory().open(instance, general_id, event)?;
        let handle = StoreHandle::new(instance.clone(), event, resource);
        let mut open = self.store_resources.lock();
        open.retain(|h| h.is_open());
        open.push(handle.clone());
        Ok(handle)
    }

    /// Ends the context: rolls back a transaction still active, aborts stragglers, sweeps
    /// this request's query cache entries, releases the connection and unbinds the thread.
    /// Closing again does nothing.
    pub fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        let mut result = Ok(());
        if self.transaction.lock().is_some() {
            warn!("Context {} closed with its transaction still open; rolling back.", self.request_id);
            result = self.finish(false);
            if let Err(e) = &result {
                warn!("Rollback on close of context {} failed: {}", self.request_id, e);
            }
        }
        let stragglers: Vec<StoreHandle> = self.store_resources.lock().drain(..).filter(|h| h.is_open()).collect();
        for h in stragglers {
            warn!("Aborting store resource {:?} left open by context {}.", h, self.request_id);
            if let Err(e) = h.abort() {
                warn!("Aborting {:?} failed: {}", h, e);
            }
        }
        self.persistence.get_query_cache().clean_by_key(&self.request_id);
        self.connection.lock().take();
        let me = self as *const Context;
        let unbind = |slot: &RefCell<Option<Arc<Context>>>| {
            let mut s = slot.borrow_mut();
            if s.as_ref().map(|c| std::ptr::eq(Arc::as_ptr(c), me)).unwrap_or(false) {
                s.take();
            }
        };
        INHERITABLE.with(unbind);
        THREAD.with(unbind);
        info!("Closed context {}.", self.request_id);
        result
    }
}

/// All SQL of a context goes through its one connection, opened on first use and enlisted in
/// the current transaction before each use.
impl ConnectionProvider for Context {
    fn with_connection(&self, f: &mut dyn FnMut(&mut dyn DbConnection) -> Result<()>) -> Result<()> {
        if self.is_closed() {
            return Err(PersistError::context(format!("Context {} is closed", self.request_id)));
        }
        let mut guard = self.connection.lock();
        if guard.is_none() {
            *guard = Some(self.persistence.get_database().open_connection()?);
        }
        let conn = guard
            .as_mut()
            .ok_or_else(|| PersistError::context("The connection could not be opened"))?;
        let active = self.transaction.lock().is_some();
        if active && !conn.is_in_transaction() {
            conn.begin()?;
        }
        f(conn.as_mut())
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("request_id", &self.request_id)
            .field("user", &self.user)
            .field("inheritance", &self.inheritance)
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::model::database::opt_i64;
    use crate::test_support::Fixture;
    use crate::util::Util;

    fn count(ctx: &Context) -> i64 {
        let rows = ctx
            .query("count", "SELECT COUNT(*) FROM T_ENTITY", &[ColumnType::Bigint])
            .unwrap();
        opt_i64(&rows[0], 0).unwrap()
    }

    #[test]
    fn test_begin_refuses_a_second_context_on_the_thread() {
        Util::initialize_tracing();
        let f = Fixture::new();
        let p = f.persistence();
        let ctx = p.begin(BeginOptions::new()).unwrap();
        let e = p.begin(BeginOptions::new()).unwrap_err();
        assert!(e.is_kind(ErrorKind::Context));
        // the other slot is free
        let inheritable = p.begin(BeginOptions::new().inheritance(Inheritance::Inheritable)).unwrap();
        assert!(Arc::ptr_eq(&Context::get().unwrap(), &ctx));
        inheritable.close().unwrap();
        ctx.close().unwrap();
        assert!(Context::get().is_none());
        // and again is harmless
        ctx.close().unwrap();
        assert!(ctx.query("after close", "SELECT 1", &[ColumnType::Bigint]).is_err());
    }

    #[test]
    fn test_commit_keeps_and_rollback_discards() {
        Util::initialize_tracing();
        let f = Fixture::new();
        let p = f.persistence();
        let ctx = p.begin(BeginOptions::new()).unwrap();
        let before = count(&ctx);
        ctx.execute("insert", "INSERT INTO T_ENTITY (TYPEID, NAME) VALUES (101, 'Carol')").unwrap();
        ctx.rollback().unwrap();
        assert!(ctx.is_closed());

        let ctx = p.begin(BeginOptions::new()).unwrap();
        assert_eq!(count(&ctx), before);
        ctx.execute("insert", "INSERT INTO T_ENTITY (TYPEID, NAME) VALUES (101, 'Carol')").unwrap();
        ctx.save().unwrap();
        assert!(ctx.is_active());
        ctx.execute("insert", "INSERT INTO T_ENTITY (TYPEID, NAME) VALUES (101, 'Dave')").unwrap();
        // closing an active context rolls back only the work since the save
        ctx.close().unwrap();

        let ctx = p.begin(BeginOptions::new()).unwrap();
        assert_eq!(count(&ctx), before + 1);
        ctx.commit().unwrap();
    }

    #[test]
    fn test_failed_statement_marks_rollback_only() {
        Util::initialize_tracing();
        let f = Fixture::new();
        let p = f.persistence();
        let ctx = p.begin(BeginOptions::new()).unwrap();
        let e = ctx.execute("bad insert", "INSERT INTO NO_SUCH_TABLE (X) VALUES (1)").unwrap_err();
        assert!(e.is_kind(ErrorKind::Execution));
        assert!(e.get_message().starts_with("bad insert"));
        assert_eq!(ctx.get_status(), TransactionStatus::MarkedRollback);
        let e = ctx.commit().unwrap_err();
        assert!(e.is_kind(ErrorKind::Execution));
        assert!(ctx.is_closed());
    }

    #[test]
    fn test_close_sweeps_request_cache_entries() {
        Util::initialize_tracing();
        let f = Fixture::new();
        let p = f.persistence();
        let ctx = p.begin(BeginOptions::new()).unwrap();
        let cache = p.get_query_cache();
        let key = crate::cache::QueryKey::new(ctx.get_request_id(), "SELECT 1");
        cache.put(key.clone(), Arc::new(vec![]), &crate::cache::CacheDefinition::new(ctx.get_request_id()));
        let other = crate::cache::QueryKey::new("shared", "SELECT 1");
        cache.put(other.clone(), Arc::new(vec![]), &crate::cache::CacheDefinition::new("shared"));
        ctx.close().unwrap();
        assert!(cache.get(&key).is_none());
        assert!(cache.get(&other).is_some());
    }

    #[test]
    fn test_identity_and_company_switching() {
        Util::initialize_tracing();
        let f = Fixture::new();
        let p = f.persistence();
        let user = UserIdentity::new(1, "alice").with_companies(vec![1, 2]);
        let ctx = p
            .begin(
                BeginOptions::new()
                    .user(user)
                    .locale("de")
                    .session_attribute("theme", "dark")
                    .request_parameter("q", vec!["a".to_string(), "b".to_string()]),
            )
            .unwrap();
        assert_eq!(ctx.get_company(), Some(1));
        ctx.set_company(2).unwrap();
        assert_eq!(ctx.get_company(), Some(2));
        assert!(ctx.set_company(3).unwrap_err().is_kind(ErrorKind::Access));
        assert_eq!(ctx.get_locale(), "de");
        assert_eq!(ctx.get_session_attribute("theme").as_deref(), Some("dark"));
        assert_eq!(ctx.get_parameter("q"), Some("a"));
        assert_eq!(ctx.get_parameter_values("q").unwrap().len(), 2);
        ctx.set_request_attribute("step", "1");
        assert_eq!(ctx.get_request_attribute("step").as_deref(), Some("1"));
        ctx.close().unwrap();
    }

    #[test]
    fn test_worker_sees_inheritable_context() {
        Util::initialize_tracing();
        let f = Fixture::new();
        let p = f.persistence();
        let local = p.begin(BeginOptions::new()).unwrap();
        assert!(local.spawn_inheriting(|| ()).is_err());
        local.close().unwrap();

        let ctx = p.begin(BeginOptions::new().inheritance(Inheritance::Inheritable)).unwrap();
        let id = ctx.get_request_id().to_string();
        let seen = ctx
            .spawn_inheriting(|| Context::get().map(|c| c.get_request_id().to_string()))
            .unwrap()
            .join()
            .unwrap();
        assert_eq!(seen, Some(id));
        let unbound = std::thread::spawn(|| Context::get().is_none()).join().unwrap();
        assert!(unbound);
        ctx.close().unwrap();
    }

    #[test]
    fn test_close_aborts_straggler_store_resources() {
        Util::initialize_tracing();
        let f = Fixture::new();
        let p = f.persistence();
        let ctx = p.begin(BeginOptions::new()).unwrap();
        let i = Instance::new(110, 1);
        let w = ctx.get_store_resource(&i, StoreEvent::Write).unwrap();
        w.write(b"never kept").unwrap();
        ctx.close().unwrap();
        assert!(!w.is_open());
        assert!(!f.store().contains(&i));
    }
}
