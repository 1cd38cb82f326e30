/*  This file is part of OneModel, a program to manage knowledge.
    Copyright in each year of 2025-2026 inclusive, Luke A. Call.
    OneModel is free software, distributed under a license that includes honesty, the Golden Rule,
    and the GNU Affero General Public License as published by the Free Software Foundation;
    see the file LICENSE for license version and details.
    OneModel is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranty of
    MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU Affero General Public License for more details.
    You should have received a copy of the GNU Affero General Public License along with OneModel.  If not, see <http://www.gnu.org/licenses/>
*/
//! Blob storage for instances.  A resource is opened for one instance and one event, used, then
//! committed or aborted by whoever opened it.
use crate::error::{PersistError, Result};
use crate::instance::Instance;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use tracing::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreEvent {
    Write,
    Read,
    Delete,
}

impl fmt::Display for StoreEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

pub trait StoreResource: Send {
    /// Returns the number of bytes taken.
    fn write(&mut self, bytes: &[u8]) -> Result<u64>;
    fn read(&mut self) -> Result<Vec<u8>>;
    fn delete(&mut self) -> Result<()>;
    fn commit(&mut self) -> Result<()>;
    fn abort(&mut self) -> Result<()>;
}

pub trait StoreResourceFactory: Send + Sync {
    fn open(&self, instance: &Instance, general_id: Option<i64>, event: StoreEvent) -> Result<Box<dyn StoreResource>>;
}

/// An open resource, shared between its opener and the Context that tracks it.  Once committed
/// or aborted it is closed and every further call fails.
#[derive(Clone)]
pub struct StoreHandle {
    instance: Instance,
    event: StoreEvent,
    resource: Arc<Mutex<Option<Box<dyn StoreResource>>>>,
}

impl StoreHandle {
    pub fn new(instance: Instance, event: StoreEvent, resource: Box<dyn StoreResource>) -> StoreHandle {
        StoreHandle {
            instance,
            event,
            resource: Arc::new(Mutex::new(Some(resource))),
        }
    }

    pub fn get_instance(&self) -> &Instance {
        &self.instance
    }

    pub fn get_event(&self) -> StoreEvent {
        self.event
    }

    pub fn is_open(&self) -> bool {
        self.resource.lock().is_some()
    }

    fn with_open<R>(&self, f: impl FnOnce(&mut dyn StoreResource) -> Result<R>) -> Result<R> {
        let mut guard = self.resource.lock();
        match guard.as_mut() {
            Some(r) => f(r.as_mut()),
            None => Err(PersistError::store(format!(
                "The {} resource for {} is already closed",
                self.event, self.instance
            ))),
        }
    }

    pub fn write(&self, bytes: &[u8]) -> Result<u64> {
        self.with_open(|r| r.write(bytes))
    }

    pub fn read(&self) -> Result<Vec<u8>> {
        self.with_open(|r| r.read())
    }

    pub fn delete(&self) -> Result<()> {
        self.with_open(|r| r.delete())
    }

    pub fn commit(&self) -> Result<()> {
        let taken = self.resource.lock().take();
        match taken {
            Some(mut r) => r.commit(),
            None => Err(PersistError::store(format!("The resource for {} is already closed", self.instance))),
        }
    }

    /// Closes without applying anything.  Aborting a closed handle does nothing.
    pub fn abort(&self) -> Result<()> {
        let taken = self.resource.lock().take();
        match taken {
            Some(mut r) => r.abort(),
            None => Ok(()),
        }
    }
}

impl fmt::Debug for StoreHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StoreHandle({}, {}, open: {})", self.instance, self.event, self.is_open())
    }
}

enum Pending {
    Nothing,
    Write(Vec<u8>),
    Delete,
}

/// Keeps blobs in memory, by instance oid.  Writes and deletes take effect on commit.
#[derive(Clone, Default)]
pub struct MemoryStore {
    blobs: Arc<DashMap<String, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> MemoryStore {
        MemoryStore::default()
    }

    pub fn contains(&self, instance: &Instance) -> bool {
        self.blobs.contains_key(instance.get_key())
    }

    pub fn len(&self) -> usize {
        self.blobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.is_empty()
    }
}

impl StoreResourceFactory for MemoryStore {
    fn open(&self, instance: &Instance, _general_id: Option<i64>, event: StoreEvent) -> Result<Box<dyn StoreResource>> {
        if !instance.is_valid() {
            return Err(PersistError::store(format!("Cannot open a store resource for invalid instance '{}'", instance)));
        }
        debug!("Opened a {} memory store resource for {}.", event, instance);
        Ok(Box::new(MemoryStoreResource {
            blobs: self.blobs.clone(),
            key: instance.get_key().to_string(),
            event,
            pending: Pending::Nothing,
        }))
    }
}

struct MemoryStoreResource {
    blobs: Arc<DashMap<String, Vec<u8>>>,
    key: String,
    event: StoreEvent,
    pending: Pending,
}

impl MemoryStoreResource {
    fn require(&self, event: StoreEvent) -> Result<()> {
        if self.event == event {
            Ok(())
        } else {
            Err(PersistError::store(format!(
                "A resource opened for {} on {} cannot {}",
                self.event, self.key, event
            )))
        }
    }
}

impl StoreResource for MemoryStoreResource {
    fn write(&mut self, bytes: &[u8]) -> Result<u64> {
        self.require(StoreEvent::Write)?;
        self.pending = Pending::Write(bytes.to_vec());
        Ok(bytes.len() as u64)
    }

    fn read(&mut self) -> Result<Vec<u8>> {
        self.require(StoreEvent::Read)?;
        self.blobs
            .get(&self.key)
            .map(|b| b.value().clone())
            .ok_or_else(|| PersistError::store(format!("Nothing is stored for {}", self.key)))
    }

    fn delete(&mut self) -> Result<()> {
        self.require(StoreEvent::Delete)?;
        self.pending = Pending::Delete;
        Ok(())
    }

    fn commit(&mut self) -> Result<()> {
        match std::mem::replace(&mut self.pending, Pending::Nothing) {
            Pending::Nothing => {}
            Pending::Write(bytes) => {
                self.blobs.insert(self.key.clone(), bytes);
            }
            Pending::Delete => {
                self.blobs.remove(&self.key);
            }
        }
        Ok(())
    }

    fn abort(&mut self) -> Result<()> {
        self.pending = Pending::Nothing;
        Ok(())
    }
}
