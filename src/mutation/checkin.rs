/*  This file is part of OneModel, a program to manage knowledge.
    Copyright in each year of 2025-2026 inclusive, Luke A. Call.
    OneModel is free software, distributed under a license that includes honesty, the Golden Rule,
    and the GNU Affero General Public License as published by the Free Software Foundation;
    see the file LICENSE for license version and details.
    OneModel is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranty of
    MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU Affero General Public License for more details.
    You should have received a copy of the GNU Affero General Public License along with OneModel.  If not, see <http://www.gnu.org/licenses/>
*/
//! Storing and reading the content (a file, usually) kept for an instance by the store
//! resource backend.
use crate::access::{require_access, AccessType};
use crate::context::store::{StoreEvent, StoreHandle};
use crate::context::Context;
use crate::error::Result;
use crate::instance::Instance;
use crate::mutation::abort_with;
use crate::util::Util;
use tracing::*;

fn open(ctx: &Context, instance: &Instance, access: AccessType, event: StoreEvent) -> Result<StoreHandle> {
    let t = ctx.get_persistence().get_metadata().get_type(ctx, instance.get_type_id())?;
    require_access(ctx, &t, Some(instance), access)?;
    ctx.get_store_resource(instance, event).map_err(|e| abort_with(ctx, e))
}

/// Runs `f` on the handle, then commits it; aborts the handle and the context on failure.
fn finish<R>(ctx: &Context, handle: &StoreHandle, f: impl FnOnce(&StoreHandle) -> Result<R>) -> Result<R> {
    match f(handle).and_then(|r| handle.commit().map(|_| r)) {
        Ok(r) => Ok(r),
        Err(e) => {
            if let Err(abort_error) = handle.abort() {
                warn!("Aborting {:?} failed: {}", handle, abort_error);
            }
            Err(abort_with(ctx, e))
        }
    }
}

#[derive(Debug, Clone)]
pub struct Checkin {
    instance: Instance,
}

impl Checkin {
    pub fn new(instance: Instance) -> Checkin {
        Checkin { instance }
    }

    /// Stores `bytes` as the instance's content, replacing what was there.  Returns the md5
    /// of the content, in hex.
    pub fn execute(&self, ctx: &Context, bytes: &[u8]) -> Result<String> {
        let handle = open(ctx, &self.instance, AccessType::Checkin, StoreEvent::Write)?;
        let written = finish(ctx, &handle, |h| h.write(bytes))?;
        let md5 = Util::md5_hex(bytes);
        debug!("Checked in {} bytes for {}, md5 {}.", written, self.instance, md5);
        Ok(md5)
    }
}

#[derive(Debug, Clone)]
pub struct Checkout {
    instance: Instance,
}

impl Checkout {
    pub fn new(instance: Instance) -> Checkout {
        Checkout { instance }
    }

    pub fn execute(&self, ctx: &Context) -> Result<Vec<u8>> {
        let handle = open(ctx, &self.instance, AccessType::Checkout, StoreEvent::Read)?;
        let bytes = finish(ctx, &handle, |h| h.read())?;
        debug!("Checked out {} bytes for {}.", bytes.len(), self.instance);
        Ok(bytes)
    }
}
