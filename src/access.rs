/*  This file is part of OneModel, a program to manage knowledge.
    Copyright in each year of 2025-2026 inclusive, Luke A. Call.
    OneModel is free software, distributed under a license that includes honesty, the Golden Rule,
    and the GNU Affero General Public License as published by the Free Software Foundation;
    see the file LICENSE for license version and details.
    OneModel is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranty of
    MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU Affero General Public License for more details.
    You should have received a copy of the GNU Affero General Public License along with OneModel.  If not, see <http://www.gnu.org/licenses/>
*/
use crate::context::Context;
use crate::error::{PersistError, Result};
use crate::instance::Instance;
use crate::meta::entity_type::Type;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccessType {
    Create,
    Read,
    Modify,
    Delete,
    Checkin,
    Checkout,
}

impl fmt::Display for AccessType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AccessType::Create => "create",
            AccessType::Read => "read",
            AccessType::Modify => "modify",
            AccessType::Delete => "delete",
            AccessType::Checkin => "checkin",
            AccessType::Checkout => "checkout",
        };
        write!(f, "{}", s)
    }
}

/// Decides whether the context's user may do something to a type, or to one instance of it.
/// `instance` is None for a create.
pub trait AccessCheck: Send + Sync {
    fn check(&self, ctx: &Context, t: &Type, instance: Option<&Instance>, access: AccessType) -> Result<bool>;
}

/// Allows everything.  The default when no access check is configured.
#[derive(Debug, Default)]
pub struct GrantAll {}

impl AccessCheck for GrantAll {
    fn check(&self, _ctx: &Context, _t: &Type, _instance: Option<&Instance>, _access: AccessType) -> Result<bool> {
        Ok(true)
    }
}

/// Runs the configured check and turns a "no" into an Access error naming what was refused.
pub fn require_access(ctx: &Context, t: &Type, instance: Option<&Instance>, access: AccessType) -> Result<()> {
    if ctx.get_persistence().get_access_check().check(ctx, t, instance, access)? {
        Ok(())
    } else {
        let target = match instance {
            Some(i) => format!("instance {} of type '{}'", i, t.get_name()),
            None => format!("type '{}'", t.get_name()),
        };
        Err(PersistError::access(format!("No {} access to {}", access, target)))
    }
}
