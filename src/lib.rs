/*  This file is part of OneModel, a program to manage knowledge.
    Copyright in each year of 2025-2026 inclusive, Luke A. Call.
    OneModel is free software, distributed under a license that includes honesty, the Golden Rule,
    and the GNU Affero General Public License as published by the Free Software Foundation;
    see the file LICENSE for license version and details.
    OneModel is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranty of
    MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU Affero General Public License for more details.
    You should have received a copy of the GNU Affero General Public License along with OneModel.  If not, see <http://www.gnu.org/licenses/>
*/
//! The persistence core of OneModel: types and attributes described by rows of bootstrap
//! tables and cached, queries over them compiled to SQL under tenant rules, a cache for query
//! results, and the per-request context that ties a connection and a transaction together.
pub mod access;
pub mod cache;
pub mod config;
pub mod context;
pub mod error;
pub mod instance;
pub mod meta;
pub mod model;
pub mod mutation;
pub mod persistence;
pub mod query;
pub mod util;
pub mod value;

#[cfg(test)]
pub mod test_support;

pub use error::{ErrorKind, PersistError, Result};
pub use persistence::Persistence;
