/*  This file is part of OneModel, a program to manage knowledge.
    Copyright in each year of 2025-2026 inclusive, Luke A. Call.
    OneModel is free software, distributed under a license that includes honesty, the Golden Rule,
    and the GNU Affero General Public License as published by the Free Software Foundation;
    see the file LICENSE for license version and details.
    OneModel is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranty of
    MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU Affero General Public License for more details.
    You should have received a copy of the GNU Affero General Public License along with OneModel.  If not, see <http://www.gnu.org/licenses/>
*/
use std::fmt;
use thiserror::Error as ThisError;

/// The machine-checkable part of a PersistError.  Callers match on this; the message is for people.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Missing or invalid table/column mapping found while loading a Type.
    Configuration,
    /// Anything else that went wrong while populating a metadata cache entry. Safe to retry.
    CacheReload,
    /// Missing main table, unresolvable common type, unknown attribute, and the like.
    QueryCompilation,
    /// A tenant (company) is required for the query but none is bound to the context.
    NoTenant,
    /// The backing store failed while executing a statement.
    Execution,
    /// The access check said no.
    Access,
    /// Context lifecycle misuse: none bound, already bound, already closed.
    Context,
    /// Store (blob) resource failures.
    Store,
    /// A value could not be converted to or from its column form, or failed validation.
    InvalidValue,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::Configuration => "configuration error",
            ErrorKind::CacheReload => "cache reload error",
            ErrorKind::QueryCompilation => "query compilation error",
            ErrorKind::NoTenant => "no tenant",
            ErrorKind::Execution => "execution error",
            ErrorKind::Access => "access denied",
            ErrorKind::Context => "context error",
            ErrorKind::Store => "store error",
            ErrorKind::InvalidValue => "invalid value",
        };
        f.write_str(s)
    }
}

/// The single error type that leaves this crate.
#[derive(Debug, Clone, ThisError)]
#[error("{kind}: {message}")]
pub struct PersistError {
    kind: ErrorKind,
    message: String,
}

pub type Result<T> = std::result::Result<T, PersistError>;

impl PersistError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> PersistError {
        PersistError {
            kind,
            message: message.into(),
        }
    }

    pub fn configuration(message: impl Into<String>) -> PersistError {
        Self::new(ErrorKind::Configuration, message)
    }

    pub fn cache_reload(message: impl Into<String>) -> PersistError {
        Self::new(ErrorKind::CacheReload, message)
    }

    pub fn query_compilation(message: impl Into<String>) -> PersistError {
        Self::new(ErrorKind::QueryCompilation, message)
    }

    pub fn no_tenant(message: impl Into<String>) -> PersistError {
        Self::new(ErrorKind::NoTenant, message)
    }

    pub fn execution(message: impl Into<String>) -> PersistError {
        Self::new(ErrorKind::Execution, message)
    }

    pub fn access(message: impl Into<String>) -> PersistError {
        Self::new(ErrorKind::Access, message)
    }

    pub fn context(message: impl Into<String>) -> PersistError {
        Self::new(ErrorKind::Context, message)
    }

    pub fn store(message: impl Into<String>) -> PersistError {
        Self::new(ErrorKind::Store, message)
    }

    pub fn invalid_value(message: impl Into<String>) -> PersistError {
        Self::new(ErrorKind::InvalidValue, message)
    }

    /// Re-labels an error with a new kind, putting `context` in front of the original message.
    /// The original kind is kept in the text so it is not lost when diagnosing.
    pub fn wrap(kind: ErrorKind, context: &str, err: &PersistError) -> PersistError {
        if err.kind == kind {
            Self::new(kind, format!("{}: {}", context, err.message))
        } else {
            Self::new(kind, format!("{}: {}", context, err))
        }
    }

    pub fn get_kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn get_message(&self) -> &str {
        &self.message
    }

    pub fn is_kind(&self, kind: ErrorKind) -> bool {
        self.kind == kind
    }
}

impl From<sqlx::Error> for PersistError {
    fn from(e: sqlx::Error) -> Self {
        PersistError::execution(e.to_string())
    }
}

impl From<uuid::Error> for PersistError {
    fn from(e: uuid::Error) -> Self {
        PersistError::invalid_value(e.to_string())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn display_carries_kind_and_message() {
        let e = PersistError::no_tenant("type Invoice is company dependent");
        assert_eq!(e.to_string(), "no tenant: type Invoice is company dependent");
        assert!(e.is_kind(ErrorKind::NoTenant));
    }

    #[test]
    fn wrap_keeps_the_original_kind_in_the_text() {
        let inner = PersistError::execution("relation \"t_x\" does not exist");
        let outer = PersistError::wrap(ErrorKind::CacheReload, "loading type 'X'", &inner);
        assert_eq!(outer.get_kind(), ErrorKind::CacheReload);
        assert!(outer.get_message().contains("execution error"));
        assert!(outer.get_message().contains("loading type 'X'"));

        let same = PersistError::wrap(ErrorKind::Execution, "InstanceQuery.execute", &inner);
        assert_eq!(
            same.get_message(),
            "InstanceQuery.execute: relation \"t_x\" does not exist"
        );
    }
}
