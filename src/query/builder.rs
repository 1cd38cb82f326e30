/*  This file is part of OneModel, a program to manage knowledge.
    Copyright in each year of 2025-2026 inclusive, Luke A. Call.
    OneModel is free software, distributed under a license that includes honesty, the Golden Rule,
    and the GNU Affero General Public License as published by the Free Software Foundation;
    see the file LICENSE for license version and details.
    OneModel is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranty of
    MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU Affero General Public License for more details.
    You should have received a copy of the GNU Affero General Public License along with OneModel.  If not, see <http://www.gnu.org/licenses/>
*/
use crate::cache::CacheDefinition;
use crate::meta::cache_index::CacheKey;
use crate::query::predicate::Where;

/// Which tenants' rows a query over a company-dependent type may see.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompanyScope {
    /// the context's current company
    #[default]
    Current,
    /// every company (or consortium) the user belongs to
    Visible,
    Disabled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    pub attribute: String,
    pub descending: bool,
}

/// Collects what a query is about.  Purely declarative: nothing is looked up or checked until
/// the definition is compiled.
#[derive(Debug, Clone)]
pub struct QueryBuilder {
    definition: QueryDefinition,
}

/// The frozen result of a QueryBuilder.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryDefinition {
    types: Vec<CacheKey>,
    include_child_types: bool,
    company_scope: CompanyScope,
    filter: Option<Where>,
    order: Vec<OrderBy>,
    limit: Option<u64>,
    offset: Option<u64>,
    cache: Option<CacheDefinition>,
}

impl QueryBuilder {
    pub fn new(type_key: impl Into<CacheKey>) -> QueryBuilder {
        QueryBuilder {
            definition: QueryDefinition {
                types: vec![type_key.into()],
                include_child_types: true,
                company_scope: CompanyScope::Current,
                filter: None,
                order: vec![],
                limit: None,
                offset: None,
                cache: None,
            },
        }
    }

    /// Queries another type as well; the attributes usable are those of the nearest type all
    /// the queried types descend from.
    #[must_use]
    pub fn also_type(mut self, type_key: impl Into<CacheKey>) -> QueryBuilder {
        self.definition.types.push(type_key.into());
        self
    }

    #[must_use]
    pub fn include_child_types(mut self, include: bool) -> QueryBuilder {
        self.definition.include_child_types = include;
        self
    }

    #[must_use]
    pub fn company_scope(mut self, scope: CompanyScope) -> QueryBuilder {
        self.definition.company_scope = scope;
        self
    }

    /// Adds a condition, ANDed with any already given.
    #[must_use]
    pub fn filter(mut self, condition: Where) -> QueryBuilder {
        self.definition.filter = Some(match self.definition.filter.take() {
            Some(existing) => existing.and(condition),
            None => condition,
        });
        self
    }

    /// Adds a condition, ORed with any already given.
    #[must_use]
    pub fn or_filter(mut self, condition: Where) -> QueryBuilder {
        self.definition.filter = Some(match self.definition.filter.take() {
            Some(existing) => existing.or(condition),
            None => condition,
        });
        self
    }

    #[must_use]
    pub fn order_by(mut self, attribute: &str) -> QueryBuilder {
        self.definition.order.push(OrderBy {
            attribute: attribute.to_string(),
            descending: false,
        });
        self
    }

    #[must_use]
    pub fn order_by_desc(mut self, attribute: &str) -> QueryBuilder {
        self.definition.order.push(OrderBy {
            attribute: attribute.to_string(),
            descending: true,
        });
        self
    }

    #[must_use]
    pub fn limit(mut self, limit: u64) -> QueryBuilder {
        self.definition.limit = Some(limit);
        self
    }

    #[must_use]
    pub fn offset(mut self, offset: u64) -> QueryBuilder {
        self.definition.offset = Some(offset);
        self
    }

    /// Results are kept in the query cache under this definition.
    #[must_use]
    pub fn cache(mut self, definition: CacheDefinition) -> QueryBuilder {
        self.definition.cache = Some(definition);
        self
    }

    pub fn build(self) -> QueryDefinition {
        self.definition
    }
}

impl QueryDefinition {
    pub fn get_types(&self) -> &[CacheKey] {
        &self.types
    }

    pub fn is_include_child_types(&self) -> bool {
        self.include_child_types
    }

    pub fn get_company_scope(&self) -> CompanyScope {
        self.company_scope
    }

    pub fn get_filter(&self) -> Option<&Where> {
        self.filter.as_ref()
    }

    pub fn get_order(&self) -> &[OrderBy] {
        &self.order
    }

    pub fn get_limit(&self) -> Option<u64> {
        self.limit
    }

    pub fn get_offset(&self) -> Option<u64> {
        self.offset
    }

    pub fn get_cache(&self) -> Option<&CacheDefinition> {
        self.cache.as_ref()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_builder_collects() {
        let d = QueryBuilder::new("Invoice")
            .also_type("CreditNote")
            .include_child_types(false)
            .company_scope(CompanyScope::Visible)
            .filter(Where::equal("Name", "INV-1"))
            .filter(Where::greater("Total", 1.0))
            .order_by("Name")
            .order_by_desc("Total")
            .limit(5)
            .offset(10)
            .build();
        assert_eq!(d.get_types().len(), 2);
        assert!(!d.is_include_child_types());
        assert_eq!(d.get_company_scope(), CompanyScope::Visible);
        assert!(matches!(d.get_filter(), Some(Where::And(v)) if v.len() == 2));
        assert_eq!(d.get_order()[1].attribute, "Total");
        assert!(d.get_order()[1].descending);
        assert_eq!((d.get_limit(), d.get_offset()), (Some(5), Some(10)));
        assert!(d.get_cache().is_none());
    }

    #[test]
    fn test_defaults() {
        let d = QueryBuilder::new(110).or_filter(Where::is_null("Due")).build();
        assert!(d.is_include_child_types());
        assert_eq!(d.get_company_scope(), CompanyScope::Current);
        assert!(matches!(d.get_filter(), Some(Where::Null { negate: false, .. })));
    }
}
