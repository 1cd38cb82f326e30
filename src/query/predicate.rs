/*  This file is part of OneModel, a program to manage knowledge.
    Copyright in each year of 2025-2026 inclusive, Luke A. Call.
    OneModel is free software, distributed under a license that includes honesty, the Golden Rule,
    and the GNU Affero General Public License as published by the Free Software Foundation;
    see the file LICENSE for license version and details.
    OneModel is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranty of
    MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU Affero General Public License for more details.
    You should have received a copy of the GNU Affero General Public License along with OneModel.  If not, see <http://www.gnu.org/licenses/>
*/
use crate::query::attribute_query::AttributeQuery;
use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Equal,
    NotEqual,
    Less,
    LessOrEqual,
    Greater,
    GreaterOrEqual,
    /// `*` matches any run of characters and `?` any one character
    Match,
}

impl Comparison {
    pub fn sql_operator(&self) -> &'static str {
        match self {
            Comparison::Equal => "=",
            Comparison::NotEqual => "<>",
            Comparison::Less => "<",
            Comparison::LessOrEqual => "<=",
            Comparison::Greater => ">",
            Comparison::GreaterOrEqual => ">=",
            Comparison::Match => "LIKE",
        }
    }
}

/// A condition on the instances of the queried type.  Attributes are named as the queried type
/// (or the common ancestor of the queried types) knows them; nothing is checked until compiled.
#[derive(Debug, Clone, PartialEq)]
pub enum Where {
    Compare {
        attribute: String,
        comparison: Comparison,
        value: Value,
    },
    In {
        attribute: String,
        values: Vec<Value>,
        negate: bool,
    },
    Null {
        attribute: String,
        negate: bool,
    },
    InQuery {
        attribute: String,
        query: Box<AttributeQuery>,
        negate: bool,
    },
    /// Instances classified by the named classification or one of its children.
    ClassEqual(String),
    IdIn(Vec<i64>),
    And(Vec<Where>),
    Or(Vec<Where>),
    Not(Box<Where>),
}

impl Where {
    fn compare(attribute: &str, comparison: Comparison, value: impl Into<Value>) -> Where {
        Where::Compare {
            attribute: attribute.to_string(),
            comparison,
            value: value.into(),
        }
    }

    #[must_use]
    pub fn equal(attribute: &str, value: impl Into<Value>) -> Where {
        Self::compare(attribute, Comparison::Equal, value)
    }

    /// Equal to any of `values`.
    #[must_use]
    pub fn equal_any(attribute: &str, values: Vec<Value>) -> Where {
        Self::in_values(attribute, values)
    }

    #[must_use]
    pub fn not_equal(attribute: &str, value: impl Into<Value>) -> Where {
        Self::compare(attribute, Comparison::NotEqual, value)
    }

    #[must_use]
    pub fn less(attribute: &str, value: impl Into<Value>) -> Where {
        Self::compare(attribute, Comparison::Less, value)
    }

    #[must_use]
    pub fn less_or_equal(attribute: &str, value: impl Into<Value>) -> Where {
        Self::compare(attribute, Comparison::LessOrEqual, value)
    }

    #[must_use]
    pub fn greater(attribute: &str, value: impl Into<Value>) -> Where {
        Self::compare(attribute, Comparison::Greater, value)
    }

    #[must_use]
    pub fn greater_or_equal(attribute: &str, value: impl Into<Value>) -> Where {
        Self::compare(attribute, Comparison::GreaterOrEqual, value)
    }

    #[must_use]
    pub fn matches(attribute: &str, pattern: &str) -> Where {
        Self::compare(attribute, Comparison::Match, pattern)
    }

    #[must_use]
    pub fn is_null(attribute: &str) -> Where {
        Where::Null {
            attribute: attribute.to_string(),
            negate: false,
        }
    }

    #[must_use]
    pub fn is_not_null(attribute: &str) -> Where {
        Where::Null {
            attribute: attribute.to_string(),
            negate: true,
        }
    }

    #[must_use]
    pub fn in_values(attribute: &str, values: Vec<Value>) -> Where {
        Where::In {
            attribute: attribute.to_string(),
            values,
            negate: false,
        }
    }

    #[must_use]
    pub fn not_in_values(attribute: &str, values: Vec<Value>) -> Where {
        Where::In {
            attribute: attribute.to_string(),
            values,
            negate: true,
        }
    }

    #[must_use]
    pub fn in_query(attribute: &str, query: AttributeQuery) -> Where {
        Where::InQuery {
            attribute: attribute.to_string(),
            query: Box::new(query),
            negate: false,
        }
    }

    #[must_use]
    pub fn not_in_query(attribute: &str, query: AttributeQuery) -> Where {
        Where::InQuery {
            attribute: attribute.to_string(),
            query: Box::new(query),
            negate: true,
        }
    }

    #[must_use]
    pub fn class_equal(classification: &str) -> Where {
        Where::ClassEqual(classification.to_string())
    }

    #[must_use]
    pub fn id_in(ids: Vec<i64>) -> Where {
        Where::IdIn(ids)
    }

    #[must_use]
    pub fn and(self, other: Where) -> Where {
        match self {
            Where::And(mut all) => {
                all.push(other);
                Where::And(all)
            }
            w => Where::And(vec![w, other]),
        }
    }

    #[must_use]
    pub fn or(self, other: Where) -> Where {
        match self {
            Where::Or(mut any) => {
                any.push(other);
                Where::Or(any)
            }
            w => Where::Or(vec![w, other]),
        }
    }

    #[must_use]
    pub fn negate(self) -> Where {
        Where::Not(Box::new(self))
    }
}

/// Translates a match pattern into a LIKE pattern.
pub fn like_pattern(pattern: &str) -> String {
    pattern.replace('*', "%").replace('?', "_")
}
