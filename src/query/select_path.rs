/*  This file is part of OneModel, a program to manage knowledge.
    Copyright in each year of 2025-2026 inclusive, Luke A. Call.
    OneModel is free software, distributed under a license that includes honesty, the Golden Rule,
    and the GNU Affero General Public License as published by the Free Software Foundation;
    see the file LICENSE for license version and details.
    OneModel is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranty of
    MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU Affero General Public License for more details.
    You should have received a copy of the GNU Affero General Public License along with OneModel.  If not, see <http://www.gnu.org/licenses/>
*/
//! Select paths: what a print query selects, written as dotted steps, e.g.
//! `linkto[Contact].attribute[Name]`, `linkfrom[InvoicePosition#Invoice].attribute[Description]`,
//! `attribute[Due].format[%Y-%m-%d]` or just `oid`.
use crate::error::{PersistError, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;

static STEP: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(linkto|linkfrom|class|attributeset|attribute|format)\[([^\]]*)\]|\b(id|oid|type|status)\b").unwrap()
});

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathStep {
    /// follow a link attribute to the instance it names
    LinkTo(String),
    /// instances of a type whose link attribute names this one
    LinkFrom { type_name: String, attribute: String },
    /// classifications of this instance
    Class(String),
    /// the rows of an attribute set
    AttributeSet(String),
}

impl PathStep {
    /// Whether the step gives a list of values per instance rather than one.
    pub fn is_one_to_many(&self) -> bool {
        !matches!(self, PathStep::LinkTo(_))
    }
}

impl fmt::Display for PathStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathStep::LinkTo(a) => write!(f, "linkto[{}]", a),
            PathStep::LinkFrom { type_name, attribute } => write!(f, "linkfrom[{}#{}]", type_name, attribute),
            PathStep::Class(c) => write!(f, "class[{}]", c),
            PathStep::AttributeSet(s) => write!(f, "attributeset[{}]", s),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathLeaf {
    Attribute(String),
    Id,
    Oid,
    /// the name of the instance's concrete type
    Type,
    /// the key of the instance's status
    Status,
}

impl fmt::Display for PathLeaf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathLeaf::Attribute(a) => write!(f, "attribute[{}]", a),
            PathLeaf::Id => f.write_str("id"),
            PathLeaf::Oid => f.write_str("oid"),
            PathLeaf::Type => f.write_str("type"),
            PathLeaf::Status => f.write_str("status"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectPath {
    text: String,
    steps: Vec<PathStep>,
    leaf: PathLeaf,
    format: Option<String>,
}

impl SelectPath {
    /// Parses a path.  Steps are joined by dots; the leaf comes last, then at most one format.
    pub fn parse(text: &str) -> Result<SelectPath> {
        let text = text.trim();
        let bad = |why: &str| PersistError::query_compilation(format!("Bad select path \"{}\": {}", text, why));
        let mut steps = Vec::new();
        let mut leaf: Option<PathLeaf> = None;
        let mut format: Option<String> = None;
        let mut end = 0;
        for c in STEP.captures_iter(text) {
            let whole = c.get(0).ok_or_else(|| bad("unreadable"))?;
            let gap = &text[end..whole.start()];
            if (end == 0 && !gap.is_empty()) || (end > 0 && gap != ".") {
                return Err(bad(&format!("unexpected \"{}\"", gap)));
            }
            end = whole.end();
            if format.is_some() {
                return Err(bad("nothing may follow format[..]"));
            }
            if let Some(keyword) = c.get(3) {
                if leaf.is_some() {
                    return Err(bad("only one of id, oid, type, status or attribute[..] may be selected"));
                }
                leaf = Some(match keyword.as_str() {
                    "id" => PathLeaf::Id,
                    "oid" => PathLeaf::Oid,
                    "type" => PathLeaf::Type,
                    _ => PathLeaf::Status,
                });
                continue;
            }
            let kind = c.get(1).map(|m| m.as_str()).unwrap_or("");
            let arg = c.get(2).map(|m| m.as_str().trim()).unwrap_or("");
            if arg.is_empty() {
                return Err(bad(&format!("{}[] needs a name", kind)));
            }
            if kind == "format" {
                if leaf.is_none() {
                    return Err(bad("format[..] must follow what it formats"));
                }
                format = Some(arg.to_string());
                continue;
            }
            if leaf.is_some() {
                return Err(bad("the selected value must come last"));
            }
            match kind {
                "attribute" => leaf = Some(PathLeaf::Attribute(arg.to_string())),
                "linkto" => steps.push(PathStep::LinkTo(arg.to_string())),
                "linkfrom" => {
                    let (type_name, attribute) = arg
                        .split_once('#')
                        .ok_or_else(|| bad("linkfrom[..] takes Type#Attribute"))?;
                    steps.push(PathStep::LinkFrom {
                        type_name: type_name.trim().to_string(),
                        attribute: attribute.trim().to_string(),
                    });
                }
                "class" => steps.push(PathStep::Class(arg.to_string())),
                _ => steps.push(PathStep::AttributeSet(arg.to_string())),
            }
        }
        if end != text.len() {
            return Err(bad(&format!("unexpected \"{}\"", &text[end..])));
        }
        let leaf = leaf.ok_or_else(|| bad("nothing is selected"))?;
        Ok(SelectPath {
            text: text.to_string(),
            steps,
            leaf,
            format,
        })
    }

    /// The path selecting one attribute of the queried type.
    pub fn attribute(name: &str) -> SelectPath {
        SelectPath {
            text: format!("attribute[{}]", name),
            steps: vec![],
            leaf: PathLeaf::Attribute(name.to_string()),
            format: None,
        }
    }

    pub fn get_text(&self) -> &str {
        &self.text
    }

    pub fn get_steps(&self) -> &[PathStep] {
        &self.steps
    }

    pub fn get_leaf(&self) -> &PathLeaf {
        &self.leaf
    }

    pub fn get_format(&self) -> Option<&str> {
        self.format.as_deref()
    }

    /// What is left after the first `n` steps, as a path of its own (keeping the format).
    pub fn rest(&self, n: usize) -> SelectPath {
        let steps = self.steps[n.min(self.steps.len())..].to_vec();
        let mut parts: Vec<String> = steps.iter().map(|s| s.to_string()).collect();
        parts.push(self.leaf.to_string());
        if let Some(f) = &self.format {
            parts.push(format!("format[{}]", f));
        }
        SelectPath {
            text: parts.join("."),
            steps,
            leaf: self.leaf.clone(),
            format: self.format.clone(),
        }
    }
}

impl fmt::Display for SelectPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_parse_steps_and_leaves() {
        let p = SelectPath::parse("linkto[Contact].attribute[Name]").unwrap();
        assert_eq!(p.get_steps(), &[PathStep::LinkTo("Contact".to_string())]);
        assert_eq!(p.get_leaf(), &PathLeaf::Attribute("Name".to_string()));
        assert!(p.get_format().is_none());

        let p = SelectPath::parse("linkfrom[InvoicePosition#Invoice].attribute[Length]").unwrap();
        assert_eq!(
            p.get_steps()[0],
            PathStep::LinkFrom {
                type_name: "InvoicePosition".to_string(),
                attribute: "Invoice".to_string()
            }
        );
        assert!(p.get_steps()[0].is_one_to_many());

        let p = SelectPath::parse("attribute[Total].format[0.00]").unwrap();
        assert_eq!(p.get_format(), Some("0.00"));
        assert_eq!(SelectPath::parse("oid").unwrap().get_leaf(), &PathLeaf::Oid);
        assert_eq!(SelectPath::parse("linkto[Contact].type").unwrap().get_leaf(), &PathLeaf::Type);
        assert_eq!(SelectPath::parse("class[InvoiceClass].id").unwrap().get_steps().len(), 1);
        assert_eq!(SelectPath::attribute("Name"), SelectPath::parse("attribute[Name]").unwrap());
    }

    #[test]
    fn test_rest_of_path() {
        let p = SelectPath::parse("linkfrom[InvoicePosition#Invoice].linkto[Invoice].attribute[Due].format[%Y]").unwrap();
        let r = p.rest(1);
        assert_eq!(r.get_text(), "linkto[Invoice].attribute[Due].format[%Y]");
        assert_eq!(r.get_steps().len(), 1);
        assert_eq!(p.rest(2).get_text(), "attribute[Due].format[%Y]");
    }

    #[test]
    fn test_rejects_bad_paths() {
        for bad in [
            "",
            "linkto[Contact]",
            "attribute[Name].linkto[Contact]",
            "attribute[]",
            "format[x].attribute[Name]",
            "attribute[Name]x",
            "attribute[Name]..id",
            "linkfrom[InvoicePosition].id",
            "id.oid",
            "attribute[Total].format[0].format[1]",
        ] {
            assert!(SelectPath::parse(bad).is_err(), "{} should not parse", bad);
        }
    }
}
