/*  This file is part of OneModel, a program to manage knowledge.
    Copyright in each year of 2025-2026 inclusive, Luke A. Call.
    OneModel is free software, distributed under a license that includes honesty, the Golden Rule,
    and the GNU Affero General Public License as published by the Free Software Foundation;
    see the file LICENSE for license version and details.
    OneModel is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranty of
    MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU Affero General Public License for more details.
    You should have received a copy of the GNU Affero General Public License along with OneModel.  If not, see <http://www.gnu.org/licenses/>
*/
use crate::meta::entity_type::TypeRow;

/// What a classification type carries beyond a plain type.
///
/// A classification categorizes instances of another type (the classified type).  Which
/// classifications an instance has is recorded in rows of the relation type: one attribute of
/// the relation links to the classified instance, another holds the classification's type id.
/// The classification's own rows (its attribute values for one classified instance) link back
/// to the instance by the link attribute.
///
/// Children of a classification leave most of this unset; the loader fills it in from the
/// parent classification, so every field here is already the effective value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassificationData {
    root_id: i64,
    parent_classification_id: Option<i64>,
    child_classification_ids: Vec<i64>,
    classified_type_id: Option<i64>,
    link_attribute_name: Option<String>,
    relation_type_id: Option<i64>,
    relation_link_attribute_name: Option<String>,
    relation_class_attribute_name: Option<String>,
    multiple_select: bool,
    company_dependent: bool,
}

impl ClassificationData {
    /// `parent` is the already-resolved data of the parent classification, if there is one.
    pub fn new(type_id: i64, row: &TypeRow, child_classification_ids: Vec<i64>, parent: Option<&ClassificationData>) -> ClassificationData {
        match parent {
            None => ClassificationData {
                root_id: type_id,
                parent_classification_id: None,
                child_classification_ids,
                classified_type_id: row.owner_type_id,
                link_attribute_name: row.link_attr.clone(),
                relation_type_id: row.relation_type_id,
                relation_link_attribute_name: row.relation_link_attr.clone(),
                relation_class_attribute_name: row.relation_class_attr.clone(),
                multiple_select: row.multiple_select.unwrap_or(false),
                company_dependent: row.company_dependent.unwrap_or(false),
            },
            Some(p) => ClassificationData {
                root_id: p.root_id,
                parent_classification_id: row.parent_classification_id,
                child_classification_ids,
                classified_type_id: row.owner_type_id.or(p.classified_type_id),
                link_attribute_name: row.link_attr.clone().or_else(|| p.link_attribute_name.clone()),
                relation_type_id: row.relation_type_id.or(p.relation_type_id),
                relation_link_attribute_name: row
                    .relation_link_attr
                    .clone()
                    .or_else(|| p.relation_link_attribute_name.clone()),
                relation_class_attribute_name: row
                    .relation_class_attr
                    .clone()
                    .or_else(|| p.relation_class_attribute_name.clone()),
                multiple_select: row.multiple_select.unwrap_or(p.multiple_select),
                company_dependent: row.company_dependent.unwrap_or(p.company_dependent),
            },
        }
    }

    pub fn get_root_id(&self) -> i64 {
        self.root_id
    }

    pub fn is_root(&self) -> bool {
        self.parent_classification_id.is_none()
    }

    pub fn get_parent_classification_id(&self) -> Option<i64> {
        self.parent_classification_id
    }

    pub fn get_child_classification_ids(&self) -> &[i64] {
        &self.child_classification_ids
    }

    pub fn get_classified_type_id(&self) -> Option<i64> {
        self.classified_type_id
    }

    pub fn get_link_attribute_name(&self) -> Option<&str> {
        self.link_attribute_name.as_deref()
    }

    pub fn get_relation_type_id(&self) -> Option<i64> {
        self.relation_type_id
    }

    pub fn get_relation_link_attribute_name(&self) -> Option<&str> {
        self.relation_link_attribute_name.as_deref()
    }

    pub fn get_relation_class_attribute_name(&self) -> Option<&str> {
        self.relation_class_attribute_name.as_deref()
    }

    pub fn is_multiple_select(&self) -> bool {
        self.multiple_select
    }

    pub fn is_company_dependent(&self) -> bool {
        self.company_dependent
    }
}
