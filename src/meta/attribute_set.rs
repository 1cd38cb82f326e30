/*  This file is part of OneModel, a program to manage knowledge.
    Copyright in each year of 2025-2026 inclusive, Luke A. Call.
    OneModel is free software, distributed under a license that includes honesty, the Golden Rule,
    and the GNU Affero General Public License as published by the Free Software Foundation;
    see the file LICENSE for license version and details.
    OneModel is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranty of
    MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU Affero General Public License for more details.
    You should have received a copy of the GNU Affero General Public License along with OneModel.  If not, see <http://www.gnu.org/licenses/>
*/
use std::collections::BTreeSet;

/// What an attribute-set type carries beyond a plain type: a repeatable group of values hanging
/// off an instance of the owner type.  Each row of the set's table is one repetition, linked to
/// its owner instance by the link attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeSetData {
    owner_type_id: i64,
    link_attribute_name: String,
    attribute_names: BTreeSet<String>,
}

impl AttributeSetData {
    pub fn new(owner_type_id: i64, link_attribute_name: &str, attribute_names: BTreeSet<String>) -> AttributeSetData {
        AttributeSetData {
            owner_type_id,
            link_attribute_name: link_attribute_name.to_string(),
            attribute_names,
        }
    }

    pub fn get_owner_type_id(&self) -> i64 {
        self.owner_type_id
    }

    pub fn get_link_attribute_name(&self) -> &str {
        &self.link_attribute_name
    }

    pub fn get_attribute_names(&self) -> &BTreeSet<String> {
        &self.attribute_names
    }

    pub fn contains(&self, attribute_name: &str) -> bool {
        self.attribute_names.contains(attribute_name)
    }
}
