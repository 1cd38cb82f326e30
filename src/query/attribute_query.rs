/*  This file is part of OneModel, a program to manage knowledge.
    Copyright in each year of 2025-2026 inclusive, Luke A. Call.
    OneModel is free software, distributed under a license that includes honesty, the Golden Rule,
    and the GNU Affero General Public License as published by the Free Software Foundation;
    see the file LICENSE for license version and details.
    OneModel is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranty of
    MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU Affero General Public License for more details.
    You should have received a copy of the GNU Affero General Public License along with OneModel.  If not, see <http://www.gnu.org/licenses/>
*/
use crate::query::builder::QueryDefinition;

/// Selects one attribute of the instances a definition finds.  Never run on its own: it is
/// compiled into the statement that uses it, as an inline subquery.
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeQuery {
    definition: QueryDefinition,
    attribute: String,
}

impl AttributeQuery {
    pub fn new(definition: QueryDefinition, attribute: &str) -> AttributeQuery {
        AttributeQuery {
            definition,
            attribute: attribute.to_string(),
        }
    }

    pub fn get_definition(&self) -> &QueryDefinition {
        &self.definition
    }

    pub fn get_attribute(&self) -> &str {
        &self.attribute
    }
}
