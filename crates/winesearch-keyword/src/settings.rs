use serde::Serialize;

use winesearch_core::query::FilterField;
use winesearch_core::text::TextField;

/// Attribute settings applied by `ensure_schema`. Filters on undeclared
/// attributes are rejected, as is sorting on undeclared ones.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexSettings {
    pub primary_key: &'static str,
    pub searchable_attributes: Vec<TextField>,
    pub filterable_attributes: Vec<FilterField>,
    pub sortable_attributes: Vec<FilterField>,
}

impl Default for IndexSettings {
    fn default() -> Self {
        Self {
            primary_key: "id",
            searchable_attributes: vec![
                TextField::Title,
                TextField::Description,
                TextField::Variety,
                TextField::Country,
                TextField::Province,
                TextField::Winery,
            ],
            filterable_attributes: vec![
                FilterField::Id,
                FilterField::Country,
                FilterField::Province,
                FilterField::Variety,
                FilterField::Winery,
                FilterField::TasterName,
                FilterField::Points,
                FilterField::Price,
            ],
            sortable_attributes: vec![FilterField::Points, FilterField::Price],
        }
    }
}

impl IndexSettings {
    pub fn is_filterable(&self, field: FilterField) -> bool {
        self.filterable_attributes.contains(&field)
    }

    pub fn is_sortable(&self, field: FilterField) -> bool {
        self.sortable_attributes.contains(&field)
    }
}
