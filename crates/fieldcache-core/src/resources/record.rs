use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::utils::{contains_ignore_case, scalar_text};

/// Fields the store assigns itself; caller-supplied values are ignored.
pub const SERVER_FIELDS: &[&str] = &["id", "created_at", "updated_at"];

pub const DEFAULT_PER_PAGE: usize = 10;

/// One entity in a collection. Everything but the identity and timestamps
/// is an opaque payload the store returns unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: u64,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Record {
    pub fn new(id: u64, fields: Map<String, Value>) -> Self {
        Self {
            id,
            fields: without_server_fields(fields),
            created_at: Utc::now(),
            updated_at: None,
        }
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.fields.get(field).and_then(Value::as_str)
    }

    /// Overlay `patch` onto the payload and stamp the update time.
    pub fn merge(&mut self, patch: Map<String, Value>) {
        for (key, value) in without_server_fields(patch) {
            self.fields.insert(key, value);
        }
        self.updated_at = Some(Utc::now());
    }

    /// Case-insensitive substring match over `fields`, or over every scalar
    /// field of the payload when `fields` is `None`.
    pub fn matches_search(&self, query: &str, fields: Option<&[String]>) -> bool {
        let query = query.trim();
        if query.is_empty() {
            return true;
        }
        let matches = |value: &Value| {
            scalar_text(value)
                .map(|text| contains_ignore_case(&text, query))
                .unwrap_or(false)
        };
        match fields {
            Some(fields) => fields
                .iter()
                .filter_map(|f| self.fields.get(f))
                .any(matches),
            None => self.fields.values().any(matches),
        }
    }
}

pub(crate) fn without_server_fields(mut fields: Map<String, Value>) -> Map<String, Value> {
    for key in SERVER_FIELDS {
        fields.remove(*key);
    }
    fields
}

/// Parameters of a `list` call. `page` and `per_page` are clamped to >= 1.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListQuery {
    pub search: Option<String>,
    pub page: usize,
    pub per_page: usize,
}

impl Default for ListQuery {
    fn default() -> Self {
        Self {
            search: None,
            page: 1,
            per_page: DEFAULT_PER_PAGE,
        }
    }
}

impl ListQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn search(mut self, search: impl Into<String>) -> Self {
        self.search = Some(search.into());
        self
    }

    pub fn page(mut self, page: usize) -> Self {
        self.page = page;
        self
    }

    pub fn per_page(mut self, per_page: usize) -> Self {
        self.per_page = per_page;
        self
    }
}

/// One page of a filtered collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: usize,
    pub total_pages: usize,
    pub per_page: usize,
    /// Size of the filtered set, not of the page
    pub total: usize,
}

impl<T> Page<T> {
    /// Slice `[(page-1)*per_page, page*per_page)` out of `items`.
    pub fn from_filtered(items: Vec<T>, page: usize, per_page: usize) -> Self {
        let page = page.max(1);
        let per_page = per_page.max(1);
        let total = items.len();
        let total_pages = total.div_ceil(per_page);

        let start = (page - 1).saturating_mul(per_page);
        let items = if start >= total {
            Vec::new()
        } else {
            items.into_iter().skip(start).take(per_page).collect()
        };

        Self {
            items,
            page,
            total_pages,
            per_page,
            total,
        }
    }

    pub fn has_next(&self) -> bool {
        self.page < self.total_pages
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fields(value: Value) -> Map<String, Value> {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_record_serializes_flat() {
        let record = Record::new(3, fields(json!({ "name": "Amina", "village": "Dala" })));
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["id"], 3);
        assert_eq!(value["name"], "Amina");
        assert!(value.get("updated_at").is_none());

        let back: Record = serde_json::from_value(value).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn test_record_strips_server_fields() {
        let record = Record::new(1, fields(json!({ "id": 99, "created_at": "x", "name": "A" })));
        assert_eq!(record.id, 1);
        assert!(record.get("id").is_none());
        assert!(record.get("created_at").is_none());
    }

    #[test]
    fn test_merge_overlays_and_stamps() {
        let mut record = Record::new(1, fields(json!({ "name": "A", "group": "G1" })));
        record.merge(fields(json!({ "group": "G2", "id": 50 })));
        assert_eq!(record.id, 1);
        assert_eq!(record.get_str("group"), Some("G2"));
        assert_eq!(record.get_str("name"), Some("A"));
        assert!(record.updated_at.is_some());
    }

    #[test]
    fn test_matches_search() {
        let record = Record::new(1, fields(json!({ "name": "Amina Okafor", "plots": 4, "tags": ["maize"] })));
        assert!(record.matches_search("OKAF", None));
        assert!(record.matches_search("4", None));
        assert!(!record.matches_search("maize", None));
        assert!(record.matches_search("  ", None));

        let name_only = vec!["name".to_string()];
        assert!(!record.matches_search("4", Some(&name_only)));
        assert!(record.matches_search("amina", Some(&name_only)));
    }

    #[test]
    fn test_page_slicing() {
        let page = Page::from_filtered((1..=25).collect::<Vec<_>>(), 3, 10);
        assert_eq!(page.items, vec![21, 22, 23, 24, 25]);
        assert_eq!(page.total_pages, 3);
        assert_eq!(page.total, 25);
        assert!(!page.has_next());
    }

    #[test]
    fn test_page_clamps() {
        let page = Page::from_filtered(vec![1, 2, 3], 0, 0);
        assert_eq!(page.page, 1);
        assert_eq!(page.per_page, 1);
        assert_eq!(page.items, vec![1]);
        assert_eq!(page.total_pages, 3);
    }

    #[test]
    fn test_page_past_end_is_empty() {
        let page = Page::from_filtered(vec![1, 2, 3], 5, 2);
        assert!(page.items.is_empty());
        assert_eq!(page.total_pages, 2);

        let empty: Page<i32> = Page::from_filtered(Vec::new(), 1, 10);
        assert_eq!(empty.total_pages, 0);
        assert_eq!(empty.total, 0);
    }
}
