//! Local-first reads over stored records.
//!
//! Records are fetched from storage once; filtering, text search and
//! pagination happen here, on the device, with no server round trip.

use crate::LocalRecord;
use serde::{Deserialize, Serialize};

/// Look up a dotted path (`emergencyContact.phoneNumber`) in a payload.
pub fn field_value<'a>(payload: &'a serde_json::Value, path: &str) -> Option<&'a serde_json::Value> {
    path.split('.')
        .try_fold(payload, |value, segment| value.get(segment))
}

/// One page of results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub data: Vec<T>,
    /// Matching records across all pages
    pub total: usize,
    /// 1-based page number
    pub page: usize,
    pub limit: usize,
    pub total_pages: usize,
}

/// Builder for querying a set of records.
#[derive(Debug)]
pub struct Query<'a> {
    records: &'a [LocalRecord],
    include_deleted: bool,
    text: Option<(String, Vec<String>)>,
    filters: Vec<(String, serde_json::Value)>,
}

impl<'a> Query<'a> {
    pub fn new(records: &'a [LocalRecord]) -> Self {
        Self {
            records,
            include_deleted: false,
            text: None,
            filters: Vec::new(),
        }
    }

    /// Include tombstoned records in results.
    pub fn include_deleted(mut self) -> Self {
        self.include_deleted = true;
        self
    }

    /// Case-insensitive substring search.
    ///
    /// With no `fields` the whole payload is searched. A blank query matches
    /// everything.
    pub fn search(mut self, query: &str, fields: &[&str]) -> Self {
        let query = query.trim().to_lowercase();
        if !query.is_empty() {
            let fields = fields.iter().map(|f| f.to_string()).collect();
            self.text = Some((query, fields));
        }
        self
    }

    /// Require a field to match.
    ///
    /// String values match case-insensitively as substrings, other values by
    /// equality. Null and empty-string filters are ignored.
    pub fn filter(mut self, field: impl Into<String>, value: serde_json::Value) -> Self {
        let ignored = value.is_null() || value.as_str().is_some_and(str::is_empty);
        if !ignored {
            self.filters.push((field.into(), value));
        }
        self
    }

    /// Add every entry of a JSON object as a filter.
    pub fn filters(self, filters: &serde_json::Map<String, serde_json::Value>) -> Self {
        filters
            .iter()
            .fold(self, |query, (field, value)| query.filter(field.clone(), value.clone()))
    }

    fn matches(&self, record: &LocalRecord) -> bool {
        if record.deleted && !self.include_deleted {
            return false;
        }

        if let Some((text, fields)) = &self.text {
            let hit = if fields.is_empty() {
                record.payload.to_string().to_lowercase().contains(text)
            } else {
                fields.iter().any(|field| {
                    field_value(&record.payload, field)
                        .and_then(value_text)
                        .is_some_and(|value| value.to_lowercase().contains(text))
                })
            };
            if !hit {
                return false;
            }
        }

        self.filters.iter().all(|(field, expected)| {
            let Some(actual) = field_value(&record.payload, field) else {
                return false;
            };
            match expected.as_str() {
                Some(needle) => value_text(actual)
                    .is_some_and(|hay| hay.to_lowercase().contains(&needle.to_lowercase())),
                None => actual == expected,
            }
        })
    }

    /// Get all matching records.
    pub fn all(&self) -> Vec<&'a LocalRecord> {
        self.records.iter().filter(|r| self.matches(r)).collect()
    }

    /// Count matching records.
    pub fn count(&self) -> usize {
        self.records.iter().filter(|r| self.matches(r)).count()
    }

    /// Get one page of matching records. Pages start at 1; page 0 is read as
    /// page 1 and a zero limit as 1.
    pub fn page(&self, page: usize, limit: usize) -> Page<LocalRecord> {
        let page = page.max(1);
        let limit = limit.max(1);
        let matching = self.all();
        let total = matching.len();

        let data = matching
            .into_iter()
            .skip((page - 1).saturating_mul(limit))
            .take(limit)
            .cloned()
            .collect();

        Page {
            data,
            total,
            page,
            limit,
            total_pages: total.div_ceil(limit),
        }
    }
}

/// Text form of a scalar value, for substring matching.
fn value_text(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        serde_json::Value::Bool(b) => Some(b.to_string()),
        serde_json::Value::Null => None,
        other => Some(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn records() -> Vec<LocalRecord> {
        let mut deleted = LocalRecord::new(
            "patients",
            "p-4",
            json!({"name": "Yaw Boateng", "status": "active"}),
        );
        deleted.mark_deleted(5_000);

        vec![
            LocalRecord::new(
                "patients",
                "p-1",
                json!({
                    "name": "Ama Mensah",
                    "email": "ama@example.com",
                    "status": "active",
                    "age": 34,
                    "emergencyContact": {"phoneNumber": "0244000111"}
                }),
            ),
            LocalRecord::new(
                "patients",
                "p-2",
                json!({"name": "Kofi Owusu", "email": "kofi@example.com", "status": "discharged", "age": 51}),
            ),
            LocalRecord::new(
                "patients",
                "p-3",
                json!({"name": "Akosua Mensah", "status": "active", "age": 34}),
            ),
            deleted,
        ]
    }

    fn ids(records: Vec<&LocalRecord>) -> Vec<&str> {
        records.into_iter().map(|r| r.id.as_str()).collect()
    }

    #[test]
    fn query_all_skips_deleted() {
        let records = records();
        assert_eq!(ids(Query::new(&records).all()), vec!["p-1", "p-2", "p-3"]);
        assert_eq!(Query::new(&records).include_deleted().count(), 4);
    }

    #[test]
    fn search_whole_payload() {
        let records = records();
        let hits = Query::new(&records).search("MENSAH", &[]).all();
        assert_eq!(ids(hits), vec!["p-1", "p-3"]);
    }

    #[test]
    fn search_specific_fields() {
        let records = records();
        let hits = Query::new(&records)
            .search("0244", &["phoneNumber", "emergencyContact.phoneNumber"])
            .all();
        assert_eq!(ids(hits), vec!["p-1"]);

        let hits = Query::new(&records).search("example", &["name"]).all();
        assert!(hits.is_empty());
    }

    #[test]
    fn blank_search_matches_everything() {
        let records = records();
        assert_eq!(Query::new(&records).search("   ", &["name"]).count(), 3);
    }

    #[test]
    fn filters_string_and_exact() {
        let records = records();
        let hits = Query::new(&records)
            .filter("status", json!("ACT"))
            .filter("age", json!(34))
            .all();
        assert_eq!(ids(hits), vec!["p-1", "p-3"]);

        let hits = Query::new(&records)
            .filter("status", json!(""))
            .filter("ward", json!(null))
            .all();
        assert_eq!(hits.len(), 3);
    }

    #[test]
    fn filters_from_object() {
        let records = records();
        let filters = json!({"status": "discharged"});
        let hits = Query::new(&records)
            .filters(filters.as_object().unwrap())
            .all();
        assert_eq!(ids(hits), vec!["p-2"]);
    }

    #[test]
    fn pagination() {
        let records = records();
        let page = Query::new(&records).page(2, 2);

        assert_eq!(page.total, 3);
        assert_eq!(page.total_pages, 2);
        assert_eq!(page.page, 2);
        assert_eq!(page.data.len(), 1);
        assert_eq!(page.data[0].id, "p-3");
    }

    #[test]
    fn pagination_past_end_is_empty() {
        let records = records();
        let page = Query::new(&records).page(9, 10);
        assert!(page.data.is_empty());
        assert_eq!(page.total_pages, 1);
    }

    #[test]
    fn pagination_normalizes_zero() {
        let records = records();
        let page = Query::new(&records).page(0, 0);
        assert_eq!(page.page, 1);
        assert_eq!(page.limit, 1);
        assert_eq!(page.total_pages, 3);
    }

    #[test]
    fn dotted_paths() {
        let payload = json!({"a": {"b": {"c": 1}}});
        assert_eq!(field_value(&payload, "a.b.c"), Some(&json!(1)));
        assert_eq!(field_value(&payload, "a.x"), None);
    }
}
