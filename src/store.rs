use std::collections::{BTreeSet, HashMap, HashSet};

use async_trait::async_trait;

use crate::error::AppResult;
use crate::models::{FilterOptions, ScholarPage, ScholarRecord};
use crate::query::ScholarQuery;

/// Read side of the scholar collection shared by the HTTP handlers and the
/// report command.
#[async_trait]
pub trait ScholarStore: Send + Sync {
    /// One page of card projections plus the total match count, taken from a
    /// single evaluation of the query.
    async fn list(&self, query: &ScholarQuery) -> AppResult<ScholarPage>;

    async fn get(&self, id: &str) -> AppResult<ScholarRecord>;

    /// Unknown ids are omitted. Results follow the order of `ids`.
    async fn batch(&self, ids: &[String]) -> AppResult<Vec<ScholarRecord>>;

    async fn filter_options(&self) -> AppResult<FilterOptions>;

    async fn all(&self) -> AppResult<Vec<ScholarRecord>>;
}

/// Deduplicated ids, first occurrence wins.
pub fn unique_ids(ids: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    ids.iter()
        .filter(|id| seen.insert(id.as_str()))
        .cloned()
        .collect()
}

/// Reorders `records` to follow `ids`, dropping ids with no record.
pub fn in_request_order(ids: &[String], records: Vec<ScholarRecord>) -> Vec<ScholarRecord> {
    let mut by_id: HashMap<String, ScholarRecord> = records
        .into_iter()
        .map(|record| (record.id.clone(), record))
        .collect();

    unique_ids(ids)
        .iter()
        .filter_map(|id| by_id.remove(id))
        .collect()
}

/// Distinct non-empty values in lexicographic order.
pub fn sorted_distinct<'a>(values: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    values
        .into_iter()
        .filter(|value| !value.is_empty())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str) -> ScholarRecord {
        serde_json::from_value(serde_json::json!({ "id": id })).unwrap()
    }

    #[test]
    fn request_order_is_preserved_and_unknown_ids_dropped() {
        let ids = vec![
            "c".to_string(),
            "missing".to_string(),
            "a".to_string(),
            "c".to_string(),
        ];
        let ordered = in_request_order(&ids, vec![record("a"), record("c")]);
        let ids: Vec<_> = ordered.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["c", "a"]);
    }

    #[test]
    fn distinct_values_are_sorted_and_skip_empty() {
        let values = sorted_distinct(["MD-Medicine", "", "EG-CS", "MD-Medicine"]);
        assert_eq!(values, vec!["EG-CS", "MD-Medicine"]);
    }
}
