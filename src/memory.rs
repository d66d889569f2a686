use std::path::Path;

use anyhow::Context;
use async_trait::async_trait;
use tracing::info;

use crate::error::{AppError, AppResult};
use crate::ingest;
use crate::models::{FilterOptions, ScholarPage, ScholarRecord};
use crate::query::{total_pages, ScholarQuery, PAGE_SIZE};
use crate::store::{in_request_order, sorted_distinct, ScholarStore};

/// Static snapshot of the collection held in memory, used when no database
/// is configured. Records are kept in listing order.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    records: Vec<ScholarRecord>,
}

impl MemoryStore {
    pub fn new(mut records: Vec<ScholarRecord>) -> Self {
        records.sort_by(|a, b| {
            b.relevance_score
                .cmp(&a.relevance_score)
                .then_with(|| a.id.cmp(&b.id))
        });
        Self { records }
    }

    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let records = ingest::read_json(path)
            .with_context(|| format!("failed to load static scholar data from {}", path.display()))?;
        let store = Self::new(records);
        info!(path = %path.display(), scholars = store.len(), "loaded static scholar data");
        Ok(store)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }
}

#[async_trait]
impl ScholarStore for MemoryStore {
    async fn list(&self, query: &ScholarQuery) -> AppResult<ScholarPage> {
        let matched: Vec<&ScholarRecord> = self
            .records
            .iter()
            .filter(|record| query.matches(record))
            .collect();
        let total = matched.len() as i64;

        let data = matched
            .into_iter()
            .skip(query.offset() as usize)
            .take(PAGE_SIZE as usize)
            .map(ScholarRecord::to_card)
            .collect();

        Ok(ScholarPage {
            data,
            total,
            page: query.page,
            total_pages: total_pages(total),
        })
    }

    async fn get(&self, id: &str) -> AppResult<ScholarRecord> {
        self.records
            .iter()
            .find(|record| record.id == id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(id.to_string()))
    }

    async fn batch(&self, ids: &[String]) -> AppResult<Vec<ScholarRecord>> {
        let found = self
            .records
            .iter()
            .filter(|record| ids.contains(&record.id))
            .cloned()
            .collect();
        Ok(in_request_order(ids, found))
    }

    async fn filter_options(&self) -> AppResult<FilterOptions> {
        Ok(FilterOptions {
            departments: sorted_distinct(self.records.iter().map(|r| r.department.as_str())),
            positions: sorted_distinct(self.records.iter().map(|r| r.position.as_str())),
        })
    }

    async fn all(&self) -> AppResult<Vec<ScholarRecord>> {
        Ok(self.records.clone())
    }
}
