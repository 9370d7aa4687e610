use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::{
    HistoryStore, HistoryStoreError, InsertOutcome, NewScanRecord, ScanId, ScanRecord,
    ScanRecordPatch,
};

/// Process-local history store. Conditional inserts hold the write lock
/// across check and insert.
#[derive(Debug, Default)]
pub struct InMemoryHistoryStore {
    // Insertion order
    records: RwLock<Vec<ScanRecord>>,
}

impl InMemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

/// Most recent first: newest timestamp, ties broken by latest insertion.
fn most_recent_first<'a>(records: impl DoubleEndedIterator<Item = &'a ScanRecord>) -> Vec<ScanRecord> {
    let mut selected: Vec<ScanRecord> = records.rev().cloned().collect();
    // Stable sort keeps the reversed insertion order for equal timestamps
    selected.sort_by(|a, b| b.timestamp.total_cmp(&a.timestamp));
    selected
}

fn blocks_image_scan(existing: &ScanRecord, candidate: &NewScanRecord) -> bool {
    existing.image_name == candidate.image_name
        && existing.image_digest.is_some()
        && existing.image_digest == candidate.image_digest
        && existing.satisfies_cache_lookup()
}

#[async_trait]
impl HistoryStore for InMemoryHistoryStore {
    async fn insert(&self, record: NewScanRecord) -> Result<ScanRecord, HistoryStoreError> {
        let stored = record.into_record(ScanId::generate());
        self.records.write().await.push(stored.clone());
        Ok(stored)
    }

    async fn insert_image_scan_if_absent(
        &self,
        record: NewScanRecord,
    ) -> Result<InsertOutcome, HistoryStoreError> {
        let mut records = self.records.write().await;

        let existing = most_recent_first(
            records
                .iter()
                .filter(|existing| blocks_image_scan(existing, &record)),
        );
        if let Some(existing) = existing.into_iter().next() {
            return Ok(InsertOutcome::Existing(existing));
        }

        let stored = record.into_record(ScanId::generate());
        records.push(stored.clone());
        Ok(InsertOutcome::Inserted(stored))
    }

    async fn insert_monitoring_if_absent(
        &self,
        record: NewScanRecord,
    ) -> Result<InsertOutcome, HistoryStoreError> {
        let container_id = record
            .runtime_analysis
            .as_ref()
            .map(|analysis| analysis.container_id.clone())
            .ok_or_else(|| {
                HistoryStoreError::Corrupt("monitoring record without runtime analysis".to_string())
            })?;

        let mut records = self.records.write().await;
        if let Some(existing) = records.iter().find(|existing| {
            existing.is_started_monitoring() && existing.container_id() == Some(container_id.as_str())
        }) {
            return Ok(InsertOutcome::Existing(existing.clone()));
        }

        let stored = record.into_record(ScanId::generate());
        records.push(stored.clone());
        Ok(InsertOutcome::Inserted(stored))
    }

    async fn update_by_id(
        &self,
        id: ScanId,
        patch: ScanRecordPatch,
    ) -> Result<ScanRecord, HistoryStoreError> {
        let mut records = self.records.write().await;
        let record = records
            .iter_mut()
            .find(|record| record.id == id)
            .ok_or(HistoryStoreError::NotFound(id))?;

        record
            .apply(&patch)
            .map_err(|e| HistoryStoreError::InvalidUpdate {
                id,
                reason: e.to_string(),
            })?;
        Ok(record.clone())
    }

    async fn find_by_image_and_digest(
        &self,
        image_name: &str,
        image_digest: &str,
    ) -> Result<Vec<ScanRecord>, HistoryStoreError> {
        let records = self.records.read().await;
        Ok(most_recent_first(records.iter().filter(|record| {
            record.image_name == image_name && record.image_digest.as_deref() == Some(image_digest)
        })))
    }

    async fn find_started_monitoring(
        &self,
        container_id: &str,
    ) -> Result<Option<ScanRecord>, HistoryStoreError> {
        let records = self.records.read().await;
        Ok(most_recent_first(records.iter().filter(|record| {
            record.is_started_monitoring() && record.container_id() == Some(container_id)
        }))
        .into_iter()
        .next())
    }

    async fn find_history(
        &self,
        image_name: &str,
        id: Option<ScanId>,
    ) -> Result<Vec<ScanRecord>, HistoryStoreError> {
        let records = self.records.read().await;
        Ok(most_recent_first(records.iter().filter(|record| {
            record.image_name == image_name && id.is_none_or(|id| record.id == id)
        })))
    }
}
