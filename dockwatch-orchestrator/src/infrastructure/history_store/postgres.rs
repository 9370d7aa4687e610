use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use tracing::{debug, info};
use uuid::Uuid;

use crate::domain::{
    HistoryStore, HistoryStoreError, InsertOutcome, NewScanRecord, RuntimeAnalysis, ScanId,
    ScanRecord, ScanRecordPatch, ScanStatus,
};

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

const RECORD_COLUMNS: &str = "id, image_name, scanned_at, status, error, image_digest, metadata, \
     container_id, start_timestamp, stop_timestamp, anomalous_activities_detected";

const MOST_RECENT_FIRST: &str = "ORDER BY scanned_at DESC, seq DESC";

/// PostgreSQL history store.
///
/// Conditional inserts rely on the partial unique indexes created by the
/// embedded migrations, so concurrent admissions across server instances
/// still insert at most one pending record per digest and one active
/// session per container.
#[derive(Clone)]
pub struct PgHistoryStore {
    pool: PgPool,
}

impl PgHistoryStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(
        database_url: &str,
        max_connections: u32,
        connect_timeout: Duration,
    ) -> Result<Self, HistoryStoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(connect_timeout)
            .connect(database_url)
            .await?;
        info!(max_connections, "Connected to history database");
        Ok(Self { pool })
    }

    pub async fn run_migrations(&self) -> Result<(), HistoryStoreError> {
        MIGRATOR
            .run(&self.pool)
            .await
            .map_err(|e| HistoryStoreError::Database(e.to_string()))?;
        info!("History database migrations applied");
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn insert_with_conflict(
        &self,
        record: NewScanRecord,
        on_conflict: &str,
    ) -> Result<Option<ScanRecord>, HistoryStoreError> {
        let (container_id, start_timestamp, stop_timestamp, activities) =
            split_runtime_analysis(record.runtime_analysis);

        let sql = format!(
            "INSERT INTO scan_records \
             (id, image_name, scanned_at, status, image_digest, metadata, \
              container_id, start_timestamp, stop_timestamp, anomalous_activities_detected) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) \
             {on_conflict} \
             RETURNING {RECORD_COLUMNS}"
        );

        let row = sqlx::query(&sql)
            .bind(ScanId::generate().as_uuid())
            .bind(&record.image_name)
            .bind(record.timestamp)
            .bind(record.status.as_str())
            .bind(&record.image_digest)
            .bind(&record.metadata)
            .bind(container_id)
            .bind(start_timestamp)
            .bind(stop_timestamp)
            .bind(activities)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(record_from_row).transpose()
    }

    async fn fetch_by_id(&self, id: ScanId) -> Result<Option<ScanRecord>, HistoryStoreError> {
        let sql = format!("SELECT {RECORD_COLUMNS} FROM scan_records WHERE id = $1");
        let row = sqlx::query(&sql)
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(record_from_row).transpose()
    }
}

type RuntimeColumns = (Option<String>, Option<f64>, Option<f64>, Option<Value>);

fn split_runtime_analysis(analysis: Option<RuntimeAnalysis>) -> RuntimeColumns {
    match analysis {
        Some(analysis) => (
            Some(analysis.container_id),
            Some(analysis.start_timestamp),
            analysis.stop_timestamp,
            analysis.anomalous_activities_detected,
        ),
        None => (None, None, None, None),
    }
}

fn record_from_row(row: &PgRow) -> Result<ScanRecord, HistoryStoreError> {
    let status: String = row.try_get("status")?;
    let status = status
        .parse::<ScanStatus>()
        .map_err(|e| HistoryStoreError::Corrupt(e.to_string()))?;

    let container_id: Option<String> = row.try_get("container_id")?;
    let runtime_analysis = match container_id {
        Some(container_id) => Some(RuntimeAnalysis {
            container_id,
            start_timestamp: row
                .try_get::<Option<f64>, _>("start_timestamp")?
                .ok_or_else(|| {
                    HistoryStoreError::Corrupt("monitoring record without start timestamp".into())
                })?,
            stop_timestamp: row.try_get("stop_timestamp")?,
            anomalous_activities_detected: row.try_get("anomalous_activities_detected")?,
        }),
        None => None,
    };

    Ok(ScanRecord {
        id: ScanId::from(row.try_get::<Uuid, _>("id")?),
        image_name: row.try_get("image_name")?,
        timestamp: row.try_get("scanned_at")?,
        status,
        error: row.try_get("error")?,
        image_digest: row.try_get("image_digest")?,
        metadata: row.try_get("metadata")?,
        runtime_analysis,
    })
}

#[async_trait]
impl HistoryStore for PgHistoryStore {
    async fn insert(&self, record: NewScanRecord) -> Result<ScanRecord, HistoryStoreError> {
        self.insert_with_conflict(record, "")
            .await?
            .ok_or_else(|| HistoryStoreError::Database("insert returned no row".to_string()))
    }

    async fn insert_image_scan_if_absent(
        &self,
        record: NewScanRecord,
    ) -> Result<InsertOutcome, HistoryStoreError> {
        let image_name = record.image_name.clone();
        let image_digest = record.image_digest.clone().unwrap_or_default();

        let inserted = self
            .insert_with_conflict(
                record,
                "ON CONFLICT (image_name, image_digest) \
                 WHERE image_digest IS NOT NULL AND status IN ('Analyzing', 'Completed') \
                 DO NOTHING",
            )
            .await?;
        if let Some(record) = inserted {
            return Ok(InsertOutcome::Inserted(record));
        }

        debug!(image_name = %image_name, "Pending analysis already recorded for digest");
        let sql = format!(
            "SELECT {RECORD_COLUMNS} FROM scan_records \
             WHERE image_name = $1 AND image_digest = $2 AND status IN ('Analyzing', 'Completed') \
             {MOST_RECENT_FIRST} LIMIT 1"
        );
        let row = sqlx::query(&sql)
            .bind(&image_name)
            .bind(&image_digest)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| {
                HistoryStoreError::Database("conflicting image scan vanished".to_string())
            })?;
        Ok(InsertOutcome::Existing(record_from_row(&row)?))
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

        let inserted = self
            .insert_with_conflict(
                record,
                "ON CONFLICT (container_id) WHERE status = 'Monitoring' DO NOTHING",
            )
            .await?;
        match inserted {
            Some(record) => Ok(InsertOutcome::Inserted(record)),
            None => self
                .find_started_monitoring(&container_id)
                .await?
                .map(InsertOutcome::Existing)
                .ok_or_else(|| {
                    HistoryStoreError::Database("conflicting session vanished".to_string())
                }),
        }
    }

    async fn update_by_id(
        &self,
        id: ScanId,
        patch: ScanRecordPatch,
    ) -> Result<ScanRecord, HistoryStoreError> {
        // Validate against the current row first for a precise error, then
        // let the WHERE clause guard against concurrent writers.
        let mut current = self
            .fetch_by_id(id)
            .await?
            .ok_or(HistoryStoreError::NotFound(id))?;
        current
            .apply(&patch)
            .map_err(|e| HistoryStoreError::InvalidUpdate {
                id,
                reason: e.to_string(),
            })?;

        let allowed_from: Option<Vec<String>> = patch.status.map(|target| {
            ScanStatus::sources_of(&target)
                .into_iter()
                .chain(std::iter::once(target))
                .map(|status| status.as_str().to_string())
                .collect()
        });

        let sql = format!(
            "UPDATE scan_records SET \
               status = COALESCE($2, status), \
               error = COALESCE($3, error), \
               stop_timestamp = COALESCE($4, stop_timestamp), \
               anomalous_activities_detected = COALESCE($5, anomalous_activities_detected) \
             WHERE id = $1 \
               AND ($6::text[] IS NULL OR status = ANY($6)) \
               AND ($4::float8 IS NULL OR (container_id IS NOT NULL AND stop_timestamp IS NULL)) \
             RETURNING {RECORD_COLUMNS}"
        );

        let row = sqlx::query(&sql)
            .bind(id.as_uuid())
            .bind(patch.status.map(|status| status.as_str()))
            .bind(&patch.error)
            .bind(patch.stop_timestamp)
            .bind(&patch.anomalous_activities_detected)
            .bind(allowed_from)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => record_from_row(&row),
            None => Err(HistoryStoreError::InvalidUpdate {
                id,
                reason: "record changed concurrently".to_string(),
            }),
        }
    }

    async fn find_by_image_and_digest(
        &self,
        image_name: &str,
        image_digest: &str,
    ) -> Result<Vec<ScanRecord>, HistoryStoreError> {
        let sql = format!(
            "SELECT {RECORD_COLUMNS} FROM scan_records \
             WHERE image_name = $1 AND image_digest = $2 {MOST_RECENT_FIRST}"
        );
        let rows = sqlx::query(&sql)
            .bind(image_name)
            .bind(image_digest)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(record_from_row).collect()
    }

    async fn find_started_monitoring(
        &self,
        container_id: &str,
    ) -> Result<Option<ScanRecord>, HistoryStoreError> {
        let sql = format!(
            "SELECT {RECORD_COLUMNS} FROM scan_records \
             WHERE container_id = $1 AND status = 'Monitoring' AND stop_timestamp IS NULL \
             {MOST_RECENT_FIRST} LIMIT 1"
        );
        let row = sqlx::query(&sql)
            .bind(container_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(record_from_row).transpose()
    }

    async fn find_history(
        &self,
        image_name: &str,
        id: Option<ScanId>,
    ) -> Result<Vec<ScanRecord>, HistoryStoreError> {
        let sql = format!(
            "SELECT {RECORD_COLUMNS} FROM scan_records \
             WHERE image_name = $1 AND ($2::uuid IS NULL OR id = $2) {MOST_RECENT_FIRST}"
        );
        let rows = sqlx::query(&sql)
            .bind(image_name)
            .bind(id.map(|id| id.as_uuid()))
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(record_from_row).collect()
    }
}
