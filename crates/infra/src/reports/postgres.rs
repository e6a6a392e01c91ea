//! Postgres-backed report store.
//!
//! One row per run in `inventory_discrepancy_reports`. The summary columns
//! (date, totals, per-source item counts) are queryable on their own; the
//! full report, source-only lists included, is kept as `jsonb`.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PersistError |
//! |------------|--------------|
//! | PoolClosed / Io / PoolTimedOut | `Unavailable` |
//! | Database (any code) | `Database` |
//! | Other | `Database` |

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tracing::{info, instrument};
use uuid::Uuid;

use stockrecon_core::{ReportId, RunId};
use stockrecon_inventory::DiscrepancyReport;

use super::{PersistError, ReportRecord, ReportStore, StoredReport};

const CREATE_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS inventory_discrepancy_reports (
    id                   UUID PRIMARY KEY,
    run_id               UUID NOT NULL,
    report_date          DATE NOT NULL,
    total_discrepancies  BIGINT NOT NULL,
    discrepancies        JSONB NOT NULL,
    source_a_item_count  BIGINT NOT NULL,
    source_b_item_count  BIGINT NOT NULL,
    report               JSONB NOT NULL,
    created_at           TIMESTAMPTZ NOT NULL
)
"#;

const CREATE_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS inventory_discrepancy_reports_created_at_idx
    ON inventory_discrepancy_reports (created_at DESC)
"#;

#[derive(Debug, Clone)]
pub struct PostgresReportStore {
    pool: Arc<PgPool>,
}

#[derive(Debug)]
struct ReportRow {
    id: Uuid,
    run_id: Uuid,
    report: serde_json::Value,
    created_at: DateTime<Utc>,
}

impl<'r> sqlx::FromRow<'r, PgRow> for ReportRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(ReportRow {
            id: row.try_get("id")?,
            run_id: row.try_get("run_id")?,
            report: row.try_get("report")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

impl ReportRow {
    fn into_stored(self) -> Result<StoredReport, PersistError> {
        let report: DiscrepancyReport = serde_json::from_value(self.report)
            .map_err(|e| PersistError::Serialization(format!("stored report {} is unreadable: {e}", self.id)))?;

        Ok(StoredReport {
            id: ReportId::from_uuid(self.id),
            run_id: RunId::from_uuid(self.run_id),
            created_at: self.created_at,
            report,
        })
    }
}

impl PostgresReportStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    pub async fn connect(database_url: &str) -> Result<Self, PersistError> {
        let pool = PgPool::connect(database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool))
    }

    /// Create the reports table if it does not exist yet.
    pub async fn ensure_schema(&self) -> Result<(), PersistError> {
        for statement in [CREATE_TABLE, CREATE_INDEX] {
            sqlx::query(statement)
                .execute(&*self.pool)
                .await
                .map_err(|e| map_sqlx_error("ensure_schema", e))?;
        }
        Ok(())
    }
}

#[async_trait]
impl ReportStore for PostgresReportStore {
    #[instrument(skip(self, record), fields(run_id = %record.run_id), err)]
    async fn persist(&self, record: &ReportRecord) -> Result<ReportId, PersistError> {
        let id = ReportId::new();
        let report = &record.report;

        let discrepancies = serde_json::to_value(&report.discrepancies)
            .map_err(|e| PersistError::Serialization(e.to_string()))?;
        let full = serde_json::to_value(report).map_err(|e| PersistError::Serialization(e.to_string()))?;

        sqlx::query(
            r#"
            INSERT INTO inventory_discrepancy_reports (
                id,
                run_id,
                report_date,
                total_discrepancies,
                discrepancies,
                source_a_item_count,
                source_b_item_count,
                report,
                created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(id.as_uuid())
        .bind(record.run_id.as_uuid())
        .bind(report.date)
        .bind(report.total_discrepancies as i64)
        .bind(discrepancies)
        .bind(report.source_item_counts.source_a as i64)
        .bind(report.source_item_counts.source_b as i64)
        .bind(full)
        .bind(record.created_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("persist", e))?;

        info!(report_id = %id, total_discrepancies = report.total_discrepancies, "report persisted");
        Ok(id)
    }

    #[instrument(skip(self), err)]
    async fn latest(&self) -> Result<Option<StoredReport>, PersistError> {
        let row = sqlx::query_as::<_, ReportRow>(
            r#"
            SELECT id, run_id, report, created_at
            FROM inventory_discrepancy_reports
            ORDER BY created_at DESC, id DESC
            LIMIT 1
            "#,
        )
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("latest", e))?;

        row.map(ReportRow::into_stored).transpose()
    }
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> PersistError {
    match err {
        sqlx::Error::PoolClosed | sqlx::Error::PoolTimedOut => {
            PersistError::Unavailable(format!("connection pool unavailable in {operation}"))
        }
        sqlx::Error::Io(e) => PersistError::Unavailable(format!("io error in {operation}: {e}")),
        sqlx::Error::Database(db_err) => {
            PersistError::Database(format!("database error in {operation}: {}", db_err.message()))
        }
        other => PersistError::Database(format!("sqlx error in {operation}: {other}")),
    }
}
