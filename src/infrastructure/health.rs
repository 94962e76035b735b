//! Diagnostics health log
//!
//! Fire-and-forget by contract: every error raised while recording is
//! swallowed, so a broken diagnostics sink can never take the pipeline down.

use async_trait::async_trait;
use chrono::Utc;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::params;

use crate::pipeline::{HealthLogger, Severity};

/// Writes diagnostics into the `system_health` table, deduplicating on
/// unresolved alerts for the same (organization, service) pair
pub struct SqliteHealthLogger {
    pool: Pool<SqliteConnectionManager>,
}

impl SqliteHealthLogger {
    pub fn new(pool: Pool<SqliteConnectionManager>) -> Self {
        Self { pool }
    }

    fn try_record(
        &self,
        organization_id: &str,
        service: &str,
        message: &str,
        severity: Severity,
    ) -> Result<(), rusqlite::Error> {
        let conn = self
            .pool
            .get()
            .map_err(|e| rusqlite::Error::ModuleError(e.to_string()))?;

        let unresolved: i64 = conn.query_row(
            "SELECT COUNT(*) FROM system_health
             WHERE organization_id = ?1 AND service = ?2 AND resolved_at IS NULL",
            params![organization_id, service],
            |row| row.get(0),
        )?;
        if unresolved > 0 {
            return Ok(());
        }

        conn.execute(
            "INSERT INTO system_health (organization_id, service, message, severity, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                organization_id,
                service,
                message,
                severity.as_str(),
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }
}

#[async_trait]
impl HealthLogger for SqliteHealthLogger {
    async fn record(
        &self,
        organization_id: &str,
        service: &str,
        message: &str,
        severity: Severity,
    ) {
        if let Err(err) = self.try_record(organization_id, service, message, severity) {
            tracing::debug!(service, error = %err, "health log write failed");
        }
    }
}

/// No-op sink for tests and deployments without diagnostics
pub struct NoopHealthLogger;

#[async_trait]
impl HealthLogger for NoopHealthLogger {
    async fn record(&self, _org: &str, _service: &str, _message: &str, _severity: Severity) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::repository::SqliteJobRepository;
    use tempfile::TempDir;

    fn logger() -> (SqliteHealthLogger, Pool<SqliteConnectionManager>, TempDir) {
        let dir = TempDir::new().unwrap();
        let repo = SqliteJobRepository::open(dir.path().join("wrapflow.db")).unwrap();
        let pool = repo.pool();
        (SqliteHealthLogger::new(pool.clone()), pool, dir)
    }

    fn count(pool: &Pool<SqliteConnectionManager>) -> i64 {
        pool.get()
            .unwrap()
            .query_row("SELECT COUNT(*) FROM system_health", [], |row| row.get(0))
            .unwrap()
    }

    #[tokio::test]
    async fn test_record_inserts_once_per_unresolved_service() {
        let (logger, pool, _dir) = logger();
        logger
            .record("org-1", "render-submit", "provider down", Severity::Error)
            .await;
        assert_eq!(count(&pool), 1);

        // Same unresolved (org, service) pair is deduplicated
        logger
            .record("org-1", "render-submit", "still down", Severity::Error)
            .await;
        assert_eq!(count(&pool), 1);

        // A different service gets its own row
        logger
            .record("org-1", "render-storage", "bucket missing", Severity::Error)
            .await;
        assert_eq!(count(&pool), 2);
    }

    #[tokio::test]
    async fn test_resolved_alerts_allow_new_rows() {
        let (logger, pool, _dir) = logger();
        logger
            .record("org-1", "render-submit", "provider down", Severity::Error)
            .await;
        pool.get()
            .unwrap()
            .execute(
                "UPDATE system_health SET resolved_at = ?1",
                params![Utc::now().to_rfc3339()],
            )
            .unwrap();

        logger
            .record("org-1", "render-submit", "down again", Severity::Error)
            .await;
        assert_eq!(count(&pool), 2);
    }
}
