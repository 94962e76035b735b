//! SQLite-backed job repository
//!
//! Owns every job row and the per-organization render settings. The batch
//! insert runs in one transaction so a render request is persisted all or
//! nothing, and job updates carry a status guard so a stale reconciliation
//! can never overwrite a terminal row.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, Row};
use rusqlite_migration::{Migrations, M};
use std::path::Path;
use std::str::FromStr;
use uuid::Uuid;

use crate::pipeline::{
    GenerationJob, JobRepository, JobStatus, JobUpdate, MockupJob, MockupStatus, MockupTemplate,
    MockupUpdate, RenderError, RenderSettings, VariantParams,
};

static MIGRATIONS: Lazy<Migrations<'static>> = Lazy::new(|| {
    Migrations::new(vec![M::up(
        r#"
        CREATE TABLE render_jobs (
            id               TEXT PRIMARY KEY,
            parent_entity_id TEXT NOT NULL,
            organization_id  TEXT NOT NULL,
            created_by       TEXT NOT NULL,
            external_job_id  TEXT,
            status           TEXT NOT NULL,
            prompt           TEXT NOT NULL,
            lighting         TEXT NOT NULL,
            background       TEXT NOT NULL,
            angle            TEXT NOT NULL,
            multi_angle      INTEGER NOT NULL DEFAULT 0,
            angle_set_id     TEXT,
            custom_background TEXT,
            source_photo_url TEXT,
            result_url       TEXT,
            version          INTEGER NOT NULL,
            cost_estimate    REAL NOT NULL,
            failure_note     TEXT,
            created_at       TEXT NOT NULL,
            updated_at       TEXT NOT NULL
        );
        CREATE INDEX idx_render_jobs_parent ON render_jobs(parent_entity_id);
        CREATE INDEX idx_render_jobs_external ON render_jobs(external_job_id);

        CREATE TABLE mockup_jobs (
            id               TEXT PRIMARY KEY,
            organization_id  TEXT NOT NULL,
            parent_entity_id TEXT,
            template_id      TEXT NOT NULL,
            status           TEXT NOT NULL,
            prompt           TEXT,
            flat_design_url  TEXT,
            final_result_url TEXT,
            failure_note     TEXT,
            created_at       TEXT NOT NULL,
            updated_at       TEXT NOT NULL
        );

        CREATE TABLE render_settings (
            organization_id        TEXT PRIMARY KEY,
            max_renders_per_parent INTEGER NOT NULL
        );

        CREATE TABLE templates (
            id             TEXT PRIMARY KEY,
            base_image_url TEXT
        );

        CREATE TABLE system_health (
            id              INTEGER PRIMARY KEY AUTOINCREMENT,
            organization_id TEXT NOT NULL,
            service         TEXT NOT NULL,
            message         TEXT NOT NULL,
            severity        TEXT NOT NULL,
            resolved_at     TEXT,
            created_at      TEXT NOT NULL
        );
        "#,
    )])
});

/// Pooled SQLite repository
pub struct SqliteJobRepository {
    pool: Pool<SqliteConnectionManager>,
}

impl SqliteJobRepository {
    /// Open (creating if needed) the database at `path` and apply migrations
    pub fn open(path: impl AsRef<Path>) -> Result<Self, RenderError> {
        let manager = SqliteConnectionManager::file(path);
        let pool = Pool::new(manager)?;
        {
            let mut conn = pool.get()?;
            MIGRATIONS
                .to_latest(&mut conn)
                .map_err(|e| RenderError::Repository(format!("migration failed: {e}")))?;
        }
        Ok(Self { pool })
    }

    /// Shared handle to the underlying pool, for the health logger
    pub fn pool(&self) -> Pool<SqliteConnectionManager> {
        self.pool.clone()
    }

    /// Store or replace an organization's render settings
    pub fn set_render_settings(
        &self,
        organization_id: &str,
        settings: RenderSettings,
    ) -> Result<(), RenderError> {
        let conn = self.pool.get()?;
        conn.execute(
            "INSERT INTO render_settings (organization_id, max_renders_per_parent)
             VALUES (?1, ?2)
             ON CONFLICT(organization_id) DO UPDATE SET max_renders_per_parent = ?2",
            params![organization_id, settings.max_renders_per_parent],
        )?;
        Ok(())
    }

    /// Store or replace a mockup template's base image URL
    pub fn upsert_template(
        &self,
        template_id: &str,
        base_image_url: Option<&str>,
    ) -> Result<(), RenderError> {
        let conn = self.pool.get()?;
        conn.execute(
            "INSERT INTO templates (id, base_image_url) VALUES (?1, ?2)
             ON CONFLICT(id) DO UPDATE SET base_image_url = ?2",
            params![template_id, base_image_url],
        )?;
        Ok(())
    }
}

const JOB_COLUMNS: &str = "id, parent_entity_id, organization_id, created_by, external_job_id, \
     status, prompt, lighting, background, angle, multi_angle, angle_set_id, \
     custom_background, source_photo_url, result_url, version, cost_estimate, \
     failure_note, created_at, updated_at";

fn job_from_row(row: &Row<'_>) -> Result<GenerationJob, RenderError> {
    let id: String = row.get(0)?;
    let angle_set_id: Option<String> = row.get(11)?;
    let status: String = row.get(5)?;
    let lighting: String = row.get(7)?;
    let background: String = row.get(8)?;
    let angle: String = row.get(9)?;
    let created_at: String = row.get(18)?;
    let updated_at: String = row.get(19)?;

    Ok(GenerationJob {
        id: parse_uuid(&id)?,
        parent_entity_id: row.get(1)?,
        organization_id: row.get(2)?,
        created_by: row.get(3)?,
        external_job_id: row.get(4)?,
        status: JobStatus::from_str(&status)?,
        prompt: row.get(6)?,
        variant: VariantParams {
            lighting: FromStr::from_str(&lighting)?,
            background: FromStr::from_str(&background)?,
            angle: FromStr::from_str(&angle)?,
            multi_angle: row.get::<_, i64>(10)? != 0,
            angle_set_id: angle_set_id.as_deref().map(parse_uuid).transpose()?,
            custom_background: row.get(12)?,
        },
        source_photo_url: row.get(13)?,
        result_url: row.get(14)?,
        version: row.get(15)?,
        cost_estimate: row.get(16)?,
        failure_note: row.get(17)?,
        created_at: parse_timestamp(&created_at)?,
        updated_at: parse_timestamp(&updated_at)?,
    })
}

const MOCKUP_COLUMNS: &str = "id, organization_id, parent_entity_id, template_id, status, prompt, \
     flat_design_url, final_result_url, failure_note, created_at, updated_at";

fn mockup_from_row(row: &Row<'_>) -> Result<MockupJob, RenderError> {
    let id: String = row.get(0)?;
    let status: String = row.get(4)?;
    let created_at: String = row.get(9)?;
    let updated_at: String = row.get(10)?;

    Ok(MockupJob {
        id: parse_uuid(&id)?,
        organization_id: row.get(1)?,
        parent_entity_id: row.get(2)?,
        template_id: row.get(3)?,
        status: MockupStatus::from_str(&status)?,
        prompt: row.get(5)?,
        flat_design_url: row.get(6)?,
        final_result_url: row.get(7)?,
        failure_note: row.get(8)?,
        created_at: parse_timestamp(&created_at)?,
        updated_at: parse_timestamp(&updated_at)?,
    })
}

fn parse_uuid(raw: &str) -> Result<Uuid, RenderError> {
    Uuid::parse_str(raw).map_err(|e| RenderError::Repository(format!("bad uuid {raw}: {e}")))
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, RenderError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| RenderError::Repository(format!("bad timestamp {raw}: {e}")))
}

#[async_trait]
impl JobRepository for SqliteJobRepository {
    async fn insert_jobs(&self, jobs: &[GenerationJob]) -> Result<(), RenderError> {
        let mut conn = self.pool.get()?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(&format!(
                "INSERT INTO render_jobs ({JOB_COLUMNS}) VALUES \
                 (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20)"
            ))?;
            for job in jobs {
                stmt.execute(params![
                    job.id.to_string(),
                    job.parent_entity_id,
                    job.organization_id,
                    job.created_by,
                    job.external_job_id,
                    job.status.as_str(),
                    job.prompt,
                    job.variant.lighting.as_str(),
                    job.variant.background.as_str(),
                    job.variant.angle.as_str(),
                    job.variant.multi_angle as i64,
                    job.variant.angle_set_id.map(|id| id.to_string()),
                    job.variant.custom_background,
                    job.source_photo_url,
                    job.result_url,
                    job.version,
                    job.cost_estimate,
                    job.failure_note,
                    job.created_at.to_rfc3339(),
                    job.updated_at.to_rfc3339(),
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    async fn job_by_id(&self, id: Uuid) -> Result<Option<GenerationJob>, RenderError> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {JOB_COLUMNS} FROM render_jobs WHERE id = ?1"
        ))?;
        let mut rows = stmt.query(params![id.to_string()])?;
        match rows.next()? {
            Some(row) => Ok(Some(job_from_row(row)?)),
            None => Ok(None),
        }
    }

    async fn job_by_external_id(
        &self,
        external_id: &str,
    ) -> Result<Option<GenerationJob>, RenderError> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {JOB_COLUMNS} FROM render_jobs WHERE external_job_id = ?1"
        ))?;
        let mut rows = stmt.query(params![external_id])?;
        match rows.next()? {
            Some(row) => Ok(Some(job_from_row(row)?)),
            None => Ok(None),
        }
    }

    async fn update_job(&self, id: Uuid, update: &JobUpdate) -> Result<GenerationJob, RenderError> {
        let conn = self.pool.get()?;
        // Guarded update: terminal rows are left untouched
        conn.execute(
            "UPDATE render_jobs
             SET status = ?2,
                 result_url = COALESCE(?3, result_url),
                 failure_note = COALESCE(?4, failure_note),
                 updated_at = ?5
             WHERE id = ?1 AND status NOT IN ('succeeded', 'failed', 'canceled')",
            params![
                id.to_string(),
                update.status.as_str(),
                update.result_url,
                update.failure_note,
                Utc::now().to_rfc3339(),
            ],
        )?;
        drop(conn);
        self.job_by_id(id)
            .await?
            .ok_or_else(|| RenderError::NotFound(format!("render job {id}")))
    }

    async fn count_for_parent(
        &self,
        parent_entity_id: &str,
        excluding: &[JobStatus],
    ) -> Result<i64, RenderError> {
        let conn = self.pool.get()?;
        let placeholders = excluding
            .iter()
            .enumerate()
            .map(|(i, _)| format!("?{}", i + 2))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = if excluding.is_empty() {
            "SELECT COUNT(*) FROM render_jobs WHERE parent_entity_id = ?1".to_string()
        } else {
            format!(
                "SELECT COUNT(*) FROM render_jobs WHERE parent_entity_id = ?1 \
                 AND status NOT IN ({placeholders})"
            )
        };
        let mut stmt = conn.prepare(&sql)?;
        let mut values = vec![parent_entity_id.to_string()];
        values.extend(excluding.iter().map(|s| s.as_str().to_string()));
        let count = stmt.query_row(rusqlite::params_from_iter(values), |row| {
            row.get::<_, i64>(0)
        })?;
        Ok(count)
    }

    async fn render_settings(&self, organization_id: &str) -> Result<RenderSettings, RenderError> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(
            "SELECT max_renders_per_parent FROM render_settings WHERE organization_id = ?1",
        )?;
        let mut rows = stmt.query(params![organization_id])?;
        match rows.next()? {
            Some(row) => Ok(RenderSettings {
                max_renders_per_parent: row.get(0)?,
            }),
            None => Ok(RenderSettings::default()),
        }
    }

    async fn insert_mockup(&self, job: &MockupJob) -> Result<(), RenderError> {
        let conn = self.pool.get()?;
        conn.execute(
            &format!(
                "INSERT INTO mockup_jobs ({MOCKUP_COLUMNS}) VALUES \
                 (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)"
            ),
            params![
                job.id.to_string(),
                job.organization_id,
                job.parent_entity_id,
                job.template_id,
                job.status.as_str(),
                job.prompt,
                job.flat_design_url,
                job.final_result_url,
                job.failure_note,
                job.created_at.to_rfc3339(),
                job.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    async fn update_mockup(
        &self,
        id: Uuid,
        update: &MockupUpdate,
    ) -> Result<MockupJob, RenderError> {
        let conn = self.pool.get()?;
        conn.execute(
            "UPDATE mockup_jobs
             SET status = COALESCE(?2, status),
                 prompt = COALESCE(?3, prompt),
                 flat_design_url = COALESCE(?4, flat_design_url),
                 final_result_url = COALESCE(?5, final_result_url),
                 failure_note = COALESCE(?6, failure_note),
                 updated_at = ?7
             WHERE id = ?1",
            params![
                id.to_string(),
                update.status.map(|s| s.as_str()),
                update.prompt,
                update.flat_design_url,
                update.final_result_url,
                update.failure_note,
                Utc::now().to_rfc3339(),
            ],
        )?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {MOCKUP_COLUMNS} FROM mockup_jobs WHERE id = ?1"
        ))?;
        let mut rows = stmt.query(params![id.to_string()])?;
        match rows.next()? {
            Some(row) => mockup_from_row(row),
            None => Err(RenderError::NotFound(format!("mockup job {id}"))),
        }
    }

    async fn template(
        &self,
        template_id: &str,
    ) -> Result<Option<MockupTemplate>, RenderError> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare("SELECT id, base_image_url FROM templates WHERE id = ?1")?;
        let mut rows = stmt.query(params![template_id])?;
        match rows.next()? {
            Some(row) => Ok(Some(MockupTemplate {
                id: row.get(0)?,
                base_image_url: row.get(1)?,
            })),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{Angle, Background, Lighting};
    use tempfile::TempDir;

    fn repository() -> (SqliteJobRepository, TempDir) {
        let dir = TempDir::new().unwrap();
        let repo = SqliteJobRepository::open(dir.path().join("wrapflow.db")).unwrap();
        (repo, dir)
    }

    fn job(parent: &str, status: JobStatus) -> GenerationJob {
        let now = Utc::now();
        GenerationJob {
            id: Uuid::new_v4(),
            parent_entity_id: parent.to_string(),
            organization_id: "org-1".to_string(),
            created_by: "user-1".to_string(),
            external_job_id: Some(format!("pred-{}", Uuid::new_v4())),
            status,
            prompt: "test prompt".to_string(),
            variant: VariantParams {
                lighting: Lighting::GoldenHour,
                background: Background::Studio,
                angle: Angle::Side,
                multi_angle: false,
                angle_set_id: None,
                custom_background: None,
            },
            source_photo_url: Some("https://cdn.example/van.jpg".to_string()),
            result_url: None,
            version: 1,
            cost_estimate: 0.012,
            failure_note: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn test_insert_and_round_trip() {
        let (repo, _dir) = repository();
        let original = job("job-1", JobStatus::Generating);
        repo.insert_jobs(std::slice::from_ref(&original)).await.unwrap();

        let loaded = repo.job_by_id(original.id).await.unwrap().unwrap();
        assert_eq!(loaded.parent_entity_id, "job-1");
        assert_eq!(loaded.status, JobStatus::Generating);
        assert_eq!(loaded.variant.lighting, Lighting::GoldenHour);
        assert_eq!(loaded.variant.angle, Angle::Side);
        assert_eq!(loaded.cost_estimate, 0.012);

        let by_external = repo
            .job_by_external_id(original.external_job_id.as_deref().unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(by_external.id, original.id);

        assert!(repo.job_by_id(Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_guards_terminal_rows() {
        let (repo, _dir) = repository();
        let row = job("job-2", JobStatus::Generating);
        repo.insert_jobs(std::slice::from_ref(&row)).await.unwrap();

        let updated = repo
            .update_job(
                row.id,
                &JobUpdate {
                    status: JobStatus::Succeeded,
                    result_url: Some("https://store.example/r.jpg".to_string()),
                    failure_note: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.status, JobStatus::Succeeded);
        assert_eq!(
            updated.result_url.as_deref(),
            Some("https://store.example/r.jpg")
        );
        assert!(updated.updated_at >= row.updated_at);

        // A stale reconciliation cannot rewind the terminal state
        let unchanged = repo
            .update_job(
                row.id,
                &JobUpdate {
                    status: JobStatus::Processing,
                    result_url: None,
                    failure_note: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(unchanged.status, JobStatus::Succeeded);
        assert_eq!(
            unchanged.result_url.as_deref(),
            Some("https://store.example/r.jpg")
        );
    }

    #[tokio::test]
    async fn test_count_for_parent_with_exclusions() {
        let (repo, _dir) = repository();
        repo.insert_jobs(&[
            job("job-3", JobStatus::Generating),
            job("job-3", JobStatus::Failed),
            job("job-3", JobStatus::Canceled),
            job("job-3", JobStatus::Succeeded),
            job("other", JobStatus::Generating),
        ])
        .await
        .unwrap();

        assert_eq!(repo.count_for_parent("job-3", &[]).await.unwrap(), 4);
        assert_eq!(
            repo.count_for_parent("job-3", &[JobStatus::Failed, JobStatus::Canceled])
                .await
                .unwrap(),
            2
        );
    }

    #[tokio::test]
    async fn test_settings_default_and_override() {
        let (repo, _dir) = repository();
        assert_eq!(
            repo.render_settings("org-x").await.unwrap().max_renders_per_parent,
            RenderSettings::default().max_renders_per_parent
        );

        repo.set_render_settings(
            "org-x",
            RenderSettings {
                max_renders_per_parent: 3,
            },
        )
        .unwrap();
        assert_eq!(
            repo.render_settings("org-x").await.unwrap().max_renders_per_parent,
            3
        );
    }

    #[tokio::test]
    async fn test_mockup_lifecycle() {
        let (repo, _dir) = repository();
        let now = Utc::now();
        let mockup = MockupJob {
            id: Uuid::new_v4(),
            organization_id: "org-1".to_string(),
            parent_entity_id: None,
            template_id: "tpl-1".to_string(),
            status: MockupStatus::Generating,
            prompt: None,
            flat_design_url: None,
            final_result_url: None,
            failure_note: None,
            created_at: now,
            updated_at: now,
        };
        repo.insert_mockup(&mockup).await.unwrap();

        let updated = repo
            .update_mockup(
                mockup.id,
                &MockupUpdate {
                    status: Some(MockupStatus::Complete),
                    prompt: Some("prompt".to_string()),
                    flat_design_url: Some("https://store.example/flat.png".to_string()),
                    final_result_url: Some("https://store.example/final.png".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.status, MockupStatus::Complete);
        assert_eq!(
            updated.final_result_url.as_deref(),
            Some("https://store.example/final.png")
        );
    }

    #[tokio::test]
    async fn test_template_lookup() {
        let (repo, _dir) = repository();
        assert!(repo.template("missing").await.unwrap().is_none());

        repo.upsert_template("tpl-1", Some("https://cdn.example/base.png"))
            .unwrap();
        let template = repo.template("tpl-1").await.unwrap().unwrap();
        assert_eq!(
            template.base_image_url.as_deref(),
            Some("https://cdn.example/base.png")
        );

        // A template without a base image still exists
        repo.upsert_template("tpl-2", None).unwrap();
        let bare = repo.template("tpl-2").await.unwrap().unwrap();
        assert!(bare.base_image_url.is_none());
    }
}
