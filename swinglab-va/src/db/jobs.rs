//! Analysis job persistence
//!
//! **[SVA-DB-020]** One row per job identifier; saves are upserts so a
//! resubmitted job replaces its previous terminal record atomically.

use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use swinglab_common::Result;

use crate::models::{AnalysisJob, AnalysisResult, JobClassification, JobStatus};

/// Save a job, inserting or replacing its row
pub async fn save_job(pool: &SqlitePool, job: &AnalysisJob) -> Result<()> {
    // Serialize enum/JSON columns before touching the pool
    let status = serde_json::to_string(&job.status)
        .map_err(|e| swinglab_common::Error::Internal(format!("serialize status: {}", e)))?;
    let classification = job
        .classification
        .map(|c| serde_json::to_string(&c))
        .transpose()
        .map_err(|e| swinglab_common::Error::Internal(format!("serialize classification: {}", e)))?;
    let result = job
        .result
        .as_ref()
        .map(serde_json::to_string)
        .transpose()
        .map_err(|e| swinglab_common::Error::Internal(format!("serialize result: {}", e)))?;

    sqlx::query(
        r#"
        INSERT INTO analysis_jobs (
            job_id, filename, status, classification,
            created_at, requested_at, started_at, finished_at,
            error_message, result
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(job_id) DO UPDATE SET
            filename = excluded.filename,
            status = excluded.status,
            classification = excluded.classification,
            requested_at = excluded.requested_at,
            started_at = excluded.started_at,
            finished_at = excluded.finished_at,
            error_message = excluded.error_message,
            result = excluded.result
        "#,
    )
    .bind(&job.job_id)
    .bind(&job.filename)
    .bind(status)
    .bind(classification)
    .bind(job.created_at.to_rfc3339())
    .bind(job.requested_at.to_rfc3339())
    .bind(job.started_at.map(|dt| dt.to_rfc3339()))
    .bind(job.finished_at.map(|dt| dt.to_rfc3339()))
    .bind(&job.error_message)
    .bind(result)
    .execute(pool)
    .await?;

    Ok(())
}

/// Load a job by identifier
pub async fn load_job(pool: &SqlitePool, job_id: &str) -> Result<Option<AnalysisJob>> {
    let row = sqlx::query(
        r#"
        SELECT job_id, filename, status, classification,
               created_at, requested_at, started_at, finished_at,
               error_message, result
        FROM analysis_jobs
        WHERE job_id = ?
        "#,
    )
    .bind(job_id)
    .fetch_optional(pool)
    .await?;

    let row = match row {
        Some(r) => r,
        None => return Ok(None),
    };

    let status: JobStatus = parse_json_column(&row.get::<String, _>("status"), "status")?;
    let classification: Option<JobClassification> = row
        .get::<Option<String>, _>("classification")
        .map(|s| parse_json_column(&s, "classification"))
        .transpose()?;
    let result: Option<AnalysisResult> = row
        .get::<Option<String>, _>("result")
        .map(|s| parse_json_column(&s, "result"))
        .transpose()?;

    Ok(Some(AnalysisJob {
        job_id: row.get("job_id"),
        filename: row.get("filename"),
        status,
        classification,
        created_at: parse_timestamp(&row.get::<String, _>("created_at"))?,
        requested_at: parse_timestamp(&row.get::<String, _>("requested_at"))?,
        started_at: row
            .get::<Option<String>, _>("started_at")
            .map(|s| parse_timestamp(&s))
            .transpose()?,
        finished_at: row
            .get::<Option<String>, _>("finished_at")
            .map(|s| parse_timestamp(&s))
            .transpose()?,
        error_message: row.get("error_message"),
        result,
    }))
}

fn parse_json_column<T: serde::de::DeserializeOwned>(raw: &str, column: &str) -> Result<T> {
    serde_json::from_str(raw)
        .map_err(|e| swinglab_common::Error::Internal(format!("parse {} column: {}", column, e)))
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| swinglab_common::Error::Internal(format!("parse timestamp: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AnalysisSource;

    #[tokio::test]
    async fn save_and_load_round_trip() {
        let pool = crate::db::init_memory_pool().await.unwrap();

        let mut job = AnalysisJob::new("swing-9".to_string(), "swing-9.mov".to_string());
        job.transition_to(JobStatus::Running);
        job.complete(
            AnalysisResult::unavailable(
                AnalysisSource::LocalFallback,
                "Tempo unavailable.".to_string(),
            ),
            Some(JobClassification::NotSwing),
        );

        save_job(&pool, &job).await.unwrap();
        let loaded = load_job(&pool, "swing-9").await.unwrap().unwrap();

        assert_eq!(loaded.job_id, job.job_id);
        assert_eq!(loaded.status, JobStatus::Done);
        assert_eq!(loaded.classification, Some(JobClassification::NotSwing));
        assert!(loaded.finished_at.is_some());
        let result = loaded.result.unwrap();
        assert_eq!(result.source, AnalysisSource::LocalFallback);
        assert_eq!(result.metrics.summary, "Tempo unavailable.");
    }

    #[tokio::test]
    async fn upsert_replaces_previous_record() {
        let pool = crate::db::init_memory_pool().await.unwrap();

        let mut job = AnalysisJob::new("j1".to_string(), "j1.mp4".to_string());
        job.fail(
            "boom".to_string(),
            crate::models::JobClassification::InternalError,
            None,
        );
        save_job(&pool, &job).await.unwrap();

        job.reset_for_resubmission("j1.mp4".to_string());
        job.transition_to(JobStatus::Running);
        save_job(&pool, &job).await.unwrap();

        let loaded = load_job(&pool, "j1").await.unwrap().unwrap();
        assert_eq!(loaded.status, JobStatus::Running);
        assert!(loaded.error_message.is_none());
        assert!(loaded.classification.is_none());
    }

    #[tokio::test]
    async fn missing_job_is_none() {
        let pool = crate::db::init_memory_pool().await.unwrap();
        assert!(load_job(&pool, "nope").await.unwrap().is_none());
    }
}
