// crates/imagebatch/src/jobs/repo.rs

use crate::jobs::model::{ItemStatus, Job, JobItem, JobMode, JobStatus, NewJob};
use chrono::Utc;
use sqlx::SqlitePool;
use uuid::Uuid;

#[derive(Clone)]
pub struct JobsRepo {
    pool: SqlitePool,
}

impl JobsRepo {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    // ----------------------------
    // Create
    // ----------------------------

    /// Insert the job and every item in one transaction, so `total_items`
    /// always matches the number of rows written.
    pub async fn create_job(&self, new_job: &NewJob) -> anyhow::Result<(Job, Vec<JobItem>)> {
        let job_id = Uuid::new_v4();
        let now = Utc::now();

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO jobs (
                id, status, mode, prompt, output_size, temperature, aspect_ratio,
                total_items, completed_items, failed_items, created_at, updated_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 0, 0, ?9, ?9)
            "#,
        )
        .bind(job_id)
        .bind(JobStatus::Pending.as_str())
        .bind(new_job.mode.as_str())
        .bind(&new_job.prompt)
        .bind(new_job.output.size.as_str())
        .bind(new_job.output.temperature)
        .bind(new_job.output.aspect_ratio.as_str())
        .bind(new_job.inputs.len() as i64)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        for input in &new_job.inputs {
            let (prompt, image_path) = match new_job.mode {
                JobMode::TextToImage => (Some(input.as_str()), None),
                JobMode::ImageToImage => (None, Some(input.as_str())),
            };

            sqlx::query(
                r#"
                INSERT INTO job_items (
                    id, job_id, input_prompt, input_image_path, status, created_at, updated_at
                )
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(job_id)
            .bind(prompt)
            .bind(image_path)
            .bind(ItemStatus::Pending.as_str())
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        let job = self
            .get_job(job_id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("job {job_id} vanished after insert"))?;
        let items = self.get_items(job_id).await?;
        Ok((job, items))
    }

    // ----------------------------
    // Reads
    // ----------------------------

    pub async fn get_job(&self, job_id: Uuid) -> anyhow::Result<Option<Job>> {
        let job = sqlx::query_as::<_, Job>("SELECT * FROM jobs WHERE id = ?1")
            .bind(job_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(job)
    }

    /// Most recent first. `limit` is clamped to [1, 500].
    pub async fn list_jobs(&self, limit: i64) -> anyhow::Result<Vec<Job>> {
        let limit = limit.clamp(1, 500);
        let jobs = sqlx::query_as::<_, Job>(
            r#"
            SELECT * FROM jobs
            ORDER BY created_at DESC, rowid DESC
            LIMIT ?1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(jobs)
    }

    /// Most recent job still pending or processing.
    pub async fn find_active_job(&self) -> anyhow::Result<Option<Job>> {
        let job = sqlx::query_as::<_, Job>(
            r#"
            SELECT * FROM jobs
            WHERE status IN ('pending', 'processing')
            ORDER BY created_at DESC, rowid DESC
            LIMIT 1
            "#,
        )
        .fetch_optional(&self.pool)
        .await?;
        Ok(job)
    }

    pub async fn get_items(&self, job_id: Uuid) -> anyhow::Result<Vec<JobItem>> {
        let items = sqlx::query_as::<_, JobItem>(
            r#"
            SELECT * FROM job_items
            WHERE job_id = ?1
            ORDER BY created_at ASC, rowid ASC
            "#,
        )
        .bind(job_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(items)
    }

    pub async fn export_all(&self) -> anyhow::Result<(Vec<Job>, Vec<JobItem>)> {
        let jobs = sqlx::query_as::<_, Job>("SELECT * FROM jobs ORDER BY created_at DESC, rowid DESC")
            .fetch_all(&self.pool)
            .await?;
        let items =
            sqlx::query_as::<_, JobItem>("SELECT * FROM job_items ORDER BY created_at ASC, rowid ASC")
                .fetch_all(&self.pool)
                .await?;
        Ok((jobs, items))
    }

    // ----------------------------
    // Job transitions
    // ----------------------------

    pub async fn update_job_status(&self, job_id: Uuid, status: JobStatus) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            UPDATE jobs
            SET status = ?2,
                updated_at = ?3
            WHERE id = ?1
            "#,
        )
        .bind(job_id)
        .bind(status.as_str())
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Store the vendor handle and scratch artifact and move the job to processing.
    pub async fn record_submission(
        &self,
        job_id: Uuid,
        batch_job_name: &str,
        batch_temp_file: &str,
    ) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            UPDATE jobs
            SET batch_job_name = ?2,
                batch_temp_file = ?3,
                status = 'processing',
                updated_at = ?4
            WHERE id = ?1
            "#,
        )
        .bind(job_id)
        .bind(batch_job_name)
        .bind(batch_temp_file)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Overwrite the aggregate counters.
    /// Values are clamped so that completed + failed never exceeds total_items.
    pub async fn update_progress(
        &self,
        job_id: Uuid,
        completed: i64,
        failed: i64,
    ) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            UPDATE jobs
            SET completed_items = MIN(MAX(?2, 0), total_items),
                failed_items = MIN(MAX(?3, 0), total_items - MIN(MAX(?2, 0), total_items)),
                updated_at = ?4
            WHERE id = ?1
            "#,
        )
        .bind(job_id)
        .bind(completed)
        .bind(failed)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Recount the aggregate counters from the item rows.
    pub async fn sync_counts_from_items(&self, job_id: Uuid) -> anyhow::Result<(i64, i64)> {
        let (completed, failed) = self.count_items(job_id).await?;
        self.update_progress(job_id, completed, failed).await?;
        Ok((completed, failed))
    }

    /// (completed, failed) item rows of the job.
    pub async fn count_items(&self, job_id: Uuid) -> anyhow::Result<(i64, i64)> {
        let counts: (i64, i64) = sqlx::query_as(
            r#"
            SELECT
                COALESCE(SUM(CASE WHEN status = 'completed' THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN status = 'failed' THEN 1 ELSE 0 END), 0)
            FROM job_items
            WHERE job_id = ?1
            "#,
        )
        .bind(job_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(counts)
    }

    // ----------------------------
    // Item transitions
    // ----------------------------

    pub async fn mark_items_processing(&self, job_id: Uuid) -> anyhow::Result<u64> {
        let res = sqlx::query(
            r#"
            UPDATE job_items
            SET status = 'processing',
                error = NULL,
                updated_at = ?2
            WHERE job_id = ?1
            "#,
        )
        .bind(job_id)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(res.rows_affected())
    }

    pub async fn complete_item(&self, item_id: Uuid, output_image_path: &str) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            UPDATE job_items
            SET status = 'completed',
                output_image_path = ?2,
                error = NULL,
                updated_at = ?3
            WHERE id = ?1
            "#,
        )
        .bind(item_id)
        .bind(output_image_path)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn fail_item(&self, item_id: Uuid, error: &str) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            UPDATE job_items
            SET status = 'failed',
                error = ?2,
                updated_at = ?3
            WHERE id = ?1
            "#,
        )
        .bind(item_id)
        .bind(error)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Fail every item of the job that is still processing. Returns how many moved.
    pub async fn fail_processing_items(&self, job_id: Uuid, error: &str) -> anyhow::Result<u64> {
        let res = sqlx::query(
            r#"
            UPDATE job_items
            SET status = 'failed',
                error = ?2,
                updated_at = ?3
            WHERE job_id = ?1
              AND status = 'processing'
            "#,
        )
        .bind(job_id)
        .bind(error)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(res.rows_affected())
    }

    // ----------------------------
    // Delete
    // ----------------------------

    /// Remove the job and its items. Returns false when the job did not exist.
    pub async fn delete_job(&self, job_id: Uuid) -> anyhow::Result<bool> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM job_items WHERE job_id = ?1")
            .bind(job_id)
            .execute(&mut *tx)
            .await?;

        let res = sqlx::query("DELETE FROM jobs WHERE id = ?1")
            .bind(job_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(res.rows_affected() > 0)
    }
}
