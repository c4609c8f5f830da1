// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Postgres store
//!
//! Every mutation is a parameterised statement; status values are bound,
//! never interpolated. CAS updates filter on the expected status and
//! report `rows_affected == 1` as "I made this transition".

use crate::store::{
    BatchFilter, NewBatch, NewInitExecution, NewMember, NewPhaseExecution, NewRunbook,
    NewStepExecution, Page, Store, StoreError,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use convoy_core::{
    AutomationSetting, Batch, BatchId, BatchMember, BatchStatus, InitExecution, InitExecutionId,
    JobId, MemberId, MemberStatus, OverdueBehavior, PhaseExecution, PhaseExecutionId, PhaseStatus,
    Runbook, RunbookId, StepExecution, StepExecutionId, StepStatus,
};
use serde_json::Value;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use std::collections::HashMap;
use std::str::FromStr;

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        StoreError::Backend(e.to_string())
    }
}

/// [`Store`] implementation over a Postgres pool.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Apply the embedded schema migrations.
    pub async fn migrate(pool: &PgPool) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations")
            .run(pool)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))
    }
}

fn parse_status<T>(s: String) -> Result<T, StoreError>
where
    T: FromStr<Err = String>,
{
    s.parse().map_err(StoreError::Backend)
}

fn params_from_value(v: Value) -> Result<HashMap<String, String>, StoreError> {
    serde_json::from_value(v).map_err(|e| StoreError::Backend(e.to_string()))
}

fn params_to_value(params: &HashMap<String, String>) -> Result<Value, StoreError> {
    serde_json::to_value(params).map_err(|e| StoreError::Backend(e.to_string()))
}

fn runbook_from_row(row: &PgRow) -> Result<Runbook, StoreError> {
    Ok(Runbook {
        id: RunbookId::new(row.try_get::<i64, _>("id")?),
        name: row.try_get("name")?,
        version: row.try_get("version")?,
        document: row.try_get("document")?,
        data_table_name: row.try_get("data_table_name")?,
        is_active: row.try_get("is_active")?,
        overdue_behavior: parse_status::<OverdueBehavior>(row.try_get("overdue_behavior")?)?,
        rerun_init: row.try_get("rerun_init")?,
        created_at: row.try_get("created_at")?,
    })
}

fn batch_from_row(row: &PgRow) -> Result<Batch, StoreError> {
    Ok(Batch {
        id: BatchId::new(row.try_get::<i64, _>("id")?),
        runbook_id: RunbookId::new(row.try_get::<i64, _>("runbook_id")?),
        batch_start_time: row.try_get("batch_start_time")?,
        status: parse_status::<BatchStatus>(row.try_get("status")?)?,
        is_manual: row.try_get("is_manual")?,
        created_by: row.try_get("created_by")?,
        current_phase: row.try_get("current_phase")?,
        detected_at: row.try_get("detected_at")?,
        init_dispatched_at: row.try_get("init_dispatched_at")?,
    })
}

fn member_from_row(row: &PgRow) -> Result<BatchMember, StoreError> {
    Ok(BatchMember {
        id: MemberId::new(row.try_get::<i64, _>("id")?),
        batch_id: BatchId::new(row.try_get::<i64, _>("batch_id")?),
        member_key: row.try_get("member_key")?,
        status: parse_status::<MemberStatus>(row.try_get("status")?)?,
        data_json: row.try_get("data_json")?,
        worker_data_json: row.try_get("worker_data_json")?,
        added_at: row.try_get("added_at")?,
        removed_at: row.try_get("removed_at")?,
        add_dispatched_at: row.try_get("add_dispatched_at")?,
        remove_dispatched_at: row.try_get("remove_dispatched_at")?,
    })
}

fn phase_from_row(row: &PgRow) -> Result<PhaseExecution, StoreError> {
    Ok(PhaseExecution {
        id: PhaseExecutionId::new(row.try_get::<i64, _>("id")?),
        batch_id: BatchId::new(row.try_get::<i64, _>("batch_id")?),
        phase_name: row.try_get("phase_name")?,
        offset_minutes: row.try_get("offset_minutes")?,
        due_at: row.try_get("due_at")?,
        runbook_version: row.try_get("runbook_version")?,
        status: parse_status::<PhaseStatus>(row.try_get("status")?)?,
        created_at: row.try_get("created_at")?,
        dispatched_at: row.try_get("dispatched_at")?,
        completed_at: row.try_get("completed_at")?,
    })
}

fn step_from_row(row: &PgRow) -> Result<StepExecution, StoreError> {
    Ok(StepExecution {
        id: StepExecutionId::new(row.try_get::<i64, _>("id")?),
        phase_execution_id: PhaseExecutionId::new(row.try_get::<i64, _>("phase_execution_id")?),
        batch_member_id: MemberId::new(row.try_get::<i64, _>("batch_member_id")?),
        step_name: row.try_get("step_name")?,
        step_index: row.try_get("step_index")?,
        worker_id: row.try_get("worker_id")?,
        function_name: row.try_get("function_name")?,
        params_json: params_from_value(row.try_get("params_json")?)?,
        result_json: row.try_get("result_json")?,
        status: parse_status::<StepStatus>(row.try_get("status")?)?,
        is_poll_step: row.try_get("is_poll_step")?,
        poll_interval_secs: row.try_get("poll_interval_secs")?,
        poll_timeout_secs: row.try_get("poll_timeout_secs")?,
        poll_started_at: row.try_get("poll_started_at")?,
        last_polled_at: row.try_get("last_polled_at")?,
        poll_count: row.try_get("poll_count")?,
        on_failure: row.try_get("on_failure")?,
        max_retries: row.try_get("max_retries")?,
        retry_count: row.try_get("retry_count")?,
        retry_interval_secs: row.try_get("retry_interval_secs")?,
        retry_after: row.try_get("retry_after")?,
        job_id: row.try_get::<Option<String>, _>("job_id")?.map(JobId::new),
        error_message: row.try_get("error_message")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn init_from_row(row: &PgRow) -> Result<InitExecution, StoreError> {
    Ok(InitExecution {
        id: InitExecutionId::new(row.try_get::<i64, _>("id")?),
        batch_id: BatchId::new(row.try_get::<i64, _>("batch_id")?),
        runbook_version: row.try_get("runbook_version")?,
        step_name: row.try_get("step_name")?,
        step_index: row.try_get("step_index")?,
        worker_id: row.try_get("worker_id")?,
        function_name: row.try_get("function_name")?,
        params_json: params_from_value(row.try_get("params_json")?)?,
        result_json: row.try_get("result_json")?,
        status: parse_status::<StepStatus>(row.try_get("status")?)?,
        is_poll_step: row.try_get("is_poll_step")?,
        poll_interval_secs: row.try_get("poll_interval_secs")?,
        poll_timeout_secs: row.try_get("poll_timeout_secs")?,
        poll_started_at: row.try_get("poll_started_at")?,
        last_polled_at: row.try_get("last_polled_at")?,
        poll_count: row.try_get("poll_count")?,
        on_failure: row.try_get("on_failure")?,
        max_retries: row.try_get("max_retries")?,
        retry_count: row.try_get("retry_count")?,
        retry_interval_secs: row.try_get("retry_interval_secs")?,
        retry_after: row.try_get("retry_after")?,
        job_id: row.try_get::<Option<String>, _>("job_id")?.map(JobId::new),
        error_message: row.try_get("error_message")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

#[async_trait]
impl Store for PgStore {
    // -- runbooks --

    async fn publish_runbook(
        &self,
        new: NewRunbook,
        now: DateTime<Utc>,
    ) -> Result<Runbook, StoreError> {
        let mut tx = self.pool.begin().await?;

        let version: i32 = sqlx::query(
            "SELECT COALESCE(MAX(version), 0) AS version FROM runbooks WHERE name = $1",
        )
        .bind(&new.name)
        .fetch_one(&mut *tx)
        .await?
        .try_get::<i32, _>("version")?
            + 1;

        sqlx::query("UPDATE runbooks SET is_active = FALSE WHERE name = $1 AND is_active")
            .bind(&new.name)
            .execute(&mut *tx)
            .await?;

        let row = sqlx::query(
            "INSERT INTO runbooks \
               (name, version, document, data_table_name, is_active, overdue_behavior, \
                rerun_init, created_at) \
             VALUES ($1, $2, $3, $4, TRUE, $5, $6, $7) \
             RETURNING *",
        )
        .bind(&new.name)
        .bind(version)
        .bind(&new.document)
        .bind(&new.data_table_name)
        .bind(new.overdue_behavior.to_string())
        .bind(new.rerun_init)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        runbook_from_row(&row)
    }

    async fn get_runbook(&self, id: RunbookId) -> Result<Option<Runbook>, StoreError> {
        let row = sqlx::query("SELECT * FROM runbooks WHERE id = $1")
            .bind(id.value())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(runbook_from_row).transpose()
    }

    async fn get_runbook_by_name(
        &self,
        name: &str,
        version: Option<i32>,
    ) -> Result<Option<Runbook>, StoreError> {
        let row = match version {
            Some(v) => {
                sqlx::query("SELECT * FROM runbooks WHERE name = $1 AND version = $2")
                    .bind(name)
                    .bind(v)
                    .fetch_optional(&self.pool)
                    .await?
            }
            None => {
                sqlx::query("SELECT * FROM runbooks WHERE name = $1 AND is_active")
                    .bind(name)
                    .fetch_optional(&self.pool)
                    .await?
            }
        };
        row.as_ref().map(runbook_from_row).transpose()
    }

    async fn list_active_runbooks(&self) -> Result<Vec<Runbook>, StoreError> {
        let rows = sqlx::query("SELECT * FROM runbooks WHERE is_active ORDER BY name")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(runbook_from_row).collect()
    }

    async fn list_runbook_versions(&self, name: &str) -> Result<Vec<Runbook>, StoreError> {
        let rows = sqlx::query("SELECT * FROM runbooks WHERE name = $1 ORDER BY version")
            .bind(name)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(runbook_from_row).collect()
    }

    async fn deactivate_runbook(&self, name: &str, version: i32) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE runbooks SET is_active = FALSE \
             WHERE name = $1 AND version = $2 AND is_active",
        )
        .bind(name)
        .bind(version)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    // -- automation --

    async fn automation(&self, name: &str) -> Result<Option<AutomationSetting>, StoreError> {
        let row = sqlx::query("SELECT * FROM automation_settings WHERE runbook_name = $1")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|row| {
            Ok(AutomationSetting {
                runbook_name: row.try_get("runbook_name")?,
                enabled: row.try_get("enabled")?,
                updated_at: row.try_get("updated_at")?,
                updated_by: row.try_get("updated_by")?,
            })
        })
        .transpose()
    }

    async fn set_automation(
        &self,
        name: &str,
        enabled: bool,
        actor: &str,
        now: DateTime<Utc>,
    ) -> Result<AutomationSetting, StoreError> {
        sqlx::query(
            "INSERT INTO automation_settings (runbook_name, enabled, updated_at, updated_by) \
             VALUES ($1, $2, $3, $4) \
             ON CONFLICT (runbook_name) \
             DO UPDATE SET enabled = $2, updated_at = $3, updated_by = $4",
        )
        .bind(name)
        .bind(enabled)
        .bind(now)
        .bind(actor)
        .execute(&self.pool)
        .await?;
        Ok(AutomationSetting {
            runbook_name: name.to_string(),
            enabled,
            updated_at: now,
            updated_by: actor.to_string(),
        })
    }

    // -- batches --

    async fn insert_batch(
        &self,
        new: NewBatch,
        now: DateTime<Utc>,
    ) -> Result<Batch, StoreError> {
        let row = sqlx::query(
            "INSERT INTO batches \
               (runbook_id, batch_start_time, status, is_manual, created_by, detected_at) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             RETURNING *",
        )
        .bind(new.runbook_id.value())
        .bind(new.batch_start_time)
        .bind(new.status.to_string())
        .bind(new.is_manual)
        .bind(new.created_by)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;
        batch_from_row(&row)
    }

    async fn get_batch(&self, id: BatchId) -> Result<Option<Batch>, StoreError> {
        let row = sqlx::query("SELECT * FROM batches WHERE id = $1")
            .bind(id.value())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(batch_from_row).transpose()
    }

    async fn find_batch_by_start_time(
        &self,
        runbook_name: &str,
        start: DateTime<Utc>,
    ) -> Result<Option<Batch>, StoreError> {
        let row = sqlx::query(
            "SELECT b.* FROM batches b \
             JOIN runbooks r ON r.id = b.runbook_id \
             WHERE r.name = $1 AND b.batch_start_time = $2 AND NOT b.is_manual \
             LIMIT 1",
        )
        .bind(runbook_name)
        .bind(start)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(batch_from_row).transpose()
    }

    async fn list_batches(
        &self,
        filter: BatchFilter,
        page: Page,
    ) -> Result<Vec<Batch>, StoreError> {
        // Fixed bind positions; unset filters pass NULL and collapse to TRUE.
        let rows = sqlx::query(
            "SELECT b.* FROM batches b \
             JOIN runbooks r ON r.id = b.runbook_id \
             WHERE ($1::text IS NULL OR r.name = $1) \
               AND ($2::text IS NULL OR b.status = $2) \
               AND ($3::boolean IS NULL OR b.is_manual = $3) \
             ORDER BY b.id DESC \
             LIMIT $4 OFFSET $5",
        )
        .bind(filter.runbook_name)
        .bind(filter.status.map(|s| s.to_string()))
        .bind(filter.is_manual)
        .bind(page.limit)
        .bind(page.offset)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(batch_from_row).collect()
    }

    async fn active_batches_for_runbook(
        &self,
        runbook_name: &str,
    ) -> Result<Vec<Batch>, StoreError> {
        let rows = sqlx::query(
            "SELECT b.* FROM batches b \
             JOIN runbooks r ON r.id = b.runbook_id \
             WHERE r.name = $1 AND b.status <> $2 AND b.status <> $3 \
             ORDER BY b.id",
        )
        .bind(runbook_name)
        .bind(BatchStatus::Completed.to_string())
        .bind(BatchStatus::Failed.to_string())
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(batch_from_row).collect()
    }

    async fn cas_batch_status(
        &self,
        id: BatchId,
        from: BatchStatus,
        to: BatchStatus,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let result = if to == BatchStatus::InitDispatched {
            sqlx::query(
                "UPDATE batches SET status = $3, init_dispatched_at = $4 \
                 WHERE id = $1 AND status = $2",
            )
            .bind(id.value())
            .bind(from.to_string())
            .bind(to.to_string())
            .bind(now)
            .execute(&self.pool)
            .await?
        } else {
            sqlx::query("UPDATE batches SET status = $3 WHERE id = $1 AND status = $2")
                .bind(id.value())
                .bind(from.to_string())
                .bind(to.to_string())
                .execute(&self.pool)
                .await?
        };
        Ok(result.rows_affected() == 1)
    }

    async fn set_batch_current_phase(
        &self,
        id: BatchId,
        phase: Option<String>,
    ) -> Result<(), StoreError> {
        sqlx::query("UPDATE batches SET current_phase = $2 WHERE id = $1")
            .bind(id.value())
            .bind(phase)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn set_batch_start_time(
        &self,
        id: BatchId,
        start: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        sqlx::query("UPDATE batches SET batch_start_time = $2 WHERE id = $1")
            .bind(id.value())
            .bind(start)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    // -- members --

    async fn insert_member(
        &self,
        new: NewMember,
        now: DateTime<Utc>,
    ) -> Result<Option<BatchMember>, StoreError> {
        let row = sqlx::query(
            "INSERT INTO batch_members (batch_id, member_key, status, data_json, added_at) \
             VALUES ($1, $2, $3, $4, $5) \
             ON CONFLICT (batch_id, member_key) DO NOTHING \
             RETURNING *",
        )
        .bind(new.batch_id.value())
        .bind(&new.member_key)
        .bind(MemberStatus::Active.to_string())
        .bind(&new.data_json)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(member_from_row).transpose()
    }

    async fn get_member(&self, id: MemberId) -> Result<Option<BatchMember>, StoreError> {
        let row = sqlx::query("SELECT * FROM batch_members WHERE id = $1")
            .bind(id.value())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(member_from_row).transpose()
    }

    async fn members_of_batch(
        &self,
        batch_id: BatchId,
    ) -> Result<Vec<BatchMember>, StoreError> {
        let rows = sqlx::query("SELECT * FROM batch_members WHERE batch_id = $1 ORDER BY id")
            .bind(batch_id.value())
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(member_from_row).collect()
    }

    async fn cas_member_status(
        &self,
        id: MemberId,
        from: MemberStatus,
        to: MemberStatus,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let result = match to {
            MemberStatus::Removed => {
                sqlx::query(
                    "UPDATE batch_members \
                     SET status = $3, removed_at = $4, remove_dispatched_at = NULL \
                     WHERE id = $1 AND status = $2",
                )
                .bind(id.value())
                .bind(from.to_string())
                .bind(to.to_string())
                .bind(now)
                .execute(&self.pool)
                .await?
            }
            MemberStatus::Active => {
                sqlx::query(
                    "UPDATE batch_members \
                     SET status = $3, removed_at = NULL, add_dispatched_at = NULL \
                     WHERE id = $1 AND status = $2",
                )
                .bind(id.value())
                .bind(from.to_string())
                .bind(to.to_string())
                .execute(&self.pool)
                .await?
            }
            MemberStatus::Failed => {
                sqlx::query(
                    "UPDATE batch_members SET status = $3 WHERE id = $1 AND status = $2",
                )
                .bind(id.value())
                .bind(from.to_string())
                .bind(to.to_string())
                .execute(&self.pool)
                .await?
            }
        };
        Ok(result.rows_affected() == 1)
    }

    async fn merge_worker_data(
        &self,
        id: MemberId,
        updates: serde_json::Map<String, Value>,
    ) -> Result<(), StoreError> {
        // JSONB concatenation: right-hand keys win, matching the merge
        // policy.
        sqlx::query(
            "UPDATE batch_members SET worker_data_json = worker_data_json || $2 WHERE id = $1",
        )
        .bind(id.value())
        .bind(Value::Object(updates))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn mark_member_add_dispatched(
        &self,
        id: MemberId,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        sqlx::query("UPDATE batch_members SET add_dispatched_at = $2 WHERE id = $1")
            .bind(id.value())
            .bind(now)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn mark_member_remove_dispatched(
        &self,
        id: MemberId,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        sqlx::query("UPDATE batch_members SET remove_dispatched_at = $2 WHERE id = $1")
            .bind(id.value())
            .bind(now)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    // -- phase executions --

    async fn insert_phase_execution(
        &self,
        new: NewPhaseExecution,
        now: DateTime<Utc>,
    ) -> Result<PhaseExecution, StoreError> {
        let row = sqlx::query(
            "INSERT INTO phase_executions \
               (batch_id, phase_name, offset_minutes, due_at, runbook_version, status, \
                created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             RETURNING *",
        )
        .bind(new.batch_id.value())
        .bind(&new.phase_name)
        .bind(new.offset_minutes)
        .bind(new.due_at)
        .bind(new.runbook_version)
        .bind(new.status.to_string())
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db) if db.is_unique_violation() => StoreError::Conflict(
                format!("phase execution exists: {} {}", new.batch_id, new.phase_name),
            ),
            other => StoreError::Backend(other.to_string()),
        })?;
        phase_from_row(&row)
    }

    async fn get_phase_execution(
        &self,
        id: PhaseExecutionId,
    ) -> Result<Option<PhaseExecution>, StoreError> {
        let row = sqlx::query("SELECT * FROM phase_executions WHERE id = $1")
            .bind(id.value())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(phase_from_row).transpose()
    }

    async fn phases_of_batch(
        &self,
        batch_id: BatchId,
    ) -> Result<Vec<PhaseExecution>, StoreError> {
        let rows = sqlx::query("SELECT * FROM phase_executions WHERE batch_id = $1 ORDER BY id")
            .bind(batch_id.value())
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(phase_from_row).collect()
    }

    async fn cas_phase_status(
        &self,
        id: PhaseExecutionId,
        from: PhaseStatus,
        to: PhaseStatus,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let result = if to == PhaseStatus::Dispatched {
            sqlx::query(
                "UPDATE phase_executions SET status = $3, dispatched_at = $4 \
                 WHERE id = $1 AND status = $2",
            )
            .bind(id.value())
            .bind(from.to_string())
            .bind(to.to_string())
            .bind(now)
            .execute(&self.pool)
            .await?
        } else if to.is_terminal() {
            sqlx::query(
                "UPDATE phase_executions SET status = $3, completed_at = $4 \
                 WHERE id = $1 AND status = $2",
            )
            .bind(id.value())
            .bind(from.to_string())
            .bind(to.to_string())
            .bind(now)
            .execute(&self.pool)
            .await?
        } else {
            sqlx::query(
                "UPDATE phase_executions SET status = $3 WHERE id = $1 AND status = $2",
            )
            .bind(id.value())
            .bind(from.to_string())
            .bind(to.to_string())
            .execute(&self.pool)
            .await?
        };
        Ok(result.rows_affected() == 1)
    }

    // -- step executions --

    async fn insert_step_executions(
        &self,
        rows: Vec<NewStepExecution>,
        now: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let mut inserted = 0;
        for new in rows {
            let result = sqlx::query(
                "INSERT INTO step_executions \
                   (phase_execution_id, batch_member_id, step_name, step_index, worker_id, \
                    function_name, params_json, status, is_poll_step, poll_interval_secs, \
                    poll_timeout_secs, on_failure, max_retries, retry_interval_secs, \
                    created_at, updated_at) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $15) \
                 ON CONFLICT (phase_execution_id, batch_member_id, step_index) DO NOTHING",
            )
            .bind(new.phase_execution_id.value())
            .bind(new.batch_member_id.value())
            .bind(&new.step_name)
            .bind(new.step_index)
            .bind(&new.worker_id)
            .bind(&new.function_name)
            .bind(params_to_value(&new.params_json)?)
            .bind(StepStatus::Pending.to_string())
            .bind(new.is_poll_step)
            .bind(new.poll_interval_secs)
            .bind(new.poll_timeout_secs)
            .bind(new.on_failure)
            .bind(new.max_retries)
            .bind(new.retry_interval_secs)
            .bind(now)
            .execute(&self.pool)
            .await?;
            inserted += result.rows_affected();
        }
        Ok(inserted)
    }

    async fn get_step_execution(
        &self,
        id: StepExecutionId,
    ) -> Result<Option<StepExecution>, StoreError> {
        let row = sqlx::query("SELECT * FROM step_executions WHERE id = $1")
            .bind(id.value())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(step_from_row).transpose()
    }

    async fn steps_of_phase(
        &self,
        phase_execution_id: PhaseExecutionId,
    ) -> Result<Vec<StepExecution>, StoreError> {
        let rows = sqlx::query(
            "SELECT * FROM step_executions WHERE phase_execution_id = $1 \
             ORDER BY batch_member_id, step_index",
        )
        .bind(phase_execution_id.value())
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(step_from_row).collect()
    }

    async fn non_terminal_steps_of_member(
        &self,
        member_id: MemberId,
    ) -> Result<Vec<StepExecution>, StoreError> {
        let rows = sqlx::query(
            "SELECT * FROM step_executions \
             WHERE batch_member_id = $1 \
               AND status <> $2 AND status <> $3 AND status <> $4 AND status <> $5 \
             ORDER BY phase_execution_id, step_index",
        )
        .bind(member_id.value())
        .bind(StepStatus::Succeeded.to_string())
        .bind(StepStatus::Failed.to_string())
        .bind(StepStatus::PollTimeout.to_string())
        .bind(StepStatus::Cancelled.to_string())
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(step_from_row).collect()
    }

    async fn cas_step_status(
        &self,
        id: StepExecutionId,
        from: StepStatus,
        to: StepStatus,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE step_executions SET status = $3, updated_at = $4 \
             WHERE id = $1 AND status = $2",
        )
        .bind(id.value())
        .bind(from.to_string())
        .bind(to.to_string())
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn mark_step_dispatched(
        &self,
        id: StepExecutionId,
        from: StepStatus,
        job_id: &JobId,
        params_json: HashMap<String, String>,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE step_executions \
             SET status = $3, job_id = $4, params_json = $5, updated_at = $6 \
             WHERE id = $1 AND status = $2",
        )
        .bind(id.value())
        .bind(from.to_string())
        .bind(StepStatus::Dispatched.to_string())
        .bind(job_id.as_str())
        .bind(params_to_value(&params_json)?)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn succeed_step(
        &self,
        id: StepExecutionId,
        from: StepStatus,
        result_json: Option<Value>,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE step_executions \
             SET status = $3, result_json = $4, updated_at = $5 \
             WHERE id = $1 AND status = $2",
        )
        .bind(id.value())
        .bind(from.to_string())
        .bind(StepStatus::Succeeded.to_string())
        .bind(result_json)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn fail_step(
        &self,
        id: StepExecutionId,
        from: StepStatus,
        to: StepStatus,
        error_message: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE step_executions \
             SET status = $3, error_message = $4, updated_at = $5 \
             WHERE id = $1 AND status = $2",
        )
        .bind(id.value())
        .bind(from.to_string())
        .bind(to.to_string())
        .bind(error_message)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn step_retry_bookkeeping(
        &self,
        id: StepExecutionId,
        from: StepStatus,
        retry_after: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE step_executions \
             SET status = $3, retry_count = retry_count + 1, retry_after = $4, \
                 updated_at = $5 \
             WHERE id = $1 AND status = $2",
        )
        .bind(id.value())
        .bind(from.to_string())
        .bind(StepStatus::Pending.to_string())
        .bind(retry_after)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn step_poll_bookkeeping(
        &self,
        id: StepExecutionId,
        from: StepStatus,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE step_executions \
             SET status = $3, poll_started_at = COALESCE(poll_started_at, $4), \
                 last_polled_at = $4, poll_count = poll_count + 1, updated_at = $4 \
             WHERE id = $1 AND status = $2",
        )
        .bind(id.value())
        .bind(from.to_string())
        .bind(StepStatus::Polling.to_string())
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    // -- init executions --

    async fn insert_init_executions(
        &self,
        rows: Vec<NewInitExecution>,
        now: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let Some(first) = rows.first() else {
            return Ok(0);
        };
        let mut tx = self.pool.begin().await?;

        let exists: bool = sqlx::query(
            "SELECT EXISTS( \
               SELECT 1 FROM init_executions WHERE batch_id = $1 AND runbook_version = $2 \
             ) AS present",
        )
        .bind(first.batch_id.value())
        .bind(first.runbook_version)
        .fetch_one(&mut *tx)
        .await?
        .try_get("present")?;

        if exists {
            tx.rollback().await?;
            return Ok(0);
        }

        let mut inserted = 0;
        for new in rows {
            let result = sqlx::query(
                "INSERT INTO init_executions \
                   (batch_id, runbook_version, step_name, step_index, worker_id, \
                    function_name, params_json, status, is_poll_step, poll_interval_secs, \
                    poll_timeout_secs, on_failure, max_retries, retry_interval_secs, \
                    created_at, updated_at) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $15) \
                 ON CONFLICT (batch_id, runbook_version, step_index) DO NOTHING",
            )
            .bind(new.batch_id.value())
            .bind(new.runbook_version)
            .bind(&new.step_name)
            .bind(new.step_index)
            .bind(&new.worker_id)
            .bind(&new.function_name)
            .bind(params_to_value(&new.params_json)?)
            .bind(StepStatus::Pending.to_string())
            .bind(new.is_poll_step)
            .bind(new.poll_interval_secs)
            .bind(new.poll_timeout_secs)
            .bind(new.on_failure)
            .bind(new.max_retries)
            .bind(new.retry_interval_secs)
            .bind(now)
            .execute(&mut *tx)
            .await?;
            inserted += result.rows_affected();
        }

        tx.commit().await?;
        Ok(inserted)
    }

    async fn get_init_execution(
        &self,
        id: InitExecutionId,
    ) -> Result<Option<InitExecution>, StoreError> {
        let row = sqlx::query("SELECT * FROM init_executions WHERE id = $1")
            .bind(id.value())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(init_from_row).transpose()
    }

    async fn inits_of_batch(
        &self,
        batch_id: BatchId,
        runbook_version: i32,
    ) -> Result<Vec<InitExecution>, StoreError> {
        let rows = sqlx::query(
            "SELECT * FROM init_executions \
             WHERE batch_id = $1 AND runbook_version = $2 \
             ORDER BY step_index",
        )
        .bind(batch_id.value())
        .bind(runbook_version)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(init_from_row).collect()
    }

    async fn cas_init_status(
        &self,
        id: InitExecutionId,
        from: StepStatus,
        to: StepStatus,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE init_executions SET status = $3, updated_at = $4 \
             WHERE id = $1 AND status = $2",
        )
        .bind(id.value())
        .bind(from.to_string())
        .bind(to.to_string())
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn mark_init_dispatched(
        &self,
        id: InitExecutionId,
        from: StepStatus,
        job_id: &JobId,
        params_json: HashMap<String, String>,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE init_executions \
             SET status = $3, job_id = $4, params_json = $5, updated_at = $6 \
             WHERE id = $1 AND status = $2",
        )
        .bind(id.value())
        .bind(from.to_string())
        .bind(StepStatus::Dispatched.to_string())
        .bind(job_id.as_str())
        .bind(params_to_value(&params_json)?)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn succeed_init(
        &self,
        id: InitExecutionId,
        from: StepStatus,
        result_json: Option<Value>,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE init_executions \
             SET status = $3, result_json = $4, updated_at = $5 \
             WHERE id = $1 AND status = $2",
        )
        .bind(id.value())
        .bind(from.to_string())
        .bind(StepStatus::Succeeded.to_string())
        .bind(result_json)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn fail_init(
        &self,
        id: InitExecutionId,
        from: StepStatus,
        to: StepStatus,
        error_message: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE init_executions \
             SET status = $3, error_message = $4, updated_at = $5 \
             WHERE id = $1 AND status = $2",
        )
        .bind(id.value())
        .bind(from.to_string())
        .bind(to.to_string())
        .bind(error_message)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn init_retry_bookkeeping(
        &self,
        id: InitExecutionId,
        from: StepStatus,
        retry_after: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE init_executions \
             SET status = $3, retry_count = retry_count + 1, retry_after = $4, \
                 updated_at = $5 \
             WHERE id = $1 AND status = $2",
        )
        .bind(id.value())
        .bind(from.to_string())
        .bind(StepStatus::Pending.to_string())
        .bind(retry_after)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn init_poll_bookkeeping(
        &self,
        id: InitExecutionId,
        from: StepStatus,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE init_executions \
             SET status = $3, poll_started_at = COALESCE(poll_started_at, $4), \
                 last_polled_at = $4, poll_count = poll_count + 1, updated_at = $4 \
             WHERE id = $1 AND status = $2",
        )
        .bind(id.value())
        .bind(from.to_string())
        .bind(StepStatus::Polling.to_string())
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }
}
