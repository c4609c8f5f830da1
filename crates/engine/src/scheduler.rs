// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scheduler: the periodic tick
//!
//! One lease-guarded loop that parses active runbooks, queries their data
//! sources, detects and syncs batches, fires overdue phases, and applies
//! version transitions. Everything it decides is written to the store and
//! announced on the bus; the orchestrator does the rest.

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::phases::{phase_rows_for_batch, version_transition};
use crate::runtime::publish_event;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use convoy_adapters::{SourceClient, SourceError, SourceRow};
use convoy_bus::Bus;
use convoy_core::{
    floor_to_bucket, Batch, BatchInitMsg, BatchStatus, Clock, MemberEventMsg, MemberStatus,
    OrchestratorEvent, PhaseDueMsg, PhaseStatus, Runbook,
};
use convoy_runbook::{parse_runbook, BatchTiming, RunbookDef};
use convoy_storage::{LeaseLock, NewBatch, NewMember, Store, StoreError};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::watch;

/// Name of the scheduler's lease.
const TICK_LEASE: &str = "scheduler-tick";

/// Timer-driven half of the engine.
pub struct Scheduler<S, B, Q, L, C> {
    store: Arc<S>,
    bus: Arc<B>,
    source: Arc<Q>,
    lock: Arc<L>,
    clock: C,
    config: Arc<EngineConfig>,
    holder: String,
}

impl<S, B, Q, L, C> Scheduler<S, B, Q, L, C>
where
    S: Store,
    B: Bus,
    Q: SourceClient,
    L: LeaseLock,
    C: Clock,
{
    pub fn new(
        store: Arc<S>,
        bus: Arc<B>,
        source: Arc<Q>,
        lock: Arc<L>,
        clock: C,
        config: Arc<EngineConfig>,
    ) -> Self {
        Self {
            store,
            bus,
            source,
            lock,
            clock,
            config,
            holder: uuid::Uuid::new_v4().to_string(),
        }
    }

    /// Run ticks at the configured interval until shutdown.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(self.config.tick_interval);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.tick().await {
                        tracing::error!(error = %e, "scheduler tick failed");
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
    }

    /// One tick: no-op unless this instance holds the tick lease.
    pub async fn tick(&self) -> Result<(), EngineError> {
        let now = self.clock.now();
        let ttl = ChronoDuration::seconds(self.config.lock_ttl_secs);
        if !self.lock.acquire(TICK_LEASE, &self.holder, ttl, now).await? {
            tracing::debug!("tick lease held elsewhere, skipping");
            return Ok(());
        }
        let result = self.tick_locked().await;
        self.lock.release(TICK_LEASE, &self.holder).await?;
        result
    }

    async fn tick_locked(&self) -> Result<(), EngineError> {
        let runbooks = self.store.list_active_runbooks().await?;
        for runbook in runbooks {
            let enabled = self
                .store
                .automation(&runbook.name)
                .await?
                .map(|s| s.enabled)
                .unwrap_or(false);
            if !enabled {
                continue;
            }

            // A document that stops parsing is an operator problem; the
            // runbook is not failed, it is skipped until repaired.
            let def = match parse_runbook(&runbook.document) {
                Ok(def) => def,
                Err(e) => {
                    tracing::error!(
                        severity = "critical",
                        runbook = %runbook.name,
                        version = runbook.version,
                        error = %e,
                        "runbook document no longer parses, skipping"
                    );
                    continue;
                }
            };

            let rows = match self.query_source(&def).await {
                Ok(rows) => rows,
                Err(e) => {
                    tracing::error!(runbook = %runbook.name, error = %e, "source query failed");
                    continue;
                }
            };

            if let Err(e) = self.process_runbook(&runbook, &def, &rows).await {
                tracing::error!(runbook = %runbook.name, error = %e, "runbook processing failed");
            }
        }
        Ok(())
    }

    async fn query_source(&self, def: &RunbookDef) -> Result<Vec<SourceRow>, SourceError> {
        match tokio::time::timeout(
            self.config.query_timeout,
            self.source.execute(&def.data_source),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(SourceError::Timeout {
                seconds: self.config.query_timeout.as_secs(),
            }),
        }
    }

    async fn process_runbook(
        &self,
        runbook: &Runbook,
        def: &RunbookDef,
        rows: &[SourceRow],
    ) -> Result<(), EngineError> {
        match def.data_source.batch_timing() {
            BatchTiming::Column(_) => self.detect_scheduled_batches(runbook, def, rows).await?,
            BatchTiming::Immediate => self.detect_immediate_batches(runbook, def, rows).await?,
        }

        for batch in self.store.active_batches_for_runbook(&runbook.name).await? {
            if !batch.is_manual {
                self.sync_members(runbook, def, &batch, rows).await?;
            }
            self.transition_version(runbook, def, &batch).await?;
            self.fire_due_phases(runbook, &batch).await?;
        }
        Ok(())
    }

    // -- batch detection --

    async fn detect_scheduled_batches(
        &self,
        runbook: &Runbook,
        def: &RunbookDef,
        rows: &[SourceRow],
    ) -> Result<(), EngineError> {
        let mut groups: HashMap<DateTime<Utc>, Vec<&SourceRow>> = HashMap::new();
        for row in rows {
            let Some(_key) = row.member_key(&def.data_source) else {
                tracing::warn!(runbook = %runbook.name, "row missing primary key, skipping");
                continue;
            };
            let Some(start) = row.batch_time(&def.data_source) else {
                tracing::warn!(runbook = %runbook.name, "row batch time unparseable, skipping");
                continue;
            };
            groups.entry(start).or_default().push(row);
        }

        for (start, group) in groups {
            // Look-up by name, never by version-specific id: a batch
            // detected under v1 must not be re-detected after v2 ships.
            if self
                .store
                .find_batch_by_start_time(&runbook.name, start)
                .await?
                .is_some()
            {
                continue;
            }
            self.create_batch(runbook, def, Some(start), &group, None)
                .await?;
        }
        Ok(())
    }

    async fn detect_immediate_batches(
        &self,
        runbook: &Runbook,
        def: &RunbookDef,
        rows: &[SourceRow],
    ) -> Result<(), EngineError> {
        let now = self.clock.now();
        let bucket = floor_to_bucket(now, self.config.immediate_bucket_minutes);

        // Members already active in a batch of this runbook are filtered
        // out; only genuinely new keys join the current bucket.
        let mut known_keys: HashSet<String> = HashSet::new();
        for batch in self.store.active_batches_for_runbook(&runbook.name).await? {
            for member in self.store.members_of_batch(batch.id).await? {
                if member.status == MemberStatus::Active {
                    known_keys.insert(member.member_key);
                }
            }
        }

        let fresh: Vec<&SourceRow> = rows
            .iter()
            .filter(|row| {
                row.member_key(&def.data_source)
                    .map(|key| !known_keys.contains(key))
                    .unwrap_or(false)
            })
            .collect();
        if fresh.is_empty() {
            return Ok(());
        }

        match self
            .store
            .find_batch_by_start_time(&runbook.name, bucket)
            .await?
        {
            Some(batch) if !batch.status.is_terminal() => {
                // Bucket batch already announced; newcomers go through the
                // member-added path.
                for row in fresh {
                    self.add_member_to_batch(runbook, def, &batch, row, true)
                        .await?;
                }
            }
            Some(batch) => {
                tracing::warn!(
                    batch = %batch.id,
                    "current bucket batch already terminal, deferring rows to next bucket"
                );
            }
            None => {
                self.create_batch(runbook, def, Some(bucket), &fresh, Some(bucket))
                    .await?;
            }
        }
        Ok(())
    }

    /// Create a batch with its members and phase rows, and announce it.
    ///
    /// `immediate_due` overrides every phase's due time with the bucket
    /// time (offsets are ignored for immediate batches).
    async fn create_batch(
        &self,
        runbook: &Runbook,
        def: &RunbookDef,
        start: Option<DateTime<Utc>>,
        rows: &[&SourceRow],
        immediate_due: Option<DateTime<Utc>>,
    ) -> Result<(), EngineError> {
        let now = self.clock.now();
        let status = if def.init.is_empty() {
            BatchStatus::Active
        } else {
            BatchStatus::Detected
        };
        let batch = self
            .store
            .insert_batch(
                NewBatch {
                    runbook_id: runbook.id,
                    batch_start_time: start,
                    status,
                    is_manual: false,
                    created_by: None,
                },
                now,
            )
            .await?;

        let mut member_count = 0u64;
        for row in rows {
            let Some(key) = row.member_key(&def.data_source) else {
                continue;
            };
            let inserted = self
                .store
                .insert_member(
                    NewMember {
                        batch_id: batch.id,
                        member_key: key.to_string(),
                        data_json: row.freeze(&def.data_source),
                    },
                    now,
                )
                .await?;
            if let Some(member) = inserted {
                // Initial members ride along with batch-init; no separate
                // member-added announcement.
                self.store.mark_member_add_dispatched(member.id, now).await?;
                member_count += 1;
            }
        }

        let mut phase_rows = phase_rows_for_batch(def, runbook.version, &batch);
        if let Some(due) = immediate_due {
            for row in &mut phase_rows {
                row.due_at = Some(due);
            }
        }
        for row in phase_rows {
            match self.store.insert_phase_execution(row, now).await {
                Ok(_) => {}
                Err(StoreError::Conflict(_)) => {}
                Err(e) => return Err(e.into()),
            }
        }

        tracing::info!(
            runbook = %runbook.name,
            version = runbook.version,
            batch = %batch.id,
            members = member_count,
            start = ?start,
            "batch detected"
        );
        self.publish(&OrchestratorEvent::BatchInit(BatchInitMsg {
            runbook_name: runbook.name.clone(),
            runbook_version: runbook.version,
            batch_id: batch.id,
            batch_start_time: batch.batch_start_time,
            member_count,
        }))
        .await
    }

    // -- member sync --

    async fn sync_members(
        &self,
        runbook: &Runbook,
        def: &RunbookDef,
        batch: &Batch,
        rows: &[SourceRow],
    ) -> Result<(), EngineError> {
        let now = self.clock.now();

        // Rows belonging to this batch: the matching time group for
        // scheduled sources, every row for immediate ones.
        let batch_rows: Vec<&SourceRow> = match def.data_source.batch_timing() {
            BatchTiming::Column(_) => rows
                .iter()
                .filter(|row| row.batch_time(&def.data_source) == batch.batch_start_time)
                .collect(),
            BatchTiming::Immediate => rows.iter().collect(),
        };
        let source_keys: HashSet<&str> = batch_rows
            .iter()
            .filter_map(|row| row.member_key(&def.data_source))
            .collect();

        let members = self.store.members_of_batch(batch.id).await?;
        let member_keys: HashSet<&str> = members.iter().map(|m| m.member_key.as_str()).collect();

        // Additions (scheduled batches only; immediate newcomers form new
        // buckets instead).
        if matches!(def.data_source.batch_timing(), BatchTiming::Column(_)) {
            for row in &batch_rows {
                let Some(key) = row.member_key(&def.data_source) else {
                    continue;
                };
                if !member_keys.contains(key) {
                    self.add_member_to_batch(runbook, def, batch, row, true)
                        .await?;
                }
            }
        }

        for member in &members {
            let present = source_keys.contains(member.member_key.as_str());
            match member.status {
                MemberStatus::Active if !present => {
                    let won = self
                        .store
                        .cas_member_status(
                            member.id,
                            MemberStatus::Active,
                            MemberStatus::Removed,
                            now,
                        )
                        .await?;
                    if won {
                        tracing::info!(
                            batch = %batch.id,
                            member = %member.id,
                            key = %member.member_key,
                            "member removed from source"
                        );
                        self.announce_member(runbook, batch, member.id, &member.member_key, false)
                            .await?;
                    }
                }
                MemberStatus::Removed if present => {
                    let won = self
                        .store
                        .cas_member_status(
                            member.id,
                            MemberStatus::Removed,
                            MemberStatus::Active,
                            now,
                        )
                        .await?;
                    if won {
                        tracing::info!(
                            batch = %batch.id,
                            member = %member.id,
                            key = %member.member_key,
                            "member reappeared in source"
                        );
                        self.announce_member(runbook, batch, member.id, &member.member_key, true)
                            .await?;
                    }
                }
                // Publish failures are repaired here: any row whose
                // dispatch marker is still null gets re-announced.
                MemberStatus::Active if member.add_dispatched_at.is_none() => {
                    self.announce_member(runbook, batch, member.id, &member.member_key, true)
                        .await?;
                }
                MemberStatus::Removed if member.remove_dispatched_at.is_none() => {
                    self.announce_member(runbook, batch, member.id, &member.member_key, false)
                        .await?;
                }
                _ => {}
            }
        }
        Ok(())
    }

    async fn add_member_to_batch(
        &self,
        runbook: &Runbook,
        def: &RunbookDef,
        batch: &Batch,
        row: &SourceRow,
        announce: bool,
    ) -> Result<(), EngineError> {
        let now = self.clock.now();
        let Some(key) = row.member_key(&def.data_source) else {
            return Ok(());
        };
        let inserted = self
            .store
            .insert_member(
                NewMember {
                    batch_id: batch.id,
                    member_key: key.to_string(),
                    data_json: row.freeze(&def.data_source),
                },
                now,
            )
            .await?;
        let Some(member) = inserted else {
            return Ok(());
        };
        tracing::info!(
            batch = %batch.id,
            member = %member.id,
            key = %member.member_key,
            "member added"
        );
        if announce {
            self.announce_member(runbook, batch, member.id, &member.member_key, true)
                .await?;
        } else {
            self.store.mark_member_add_dispatched(member.id, now).await?;
        }
        Ok(())
    }

    /// Publish `member-added` / `member-removed` and stamp the dispatch
    /// marker. DB writes stand even when the publish fails; the null
    /// marker makes the next tick retry.
    async fn announce_member(
        &self,
        runbook: &Runbook,
        batch: &Batch,
        member_id: convoy_core::MemberId,
        member_key: &str,
        added: bool,
    ) -> Result<(), EngineError> {
        let msg = MemberEventMsg {
            runbook_name: runbook.name.clone(),
            runbook_version: runbook.version,
            batch_id: batch.id,
            batch_member_id: member_id,
            member_key: member_key.to_string(),
        };
        let event = if added {
            OrchestratorEvent::MemberAdded(msg)
        } else {
            OrchestratorEvent::MemberRemoved(msg)
        };
        self.publish(&event).await?;
        let now = self.clock.now();
        if added {
            self.store.mark_member_add_dispatched(member_id, now).await?;
        } else {
            self.store
                .mark_member_remove_dispatched(member_id, now)
                .await?;
        }
        Ok(())
    }

    // -- overdue phases --

    async fn fire_due_phases(&self, runbook: &Runbook, batch: &Batch) -> Result<(), EngineError> {
        if batch.status != BatchStatus::Active {
            return Ok(());
        }
        let now = self.clock.now();
        let phases = self.store.phases_of_batch(batch.id).await?;
        for phase in phases {
            let due = phase
                .due_at
                .map(|d| d <= now)
                .unwrap_or(false);
            if phase.status != PhaseStatus::Pending || !due {
                continue;
            }
            let won = self
                .store
                .cas_phase_status(phase.id, PhaseStatus::Pending, PhaseStatus::Dispatched, now)
                .await?;
            if !won {
                continue;
            }
            let member_ids = self
                .store
                .members_of_batch(batch.id)
                .await?
                .into_iter()
                .filter(|m| m.status == MemberStatus::Active)
                .map(|m| m.id)
                .collect();
            tracing::info!(
                batch = %batch.id,
                phase = %phase.phase_name,
                version = phase.runbook_version,
                "phase due"
            );
            // The message carries the version of the phase row being
            // dispatched, never the currently active version.
            self.publish(&OrchestratorEvent::PhaseDue(PhaseDueMsg {
                phase_execution_id: phase.id,
                phase_name: phase.phase_name.clone(),
                batch_id: batch.id,
                runbook_name: runbook.name.clone(),
                runbook_version: phase.runbook_version,
                offset_minutes: phase.offset_minutes,
                due_at: phase.due_at,
                member_ids,
            }))
            .await?;
            self.store
                .set_batch_current_phase(batch.id, Some(phase.phase_name.clone()))
                .await?;
        }
        Ok(())
    }

    // -- version transition --

    async fn transition_version(
        &self,
        runbook: &Runbook,
        def: &RunbookDef,
        batch: &Batch,
    ) -> Result<(), EngineError> {
        let now = self.clock.now();
        let existing = self.store.phases_of_batch(batch.id).await?;
        let delta = version_transition(
            def,
            runbook.version,
            batch,
            &existing,
            runbook.overdue_behavior,
            now,
        );
        if delta.new_rows.is_empty() && delta.supersede.is_empty() {
            return Ok(());
        }

        tracing::info!(
            batch = %batch.id,
            version = runbook.version,
            new_phases = delta.new_rows.len(),
            superseded = delta.supersede.len(),
            "applying version transition"
        );
        let had_new_rows = !delta.new_rows.is_empty();
        for row in delta.new_rows {
            match self.store.insert_phase_execution(row, now).await {
                Ok(_) => {}
                // Another writer got there first; their row is as good.
                Err(StoreError::Conflict(_)) => {}
                Err(e) => return Err(e.into()),
            }
        }
        for phase_id in delta.supersede {
            self.store
                .cas_phase_status(phase_id, PhaseStatus::Pending, PhaseStatus::Superseded, now)
                .await?;
        }

        if had_new_rows && runbook.rerun_init && !def.init.is_empty() {
            let member_count = self
                .store
                .members_of_batch(batch.id)
                .await?
                .iter()
                .filter(|m| m.status == MemberStatus::Active)
                .count() as u64;
            self.publish(&OrchestratorEvent::BatchInit(BatchInitMsg {
                runbook_name: runbook.name.clone(),
                runbook_version: runbook.version,
                batch_id: batch.id,
                batch_start_time: batch.batch_start_time,
                member_count,
            }))
            .await?;
        }
        // Newly pending past-due rows are dispatched by the due-phase
        // pass that follows this transition in the tick.
        Ok(())
    }

    async fn publish(&self, event: &OrchestratorEvent) -> Result<(), EngineError> {
        publish_event(
            self.bus.as_ref(),
            &self.config.topics.orchestrator_events,
            event,
            None,
        )
        .await
    }
}

#[cfg(test)]
#[path = "scheduler_tests.rs"]
mod tests;
