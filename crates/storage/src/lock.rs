// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Best-effort distributed lease lock
//!
//! Guards the scheduler tick and version-transition writers against
//! overlapping runs. The engine stays correct (just slower) if two holders
//! ever overlap; all safety comes from CAS, deterministic job ids, and
//! unique constraints.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::PgPool;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LockError {
    #[error("lock backend error: {0}")]
    Backend(String),
}

impl From<sqlx::Error> for LockError {
    fn from(e: sqlx::Error) -> Self {
        LockError::Backend(e.to_string())
    }
}

/// A named lease with TTL; expired leases are free for the taking.
#[async_trait]
pub trait LeaseLock: Send + Sync + 'static {
    /// Try to take the lease. Returns false when another holder has it.
    async fn acquire(
        &self,
        name: &str,
        holder: &str,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> Result<bool, LockError>;

    /// Extend a held lease; returns false when the lease was lost.
    async fn renew(
        &self,
        name: &str,
        holder: &str,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> Result<bool, LockError>;

    /// Release a held lease (no-op when not the holder).
    async fn release(&self, name: &str, holder: &str) -> Result<(), LockError>;
}

/// Lease lock over the `leases` table.
#[derive(Clone)]
pub struct PgLeaseLock {
    pool: PgPool,
}

impl PgLeaseLock {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LeaseLock for PgLeaseLock {
    async fn acquire(
        &self,
        name: &str,
        holder: &str,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> Result<bool, LockError> {
        let result = sqlx::query(
            "INSERT INTO leases (name, holder, expires_at) VALUES ($1, $2, $3) \
             ON CONFLICT (name) DO UPDATE SET holder = $2, expires_at = $3 \
             WHERE leases.expires_at <= $4 OR leases.holder = $2",
        )
        .bind(name)
        .bind(holder)
        .bind(now + ttl)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn renew(
        &self,
        name: &str,
        holder: &str,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> Result<bool, LockError> {
        let result = sqlx::query(
            "UPDATE leases SET expires_at = $3 \
             WHERE name = $1 AND holder = $2 AND expires_at > $4",
        )
        .bind(name)
        .bind(holder)
        .bind(now + ttl)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn release(&self, name: &str, holder: &str) -> Result<(), LockError> {
        sqlx::query("DELETE FROM leases WHERE name = $1 AND holder = $2")
            .bind(name)
            .bind(holder)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

/// In-memory lease lock for tests.
#[cfg(any(test, feature = "test-support"))]
#[derive(Clone, Default)]
pub struct MemLeaseLock {
    leases: std::sync::Arc<parking_lot::Mutex<std::collections::HashMap<String, Lease>>>,
}

#[cfg(any(test, feature = "test-support"))]
#[derive(Clone)]
struct Lease {
    holder: String,
    expires_at: DateTime<Utc>,
}

#[cfg(any(test, feature = "test-support"))]
impl MemLeaseLock {
    pub fn new() -> Self {
        Self::default()
    }
}

#[cfg(any(test, feature = "test-support"))]
#[async_trait]
impl LeaseLock for MemLeaseLock {
    async fn acquire(
        &self,
        name: &str,
        holder: &str,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> Result<bool, LockError> {
        let mut leases = self.leases.lock();
        match leases.get(name) {
            Some(lease) if lease.expires_at > now && lease.holder != holder => Ok(false),
            _ => {
                leases.insert(
                    name.to_string(),
                    Lease {
                        holder: holder.to_string(),
                        expires_at: now + ttl,
                    },
                );
                Ok(true)
            }
        }
    }

    async fn renew(
        &self,
        name: &str,
        holder: &str,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> Result<bool, LockError> {
        let mut leases = self.leases.lock();
        match leases.get_mut(name) {
            Some(lease) if lease.holder == holder && lease.expires_at > now => {
                lease.expires_at = now + ttl;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn release(&self, name: &str, holder: &str) -> Result<(), LockError> {
        let mut leases = self.leases.lock();
        if leases.get(name).map(|l| l.holder == holder).unwrap_or(false) {
            leases.remove(name);
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "lock_tests.rs"]
mod tests;
