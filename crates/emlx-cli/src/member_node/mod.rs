//! DataONE member node access
//!
//! [`MemberNode`] is the seam between the upload pipeline and the network.
//! [`HttpMemberNode`] talks to a real node; tests substitute an in-memory
//! implementation. [`Retrying`] wraps either and retries transient failures.

pub mod client;
pub mod endpoints;
pub mod types;

pub use client::HttpMemberNode;
pub use types::*;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Operations the pipeline needs from a member node
#[async_trait]
pub trait MemberNode: Send + Sync {
    /// Store an object with its system metadata, returning the stored identifier
    async fn create(&self, pid: &str, object: &[u8], sysmeta: &SystemMetadata) -> Result<String, ServiceError>;

    async fn get_system_metadata(&self, pid: &str) -> Result<SystemMetadata, ServiceError>;

    async fn update_system_metadata(&self, pid: &str, sysmeta: &SystemMetadata) -> Result<(), ServiceError>;

    /// One page of objects, optionally only those modified since `from_date`
    async fn list_objects(
        &self,
        start: u32,
        count: u32,
        from_date: Option<DateTime<Utc>>,
    ) -> Result<ObjectList, ServiceError>;
}

/// Bounded retry with exponential backoff for transient failures
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts per call, including the first
    pub max_attempts: u32,
    pub base_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            base_delay_ms: 100,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay_ms: u64) -> Self {
        Self {
            max_attempts,
            base_delay_ms,
        }
    }

    /// Delay before retry number `attempt` (0-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.base_delay_ms.saturating_mul(1u64 << attempt.min(16)))
    }

    pub async fn run<T, F, Fut>(&self, operation: &str, mut call: F) -> Result<T, ServiceError>
    where
        F: FnMut() -> Fut + Send,
        Fut: Future<Output = Result<T, ServiceError>> + Send,
        T: Send,
    {
        let attempts = self.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            match call().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempt + 1 < attempts => {
                    let delay = self.delay_for(attempt);
                    warn!(
                        operation,
                        attempt = attempt + 1,
                        max_attempts = attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Transient member node failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                },
                Err(e) => return Err(e),
            }
        }
    }
}

/// A member node whose calls are retried under a [`RetryPolicy`]
#[derive(Debug, Clone)]
pub struct Retrying<N> {
    inner: N,
    policy: RetryPolicy,
}

impl<N: MemberNode> Retrying<N> {
    pub fn new(inner: N, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }
}

#[async_trait]
impl<N: MemberNode> MemberNode for Retrying<N> {
    async fn create(&self, pid: &str, object: &[u8], sysmeta: &SystemMetadata) -> Result<String, ServiceError> {
        self.policy
            .run("create", || self.inner.create(pid, object, sysmeta))
            .await
    }

    async fn get_system_metadata(&self, pid: &str) -> Result<SystemMetadata, ServiceError> {
        self.policy
            .run("getSystemMetadata", || self.inner.get_system_metadata(pid))
            .await
    }

    async fn update_system_metadata(&self, pid: &str, sysmeta: &SystemMetadata) -> Result<(), ServiceError> {
        self.policy
            .run("updateSystemMetadata", || self.inner.update_system_metadata(pid, sysmeta))
            .await
    }

    async fn list_objects(
        &self,
        start: u32,
        count: u32,
        from_date: Option<DateTime<Utc>>,
    ) -> Result<ObjectList, ServiceError> {
        self.policy
            .run("listObjects", || self.inner.list_objects(start, count, from_date))
            .await
    }
}
