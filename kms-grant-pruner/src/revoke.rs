// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use crate::{GrantId, GrantRecord, KeyId};
use aws_sdk_kms::{
    config::retry::RetryConfig,
    error::{DisplayErrorContext, ProvideErrorMetadata, SdkError},
    operation::revoke_grant::RevokeGrantError,
    Client,
};
use serde::Serialize;
use std::{error::Error, sync::Arc, time::Duration};
use tokio::{sync::Semaphore, task::JoinSet};

/// Error codes which indicate that the request was rejected because of load,
/// and may succeed later.
const THROTTLING_CODES: &[&str] = &[
    "ThrottlingException",
    "Throttling",
    "TooManyRequestsException",
    "RequestLimitExceeded",
];

/// Bounded exponential backoff for transient revocation failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// The total number of attempts per grant, including the first one.
    pub max_attempts: u32,
    /// The delay before the first retry. It doubles on every following retry.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(200),
        }
    }
}

impl RetryPolicy {
    /// The delay after the `attempt`th failed attempt (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.base_delay.saturating_mul(1 << exponent)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RevocationStatus {
    Revoked,
    /// No call was made, e.g. in a dry run.
    Skipped,
    Failed { reason: String, retryable: bool },
}

/// The result of revoking a single grant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RevocationOutcome {
    pub grant_id: GrantId,
    pub principal_arn: String,
    pub created_at: i64,
    pub attempts: u32,
    #[serde(flatten)]
    pub status: RevocationStatus,
}

impl RevocationOutcome {
    fn new(target: &GrantRecord, attempts: u32, status: RevocationStatus) -> Self {
        Self {
            grant_id: target.grant_id.clone(),
            principal_arn: target.principal_arn.clone(),
            created_at: target.created_at,
            attempts,
            status,
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self.status, RevocationStatus::Failed { .. })
    }
}

/// Revoke grants on a single KMS key.
///
/// Every grant is attempted independently. A failure to revoke one grant is
/// recorded in its [`RevocationOutcome`] and never prevents the attempts on the
/// other grants.
///
/// The `Revoker` owns the retries of `RevokeGrant`: the client it is given is
/// reconfigured with the SDK's retries disabled, so that a grant is never
/// attempted more than [`RetryPolicy::max_attempts`] times.
#[derive(Debug, Clone)]
pub struct Revoker {
    kms_client: Client,
    key_id: Arc<KeyId>,
    retry: RetryPolicy,
    /// The maximum number of in-flight `RevokeGrant` calls.
    concurrency: usize,
}

impl Revoker {
    pub fn new(kms_client: Client, key_id: KeyId, retry: RetryPolicy, concurrency: usize) -> Self {
        let kms_config = kms_client
            .config()
            .to_builder()
            .retry_config(RetryConfig::disabled())
            .build();
        Self {
            kms_client: Client::from_conf(kms_config),
            key_id: Arc::new(key_id),
            retry,
            concurrency: concurrency.max(1),
        }
    }

    /// The outcomes of a dry run: nothing is revoked.
    pub fn skip_all(targets: &[GrantRecord]) -> Vec<RevocationOutcome> {
        targets
            .iter()
            .map(|target| RevocationOutcome::new(target, 0, RevocationStatus::Skipped))
            .collect()
    }

    /// Revoke every target, returning one outcome per target in target order.
    pub async fn revoke_all(&self, targets: Vec<GrantRecord>) -> Vec<RevocationOutcome> {
        if self.concurrency == 1 {
            let mut outcomes = Vec::with_capacity(targets.len());
            for target in targets {
                outcomes.push(self.revoke(target).await);
            }
            return outcomes;
        }

        // if a task is lost, its grant is still reported
        let mut outcomes: Vec<RevocationOutcome> = targets
            .iter()
            .map(|target| {
                let status = RevocationStatus::Failed {
                    reason: "revocation task did not complete".to_owned(),
                    retryable: true,
                };
                RevocationOutcome::new(target, 0, status)
            })
            .collect();

        let permits = Arc::new(Semaphore::new(self.concurrency));
        let mut tasks = JoinSet::new();
        for (index, target) in targets.into_iter().enumerate() {
            let revoker = self.clone();
            let permits = Arc::clone(&permits);
            tasks.spawn(async move {
                // the semaphore is never closed
                let _permit = permits.acquire_owned().await.ok();
                (index, revoker.revoke(target).await)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, outcome)) => outcomes[index] = outcome,
                Err(e) => tracing::error!("revocation task failed: {e}"),
            }
        }
        outcomes
    }

    /// Revoke a single grant, retrying transient failures.
    async fn revoke(&self, target: GrantRecord) -> RevocationOutcome {
        let mut attempts = 0;
        let status = loop {
            attempts += 1;
            let result = self
                .kms_client
                .revoke_grant()
                .key_id(self.key_id.as_str())
                .grant_id(&target.grant_id)
                .send()
                .await;

            let error = match result {
                Ok(_) => {
                    tracing::info!(
                        grant_id = %target.grant_id,
                        principal = %target.principal_arn,
                        attempts,
                        "revoked grant"
                    );
                    break RevocationStatus::Revoked;
                }
                Err(e) => e,
            };

            // an earlier attempt may have revoked the grant before failing
            if attempts > 1 && is_not_found(&error) {
                tracing::info!(
                    grant_id = %target.grant_id,
                    principal = %target.principal_arn,
                    attempts,
                    "grant was already revoked by an earlier attempt"
                );
                break RevocationStatus::Revoked;
            }

            let retryable = is_retryable(&error);
            if retryable && attempts < self.retry.max_attempts {
                let delay = self.retry.backoff(attempts);
                tracing::debug!(
                    grant_id = %target.grant_id,
                    attempts,
                    ?delay,
                    "transient failure revoking grant: {}",
                    DisplayErrorContext(&error)
                );
                tokio::time::sleep(delay).await;
                continue;
            }

            let reason = describe(&error);
            tracing::warn!(
                grant_id = %target.grant_id,
                principal = %target.principal_arn,
                attempts,
                "failed to revoke grant: {reason}"
            );
            break RevocationStatus::Failed { reason, retryable };
        };

        RevocationOutcome::new(&target, attempts, status)
    }
}

/// Whether a failed `RevokeGrant` call may succeed if it is repeated.
///
/// Authorization failures and missing grants are never retried.
fn is_retryable<R>(error: &SdkError<RevokeGrantError, R>) -> bool {
    match error {
        SdkError::TimeoutError(_) | SdkError::DispatchFailure(_) | SdkError::ResponseError(_) => {
            true
        }
        SdkError::ServiceError(context) => match context.err() {
            RevokeGrantError::DependencyTimeoutException(_)
            | RevokeGrantError::KmsInternalException(_) => true,
            RevokeGrantError::NotFoundException(_)
            | RevokeGrantError::InvalidGrantIdException(_)
            | RevokeGrantError::InvalidArnException(_)
            | RevokeGrantError::KmsInvalidStateException(_) => false,
            other => other
                .code()
                .is_some_and(|code| THROTTLING_CODES.contains(&code)),
        },
        _ => false,
    }
}

fn is_not_found<R>(error: &SdkError<RevokeGrantError, R>) -> bool {
    matches!(
        error.as_service_error(),
        Some(RevokeGrantError::NotFoundException(_))
    )
}

/// A one line reason for the operator, e.g. `ThrottlingException: Rate exceeded`.
fn describe<R>(error: &SdkError<RevokeGrantError, R>) -> String
where
    R: std::fmt::Debug,
{
    match (error.code(), error.message()) {
        (Some(code), Some(message)) => format!("{code}: {message}"),
        (Some(code), None) => code.to_owned(),
        _ => match error {
            SdkError::ServiceError(context) => context.err().to_string(),
            other => {
                let mut reason = other.to_string();
                let mut source = other.source();
                while let Some(inner) = source {
                    reason.push_str(": ");
                    reason.push_str(&inner.to_string());
                    source = inner.source();
                }
                reason
            }
        },
    }
}
