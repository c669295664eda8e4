// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Prune superseded AWS KMS grants.
//!
//! Services like Lambda create a KMS grant for every new version of a
//! function, and never revoke the grant of the previous version. Over time a
//! key accumulates grants until it reaches the per-key grant quota. This crate
//! keeps the newest grant of every principal and revokes the rest.
//!
//! # Design
//!
//! A run has two phases.
//!
//! The _decision_ phase lists every grant on the key ([`listing::list_grants`]),
//! decodes each one into a [`GrantRecord`], and computes a [`RetentionPlan`]
//! with [`select_retention`]. The decision phase is all-or-nothing: if the
//! listing fails or the plan is inconsistent, no grant is revoked.
//!
//! The _mutation_ phase revokes every grant in the plan with a [`Revoker`]. It
//! is best-effort: each revocation is attempted independently, transient
//! failures are retried with bounded backoff, and every grant gets its own
//! [`RevocationOutcome`].
//!
//! Grants which can't be attributed to a principal (e.g. a Lambda grant
//! without the function ARN in its encryption context) are reported as
//! anomalies. They are never revoked.
//!
//! ## Usage
//!
//! ```text
//! kms-grant-pruner --key-id arn:aws:kms:us-west-2:111122223333:key/1234abcd --dry-run
//! ```

pub mod config;
pub mod error;
pub mod grant;
pub mod listing;
pub mod prune;
pub mod report;
pub mod revoke;
pub mod selector;
#[cfg(test)]
pub(crate) mod test_utils;

pub type KeyId = String;
pub type GrantId = String;

pub use config::{Args, OutputFormat, PrunerConfig};
pub use error::{RecordError, SelectionError};
pub use grant::{GrantRecord, PrincipalSource};
pub use prune::{run, PruneSummary};
pub use revoke::{RetryPolicy, RevocationOutcome, RevocationStatus, Revoker};
pub use selector::{select_retention, Anomaly, RetentionDecision, RetentionPlan};

/// The encryption context key under which Lambda binds its grants to a
/// function.
pub const DEFAULT_CONTEXT_KEY: &str = "aws:lambda:FunctionArn";

#[cfg(test)]
mod integration_tests {
    use super::*;
    use crate::test_utils::{
        dependency_timeout, grant_entry, grants_page, list_grants_page_rule, no_retry_client,
        revoke_error_rule, revoke_ok_rule, FUNCTION_ARN_A, FUNCTION_ARN_B, KMS_KEY_ARN,
    };
    use std::time::Duration;

    /// A key with many stale grants spread over several listing pages, where
    /// one revocation keeps timing out.
    #[tokio::test(start_paused = true)]
    async fn paged_listing_with_flaky_revocation() {
        let first = list_grants_page_rule(
            None,
            grants_page(
                vec![
                    grant_entry("a-1", 100, FUNCTION_ARN_A),
                    grant_entry("b-1", 100, FUNCTION_ARN_B),
                    grant_entry("a-3", 300, FUNCTION_ARN_A),
                ],
                Some("next"),
            ),
        );
        let second = list_grants_page_rule(
            Some("next"),
            grants_page(
                vec![
                    grant_entry("a-2", 200, FUNCTION_ARN_A),
                    grant_entry("b-2", 200, FUNCTION_ARN_B),
                ],
                None,
            ),
        );
        let flaky = revoke_error_rule("b-1", dependency_timeout);
        let revoke_rule = revoke_ok_rule();
        let client = no_retry_client(&[&first, &second, &flaky, &revoke_rule]);

        let config = PrunerConfig {
            concurrency: 2,
            retry: RetryPolicy {
                max_attempts: 2,
                base_delay: Duration::from_millis(10),
            },
            ..PrunerConfig::new(KMS_KEY_ARN)
        };

        let mut out = Vec::new();
        let summary = run(&client, &config, &mut out).await.unwrap();

        assert_eq!(flaky.num_calls(), 2);
        assert_eq!(revoke_rule.num_calls(), 2);
        assert_eq!(
            summary,
            PruneSummary {
                principals: 2,
                kept: 2,
                revoked: 2,
                failed: 1,
                ..Default::default()
            }
        );

        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("  keep    1970-01-01T00:05:00Z  a-3"));
        assert!(text.contains("  keep    1970-01-01T00:03:20Z  b-2"));
        assert!(text.contains("failed    1970-01-01T00:01:40Z  b-1  after 2 attempt(s)"));
    }
}
