// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use crate::DEFAULT_CONTEXT_KEY;
use aws_sdk_kms::{
    config::retry::RetryConfig,
    operation::{
        list_grants::ListGrantsOutput,
        revoke_grant::{RevokeGrantError, RevokeGrantOutput},
    },
    primitives::DateTime,
    types::{
        error::{DependencyTimeoutException, NotFoundException},
        GrantConstraints, GrantListEntry,
    },
    Client,
};
use aws_smithy_mocks::{mock, mock_client, Rule, RuleMode};

////////////////////////////////////////////////////////////////////////////////
//////////////////////////    test constants   /////////////////////////////////
////////////////////////////////////////////////////////////////////////////////

pub const KMS_KEY_ARN: &str =
    "arn:aws:kms:us-west-2:111122223333:key/1234abcd-12ab-34cd-56ef-1234567890ab";
pub const FUNCTION_ARN_A: &str = "arn:aws:lambda:us-west-2:111122223333:function:ingest";
pub const FUNCTION_ARN_B: &str = "arn:aws:lambda:us-west-2:111122223333:function:export";

////////////////////////////////////////////////////////////////////////////////
/////////////////////////    mocks & fixtures   ////////////////////////////////
////////////////////////////////////////////////////////////////////////////////

/// A grant in the shape that Lambda creates them: the function ARN is bound
/// through an exact-match encryption context constraint.
pub fn grant_entry(grant_id: &str, created_at: i64, function_arn: &str) -> GrantListEntry {
    GrantListEntry::builder()
        .key_id(KMS_KEY_ARN)
        .grant_id(grant_id)
        .creation_date(DateTime::from_secs(created_at))
        .grantee_principal("arn:aws:iam::111122223333:role/lambda-service")
        .constraints(
            GrantConstraints::builder()
                .encryption_context_equals(DEFAULT_CONTEXT_KEY, function_arn)
                .build(),
        )
        .build()
}

pub fn grants_page(entries: Vec<GrantListEntry>, next_marker: Option<&str>) -> ListGrantsOutput {
    ListGrantsOutput::builder()
        .set_grants(Some(entries))
        .set_next_marker(next_marker.map(str::to_owned))
        .truncated(next_marker.is_some())
        .build()
}

/// Mock a single-page `ListGrants` response.
pub fn list_grants_rule(entries: Vec<GrantListEntry>) -> Rule {
    let page = grants_page(entries, None);
    mock!(Client::list_grants)
        .match_requests(|req| req.key_id() == Some(KMS_KEY_ARN))
        .then_output(move || page.clone())
}

/// Mock a `ListGrants` response for the page requested with `marker`.
pub fn list_grants_page_rule(marker: Option<&'static str>, page: ListGrantsOutput) -> Rule {
    mock!(Client::list_grants)
        .match_requests(move |req| req.key_id() == Some(KMS_KEY_ARN) && req.marker() == marker)
        .then_output(move || page.clone())
}

pub fn revoke_ok_rule() -> Rule {
    mock!(Client::revoke_grant)
        .match_requests(|req| req.key_id() == Some(KMS_KEY_ARN))
        .then_output(|| RevokeGrantOutput::builder().build())
}

/// Fail every `RevokeGrant` call for `grant_id` with `error`.
pub fn revoke_error_rule(grant_id: &'static str, error: fn() -> RevokeGrantError) -> Rule {
    mock!(Client::revoke_grant)
        .match_requests(move |req| req.grant_id() == Some(grant_id))
        .then_error(error)
}

// the errors don't implement clone, so we have to use these test helpers
pub fn not_found() -> RevokeGrantError {
    RevokeGrantError::NotFoundException(NotFoundException::builder().build())
}

pub fn dependency_timeout() -> RevokeGrantError {
    RevokeGrantError::DependencyTimeoutException(DependencyTimeoutException::builder().build())
}

/// A fake KMS client where the SDK's own retries are disabled, so that call
/// counts only reflect the retries made by this crate.
pub fn no_retry_client(rules: &[&Rule]) -> Client {
    mock_client!(aws_sdk_kms, RuleMode::MatchAny, rules, |conf| conf
        .retry_config(RetryConfig::disabled()))
}

/// A fake KMS client listing `entries` on [`KMS_KEY_ARN`] and accepting every
/// revocation.
pub fn mocked_kms_client(entries: Vec<GrantListEntry>) -> (Rule, Rule, Client) {
    let list_rule = list_grants_rule(entries);
    let revoke_rule = revoke_ok_rule();
    let client = no_retry_client(&[&list_rule, &revoke_rule]);
    (list_rule, revoke_rule, client)
}

/// Sanity check to make sure that mocking is set up correctly.
#[tokio::test]
async fn mocked_listing() {
    let (list_rule, _revoke_rule, client) =
        mocked_kms_client(vec![grant_entry("grant-1", 100, FUNCTION_ARN_A)]);
    let output = client
        .list_grants()
        .key_id(KMS_KEY_ARN)
        .send()
        .await
        .unwrap();
    assert_eq!(output.grants().len(), 1);
    assert!(!output.truncated);
    assert_eq!(list_rule.num_calls(), 1);
}
