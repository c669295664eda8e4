// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use crate::{
    config::{OutputFormat, PrunerConfig},
    listing::list_grants,
    report,
    revoke::{RevocationOutcome, RevocationStatus, Revoker},
    selector::{select_retention, RetentionPlan},
    GrantRecord,
};
use anyhow::Context;
use aws_sdk_kms::Client;
use serde::Serialize;
use std::io::Write;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PruneSummary {
    pub principals: usize,
    pub kept: usize,
    pub revoked: usize,
    pub skipped: usize,
    pub failed: usize,
    /// Grants that were neither kept nor revoked because they couldn't be
    /// attributed to a principal.
    pub anomalies: usize,
}

impl PruneSummary {
    fn new(plan: &RetentionPlan, record_errors: usize, outcomes: &[RevocationOutcome]) -> Self {
        let count = |f: fn(&RevocationStatus) -> bool| {
            outcomes.iter().filter(|outcome| f(&outcome.status)).count()
        };
        Self {
            principals: plan.decisions.len(),
            kept: plan.decisions.len(),
            revoked: count(|status| matches!(status, RevocationStatus::Revoked)),
            skipped: count(|status| matches!(status, RevocationStatus::Skipped)),
            failed: count(|status| matches!(status, RevocationStatus::Failed { .. })),
            anomalies: plan.anomalies.len() + record_errors,
        }
    }

    pub fn has_failures(&self) -> bool {
        self.failed > 0
    }
}

/// Prune the grants of `config.key_id`.
///
/// 1. list every grant on the key
/// 2. select the newest grant of each principal to keep
/// 3. write the plan to `out`, before anything is revoked
/// 4. revoke all other grants, unless this is a dry run
/// 5. write the outcomes to `out`
///
/// If the listing or the selection fails, an error is returned before any
/// grant is revoked. Individual revocation failures are reported in the
/// output and the summary, they are not errors.
pub async fn run(
    client: &Client,
    config: &PrunerConfig,
    out: &mut impl Write,
) -> anyhow::Result<PruneSummary> {
    let snapshot = list_grants(client, &config.key_id, &config.principal_source).await?;

    let plan = select_retention(&snapshot.records)
        .context("inconsistent retention plan, no grants were revoked")?;
    tracing::info!(
        principals = plan.decisions.len(),
        revocations = plan.revoke_count(),
        dry_run = config.dry_run,
        "selected grants to revoke"
    );

    match config.output {
        OutputFormat::Text => report::write_plan(out, &plan, &snapshot.anomalies)?,
        OutputFormat::Json => report::write_json_plan(out, &plan, &snapshot.anomalies)?,
    }
    out.flush()?;

    let targets: Vec<GrantRecord> = plan.revocations().cloned().collect();
    let outcomes = if config.dry_run {
        Revoker::skip_all(&targets)
    } else {
        let revoker = Revoker::new(
            client.clone(),
            config.key_id.clone(),
            config.retry,
            config.concurrency,
        );
        revoker.revoke_all(targets).await
    };

    let summary = PruneSummary::new(&plan, snapshot.anomalies.len(), &outcomes);
    match config.output {
        OutputFormat::Text => {
            report::write_outcomes(out, &outcomes)?;
            report::write_summary(out, &summary)?;
        }
        OutputFormat::Json => report::write_json_outcomes(out, &outcomes, &summary)?,
    }

    Ok(summary)
}
