// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Rendering of retention plans and revocation outcomes.
//!
//! The text report is meant for an operator reading along while grants are
//! revoked:
//! ```text
//! principal arn:aws:lambda:us-west-2:111122223333:function:ingest
//!   keep    2023-11-14T22:13:20Z  grant-3
//!   revoke  2023-11-14T22:11:40Z  grant-1
//! anomaly   grant grant-9 (created at 2023-11-14T22:12:30Z) has no principal identifier
//! revoked   2023-11-14T22:11:40Z  grant-1
//! ```
//!
//! The JSON report is two lines, each a JSON document: the plan, written
//! before any grant is revoked, and then the outcomes with the summary.

use crate::{
    error::RecordError,
    prune::PruneSummary,
    revoke::{RevocationOutcome, RevocationStatus},
    selector::RetentionPlan,
};
use chrono::{DateTime, SecondsFormat};
use serde::Serialize;
use std::io::{self, Write};

/// Render a creation timestamp, falling back to the raw seconds if it is out
/// of range.
pub fn format_timestamp(secs: i64) -> String {
    match DateTime::from_timestamp(secs, 0) {
        Some(time) => time.to_rfc3339_opts(SecondsFormat::Secs, true),
        None => secs.to_string(),
    }
}

pub fn write_plan(
    out: &mut impl Write,
    plan: &RetentionPlan,
    record_errors: &[RecordError],
) -> io::Result<()> {
    for (principal, decision) in &plan.decisions {
        writeln!(out, "principal {principal}")?;
        writeln!(
            out,
            "  keep    {}  {}",
            format_timestamp(decision.keep.created_at),
            decision.keep.grant_id
        )?;
        for record in &decision.revoke {
            writeln!(
                out,
                "  revoke  {}  {}",
                format_timestamp(record.created_at),
                record.grant_id
            )?;
        }
    }

    for error in record_errors {
        writeln!(out, "anomaly   {error}")?;
    }
    for anomaly in &plan.anomalies {
        writeln!(out, "anomaly   {anomaly}")?;
    }
    Ok(())
}

pub fn write_outcomes(out: &mut impl Write, outcomes: &[RevocationOutcome]) -> io::Result<()> {
    for outcome in outcomes {
        let created = format_timestamp(outcome.created_at);
        match &outcome.status {
            RevocationStatus::Revoked => {
                writeln!(out, "revoked   {created}  {}", outcome.grant_id)?
            }
            RevocationStatus::Skipped => writeln!(
                out,
                "skipped   {created}  {}  (dry run)",
                outcome.grant_id
            )?,
            RevocationStatus::Failed { reason, .. } => writeln!(
                out,
                "failed    {created}  {}  after {} attempt(s): {reason}",
                outcome.grant_id, outcome.attempts
            )?,
        }
    }
    Ok(())
}

pub fn write_summary(out: &mut impl Write, summary: &PruneSummary) -> io::Result<()> {
    writeln!(
        out,
        "{} principal(s), {} kept, {} revoked, {} skipped, {} failed, {} anomalies",
        summary.principals,
        summary.kept,
        summary.revoked,
        summary.skipped,
        summary.failed,
        summary.anomalies
    )
}

#[derive(Serialize)]
struct JsonPlan<'a> {
    plan: &'a RetentionPlan,
    record_errors: &'a [RecordError],
}

#[derive(Serialize)]
struct JsonOutcomes<'a> {
    outcomes: &'a [RevocationOutcome],
    summary: &'a PruneSummary,
}

fn write_json_line(out: &mut impl Write, value: &impl Serialize) -> io::Result<()> {
    serde_json::to_writer(&mut *out, value)?;
    writeln!(out)
}

pub fn write_json_plan(
    out: &mut impl Write,
    plan: &RetentionPlan,
    record_errors: &[RecordError],
) -> io::Result<()> {
    write_json_line(
        out,
        &JsonPlan {
            plan,
            record_errors,
        },
    )
}

pub fn write_json_outcomes(
    out: &mut impl Write,
    outcomes: &[RevocationOutcome],
    summary: &PruneSummary,
) -> io::Result<()> {
    write_json_line(out, &JsonOutcomes { outcomes, summary })
}
