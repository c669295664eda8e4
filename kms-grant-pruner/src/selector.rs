// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Decide which grants to keep and which to revoke.
//!
//! Principals accumulate grants over time: every new version of a Lambda
//! function is issued a fresh grant, and the old one is left behind. For each
//! principal the most recently created grant is kept and every older grant is
//! a revocation candidate.
//!
//! ```text
//!  created_at   50        100        150
//!  arnA         |-revoke--|-revoke---|-keep
//! ```
//!
//! The selector is a pure function over a snapshot. It performs no I/O, and
//! any error it returns means that nothing should be revoked.

use crate::{error::SelectionError, report::format_timestamp, GrantId, GrantRecord};
use serde::Serialize;
use std::{
    cmp::Ordering,
    collections::{BTreeMap, HashMap, HashSet},
    fmt,
};

/// The retention decision for a single principal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RetentionDecision {
    pub keep: GrantRecord,
    /// Ascending by `created_at`, ties in input order.
    pub revoke: Vec<GrantRecord>,
}

/// A record that was excluded from grouping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Anomaly {
    MissingPrincipal { grant_id: GrantId, created_at: i64 },
}

impl fmt::Display for Anomaly {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Anomaly::MissingPrincipal {
                grant_id,
                created_at,
            } => write!(
                f,
                "grant {grant_id} (created at {}) has no principal identifier",
                format_timestamp(*created_at)
            ),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RetentionPlan {
    /// Keyed by principal ARN.
    pub decisions: BTreeMap<String, RetentionDecision>,
    pub anomalies: Vec<Anomaly>,
}

impl RetentionPlan {
    /// All revocation candidates, grouped by principal.
    pub fn revocations(&self) -> impl Iterator<Item = &GrantRecord> {
        self.decisions
            .values()
            .flat_map(|decision| decision.revoke.iter())
    }

    pub fn revoke_count(&self) -> usize {
        self.decisions.values().map(|d| d.revoke.len()).sum()
    }
}

/// Compute the retention plan for a snapshot of grants.
///
/// When several grants of one principal share the newest creation time, the
/// grant with the lexically smallest id is kept and the others are revoked.
///
/// Records without a principal are reported as [`Anomaly::MissingPrincipal`]
/// and are neither kept nor revoked.
pub fn select_retention(records: &[GrantRecord]) -> Result<RetentionPlan, SelectionError> {
    let mut seen = HashSet::with_capacity(records.len());
    for record in records {
        if !seen.insert(record.grant_id.as_str()) {
            return Err(SelectionError::DuplicateGrantId {
                grant_id: record.grant_id.clone(),
            });
        }
    }

    let mut anomalies = Vec::new();
    let mut ordered = Vec::with_capacity(records.len());
    for record in records {
        if record.principal_arn.trim().is_empty() {
            tracing::warn!(
                grant_id = %record.grant_id,
                "grant has no principal, excluding it from retention"
            );
            anomalies.push(Anomaly::MissingPrincipal {
                grant_id: record.grant_id.clone(),
                created_at: record.created_at,
            });
        } else {
            ordered.push(record);
        }
    }
    // `sort_by_key` is stable, so equal timestamps keep their input order
    ordered.sort_by_key(|record| record.created_at);

    let latest = latest_per_principal(&ordered);
    let decisions = classify(&ordered, &latest)?;

    Ok(RetentionPlan {
        decisions,
        anomalies,
    })
}

/// `candidate` replaces `current` as the grant to keep.
fn supersedes(candidate: &GrantRecord, current: &GrantRecord) -> bool {
    match candidate.created_at.cmp(&current.created_at) {
        Ordering::Greater => true,
        Ordering::Equal => candidate.grant_id < current.grant_id,
        Ordering::Less => false,
    }
}

fn latest_per_principal<'a>(ordered: &[&'a GrantRecord]) -> HashMap<&'a str, &'a GrantRecord> {
    let mut latest: HashMap<&str, &GrantRecord> = HashMap::new();
    for &record in ordered {
        latest
            .entry(record.principal_arn.as_str())
            .and_modify(|current| {
                if supersedes(record, current) {
                    *current = record;
                }
            })
            .or_insert(record);
    }
    latest
}

fn classify(
    ordered: &[&GrantRecord],
    latest: &HashMap<&str, &GrantRecord>,
) -> Result<BTreeMap<String, RetentionDecision>, SelectionError> {
    let mut revoke: HashMap<&str, Vec<GrantRecord>> = HashMap::new();
    for &record in ordered {
        let principal = record.principal_arn.as_str();
        let keep = match latest.get(principal) {
            Some(keep) => *keep,
            None => {
                return Err(SelectionError::Inconsistent {
                    principal_arn: record.principal_arn.clone(),
                    grant_id: record.grant_id.clone(),
                    created_at: record.created_at,
                    latest: i64::MIN,
                })
            }
        };

        match record.created_at.cmp(&keep.created_at) {
            Ordering::Greater => {
                return Err(SelectionError::Inconsistent {
                    principal_arn: record.principal_arn.clone(),
                    grant_id: record.grant_id.clone(),
                    created_at: record.created_at,
                    latest: keep.created_at,
                });
            }
            // grant ids are unique, so this is the kept grant
            Ordering::Equal if record.grant_id == keep.grant_id => {}
            _ => revoke.entry(principal).or_default().push(record.clone()),
        }
    }

    let decisions = latest
        .iter()
        .map(|(&principal, &keep)| {
            let decision = RetentionDecision {
                keep: keep.clone(),
                revoke: revoke.remove(principal).unwrap_or_default(),
            };
            (principal.to_owned(), decision)
        })
        .collect();
    Ok(decisions)
}
