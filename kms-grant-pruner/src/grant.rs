// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use crate::{error::RecordError, GrantId, DEFAULT_CONTEXT_KEY};
use aws_sdk_kms::types::GrantListEntry;
use serde::Serialize;

/// A single KMS grant, reduced to the fields that retention decisions need.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct GrantRecord {
    /// Seconds since the unix epoch.
    pub created_at: i64,
    pub grant_id: GrantId,
    /// The consuming principal, e.g. a Lambda function ARN. Several grants
    /// may share a principal.
    pub principal_arn: String,
}

impl GrantRecord {
    pub fn new(
        created_at: i64,
        grant_id: impl Into<GrantId>,
        principal_arn: impl Into<String>,
    ) -> Self {
        Self {
            created_at,
            grant_id: grant_id.into(),
            principal_arn: principal_arn.into(),
        }
    }

    /// Decode a `ListGrants` entry.
    ///
    /// A missing or blank principal is reported as
    /// [`RecordError::MissingPrincipal`] instead of being decoded as an empty
    /// string, so that it can never be grouped with other principal-less grants.
    pub fn from_list_entry(
        entry: &GrantListEntry,
        source: &PrincipalSource,
    ) -> Result<Self, RecordError> {
        let grant_id = entry.grant_id().ok_or(RecordError::MissingGrantId)?;
        let created_at = entry
            .creation_date()
            .ok_or_else(|| RecordError::MissingCreationDate {
                grant_id: grant_id.to_owned(),
            })?
            .secs();

        let principal_arn = source
            .principal_of(entry)
            .filter(|principal| !principal.trim().is_empty())
            .ok_or_else(|| RecordError::MissingPrincipal {
                grant_id: grant_id.to_owned(),
                created_at,
            })?;

        Ok(Self::new(created_at, grant_id, principal_arn))
    }
}

/// Where the owning principal of a grant is read from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrincipalSource {
    /// The value stored under `key` in the grant's encryption context
    /// constraint. Lambda grants carry the function ARN under
    /// `aws:lambda:FunctionArn`.
    EncryptionContext { key: String },
    /// The grantee principal of the grant.
    Grantee,
}

impl Default for PrincipalSource {
    fn default() -> Self {
        PrincipalSource::EncryptionContext {
            key: DEFAULT_CONTEXT_KEY.to_owned(),
        }
    }
}

impl PrincipalSource {
    fn principal_of<'a>(&self, entry: &'a GrantListEntry) -> Option<&'a str> {
        match self {
            PrincipalSource::EncryptionContext { key } => {
                let constraints = entry.constraints()?;
                // an exact-match constraint is what Lambda issues, but subset
                // constraints carry the same information
                constraints
                    .encryption_context_equals()
                    .and_then(|context| context.get(key))
                    .or_else(|| {
                        constraints
                            .encryption_context_subset()
                            .and_then(|context| context.get(key))
                    })
                    .map(String::as_str)
            }
            PrincipalSource::Grantee => entry.grantee_principal(),
        }
    }
}
