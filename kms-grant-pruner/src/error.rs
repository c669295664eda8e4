// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use crate::{report::format_timestamp, GrantId};
use serde::Serialize;
use thiserror::Error;

/// A failure of the decision phase.
///
/// Any of these means the retention plan can not be trusted, and no grant may
/// be revoked for the invocation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SelectionError {
    #[error(
        "grant {grant_id} for {principal_arn} was created at {created_at}, \
         after the latest tracked creation time {latest}"
    )]
    Inconsistent {
        principal_arn: String,
        grant_id: GrantId,
        created_at: i64,
        latest: i64,
    },

    #[error("grant id {grant_id} appears more than once in the snapshot")]
    DuplicateGrantId { grant_id: GrantId },
}

/// A grant listing entry which could not be decoded into a [`crate::GrantRecord`].
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RecordError {
    #[error("grant entry has no grant id")]
    MissingGrantId,

    #[error("grant {grant_id} has no creation date")]
    MissingCreationDate { grant_id: GrantId },

    #[error(
        "grant {grant_id} (created at {}) has no principal identifier",
        format_timestamp(*.created_at)
    )]
    MissingPrincipal { grant_id: GrantId, created_at: i64 },
}
