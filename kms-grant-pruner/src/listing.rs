// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use crate::{error::RecordError, grant::PrincipalSource, GrantRecord, KeyId};
use anyhow::Context;
use aws_sdk_kms::Client;

/// The maximum number of grants requested per `ListGrants` call.
pub const LIST_GRANTS_PAGE_SIZE: i32 = 100;

/// A point-in-time listing of the grants on a key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    /// Decoded grants, in listing order.
    pub records: Vec<GrantRecord>,
    /// Entries which could not be decoded. These are reported, never revoked.
    pub anomalies: Vec<RecordError>,
}

/// List every grant on `key_id`, following pagination markers.
///
/// Entries which can't be decoded are collected in [`Snapshot::anomalies`].
/// A failure on any page fails the whole listing, because decisions must not
/// be made on a partial snapshot.
pub async fn list_grants(
    client: &Client,
    key_id: &KeyId,
    source: &PrincipalSource,
) -> anyhow::Result<Snapshot> {
    let mut snapshot = Snapshot::default();
    let mut marker: Option<String> = None;
    // the marker of the page that was just requested
    let mut previous: Option<String> = None;
    let mut pages = 0;

    loop {
        let output = client
            .list_grants()
            .key_id(key_id)
            .limit(LIST_GRANTS_PAGE_SIZE)
            .set_marker(marker.take())
            .send()
            .await
            .with_context(|| format!("failed to list grants for {key_id}"))?;
        pages += 1;

        for entry in output.grants() {
            match GrantRecord::from_list_entry(entry, source) {
                Ok(record) => snapshot.records.push(record),
                Err(e) => {
                    tracing::warn!("unable to decode grant: {e}");
                    snapshot.anomalies.push(e);
                }
            }
        }

        if !output.truncated {
            break;
        }
        match output.next_marker {
            Some(next) if previous.as_ref() == Some(&next) => {
                anyhow::bail!("grant listing for {key_id} returned the marker {next} twice")
            }
            Some(next) => {
                previous = Some(next.clone());
                marker = Some(next);
            }
            None => anyhow::bail!("grant listing for {key_id} was truncated without a marker"),
        }
    }

    tracing::info!(
        key_id = %key_id,
        pages,
        grants = snapshot.records.len(),
        anomalies = snapshot.anomalies.len(),
        "listed grants"
    );
    Ok(snapshot)
}
