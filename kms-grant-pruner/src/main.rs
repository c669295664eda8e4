// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use aws_sdk_kms::Client;
use clap::Parser;
use kms_grant_pruner::{Args, PruneSummary, PrunerConfig};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// Some revocations failed, the others were attempted.
const EXIT_PARTIAL_FAILURE: u8 = 1;
/// Nothing was revoked.
const EXIT_ABORTED: u8 = 2;

#[tokio::main]
async fn main() -> ExitCode {
    // logs go to stderr, stdout is reserved for the report
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = PrunerConfig::from(Args::parse());

    match prune(&config).await {
        Ok(summary) if summary.has_failures() => ExitCode::from(EXIT_PARTIAL_FAILURE),
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{e:#}");
            ExitCode::from(EXIT_ABORTED)
        }
    }
}

async fn prune(config: &PrunerConfig) -> anyhow::Result<PruneSummary> {
    let shared_config = config.load_sdk_config().await;
    let client = Client::new(&shared_config);

    let mut stdout = std::io::stdout().lock();
    kms_grant_pruner::run(&client, config, &mut stdout).await
}
