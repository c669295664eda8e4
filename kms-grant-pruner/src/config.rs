// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use crate::{grant::PrincipalSource, revoke::RetryPolicy, KeyId, DEFAULT_CONTEXT_KEY};
use aws_config::{BehaviorVersion, Region, SdkConfig};
use clap::{Parser, ValueEnum};
use std::time::Duration;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human readable lines, the plan is printed before anything is revoked.
    #[default]
    Text,
    /// One JSON line with the plan, then one with the revocation outcomes.
    Json,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum PrincipalField {
    /// A value of the grant's encryption context constraint, see `--context-key`.
    #[default]
    EncryptionContext,
    /// The grantee principal of the grant.
    Grantee,
}

/// Revoke every KMS grant on a key except the newest grant of each principal.
#[derive(Parser, Debug)]
#[clap(name = "kms-grant-pruner", version)]
pub struct Args {
    /// The id or ARN of the KMS key whose grants are pruned.
    #[clap(long, env = "KMS_GRANT_PRUNER_KEY_ID")]
    pub key_id: String,
    #[clap(long, env = "AWS_REGION")]
    pub region: Option<String>,
    /// The shared config profile used to load credentials.
    #[clap(long, env = "AWS_PROFILE")]
    pub profile: Option<String>,
    #[clap(long, value_enum, default_value_t = PrincipalField::EncryptionContext)]
    pub principal_source: PrincipalField,
    /// The encryption context key holding the principal.
    #[clap(long, default_value = DEFAULT_CONTEXT_KEY)]
    pub context_key: String,
    /// Print the plan without revoking anything.
    #[clap(long)]
    pub dry_run: bool,
    /// The maximum number of concurrent revocations.
    #[clap(long, default_value_t = 1, value_parser = clap::value_parser!(u32).range(1..))]
    pub concurrency: u32,
    /// The total number of attempts per grant for transient failures.
    #[clap(long, default_value_t = 3, value_parser = clap::value_parser!(u32).range(1..))]
    pub max_attempts: u32,
    #[clap(long, default_value_t = 200)]
    pub retry_base_delay_ms: u64,
    #[clap(long, value_enum, default_value_t = OutputFormat::Text)]
    pub output: OutputFormat,
}

/// Everything a pruning run needs to know.
///
/// The defaults match the behavior of pruning Lambda grants by hand: the
/// principal is the function ARN in the encryption context, and grants are
/// revoked one at a time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrunerConfig {
    pub key_id: KeyId,
    /// `None` uses the default region provider chain.
    pub region: Option<String>,
    /// `None` uses the default profile.
    pub profile: Option<String>,
    pub principal_source: PrincipalSource,
    pub dry_run: bool,
    pub concurrency: usize,
    pub retry: RetryPolicy,
    pub output: OutputFormat,
}

impl PrunerConfig {
    pub fn new(key_id: impl Into<KeyId>) -> Self {
        Self {
            key_id: key_id.into(),
            region: None,
            profile: None,
            principal_source: PrincipalSource::default(),
            dry_run: false,
            concurrency: 1,
            retry: RetryPolicy::default(),
            output: OutputFormat::default(),
        }
    }

    /// Load the shared AWS configuration, honoring the configured region and
    /// profile.
    pub async fn load_sdk_config(&self) -> SdkConfig {
        let mut loader = aws_config::defaults(BehaviorVersion::v2024_03_28());
        if let Some(region) = &self.region {
            loader = loader.region(Region::new(region.clone()));
        }
        if let Some(profile) = &self.profile {
            loader = loader.profile_name(profile);
        }
        loader.load().await
    }
}

impl From<Args> for PrunerConfig {
    fn from(args: Args) -> Self {
        let principal_source = match args.principal_source {
            PrincipalField::EncryptionContext => PrincipalSource::EncryptionContext {
                key: args.context_key,
            },
            PrincipalField::Grantee => PrincipalSource::Grantee,
        };
        Self {
            key_id: args.key_id,
            region: args.region,
            profile: args.profile,
            principal_source,
            dry_run: args.dry_run,
            concurrency: args.concurrency as usize,
            retry: RetryPolicy {
                max_attempts: args.max_attempts,
                base_delay: Duration::from_millis(args.retry_base_delay_ms),
            },
            output: args.output,
        }
    }
}
