//! AWS credential resolution for the object store client.
//!
//! The provider is constructed once at startup and handed to the S3 client;
//! tests inject static or failing providers instead of the default chain.

use crate::error::{CacheSyncError, CacheSyncResult};
use aws_config::ecs::EcsCredentialsProvider;
use aws_config::environment::credentials::EnvironmentVariableCredentialsProvider;
use aws_config::imds::credentials::ImdsCredentialsProvider;
use aws_config::meta::credentials::CredentialsProviderChain;
use aws_config::profile::ProfileFileCredentialsProvider;
use aws_credential_types::Credentials;
use aws_credential_types::provider::{ProvideCredentials, SharedCredentialsProvider};
use tracing::{debug, warn};

/// Owns the credential provider used for every S3 request.
#[derive(Clone, Debug)]
pub struct CredentialManager {
    provider: SharedCredentialsProvider,
    source: String,
}

impl CredentialManager {
    /// Environment variables first, then container or instance role
    /// credentials, then the named shared-credentials profile.
    pub fn for_profile(profile: &str) -> Self {
        let chain = CredentialsProviderChain::first_try(
            "Environment",
            EnvironmentVariableCredentialsProvider::new(),
        )
        .or_else("EcsContainer", EcsCredentialsProvider::builder().build())
        .or_else("Ec2InstanceRole", ImdsCredentialsProvider::builder().build())
        .or_else(
            "Profile",
            ProfileFileCredentialsProvider::builder()
                .profile_name(profile)
                .build(),
        );

        Self {
            provider: SharedCredentialsProvider::new(chain),
            source: format!("default chain (profile {profile})"),
        }
    }

    /// Wraps an already-built provider.
    pub fn from_provider(provider: impl ProvideCredentials + 'static) -> Self {
        Self {
            provider: SharedCredentialsProvider::new(provider),
            source: "injected provider".to_string(),
        }
    }

    /// Resolves credentials once; failure is fatal at startup.
    pub async fn verify(&self) -> CacheSyncResult<Credentials> {
        match self.provider.provide_credentials().await {
            Ok(creds) => {
                debug!(source = %self.source, "resolved AWS credentials");
                Ok(creds)
            }
            Err(e) => {
                warn!(source = %self.source, error = %e, "credential resolution failed");
                Err(CacheSyncError::Credentials(format!("{}: {e}", self.source)))
            }
        }
    }

    pub fn provider(&self) -> SharedCredentialsProvider {
        self.provider.clone()
    }

    /// Human-readable description of where credentials come from.
    pub fn source(&self) -> &str {
        &self.source
    }
}
