//! DynamoDB client construction.
//!
//! Resolves region, credentials, and endpoint into a configured SDK client.
//! Credential sources in priority order:
//! 1. Hardcoded credentials (access_key, secret_key, session_token)
//! 2. AWS profile from ~/.aws/credentials
//! 3. Environment variables (AWS_ACCESS_KEY_ID, AWS_SECRET_ACCESS_KEY)
//! 4. Default credential chain (instance profile, etc.)

use aws_config::BehaviorVersion;
use aws_config::meta::region::RegionProviderChain;
use aws_config::profile::ProfileFileCredentialsProvider;
use aws_sdk_dynamodb::Client;
use aws_sdk_dynamodb::config::Credentials;

use crate::errors::Error;

/// Connection settings for [`build_client`]. Every field optional; the
/// default resolves everything from the environment.
#[derive(Debug, Clone, Default)]
pub struct ClientConfig {
    /// AWS region (default: us-east-1, or AWS_REGION env var).
    pub region: Option<String>,
    /// AWS access key ID; uses env/profile when unset.
    pub access_key: Option<String>,
    /// AWS secret access key; uses env/profile when unset.
    pub secret_key: Option<String>,
    /// AWS session token for temporary credentials.
    pub session_token: Option<String>,
    /// AWS profile name from ~/.aws/credentials.
    pub profile: Option<String>,
    /// Custom endpoint URL for local endpoints (dynamodb-local, LocalStack).
    pub endpoint_url: Option<String>,
}

/// Build the AWS SDK DynamoDB client with the given configuration.
pub async fn build_client(config: ClientConfig) -> Result<Client, Error> {
    // Region priority: param > env var > default
    let region_provider =
        RegionProviderChain::first_try(config.region.map(aws_sdk_dynamodb::config::Region::new))
            .or_default_provider()
            .or_else("us-east-1");

    let mut config_loader = aws_config::defaults(BehaviorVersion::latest()).region(region_provider);

    // Credentials priority: hardcoded > profile > env/default chain
    if let (Some(ak), Some(sk)) = (config.access_key, config.secret_key) {
        let creds = Credentials::new(ak, sk, config.session_token, None, "dynogsi-hardcoded");
        config_loader = config_loader.credentials_provider(creds);
    } else if let Some(profile_name) = config.profile {
        let profile_provider = ProfileFileCredentialsProvider::builder()
            .profile_name(&profile_name)
            .build();
        config_loader = config_loader.credentials_provider(profile_provider);
    }
    // else: uses default credential chain (env vars, instance profile, etc)

    let sdk_config = config_loader.load().await;

    let mut dynamo_config = aws_sdk_dynamodb::config::Builder::from(&sdk_config);

    if let Some(url) = config.endpoint_url {
        if url.trim().is_empty() {
            return Err(Error::Client("endpoint URL is empty".to_string()));
        }
        dynamo_config = dynamo_config.endpoint_url(url);
    }

    Ok(Client::from_conf(dynamo_config.build()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn builds_with_static_credentials_and_local_endpoint() {
        let client = build_client(ClientConfig {
            region: Some("us-east-1".to_string()),
            access_key: Some("test".to_string()),
            secret_key: Some("test".to_string()),
            endpoint_url: Some("http://localhost:8000".to_string()),
            ..ClientConfig::default()
        })
        .await;
        assert!(client.is_ok());
    }

    #[tokio::test]
    async fn rejects_empty_endpoint_url() {
        let result = build_client(ClientConfig {
            access_key: Some("test".to_string()),
            secret_key: Some("test".to_string()),
            endpoint_url: Some("  ".to_string()),
            ..ClientConfig::default()
        })
        .await;
        assert!(result.is_err());
    }
}
