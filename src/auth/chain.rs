//! Credential chain: an ordered fallback list of token providers
//!
//! The chain preserves the configured order exactly (no reordering, no deduplication),
//! tries each provider in turn and returns the first token. It fails only when every
//! provider failed, and then reports each provider's reason. Cancellation is checked at
//! every provider attempt and aborts the whole chain.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{debug, info};
use reqwest::Url;
use tokio_util::sync::CancellationToken;

use super::providers::{
    AzureCliCredential, AzureDeveloperCliCredential, AzurePowerShellCredential,
    DeviceCodeCredential, EnvironmentCredential, InteractiveBrowserCredential,
    ManagedIdentityCredential, SharedTokenCacheCredential, VisualStudioCredential,
    WorkloadIdentityCredential,
};
use super::sources::{CredentialSourceConfig, CredentialSourceKind};
use crate::error::{AggregateAuthFailure, ContextError, ContextResult, ProviderFailure};

/// Everything a provider may need to know about one token request
#[derive(Debug, Clone, Default)]
pub struct TokenRequestContext {
    pub scopes: Vec<String>,
    pub parent_request_id: Option<String>,
    pub claims: Option<String>,
    pub tenant_id: Option<String>,
    pub cae_enabled: bool,
    pub pop_enabled: bool,
    pub pop_nonce: Option<String>,
    pub pop_request_uri: Option<Url>,
    pub pop_request_method: Option<String>,
}

impl TokenRequestContext {
    pub fn for_scopes<I, S>(scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            scopes: scopes.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }
}

#[derive(Clone)]
pub struct AccessToken {
    pub token: String,
    pub expires_on: DateTime<Utc>,
    pub refresh_on: Option<DateTime<Utc>>,
    pub token_type: String,
}

impl AccessToken {
    pub fn bearer(token: impl Into<String>, expires_on: DateTime<Utc>) -> Self {
        Self {
            token: token.into(),
            expires_on,
            refresh_on: None,
            token_type: "Bearer".to_string(),
        }
    }

    pub fn is_expired(&self) -> bool {
        self.expires_on <= Utc::now()
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessToken")
            .field("token", &"<redacted>")
            .field("expires_on", &self.expires_on)
            .field("refresh_on", &self.refresh_on)
            .field("token_type", &self.token_type)
            .finish()
    }
}

/// A single way of obtaining a token
#[async_trait]
pub trait TokenCredential: Send + Sync + fmt::Debug {
    fn kind(&self) -> CredentialSourceKind;

    /// Fails when this source cannot produce a token; the chain moves on to the next one
    async fn get_token(&self, request: &TokenRequestContext) -> anyhow::Result<AccessToken>;
}

#[derive(Debug, Clone)]
pub struct CredentialChain {
    providers: Vec<Arc<dyn TokenCredential>>,
}

impl CredentialChain {
    pub fn from_providers(providers: Vec<Arc<dyn TokenCredential>>) -> ContextResult<Self> {
        if providers.is_empty() {
            return Err(ContextError::Configuration(
                "At least one credential type must be allowed".to_string(),
            ));
        }
        Ok(Self { providers })
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// Provider kinds in attempt order
    pub fn kinds(&self) -> Vec<CredentialSourceKind> {
        self.providers.iter().map(|p| p.kind()).collect()
    }

    pub async fn get_token(
        &self,
        request: &TokenRequestContext,
        cancel: &CancellationToken,
    ) -> ContextResult<AccessToken> {
        let mut failures = Vec::with_capacity(self.providers.len());

        for (index, provider) in self.providers.iter().enumerate() {
            if cancel.is_cancelled() {
                return Err(ContextError::Cancelled);
            }

            debug!(
                "Attempting {} ({}/{})",
                provider.kind().display_name(),
                index + 1,
                self.providers.len()
            );

            let attempt = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(ContextError::Cancelled),
                result = provider.get_token(request) => result,
            };

            match attempt {
                Ok(token) => {
                    info!("Acquired token using {}", provider.kind().display_name());
                    return Ok(token);
                }
                Err(error) => {
                    debug!("{} failed: {:#}", provider.kind().display_name(), error);
                    failures.push(ProviderFailure {
                        source: provider.kind(),
                        reason: format!("{error:#}"),
                    });
                }
            }
        }

        Err(ContextError::Authentication(AggregateAuthFailure { failures }))
    }
}

/// Construct the provider chain for a configuration, in the configured order
pub fn build_chain(config: &CredentialSourceConfig) -> ContextResult<CredentialChain> {
    if config.sources.is_empty() {
        return Err(ContextError::Configuration(
            "At least one credential type must be allowed".to_string(),
        ));
    }

    let options = &config.options;
    let providers = config
        .sources
        .iter()
        .map(|kind| -> Arc<dyn TokenCredential> {
            match kind {
                CredentialSourceKind::Cli => Arc::new(AzureCliCredential::new(options)),
                CredentialSourceKind::DeveloperCli => {
                    Arc::new(AzureDeveloperCliCredential::new(options))
                }
                CredentialSourceKind::PowerShell => Arc::new(AzurePowerShellCredential::new(options)),
                CredentialSourceKind::Environment => Arc::new(EnvironmentCredential::new(options)),
                CredentialSourceKind::ManagedIdentity => {
                    Arc::new(ManagedIdentityCredential::new(options))
                }
                CredentialSourceKind::InteractiveBrowser => {
                    Arc::new(InteractiveBrowserCredential::new(options))
                }
                CredentialSourceKind::VisualStudio => Arc::new(VisualStudioCredential::new(options)),
                CredentialSourceKind::SharedTokenCache => {
                    Arc::new(SharedTokenCacheCredential::new(options))
                }
                CredentialSourceKind::DeviceCode => Arc::new(DeviceCodeCredential::new(options)),
                CredentialSourceKind::WorkloadIdentity => {
                    Arc::new(WorkloadIdentityCredential::new(options))
                }
            }
        })
        .collect();

    debug!(
        "Built credential chain: {}",
        config
            .sources
            .iter()
            .map(|k| k.key())
            .collect::<Vec<_>>()
            .join(", ")
    );

    CredentialChain::from_providers(providers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::sources::SharedCredentialOptions;

    #[test]
    fn test_build_chain_preserves_order_and_duplicates() {
        let config = CredentialSourceConfig::new(
            vec![
                CredentialSourceKind::Environment,
                CredentialSourceKind::Cli,
                CredentialSourceKind::Cli,
                CredentialSourceKind::WorkloadIdentity,
            ],
            SharedCredentialOptions::default(),
        );

        let chain = build_chain(&config).unwrap();
        assert_eq!(chain.len(), 4);
        assert_eq!(chain.kinds(), config.sources);
    }

    #[test]
    fn test_build_chain_covers_every_kind() {
        let config = CredentialSourceConfig::new(
            CredentialSourceKind::ALL.to_vec(),
            SharedCredentialOptions::default(),
        );
        let chain = build_chain(&config).unwrap();
        assert_eq!(chain.kinds(), CredentialSourceKind::ALL.to_vec());
    }

    #[test]
    fn test_empty_source_list_is_rejected() {
        let config = CredentialSourceConfig::new(Vec::new(), SharedCredentialOptions::default());
        assert!(matches!(
            build_chain(&config),
            Err(ContextError::Configuration(_))
        ));
    }

    #[test]
    fn test_access_token_debug_hides_secret() {
        let token = AccessToken::bearer("super-secret", Utc::now());
        assert!(!format!("{token:?}").contains("super-secret"));
    }
}
