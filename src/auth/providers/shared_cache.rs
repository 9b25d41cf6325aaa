//! Refresh tokens from the developer token cache shared by Microsoft tools
//!
//! Only the unencrypted cache layout is understood. The cache is read, never written.

use std::collections::HashMap;
use std::path::PathBuf;

use anyhow::{Context, Result, anyhow, bail};
use async_trait::async_trait;
use serde::Deserialize;

use super::developer_tools::reject_proof_of_possession;
use super::DEFAULT_PUBLIC_CLIENT_ID;
use crate::auth::chain::{AccessToken, TokenCredential, TokenRequestContext};
use crate::auth::sources::{CredentialSourceKind, SharedCredentialOptions};
use crate::auth::token_endpoint::TokenEndpoint;

#[derive(Debug, Default, Deserialize)]
pub(crate) struct TokenCache {
    #[serde(rename = "Account", default)]
    accounts: HashMap<String, CachedAccount>,
    #[serde(rename = "RefreshToken", default)]
    refresh_tokens: HashMap<String, CachedRefreshToken>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct CachedAccount {
    home_account_id: String,
    #[serde(default)]
    realm: Option<String>,
    #[serde(default)]
    username: Option<String>,
}

impl CachedAccount {
    fn home_tenant(&self) -> Option<&str> {
        self.home_account_id.split_once('.').map(|(_, tenant)| tenant)
    }

    fn matches_tenant(&self, tenant: &str) -> bool {
        self.realm.as_deref().is_some_and(|r| r.eq_ignore_ascii_case(tenant))
            || self.home_tenant().is_some_and(|t| t.eq_ignore_ascii_case(tenant))
    }
}

#[derive(Debug, Clone, Deserialize)]
struct CachedRefreshToken {
    home_account_id: String,
    secret: String,
    #[serde(default)]
    client_id: Option<String>,
    #[serde(default)]
    family_id: Option<String>,
}

impl TokenCache {
    /// Choose the single account matching the filters
    fn select_account(&self, username: Option<&str>, tenant: Option<&str>) -> Result<&CachedAccount> {
        let mut matching: Vec<&CachedAccount> = self
            .accounts
            .values()
            .filter(|a| {
                username.is_none_or(|u| a.username.as_deref().is_some_and(|n| n.eq_ignore_ascii_case(u)))
            })
            .filter(|a| tenant.is_none_or(|t| a.matches_tenant(t)))
            .collect();
        matching.sort_by(|a, b| a.home_account_id.cmp(&b.home_account_id));
        matching.dedup_by(|a, b| a.home_account_id == b.home_account_id);

        match matching.as_slice() {
            [] if self.accounts.is_empty() => bail!("No accounts were found in the shared token cache"),
            [] => bail!("No account in the shared token cache matches the requested username or tenant"),
            [account] => Ok(account),
            _ => bail!(
                "Multiple accounts were found in the shared token cache; set --shared-token-cache-username to choose one"
            ),
        }
    }

    fn refresh_token_for(&self, account: &CachedAccount, client_id: &str) -> Option<&str> {
        self.refresh_tokens
            .values()
            .filter(|rt| rt.home_account_id == account.home_account_id)
            .find(|rt| {
                rt.client_id.as_deref() == Some(client_id) || rt.family_id.as_deref() == Some("1")
            })
            .map(|rt| rt.secret.as_str())
    }
}

fn cache_path() -> Option<PathBuf> {
    let base = if cfg!(windows) {
        dirs::data_local_dir()
    } else {
        dirs::home_dir()
    };
    base.map(|dir| dir.join(".IdentityService").join("msal.cache"))
}

#[derive(Debug)]
pub struct SharedTokenCacheCredential {
    endpoint: TokenEndpoint,
    username: Option<String>,
    tenant_id: Option<String>,
    client_id: String,
    cache_path: Option<PathBuf>,
}

impl SharedTokenCacheCredential {
    pub fn new(options: &SharedCredentialOptions) -> Self {
        Self {
            endpoint: TokenEndpoint::new(options.authority_host.clone()),
            username: options.shared_token_cache_username.clone(),
            tenant_id: options.tenant_id.clone(),
            client_id: options
                .client_id
                .clone()
                .unwrap_or_else(|| DEFAULT_PUBLIC_CLIENT_ID.to_string()),
            cache_path: cache_path(),
        }
    }

    async fn load_cache(&self) -> Result<TokenCache> {
        let path = self
            .cache_path
            .as_ref()
            .ok_or_else(|| anyhow!("Could not determine the shared token cache location"))?;
        let content = tokio::fs::read(path)
            .await
            .with_context(|| format!("Shared token cache not found at {}", path.display()))?;
        serde_json::from_slice(&content)
            .context("The shared token cache is encrypted or in an unknown format")
    }
}

#[async_trait]
impl TokenCredential for SharedTokenCacheCredential {
    fn kind(&self) -> CredentialSourceKind {
        CredentialSourceKind::SharedTokenCache
    }

    async fn get_token(&self, request: &TokenRequestContext) -> Result<AccessToken> {
        reject_proof_of_possession(request)?;
        let cache = self.load_cache().await?;

        let tenant_filter = request.tenant_id.as_deref().or(self.tenant_id.as_deref());
        let account = cache.select_account(self.username.as_deref(), tenant_filter)?;
        let refresh_token = cache
            .refresh_token_for(account, &self.client_id)
            .ok_or_else(|| anyhow!("No refresh token is cached for the selected account"))?;

        let tenant = tenant_filter
            .or(account.realm.as_deref())
            .or(account.home_tenant())
            .unwrap_or(super::DEFAULT_USER_TENANT)
            .to_string();

        let grant = [
            ("grant_type", "refresh_token"),
            ("client_id", self.client_id.as_str()),
            ("refresh_token", refresh_token),
        ];
        Ok(self.endpoint.request_token(&tenant, request, &grant).await?)
    }
}
