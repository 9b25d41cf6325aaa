//! Managed identity via the instance metadata service or the App Service identity endpoint

use std::time::Duration;

use anyhow::{Result, anyhow, bail};
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use log::debug;
use reqwest::{Client, Url};
use serde::Deserialize;
use serde_json::Value;

use super::developer_tools::{reject_proof_of_possession, scope_to_resource};
use crate::auth::chain::{AccessToken, TokenCredential, TokenRequestContext};
use crate::auth::sources::{CredentialSourceKind, ManagedIdentitySelector, SharedCredentialOptions};
use crate::auth::token_endpoint::seconds;

const IMDS_ENDPOINT: &str = "http://169.254.169.254/metadata/identity/oauth2/token";
const IMDS_API_VERSION: &str = "2018-02-01";
const APP_SERVICE_API_VERSION: &str = "2019-08-01";

#[derive(Debug, Clone, PartialEq, Eq)]
enum IdentityEndpoint {
    Imds,
    AppService { endpoint: String, header: String },
}

impl IdentityEndpoint {
    fn detect() -> Self {
        match (
            std::env::var("IDENTITY_ENDPOINT").ok(),
            std::env::var("IDENTITY_HEADER").ok(),
        ) {
            (Some(endpoint), Some(header)) if !endpoint.is_empty() && !header.is_empty() => {
                IdentityEndpoint::AppService { endpoint, header }
            }
            _ => IdentityEndpoint::Imds,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ManagedIdentityToken {
    access_token: String,
    #[serde(default)]
    expires_on: Option<Value>,
    #[serde(default)]
    expires_in: Option<Value>,
    #[serde(default)]
    token_type: Option<String>,
}

impl ManagedIdentityToken {
    fn into_access_token(self) -> Result<AccessToken> {
        let expires_on = self
            .expires_on
            .as_ref()
            .and_then(seconds)
            .and_then(|epoch| Utc.timestamp_opt(epoch, 0).single())
            .or_else(|| {
                self.expires_in
                    .as_ref()
                    .and_then(seconds)
                    .map(|s| Utc::now() + chrono::Duration::seconds(s))
            })
            .ok_or_else(|| anyhow!("Managed identity response has no expiry"))?;

        Ok(AccessToken {
            token: self.access_token,
            expires_on,
            refresh_on: None,
            token_type: self.token_type.unwrap_or_else(|| "Bearer".to_string()),
        })
    }
}

#[derive(Debug)]
pub struct ManagedIdentityCredential {
    http: Client,
    selector: ManagedIdentitySelector,
    endpoint: IdentityEndpoint,
}

impl ManagedIdentityCredential {
    pub fn new(options: &SharedCredentialOptions) -> Self {
        let http = Client::builder()
            .connect_timeout(Duration::from_secs(2))
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_default();
        Self {
            http,
            selector: options.managed_identity.clone(),
            endpoint: IdentityEndpoint::detect(),
        }
    }

    fn token_url(&self, resource: &str) -> Result<Url> {
        let (base, api_version, resource_id_param) = match &self.endpoint {
            IdentityEndpoint::Imds => (IMDS_ENDPOINT, IMDS_API_VERSION, "msi_res_id"),
            IdentityEndpoint::AppService { endpoint, .. } => {
                (endpoint.as_str(), APP_SERVICE_API_VERSION, "mi_res_id")
            }
        };

        let mut url = Url::parse(base).map_err(|e| anyhow!("Invalid identity endpoint '{base}': {e}"))?;
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("api-version", api_version)
                .append_pair("resource", resource);
            match &self.selector {
                ManagedIdentitySelector::SystemAssigned => {}
                ManagedIdentitySelector::UserAssignedClientId(client_id) => {
                    query.append_pair("client_id", client_id);
                }
                ManagedIdentitySelector::UserAssignedResourceId(id) => {
                    query.append_pair(resource_id_param, id.as_str());
                }
            }
        }
        Ok(url)
    }
}

#[async_trait]
impl TokenCredential for ManagedIdentityCredential {
    fn kind(&self) -> CredentialSourceKind {
        CredentialSourceKind::ManagedIdentity
    }

    async fn get_token(&self, request: &TokenRequestContext) -> Result<AccessToken> {
        reject_proof_of_possession(request)?;
        let resource = scope_to_resource(&request.scopes)?;
        let url = self.token_url(&resource)?;
        debug!("Requesting managed identity token from {}", url.host_str().unwrap_or_default());

        let builder = match &self.endpoint {
            IdentityEndpoint::Imds => self.http.get(url).header("Metadata", "true"),
            IdentityEndpoint::AppService { header, .. } => {
                self.http.get(url).header("X-IDENTITY-HEADER", header.as_str())
            }
        };

        let response = builder.send().await.map_err(|e| {
            if e.is_connect() || e.is_timeout() {
                anyhow!("No managed identity endpoint found")
            } else {
                anyhow!(e)
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("Managed identity endpoint returned {status}: {}", body.trim());
        }

        let token: ManagedIdentityToken = response.json().await?;
        token.into_access_token()
    }
}
