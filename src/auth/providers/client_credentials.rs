//! Confidential client grants: service principal secrets and federated workload identity

use std::path::PathBuf;

use anyhow::{Context, Result, anyhow, bail};
use async_trait::async_trait;
use log::debug;

use super::developer_tools::reject_proof_of_possession;
use crate::auth::chain::{AccessToken, TokenCredential, TokenRequestContext};
use crate::auth::sources::{CredentialSourceKind, ServicePrincipalEnv, SharedCredentialOptions};
use crate::auth::tenant::resolve_tenant;
use crate::auth::token_endpoint::TokenEndpoint;

const JWT_BEARER_ASSERTION: &str = "urn:ietf:params:oauth:client-assertion-type:jwt-bearer";

fn pick_tenant(
    default_tenant: &str,
    request: &TokenRequestContext,
    additionally_allowed: &[String],
) -> Result<String> {
    Ok(
        resolve_tenant(Some(default_tenant), request.tenant_id.as_deref(), additionally_allowed)?
            .unwrap_or_else(|| default_tenant.to_string()),
    )
}

/// Service principal from `AZURE_TENANT_ID`, `AZURE_CLIENT_ID` and either
/// `AZURE_CLIENT_SECRET` or `AZURE_USERNAME`/`AZURE_PASSWORD`
#[derive(Debug)]
pub struct EnvironmentCredential {
    endpoint: TokenEndpoint,
    env: ServicePrincipalEnv,
    additionally_allowed_tenants: Vec<String>,
}

impl EnvironmentCredential {
    pub fn new(options: &SharedCredentialOptions) -> Self {
        Self {
            endpoint: TokenEndpoint::new(options.authority_host.clone()),
            env: options.environment.clone(),
            additionally_allowed_tenants: options.additionally_allowed_tenants.clone(),
        }
    }

    fn unavailable(missing: &str) -> anyhow::Error {
        anyhow!(
            "Environment variables are not fully configured: {missing} is not set. \
             See the troubleshooting guide for EnvironmentCredential."
        )
    }
}

#[async_trait]
impl TokenCredential for EnvironmentCredential {
    fn kind(&self) -> CredentialSourceKind {
        CredentialSourceKind::Environment
    }

    async fn get_token(&self, request: &TokenRequestContext) -> Result<AccessToken> {
        reject_proof_of_possession(request)?;

        let default_tenant = self
            .env
            .tenant_id
            .as_deref()
            .ok_or_else(|| Self::unavailable("AZURE_TENANT_ID"))?;
        let client_id = self
            .env
            .client_id
            .as_deref()
            .ok_or_else(|| Self::unavailable("AZURE_CLIENT_ID"))?;
        let tenant = pick_tenant(default_tenant, request, &self.additionally_allowed_tenants)?;

        if let Some(secret) = self.env.client_secret.as_deref() {
            debug!("Using client secret for {}", client_id);
            let grant = [
                ("grant_type", "client_credentials"),
                ("client_id", client_id),
                ("client_secret", secret),
            ];
            return Ok(self.endpoint.request_token(&tenant, request, &grant).await?);
        }

        if let Some(path) = &self.env.client_certificate_path {
            bail!(
                "Client certificate authentication ({}) is not supported; use AZURE_CLIENT_SECRET instead",
                path.display()
            );
        }

        if let (Some(username), Some(password)) =
            (self.env.username.as_deref(), self.env.password.as_deref())
        {
            debug!("Using username/password for {}", username);
            let grant = [
                ("grant_type", "password"),
                ("client_id", client_id),
                ("username", username),
                ("password", password),
            ];
            return Ok(self.endpoint.request_token(&tenant, request, &grant).await?);
        }

        Err(Self::unavailable("AZURE_CLIENT_SECRET"))
    }
}

/// Federated token exchange using a projected service account token file
#[derive(Debug)]
pub struct WorkloadIdentityCredential {
    endpoint: TokenEndpoint,
    tenant_id: Option<String>,
    client_id: Option<String>,
    token_file_path: Option<PathBuf>,
    additionally_allowed_tenants: Vec<String>,
}

impl WorkloadIdentityCredential {
    pub fn new(options: &SharedCredentialOptions) -> Self {
        Self {
            endpoint: TokenEndpoint::new(options.authority_host.clone()),
            tenant_id: options
                .tenant_id
                .clone()
                .or_else(|| options.environment.tenant_id.clone()),
            client_id: options
                .client_id
                .clone()
                .or_else(|| options.environment.client_id.clone()),
            token_file_path: options.token_file_path.clone(),
            additionally_allowed_tenants: options.additionally_allowed_tenants.clone(),
        }
    }
}

#[async_trait]
impl TokenCredential for WorkloadIdentityCredential {
    fn kind(&self) -> CredentialSourceKind {
        CredentialSourceKind::WorkloadIdentity
    }

    async fn get_token(&self, request: &TokenRequestContext) -> Result<AccessToken> {
        reject_proof_of_possession(request)?;

        let default_tenant = self
            .tenant_id
            .as_deref()
            .ok_or_else(|| anyhow!("No tenant id configured; set --tenant-id or AZURE_TENANT_ID"))?;
        let client_id = self
            .client_id
            .as_deref()
            .ok_or_else(|| anyhow!("No client id configured; set --client-id or AZURE_CLIENT_ID"))?;
        let path = self.token_file_path.as_ref().ok_or_else(|| {
            anyhow!("No token file configured; set --token-file-path or AZURE_FEDERATED_TOKEN_FILE")
        })?;
        let tenant = pick_tenant(default_tenant, request, &self.additionally_allowed_tenants)?;

        // Re-read on every request, the file is rotated by the platform
        let assertion = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read token file {}", path.display()))?;
        let assertion = assertion.trim();
        if assertion.is_empty() {
            bail!("Token file {} is empty", path.display());
        }

        let grant = [
            ("grant_type", "client_credentials"),
            ("client_id", client_id),
            ("client_assertion_type", JWT_BEARER_ASSERTION),
            ("client_assertion", assertion),
        ];
        Ok(self.endpoint.request_token(&tenant, request, &grant).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn request() -> TokenRequestContext {
        TokenRequestContext::for_scopes(["https://management.azure.com/.default"])
    }

    #[tokio::test]
    async fn test_environment_credential_reports_missing_tenant() {
        let credential = EnvironmentCredential::new(&SharedCredentialOptions::default());
        let err = credential.get_token(&request()).await.unwrap_err();
        assert!(err.to_string().contains("AZURE_TENANT_ID"));
    }

    #[tokio::test]
    async fn test_environment_credential_requires_a_secret() {
        let options = SharedCredentialOptions {
            environment: ServicePrincipalEnv {
                tenant_id: Some("tenant".to_string()),
                client_id: Some("client".to_string()),
                ..Default::default()
            },
            ..Default::default()
        };
        let err = EnvironmentCredential::new(&options)
            .get_token(&request())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("AZURE_CLIENT_SECRET"));
    }

    #[tokio::test]
    async fn test_environment_credential_rejects_pop() {
        let mut request = request();
        request.pop_enabled = true;
        let err = EnvironmentCredential::new(&SharedCredentialOptions::default())
            .get_token(&request)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Proof-of-possession"));
    }

    #[tokio::test]
    async fn test_workload_identity_rejects_empty_token_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "   ").unwrap();

        let options = SharedCredentialOptions {
            tenant_id: Some("tenant".to_string()),
            client_id: Some("client".to_string()),
            token_file_path: Some(file.path().to_path_buf()),
            ..Default::default()
        };
        let err = WorkloadIdentityCredential::new(&options)
            .get_token(&request())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("is empty"));
    }

    #[tokio::test]
    async fn test_workload_identity_falls_back_to_environment_ids() {
        let options = SharedCredentialOptions {
            environment: ServicePrincipalEnv {
                tenant_id: Some("env-tenant".to_string()),
                client_id: Some("env-client".to_string()),
                ..Default::default()
            },
            ..Default::default()
        };
        let credential = WorkloadIdentityCredential::new(&options);
        assert_eq!(credential.tenant_id.as_deref(), Some("env-tenant"));
        assert_eq!(credential.client_id.as_deref(), Some("env-client"));

        let err = credential.get_token(&request()).await.unwrap_err();
        assert!(err.to_string().contains("token file"));
    }
}
