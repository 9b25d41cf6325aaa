//! Credentials borrowed from locally signed-in developer tools
//!
//! Each provider shells out to the tool's own "give me a token" command and parses its JSON.
//! The tools use their own configured cloud, so the authority host option does not apply.

use std::io::ErrorKind;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use async_trait::async_trait;
use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};
use log::debug;
use serde::Deserialize;
use tokio::process::Command;

use crate::auth::chain::{AccessToken, TokenCredential, TokenRequestContext};
use crate::auth::sources::{CredentialSourceKind, SharedCredentialOptions};
use crate::auth::tenant::{resolve_tenant, validate_tenant_id};

const TOOL_TIMEOUT: Duration = Duration::from_secs(30);

/// Tenant scoping shared by the tool-backed providers
#[derive(Debug, Clone, Default)]
struct TenantScope {
    tenant_id: Option<String>,
    additionally_allowed_tenants: Vec<String>,
}

impl TenantScope {
    fn from_options(options: &SharedCredentialOptions) -> Self {
        Self {
            tenant_id: options.tenant_id.clone(),
            additionally_allowed_tenants: options.additionally_allowed_tenants.clone(),
        }
    }

    fn resolve(&self, request: &TokenRequestContext) -> Result<Option<String>> {
        let tenant = resolve_tenant(
            self.tenant_id.as_deref(),
            request.tenant_id.as_deref(),
            &self.additionally_allowed_tenants,
        )?;
        if let Some(tenant) = &tenant {
            validate_tenant_id(tenant)?;
        }
        Ok(tenant)
    }
}

/// Tools speaking the v1 "resource" dialect take exactly one scope
pub(crate) fn scope_to_resource(scopes: &[String]) -> Result<String> {
    match scopes {
        [scope] => Ok(scope.trim_end_matches("/.default").to_string()),
        [] => bail!("No scope was requested"),
        _ => bail!("This credential supports a single scope per request, got {}", scopes.len()),
    }
}

pub(crate) fn reject_proof_of_possession(request: &TokenRequestContext) -> Result<()> {
    if request.pop_enabled {
        bail!("Proof-of-possession tokens are not supported by this credential");
    }
    Ok(())
}

fn platform_program(name: &str) -> String {
    if cfg!(windows) {
        format!("{name}.cmd")
    } else {
        name.to_string()
    }
}

/// Run a tool and return its stdout; a missing binary, timeout or non-zero exit is an error
async fn run_tool(program: &str, args: &[String], not_installed: &str) -> Result<String> {
    debug!("Running {} {}", program, args.first().map(String::as_str).unwrap_or_default());

    let output = tokio::time::timeout(
        TOOL_TIMEOUT,
        Command::new(program).args(args).kill_on_drop(true).output(),
    )
    .await
    .map_err(|_| anyhow!("{program} did not respond within {}s", TOOL_TIMEOUT.as_secs()))?;

    let output = match output {
        Ok(output) => output,
        Err(e) if e.kind() == ErrorKind::NotFound => bail!("{not_installed}"),
        Err(e) => return Err(e).with_context(|| format!("Failed to start {program}")),
    };

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let message = stderr.trim();
        bail!(
            "{program} exited with {}: {}",
            output.status,
            if message.is_empty() { "no error output" } else { message }
        );
    }

    String::from_utf8(output.stdout).context("Tool output was not valid UTF-8")
}

/// `2023-10-31 21:59:10.000000` in local time, as printed by older `az` versions
fn parse_local_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let naive = NaiveDateTime::parse_from_str(value.trim(), "%Y-%m-%d %H:%M:%S%.f").ok()?;
    Local
        .from_local_datetime(&naive)
        .single()
        .map(|dt| dt.with_timezone(&Utc))
}

fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value.trim())
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
        .or_else(|| parse_local_timestamp(value))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AzCliToken {
    access_token: String,
    #[serde(default)]
    token_type: Option<String>,
    #[serde(default)]
    expires_on: Option<String>,
    #[serde(rename = "expires_on", default)]
    expires_on_epoch: Option<i64>,
}

pub(crate) fn parse_az_output(stdout: &str) -> Result<AccessToken> {
    let parsed: AzCliToken =
        serde_json::from_str(stdout).context("Unexpected output from 'az account get-access-token'")?;

    let expires_on = parsed
        .expires_on_epoch
        .and_then(|epoch| Utc.timestamp_opt(epoch, 0).single())
        .or_else(|| parsed.expires_on.as_deref().and_then(parse_timestamp))
        .ok_or_else(|| anyhow!("Azure CLI token has no usable expiry"))?;

    Ok(AccessToken {
        token: parsed.access_token,
        expires_on,
        refresh_on: None,
        token_type: parsed.token_type.unwrap_or_else(|| "Bearer".to_string()),
    })
}

#[derive(Debug)]
pub struct AzureCliCredential {
    scope: TenantScope,
}

impl AzureCliCredential {
    pub fn new(options: &SharedCredentialOptions) -> Self {
        Self {
            scope: TenantScope::from_options(options),
        }
    }
}

#[async_trait]
impl TokenCredential for AzureCliCredential {
    fn kind(&self) -> CredentialSourceKind {
        CredentialSourceKind::Cli
    }

    async fn get_token(&self, request: &TokenRequestContext) -> Result<AccessToken> {
        reject_proof_of_possession(request)?;
        let tenant = self.scope.resolve(request)?;
        let [scope] = request.scopes.as_slice() else {
            bail!("Azure CLI supports a single scope per request");
        };

        let mut args = vec![
            "account".to_string(),
            "get-access-token".to_string(),
            "--output".to_string(),
            "json".to_string(),
            "--scope".to_string(),
            scope.clone(),
        ];
        if let Some(tenant) = tenant {
            args.extend(["--tenant".to_string(), tenant]);
        }

        let stdout = run_tool(
            &platform_program("az"),
            &args,
            "Azure CLI not installed. Install it and run 'az login'.",
        )
        .await?;
        parse_az_output(&stdout)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AzdToken {
    token: String,
    expires_on: String,
}

#[derive(Debug)]
pub struct AzureDeveloperCliCredential {
    scope: TenantScope,
}

impl AzureDeveloperCliCredential {
    pub fn new(options: &SharedCredentialOptions) -> Self {
        Self {
            scope: TenantScope::from_options(options),
        }
    }
}

#[async_trait]
impl TokenCredential for AzureDeveloperCliCredential {
    fn kind(&self) -> CredentialSourceKind {
        CredentialSourceKind::DeveloperCli
    }

    async fn get_token(&self, request: &TokenRequestContext) -> Result<AccessToken> {
        reject_proof_of_possession(request)?;
        if request.scopes.is_empty() {
            bail!("No scope was requested");
        }
        let tenant = self.scope.resolve(request)?;

        let mut args = vec![
            "auth".to_string(),
            "token".to_string(),
            "--output".to_string(),
            "json".to_string(),
            "--no-prompt".to_string(),
        ];
        for scope in &request.scopes {
            args.extend(["--scope".to_string(), scope.clone()]);
        }
        if let Some(tenant) = tenant {
            args.extend(["--tenant-id".to_string(), tenant]);
        }

        let stdout = run_tool(
            &platform_program("azd"),
            &args,
            "Azure Developer CLI not installed. Install it and run 'azd auth login'.",
        )
        .await?;

        let parsed: AzdToken =
            serde_json::from_str(&stdout).context("Unexpected output from 'azd auth token'")?;
        let expires_on = parse_timestamp(&parsed.expires_on)
            .ok_or_else(|| anyhow!("Unrecognised expiry '{}'", parsed.expires_on))?;

        Ok(AccessToken::bearer(parsed.token, expires_on))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct PowerShellToken {
    token: String,
    expires_on: i64,
}

#[derive(Debug)]
pub struct AzurePowerShellCredential {
    scope: TenantScope,
}

impl AzurePowerShellCredential {
    pub fn new(options: &SharedCredentialOptions) -> Self {
        Self {
            scope: TenantScope::from_options(options),
        }
    }

    fn script(resource: &str, tenant: Option<&str>) -> String {
        let tenant_arg = tenant
            .map(|t| format!(" -TenantId '{t}'"))
            .unwrap_or_default();
        format!(
            "$ErrorActionPreference = 'Stop'; \
             Import-Module Az.Accounts -MinimumVersion 2.2.0; \
             $t = Get-AzAccessToken -ResourceUrl '{resource}'{tenant_arg}; \
             $token = $t.Token; \
             if ($token -is [System.Security.SecureString]) {{ $token = [System.Net.NetworkCredential]::new('', $token).Password }}; \
             @{{ Token = $token; ExpiresOn = $t.ExpiresOn.ToUnixTimeSeconds() }} | ConvertTo-Json -Compress"
        )
    }
}

#[async_trait]
impl TokenCredential for AzurePowerShellCredential {
    fn kind(&self) -> CredentialSourceKind {
        CredentialSourceKind::PowerShell
    }

    async fn get_token(&self, request: &TokenRequestContext) -> Result<AccessToken> {
        reject_proof_of_possession(request)?;
        let tenant = self.scope.resolve(request)?;
        let resource = scope_to_resource(&request.scopes)?;
        if resource.contains('\'') {
            bail!("Invalid resource '{resource}'");
        }

        let args = vec![
            "-NoProfile".to_string(),
            "-NonInteractive".to_string(),
            "-Command".to_string(),
            Self::script(&resource, tenant.as_deref()),
        ];
        let program = if cfg!(windows) { "pwsh.exe" } else { "pwsh" };
        let stdout = run_tool(
            program,
            &args,
            "PowerShell (pwsh) not installed. Install it and run 'Connect-AzAccount'.",
        )
        .await?;

        let parsed: PowerShellToken =
            serde_json::from_str(stdout.trim()).context("Unexpected output from Get-AzAccessToken")?;
        let expires_on = Utc
            .timestamp_opt(parsed.expires_on, 0)
            .single()
            .ok_or_else(|| anyhow!("Invalid expiry {}", parsed.expires_on))?;

        Ok(AccessToken::bearer(parsed.token, expires_on))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct TokenProviderFile {
    token_providers: Vec<TokenProvider>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct TokenProvider {
    path: PathBuf,
    #[serde(default)]
    arguments: Vec<String>,
    #[serde(default)]
    preference: i32,
}

#[derive(Debug, Deserialize)]
struct VisualStudioToken {
    access_token: String,
    expires_on: String,
}

#[derive(Debug)]
pub struct VisualStudioCredential {
    scope: TenantScope,
}

impl VisualStudioCredential {
    pub fn new(options: &SharedCredentialOptions) -> Self {
        Self {
            scope: TenantScope::from_options(options),
        }
    }

    fn token_provider_file() -> Option<PathBuf> {
        dirs::data_local_dir().map(|dir| {
            dir.join(".IdentityService")
                .join("AzureServiceAuth")
                .join("tokenprovider.json")
        })
    }
}

#[async_trait]
impl TokenCredential for VisualStudioCredential {
    fn kind(&self) -> CredentialSourceKind {
        CredentialSourceKind::VisualStudio
    }

    async fn get_token(&self, request: &TokenRequestContext) -> Result<AccessToken> {
        reject_proof_of_possession(request)?;
        let tenant = self.scope.resolve(request)?;
        let resource = scope_to_resource(&request.scopes)?;

        let path = Self::token_provider_file()
            .ok_or_else(|| anyhow!("Could not determine the local application data directory"))?;
        let content = tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("Visual Studio token provider file not found: {}", path.display()))?;
        let mut file: TokenProviderFile =
            serde_json::from_str(&content).context("Invalid Visual Studio token provider file")?;
        file.token_providers.sort_by_key(|p| p.preference);

        let mut last_error = anyhow!("No Visual Studio token providers are configured");
        for provider in &file.token_providers {
            let mut args = provider.arguments.clone();
            args.extend(["--resource".to_string(), resource.clone()]);
            if let Some(tenant) = &tenant {
                args.extend(["--tenant".to_string(), tenant.clone()]);
            }

            let program = provider.path.to_string_lossy();
            match run_tool(&program, &args, "Visual Studio token provider is missing").await {
                Ok(stdout) => {
                    let parsed: VisualStudioToken = serde_json::from_str(&stdout)
                        .context("Unexpected output from the Visual Studio token provider")?;
                    let expires_on = parse_timestamp(&parsed.expires_on)
                        .ok_or_else(|| anyhow!("Unrecognised expiry '{}'", parsed.expires_on))?;
                    return Ok(AccessToken::bearer(parsed.access_token, expires_on));
                }
                Err(e) => last_error = e,
            }
        }

        Err(last_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_to_resource() {
        assert_eq!(
            scope_to_resource(&["https://management.azure.com/.default".to_string()]).unwrap(),
            "https://management.azure.com"
        );
        assert!(scope_to_resource(&[]).is_err());
        assert!(scope_to_resource(&["a".to_string(), "b".to_string()]).is_err());
    }

    #[test]
    fn test_parse_az_output_prefers_epoch() {
        let stdout = r#"{
            "accessToken": "tok",
            "expiresOn": "2023-10-31 21:59:10.000000",
            "expires_on": 1698789550,
            "subscription": "sub",
            "tenant": "tenant",
            "tokenType": "Bearer"
        }"#;
        let token = parse_az_output(stdout).unwrap();
        assert_eq!(token.token, "tok");
        assert_eq!(token.expires_on.timestamp(), 1_698_789_550);
        assert_eq!(token.token_type, "Bearer");
    }

    #[test]
    fn test_parse_az_output_local_timestamp() {
        let stdout = r#"{"accessToken": "tok", "expiresOn": "2030-01-01 00:00:00.000000"}"#;
        let token = parse_az_output(stdout).unwrap();
        assert!(!token.is_expired());
    }

    #[test]
    fn test_parse_az_output_garbage() {
        assert!(parse_az_output("ERROR: Please run 'az login'").is_err());
    }

    #[test]
    fn test_powershell_script_includes_tenant() {
        let script = AzurePowerShellCredential::script("https://vault.azure.net", Some("contoso"));
        assert!(script.contains("-ResourceUrl 'https://vault.azure.net'"));
        assert!(script.contains("-TenantId 'contoso'"));
    }

    #[tokio::test]
    async fn test_pinned_tenant_rejects_foreign_request_before_running_tool() {
        let options = SharedCredentialOptions {
            tenant_id: Some("home".to_string()),
            ..Default::default()
        };
        let credential = AzureCliCredential::new(&options);
        let mut request = TokenRequestContext::for_scopes(["https://management.azure.com/.default"]);
        request.tenant_id = Some("elsewhere".to_string());

        let err = credential.get_token(&request).await.unwrap_err();
        assert!(err.to_string().contains("elsewhere"));
    }
}
