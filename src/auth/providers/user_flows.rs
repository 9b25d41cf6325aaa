//! Interactive user sign-in: device code and loopback browser flows

use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow, bail};
use async_trait::async_trait;
use log::{debug, info, warn};
use serde::Deserialize;
use serde_json::Value;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::process::Command;
use uuid::Uuid;

use super::developer_tools::reject_proof_of_possession;
use super::{DEFAULT_PUBLIC_CLIENT_ID, DEFAULT_USER_TENANT};
use crate::auth::chain::{AccessToken, TokenCredential, TokenRequestContext};
use crate::auth::sources::{CredentialSourceKind, SharedCredentialOptions};
use crate::auth::tenant::resolve_tenant;
use crate::auth::token_endpoint::{TokenEndpoint, seconds};

const DEVICE_CODE_GRANT: &str = "urn:ietf:params:oauth:grant-type:device_code";
const BROWSER_TIMEOUT: Duration = Duration::from_secs(300);

/// Public client settings shared by the user flows
#[derive(Debug, Clone)]
struct PublicClient {
    endpoint: TokenEndpoint,
    tenant_id: Option<String>,
    client_id: String,
    additionally_allowed_tenants: Vec<String>,
}

impl PublicClient {
    fn from_options(options: &SharedCredentialOptions) -> Self {
        Self {
            endpoint: TokenEndpoint::new(options.authority_host.clone()),
            tenant_id: options.tenant_id.clone(),
            client_id: options
                .client_id
                .clone()
                .unwrap_or_else(|| DEFAULT_PUBLIC_CLIENT_ID.to_string()),
            additionally_allowed_tenants: options.additionally_allowed_tenants.clone(),
        }
    }

    fn tenant(&self, request: &TokenRequestContext) -> Result<String> {
        Ok(resolve_tenant(
            self.tenant_id.as_deref(),
            request.tenant_id.as_deref(),
            &self.additionally_allowed_tenants,
        )?
        .unwrap_or_else(|| DEFAULT_USER_TENANT.to_string()))
    }
}

#[derive(Debug, Deserialize)]
struct DeviceCodeResponse {
    device_code: String,
    user_code: String,
    verification_uri: String,
    expires_in: Value,
    #[serde(default)]
    interval: Option<Value>,
    #[serde(default)]
    message: Option<String>,
}

impl DeviceCodeResponse {
    fn prompt(&self) -> String {
        self.message.clone().unwrap_or_else(|| {
            format!(
                "To sign in, use a web browser to open the page {} and enter the code {} to authenticate.",
                self.verification_uri, self.user_code
            )
        })
    }
}

#[derive(Debug)]
pub struct DeviceCodeCredential {
    client: PublicClient,
}

impl DeviceCodeCredential {
    pub fn new(options: &SharedCredentialOptions) -> Self {
        Self {
            client: PublicClient::from_options(options),
        }
    }
}

#[async_trait]
impl TokenCredential for DeviceCodeCredential {
    fn kind(&self) -> CredentialSourceKind {
        CredentialSourceKind::DeviceCode
    }

    async fn get_token(&self, request: &TokenRequestContext) -> Result<AccessToken> {
        reject_proof_of_possession(request)?;
        let tenant = self.client.tenant(request)?;
        let scope = request.scopes.join(" ");

        let device: DeviceCodeResponse = self
            .client
            .endpoint
            .post_form(
                &tenant,
                "devicecode",
                &[("client_id", self.client.client_id.as_str()), ("scope", scope.as_str())],
                request.parent_request_id.as_deref(),
            )
            .await?;

        eprintln!("{}", device.prompt());

        let expires_in = seconds(&device.expires_in).unwrap_or(900).max(1) as u64;
        let deadline = Instant::now() + Duration::from_secs(expires_in);
        let mut interval = device
            .interval
            .as_ref()
            .and_then(seconds)
            .unwrap_or(5)
            .max(1) as u64;

        let grant = [
            ("grant_type", DEVICE_CODE_GRANT),
            ("client_id", self.client.client_id.as_str()),
            ("device_code", device.device_code.as_str()),
        ];

        loop {
            tokio::time::sleep(Duration::from_secs(interval)).await;
            if Instant::now() >= deadline {
                bail!("The device code expired before sign-in completed");
            }

            match self.client.endpoint.request_token(&tenant, request, &grant).await {
                Ok(token) => return Ok(token),
                Err(e) if e.code() == Some("authorization_pending") => {
                    debug!("Waiting for device code sign-in");
                }
                Err(e) if e.code() == Some("slow_down") => {
                    interval += 5;
                    debug!("Token endpoint asked to slow down, polling every {}s", interval);
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

/// Query parameters delivered to the loopback redirect
#[derive(Debug, Default, PartialEq, Eq)]
struct Callback {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

impl Callback {
    fn is_response(&self) -> bool {
        self.code.is_some() || self.error.is_some()
    }
}

/// Parse `GET /?code=..&state=.. HTTP/1.1`
fn parse_callback(request_line: &str) -> Callback {
    let mut callback = Callback::default();
    let Some(target) = request_line.split_whitespace().nth(1) else {
        return callback;
    };
    let Some((_, query)) = target.split_once('?') else {
        return callback;
    };

    for pair in query.split('&') {
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        let value = urlencoding::decode(&value.replace('+', " "))
            .map(|v| v.into_owned())
            .unwrap_or_else(|_| value.to_string());
        match key {
            "code" => callback.code = Some(value),
            "state" => callback.state = Some(value),
            "error" => callback.error = Some(value),
            "error_description" => callback.error_description = Some(value),
            _ => {}
        }
    }
    callback
}

async fn open_browser(url: &str) -> bool {
    let mut command = if cfg!(target_os = "windows") {
        let mut c = Command::new("cmd");
        c.args(["/C", "start", "", url]);
        c
    } else if cfg!(target_os = "macos") {
        let mut c = Command::new("open");
        c.arg(url);
        c
    } else {
        let mut c = Command::new("xdg-open");
        c.arg(url);
        c
    };

    match command.status().await {
        Ok(status) => status.success(),
        Err(e) => {
            debug!("Could not launch a browser: {}", e);
            false
        }
    }
}

#[derive(Debug)]
pub struct InteractiveBrowserCredential {
    client: PublicClient,
}

impl InteractiveBrowserCredential {
    pub fn new(options: &SharedCredentialOptions) -> Self {
        Self {
            client: PublicClient::from_options(options),
        }
    }

    async fn wait_for_callback(listener: &TcpListener) -> Result<Callback> {
        loop {
            let (mut stream, _) = listener.accept().await?;
            let mut buffer = vec![0u8; 8192];
            let read = stream.read(&mut buffer).await?;
            let request = String::from_utf8_lossy(&buffer[..read]);
            let callback = parse_callback(request.lines().next().unwrap_or_default());

            if !callback.is_response() {
                stream
                    .write_all(b"HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n")
                    .await?;
                continue;
            }

            let body = if callback.code.is_some() {
                "<html><body>Authentication complete. You can close this window.</body></html>"
            } else {
                "<html><body>Authentication failed. You can close this window.</body></html>"
            };
            let response = format!(
                "HTTP/1.1 200 OK\r\nContent-Type: text/html\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                body.len(),
                body
            );
            stream.write_all(response.as_bytes()).await?;
            stream.shutdown().await.ok();
            return Ok(callback);
        }
    }
}

#[async_trait]
impl TokenCredential for InteractiveBrowserCredential {
    fn kind(&self) -> CredentialSourceKind {
        CredentialSourceKind::InteractiveBrowser
    }

    async fn get_token(&self, request: &TokenRequestContext) -> Result<AccessToken> {
        reject_proof_of_possession(request)?;
        let tenant = self.client.tenant(request)?;

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .context("Failed to open a loopback port for the redirect")?;
        let redirect_uri = format!("http://localhost:{}", listener.local_addr()?.port());
        let state = Uuid::new_v4().to_string();
        let scope = request.scopes.join(" ");

        let mut authorize = self.client.endpoint.url(&tenant, "authorize")?;
        authorize
            .query_pairs_mut()
            .append_pair("client_id", &self.client.client_id)
            .append_pair("response_type", "code")
            .append_pair("redirect_uri", &redirect_uri)
            .append_pair("scope", &scope)
            .append_pair("state", &state)
            .append_pair("response_mode", "query")
            .append_pair("prompt", "select_account");

        if !open_browser(authorize.as_str()).await {
            warn!("Could not open a browser automatically");
            eprintln!("Open the following URL in a browser to sign in:\n{authorize}");
        }
        info!("Waiting for browser sign-in on {}", redirect_uri);

        let callback = tokio::time::timeout(BROWSER_TIMEOUT, Self::wait_for_callback(&listener))
            .await
            .map_err(|_| anyhow!("Timed out waiting for browser sign-in"))??;

        if let Some(error) = callback.error {
            bail!(
                "{}: {}",
                error,
                callback.error_description.unwrap_or_default()
            );
        }
        if callback.state.as_deref() != Some(state.as_str()) {
            bail!("Browser sign-in returned an unexpected state value");
        }
        let code = callback
            .code
            .ok_or_else(|| anyhow!("Browser sign-in returned no authorization code"))?;

        let grant = [
            ("grant_type", "authorization_code"),
            ("client_id", self.client.client_id.as_str()),
            ("code", code.as_str()),
            ("redirect_uri", redirect_uri.as_str()),
        ];
        Ok(self.client.endpoint.request_token(&tenant, request, &grant).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_callback_with_code() {
        let callback = parse_callback("GET /?code=0.AX%2Fabc&state=s1&session_state=x HTTP/1.1");
        assert_eq!(callback.code.as_deref(), Some("0.AX/abc"));
        assert_eq!(callback.state.as_deref(), Some("s1"));
        assert!(callback.is_response());
    }

    #[test]
    fn test_parse_callback_with_error() {
        let callback =
            parse_callback("GET /?error=access_denied&error_description=User+cancelled HTTP/1.1");
        assert_eq!(callback.error.as_deref(), Some("access_denied"));
        assert_eq!(callback.error_description.as_deref(), Some("User cancelled"));
    }

    #[test]
    fn test_parse_callback_ignores_other_requests() {
        assert!(!parse_callback("GET /favicon.ico HTTP/1.1").is_response());
        assert!(!parse_callback("").is_response());
    }

    #[test]
    fn test_user_flows_default_to_organizations_and_cli_client() {
        let client = PublicClient::from_options(&SharedCredentialOptions::default());
        assert_eq!(client.client_id, DEFAULT_PUBLIC_CLIENT_ID);
        let request = TokenRequestContext::for_scopes(["s"]);
        assert_eq!(client.tenant(&request).unwrap(), DEFAULT_USER_TENANT);
    }

    #[test]
    fn test_device_code_prompt_falls_back_to_uri_and_code() {
        let device: DeviceCodeResponse = serde_json::from_value(serde_json::json!({
            "device_code": "dc",
            "user_code": "ABCD-1234",
            "verification_uri": "https://microsoft.com/devicelogin",
            "expires_in": "900"
        }))
        .unwrap();
        let prompt = device.prompt();
        assert!(prompt.contains("ABCD-1234"));
        assert!(prompt.contains("https://microsoft.com/devicelogin"));
    }
}
