//! Microsoft Entra token endpoint requests
//!
//! Single form posts against `{authority}/{tenant}/oauth2/v2.0/{endpoint}`.

use std::time::Duration;

use chrono::Utc;
use log::debug;
use reqwest::{Client, Url};
use serde::Deserialize;
use serde_json::Value;

use super::chain::{AccessToken, TokenRequestContext};
use super::tenant::validate_tenant_id;

/// Client capability claim that opts a request into continuous access evaluation
const CAE_CLAIMS: &str = r#"{"access_token":{"xms_cc":{"values":["CP1"]}}}"#;

#[derive(Debug, thiserror::Error)]
pub enum TokenEndpointError {
    #[error("token request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{error}: {description}")]
    Rejected { error: String, description: String },

    #[error("{0}")]
    Invalid(String),
}

impl TokenEndpointError {
    /// OAuth error code for rejected requests, e.g. `authorization_pending`
    pub fn code(&self) -> Option<&str> {
        match self {
            TokenEndpointError::Rejected { error, .. } => Some(error),
            _ => None,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub expires_in: Option<Value>,
    #[serde(default)]
    pub refresh_in: Option<Value>,
}

impl TokenResponse {
    pub fn into_access_token(self) -> AccessToken {
        let now = Utc::now();
        let expires_in = self.expires_in.as_ref().and_then(seconds).unwrap_or(3600);
        AccessToken {
            token: self.access_token,
            expires_on: now + chrono::Duration::seconds(expires_in),
            refresh_on: self
                .refresh_in
                .as_ref()
                .and_then(seconds)
                .map(|s| now + chrono::Duration::seconds(s)),
            token_type: self.token_type.unwrap_or_else(|| "Bearer".to_string()),
        }
    }
}

/// Entra responses carry numbers either as JSON numbers or as strings
pub fn seconds(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

#[derive(Debug, Clone)]
pub struct TokenEndpoint {
    http: Client,
    authority: Url,
}

impl TokenEndpoint {
    pub fn new(authority: Url) -> Self {
        let http = Client::builder()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            .user_agent(concat!("maz/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_default();
        Self { http, authority }
    }

    pub fn http(&self) -> &Client {
        &self.http
    }

    pub fn url(&self, tenant: &str, endpoint: &str) -> Result<Url, TokenEndpointError> {
        validate_tenant_id(tenant).map_err(|e| TokenEndpointError::Invalid(e.to_string()))?;
        let base = if self.authority.as_str().ends_with('/') {
            self.authority.clone()
        } else {
            Url::parse(&format!("{}/", self.authority))
                .map_err(|e| TokenEndpointError::Invalid(e.to_string()))?
        };
        base.join(&format!("{tenant}/oauth2/v2.0/{endpoint}"))
            .map_err(|e| TokenEndpointError::Invalid(e.to_string()))
    }

    /// POST a form to `{tenant}/oauth2/v2.0/{endpoint}` and decode the JSON body
    pub async fn post_form<T: for<'de> Deserialize<'de>>(
        &self,
        tenant: &str,
        endpoint: &str,
        form: &[(&str, &str)],
        parent_request_id: Option<&str>,
    ) -> Result<T, TokenEndpointError> {
        let url = self.url(tenant, endpoint)?;
        let mut request = self.http.post(url).form(form);
        if let Some(id) = parent_request_id {
            request = request.header("client-request-id", id);
        }
        let response = request.send().await?;

        let status = response.status();
        debug!("Token endpoint {} returned {}", endpoint, status);

        if status.is_success() {
            return Ok(response.json().await?);
        }

        let body = response.text().await?;
        match serde_json::from_str::<ErrorResponse>(&body) {
            Ok(err) => Err(TokenEndpointError::Rejected {
                error: err.error,
                description: err
                    .error_description
                    .map(|d| d.lines().next().unwrap_or_default().to_string())
                    .unwrap_or_default(),
            }),
            Err(_) => Err(TokenEndpointError::Rejected {
                error: status.to_string(),
                description: body,
            }),
        }
    }

    /// Request a token with the given grant-specific parameters
    pub async fn request_token(
        &self,
        tenant: &str,
        request: &TokenRequestContext,
        grant: &[(&str, &str)],
    ) -> Result<AccessToken, TokenEndpointError> {
        let scope = request.scopes.join(" ");
        let claims = claims_parameter(request);

        let mut form: Vec<(&str, &str)> = grant.to_vec();
        form.push(("scope", scope.as_str()));
        if let Some(claims) = claims.as_deref() {
            form.push(("claims", claims));
        }

        let response: TokenResponse = self
            .post_form(tenant, "token", &form, request.parent_request_id.as_deref())
            .await?;
        Ok(response.into_access_token())
    }
}

/// Explicit claims win; otherwise a CAE-enabled request advertises the CP1 capability
pub fn claims_parameter(request: &TokenRequestContext) -> Option<String> {
    match request.claims.as_deref().filter(|c| !c.trim().is_empty()) {
        Some(claims) => Some(claims.to_string()),
        None if request.cae_enabled => Some(CAE_CLAIMS.to_string()),
        None => None,
    }
}
