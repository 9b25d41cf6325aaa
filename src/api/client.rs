use std::time::Duration;

use anyhow::{Context, anyhow};
use async_trait::async_trait;
use chrono::Utc;
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use log::{debug, info};
use reqwest::header::HeaderMap;
use reqwest::{Client, Method, Response, StatusCode, Url};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::models::{LocationRecord, ResourceGroupData, ResourceGroupResource, SubscriptionRecord, WaitUntil};
use super::retry::{RetryPolicy, retry_after, sleep_or_cancel};
use crate::auth::{AccessToken, CredentialChain, TokenRequestContext};
use crate::context::{SubscriptionContext, SubscriptionSource};
use crate::error::{ContextError, ContextResult};

pub const MANAGEMENT_ENDPOINT: &str = "https://management.azure.com/";

const SUBSCRIPTIONS_API_VERSION: &str = "2022-12-01";
const RESOURCE_GROUPS_API_VERSION: &str = "2022-09-01";
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Tokens are renewed this long before they expire
const TOKEN_REFRESH_MARGIN: chrono::Duration = chrono::Duration::minutes(5);

pub(crate) fn http_client() -> ContextResult<Client> {
    Client::builder()
        .pool_max_idle_per_host(10)
        .pool_idle_timeout(Duration::from_secs(90))
        .timeout(Duration::from_secs(60))
        .connect_timeout(Duration::from_secs(10))
        .user_agent(concat!("maz/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("Failed to build HTTP client")
        .map_err(ContextError::Remote)
}

/// Bearer token for one audience, fetched through the chain and reused until near expiry
#[derive(Debug)]
pub(crate) struct BearerToken {
    credential: CredentialChain,
    scope: String,
    cached: Mutex<Option<AccessToken>>,
}

impl BearerToken {
    pub(crate) fn new(credential: CredentialChain, scope: impl Into<String>) -> Self {
        Self {
            credential,
            scope: scope.into(),
            cached: Mutex::new(None),
        }
    }

    pub(crate) async fn get(&self, cancel: &CancellationToken) -> ContextResult<String> {
        let mut cached = self.cached.lock().await;
        if let Some(token) = cached
            .as_ref()
            .filter(|t| t.expires_on > Utc::now() + TOKEN_REFRESH_MARGIN)
        {
            return Ok(token.token.clone());
        }

        let request = TokenRequestContext::for_scopes([self.scope.as_str()]);
        let token = self.credential.get_token(&request, cancel).await?;
        let value = token.token.clone();
        *cached = Some(token);
        Ok(value)
    }
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
}

/// Turn a non-success response into the matching error
pub(crate) async fn check(response: Response) -> ContextResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let (code, message) = match serde_json::from_str::<ErrorBody>(&body) {
        Ok(e) => (e.error.code, e.error.message),
        Err(_) => (status.to_string(), body),
    };

    if status == StatusCode::NOT_FOUND {
        Err(ContextError::NotFound(message))
    } else {
        Err(ContextError::Remote(anyhow!("{code}: {message}")))
    }
}

pub(crate) async fn read_json<T: DeserializeOwned>(response: Response) -> ContextResult<T> {
    let response = check(response).await?;
    response
        .json::<T>()
        .await
        .context("Unexpected response body")
        .map_err(ContextError::Remote)
}

#[derive(Debug, Deserialize)]
struct Page<T> {
    #[serde(default = "Vec::new")]
    value: Vec<T>,
    #[serde(rename = "nextLink", default)]
    next_link: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OperationStatus {
    status: String,
    #[serde(default)]
    error: Option<ErrorDetail>,
}

fn header_url(headers: &HeaderMap, name: &str) -> Option<Url> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| Url::parse(v).ok())
}

fn resource_group_path(subscription: &SubscriptionContext, name: &str) -> String {
    format!("{}/resourcegroups/{}", subscription.id, urlencoding::encode(name))
}

/// Azure Resource Manager client for the handful of operations the commands need
#[derive(Debug)]
pub struct ArmClient {
    http: Client,
    endpoint: Url,
    token: BearerToken,
    retry: RetryPolicy,
}

impl ArmClient {
    pub fn new(credential: CredentialChain) -> ContextResult<Self> {
        let endpoint = Url::parse(MANAGEMENT_ENDPOINT).map_err(|e| ContextError::Remote(e.into()))?;
        Self::with_endpoint(credential, endpoint)
    }

    pub fn with_endpoint(credential: CredentialChain, endpoint: Url) -> ContextResult<Self> {
        let scope = format!("{}/.default", endpoint.as_str().trim_end_matches('/'));
        Ok(Self {
            http: http_client()?,
            endpoint,
            token: BearerToken::new(credential, scope),
            retry: RetryPolicy::default(),
        })
    }

    fn url(&self, path: &str, api_version: &str) -> ContextResult<Url> {
        let mut url = self
            .endpoint
            .join(path.trim_start_matches('/'))
            .with_context(|| format!("Invalid request path '{path}'"))
            .map_err(ContextError::Remote)?;
        url.query_pairs_mut().append_pair("api-version", api_version);
        Ok(url)
    }

    async fn send(
        &self,
        method: Method,
        url: Url,
        body: Option<&Value>,
        cancel: &CancellationToken,
    ) -> ContextResult<Response> {
        let token = self.token.get(cancel).await?;
        info!("{} {}", method, url.path());

        let response = self
            .retry
            .execute(cancel, || {
                let mut request = self
                    .http
                    .request(method.clone(), url.clone())
                    .bearer_auth(&token)
                    .header("x-ms-client-request-id", Uuid::new_v4().to_string());
                if let Some(body) = body {
                    request = request.json(body);
                }
                request.send()
            })
            .await?;

        debug!("{} {} returned {}", method, url.path(), response.status());
        Ok(response)
    }

    /// Follow `nextLink` pages lazily
    fn paged<'a, T>(&'a self, first: Url, cancel: &'a CancellationToken) -> BoxStream<'a, ContextResult<T>>
    where
        T: DeserializeOwned + Send + 'a,
    {
        stream::try_unfold(Some(first), move |next| async move {
            let Some(url) = next else {
                return Ok::<_, ContextError>(None);
            };
            let response = self.send(Method::GET, url, None, cancel).await?;
            let page: Page<T> = read_json(response).await?;
            let next = page
                .next_link
                .map(|link| Url::parse(&link))
                .transpose()
                .map_err(|e| ContextError::Remote(anyhow!("Invalid nextLink: {e}")))?;
            let items = stream::iter(page.value.into_iter().map(Ok::<T, ContextError>));
            Ok::<_, ContextError>(Some((items, next)))
        })
        .try_flatten()
        .boxed()
    }

    pub fn list_subscriptions<'a>(
        &'a self,
        cancel: &'a CancellationToken,
    ) -> BoxStream<'a, ContextResult<SubscriptionRecord>> {
        match self.url("subscriptions", SUBSCRIPTIONS_API_VERSION) {
            Ok(url) => self.paged(url, cancel),
            Err(e) => stream::once(async move { Err(e) }).boxed(),
        }
    }

    pub async fn list_locations(
        &self,
        subscription: &SubscriptionContext,
        cancel: &CancellationToken,
    ) -> ContextResult<Vec<LocationRecord>> {
        let url = self.url(&format!("{}/locations", subscription.id), SUBSCRIPTIONS_API_VERSION)?;
        self.paged(url, cancel).try_collect().await
    }

    pub async fn create_or_update_resource_group(
        &self,
        subscription: &SubscriptionContext,
        name: &str,
        data: &ResourceGroupData,
        cancel: &CancellationToken,
    ) -> ContextResult<ResourceGroupResource> {
        let url = self.url(&resource_group_path(subscription, name), RESOURCE_GROUPS_API_VERSION)?;
        let body = serde_json::to_value(data).map_err(|e| ContextError::Remote(e.into()))?;
        let response = self.send(Method::PUT, url, Some(&body), cancel).await?;
        read_json(response).await
    }

    pub async fn get_resource_group(
        &self,
        subscription: &SubscriptionContext,
        name: &str,
        cancel: &CancellationToken,
    ) -> ContextResult<ResourceGroupResource> {
        let url = self.url(&resource_group_path(subscription, name), RESOURCE_GROUPS_API_VERSION)?;
        let response = self.send(Method::GET, url, None, cancel).await?;
        read_json(response).await
    }

    pub fn list_resource_groups<'a>(
        &'a self,
        subscription: &SubscriptionContext,
        cancel: &'a CancellationToken,
    ) -> BoxStream<'a, ContextResult<ResourceGroupResource>> {
        match self.url(
            &format!("{}/resourcegroups", subscription.id),
            RESOURCE_GROUPS_API_VERSION,
        ) {
            Ok(url) => self.paged(url, cancel),
            Err(e) => stream::once(async move { Err(e) }).boxed(),
        }
    }

    pub async fn delete_resource_group(
        &self,
        resource_group: &ResourceGroupResource,
        force_deletion_types: Option<&str>,
        wait_until: WaitUntil,
        cancel: &CancellationToken,
    ) -> ContextResult<()> {
        let mut url = self.url(resource_group.id.as_str(), RESOURCE_GROUPS_API_VERSION)?;
        if let Some(types) = force_deletion_types {
            url.query_pairs_mut().append_pair("forceDeletionTypes", types);
        }

        let response = check(self.send(Method::DELETE, url, None, cancel).await?).await?;
        match wait_until {
            WaitUntil::Started => Ok(()),
            WaitUntil::Completed => self.wait_for_completion(response, cancel).await,
        }
    }

    /// Poll a long-running operation via `Azure-AsyncOperation` or `Location`
    async fn wait_for_completion(&self, response: Response, cancel: &CancellationToken) -> ContextResult<()> {
        if response.status() != StatusCode::ACCEPTED {
            return Ok(());
        }

        let headers = response.headers();
        let (poll_url, async_operation) = match (
            header_url(headers, "azure-asyncoperation"),
            header_url(headers, "location"),
        ) {
            (Some(url), _) => (url, true),
            (None, Some(url)) => (url, false),
            (None, None) => return Ok(()),
        };
        let mut delay = retry_after(headers).unwrap_or(DEFAULT_POLL_INTERVAL);

        loop {
            debug!("Operation still running, polling again in {:?}", delay);
            sleep_or_cancel(delay, cancel).await?;

            let response = self.send(Method::GET, poll_url.clone(), None, cancel).await?;
            delay = retry_after(response.headers()).unwrap_or(DEFAULT_POLL_INTERVAL);
            let response = check(response).await?;

            if async_operation {
                let status: OperationStatus = response
                    .json()
                    .await
                    .context("Unexpected operation status body")
                    .map_err(ContextError::Remote)?;
                match status.status.as_str() {
                    "Succeeded" => return Ok(()),
                    "Failed" | "Canceled" => {
                        let detail = status
                            .error
                            .map(|e| format!("{}: {}", e.code, e.message))
                            .unwrap_or_default();
                        return Err(ContextError::Remote(anyhow!(
                            "Operation {}. {}",
                            status.status.to_lowercase(),
                            detail
                        )));
                    }
                    _ => {}
                }
            } else if response.status() != StatusCode::ACCEPTED {
                return Ok(());
            }
        }
    }
}

#[async_trait]
impl SubscriptionSource for ArmClient {
    /// The first subscription visible to the credential
    async fn default_subscription(&self, cancel: &CancellationToken) -> ContextResult<SubscriptionRecord> {
        let mut subscriptions = self.list_subscriptions(cancel);
        match subscriptions.next().await {
            Some(record) => record,
            None => Err(ContextError::NotFound(
                "No subscriptions are visible to the current credential.".to_string(),
            )),
        }
    }

    fn subscriptions<'a>(
        &'a self,
        cancel: &'a CancellationToken,
    ) -> BoxStream<'a, ContextResult<SubscriptionRecord>> {
        self.list_subscriptions(cancel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ResourceIdentifier;
    use reqwest::header::HeaderValue;

    fn subscription() -> SubscriptionContext {
        let id = ResourceIdentifier::subscription(Uuid::nil());
        SubscriptionContext {
            subscription_id: Uuid::nil().to_string(),
            id,
            display_name: None,
            tenant_id: None,
            state: None,
        }
    }

    #[test]
    fn test_resource_group_path_escapes_name() {
        assert_eq!(
            resource_group_path(&subscription(), "my rg"),
            "/subscriptions/00000000-0000-0000-0000-000000000000/resourcegroups/my%20rg"
        );
    }

    #[test]
    fn test_page_without_value() {
        let page: Page<SubscriptionRecord> = serde_json::from_str(r#"{"nextLink": null}"#).unwrap();
        assert!(page.value.is_empty());
        assert!(page.next_link.is_none());
    }

    #[test]
    fn test_header_url() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "location",
            HeaderValue::from_static("https://management.azure.com/operationResults/abc?api-version=1"),
        );
        assert!(header_url(&headers, "location").is_some());
        assert!(header_url(&headers, "azure-asyncoperation").is_none());
    }
}
