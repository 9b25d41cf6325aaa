use anyhow::{Context, anyhow};
use log::{info, warn};
use reqwest::{Client, Url};
use serde::Deserialize;
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::ResourceIdentifier;
use super::client::{BearerToken, http_client, read_json};
use super::retry::RetryPolicy;
use crate::auth::CredentialChain;
use crate::error::{ContextError, ContextResult};

pub const LOGS_ENDPOINT: &str = "https://api.loganalytics.io/";

/// What the query runs against
#[derive(Debug, Clone, PartialEq)]
pub enum LogsQueryTarget {
    Workspace(String),
    Resource(ResourceIdentifier),
}

impl LogsQueryTarget {
    fn path(&self) -> String {
        match self {
            LogsQueryTarget::Workspace(id) => format!("v1/workspaces/{}/query", urlencoding::encode(id)),
            LogsQueryTarget::Resource(id) => format!("v1{id}/query"),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct LogsQueryOptions {
    pub include_statistics: bool,
    pub include_visualization: bool,
    pub additional_workspaces: Vec<String>,
}

impl LogsQueryOptions {
    fn prefer_header(&self) -> Option<String> {
        let mut prefer = Vec::new();
        if self.include_statistics {
            prefer.push("include-statistics=true");
        }
        if self.include_visualization {
            prefer.push("include-render=true");
        }
        (!prefer.is_empty()).then(|| prefer.join(","))
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LogsColumn {
    pub name: String,
    #[serde(rename = "type", default)]
    pub column_type: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LogsTable {
    pub name: String,
    #[serde(default)]
    pub columns: Vec<LogsColumn>,
    #[serde(default)]
    pub rows: Vec<Vec<Value>>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LogsQueryResult {
    #[serde(default)]
    pub tables: Vec<LogsTable>,
    #[serde(default)]
    pub statistics: Option<Value>,
    #[serde(default)]
    pub render: Option<Value>,
    /// Set when the service returned partial results
    #[serde(default)]
    pub error: Option<Value>,
}

impl LogsQueryResult {
    /// The primary table of the result
    pub fn table(&self) -> ContextResult<&LogsTable> {
        match self.tables.as_slice() {
            [table] => Ok(table),
            [] => Err(ContextError::Remote(anyhow!("The query returned no tables"))),
            tables => Err(ContextError::Remote(anyhow!(
                "The query returned {} tables; expected one",
                tables.len()
            ))),
        }
    }
}

#[derive(Debug)]
pub struct LogsQueryClient {
    http: Client,
    endpoint: Url,
    token: BearerToken,
    retry: RetryPolicy,
}

impl LogsQueryClient {
    pub fn new(credential: CredentialChain) -> ContextResult<Self> {
        let endpoint = Url::parse(LOGS_ENDPOINT).map_err(|e| ContextError::Remote(e.into()))?;
        let scope = format!("{}/.default", endpoint.as_str().trim_end_matches('/'));
        Ok(Self {
            http: http_client()?,
            endpoint,
            token: BearerToken::new(credential, scope),
            retry: RetryPolicy::default(),
        })
    }

    pub async fn query(
        &self,
        target: &LogsQueryTarget,
        query: &str,
        options: &LogsQueryOptions,
        cancel: &CancellationToken,
    ) -> ContextResult<LogsQueryResult> {
        let url = self
            .endpoint
            .join(&target.path())
            .context("Invalid query target")
            .map_err(ContextError::Remote)?;

        let mut body = json!({ "query": query });
        if !options.additional_workspaces.is_empty() {
            body["workspaces"] = json!(options.additional_workspaces);
        }
        let prefer = options.prefer_header();

        let token = self.token.get(cancel).await?;
        info!("POST {}", url.path());
        let response = self
            .retry
            .execute(cancel, || {
                let mut request = self
                    .http
                    .post(url.clone())
                    .bearer_auth(&token)
                    .header("x-ms-client-request-id", Uuid::new_v4().to_string())
                    .json(&body);
                if let Some(prefer) = &prefer {
                    request = request.header("Prefer", prefer.as_str());
                }
                request.send()
            })
            .await?;

        let result: LogsQueryResult = read_json(response).await?;
        if let Some(error) = &result.error {
            warn!("Query returned partial results: {}", error);
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_target_paths() {
        assert_eq!(
            LogsQueryTarget::Workspace("abc".to_string()).path(),
            "v1/workspaces/abc/query"
        );
        let id = ResourceIdentifier::parse("/subscriptions/s/resourceGroups/rg").unwrap();
        assert_eq!(
            LogsQueryTarget::Resource(id).path(),
            "v1/subscriptions/s/resourceGroups/rg/query"
        );
    }

    #[test]
    fn test_prefer_header() {
        assert_eq!(LogsQueryOptions::default().prefer_header(), None);
        let options = LogsQueryOptions {
            include_statistics: true,
            include_visualization: true,
            ..Default::default()
        };
        assert_eq!(
            options.prefer_header().as_deref(),
            Some("include-statistics=true,include-render=true")
        );
    }

    #[test]
    fn test_primary_table() {
        let result: LogsQueryResult = serde_json::from_value(json!({
            "tables": [{
                "name": "PrimaryResult",
                "columns": [{"name": "Count", "type": "long"}],
                "rows": [[42]]
            }]
        }))
        .unwrap();
        let table = result.table().unwrap();
        assert_eq!(table.columns[0].name, "Count");
        assert_eq!(table.rows, vec![vec![json!(42)]]);

        let empty = LogsQueryResult {
            tables: Vec::new(),
            statistics: None,
            render: None,
            error: None,
        };
        assert!(empty.table().is_err());
    }
}
