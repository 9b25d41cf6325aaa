//! Subscription resolution
//!
//! Structural forms (resource identifier, GUID) resolve locally. Only a display name costs
//! a remote enumeration, and only when the caller allows it.

use async_trait::async_trait;
use futures::StreamExt;
use futures::stream::BoxStream;
use log::debug;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::env::{EnvDefaults, resolve};
use crate::api::{ResourceIdentifier, SUBSCRIPTION_PREFIX, SubscriptionRecord};
use crate::error::{ContextError, ContextResult};

const SUBSCRIPTION_TYPE: &str = "Microsoft.Resources/subscriptions";

/// What the user asked for, classified before any lookup
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscriptionReference {
    Unset,
    ResourceId(String),
    Guid(Uuid),
    DisplayName(String),
}

impl SubscriptionReference {
    pub fn classify(value: Option<&str>) -> Self {
        let Some(value) = value.map(str::trim).filter(|v| !v.is_empty()) else {
            return SubscriptionReference::Unset;
        };

        if value.starts_with(SUBSCRIPTION_PREFIX) {
            SubscriptionReference::ResourceId(value.to_string())
        } else if let Ok(guid) = Uuid::parse_str(value) {
            SubscriptionReference::Guid(guid)
        } else {
            SubscriptionReference::DisplayName(value.to_string())
        }
    }

    /// The `--subscription` value, falling back to `AZURE_SUBSCRIPTION_ID`
    pub fn from_input(explicit: Option<&str>, env: &EnvDefaults) -> Self {
        Self::classify(resolve(explicit, env.subscription_id.as_deref()).as_deref())
    }
}

/// The subscription subsequent operations act within
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionContext {
    pub id: ResourceIdentifier,
    pub subscription_id: String,
    pub display_name: Option<String>,
    pub tenant_id: Option<String>,
    pub state: Option<String>,
}

impl SubscriptionContext {
    fn from_identifier(id: ResourceIdentifier) -> ContextResult<Self> {
        let subscription_id = match id.subscription_id() {
            Some(sub) if id.resource_type() == SUBSCRIPTION_TYPE && Uuid::parse_str(sub).is_ok() => {
                sub.to_string()
            }
            _ => {
                return Err(ContextError::InvalidIdentifierFormat(format!(
                    "'{id}' is not a subscription identifier"
                )));
            }
        };
        Ok(Self {
            id,
            subscription_id,
            display_name: None,
            tenant_id: None,
            state: None,
        })
    }
}

impl From<SubscriptionRecord> for SubscriptionContext {
    fn from(record: SubscriptionRecord) -> Self {
        Self {
            id: record.id,
            subscription_id: record.subscription_id,
            display_name: Some(record.display_name),
            tenant_id: record.tenant_id,
            state: record.state,
        }
    }
}

/// Where subscriptions come from; implemented by the management API client
#[async_trait]
pub trait SubscriptionSource: Send + Sync {
    async fn default_subscription(&self, cancel: &CancellationToken) -> ContextResult<SubscriptionRecord>;

    /// Every subscription visible to the credential
    fn subscriptions<'a>(
        &'a self,
        cancel: &'a CancellationToken,
    ) -> BoxStream<'a, ContextResult<SubscriptionRecord>>;
}

pub async fn resolve_subscription(
    reference: &mut SubscriptionReference,
    source: &dyn SubscriptionSource,
    allow_display_name_lookup: bool,
    cancel: &CancellationToken,
) -> ContextResult<SubscriptionContext> {
    match reference.clone() {
        SubscriptionReference::Unset => {
            debug!("No subscription given, asking for the default subscription");
            let record = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(ContextError::Cancelled),
                record = source.default_subscription(cancel) => record?,
            };
            Ok(record.into())
        }
        SubscriptionReference::ResourceId(raw) => {
            let id = ResourceIdentifier::parse(&raw).map_err(ContextError::InvalidIdentifierFormat)?;
            SubscriptionContext::from_identifier(id)
        }
        SubscriptionReference::Guid(guid) => {
            SubscriptionContext::from_identifier(ResourceIdentifier::subscription(guid))
        }
        SubscriptionReference::DisplayName(name) => {
            if !allow_display_name_lookup {
                return Err(ContextError::InvalidIdentifierFormat(format!(
                    "Invalid --subscription format: {name}. Expected a GUID or ResourceIdentifier."
                )));
            }

            debug!("Looking up subscription by display name '{}'", name);
            let wanted = name.to_lowercase();
            let mut subscriptions = source.subscriptions(cancel);
            loop {
                let next = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(ContextError::Cancelled),
                    next = subscriptions.next() => next,
                };
                let Some(record) = next.transpose()? else {
                    break;
                };

                if record.display_name.to_lowercase() == wanted {
                    if let Ok(guid) = Uuid::parse_str(&record.subscription_id) {
                        *reference = SubscriptionReference::Guid(guid);
                    }
                    return Ok(record.into());
                }
            }

            Err(ContextError::NotFound(format!(
                "Subscription with display name '{name}' not found."
            )))
        }
    }
}

/// The subscription id for commands that need a literal value rather than a lookup
pub fn require_subscription_id(explicit: Option<&str>, env: &EnvDefaults) -> ContextResult<String> {
    resolve(explicit, env.subscription_id.as_deref()).ok_or(ContextError::MissingValue {
        name: "--subscription-id",
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        assert_eq!(SubscriptionReference::classify(None), SubscriptionReference::Unset);
        assert_eq!(SubscriptionReference::classify(Some("  ")), SubscriptionReference::Unset);
        assert!(matches!(
            SubscriptionReference::classify(Some("/subscriptions/abc")),
            SubscriptionReference::ResourceId(_)
        ));
        assert!(matches!(
            SubscriptionReference::classify(Some("00000000-0000-0000-0000-000000000001")),
            SubscriptionReference::Guid(_)
        ));
        assert_eq!(
            SubscriptionReference::classify(Some("Production")),
            SubscriptionReference::DisplayName("Production".to_string())
        );
    }

    #[test]
    fn test_environment_fallback() {
        let env = EnvDefaults {
            subscription_id: Some("Dev".to_string()),
            ..Default::default()
        };
        assert_eq!(
            SubscriptionReference::from_input(None, &env),
            SubscriptionReference::DisplayName("Dev".to_string())
        );
        assert_eq!(
            SubscriptionReference::from_input(Some("Prod"), &env),
            SubscriptionReference::DisplayName("Prod".to_string())
        );
    }

    #[test]
    fn test_non_subscription_identifier_is_rejected() {
        let id = ResourceIdentifier::parse("/subscriptions/abc/resourceGroups/rg").unwrap();
        assert!(matches!(
            SubscriptionContext::from_identifier(id),
            Err(ContextError::InvalidIdentifierFormat(_))
        ));
    }

    #[test]
    fn test_subscription_segment_must_be_a_guid() {
        let id = ResourceIdentifier::parse("/subscriptions/providers").unwrap();
        assert!(matches!(
            SubscriptionContext::from_identifier(id),
            Err(ContextError::InvalidIdentifierFormat(_))
        ));
    }

    #[test]
    fn test_require_subscription_id() {
        let err = require_subscription_id(None, &EnvDefaults::default()).unwrap_err();
        assert_eq!(err.to_string(), "--subscription-id is required.");
    }
}
