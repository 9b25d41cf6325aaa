//! Azure Resource Manager resource identifiers
//!
//! `/subscriptions/{sub}/resourceGroups/{rg}/providers/{namespace}/{type}/{name}[/{child}/{name}...]`

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use uuid::Uuid;

pub const SUBSCRIPTION_PREFIX: &str = "/subscriptions/";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceIdentifier {
    raw: String,
    segments: Vec<String>,
    /// Position of the `providers` keyword, always a key position
    provider_index: Option<usize>,
}

impl ResourceIdentifier {
    pub fn parse(input: &str) -> Result<Self, String> {
        let trimmed = input.trim();
        if !trimmed.starts_with('/') {
            return Err(format!("'{trimmed}' must start with '/'"));
        }

        let raw = trimmed.trim_end_matches('/');
        if raw.is_empty() {
            return Err("resource identifier is empty".to_string());
        }
        let segments: Vec<String> = raw[1..].split('/').map(str::to_string).collect();
        if segments.iter().any(String::is_empty) {
            return Err(format!("'{trimmed}' contains an empty segment"));
        }

        let first = segments[0].as_str();
        if !first.eq_ignore_ascii_case("subscriptions") && !first.eq_ignore_ascii_case("providers") {
            return Err(format!(
                "'{trimmed}' must start with /subscriptions/ or /providers/"
            ));
        }

        let mut provider_index = None;
        let mut i = 0;
        while i < segments.len() {
            if segments[i].eq_ignore_ascii_case("providers") {
                if i + 1 >= segments.len() {
                    return Err(format!("'{trimmed}' is missing a provider namespace"));
                }
                let remaining = segments.len() - (i + 2);
                if remaining % 2 != 0 {
                    return Err(format!("'{trimmed}' has a resource type without a name"));
                }
                provider_index = Some(i);
                break;
            }
            if i + 1 >= segments.len() {
                return Err(format!("'{trimmed}' has a '{}' segment without a value", segments[i]));
            }
            i += 2;
        }

        Ok(Self {
            raw: raw.to_string(),
            segments,
            provider_index,
        })
    }

    /// Canonical identifier of a subscription
    pub fn subscription(id: Uuid) -> Self {
        let id = id.hyphenated().to_string();
        Self {
            raw: format!("{SUBSCRIPTION_PREFIX}{id}"),
            segments: vec!["subscriptions".to_string(), id],
            provider_index: None,
        }
    }

    fn value_after(&self, key: &str) -> Option<&str> {
        let end = self.provider_index.unwrap_or(self.segments.len());
        (0..end)
            .step_by(2)
            .find(|&i| self.segments[i].eq_ignore_ascii_case(key))
            .and_then(|i| self.segments.get(i + 1))
            .map(String::as_str)
    }

    pub fn subscription_id(&self) -> Option<&str> {
        if self.segments[0].eq_ignore_ascii_case("subscriptions") {
            self.segments.get(1).map(String::as_str)
        } else {
            None
        }
    }

    pub fn resource_group(&self) -> Option<&str> {
        self.value_after("resourceGroups")
    }

    pub fn name(&self) -> Option<&str> {
        self.segments.last().map(String::as_str)
    }

    /// `Microsoft.Resources/subscriptions`, `Microsoft.Resources/resourceGroups` or `{namespace}/{type}[/{child}...]`
    pub fn resource_type(&self) -> String {
        if let Some(p) = self.provider_index {
            let namespace = self.segments.get(p + 1).map(String::as_str).unwrap_or_default();
            let types: Vec<&str> = self.segments[p + 2..]
                .iter()
                .step_by(2)
                .map(String::as_str)
                .collect();
            if types.is_empty() {
                return "Microsoft.Resources/providers".to_string();
            }
            return format!("{namespace}/{}", types.join("/"));
        }

        match self.segments.len() {
            2 => "Microsoft.Resources/subscriptions".to_string(),
            _ => "Microsoft.Resources/resourceGroups".to_string(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl fmt::Display for ResourceIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl FromStr for ResourceIdentifier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for ResourceIdentifier {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.raw)
    }
}

impl<'de> Deserialize<'de> for ResourceIdentifier {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_resource_group_id() {
        let id = ResourceIdentifier::parse("/subscriptions/x/resourceGroups/y").unwrap();
        assert_eq!(id.subscription_id(), Some("x"));
        assert_eq!(id.resource_group(), Some("y"));
        assert_eq!(id.name(), Some("y"));
        assert_eq!(id.resource_type(), "Microsoft.Resources/resourceGroups");
    }

    #[test]
    fn test_parse_nested_provider_id() {
        let id = ResourceIdentifier::parse(
            "/subscriptions/s/resourceGroups/rg/providers/Microsoft.Sql/servers/srv/databases/db",
        )
        .unwrap();
        assert_eq!(id.resource_type(), "Microsoft.Sql/servers/databases");
        assert_eq!(id.name(), Some("db"));
    }

    #[test]
    fn test_providers_as_a_value_is_not_a_keyword() {
        let id = ResourceIdentifier::parse("/subscriptions/providers").unwrap();
        assert_eq!(id.resource_type(), "Microsoft.Resources/subscriptions");
        assert_eq!(id.subscription_id(), Some("providers"));

        let id = ResourceIdentifier::parse("/subscriptions/x/resourceGroups/providers").unwrap();
        assert_eq!(id.resource_type(), "Microsoft.Resources/resourceGroups");
        assert_eq!(id.resource_group(), Some("providers"));

        let id = ResourceIdentifier::parse(
            "/subscriptions/s/resourceGroups/providers/providers/Microsoft.Web/sites/providers",
        )
        .unwrap();
        assert_eq!(id.resource_type(), "Microsoft.Web/sites");
        assert_eq!(id.name(), Some("providers"));
    }

    #[test]
    fn test_trailing_slash_is_dropped() {
        let id = ResourceIdentifier::parse("/subscriptions/abc/").unwrap();
        assert_eq!(id.as_str(), "/subscriptions/abc");
        assert_eq!(id.resource_type(), "Microsoft.Resources/subscriptions");
    }

    #[test]
    fn test_rejects_malformed_ids() {
        assert!(ResourceIdentifier::parse("subscriptions/abc").is_err());
        assert!(ResourceIdentifier::parse("/subscriptions").is_err());
        assert!(ResourceIdentifier::parse("/subscriptions//resourceGroups/x").is_err());
        assert!(ResourceIdentifier::parse("/foo/bar").is_err());
        assert!(
            ResourceIdentifier::parse("/subscriptions/s/providers/Microsoft.Compute/virtualMachines")
                .is_err()
        );
    }

    #[test]
    fn test_subscription_from_guid_is_canonical() {
        let guid = Uuid::parse_str("6B085460-5F21-477E-BA44-1035046E9101").unwrap();
        let id = ResourceIdentifier::subscription(guid);
        assert_eq!(id.as_str(), "/subscriptions/6b085460-5f21-477e-ba44-1035046e9101");
    }
}
