use std::collections::BTreeMap;

use clap::ValueEnum;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use super::ResourceIdentifier;
use crate::render::{Described, Renderable, ResourceFamily, ResourcePayload, TrackedResourceData, TypeDescriptor};

/// How long a mutating command waits on the service
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum WaitUntil {
    /// Return once the operation is accepted
    Started,
    /// Poll until the operation finishes
    #[default]
    Completed,
}

/// A subscription as returned by the subscriptions list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionRecord {
    pub id: ResourceIdentifier,
    pub subscription_id: String,
    pub display_name: String,
    #[serde(default)]
    pub tenant_id: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
}

impl SubscriptionRecord {
    pub fn is_enabled(&self) -> bool {
        self.state
            .as_deref()
            .is_some_and(|s| s.eq_ignore_ascii_case("Enabled"))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationRecord {
    pub name: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub regional_display_name: Option<String>,
    #[serde(rename = "type", default)]
    pub location_type: Option<String>,
}

/// Body of a resource group create or update
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceGroupData {
    pub location: String,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub tags: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub managed_by: Option<String>,
}

impl ResourceGroupData {
    pub fn new(location: impl Into<String>) -> Self {
        Self {
            location: location.into(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Deserialize)]
struct WireResource {
    id: String,
    name: String,
    #[serde(rename = "type")]
    resource_type: String,
    #[serde(default)]
    location: String,
}

/// A resource group as returned by the service; the payload is kept as received
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceGroupResource {
    pub id: ResourceIdentifier,
    pub name: String,
    pub resource_type: String,
    pub location: String,
    data: Value,
}

impl ResourceGroupResource {
    pub fn from_value(data: Value) -> anyhow::Result<Self> {
        let wire = WireResource::deserialize(&data)?;
        let id = ResourceIdentifier::parse(&wire.id).map_err(|e| anyhow::anyhow!("{e}"))?;
        Ok(Self {
            id,
            name: wire.name,
            resource_type: wire.resource_type,
            location: wire.location,
            data,
        })
    }

    pub fn data(&self) -> &Value {
        &self.data
    }
}

impl<'de> Deserialize<'de> for ResourceGroupResource {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let data = Value::deserialize(deserializer)?;
        Self::from_value(data).map_err(serde::de::Error::custom)
    }
}

impl Described for ResourceGroupResource {
    fn descriptor() -> TypeDescriptor {
        TypeDescriptor {
            name: "maz::api::ResourceGroupResource",
            family: ResourceFamily::ArmResource,
        }
    }
}

impl Renderable for ResourceGroupResource {
    fn type_descriptor(&self) -> TypeDescriptor {
        Self::descriptor()
    }

    fn payload(&self) -> Option<ResourcePayload<'_>> {
        if self.data.is_null() {
            return None;
        }
        Some(ResourcePayload::Tracked {
            fields: TrackedResourceData {
                resource_type: self.resource_type.clone(),
                location: self.location.clone(),
                id: self.id.to_string(),
                name: self.name.clone(),
            },
            raw: &self.data,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_resource_group_keeps_payload() {
        let body = json!({
            "id": "/subscriptions/00000000-0000-0000-0000-000000000001/resourceGroups/rg1",
            "name": "rg1",
            "type": "Microsoft.Resources/resourceGroups",
            "location": "westeurope",
            "tags": {"env": "prod"},
            "properties": {"provisioningState": "Succeeded"}
        });
        let group: ResourceGroupResource = serde_json::from_value(body.clone()).unwrap();
        assert_eq!(group.name, "rg1");
        assert_eq!(group.id.resource_group(), Some("rg1"));
        assert_eq!(group.data(), &body);
    }

    #[test]
    fn test_resource_group_data_skips_empty_fields() {
        let data = ResourceGroupData::new("eastus");
        assert_eq!(serde_json::to_value(&data).unwrap(), json!({"location": "eastus"}));
    }

    #[test]
    fn test_subscription_state() {
        let record: SubscriptionRecord = serde_json::from_value(json!({
            "id": "/subscriptions/00000000-0000-0000-0000-000000000001",
            "subscriptionId": "00000000-0000-0000-0000-000000000001",
            "displayName": "Production",
            "tenantId": "tenant",
            "state": "Enabled"
        }))
        .unwrap();
        assert!(record.is_enabled());
    }
}
