use std::path::PathBuf;

use crate::auth::ServicePrincipalEnv;

pub const AZURE_SUBSCRIPTION_ID: &str = "AZURE_SUBSCRIPTION_ID";
pub const AZURE_RESOURCE_GROUP: &str = "AZURE_RESOURCE_GROUP";
pub const AZURE_TENANT_ID: &str = "AZURE_TENANT_ID";
pub const AZURE_CLIENT_ID: &str = "AZURE_CLIENT_ID";
pub const AZURE_AUTHORITY_HOST: &str = "AZURE_AUTHORITY_HOST";
pub const AZURE_ADDITIONALLY_ALLOWED_TENANTS: &str = "AZURE_ADDITIONALLY_ALLOWED_TENANTS";
pub const AZURE_USERNAME: &str = "AZURE_USERNAME";
pub const AZURE_FEDERATED_TOKEN_FILE: &str = "AZURE_FEDERATED_TOKEN_FILE";

#[derive(Debug, Clone, Default)]
pub struct EnvDefaults {
    pub subscription_id: Option<String>,
    pub resource_group: Option<String>,
    pub tenant_id: Option<String>,
    pub client_id: Option<String>,
    pub authority_host: Option<String>,
    pub additionally_allowed_tenants: Vec<String>,
    pub username: Option<String>,
    pub federated_token_file: Option<PathBuf>,
    pub service_principal: ServicePrincipalEnv,
}

impl EnvDefaults {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| non_blank(lookup(name).as_deref());
        Self {
            subscription_id: get(AZURE_SUBSCRIPTION_ID),
            resource_group: get(AZURE_RESOURCE_GROUP),
            tenant_id: get(AZURE_TENANT_ID),
            client_id: get(AZURE_CLIENT_ID),
            authority_host: get(AZURE_AUTHORITY_HOST),
            additionally_allowed_tenants: get(AZURE_ADDITIONALLY_ALLOWED_TENANTS)
                .map(|v| split_list(&v))
                .unwrap_or_default(),
            username: get(AZURE_USERNAME),
            federated_token_file: get(AZURE_FEDERATED_TOKEN_FILE).map(PathBuf::from),
            service_principal: ServicePrincipalEnv::from_lookup(&lookup),
        }
    }
}

/// Explicit input wins over the environment; blank values count as absent
pub fn resolve(explicit: Option<&str>, env: Option<&str>) -> Option<String> {
    non_blank(explicit).or_else(|| non_blank(env))
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// `a;b;c` as used by `AZURE_ADDITIONALLY_ALLOWED_TENANTS`
pub fn split_list(value: &str) -> Vec<String> {
    value
        .split(';')
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .collect()
}
