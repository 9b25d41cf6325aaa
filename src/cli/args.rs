use std::path::PathBuf;

use clap::Args;
use reqwest::Url;

use crate::auth::sources::default_authority_host;
use crate::auth::tenant::validate_tenant_id;
use crate::auth::{CredentialSourceConfig, ManagedIdentitySelector, SharedCredentialOptions};
use crate::context::env::resolve;
use crate::context::{EnvDefaults, SubscriptionReference, require_resource_group};
use crate::error::{ContextError, ContextResult};
use crate::render::{RenderMode, RenderOptions};

/// Options controlling which credential sources are tried and how
#[derive(Args, Debug, Clone)]
pub struct CredentialArgs {
    /// Credential sources to try, in order (cli, dev, ps, env, mi, browser, vs, shared, devicecode, wid)
    #[arg(
        long,
        global = true,
        value_delimiter = ',',
        default_values = ["cli", "devicecode", "env"]
    )]
    pub allowed_credential_types: Vec<String>,

    /// Authority host for token endpoint flows [env: AZURE_AUTHORITY_HOST]
    #[arg(long, global = true)]
    pub authority_host: Option<String>,

    /// Tenant to authenticate against by default [env: AZURE_TENANT_ID]
    #[arg(long, global = true)]
    pub default_tenant_id: Option<String>,

    /// Further tenants tokens may be requested for; "*" allows any [env: AZURE_ADDITIONALLY_ALLOWED_TENANTS]
    #[arg(long, global = true, value_delimiter = ',')]
    pub additionally_allowed_tenants: Vec<String>,

    /// Client id for user and workload identity flows [env: AZURE_CLIENT_ID]
    #[arg(long, global = true)]
    pub authentication_client_id: Option<String>,

    /// Client id of a user-assigned managed identity [env: AZURE_CLIENT_ID]
    #[arg(long, global = true)]
    pub managed_identity_client_id: Option<String>,

    /// Resource id of a user-assigned managed identity; wins over the client id
    #[arg(long, global = true)]
    pub managed_identity_resource_id: Option<String>,

    /// Account to pick from the shared token cache [env: AZURE_USERNAME]
    #[arg(long, global = true)]
    pub shared_token_cache_username: Option<String>,

    /// Federated token file for workload identity [env: AZURE_FEDERATED_TOKEN_FILE]
    #[arg(long, global = true)]
    pub token_file_path: Option<PathBuf>,
}

impl CredentialArgs {
    /// Apply environment defaults and validate into a chain configuration
    pub fn to_config(&self, env: &EnvDefaults) -> ContextResult<CredentialSourceConfig> {
        let authority_host = match resolve(self.authority_host.as_deref(), env.authority_host.as_deref()) {
            Some(host) => Url::parse(&host).map_err(|e| {
                ContextError::Configuration(format!("Invalid authority host '{host}': {e}"))
            })?,
            None => default_authority_host(),
        };

        let tenant_id = resolve(self.default_tenant_id.as_deref(), env.tenant_id.as_deref());
        if let Some(tenant) = &tenant_id {
            validate_tenant_id(tenant).map_err(|e| ContextError::Configuration(e.to_string()))?;
        }

        let additionally_allowed_tenants = if self.additionally_allowed_tenants.is_empty() {
            env.additionally_allowed_tenants.clone()
        } else {
            self.additionally_allowed_tenants
                .iter()
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty())
                .collect()
        };

        let managed_identity = ManagedIdentitySelector::resolve(
            resolve(self.managed_identity_client_id.as_deref(), env.client_id.as_deref()).as_deref(),
            self.managed_identity_resource_id.as_deref(),
        )?;

        let options = SharedCredentialOptions {
            authority_host,
            tenant_id,
            additionally_allowed_tenants,
            client_id: resolve(self.authentication_client_id.as_deref(), env.client_id.as_deref()),
            managed_identity,
            shared_token_cache_username: resolve(
                self.shared_token_cache_username.as_deref(),
                env.username.as_deref(),
            ),
            token_file_path: self
                .token_file_path
                .clone()
                .or_else(|| env.federated_token_file.clone()),
            environment: env.service_principal.clone(),
        };

        CredentialSourceConfig::from_names(&self.allowed_credential_types, options)
    }
}

#[derive(Args, Debug, Clone, Default)]
pub struct SubscriptionArgs {
    /// Subscription id, resource id or display name [env: AZURE_SUBSCRIPTION_ID]
    #[arg(
        short = 's',
        long = "subscription",
        visible_alias = "sub",
        alias = "subscription-id"
    )]
    pub subscription: Option<String>,
}

impl SubscriptionArgs {
    pub fn reference(&self, env: &EnvDefaults) -> SubscriptionReference {
        SubscriptionReference::from_input(self.subscription.as_deref(), env)
    }
}

#[derive(Args, Debug, Clone, Default)]
pub struct ResourceGroupArgs {
    /// Resource group name [env: AZURE_RESOURCE_GROUP]
    #[arg(short = 'g', long = "resource-group-name", visible_alias = "grp")]
    pub resource_group: Option<String>,
}

impl ResourceGroupArgs {
    pub fn require(&self, env: &EnvDefaults) -> ContextResult<String> {
        require_resource_group(self.resource_group.as_deref(), env)
    }
}

#[derive(Args, Debug, Clone, Default)]
pub struct RenderArgs {
    /// Output format
    #[arg(short, long, value_enum, default_value = "table")]
    pub format: RenderMode,

    /// Indent JSON output
    #[arg(short, long)]
    pub indent: bool,
}

impl RenderArgs {
    pub fn options(&self) -> RenderOptions {
        RenderOptions {
            indented: self.indent,
        }
    }
}
