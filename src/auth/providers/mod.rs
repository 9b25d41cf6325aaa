mod client_credentials;
mod developer_tools;
mod managed_identity;
mod shared_cache;
mod user_flows;

pub use client_credentials::{EnvironmentCredential, WorkloadIdentityCredential};
pub use developer_tools::{
    AzureCliCredential, AzureDeveloperCliCredential, AzurePowerShellCredential,
    VisualStudioCredential,
};
pub use managed_identity::ManagedIdentityCredential;
pub use shared_cache::SharedTokenCacheCredential;
pub use user_flows::{DeviceCodeCredential, InteractiveBrowserCredential};

/// Azure CLI's public client, used by user flows when no client id is configured
pub const DEFAULT_PUBLIC_CLIENT_ID: &str = "04b07795-8ddb-461a-bbee-02f9e1bf7b46";

/// Tenant used by user flows when none is configured
pub const DEFAULT_USER_TENANT: &str = "organizations";
