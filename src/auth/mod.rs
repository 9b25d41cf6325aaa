//! Token acquisition through an ordered chain of credential sources

pub mod chain;
pub mod providers;
pub mod sources;
pub mod tenant;
pub mod token_endpoint;

pub use chain::{AccessToken, CredentialChain, TokenCredential, TokenRequestContext, build_chain};
pub use sources::{
    CredentialSourceConfig, CredentialSourceKind, DEFAULT_SOURCES, ManagedIdentitySelector,
    ServicePrincipalEnv, SharedCredentialOptions,
};

/// Scope for Azure Resource Manager calls
pub const MANAGEMENT_SCOPE: &str = "https://management.azure.com/.default";
