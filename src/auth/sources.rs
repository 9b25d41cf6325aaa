//! Credential source configuration
//!
//! The set of credential sources is closed; each kind maps to exactly one provider.
//! Shared options are resolved once (explicit input, then environment) and handed to the
//! chain builder read-only.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use clap::ValueEnum;
use log::warn;
use reqwest::Url;

use crate::api::ResourceIdentifier;
use crate::error::{ContextError, ContextResult};

pub const DEFAULT_AUTHORITY_HOST: &str = "https://login.microsoftonline.com/";

/// Sources tried when the user does not pick any
pub const DEFAULT_SOURCES: &[CredentialSourceKind] = &[
    CredentialSourceKind::Cli,
    CredentialSourceKind::DeviceCode,
    CredentialSourceKind::Environment,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum)]
pub enum CredentialSourceKind {
    /// Azure CLI session (`az login`)
    #[value(name = "cli")]
    Cli,
    /// Azure Developer CLI session (`azd auth login`)
    #[value(name = "dev")]
    DeveloperCli,
    /// Azure PowerShell session (`Connect-AzAccount`)
    #[value(name = "ps")]
    PowerShell,
    /// Service principal secret from AZURE_* environment variables
    #[value(name = "env")]
    Environment,
    /// Managed identity of the host
    #[value(name = "mi")]
    ManagedIdentity,
    /// Interactive browser sign-in
    #[value(name = "browser")]
    InteractiveBrowser,
    /// Visual Studio account
    #[value(name = "vs")]
    VisualStudio,
    /// Shared developer token cache
    #[value(name = "shared")]
    SharedTokenCache,
    /// Device code sign-in
    #[value(name = "devicecode")]
    DeviceCode,
    /// Workload identity federation (token file)
    #[value(name = "wid")]
    WorkloadIdentity,
}

impl CredentialSourceKind {
    pub const ALL: [CredentialSourceKind; 10] = [
        CredentialSourceKind::Cli,
        CredentialSourceKind::DeveloperCli,
        CredentialSourceKind::PowerShell,
        CredentialSourceKind::Environment,
        CredentialSourceKind::ManagedIdentity,
        CredentialSourceKind::InteractiveBrowser,
        CredentialSourceKind::VisualStudio,
        CredentialSourceKind::SharedTokenCache,
        CredentialSourceKind::DeviceCode,
        CredentialSourceKind::WorkloadIdentity,
    ];

    /// The name accepted on the command line
    pub fn key(self) -> &'static str {
        match self {
            CredentialSourceKind::Cli => "cli",
            CredentialSourceKind::DeveloperCli => "dev",
            CredentialSourceKind::PowerShell => "ps",
            CredentialSourceKind::Environment => "env",
            CredentialSourceKind::ManagedIdentity => "mi",
            CredentialSourceKind::InteractiveBrowser => "browser",
            CredentialSourceKind::VisualStudio => "vs",
            CredentialSourceKind::SharedTokenCache => "shared",
            CredentialSourceKind::DeviceCode => "devicecode",
            CredentialSourceKind::WorkloadIdentity => "wid",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            CredentialSourceKind::Cli => "AzureCliCredential",
            CredentialSourceKind::DeveloperCli => "AzureDeveloperCliCredential",
            CredentialSourceKind::PowerShell => "AzurePowerShellCredential",
            CredentialSourceKind::Environment => "EnvironmentCredential",
            CredentialSourceKind::ManagedIdentity => "ManagedIdentityCredential",
            CredentialSourceKind::InteractiveBrowser => "InteractiveBrowserCredential",
            CredentialSourceKind::VisualStudio => "VisualStudioCredential",
            CredentialSourceKind::SharedTokenCache => "SharedTokenCacheCredential",
            CredentialSourceKind::DeviceCode => "DeviceCodeCredential",
            CredentialSourceKind::WorkloadIdentity => "WorkloadIdentityCredential",
        }
    }
}

impl fmt::Display for CredentialSourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for CredentialSourceKind {
    type Err = ContextError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|kind| kind.key() == wanted)
            .ok_or_else(|| ContextError::Configuration(format!("Unknown credential type: {s}")))
    }
}

/// Which managed identity to request tokens for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManagedIdentitySelector {
    SystemAssigned,
    UserAssignedClientId(String),
    UserAssignedResourceId(ResourceIdentifier),
}

impl ManagedIdentitySelector {
    /// Resource id wins over client id; neither means system-assigned
    pub fn resolve(client_id: Option<&str>, resource_id: Option<&str>) -> ContextResult<Self> {
        let client_id = client_id.map(str::trim).filter(|s| !s.is_empty());
        let resource_id = resource_id.map(str::trim).filter(|s| !s.is_empty());

        match (client_id, resource_id) {
            (client, Some(resource)) => {
                if client.is_some() {
                    warn!(
                        "Both a managed identity client id and resource id were given; using the resource id"
                    );
                }
                let id = ResourceIdentifier::parse(resource).map_err(|e| {
                    ContextError::Configuration(format!(
                        "Invalid managed identity resource id '{resource}': {e}"
                    ))
                })?;
                Ok(ManagedIdentitySelector::UserAssignedResourceId(id))
            }
            (Some(client), None) => Ok(ManagedIdentitySelector::UserAssignedClientId(client.to_string())),
            (None, None) => Ok(ManagedIdentitySelector::SystemAssigned),
        }
    }
}

/// Service principal material taken from `AZURE_*` variables
#[derive(Clone, Default)]
pub struct ServicePrincipalEnv {
    pub tenant_id: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub client_certificate_path: Option<PathBuf>,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl ServicePrincipalEnv {
    /// Read the `AZURE_*` service principal variables through `lookup`
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        Self {
            tenant_id: get("AZURE_TENANT_ID"),
            client_id: get("AZURE_CLIENT_ID"),
            client_secret: get("AZURE_CLIENT_SECRET"),
            client_certificate_path: get("AZURE_CLIENT_CERTIFICATE_PATH").map(PathBuf::from),
            username: get("AZURE_USERNAME"),
            password: get("AZURE_PASSWORD"),
        }
    }
}

impl fmt::Debug for ServicePrincipalEnv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServicePrincipalEnv")
            .field("tenant_id", &self.tenant_id)
            .field("client_id", &self.client_id)
            .field("client_secret", &self.client_secret.as_ref().map(|_| "<redacted>"))
            .field("client_certificate_path", &self.client_certificate_path)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Options shared by every credential source; each provider takes only what it understands
#[derive(Debug, Clone)]
pub struct SharedCredentialOptions {
    pub authority_host: Url,
    pub tenant_id: Option<String>,
    pub additionally_allowed_tenants: Vec<String>,
    pub client_id: Option<String>,
    pub managed_identity: ManagedIdentitySelector,
    pub shared_token_cache_username: Option<String>,
    pub token_file_path: Option<PathBuf>,
    pub environment: ServicePrincipalEnv,
}

impl Default for SharedCredentialOptions {
    fn default() -> Self {
        Self {
            authority_host: default_authority_host(),
            tenant_id: None,
            additionally_allowed_tenants: Vec::new(),
            client_id: None,
            managed_identity: ManagedIdentitySelector::SystemAssigned,
            shared_token_cache_username: None,
            token_file_path: None,
            environment: ServicePrincipalEnv::default(),
        }
    }
}

pub fn default_authority_host() -> Url {
    Url::parse(DEFAULT_AUTHORITY_HOST).expect("default authority host is a valid URL")
}

/// Ordered credential sources plus the options they share
#[derive(Debug, Clone)]
pub struct CredentialSourceConfig {
    pub sources: Vec<CredentialSourceKind>,
    pub options: SharedCredentialOptions,
}

impl CredentialSourceConfig {
    pub fn new(sources: Vec<CredentialSourceKind>, options: SharedCredentialOptions) -> Self {
        Self { sources, options }
    }

    /// Build from source names as typed by a user; unknown names are rejected here
    pub fn from_names<S: AsRef<str>>(
        names: &[S],
        options: SharedCredentialOptions,
    ) -> ContextResult<Self> {
        let sources = names
            .iter()
            .map(|name| name.as_ref().parse())
            .collect::<ContextResult<Vec<_>>>()?;
        Ok(Self { sources, options })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_names_are_case_insensitive() {
        assert_eq!("CLI".parse::<CredentialSourceKind>().unwrap(), CredentialSourceKind::Cli);
        assert_eq!(
            "DeviceCode".parse::<CredentialSourceKind>().unwrap(),
            CredentialSourceKind::DeviceCode
        );
    }

    #[test]
    fn test_unknown_source_is_configuration_error() {
        let err = "kerberos".parse::<CredentialSourceKind>().unwrap_err();
        assert!(matches!(err, ContextError::Configuration(ref m) if m.contains("kerberos")));
    }

    #[test]
    fn test_every_kind_round_trips_through_its_key() {
        for kind in CredentialSourceKind::ALL {
            assert_eq!(kind.key().parse::<CredentialSourceKind>().unwrap(), kind);
        }
    }

    #[test]
    fn test_managed_identity_resource_id_wins() {
        let resource = "/subscriptions/00000000-0000-0000-0000-000000000001/resourceGroups/rg/providers/Microsoft.ManagedIdentity/userAssignedIdentities/id1";
        let selector = ManagedIdentitySelector::resolve(Some("client-1"), Some(resource)).unwrap();
        match selector {
            ManagedIdentitySelector::UserAssignedResourceId(id) => {
                assert_eq!(id.name(), Some("id1"));
            }
            other => panic!("unexpected selector {other:?}"),
        }
    }

    #[test]
    fn test_managed_identity_defaults() {
        assert_eq!(
            ManagedIdentitySelector::resolve(None, None).unwrap(),
            ManagedIdentitySelector::SystemAssigned
        );
        assert_eq!(
            ManagedIdentitySelector::resolve(Some("abc"), None).unwrap(),
            ManagedIdentitySelector::UserAssignedClientId("abc".to_string())
        );
    }

    #[test]
    fn test_service_principal_env_ignores_blank_values() {
        let env = ServicePrincipalEnv::from_lookup(|name| match name {
            "AZURE_TENANT_ID" => Some("tenant".to_string()),
            "AZURE_CLIENT_SECRET" => Some("   ".to_string()),
            _ => None,
        });
        assert_eq!(env.tenant_id.as_deref(), Some("tenant"));
        assert!(env.client_secret.is_none());
    }

    #[test]
    fn test_malformed_managed_identity_resource_id() {
        let err = ManagedIdentitySelector::resolve(None, Some("not-a-resource-id")).unwrap_err();
        assert!(matches!(err, ContextError::Configuration(_)));
    }
}
