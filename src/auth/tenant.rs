use anyhow::{Result, bail};

pub const ALL_TENANTS: &str = "*";

/// Pick the tenant a provider should authenticate against for a request
///
/// A request for another tenant is only honoured when no default tenant is pinned,
/// the tenant is listed in `additionally_allowed`, or the list contains `*`.
pub fn resolve_tenant(
    default_tenant: Option<&str>,
    requested: Option<&str>,
    additionally_allowed: &[String],
) -> Result<Option<String>> {
    let Some(requested) = requested.filter(|t| !t.is_empty()) else {
        return Ok(default_tenant.map(str::to_string));
    };

    let Some(default_tenant) = default_tenant else {
        return Ok(Some(requested.to_string()));
    };

    if requested.eq_ignore_ascii_case(default_tenant)
        || additionally_allowed
            .iter()
            .any(|t| t == ALL_TENANTS || t.eq_ignore_ascii_case(requested))
    {
        return Ok(Some(requested.to_string()));
    }

    bail!(
        "The current credential is not configured to acquire tokens for tenant {requested}. \
         Add it to --additionally-allowed-tenants or use \"*\" to allow any tenant."
    )
}

/// Tenant identifiers must be usable as a URL path segment
pub fn validate_tenant_id(tenant: &str) -> Result<()> {
    if tenant.is_empty()
        || !tenant
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.')
    {
        bail!("Invalid tenant id '{tenant}'");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_request_uses_default() {
        assert_eq!(
            resolve_tenant(Some("home"), None, &[]).unwrap(),
            Some("home".to_string())
        );
        assert_eq!(resolve_tenant(None, None, &[]).unwrap(), None);
    }

    #[test]
    fn test_unpinned_credential_accepts_any_tenant() {
        assert_eq!(
            resolve_tenant(None, Some("other"), &[]).unwrap(),
            Some("other".to_string())
        );
    }

    #[test]
    fn test_pinned_credential_rejects_unlisted_tenant() {
        let err = resolve_tenant(Some("home"), Some("other"), &["third".to_string()]).unwrap_err();
        assert!(err.to_string().contains("other"));
    }

    #[test]
    fn test_additional_and_wildcard_tenants() {
        assert!(resolve_tenant(Some("home"), Some("other"), &["OTHER".to_string()]).is_ok());
        assert!(resolve_tenant(Some("home"), Some("other"), &["*".to_string()]).is_ok());
    }

    #[test]
    fn test_tenant_validation() {
        assert!(validate_tenant_id("contoso.onmicrosoft.com").is_ok());
        assert!(validate_tenant_id("72f988bf-86f1-41af-91ab-2d7cd011db47").is_ok());
        assert!(validate_tenant_id("bad/tenant").is_err());
    }
}
