use super::env::{EnvDefaults, resolve};
use crate::error::{ContextError, ContextResult};

/// `--resource-group-name`, falling back to `AZURE_RESOURCE_GROUP`; absent is only an error here
pub fn require_resource_group(explicit: Option<&str>, env: &EnvDefaults) -> ContextResult<String> {
    resolve(explicit, env.resource_group.as_deref()).ok_or(ContextError::MissingValue {
        name: "--resource-group-name",
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_name_wins() {
        let env = EnvDefaults {
            resource_group: Some("from-env".to_string()),
            ..Default::default()
        };
        assert_eq!(require_resource_group(Some("rg"), &env).unwrap(), "rg");
        assert_eq!(require_resource_group(None, &env).unwrap(), "from-env");
    }

    #[test]
    fn test_missing_everywhere() {
        let err = require_resource_group(None, &EnvDefaults::default()).unwrap_err();
        assert!(matches!(err, ContextError::MissingValue { name: "--resource-group-name" }));
        assert_eq!(err.exit_code(), 2);
    }
}
