use std::fmt;
use std::str::FromStr;

use crate::error::{ContextError, ContextResult};

/// A region in its programmatic form (`eastus`), whichever way it was written
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Location(String);

impl Location {
    pub fn name(&self) -> &str {
        &self.0
    }
}

impl FromStr for Location {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name: String = s
            .chars()
            .filter(|c| !c.is_whitespace())
            .flat_map(char::to_lowercase)
            .collect();
        if name.is_empty() {
            return Err("location must not be empty".to_string());
        }
        Ok(Location(name))
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<Location> for String {
    fn from(location: Location) -> Self {
        location.0
    }
}

pub fn require_location(location: Option<&Location>) -> ContextResult<Location> {
    location
        .cloned()
        .ok_or(ContextError::MissingValue { name: "--location" })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_names_normalize() {
        assert_eq!("East US".parse::<Location>().unwrap().name(), "eastus");
        assert_eq!("westeurope".parse::<Location>().unwrap().name(), "westeurope");
        assert_eq!("  North Europe ".parse::<Location>().unwrap().name(), "northeurope");
        assert!("   ".parse::<Location>().is_err());
    }

    #[test]
    fn test_require_location() {
        let err = require_location(None).unwrap_err();
        assert_eq!(err.to_string(), "--location is required.");

        let location: Location = "eastus".parse().unwrap();
        assert_eq!(require_location(Some(&location)).unwrap(), location);
    }
}
