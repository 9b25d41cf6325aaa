//! Error taxonomy for context resolution and rendering
//!
//! Every failure in the core surfaces as a [`ContextError`]. The CLI layer turns it into
//! a message on stderr and a process exit code via [`ContextError::exit_code`].

use std::fmt;

use crate::auth::CredentialSourceKind;

/// A single provider's failure inside a credential chain attempt
#[derive(Debug, Clone)]
pub struct ProviderFailure {
    pub source: CredentialSourceKind,
    pub reason: String,
}

impl fmt::Display for ProviderFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}): {}", self.source.display_name(), self.source, self.reason)
    }
}

/// Every provider in the chain failed; keeps each reason in attempt order
#[derive(Debug, Clone, Default)]
pub struct AggregateAuthFailure {
    pub failures: Vec<ProviderFailure>,
}

impl fmt::Display for AggregateAuthFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Failed to acquire a token from any of the {} configured credential source(s):",
            self.failures.len()
        )?;
        for failure in &self.failures {
            write!(f, "\n  - {failure}")?;
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ContextError {
    /// Bad or unknown credential source, conflicting or malformed options
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("{0}")]
    Authentication(AggregateAuthFailure),

    #[error("Invalid identifier format: {0}")]
    InvalidIdentifierFormat(String),

    #[error("{0}")]
    NotFound(String),

    /// A value the command needs was given neither on the command line nor in the environment
    #[error("{name} is required.")]
    MissingValue { name: &'static str },

    #[error("This command requires confirmation before executing. Use --yes to confirm.")]
    ConfirmationRequired,

    #[error("Operation cancelled by user.")]
    OperationCancelled,

    #[error("No {mode} renderer available for type {type_name}")]
    UnsupportedType {
        mode: &'static str,
        type_name: String,
    },

    /// The invocation-wide cancellation signal fired
    #[error("Operation was cancelled")]
    Cancelled,

    #[error(transparent)]
    Remote(#[from] anyhow::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type ContextResult<T> = Result<T, ContextError>;

impl ContextError {
    pub fn exit_code(&self) -> i32 {
        match self {
            ContextError::Configuration(_) | ContextError::MissingValue { .. } => 2,
            ContextError::Authentication(_) => 3,
            ContextError::InvalidIdentifierFormat(_) => 4,
            ContextError::NotFound(_) => 5,
            ContextError::ConfirmationRequired => 6,
            ContextError::OperationCancelled => 7,
            ContextError::UnsupportedType { .. } => 8,
            ContextError::Cancelled => 130,
            ContextError::Remote(_) | ContextError::Io(_) => 1,
        }
    }

    pub(crate) fn unsupported(mode: &'static str, type_name: impl Into<String>) -> Self {
        ContextError::UnsupportedType {
            mode,
            type_name: type_name.into(),
        }
    }
}
