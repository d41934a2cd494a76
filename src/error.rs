//! Error Types
//!
//! Raw failures as surfaced by wallet providers and contract calls, and the
//! classified errors every operation reports to the user.

use std::fmt;

use crate::classifier::PROVIDER_DISCONNECTED_CODE;
use crate::config::ConfigError;

/// A failure reported by a wallet provider or a contract call, before
/// classification.
///
/// Providers fill in whatever they have; any combination of fields may be
/// present at once.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawFailure {
    /// EIP-1193 / JSON-RPC error code
    pub code: Option<i64>,
    /// Message of a nested provider-level error
    pub provider_message: Option<String>,
    /// Contract revert reason, when the provider already decoded it
    pub reason: Option<String>,
    /// Raw revert payload
    pub revert_data: Option<Vec<u8>>,
    /// Generic top-level message
    pub message: Option<String>,
}

impl RawFailure {
    /// Failure carrying only a generic message
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            ..Default::default()
        }
    }

    /// Failure carrying only a revert reason
    pub fn reason(reason: impl Into<String>) -> Self {
        Self {
            reason: Some(reason.into()),
            ..Default::default()
        }
    }

    /// Failure carrying only raw revert data
    pub fn revert(data: impl Into<Vec<u8>>) -> Self {
        Self {
            revert_data: Some(data.into()),
            ..Default::default()
        }
    }

    pub fn with_code(mut self, code: i64) -> Self {
        self.code = Some(code);
        self
    }

}

impl fmt::Display for RawFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = self
            .provider_message
            .as_deref()
            .or(self.reason.as_deref())
            .or(self.message.as_deref())
            .unwrap_or("provider failure");
        match self.code {
            Some(code) => write!(f, "[{}] {}", code, text),
            None => write!(f, "{}", text),
        }
    }
}

impl From<reqwest::Error> for RawFailure {
    fn from(err: reqwest::Error) -> Self {
        if err.is_connect() {
            RawFailure::message(format!("Connection failed: {}", err))
                .with_code(PROVIDER_DISCONNECTED_CODE)
        } else {
            RawFailure::message(err.to_string())
        }
    }
}

impl From<serde_json::Error> for RawFailure {
    fn from(err: serde_json::Error) -> Self {
        RawFailure::message(format!("Malformed provider response: {}", err))
    }
}

/// User-facing error categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Caller already owns an identity
    AlreadyRegistered,
    /// Caller has no identity yet
    NotRegistered,
    /// The user declined a wallet prompt
    UserRejected,
    /// The wallet is on a network other than the target
    WrongNetwork,
    /// No wallet provider is present
    ProviderUnavailable,
    /// Anything else
    Unknown,
}

impl ErrorCategory {
    /// Expected domain outcomes rather than systemic failures
    pub fn is_domain_outcome(&self) -> bool {
        matches!(
            self,
            ErrorCategory::AlreadyRegistered | ErrorCategory::NotRegistered
        )
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCategory::AlreadyRegistered => write!(f, "already-registered"),
            ErrorCategory::NotRegistered => write!(f, "not-registered"),
            ErrorCategory::UserRejected => write!(f, "user-rejected"),
            ErrorCategory::WrongNetwork => write!(f, "wrong-network"),
            ErrorCategory::ProviderUnavailable => write!(f, "provider-unavailable"),
            ErrorCategory::Unknown => write!(f, "unknown"),
        }
    }
}

/// A failure mapped to its category, with the best available message
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct ClassifiedError {
    pub category: ErrorCategory,
    pub message: String,
}

impl ClassifiedError {
    pub fn new(category: ErrorCategory, message: impl Into<String>) -> Self {
        Self {
            category,
            message: message.into(),
        }
    }

    pub fn provider_unavailable() -> Self {
        Self::new(
            ErrorCategory::ProviderUnavailable,
            "No wallet provider is available. Install or enable a wallet to use this client.",
        )
    }

    pub fn wrong_network(target: u64, current: impl fmt::Display) -> Self {
        Self::new(
            ErrorCategory::WrongNetwork,
            format!(
                "Please switch your wallet to the target network (ID: {}). Current network ID: {}",
                target, current
            ),
        )
    }
}

/// Errors returned by session and identity operations
#[derive(Debug, Clone, thiserror::Error)]
pub enum IdentityError {
    #[error("Please connect your wallet first.")]
    NotConnected,

    #[error("{0}")]
    InvalidInput(String),

    #[error("{}", render_contract_error(.context, .error))]
    Contract {
        context: &'static str,
        error: ClassifiedError,
    },

    #[error(transparent)]
    Session(#[from] ClassifiedError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl IdentityError {
    /// Category of the underlying failure, if it was classified
    pub fn category(&self) -> Option<ErrorCategory> {
        match self {
            IdentityError::Contract { error, .. } | IdentityError::Session(error) => {
                Some(error.category)
            }
            _ => None,
        }
    }
}

// Domain outcomes carry a complete sentence already.
fn render_contract_error(context: &str, error: &ClassifiedError) -> String {
    if error.category.is_domain_outcome() {
        format!("Error: {}", error.message)
    } else {
        format!("{}: {}", context, error.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contract_error_prefixes_context() {
        let err = IdentityError::Contract {
            context: "Registration failed",
            error: ClassifiedError::new(ErrorCategory::Unknown, "out of gas"),
        };
        assert_eq!(err.to_string(), "Registration failed: out of gas");
        assert_eq!(err.category(), Some(ErrorCategory::Unknown));
    }

    #[test]
    fn test_domain_outcome_drops_context() {
        let err = IdentityError::Contract {
            context: "Update failed",
            error: ClassifiedError::new(
                ErrorCategory::NotRegistered,
                "This wallet address has not registered an identity yet.",
            ),
        };
        assert_eq!(
            err.to_string(),
            "Error: This wallet address has not registered an identity yet."
        );
    }

    #[test]
    fn test_raw_failure_display_prefers_provider_message() {
        let failure = RawFailure {
            provider_message: Some("execution reverted".to_string()),
            ..RawFailure::message("Internal JSON-RPC error.").with_code(-32603)
        };
        assert_eq!(failure.to_string(), "[-32603] execution reverted");
    }
}
