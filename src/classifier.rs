//! Error Classifier
//!
//! Turns a [`RawFailure`] into a [`ClassifiedError`] in two stages: pick the
//! most specific raw message the failure carries, then match it against the
//! registry's known revert reasons.

use ethers_core::abi::{self, ParamType, Token};

use crate::error::{ClassifiedError, ErrorCategory, RawFailure};

/// Selector of `Error(string)`, used by Solidity `require`/`revert` reasons
pub const ERROR_STRING_SELECTOR: [u8; 4] = [0x08, 0xc3, 0x79, 0xa0];

/// EIP-1193 "User Rejected Request"
pub const USER_REJECTED_CODE: i64 = 4001;

/// EIP-1193 "Disconnected": the provider cannot reach any chain
pub const PROVIDER_DISCONNECTED_CODE: i64 = 4900;

pub const ALREADY_REGISTERED_MESSAGE: &str =
    "This wallet address has already registered an identity.";
pub const NOT_REGISTERED_MESSAGE: &str = "This wallet address has not registered an identity yet.";

const UNDECODABLE_REVERT_MESSAGE: &str = "execution reverted with an undecodable reason";
const CUSTOM_REVERT_PREFIX: &str = "execution reverted with custom error data: ";
const UNKNOWN_ERROR_MESSAGE: &str = "unknown error";

/// Maps raw provider/contract failures to user-facing categories
pub trait ErrorClassifier: Send + Sync {
    fn classify(&self, failure: &RawFailure) -> ClassifiedError;
}

/// Classifier matching fixed substrings of the registry's revert reasons
#[derive(Debug, Clone, Copy, Default)]
pub struct SubstringClassifier;

impl ErrorClassifier for SubstringClassifier {
    fn classify(&self, failure: &RawFailure) -> ClassifiedError {
        classify(failure)
    }
}

/// Classify a failure with the default rules
pub fn classify(failure: &RawFailure) -> ClassifiedError {
    let raw = extract_raw_message(failure);
    let lowered = raw.to_lowercase();

    if lowered.contains("already registered") {
        ClassifiedError::new(ErrorCategory::AlreadyRegistered, ALREADY_REGISTERED_MESSAGE)
    } else if lowered.contains("not registered") {
        ClassifiedError::new(ErrorCategory::NotRegistered, NOT_REGISTERED_MESSAGE)
    } else if lowered.contains("user rejected") || failure.code == Some(USER_REJECTED_CODE) {
        ClassifiedError::new(ErrorCategory::UserRejected, raw)
    } else if failure.code == Some(PROVIDER_DISCONNECTED_CODE) {
        ClassifiedError::new(ErrorCategory::ProviderUnavailable, raw)
    } else {
        ClassifiedError::new(ErrorCategory::Unknown, raw)
    }
}

/// Best raw message a failure carries. Order matters: failures often fill
/// several fields at once.
pub fn extract_raw_message(failure: &RawFailure) -> String {
    if let Some(message) = non_empty(&failure.provider_message) {
        return message.to_string();
    }
    if let Some(reason) = non_empty(&failure.reason) {
        return reason.to_string();
    }
    if let Some(data) = &failure.revert_data {
        return match decode_revert(data) {
            RevertReason::Message(message) => message,
            RevertReason::Undecodable => UNDECODABLE_REVERT_MESSAGE.to_string(),
            RevertReason::Custom(data) => {
                format!("{}0x{}", CUSTOM_REVERT_PREFIX, hex::encode(data))
            }
        };
    }
    non_empty(&failure.message)
        .unwrap_or(UNKNOWN_ERROR_MESSAGE)
        .to_string()
}

fn non_empty(field: &Option<String>) -> Option<&str> {
    field.as_deref().filter(|s| !s.is_empty())
}

/// Interpretation of a revert payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RevertReason<'a> {
    /// `Error(string)` with a valid UTF-8 message
    Message(String),
    /// `Error(string)` selector, but the payload did not decode
    Undecodable,
    /// Anything else (custom errors, panics, empty reverts)
    Custom(&'a [u8]),
}

pub fn decode_revert(data: &[u8]) -> RevertReason<'_> {
    match data.strip_prefix(&ERROR_STRING_SELECTOR[..]) {
        Some(payload) => match abi::decode(&[ParamType::Bytes], payload) {
            Ok(tokens) => match tokens.into_iter().next() {
                Some(Token::Bytes(bytes)) => String::from_utf8(bytes)
                    .map(RevertReason::Message)
                    .unwrap_or(RevertReason::Undecodable),
                _ => RevertReason::Undecodable,
            },
            Err(_) => RevertReason::Undecodable,
        },
        None => RevertReason::Custom(data),
    }
}

/// ABI-encode a revert reason the way Solidity does
#[cfg(test)]
pub fn encode_revert_reason(reason: &str) -> Vec<u8> {
    let mut data = ERROR_STRING_SELECTOR.to_vec();
    data.extend(abi::encode(&[Token::String(reason.to_string())]));
    data
}
