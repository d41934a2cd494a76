//! Wallet provider abstraction
//!
//! A wallet provider holds the user's keys, reports the active account and
//! network, submits transactions on the user's behalf and pushes
//! `accountsChanged` / `chainChanged` events.

pub mod rpc;
pub mod watcher;

#[cfg(test)]
pub mod mock;

use std::sync::Arc;

use async_trait::async_trait;
use ethers_core::types::{Address, H256};
use ethers_core::utils::to_checksum;
use tracing::{info, warn};

use crate::classifier::ErrorClassifier;
use crate::error::{ErrorCategory, RawFailure};

/// Common wallet error type
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WalletError {
    #[error("Invalid Ethereum address: {0}")]
    InvalidAddress(String),

    #[error("Bad address checksum: {0}")]
    BadChecksum(String),

    #[error("Invalid chain id: {0}")]
    InvalidChainId(String),
}

/// Events pushed by a wallet provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WalletEvent {
    /// Authorized accounts changed; empty means the wallet disconnected
    AccountsChanged(Vec<Address>),
    /// Active chain changed, as a `0x`-prefixed hex chain id
    ChainChanged(String),
}

/// Signing capability for one authorized account
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Signer {
    address: Address,
}

impl Signer {
    pub fn new(address: Address) -> Self {
        Self { address }
    }

    pub fn address(&self) -> Address {
        self.address
    }
}

/// Receipt of a confirmed transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxReceipt {
    pub tx_hash: H256,
    pub block_number: Option<u64>,
    pub success: bool,
    pub confirmed_at: i64,
}

/// Wallet provider interface
#[async_trait]
pub trait WalletProvider: Send + Sync {
    /// Chain id of the active network
    async fn get_network(&self) -> Result<u64, RawFailure>;

    /// Accounts already authorized for this client, without prompting
    async fn accounts(&self) -> Result<Vec<Address>, RawFailure>;

    /// Ask the user for account access. May wait indefinitely for approval.
    async fn request_accounts(&self) -> Result<Vec<Address>, RawFailure>;

    /// Signing capability for an authorized account
    async fn get_signer(&self, account: Address) -> Result<Signer, RawFailure> {
        let accounts = self.accounts().await?;
        if accounts.contains(&account) {
            Ok(Signer::new(account))
        } else {
            Err(RawFailure::message(format!(
                "Account {} is not authorized by the wallet",
                format_address(&account)
            ))
            .with_code(4100))
        }
    }

    /// Read-only contract call, returning the raw return data
    async fn call(&self, to: Address, data: Vec<u8>) -> Result<Vec<u8>, RawFailure>;

    /// Submit a state-changing transaction signed by `from`
    async fn send_transaction(
        &self,
        from: Address,
        to: Address,
        data: Vec<u8>,
    ) -> Result<H256, RawFailure>;

    /// Wait until a submitted transaction is mined
    async fn wait_for_receipt(&self, tx_hash: H256) -> Result<TxReceipt, RawFailure>;
}

/// Check that a provider answers at all. Returns `None` when it cannot be
/// reached, so callers run without a wallet; any other failure keeps the
/// provider and is reported when it is actually used.
pub async fn detect_provider(
    provider: Arc<dyn WalletProvider>,
    classifier: &dyn ErrorClassifier,
) -> Option<Arc<dyn WalletProvider>> {
    match provider.get_network().await {
        Ok(chain_id) => {
            info!("Wallet provider found on network ID {}", chain_id);
            Some(provider)
        }
        Err(failure) => {
            let error = classifier.classify(&failure);
            if error.category == ErrorCategory::ProviderUnavailable {
                warn!("No wallet provider detected: {}", error);
                None
            } else {
                warn!("Wallet provider check failed: {}", error);
                Some(provider)
            }
        }
    }
}

/// Parse a `0x`-prefixed, 40 hex digit account address.
///
/// All-lowercase and all-uppercase addresses are accepted as-is; mixed case
/// must be a valid EIP-55 checksum.
pub fn parse_address(input: &str) -> Result<Address, WalletError> {
    let digits = input
        .strip_prefix("0x")
        .or_else(|| input.strip_prefix("0X"))
        .ok_or_else(|| WalletError::InvalidAddress(input.to_string()))?;

    if digits.len() != 40 || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(WalletError::InvalidAddress(input.to_string()));
    }

    let bytes = hex::decode(digits).map_err(|_| WalletError::InvalidAddress(input.to_string()))?;
    let address = Address::from_slice(&bytes);

    let has_lower = digits.chars().any(|c| c.is_ascii_lowercase());
    let has_upper = digits.chars().any(|c| c.is_ascii_uppercase());
    if has_lower && has_upper && &to_checksum(&address, None)[2..] != digits {
        return Err(WalletError::BadChecksum(input.to_string()));
    }

    Ok(address)
}

/// Lowercase `0x`-prefixed rendering used everywhere accounts are shown
pub fn format_address(address: &Address) -> String {
    format!("{:?}", address)
}

/// Decode a `chainChanged` payload (`0x539`) into a chain id (`1337`)
pub fn parse_chain_id_hex(input: &str) -> Result<u64, WalletError> {
    let digits = input
        .strip_prefix("0x")
        .or_else(|| input.strip_prefix("0X"))
        .unwrap_or(input);
    // from_str_radix alone would accept a sign
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(WalletError::InvalidChainId(input.to_string()));
    }
    u64::from_str_radix(digits, 16).map_err(|_| WalletError::InvalidChainId(input.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_address_lowercase() {
        let address = parse_address("0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266").unwrap();
        assert_eq!(
            format_address(&address),
            "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266"
        );
    }

    #[test]
    fn test_parse_address_checksum() {
        let checksummed = "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266";
        let address = parse_address(checksummed).unwrap();
        assert_eq!(to_checksum(&address, None), checksummed);

        assert!(matches!(
            parse_address("0xF39Fd6e51aad88F6F4ce6aB8827279cffFb92266"),
            Err(WalletError::BadChecksum(_))
        ));
    }

    #[test]
    fn test_parse_address_rejects_malformed() {
        for input in [
            "",
            "0x",
            "f39fd6e51aad88f6f4ce6ab8827279cfffb92266",
            "0xf39fd6e51aad88f6f4ce6ab8827279cfffb9226",
            "0xf39fd6e51aad88f6f4ce6ab8827279cfffb922666",
            "0xg39fd6e51aad88f6f4ce6ab8827279cfffb92266",
            "not an address",
        ] {
            assert!(parse_address(input).is_err(), "accepted {:?}", input);
        }
    }

    #[test]
    fn test_parse_chain_id_hex() {
        assert_eq!(parse_chain_id_hex("0x539").unwrap(), 1337);
        assert_eq!(parse_chain_id_hex("0x1").unwrap(), 1);
        assert_eq!(parse_chain_id_hex("0xaa36a7").unwrap(), 11155111);
        assert!(parse_chain_id_hex("0xzz").is_err());
        assert!(parse_chain_id_hex("").is_err());
        assert!(parse_chain_id_hex("0x").is_err());
    }

    #[test]
    fn test_parse_chain_id_hex_rejects_signs() {
        for input in ["0x+539", "+539", "0x-1", "-1", "0x 539"] {
            assert!(
                matches!(parse_chain_id_hex(input), Err(WalletError::InvalidChainId(_))),
                "accepted {:?}",
                input
            );
        }
    }

    #[tokio::test]
    async fn test_detect_provider() {
        use crate::classifier::SubstringClassifier;
        use mock::{account, MockWallet};

        let wallet: Arc<dyn WalletProvider> = Arc::new(MockWallet::new(1337, vec![account(1)]));
        assert!(detect_provider(wallet, &SubstringClassifier).await.is_some());

        let dead: Arc<dyn WalletProvider> = Arc::new(rpc::JsonRpcWallet::new("http://127.0.0.1:1"));
        assert!(detect_provider(dead, &SubstringClassifier).await.is_none());
    }
}
