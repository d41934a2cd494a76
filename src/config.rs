//! Connector configuration
//!
//! Configuration can come from a JSON file, CLI flags, or both (CLI
//! overrides the file). It is validated once at startup; a missing contract
//! address or target network is fatal.

use std::path::Path;
use std::time::Duration;

use ethers_core::types::Address;
use serde::{Deserialize, Serialize};

use crate::wallet::parse_address;

/// Address of the `DigitalIdentity` deployment on the local Ganache network
pub const DEFAULT_CONTRACT_ADDRESS: &str = "0x7696Cc1dD62F32dCe1898bC9A81a45eB96e8BDD3";
/// Ganache CLI chain id
pub const DEFAULT_TARGET_NETWORK_ID: &str = "1337";
/// Ganache UI RPC endpoint
pub const DEFAULT_RPC_URL: &str = "http://127.0.0.1:7545";
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;

/// Left in freshly generated configs until a real deployment is pasted in
const PLACEHOLDER_CONTRACT_ADDRESS: &str = "0xYourDeployedContractAddressOnGanache";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("Contract address is not set. Update it with the deployed DigitalIdentity address.")]
    MissingContractAddress,

    #[error("Invalid contract address: {0}")]
    InvalidContractAddress(String),

    #[error("Target network ID is not set. Update it with your node's network ID.")]
    MissingTargetNetwork,

    #[error("Invalid target network ID: {0}")]
    InvalidTargetNetwork(String),

    #[error("Failed to read config file: {0}")]
    Io(String),

    #[error("Failed to parse config file: {0}")]
    Parse(String),
}

/// Raw configuration as written in a config file or assembled from flags
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub contract_address: String,
    pub target_network_id: String,
    pub rpc_url: String,
    /// Node used for lookups when the wallet endpoint is unreachable
    pub read_rpc_url: Option<String>,
    pub poll_interval_ms: u64,
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            contract_address: DEFAULT_CONTRACT_ADDRESS.to_string(),
            target_network_id: DEFAULT_TARGET_NETWORK_ID.to_string(),
            rpc_url: DEFAULT_RPC_URL.to_string(),
            read_rpc_url: None,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
        }
    }
}

impl FileConfig {
    /// Load from a JSON file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents =
            std::fs::read_to_string(path).map_err(|e| ConfigError::Io(e.to_string()))?;
        serde_json::from_str(&contents).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Validate into the configuration the connector runs with
    pub fn validate(self) -> Result<IdentityConfig, ConfigError> {
        let address = self.contract_address.trim();
        if address.is_empty() || address == PLACEHOLDER_CONTRACT_ADDRESS {
            return Err(ConfigError::MissingContractAddress);
        }
        // Deployment tools print addresses in arbitrary case; only the shape matters here.
        let contract_address = parse_address(&address.to_lowercase())
            .map_err(|e| ConfigError::InvalidContractAddress(e.to_string()))?;

        let network = self.target_network_id.trim();
        if network.is_empty() {
            return Err(ConfigError::MissingTargetNetwork);
        }
        let target_network_id = network
            .parse::<u64>()
            .map_err(|_| ConfigError::InvalidTargetNetwork(network.to_string()))?;

        Ok(IdentityConfig {
            contract_address,
            target_network_id,
            rpc_url: self.rpc_url,
            read_rpc_url: self
                .read_rpc_url
                .map(|url| url.trim().to_string())
                .filter(|url| !url.is_empty()),
            poll_interval: Duration::from_millis(self.poll_interval_ms.max(1)),
        })
    }
}

/// Validated connector configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityConfig {
    /// Fixed address of the identity registry
    pub contract_address: Address,
    /// The only network this client operates against
    pub target_network_id: u64,
    /// JSON-RPC endpoint of the wallet/node
    pub rpc_url: String,
    /// Read-only endpoint for lookups; falls back to `rpc_url`
    pub read_rpc_url: Option<String>,
    /// How often the event watcher polls the provider
    pub poll_interval: Duration,
}

impl IdentityConfig {
    pub fn new(contract_address: Address, target_network_id: u64) -> Self {
        Self {
            contract_address,
            target_network_id,
            rpc_url: DEFAULT_RPC_URL.to_string(),
            read_rpc_url: None,
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let config = FileConfig::default().validate().unwrap();
        assert_eq!(config.target_network_id, 1337);
        assert_eq!(
            format!("{:?}", config.contract_address),
            DEFAULT_CONTRACT_ADDRESS.to_lowercase()
        );
    }

    #[test]
    fn test_missing_contract_address_is_fatal() {
        let mut raw = FileConfig::default();
        raw.contract_address = String::new();
        assert_eq!(raw.validate(), Err(ConfigError::MissingContractAddress));

        let mut raw = FileConfig::default();
        raw.contract_address = PLACEHOLDER_CONTRACT_ADDRESS.to_string();
        assert_eq!(raw.validate(), Err(ConfigError::MissingContractAddress));
    }

    #[test]
    fn test_missing_network_is_fatal() {
        let mut raw = FileConfig::default();
        raw.target_network_id = "  ".to_string();
        assert_eq!(raw.validate(), Err(ConfigError::MissingTargetNetwork));

        let mut raw = FileConfig::default();
        raw.target_network_id = "ganache".to_string();
        assert!(matches!(
            raw.validate(),
            Err(ConfigError::InvalidTargetNetwork(_))
        ));
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let raw: FileConfig = serde_json::from_str(r#"{ "target_network_id": "5777" }"#).unwrap();
        assert_eq!(raw.contract_address, DEFAULT_CONTRACT_ADDRESS);
        assert_eq!(raw.validate().unwrap().target_network_id, 5777);
    }

    #[test]
    fn test_read_rpc_url() {
        let raw: FileConfig =
            serde_json::from_str(r#"{ "read_rpc_url": "http://127.0.0.1:8545" }"#).unwrap();
        assert_eq!(
            raw.validate().unwrap().read_rpc_url.as_deref(),
            Some("http://127.0.0.1:8545")
        );

        let mut raw = FileConfig::default();
        raw.read_rpc_url = Some("  ".to_string());
        assert_eq!(raw.validate().unwrap().read_rpc_url, None);
    }
}
