//! Identity Registry binding
//!
//! A [`ContractHandle`] binds the registry at its configured address to a
//! wallet provider, either signing as one account or read-only.

pub mod abi;

use std::fmt;
use std::sync::Arc;

use ethers_core::types::Address;
use serde::Serialize;
use tracing::{debug, info};

use crate::classifier::ErrorClassifier;
use crate::error::{ClassifiedError, ErrorCategory, RawFailure};
use crate::wallet::{format_address, Signer, TxReceipt, WalletProvider};

/// An identity as stored by the registry
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IdentityRecord {
    pub owner: Address,
    pub name: String,
    pub email: String,
    pub is_registered: bool,
}

/// Result of looking up an address that may not be registered
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentityLookup {
    Registered(IdentityRecord),
    NotRegistered { owner: Address },
}

impl IdentityLookup {
    pub fn record(&self) -> Option<&IdentityRecord> {
        match self {
            IdentityLookup::Registered(record) => Some(record),
            IdentityLookup::NotRegistered { .. } => None,
        }
    }
}

impl fmt::Display for IdentityLookup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IdentityLookup::Registered(record) => write!(
                f,
                "Owner: {}\nName: {}\nEmail: {}\nRegistered: Yes",
                format_address(&record.owner),
                record.name,
                record.email
            ),
            IdentityLookup::NotRegistered { owner } => {
                write!(f, "No identity registered for {}.", format_address(owner))
            }
        }
    }
}

/// How a handle talks to the registry
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HandleMode {
    /// Sends transactions as the bound account
    Signing(Signer),
    /// Calls only
    ReadOnly,
}

/// Binding to the registry contract
#[derive(Clone)]
pub struct ContractHandle {
    address: Address,
    mode: HandleMode,
    provider: Arc<dyn WalletProvider>,
}

impl ContractHandle {
    pub fn signing(provider: Arc<dyn WalletProvider>, address: Address, signer: Signer) -> Self {
        Self {
            address,
            mode: HandleMode::Signing(signer),
            provider,
        }
    }

    pub fn read_only(provider: Arc<dyn WalletProvider>, address: Address) -> Self {
        Self {
            address,
            mode: HandleMode::ReadOnly,
            provider,
        }
    }

    /// Account this handle signs as, if any
    pub fn signer(&self) -> Option<Address> {
        match self.mode {
            HandleMode::Signing(signer) => Some(signer.address()),
            HandleMode::ReadOnly => None,
        }
    }

    /// `registerIdentity(name, email)`, waiting for the transaction to be mined
    pub async fn register_identity(&self, name: &str, email: &str) -> Result<TxReceipt, RawFailure> {
        self.transact(abi::register_identity_calldata(name, email)).await
    }

    /// `updateIdentity(name, email)`, waiting for the transaction to be mined
    pub async fn update_identity(&self, name: &str, email: &str) -> Result<TxReceipt, RawFailure> {
        self.transact(abi::update_identity_calldata(name, email)).await
    }

    /// `getIdentity(owner)`
    pub async fn get_identity(&self, owner: Address) -> Result<IdentityRecord, RawFailure> {
        let data = self
            .provider
            .call(self.address, abi::get_identity_calldata(owner))
            .await?;
        let fields = abi::decode_identity(&data)
            .map_err(|e| RawFailure::message(format!("Could not decode getIdentity result: {}", e)))?;

        Ok(IdentityRecord {
            owner,
            name: fields.name,
            email: fields.email,
            is_registered: fields.is_registered,
        })
    }

    async fn transact(&self, data: Vec<u8>) -> Result<TxReceipt, RawFailure> {
        let from = self
            .signer()
            .ok_or_else(|| RawFailure::message("Contract handle is read-only"))?;

        let tx_hash = self.provider.send_transaction(from, self.address, data).await?;
        info!("Transaction sent: {:?}. Waiting for confirmation...", tx_hash);

        let receipt = self.provider.wait_for_receipt(tx_hash).await?;
        if !receipt.success {
            return Err(RawFailure::message(format!(
                "Transaction {:?} reverted",
                receipt.tx_hash
            )));
        }
        debug!("Transaction {:?} confirmed in block {:?}", tx_hash, receipt.block_number);
        Ok(receipt)
    }
}

impl fmt::Debug for ContractHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContractHandle")
            .field("address", &format_address(&self.address))
            .field("mode", &self.mode)
            .finish()
    }
}

/// Read `owner`'s record, treating "not registered" as an ordinary outcome
/// rather than an error.
pub async fn load_identity(
    handle: &ContractHandle,
    owner: Address,
    classifier: &dyn ErrorClassifier,
) -> Result<IdentityLookup, ClassifiedError> {
    match handle.get_identity(owner).await {
        Ok(record) if record.is_registered => Ok(IdentityLookup::Registered(record)),
        Ok(_) => Ok(IdentityLookup::NotRegistered { owner }),
        Err(failure) => {
            let classified = classifier.classify(&failure);
            if classified.category == ErrorCategory::NotRegistered {
                Ok(IdentityLookup::NotRegistered { owner })
            } else {
                Err(classified)
            }
        }
    }
}
