//! In-memory wallet for tests
//!
//! Simulates a wallet on a single chain with the registry contract deployed,
//! executing registry calldata against an in-memory map.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use ethers_core::types::{Address, H256};

use super::{TxReceipt, WalletProvider};
use crate::classifier::encode_revert_reason;
use crate::error::RawFailure;
use crate::registry::abi::{self, IdentityFields, RegistryCall};

pub const ALREADY_REGISTERED_REVERT: &str = "Identity: Address already registered";
pub const NOT_REGISTERED_REVERT: &str = "Identity: Address not registered";

pub fn account(n: u8) -> Address {
    Address::from_low_u64_be(0xa000 + n as u64)
}

pub struct MockWallet {
    chain_id: AtomicU64,
    accounts: Mutex<Vec<Address>>,
    reject_requests: AtomicBool,
    revert_unregistered_reads: AtomicBool,
    call_failure: Mutex<Option<RawFailure>>,
    network_delay: Mutex<Duration>,
    identities: Mutex<HashMap<Address, (String, String)>>,
    receipts: Mutex<HashMap<H256, TxReceipt>>,
    next_tx: AtomicU64,
    pub request_calls: AtomicUsize,
    pub send_calls: AtomicUsize,
}

impl MockWallet {
    pub fn new(chain_id: u64, accounts: Vec<Address>) -> Self {
        Self {
            chain_id: AtomicU64::new(chain_id),
            accounts: Mutex::new(accounts),
            reject_requests: AtomicBool::new(false),
            revert_unregistered_reads: AtomicBool::new(false),
            call_failure: Mutex::new(None),
            network_delay: Mutex::new(Duration::ZERO),
            identities: Mutex::new(HashMap::new()),
            receipts: Mutex::new(HashMap::new()),
            next_tx: AtomicU64::new(1),
            request_calls: AtomicUsize::new(0),
            send_calls: AtomicUsize::new(0),
        }
    }

    pub fn set_chain_id(&self, chain_id: u64) {
        self.chain_id.store(chain_id, Ordering::SeqCst);
    }

    pub fn set_accounts(&self, accounts: Vec<Address>) {
        *self.accounts.lock().unwrap() = accounts;
    }

    pub fn reject_requests(&self, reject: bool) {
        self.reject_requests.store(reject, Ordering::SeqCst);
    }

    /// Make `getIdentity` revert for unknown owners instead of returning an
    /// empty record
    pub fn revert_unregistered_reads(&self, revert: bool) {
        self.revert_unregistered_reads.store(revert, Ordering::SeqCst);
    }

    pub fn fail_calls_with(&self, failure: Option<RawFailure>) {
        *self.call_failure.lock().unwrap() = failure;
    }

    pub fn set_network_delay(&self, delay: Duration) {
        *self.network_delay.lock().unwrap() = delay;
    }

    pub fn insert_identity(&self, owner: Address, name: &str, email: &str) {
        self.identities
            .lock()
            .unwrap()
            .insert(owner, (name.to_string(), email.to_string()));
    }

    pub fn identity(&self, owner: Address) -> Option<(String, String)> {
        self.identities.lock().unwrap().get(&owner).cloned()
    }

    fn revert(reason: &str) -> RawFailure {
        RawFailure {
            code: Some(-32603),
            message: Some("Internal JSON-RPC error.".to_string()),
            revert_data: Some(encode_revert_reason(reason)),
            ..Default::default()
        }
    }
}

#[async_trait]
impl WalletProvider for MockWallet {
    async fn get_network(&self) -> Result<u64, RawFailure> {
        let delay = *self.network_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        Ok(self.chain_id.load(Ordering::SeqCst))
    }

    async fn accounts(&self) -> Result<Vec<Address>, RawFailure> {
        Ok(self.accounts.lock().unwrap().clone())
    }

    async fn request_accounts(&self) -> Result<Vec<Address>, RawFailure> {
        self.request_calls.fetch_add(1, Ordering::SeqCst);
        if self.reject_requests.load(Ordering::SeqCst) {
            return Err(RawFailure::message("User rejected the request.").with_code(4001));
        }
        Ok(self.accounts.lock().unwrap().clone())
    }

    async fn call(&self, to: Address, data: Vec<u8>) -> Result<Vec<u8>, RawFailure> {
        let _ = to;
        if let Some(failure) = self.call_failure.lock().unwrap().clone() {
            return Err(failure);
        }
        let call = abi::decode_call(&data).map_err(|e| RawFailure::message(e.to_string()))?;
        let RegistryCall::Get { owner } = call else {
            return Err(RawFailure::message("state-changing function called via eth_call"));
        };

        let fields = match self.identity(owner) {
            Some((name, email)) => IdentityFields {
                name,
                email,
                is_registered: true,
            },
            None if self.revert_unregistered_reads.load(Ordering::SeqCst) => {
                return Err(Self::revert(NOT_REGISTERED_REVERT));
            }
            None => IdentityFields {
                name: String::new(),
                email: String::new(),
                is_registered: false,
            },
        };
        Ok(abi::encode_identity(&fields))
    }

    async fn send_transaction(
        &self,
        from: Address,
        _to: Address,
        data: Vec<u8>,
    ) -> Result<H256, RawFailure> {
        self.send_calls.fetch_add(1, Ordering::SeqCst);
        let call = abi::decode_call(&data).map_err(|e| RawFailure::message(e.to_string()))?;

        {
            let mut identities = self.identities.lock().unwrap();
            match call {
                RegistryCall::Register { name, email } => {
                    if identities.contains_key(&from) {
                        return Err(Self::revert(ALREADY_REGISTERED_REVERT));
                    }
                    identities.insert(from, (name, email));
                }
                RegistryCall::Update { name, email } => match identities.get_mut(&from) {
                    Some(entry) => *entry = (name, email),
                    None => return Err(Self::revert(NOT_REGISTERED_REVERT)),
                },
                RegistryCall::Get { .. } => {}
            }
        }

        let n = self.next_tx.fetch_add(1, Ordering::SeqCst);
        let tx_hash = H256::from_low_u64_be(n);
        self.receipts.lock().unwrap().insert(
            tx_hash,
            TxReceipt {
                tx_hash,
                block_number: Some(n),
                success: true,
                confirmed_at: chrono::Utc::now().timestamp_millis(),
            },
        );
        Ok(tx_hash)
    }

    async fn wait_for_receipt(&self, tx_hash: H256) -> Result<TxReceipt, RawFailure> {
        self.receipts
            .lock()
            .unwrap()
            .get(&tx_hash)
            .cloned()
            .ok_or_else(|| RawFailure::message("unknown transaction"))
    }
}
