//! Wallet session
//!
//! [`ConnectionState`] is the record of the connected account and active
//! network; [`SessionController`] owns it and is the only thing that
//! mutates it.

mod controller;

pub use controller::{Connection, SessionController};

use std::fmt;

use ethers_core::types::Address;

use crate::wallet::format_address;

/// Session state machine states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionStatus {
    #[default]
    Disconnected,
    WrongNetwork,
    Connected,
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionStatus::Disconnected => write!(f, "disconnected"),
            SessionStatus::WrongNetwork => write!(f, "wrong network"),
            SessionStatus::Connected => write!(f, "connected"),
        }
    }
}

/// Connected account and active network
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionState {
    target_network_id: u64,
    account: Option<Address>,
    network_id: Option<u64>,
    has_session: bool,
}

impl ConnectionState {
    /// Empty state for a client targeting `target_network_id`
    pub fn new(target_network_id: u64) -> Self {
        Self {
            target_network_id,
            account: None,
            network_id: None,
            has_session: false,
        }
    }

    /// Clear all fields
    pub fn reset(&mut self) {
        self.account = None;
        self.network_id = None;
        self.has_session = false;
    }

    pub fn update(&mut self, account: Option<Address>, network_id: Option<u64>) {
        self.account = account;
        self.network_id = network_id;
        self.has_session = match (self.account, self.network_id) {
            (Some(_), Some(network)) => network == self.target_network_id,
            _ => false,
        };
    }

    pub fn is_usable(&self) -> bool {
        self.has_session
    }

    pub fn account(&self) -> Option<Address> {
        self.account
    }

    pub fn network_id(&self) -> Option<u64> {
        self.network_id
    }
}

/// Point-in-time view of the session, published to subscribers after every
/// transition
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SessionSnapshot {
    pub status: SessionStatus,
    pub account: Option<Address>,
    pub network_id: Option<u64>,
    /// Last user-facing message
    pub notice: Option<Notice>,
}

impl SessionSnapshot {
    /// Account as shown to the user
    pub fn account_label(&self) -> String {
        match (self.status, self.account) {
            (SessionStatus::Connected, Some(account)) => format_address(&account),
            (SessionStatus::WrongNetwork, _) => "Not Connected (Wrong Network)".to_string(),
            _ => "Not Connected".to_string(),
        }
    }
}

/// A status line for the user
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    Info(String),
    Error(String),
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Notice::Info(message) => write!(f, "{}", message),
            Notice::Error(message) => write!(f, "Error: {}", message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TARGET: u64 = 1337;

    #[test]
    fn test_usable_only_with_account_and_target_network() {
        let account = Address::from_low_u64_be(1);
        for has_account in [false, true] {
            for has_network in [false, true] {
                for on_target in [false, true] {
                    let mut state = ConnectionState::new(TARGET);
                    let network = if on_target { TARGET } else { 5777 };
                    state.update(
                        has_account.then_some(account),
                        has_network.then_some(network),
                    );
                    assert_eq!(
                        state.is_usable(),
                        has_account && has_network && on_target,
                        "account={} network={} target={}",
                        has_account,
                        has_network,
                        on_target
                    );
                }
            }
        }
    }

    #[test]
    fn test_reset_clears_everything() {
        let mut state = ConnectionState::new(TARGET);
        state.update(Some(Address::from_low_u64_be(1)), Some(TARGET));
        assert!(state.is_usable());

        state.reset();
        assert_eq!(state, ConnectionState::new(TARGET));
        assert!(!state.is_usable());
    }

    #[test]
    fn test_account_label() {
        let mut snapshot = SessionSnapshot::default();
        assert_eq!(snapshot.account_label(), "Not Connected");
        snapshot.status = SessionStatus::WrongNetwork;
        assert_eq!(snapshot.account_label(), "Not Connected (Wrong Network)");
    }
}
