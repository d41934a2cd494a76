//! Wallet Session Controller
//!
//! State machine over `Disconnected`, `WrongNetwork` and `Connected`,
//! driven by explicit connect/disconnect and by provider-pushed events.
//!
//! Every handler runs to completion, provider calls included, while holding
//! the session lock, so overlapping calls and interleaved events are applied
//! one after another and the account and contract handle always change
//! together.

use std::sync::Arc;

use ethers_core::types::Address;
use tokio::sync::{mpsc, watch, Mutex};
use tracing::{debug, error, info, warn};

use super::{ConnectionState, Notice, SessionSnapshot, SessionStatus};
use crate::classifier::{ErrorClassifier, SubstringClassifier};
use crate::config::IdentityConfig;
use crate::error::{ClassifiedError, ErrorCategory, IdentityError, RawFailure};
use crate::registry::{load_identity, ContractHandle, IdentityLookup};
use crate::wallet::{format_address, parse_chain_id_hex, WalletEvent, WalletProvider};

/// Outcome of establishing a session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Connection {
    pub account: Address,
    pub network_id: u64,
    /// Best-effort identity load; a failure here does not undo the connection
    pub identity: Result<IdentityLookup, ClassifiedError>,
}

struct Session {
    state: ConnectionState,
    status: SessionStatus,
    handle: Option<ContractHandle>,
    notice: Option<Notice>,
}

impl Session {
    fn tear_down(&mut self, status: SessionStatus) {
        self.state.reset();
        self.handle = None;
        self.status = status;
    }

    fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            status: self.status,
            account: self.state.account(),
            network_id: self.state.network_id(),
            notice: self.notice.clone(),
        }
    }
}

/// Owner of the connection state and contract handle
pub struct SessionController {
    config: IdentityConfig,
    wallet: Option<Arc<dyn WalletProvider>>,
    read_provider: Option<Arc<dyn WalletProvider>>,
    classifier: Arc<dyn ErrorClassifier>,
    session: Mutex<Session>,
    updates: watch::Sender<SessionSnapshot>,
}

impl SessionController {
    /// Create a controller. `wallet` is `None` when no wallet provider is
    /// present.
    pub fn new(config: IdentityConfig, wallet: Option<Arc<dyn WalletProvider>>) -> Self {
        let session = Session {
            state: ConnectionState::new(config.target_network_id),
            status: SessionStatus::Disconnected,
            handle: None,
            notice: None,
        };
        let (updates, _) = watch::channel(session.snapshot());

        Self {
            config,
            wallet,
            read_provider: None,
            classifier: Arc::new(SubstringClassifier),
            session: Mutex::new(session),
            updates,
        }
    }

    /// Provider used for read-only lookups when no wallet is present
    pub fn with_read_provider(mut self, provider: Arc<dyn WalletProvider>) -> Self {
        self.read_provider = Some(provider);
        self
    }

    pub fn with_classifier(mut self, classifier: Arc<dyn ErrorClassifier>) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn config(&self) -> &IdentityConfig {
        &self.config
    }

    pub fn classifier(&self) -> &dyn ErrorClassifier {
        self.classifier.as_ref()
    }

    /// Receive a snapshot after every transition
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.updates.subscribe()
    }

    pub async fn snapshot(&self) -> SessionSnapshot {
        self.session.lock().await.snapshot()
    }

    // =========================================================================
    // Transitions
    // =========================================================================

    /// Connect to the wallet and build the signing handle for the first
    /// account it grants
    pub async fn connect(&self) -> Result<Connection, IdentityError> {
        let mut session = self.session.lock().await;
        self.establish(&mut session, None).await
    }

    /// Local disconnect. Provider-granted permissions are left untouched.
    pub async fn disconnect(&self) -> SessionSnapshot {
        let mut session = self.session.lock().await;
        session.tear_down(SessionStatus::Disconnected);
        info!("Wallet disconnected");
        self.publish(&mut session, Notice::Info("Wallet disconnected.".to_string()))
    }

    /// `accountsChanged`
    pub async fn on_accounts_changed(
        &self,
        accounts: Vec<Address>,
    ) -> Result<SessionSnapshot, IdentityError> {
        let mut session = self.session.lock().await;
        info!("Accounts changed: {} authorized", accounts.len());

        let Some(first) = accounts.first().copied() else {
            session.tear_down(SessionStatus::Disconnected);
            return Ok(self.publish(&mut session, Notice::Error("Wallet disconnected.".to_string())));
        };

        self.establish(&mut session, Some(first)).await?;
        Ok(session.snapshot())
    }

    /// `chainChanged`, with the chain id as hex
    pub async fn on_chain_changed(&self, chain_id_hex: &str) -> Result<SessionSnapshot, IdentityError> {
        let mut session = self.session.lock().await;
        let target = self.config.target_network_id;

        let chain_id = match parse_chain_id_hex(chain_id_hex) {
            Ok(chain_id) => chain_id,
            Err(e) => {
                warn!("Undecodable chainChanged payload: {}", e);
                session.tear_down(SessionStatus::WrongNetwork);
                let error = ClassifiedError::wrong_network(target, chain_id_hex);
                self.publish(&mut session, Notice::Error(error.message.clone()));
                return Err(error.into());
            }
        };
        info!("Network changed to ID {}", chain_id);

        if chain_id != target {
            session.tear_down(SessionStatus::WrongNetwork);
            let message = format!(
                "Switched to wrong network (ID: {}). Please switch to network ID {}.",
                chain_id, target
            );
            self.publish(&mut session, Notice::Error(message.clone()));
            return Err(ClassifiedError::new(ErrorCategory::WrongNetwork, message).into());
        }

        let wallet = self.require_wallet(&mut session)?;
        let accounts = match wallet.accounts().await {
            Ok(accounts) => accounts,
            Err(failure) => return Err(self.fail_establishment(&mut session, failure)),
        };

        match accounts.first().copied() {
            Some(account) => {
                self.establish(&mut session, Some(account)).await?;
                Ok(session.snapshot())
            }
            None => {
                session.tear_down(SessionStatus::Disconnected);
                Ok(self.publish(
                    &mut session,
                    Notice::Info(format!(
                        "Now on the target network (ID: {}). Please connect your wallet.",
                        target
                    )),
                ))
            }
        }
    }

    /// Apply one provider event
    pub async fn handle_event(&self, event: WalletEvent) -> Result<SessionSnapshot, IdentityError> {
        match event {
            WalletEvent::AccountsChanged(accounts) => self.on_accounts_changed(accounts).await,
            WalletEvent::ChainChanged(chain_id) => self.on_chain_changed(&chain_id).await,
        }
    }

    /// Apply events in arrival order until the sender goes away
    pub async fn run_events(&self, mut events: mpsc::Receiver<WalletEvent>) {
        while let Some(event) = events.recv().await {
            debug!("Wallet event: {:?}", event);
            if let Err(e) = self.handle_event(event).await {
                warn!("{}", e);
            }
        }
        debug!("Wallet event stream closed");
    }

    /// Connect silently if the wallet already authorized an account
    pub async fn restore(&self) -> Option<Connection> {
        let wallet = self.wallet.clone()?;
        match wallet.accounts().await {
            Ok(accounts) if !accounts.is_empty() => match self.connect().await {
                Ok(connection) => Some(connection),
                Err(e) => {
                    warn!("Could not automatically connect wallet: {}", e);
                    None
                }
            },
            Ok(_) => None,
            Err(e) => {
                warn!("Could not automatically connect wallet: {}", e);
                None
            }
        }
    }

    // =========================================================================
    // Handles
    // =========================================================================

    /// Signing handle and its account, checked against the session now
    pub async fn signing_handle(&self) -> Result<(Address, ContractHandle), IdentityError> {
        if self.wallet.is_none() {
            return Err(ClassifiedError::provider_unavailable().into());
        }
        let session = self.session.lock().await;
        if !session.state.is_usable() {
            return Err(IdentityError::NotConnected);
        }
        match (session.state.account(), &session.handle) {
            (Some(account), Some(handle)) if handle.signer() == Some(account) => {
                Ok((account, handle.clone()))
            }
            _ => Err(IdentityError::NotConnected),
        }
    }

    /// Read-only handle over the wallet, or the read provider when no
    /// wallet is present
    pub fn read_only_handle(&self) -> Result<ContractHandle, IdentityError> {
        let provider = self
            .wallet
            .clone()
            .or_else(|| self.read_provider.clone())
            .ok_or_else(ClassifiedError::provider_unavailable)?;
        Ok(ContractHandle::read_only(provider, self.config.contract_address))
    }

    // =========================================================================
    // Internals
    // =========================================================================

    /// Connect logic shared by `connect` and the event handlers. With
    /// `account` set, the session is built for that account instead of
    /// requesting access.
    async fn establish(
        &self,
        session: &mut Session,
        account: Option<Address>,
    ) -> Result<Connection, IdentityError> {
        let wallet = self.require_wallet(session)?;
        let target = self.config.target_network_id;

        let network_id = match wallet.get_network().await {
            Ok(network_id) => network_id,
            Err(failure) => return Err(self.fail_establishment(session, failure)),
        };
        if network_id != target {
            session.tear_down(SessionStatus::WrongNetwork);
            let error = ClassifiedError::wrong_network(target, network_id);
            warn!("{}", error);
            self.publish(session, Notice::Error(error.message.clone()));
            return Err(error.into());
        }

        let account = match account {
            Some(account) => account,
            None => {
                let accounts = match wallet.request_accounts().await {
                    Ok(accounts) => accounts,
                    Err(failure) => return Err(self.fail_establishment(session, failure)),
                };
                match accounts.first().copied() {
                    Some(account) => account,
                    None => {
                        session.tear_down(SessionStatus::Disconnected);
                        let error = ClassifiedError::new(
                            ErrorCategory::Unknown,
                            "The wallet did not return any accounts.",
                        );
                        self.publish(session, Notice::Error(error.message.clone()));
                        return Err(error.into());
                    }
                }
            }
        };

        let signer = match wallet.get_signer(account).await {
            Ok(signer) => signer,
            Err(failure) => return Err(self.fail_establishment(session, failure)),
        };

        let handle = ContractHandle::signing(wallet, self.config.contract_address, signer);
        session.state.update(Some(account), Some(network_id));
        session.handle = Some(handle.clone());
        session.status = SessionStatus::Connected;

        let message = format!(
            "Wallet connected: {} on Network ID {}",
            format_address(&account),
            network_id
        );
        info!("{}", message);
        self.publish(session, Notice::Info(message));

        let identity = load_identity(&handle, account, self.classifier.as_ref()).await;
        let notice = match &identity {
            Ok(IdentityLookup::Registered(_)) => {
                Notice::Info("Your current identity has been loaded.".to_string())
            }
            Ok(IdentityLookup::NotRegistered { .. }) => {
                Notice::Info("You have not registered an identity yet.".to_string())
            }
            Err(e) => {
                warn!("Failed to load current user identity: {}", e);
                Notice::Error(format!("Failed to load current user identity: {}", e))
            }
        };
        self.publish(session, notice);

        Ok(Connection {
            account,
            network_id,
            identity,
        })
    }

    fn require_wallet(&self, session: &mut Session) -> Result<Arc<dyn WalletProvider>, IdentityError> {
        match &self.wallet {
            Some(wallet) => Ok(wallet.clone()),
            None => {
                let error = ClassifiedError::provider_unavailable();
                error!("{}", error);
                session.tear_down(SessionStatus::Disconnected);
                self.publish(session, Notice::Error(error.message.clone()));
                Err(error.into())
            }
        }
    }

    /// Classify a failure during session establishment. A user rejection
    /// leaves the previous session as it was; anything else tears it down.
    fn fail_establishment(&self, session: &mut Session, failure: RawFailure) -> IdentityError {
        let error = self.classifier.classify(&failure);
        if error.category == ErrorCategory::UserRejected {
            info!("Wallet request rejected: {}", error);
        } else {
            error!("Error connecting wallet: {}", error);
            session.tear_down(SessionStatus::Disconnected);
        }
        self.publish(
            session,
            Notice::Error(format!("Error connecting wallet: {}", error.message)),
        );
        error.into()
    }

    fn publish(&self, session: &mut Session, notice: Notice) -> SessionSnapshot {
        session.notice = Some(notice);
        let snapshot = session.snapshot();
        self.updates.send_replace(snapshot.clone());
        snapshot
    }
}
