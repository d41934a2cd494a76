//! Identity operations
//!
//! User-initiated register / update / view on top of a
//! [`SessionController`]. Reads the session, never mutates it.

use std::sync::Arc;

use tracing::{info, warn};

use crate::error::{IdentityError, RawFailure};
use crate::registry::{load_identity, IdentityLookup};
use crate::session::SessionController;
use crate::wallet::{format_address, parse_address, TxReceipt};

/// Result of a confirmed register/update
#[derive(Debug, Clone)]
pub struct TxOutcome {
    pub receipt: TxReceipt,
    /// The caller's record, reloaded after confirmation
    pub identity: Result<IdentityLookup, IdentityError>,
}

/// Register / update / view operations
pub struct IdentityService {
    session: Arc<SessionController>,
}

impl IdentityService {
    pub fn new(session: Arc<SessionController>) -> Self {
        Self { session }
    }

    pub fn session(&self) -> &SessionController {
        &self.session
    }

    /// Register the connected account's identity
    pub async fn register(&self, name: &str, email: &str) -> Result<TxOutcome, IdentityError> {
        let (account, handle) = self.session.signing_handle().await?;
        require_fields(name, email, "Name and Email are required for registration.")?;

        info!("Sending registration transaction for {}", format_address(&account));
        let receipt = handle
            .register_identity(name, email)
            .await
            .map_err(|failure| self.contract_error("Registration failed", &failure))?;
        info!("Identity registered successfully for {} ({})", name, email);

        Ok(TxOutcome {
            receipt,
            identity: self.load_current_user_identity().await,
        })
    }

    /// Replace the connected account's name and email
    pub async fn update(&self, new_name: &str, new_email: &str) -> Result<TxOutcome, IdentityError> {
        let (account, handle) = self.session.signing_handle().await?;
        require_fields(new_name, new_email, "New Name and New Email are required for update.")?;

        info!("Sending update transaction for {}", format_address(&account));
        let receipt = handle
            .update_identity(new_name, new_email)
            .await
            .map_err(|failure| self.contract_error("Update failed", &failure))?;
        info!("Identity updated successfully");

        Ok(TxOutcome {
            receipt,
            identity: self.load_current_user_identity().await,
        })
    }

    /// Look up any address. Needs no signing session; an unregistered
    /// address is an ordinary result.
    pub async fn view_by_address(&self, address: &str) -> Result<IdentityLookup, IdentityError> {
        let owner = parse_address(address.trim()).map_err(|_| {
            IdentityError::InvalidInput("Invalid Ethereum address provided for viewing.".to_string())
        })?;
        let handle = self.session.read_only_handle()?;

        info!("Fetching identity for {}", format_address(&owner));
        load_identity(&handle, owner, self.session.classifier())
            .await
            .map_err(|error| IdentityError::Contract {
                context: "Failed to fetch identity",
                error,
            })
    }

    /// The connected account's own record. Not being registered is an
    /// expected outcome here, not an error.
    pub async fn load_current_user_identity(&self) -> Result<IdentityLookup, IdentityError> {
        let (account, handle) = self.session.signing_handle().await?;
        let lookup = load_identity(&handle, account, self.session.classifier())
            .await
            .map_err(|error| {
                warn!("Failed to load current user identity: {}", error);
                IdentityError::Contract {
                    context: "Failed to load current user identity",
                    error,
                }
            })?;

        match &lookup {
            IdentityLookup::Registered(_) => info!("Your current identity has been loaded."),
            IdentityLookup::NotRegistered { .. } => {
                info!("You have not registered an identity yet.")
            }
        }
        Ok(lookup)
    }

    fn contract_error(&self, context: &'static str, failure: &RawFailure) -> IdentityError {
        let error = self.session.classifier().classify(failure);
        warn!("{}: {} ({})", context, error, error.category);
        IdentityError::Contract { context, error }
    }
}

fn require_fields(name: &str, email: &str, message: &str) -> Result<(), IdentityError> {
    if name.is_empty() || email.is_empty() {
        return Err(IdentityError::InvalidInput(message.to_string()));
    }
    Ok(())
}
