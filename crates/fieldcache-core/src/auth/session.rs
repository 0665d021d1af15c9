use std::sync::Arc;

use chrono::{Duration, Utc};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::credentials::CredentialStore;
use super::token;
use super::verifier::{SecretVerifier, PASSWORD_HASH_FIELD};
use crate::error::StoreError;
use crate::resources::{Record, ResourceStore};

/// Collection holding the accounts that can log in
pub const USERS_COLLECTION: &str = "users";

const MISSING_FIELDS_MESSAGE: &str = "Email and password are required";
const INVALID_CREDENTIALS_MESSAGE: &str = "Invalid email or password";
const NOT_PERSISTED_MESSAGE: &str = "Could not save your session. Please try again.";

/// Who the UI is acting as. There is no partial state: anything short of a
/// valid credential pointing at an existing user is `Anonymous`.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum SessionState {
    #[default]
    Anonymous,
    Authenticated(Record),
}

impl SessionState {
    pub fn user(&self) -> Option<&Record> {
        match self {
            SessionState::Anonymous => None,
            SessionState::Authenticated(record) => Some(record),
        }
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self, SessionState::Authenticated(_))
    }
}

/// Result envelope of `login`. Failures carry a message fit for the UI.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoginOutcome {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record: Option<Record>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl LoginOutcome {
    fn success(record: Record) -> Self {
        Self {
            success: true,
            record: Some(record),
            message: None,
        }
    }

    fn failure(message: &str) -> Self {
        Self {
            success: false,
            record: None,
            message: Some(message.to_string()),
        }
    }
}

/// Login, logout and current-user resolution over the credential and
/// resource stores. The single entry point the UI talks to.
pub struct SessionFacade {
    credentials: Arc<CredentialStore>,
    resources: Arc<ResourceStore>,
    verifier: Arc<dyn SecretVerifier>,
    identifier_field: String,
    session_ttl: Duration,
    state: watch::Sender<SessionState>,
}

impl SessionFacade {
    pub fn new(
        credentials: Arc<CredentialStore>,
        resources: Arc<ResourceStore>,
        verifier: Arc<dyn SecretVerifier>,
    ) -> Self {
        let (state, _) = watch::channel(SessionState::Anonymous);
        Self {
            credentials,
            resources,
            verifier,
            identifier_field: "email".to_string(),
            session_ttl: Duration::hours(24),
            state,
        }
    }

    pub fn with_identifier_field(mut self, field: impl Into<String>) -> Self {
        self.identifier_field = field.into();
        self
    }

    pub fn with_session_ttl(mut self, ttl: Duration) -> Self {
        self.session_ttl = ttl;
        self
    }

    /// Match `identifier` exactly against the identifier field of `users`
    /// and verify `secret`. Nothing is written unless both succeed.
    pub async fn login(&self, identifier: &str, secret: &str) -> LoginOutcome {
        if identifier.trim().is_empty() || secret.is_empty() {
            return LoginOutcome::failure(MISSING_FIELDS_MESSAGE);
        }

        let lookup = Value::String(identifier.to_string());
        let Some(record) = self
            .resources
            .find_by(USERS_COLLECTION, &self.identifier_field, &lookup)
            .await
        else {
            info!("Login rejected: unknown identifier");
            return LoginOutcome::failure(INVALID_CREDENTIALS_MESSAGE);
        };

        if !self.verifier.verify(&record, secret) {
            info!(user_id = record.id, "Login rejected: secret did not verify");
            return LoginOutcome::failure(INVALID_CREDENTIALS_MESSAGE);
        }

        let credential = token::mint(record.id, Utc::now(), self.session_ttl);
        if !self.credentials.set(&credential) {
            warn!(user_id = record.id, "Login succeeded but the credential was not persisted");
            return LoginOutcome::failure(NOT_PERSISTED_MESSAGE);
        }

        let record = redact(record);
        self.publish(SessionState::Authenticated(record.clone()));
        info!(user_id = record.id, "Login successful");
        LoginOutcome::success(record)
    }

    /// Always succeeds, whatever the prior state.
    pub async fn logout(&self) {
        self.credentials.remove();
        self.publish(SessionState::Anonymous);
        info!("Logged out");
    }

    /// The user the stored credential authorizes, or `None`.
    ///
    /// An expired credential, or one naming a user that no longer exists,
    /// is removed on the way out. A failed user lookup reports `None` but
    /// leaves the credential in place.
    pub async fn current_user(&self) -> Option<Record> {
        match self.resolve().await {
            Ok(record) => {
                self.publish(SessionState::Authenticated(record.clone()));
                Some(record)
            }
            Err(reason) => {
                debug!(%reason, "No current user");
                self.publish(SessionState::Anonymous);
                None
            }
        }
    }

    /// Like `current_user`, for operations that require a user.
    pub async fn require_user(&self) -> Result<Record, StoreError> {
        self.current_user().await.ok_or(StoreError::Unauthenticated)
    }

    /// Last resolved state, without touching storage.
    pub fn state(&self) -> SessionState {
        self.state.borrow().clone()
    }

    /// Watch the session state; the receiver sees every transition.
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    pub fn auth_header(&self) -> String {
        self.credentials.as_auth_header()
    }

    async fn resolve(&self) -> Result<Record, StoreError> {
        let credential = self.credentials.get().ok_or(StoreError::Unauthenticated)?;

        if token::expiry(&credential).is_expired() {
            info!("Stored credential has expired");
            self.credentials.remove();
            return Err(StoreError::Unauthenticated);
        }

        let Some(user_id) = token::subject(&credential) else {
            self.credentials.remove();
            return Err(StoreError::Unauthenticated);
        };

        match self.resources.try_get_by_id(USERS_COLLECTION, user_id).await {
            Ok(Some(record)) => Ok(redact(record)),
            Ok(None) => {
                info!(user_id, "Credential refers to a user that no longer exists");
                self.credentials.remove();
                Err(StoreError::not_found(USERS_COLLECTION, user_id))
            }
            // The user may well exist; keep the credential for the next attempt
            Err(e) => {
                warn!(user_id, error = %e, "Could not look up the current user");
                Err(e)
            }
        }
    }

    fn publish(&self, next: SessionState) {
        self.state.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });
    }
}

/// Strip the stored password hash before a user record leaves the facade.
fn redact(mut record: Record) -> Record {
    record.fields.remove(PASSWORD_HASH_FIELD);
    record
}
