//! Authentication: credentials and sessions.
//!
//! This module provides:
//! - `CredentialStore`: validated, self-healing persistence of the bearer
//!   credential, plus the one-time migration from legacy keys
//! - `token`: structural checks, fail-open expiry decoding and minting
//! - `SecretVerifier`: pluggable password checks (demo and Argon2)
//! - `SessionFacade`: login, logout and current-user resolution
//!
//! A session only exists while its credential is present, well formed and
//! unexpired, and the user it names still exists. Anything else resolves to
//! anonymous rather than an error.

pub mod credentials;
pub mod session;
pub mod token;
pub mod verifier;

pub use credentials::{CredentialStore, LEGACY_CREDENTIAL_KEYS};
pub use session::{LoginOutcome, SessionFacade, SessionState, USERS_COLLECTION};
pub use token::Expiry;
pub use verifier::{AnyNonEmptySecret, Argon2Verifier, SecretVerifier};
