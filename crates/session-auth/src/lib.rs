//! Session credential library
//!
//! Holds the access/refresh credential pair for one execution context and
//! talks to the session endpoints of the upstream API. This crate knows
//! nothing about refresh coordination; it is the persistence and wire layer
//! the coordinator and gateway build on.
//!
//! Credential flow:
//! 1. Lifecycle layer calls `token::sign_in()` or `token::sign_up()`
//! 2. Pair stored via `CredentialStore::write()` with `CREDENTIAL_TTL`
//! 3. On expiry the coordinator calls `token::refresh_session()`
//! 4. Renewed pair replaces the old one wholesale via `CredentialStore::write()`
//! 5. Sign-out or invalidation calls `CredentialStore::clear()`

pub mod constants;
pub mod credentials;
pub mod error;
pub mod token;

pub use constants::*;
pub use credentials::{CredentialPair, CredentialStore, FileStore, MemoryStore, StoreFuture};
pub use error::{Error, Result};
pub use token::{SignInCredentials, TokenResponse, refresh_session, sign_in, sign_up};
