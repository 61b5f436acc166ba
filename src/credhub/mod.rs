//! Credential store access.
//!
//! The rotation orchestrator depends only on the [`CredentialStore`] trait. Two
//! implementations ship with the crate:
//!
//! - [`HttpCredentialStore`]: Credhub over HTTPS with OAuth2 client-credentials auth
//! - [`InMemoryCredentialStore`]: an in-process store with the same version semantics,
//!   used by tests and for rehearsing a rotation
//!
//! # Example
//!
//! ```rust,ignore
//! use certrotate::config::RotationConfig;
//! use certrotate::credhub::{CredentialStore, HttpCredentialStore};
//!
//! let config = RotationConfig::from_env()?;
//! let store = HttpCredentialStore::new(&config.credhub)?;
//! for name in store.list_credentials(&config.prefix).await? {
//!     println!("{}", name);
//! }
//! ```

pub mod client;
pub mod http;
pub mod memory;
pub mod secret;
pub mod types;

pub use client::CredentialStore;
pub use http::HttpCredentialStore;
pub use memory::{InMemoryCredentialStore, OperationKind, StoreOperation};
pub use secret::SecretString;
pub use types::{CertificateValue, CredentialValue, CredentialVersion};
