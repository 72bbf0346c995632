//! Secret types for protecting sensitive values from accidental logging.
//!
//! Re-exports the [`secrecy`] types used for the backend bearer token and any
//! other credential the session layer handles. `SecretString` implements
//! `Debug` with redaction, so a struct deriving `Debug` that holds one is safe
//! to pass to `tracing`.
//!
//! # Example
//!
//! ```rust
//! use common::secret::{ExposeSecret, SecretString};
//!
//! #[derive(Debug)]
//! struct LocalIdentity {
//!     user_id: String,
//!     token: SecretString,
//! }
//!
//! let identity = LocalIdentity {
//!     user_id: "lecturer-7".to_string(),
//!     token: SecretString::from("eyJhbGciOi"),
//! };
//!
//! assert!(!format!("{identity:?}").contains("eyJhbGciOi"));
//! assert_eq!(identity.token.expose_secret(), "eyJhbGciOi");
//! ```

pub use secrecy::{ExposeSecret, SecretString};
