//! Secret types for protecting sensitive values from accidental logging.
//!
//! Re-exports the [`secrecy`] types used throughout admin-check for service
//! tokens, OAuth client secrets and raw bearer tokens. `SecretString`
//! implements `Debug` with redaction, so structs deriving `Debug` stay safe to
//! log, and the value is zeroized on drop.
//!
//! # Example
//!
//! ```rust
//! use common::secret::{ExposeSecret, SecretString};
//!
//! #[derive(Debug)]
//! struct DirectoryCredentials {
//!     client_id: String,
//!     client_secret: SecretString,
//! }
//!
//! let creds = DirectoryCredentials {
//!     client_id: "app-registration".to_string(),
//!     client_secret: SecretString::from("s3cr3t"),
//! };
//!
//! assert!(!format!("{creds:?}").contains("s3cr3t"));
//! assert_eq!(creds.client_secret.expose_secret(), "s3cr3t");
//! ```

pub use secrecy::{ExposeSecret, SecretString};
