//! Secret lookup for the invocation stack.
//!
//! Secrets are read once at startup through a [`SecretStore`]; nothing here
//! caches values or refreshes them later.

pub mod error;
pub mod langfuse;
pub mod store;

pub use error::SecretError;
pub use langfuse::LangfuseCredentials;
pub use store::{AwsSecretsManagerStore, SecretStore, StaticSecretStore};
