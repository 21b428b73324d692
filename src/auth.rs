//! Credential models: identity bundles, storage bundles, and the secret wrapper they share.

pub mod identity;
pub mod secret;
pub mod storage;

pub use identity::*;
pub use secret::*;
pub use storage::*;
