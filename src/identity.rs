//! Identity provider capability: interactive acquisition and silent refresh.
//!
//! The credential cache depends only on [`IdentityProvider`]; [`OAuthIdentityProvider`] is the
//! wired implementation speaking OAuth 2.0 / OpenID Connect, and tests substitute doubles.

pub mod classify;
pub mod endpoints;
pub mod loopback;
pub mod oauth;
pub mod pkce;
pub mod prompt;

pub use classify::*;
pub use endpoints::*;
pub use loopback::*;
pub use oauth::*;
pub use pkce::*;
pub use prompt::*;

// crates.io
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
// self
use crate::{_prelude::*, auth::IdentityGrant};

/// Scopes requested on every acquisition and refresh.
pub const IDENTITY_SCOPES: [&str; 3] = ["openid", "profile", "offline_access"];

/// Source of identity tokens.
///
/// Implementations return whatever the upstream produced; validation (non-empty bearer token)
/// and expiry stamping happen in the cache before anything is replaced.
pub trait IdentityProvider
where
	Self: Send + Sync,
{
	/// Runs the first-time login flow, possibly involving the user out of band.
	fn acquire_interactive(&self, scopes: &[&str]) -> Result<IdentityGrant>;

	/// Renews the identity silently with a previously issued refresh token.
	fn acquire_by_refresh(&self, refresh_token: &str, scopes: &[&str]) -> Result<IdentityGrant>;
}

/// Decodes the unverified claims segment of a JWT.
///
/// Returns `None` for tokens that are not three-part JWTs or whose payload is not JSON.
pub fn decode_claims(token: &str) -> Option<serde_json::Value> {
	let mut parts = token.split('.');
	let payload = parts.nth(1)?;

	parts.next()?;

	let bytes = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')).ok()?;

	serde_json::from_slice(&bytes).ok()
}
