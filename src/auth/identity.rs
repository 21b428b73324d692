//! Identity credential bundles and the raw grants identity providers return.

// self
use crate::{_prelude::*, auth::TokenSecret};

/// Lifecycle status of a cached credential bundle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CredentialStatus {
	/// The engine-controlled expiry lies strictly in the future.
	Active,
	/// The expiry passed or was cleared by a forced refresh.
	Expired,
}

/// Raw result of an interactive acquisition or a refresh-token exchange.
///
/// Providers fill in whatever the upstream returned; the cache validates the grant before it
/// replaces anything.
#[derive(Clone, Default)]
pub struct IdentityGrant {
	/// Bearer token presented to the catalog and the storage exchange (OpenID `id_token`).
	pub bearer_token: Option<TokenSecret>,
	/// OAuth access token, when the provider issued one.
	pub access_token: Option<TokenSecret>,
	/// Refresh token used for silent renewal.
	pub refresh_token: Option<TokenSecret>,
	/// Provider expiry hint. Recorded, never used for cache timing.
	pub expires_in: Option<Duration>,
	/// Decoded identity claims, passed through unused.
	pub claims: Option<serde_json::Value>,
}
impl IdentityGrant {
	/// Creates a grant carrying the provided bearer token.
	pub fn new(bearer_token: impl Into<String>) -> Self {
		Self { bearer_token: Some(TokenSecret::new(bearer_token)), ..Default::default() }
	}

	/// Attaches a refresh token.
	pub fn with_refresh_token(mut self, token: impl Into<String>) -> Self {
		self.refresh_token = Some(TokenSecret::new(token));

		self
	}

	/// Attaches an OAuth access token.
	pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
		self.access_token = Some(TokenSecret::new(token));

		self
	}

	/// Records the provider's expiry hint.
	pub fn with_expires_in(mut self, expires_in: Duration) -> Self {
		self.expires_in = Some(expires_in);

		self
	}

	/// Attaches decoded claims.
	pub fn with_claims(mut self, claims: serde_json::Value) -> Self {
		self.claims = Some(claims);

		self
	}

	/// Validates the grant and stamps the engine-controlled expiry onto a new bundle.
	///
	/// The expiry is `issued_at + validity`; the provider's `expires_in` is kept for inspection
	/// only. A missing or empty bearer token is an [`Error::AuthenticationFailure`].
	pub fn into_bundle(self, issued_at: OffsetDateTime, validity: Duration) -> Result<IdentityBundle> {
		let bearer_token = self
			.bearer_token
			.filter(|token| !token.is_empty())
			.ok_or_else(|| Error::authentication("identity provider returned no bearer token"))?;

		Ok(IdentityBundle {
			bearer_token,
			access_token: self.access_token.filter(|token| !token.is_empty()),
			refresh_token: self.refresh_token.filter(|token| !token.is_empty()),
			issued_at,
			expires_at: Some(issued_at + validity),
			provider_expires_in: self.expires_in,
			claims: self.claims,
		})
	}
}
impl Debug for IdentityGrant {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("IdentityGrant")
			.field("bearer_token", &self.bearer_token.as_ref().map(|_| "<redacted>"))
			.field("access_token", &self.access_token.as_ref().map(|_| "<redacted>"))
			.field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
			.field("expires_in", &self.expires_in)
			.field("claims_present", &self.claims.is_some())
			.finish()
	}
}

/// Cached identity credentials, replaced wholesale on every acquisition or refresh.
#[derive(Clone)]
pub struct IdentityBundle {
	/// Bearer token; callers must avoid logging it.
	pub bearer_token: TokenSecret,
	/// OAuth access token, if issued.
	pub access_token: Option<TokenSecret>,
	/// Refresh token, if issued.
	pub refresh_token: Option<TokenSecret>,
	/// Instant the acquisition started.
	pub issued_at: OffsetDateTime,
	/// Engine-controlled expiry; `None` means the bundle is expired.
	pub expires_at: Option<OffsetDateTime>,
	/// Expiry hint the provider sent alongside the token.
	pub provider_expires_in: Option<Duration>,
	/// Provider-specific claims, passed through unused.
	pub claims: Option<serde_json::Value>,
}
impl IdentityBundle {
	/// Creates an unexpiring-until-stamped bundle around the provided bearer token.
	///
	/// The bundle starts expired; use [`expiring_at`](Self::expiring_at) to stamp a validity
	/// window, mainly when seeding caches in tests.
	pub fn new(bearer_token: impl Into<String>) -> Self {
		Self {
			bearer_token: TokenSecret::new(bearer_token),
			access_token: None,
			refresh_token: None,
			issued_at: OffsetDateTime::now_utc(),
			expires_at: None,
			provider_expires_in: None,
			claims: None,
		}
	}

	/// Attaches a refresh token.
	pub fn with_refresh_token(mut self, token: impl Into<String>) -> Self {
		self.refresh_token = Some(TokenSecret::new(token));

		self
	}

	/// Overrides the engine-controlled expiry.
	pub fn expiring_at(mut self, instant: OffsetDateTime) -> Self {
		self.expires_at = Some(instant);

		self
	}

	/// Computes the lifecycle status at the provided instant.
	pub fn status_at(&self, instant: OffsetDateTime) -> CredentialStatus {
		match self.expires_at {
			Some(expires_at) if instant < expires_at => CredentialStatus::Active,
			_ => CredentialStatus::Expired,
		}
	}

	/// Returns `true` if the expiry lies strictly after `instant`.
	pub fn is_valid_at(&self, instant: OffsetDateTime) -> bool {
		matches!(self.status_at(instant), CredentialStatus::Active)
	}

	/// Clears the expiry so the bundle reads as expired regardless of remaining lifetime.
	pub fn invalidate(&mut self) {
		self.expires_at = None;
	}
}
impl Debug for IdentityBundle {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("IdentityBundle")
			.field("bearer_token", &"<redacted>")
			.field("access_token", &self.access_token.as_ref().map(|_| "<redacted>"))
			.field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
			.field("issued_at", &self.issued_at)
			.field("expires_at", &self.expires_at)
			.field("provider_expires_in", &self.provider_expires_in)
			.finish()
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use time::macros;
	// self
	use super::*;

	#[test]
	fn grant_expiry_ignores_provider_hint() {
		let issued = macros::datetime!(2025-01-01 00:00 UTC);
		let bundle = IdentityGrant::new("id-token")
			.with_refresh_token("refresh")
			.with_expires_in(Duration::seconds(5021))
			.into_bundle(issued, Duration::hours(1))
			.expect("Grant with a bearer token should convert.");

		assert_eq!(bundle.expires_at, Some(macros::datetime!(2025-01-01 01:00 UTC)));
		assert_eq!(bundle.provider_expires_in, Some(Duration::seconds(5021)));
		assert_eq!(bundle.refresh_token.as_ref().map(TokenSecret::expose), Some("refresh"));
	}

	#[test]
	fn grant_without_bearer_token_fails_authentication() {
		let now = OffsetDateTime::now_utc();
		let missing = IdentityGrant::default().with_access_token("access");
		let empty = IdentityGrant::new("");

		assert!(matches!(
			missing.into_bundle(now, Duration::hours(1)),
			Err(Error::AuthenticationFailure { .. })
		));
		assert!(matches!(
			empty.into_bundle(now, Duration::hours(1)),
			Err(Error::AuthenticationFailure { .. })
		));
	}

	#[test]
	fn status_requires_strictly_future_expiry() {
		let instant = macros::datetime!(2025-01-01 01:00 UTC);
		let mut bundle = IdentityBundle::new("token").expiring_at(instant);

		assert_eq!(bundle.status_at(macros::datetime!(2025-01-01 00:59 UTC)), CredentialStatus::Active);
		assert_eq!(bundle.status_at(instant), CredentialStatus::Expired);

		bundle.invalidate();

		assert!(!bundle.is_valid_at(macros::datetime!(2024-12-31 00:00 UTC)));
	}

	#[test]
	fn debug_output_redacts_tokens() {
		let bundle = IdentityBundle::new("very-secret").with_refresh_token("also-secret");
		let rendered = format!("{bundle:?}");

		assert!(!rendered.contains("very-secret"));
		assert!(!rendered.contains("also-secret"));
	}
}
