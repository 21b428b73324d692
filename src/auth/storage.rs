//! Temporary object-storage credentials and the sessions derived from them.

// crates.io
use time::UtcOffset;
// self
use crate::{_prelude::*, auth::TokenSecret};

/// Temporary object-storage credentials minted by the exchange service.
///
/// The `expiration` field is informational. Reuse is governed by the identity bundle's expiry,
/// so a storage bundle whose own expiration has passed is still handed out while the identity
/// remains valid.
#[derive(Clone)]
pub struct StorageBundle {
	/// Access key identifier.
	pub access_key_id: String,
	/// Secret access key.
	pub secret_access_key: TokenSecret,
	/// Session token.
	pub session_token: TokenSecret,
	/// Expiration reported by the exchange service, normalized to UTC.
	pub expiration: OffsetDateTime,
}
impl StorageBundle {
	/// Creates a bundle, normalizing `expiration` to UTC.
	pub fn new(
		access_key_id: impl Into<String>,
		secret_access_key: impl Into<String>,
		session_token: impl Into<String>,
		expiration: OffsetDateTime,
	) -> Self {
		Self {
			access_key_id: access_key_id.into(),
			secret_access_key: TokenSecret::new(secret_access_key),
			session_token: TokenSecret::new(session_token),
			expiration: expiration.to_offset(UtcOffset::UTC),
		}
	}

	/// Builds a storage session bound to `region`.
	pub fn session(&self, region: impl Into<String>) -> StorageSession {
		StorageSession {
			access_key_id: self.access_key_id.clone(),
			secret_access_key: self.secret_access_key.clone(),
			session_token: self.session_token.clone(),
			region: region.into(),
		}
	}
}
impl Debug for StorageBundle {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("StorageBundle")
			.field("access_key_id", &self.access_key_id)
			.field("secret_access_key", &"<redacted>")
			.field("session_token", &"<redacted>")
			.field("expiration", &self.expiration)
			.finish()
	}
}

/// Ready-to-use object-storage session configured with the cached credentials.
#[derive(Clone, PartialEq, Eq)]
pub struct StorageSession {
	access_key_id: String,
	secret_access_key: TokenSecret,
	session_token: TokenSecret,
	region: String,
}
impl StorageSession {
	/// Access key identifier.
	pub fn access_key_id(&self) -> &str {
		&self.access_key_id
	}

	/// Secret access key.
	pub fn secret_access_key(&self) -> &str {
		self.secret_access_key.expose()
	}

	/// Session token.
	pub fn session_token(&self) -> &str {
		self.session_token.expose()
	}

	/// Storage region.
	pub fn region(&self) -> &str {
		&self.region
	}

	/// Renders the session as the conventional `AWS_*` environment variables.
	pub fn env_vars(&self) -> BTreeMap<&'static str, String> {
		BTreeMap::from([
			("AWS_ACCESS_KEY_ID", self.access_key_id.clone()),
			("AWS_SECRET_ACCESS_KEY", self.secret_access_key.expose().to_owned()),
			("AWS_SESSION_TOKEN", self.session_token.expose().to_owned()),
			("AWS_REGION", self.region.clone()),
		])
	}
}
impl Debug for StorageSession {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("StorageSession")
			.field("access_key_id", &self.access_key_id)
			.field("secret_access_key", &"<redacted>")
			.field("session_token", &"<redacted>")
			.field("region", &self.region)
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
	fn bundle_expiration_is_normalized_to_utc() {
		let bundle =
			StorageBundle::new("AKIA", "secret", "token", macros::datetime!(2025-01-01 02:00 +02:00));

		assert_eq!(bundle.expiration.offset(), UtcOffset::UTC);
		assert_eq!(bundle.expiration, macros::datetime!(2025-01-01 00:00 UTC));
	}

	#[test]
	fn session_exposes_credentials_and_region() {
		let session = StorageBundle::new("AKIA", "secret", "token", OffsetDateTime::now_utc())
			.session("eu-west-1");
		let vars = session.env_vars();

		assert_eq!(session.access_key_id(), "AKIA");
		assert_eq!(session.region(), "eu-west-1");
		assert_eq!(vars.get("AWS_SECRET_ACCESS_KEY").map(String::as_str), Some("secret"));
		assert_eq!(vars.get("AWS_SESSION_TOKEN").map(String::as_str), Some("token"));
	}

	#[test]
	fn debug_output_redacts_secrets() {
		let bundle = StorageBundle::new("AKIA", "s3cr3t", "t0k3n", OffsetDateTime::now_utc());
		let rendered = format!("{bundle:?} {:?}", bundle.session("us-east-1"));

		assert!(rendered.contains("AKIA"));
		assert!(!rendered.contains("s3cr3t"));
		assert!(!rendered.contains("t0k3n"));
	}
}
