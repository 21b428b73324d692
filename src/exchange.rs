//! Storage credential exchange capability.
//!
//! The credential cache depends only on [`StorageExchanger`]; [`StsExchanger`] is the wired
//! implementation calling the AWS STS `AssumeRoleWithWebIdentity` API.

pub mod sts;

pub use sts::*;

// self
use crate::{_prelude::*, auth::StorageBundle};

/// Parameters of one bearer-token-for-credentials exchange.
#[derive(Clone, Copy)]
pub struct AssumeRoleRequest<'a> {
	/// Requested session length.
	pub duration: Duration,
	/// Role to assume.
	pub role_arn: &'a str,
	/// Session name recorded by the exchange service.
	pub session_name: &'a str,
	/// Bearer token proving the caller's identity.
	pub web_identity_token: &'a str,
}
impl Debug for AssumeRoleRequest<'_> {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("AssumeRoleRequest")
			.field("duration", &self.duration)
			.field("role_arn", &self.role_arn)
			.field("session_name", &self.session_name)
			.field("web_identity_token", &"<redacted>")
			.finish()
	}
}

/// Credentials payload carried by a successful exchange.
#[derive(Clone, PartialEq, Eq)]
pub struct StorageCredentialsPayload {
	/// Access key identifier.
	pub access_key_id: String,
	/// Secret access key.
	pub secret_access_key: String,
	/// Session token.
	pub session_token: String,
	/// Expiration as reported by the service, in any offset.
	pub expiration: OffsetDateTime,
}
impl Debug for StorageCredentialsPayload {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("StorageCredentialsPayload")
			.field("access_key_id", &self.access_key_id)
			.field("secret_access_key", &"<redacted>")
			.field("session_token", &"<redacted>")
			.field("expiration", &self.expiration)
			.finish()
	}
}

/// Raw exchange outcome; the payload may be absent.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ExchangeResult {
	/// Credentials payload, when the service returned one.
	pub credentials: Option<StorageCredentialsPayload>,
}
impl ExchangeResult {
	/// Wraps a credentials payload.
	pub fn new(credentials: StorageCredentialsPayload) -> Self {
		Self { credentials: Some(credentials) }
	}

	/// Validates the payload and converts it into a UTC-normalized bundle.
	///
	/// An absent payload, or one without an access key, is a
	/// [`Error::CredentialExchangeFailure`].
	pub fn into_bundle(self) -> Result<StorageBundle> {
		let payload = self
			.credentials
			.filter(|payload| !payload.access_key_id.is_empty())
			.ok_or_else(|| Error::exchange("exchange service returned no credentials"))?;

		Ok(StorageBundle::new(
			payload.access_key_id,
			payload.secret_access_key,
			payload.session_token,
			payload.expiration,
		))
	}
}

/// Source of temporary storage credentials.
pub trait StorageExchanger
where
	Self: Send + Sync,
{
	/// Trades a bearer token for temporary credentials on `request.role_arn`.
	fn assume_role_with_web_identity(
		&self,
		request: &AssumeRoleRequest<'_>,
	) -> Result<ExchangeResult>;
}
