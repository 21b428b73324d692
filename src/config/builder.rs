//! Explicit, validated construction of [`Settings`].

// self
use crate::{_prelude::*, config::Settings, error::ConfigError};

/// Builder for [`Settings`] values.
#[derive(Clone, Debug, Default)]
pub struct SettingsBuilder {
	/// Catalog API base URL.
	pub endpoint_url: Option<Url>,
	/// Object-storage region.
	pub aws_region: Option<String>,
	/// Role assumed during the credential exchange.
	pub aws_role: Option<String>,
	/// Identity tenant identifier.
	pub tenant_id: Option<String>,
	/// Identity client identifier.
	pub client_id: Option<String>,
	/// Identity provider base URL.
	pub auth_url: Option<Url>,
	/// Token endpoint path.
	pub auth_token_path: Option<String>,
	/// Authorization endpoint path (defaults to [`Settings::DEFAULT_AUTHORIZE_PATH`]).
	pub auth_authorize_path: Option<String>,
	/// Credential validity (defaults to [`Settings::DEFAULT_VALIDITY`]).
	pub credential_validity: Option<Duration>,
	/// Exchange session name (defaults to [`Settings::DEFAULT_SESSION_NAME`]).
	pub session_name: Option<String>,
	/// Exchange endpoint override.
	pub sts_endpoint: Option<Url>,
	/// Upload destination bucket.
	pub upload_bucket: Option<String>,
}
impl SettingsBuilder {
	/// Sets the catalog API base URL.
	pub fn endpoint_url(mut self, url: Url) -> Self {
		self.endpoint_url = Some(url);

		self
	}

	/// Sets the object-storage region.
	pub fn aws_region(mut self, region: impl Into<String>) -> Self {
		self.aws_region = Some(region.into());

		self
	}

	/// Sets the role assumed during the exchange.
	pub fn aws_role(mut self, role: impl Into<String>) -> Self {
		self.aws_role = Some(role.into());

		self
	}

	/// Sets the identity tenant identifier.
	pub fn tenant_id(mut self, tenant_id: impl Into<String>) -> Self {
		self.tenant_id = Some(tenant_id.into());

		self
	}

	/// Sets the identity client identifier.
	pub fn client_id(mut self, client_id: impl Into<String>) -> Self {
		self.client_id = Some(client_id.into());

		self
	}

	/// Sets the identity provider base URL.
	pub fn auth_url(mut self, url: Url) -> Self {
		self.auth_url = Some(url);

		self
	}

	/// Sets the token endpoint path.
	pub fn auth_token_path(mut self, path: impl Into<String>) -> Self {
		self.auth_token_path = Some(path.into());

		self
	}

	/// Sets the authorization endpoint path.
	pub fn auth_authorize_path(mut self, path: impl Into<String>) -> Self {
		self.auth_authorize_path = Some(path.into());

		self
	}

	/// Overrides the credential validity.
	pub fn credential_validity(mut self, validity: Duration) -> Self {
		self.credential_validity = Some(validity);

		self
	}

	/// Overrides the exchange session name.
	pub fn session_name(mut self, name: impl Into<String>) -> Self {
		self.session_name = Some(name.into());

		self
	}

	/// Overrides the exchange endpoint.
	pub fn sts_endpoint(mut self, url: Url) -> Self {
		self.sts_endpoint = Some(url);

		self
	}

	/// Sets the upload destination bucket.
	pub fn upload_bucket(mut self, bucket: impl Into<String>) -> Self {
		self.upload_bucket = Some(bucket.into());

		self
	}

	/// Consumes the builder and validates the resulting settings.
	pub fn build(self) -> Result<Settings> {
		let missing = |name| ConfigError::MissingSetting { name };
		let settings = Settings {
			endpoint_url: self.endpoint_url.ok_or_else(|| missing("endpoint_url"))?,
			aws_region: self.aws_region.ok_or_else(|| missing("aws_region"))?,
			aws_role: self.aws_role.ok_or_else(|| missing("aws_role"))?,
			tenant_id: self.tenant_id.ok_or_else(|| missing("tenant_id"))?,
			client_id: self.client_id.ok_or_else(|| missing("client_id"))?,
			auth_url: self.auth_url.ok_or_else(|| missing("auth_url"))?,
			auth_token_path: self.auth_token_path.ok_or_else(|| missing("auth_token_path"))?,
			auth_authorize_path: self
				.auth_authorize_path
				.unwrap_or_else(|| Settings::DEFAULT_AUTHORIZE_PATH.into()),
			credential_validity: self.credential_validity.unwrap_or(Settings::DEFAULT_VALIDITY),
			session_name: self
				.session_name
				.unwrap_or_else(|| Settings::DEFAULT_SESSION_NAME.into()),
			sts_endpoint: self.sts_endpoint,
			upload_bucket: self.upload_bucket,
		};

		settings.validate()?;

		Ok(settings)
	}
}
