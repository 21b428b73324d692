//! Identity provider endpoint derivation.

// self
use crate::{_prelude::*, config::Settings, error::ConfigError};

/// Resolved identity provider URLs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IdentityEndpoints {
	/// Tenant authority (`auth_url` joined with the tenant identifier).
	pub authority: Url,
	/// Token endpoint used for code redemption and refresh.
	pub token: Url,
	/// Authorization endpoint visited during interactive login.
	pub authorization: Url,
}
impl IdentityEndpoints {
	/// Derives the endpoints from validated settings.
	pub fn from_settings(settings: &Settings) -> Result<Self> {
		Self::new(
			&settings.auth_url,
			&settings.tenant_id,
			&settings.auth_token_path,
			&settings.auth_authorize_path,
		)
	}

	/// Derives the endpoints from their raw parts.
	///
	/// The tenant is resolved against `auth_url` with standard relative-reference rules, so a
	/// trailing slash on `auth_url` keeps its last path segment.
	pub fn new(
		auth_url: &Url,
		tenant_id: &str,
		token_path: &str,
		authorize_path: &str,
	) -> Result<Self> {
		let authority = auth_url.join(tenant_id).map_err(|_| ConfigError::InvalidUrl {
			name: "tenant_id",
			value: tenant_id.to_owned(),
		})?;
		let token = append_path(&authority, token_path, "auth_token_path")?;
		let authorization = append_path(&authority, authorize_path, "auth_authorize_path")?;

		Ok(Self { authority, token, authorization })
	}
}

/// Appends `suffix` to the path of `base` with exactly one separating slash.
pub(crate) fn append_path(base: &Url, suffix: &str, name: &'static str) -> Result<Url> {
	let mut url = base.clone();

	url.path_segments_mut()
		.map_err(|_| ConfigError::InvalidUrl { name, value: base.to_string() })?
		.pop_if_empty()
		.extend(suffix.split('/').filter(|segment| !segment.is_empty()));

	Ok(url)
}
