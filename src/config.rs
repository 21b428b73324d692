//! Layered settings: process environment over an env file, or an explicit settings object.
//!
//! Keys carry the `PRESCIENT_` prefix and match case-insensitively. The identity keys also
//! accept an `AZURE_` infix (`PRESCIENT_AZURE_TENANT_ID`) for compatibility with existing
//! env files.

pub mod builder;

pub use builder::SettingsBuilder;

// self
use crate::{_prelude::*, error::ConfigError};

/// Prefix shared by every environment key.
pub const ENV_PREFIX: &str = "PRESCIENT_";
/// Env file consulted by [`Settings::from_env`] when present in the working directory.
pub const DEFAULT_ENV_FILE: &str = "config.env";

/// Immutable client settings.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Settings {
	/// Catalog API base URL.
	pub endpoint_url: Url,
	/// Object-storage region.
	pub aws_region: String,
	/// Role assumed during the credential exchange.
	pub aws_role: String,
	/// Identity tenant identifier.
	pub tenant_id: String,
	/// Identity client identifier.
	pub client_id: String,
	/// Identity provider base URL; the tenant is joined onto it.
	pub auth_url: Url,
	/// Token endpoint path below the tenant authority.
	pub auth_token_path: String,
	/// Authorization endpoint path below the tenant authority.
	pub auth_authorize_path: String,
	/// Engine-controlled validity of both credential bundles.
	pub credential_validity: Duration,
	/// Session name recorded by the exchange service.
	pub session_name: String,
	/// Override of the regional exchange endpoint.
	pub sts_endpoint: Option<Url>,
	/// Destination bucket for uploads.
	pub upload_bucket: Option<String>,
}
impl Settings {
	/// Minimum storage role length; shorter values cannot be well-formed role ARNs.
	pub const MIN_ROLE_LEN: usize = 20;
	/// Default credential validity.
	pub const DEFAULT_VALIDITY: Duration = Duration::hours(1);
	/// Shortest session the exchange service grants.
	pub const MIN_VALIDITY: Duration = Duration::minutes(15);
	/// Longest session the exchange service grants.
	pub const MAX_VALIDITY: Duration = Duration::hours(12);
	/// Default exchange session name.
	pub const DEFAULT_SESSION_NAME: &str = "prescient-s3-access";
	/// Default authorization endpoint path.
	pub const DEFAULT_AUTHORIZE_PATH: &str = "/oauth2/v2.0/authorize";

	/// Starts an explicit settings builder.
	pub fn builder() -> SettingsBuilder {
		SettingsBuilder::default()
	}

	/// Loads settings from the process environment layered over `config.env`, if present.
	pub fn from_env() -> Result<Self> {
		let default_file = Path::new(DEFAULT_ENV_FILE);
		let file_vars = if default_file.is_file() { read_env_file(default_file)? } else { Vec::new() };

		Self::from_vars(file_vars.into_iter().chain(process_vars()))
	}

	/// Loads settings from the process environment layered over the named env file.
	pub fn from_env_file(path: impl AsRef<Path>) -> Result<Self> {
		let path = path.as_ref();

		if !path.is_file() {
			return Err(ConfigError::ConfigurationNotFound { path: path.to_path_buf() }.into());
		}

		#[cfg(feature = "tracing")]
		tracing::info!(path = %path.display(), "loading configuration variables");

		Self::from_vars(read_env_file(path)?.into_iter().chain(process_vars()))
	}

	/// Builds settings from key/value pairs; later pairs override earlier ones.
	///
	/// Keys without the [`ENV_PREFIX`] are ignored.
	pub fn from_vars<I, K, V>(vars: I) -> Result<Self>
	where
		I: IntoIterator<Item = (K, V)>,
		K: AsRef<str>,
		V: Into<String>,
	{
		let mut map = BTreeMap::new();

		for (key, value) in vars {
			let key = key.as_ref().to_ascii_lowercase();

			if let Some(name) = key.strip_prefix(&ENV_PREFIX.to_ascii_lowercase()) {
				map.insert(normalize_key(name).to_owned(), value.into());
			}
		}

		let deserializer =
			serde::de::value::MapDeserializer::<_, serde::de::value::Error>::new(map.into_iter());
		let raw: RawSettings = serde_path_to_error::deserialize(deserializer).map_err(|e| {
			ConfigError::InvalidSettings { path: e.path().to_string(), source: e.into_inner() }
		})?;

		raw.into_builder()?.build()
	}

	fn validate(&self) -> Result<(), ConfigError> {
		for (name, value) in [
			("aws_region", &self.aws_region),
			("tenant_id", &self.tenant_id),
			("client_id", &self.client_id),
			("auth_token_path", &self.auth_token_path),
			("auth_authorize_path", &self.auth_authorize_path),
			("session_name", &self.session_name),
		] {
			if value.trim().is_empty() {
				return Err(ConfigError::EmptySetting { name });
			}
		}

		let role_len = self.aws_role.chars().count();

		if role_len < Self::MIN_ROLE_LEN {
			return Err(ConfigError::RoleTooShort { min: Self::MIN_ROLE_LEN, actual: role_len });
		}
		if self.credential_validity < Self::MIN_VALIDITY
			|| self.credential_validity > Self::MAX_VALIDITY
		{
			return Err(ConfigError::ValidityOutOfRange {
				seconds: self.credential_validity.whole_seconds(),
				min: Self::MIN_VALIDITY.whole_seconds(),
				max: Self::MAX_VALIDITY.whole_seconds(),
			});
		}
		if matches!(&self.upload_bucket, Some(bucket) if bucket.trim().is_empty()) {
			return Err(ConfigError::EmptySetting { name: "upload_bucket" });
		}

		validate_base_url("endpoint_url", &self.endpoint_url)?;
		validate_base_url("auth_url", &self.auth_url)?;

		if let Some(url) = &self.sts_endpoint {
			validate_base_url("sts_endpoint", url)?;
		}

		Ok(())
	}
}

/// Where the facade obtains its settings.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SettingsSource {
	/// Process environment layered over `config.env`.
	Environment,
	/// Process environment layered over the named env file.
	EnvFile(PathBuf),
	/// Settings supplied by the caller.
	Explicit(Settings),
}
impl SettingsSource {
	/// Picks the source from the facade's optional arguments.
	///
	/// Supplying both an env file and a settings object is a
	/// [`ConfigError::ConfigurationConflict`].
	pub fn from_parts(env_file: Option<&Path>, settings: Option<Settings>) -> Result<Self> {
		match (env_file, settings) {
			(Some(_), Some(_)) => Err(ConfigError::ConfigurationConflict.into()),
			(Some(path), None) => Ok(Self::EnvFile(path.to_path_buf())),
			(None, Some(settings)) => Ok(Self::Explicit(settings)),
			(None, None) => Ok(Self::Environment),
		}
	}

	/// Produces the settings for this source.
	pub fn load(self) -> Result<Settings> {
		match self {
			Self::Environment => Settings::from_env(),
			Self::EnvFile(path) => Settings::from_env_file(path),
			Self::Explicit(settings) => {
				settings.validate()?;

				Ok(settings)
			},
		}
	}

	/// Shorthand for [`from_parts`](Self::from_parts) followed by [`load`](Self::load).
	pub fn resolve(env_file: Option<&Path>, settings: Option<Settings>) -> Result<Settings> {
		Self::from_parts(env_file, settings)?.load()
	}
}

/// Flat string view of the environment; empty values count as unset.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawSettings {
	endpoint_url: String,
	aws_region: String,
	aws_role: String,
	tenant_id: String,
	client_id: String,
	auth_url: String,
	auth_token_path: String,
	auth_authorize_path: String,
	credential_validity_seconds: String,
	session_name: String,
	sts_endpoint: String,
	upload_bucket: String,
}
impl RawSettings {
	fn into_builder(self) -> Result<SettingsBuilder, ConfigError> {
		let credential_validity = non_empty(self.credential_validity_seconds)
			.map(|value| {
				value.trim().parse::<i64>().map(Duration::seconds).map_err(|_| {
					ConfigError::InvalidInteger { name: "credential_validity_seconds", value }
				})
			})
			.transpose()?;

		Ok(SettingsBuilder {
			endpoint_url: non_empty(self.endpoint_url)
				.map(|value| parse_url("endpoint_url", value))
				.transpose()?,
			aws_region: non_empty(self.aws_region),
			aws_role: non_empty(self.aws_role),
			tenant_id: non_empty(self.tenant_id),
			client_id: non_empty(self.client_id),
			auth_url: non_empty(self.auth_url).map(|value| parse_url("auth_url", value)).transpose()?,
			auth_token_path: non_empty(self.auth_token_path),
			auth_authorize_path: non_empty(self.auth_authorize_path),
			credential_validity,
			session_name: non_empty(self.session_name),
			sts_endpoint: non_empty(self.sts_endpoint)
				.map(|value| parse_url("sts_endpoint", value))
				.transpose()?,
			upload_bucket: non_empty(self.upload_bucket),
		})
	}
}

fn non_empty(value: String) -> Option<String> {
	if value.trim().is_empty() { None } else { Some(value) }
}

fn normalize_key(name: &str) -> &str {
	match name {
		"azure_tenant_id" => "tenant_id",
		"azure_client_id" => "client_id",
		"azure_auth_url" => "auth_url",
		"azure_auth_token_path" => "auth_token_path",
		"azure_auth_authorize_path" => "auth_authorize_path",
		other => other,
	}
}

// dotenv 0.15 deprecates its iterator API without a replacement that leaves the process
// environment untouched. Pairs must be merged with explicit settings, not exported.
#[allow(deprecated)]
fn read_env_file(path: &Path) -> Result<Vec<(String, String)>, ConfigError> {
	dotenv::from_path_iter(path)
		.and_then(|iter| iter.collect::<Result<Vec<_>, _>>())
		.map_err(|source| ConfigError::EnvFile { path: path.to_path_buf(), source })
}

fn process_vars() -> impl Iterator<Item = (String, String)> {
	std::env::vars_os()
		.filter_map(|(key, value)| Some((key.into_string().ok()?, value.into_string().ok()?)))
}

pub(crate) fn parse_url(name: &'static str, value: String) -> Result<Url, ConfigError> {
	Url::parse(value.trim()).map_err(|_| ConfigError::InvalidUrl { name, value })
}

fn validate_base_url(name: &'static str, url: &Url) -> Result<(), ConfigError> {
	if matches!(url.scheme(), "http" | "https") && !url.cannot_be_a_base() {
		Ok(())
	} else {
		Err(ConfigError::InvalidUrl { name, value: url.to_string() })
	}
}
