//! Client facade wiring settings, the identity provider, and the storage exchanger into one
//! [`CredentialCache`], and deriving catalog URLs, HTTP headers, and storage sessions from it.

// self
use crate::{
	_prelude::*,
	auth::{IdentityBundle, StorageBundle, StorageSession},
	cache::{CredentialCache, CredentialMetrics},
	config::Settings,
	error::{ConfigError, UploadError},
	exchange::StorageExchanger,
	identity::IdentityProvider,
	upload::{self, ObjectSink, UploadOptions, UploadReport},
};
#[cfg(feature = "reqwest")]
use crate::{
	config::SettingsSource,
	exchange::ReqwestStsExchanger,
	http::{ReqwestHttpClient, ReqwestTransportErrorMapper},
	identity::{IdentityEndpoints, ReqwestIdentityProvider},
};

/// Path segment of the catalog API below the endpoint URL.
pub const CATALOG_SEGMENT: &str = "stac";

/// Entry point for catalog and storage callers.
///
/// Accessors that may renew credentials take `&mut self`; wrap the client in a lock to share it
/// across threads.
#[derive(Debug)]
pub struct Client {
	settings: Settings,
	cache: CredentialCache,
}
impl Client {
	/// Creates a client over caller-provided capabilities.
	pub fn new(
		settings: Settings,
		identity_provider: Arc<dyn IdentityProvider>,
		exchanger: Arc<dyn StorageExchanger>,
	) -> Self {
		let cache = CredentialCache::from_settings(&settings, identity_provider, exchanger);

		Self { settings, cache }
	}

	/// Creates a client with the default OAuth identity provider and STS exchanger.
	///
	/// Settings come from `settings` when given, otherwise from `env_file` layered under the
	/// process environment. Supplying both is a [`ConfigError::ConfigurationConflict`].
	#[cfg(feature = "reqwest")]
	pub fn connect(env_file: Option<&Path>, settings: Option<Settings>) -> Result<Self> {
		let settings = SettingsSource::resolve(env_file, settings)?;
		let http_client = Arc::new(ReqwestHttpClient::without_redirects()?);
		let error_mapper = Arc::new(ReqwestTransportErrorMapper);
		let endpoints = IdentityEndpoints::from_settings(&settings)?;
		let sts_endpoint = match &settings.sts_endpoint {
			Some(endpoint) => endpoint.clone(),
			None => crate::exchange::sts_endpoint(&settings.aws_region)?,
		};

		#[cfg(feature = "tracing")]
		tracing::debug!(
			token_endpoint = %endpoints.token,
			sts_endpoint = %sts_endpoint,
			"wiring default credential providers"
		);

		let identity = ReqwestIdentityProvider::with_http_client(
			settings.client_id.clone(),
			endpoints,
			http_client.clone(),
			error_mapper.clone(),
		)?;
		let exchanger =
			ReqwestStsExchanger::with_http_client(sts_endpoint, http_client, error_mapper);

		Ok(Self::new(settings, Arc::new(identity), Arc::new(exchanger)))
	}

	/// Settings the client was built from.
	pub fn settings(&self) -> &Settings {
		&self.settings
	}

	/// Activity counters of the underlying cache.
	pub fn metrics(&self) -> Arc<CredentialMetrics> {
		self.cache.metrics()
	}

	/// Underlying credential cache.
	pub fn cache(&self) -> &CredentialCache {
		&self.cache
	}

	/// Mutable access to the underlying credential cache.
	pub fn cache_mut(&mut self) -> &mut CredentialCache {
		&mut self.cache
	}

	/// Catalog API base: the endpoint URL with one `stac` segment appended.
	pub fn catalog_url(&self) -> Url {
		let mut url = self.settings.endpoint_url.clone();

		// Settings only admit base URLs, so the segments are always available.
		if let Ok(mut segments) = url.path_segments_mut() {
			segments.pop_if_empty().push(CATALOG_SEGMENT);
		}

		url
	}

	/// Returns `true` unless the cached identity expires strictly in the future.
	pub fn is_expired(&self) -> bool {
		self.cache.is_expired()
	}

	/// Valid identity credentials, renewed first when expired.
	pub fn identity_credentials(&mut self) -> Result<&IdentityBundle> {
		self.cache.identity_credentials()
	}

	/// Storage credentials derived from a valid identity.
	pub fn storage_credentials(&mut self) -> Result<&StorageBundle> {
		self.cache.storage_credentials()
	}

	/// Ensures both bundles are valid; `force` renews them regardless of expiry.
	pub fn refresh_credentials(&mut self, force: bool) -> Result<()> {
		self.cache.refresh_credentials(force)
	}

	/// Drops both bundles; the next access starts with interactive login.
	pub fn clear_credentials(&mut self) {
		self.cache.clear_credentials();
	}

	/// JSON request headers authorized with the current bearer token.
	pub fn headers(&mut self) -> Result<BTreeMap<String, String>> {
		let identity = self.cache.identity_credentials()?;

		Ok(BTreeMap::from([
			("Content-Type".into(), "application/json".into()),
			("Accept".into(), "application/json".into()),
			("Authorization".into(), format!("Bearer {}", identity.bearer_token.expose())),
		]))
	}

	/// Storage session built from the current storage credentials and the configured region.
	pub fn session(&mut self) -> Result<StorageSession> {
		let region = self.settings.aws_region.clone();

		Ok(self.cache.storage_credentials()?.session(region))
	}

	/// Uploads every file below `input_dir` to the configured upload bucket.
	///
	/// Keys are `<input dir name>/<relative path>`. A fresh session is requested per file so
	/// long uploads renew credentials as they expire.
	pub fn upload<S>(
		&mut self,
		input_dir: impl AsRef<Path>,
		sink: &S,
		options: &UploadOptions,
	) -> Result<UploadReport>
	where
		S: ?Sized + ObjectSink,
	{
		let input_dir = input_dir.as_ref();

		if !input_dir.exists() {
			return Err(UploadError::InputNotFound { path: input_dir.to_path_buf() }.into());
		}

		let bucket =
			self.settings.upload_bucket.clone().ok_or(ConfigError::MissingUploadBucket)?;
		let files = upload::iter_files(input_dir, &options.exclude)?;

		#[cfg(feature = "tracing")]
		tracing::info!(
			count = files.len(),
			bucket = %bucket,
			overwrite = options.overwrite,
			"uploading files"
		);

		upload::upload_files(&files, input_dir, &bucket, sink, options, || self.session())
	}
}
