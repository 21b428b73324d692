//! Crate-level error types shared by the credential cache, its providers, and the facade.

// self
use crate::_prelude::*;

/// Crate-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Canonical error exposed by public APIs.
///
/// Nothing is retried internally; every variant surfaces synchronously from the accessor that
/// triggered it and retry policy stays with the caller.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Local configuration problem.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// Temporary upstream failure; retry with backoff.
	#[error(transparent)]
	Transient(#[from] TransientError),
	/// Transport failure (DNS, TCP, TLS).
	#[error(transparent)]
	Transport(#[from] TransportError),
	/// Upload helper failure.
	#[error(transparent)]
	Upload(#[from] UploadError),

	/// The identity provider returned no usable bearer token or rejected the grant.
	#[error("Identity provider authentication failed: {reason}.")]
	AuthenticationFailure {
		/// Provider- or client-supplied reason string.
		reason: String,
	},
	/// The storage exchange returned no credentials or rejected the bearer token.
	#[error("Storage credential exchange failed: {reason}.")]
	CredentialExchangeFailure {
		/// Exchange- or client-supplied reason string.
		reason: String,
	},
}
impl Error {
	pub(crate) fn authentication(reason: impl Into<String>) -> Self {
		Self::AuthenticationFailure { reason: reason.into() }
	}

	pub(crate) fn exchange(reason: impl Into<String>) -> Self {
		Self::CredentialExchangeFailure { reason: reason.into() }
	}
}

/// Configuration and validation failures raised while building settings or clients.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// Both an env file and an explicit settings object were supplied.
	#[error("Cannot provide both an environment file and a settings object.")]
	ConfigurationConflict,
	/// The named env file does not exist.
	#[error("Configuration file not found: {}.", .path.display())]
	ConfigurationNotFound {
		/// Path that was requested.
		path: PathBuf,
	},
	/// The env file exists but could not be parsed.
	#[error("Configuration file {} could not be read.", .path.display())]
	EnvFile {
		/// Path that failed to load.
		path: PathBuf,
		/// Underlying parser failure.
		#[source]
		source: dotenv::Error,
	},
	/// A setting is missing or has the wrong shape.
	#[error("Settings are invalid at `{path}`.")]
	InvalidSettings {
		/// Dotted path of the offending key.
		path: String,
		/// Underlying deserialization failure.
		#[source]
		source: serde::de::value::Error,
	},
	/// A required setting was never supplied.
	#[error("Setting `{name}` is required.")]
	MissingSetting {
		/// Setting name without the environment prefix.
		name: &'static str,
	},
	/// A required setting is empty.
	#[error("Setting `{name}` cannot be empty.")]
	EmptySetting {
		/// Setting name without the environment prefix.
		name: &'static str,
	},
	/// A URL-valued setting cannot be parsed or cannot act as a base URL.
	#[error("Setting `{name}` is not a valid base URL: {value}.")]
	InvalidUrl {
		/// Setting name without the environment prefix.
		name: &'static str,
		/// Raw value that failed validation.
		value: String,
	},
	/// An integer-valued setting cannot be parsed.
	#[error("Setting `{name}` is not a valid integer: {value}.")]
	InvalidInteger {
		/// Setting name without the environment prefix.
		name: &'static str,
		/// Raw value that failed parsing.
		value: String,
	},
	/// The storage role identifier is shorter than any well-formed role ARN.
	#[error("Storage role must be at least {min} characters long, got {actual}.")]
	RoleTooShort {
		/// Minimum accepted length.
		min: usize,
		/// Length that was supplied.
		actual: usize,
	},
	/// The credential validity cannot be requested from the exchange service.
	#[error("Credential validity of {seconds}s is outside the supported {min}..={max}s window.")]
	ValidityOutOfRange {
		/// Requested validity in seconds.
		seconds: i64,
		/// Lower bound in seconds.
		min: i64,
		/// Upper bound in seconds.
		max: i64,
	},
	/// Uploads need a destination bucket.
	#[error("Setting `upload_bucket` is required for uploads.")]
	MissingUploadBucket,
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: BoxError,
	},
	/// HTTP request construction failed.
	#[error(transparent)]
	HttpRequest(#[from] oauth2::http::Error),
	/// Endpoint URL rejected by the OAuth client.
	#[error("Identity endpoint URL is invalid.")]
	InvalidEndpoint {
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::HttpClientBuild { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for ConfigError {
	fn from(e: ReqwestError) -> Self {
		Self::http_client_build(e)
	}
}

/// Temporary failure variants (safe to retry).
#[derive(Debug, ThisError)]
pub enum TransientError {
	/// Token endpoint returned an unexpected but non-fatal response.
	#[error("Token endpoint returned an unexpected response: {message}.")]
	TokenEndpoint {
		/// Provider- or client-supplied message summarizing the failure.
		message: String,
		/// HTTP status code, when available.
		status: Option<u16>,
		/// Retry-After hint from upstream, if supplied.
		retry_after: Option<Duration>,
	},
	/// Token endpoint responded with JSON that could not be parsed.
	#[error("Token endpoint returned malformed JSON.")]
	TokenResponseParse {
		/// Structured parsing failure.
		#[source]
		source: serde_path_to_error::Error<serde_json::error::Error>,
		/// HTTP status code, when available.
		status: Option<u16>,
	},
	/// Exchange endpoint throttled the caller or failed server-side.
	#[error("Exchange endpoint returned an unexpected response: {message}.")]
	ExchangeEndpoint {
		/// Service-supplied message summarizing the failure.
		message: String,
		/// HTTP status code, when available.
		status: Option<u16>,
		/// Retry-After hint from upstream, if supplied.
		retry_after: Option<Duration>,
	},
	/// Exchange endpoint responded with XML that could not be parsed.
	#[error("Exchange endpoint returned a malformed document.")]
	ExchangeResponseParse {
		/// Structured parsing failure.
		#[source]
		source: quick_xml::de::DeError,
		/// HTTP status code, when available.
		status: Option<u16>,
	},
}

/// Transport-level failures (network, IO).
#[derive(Debug, ThisError)]
pub enum TransportError {
	/// Underlying HTTP client reported a network failure.
	#[error("Network error occurred while calling {endpoint}.")]
	Network {
		/// Which upstream was being called.
		endpoint: &'static str,
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
	/// Underlying IO failure surfaced during transport.
	#[error("I/O error occurred during transport.")]
	Io(#[from] std::io::Error),
}
impl TransportError {
	/// Wraps a transport-specific network error.
	pub fn network(
		endpoint: &'static str,
		src: impl 'static + Send + Sync + std::error::Error,
	) -> Self {
		Self::Network { endpoint, source: Box::new(src) }
	}
}

/// Failures raised by the upload helper.
#[derive(Debug, ThisError)]
pub enum UploadError {
	/// The input directory does not exist.
	#[error("Upload input directory not found: {}.", .path.display())]
	InputNotFound {
		/// Missing directory.
		path: PathBuf,
	},
	/// Walking the input directory failed.
	#[error("Failed to read {}.", .path.display())]
	Walk {
		/// Entry that could not be read.
		path: PathBuf,
		/// Underlying IO failure.
		#[source]
		source: std::io::Error,
	},
	/// The object sink rejected an operation.
	#[error("Object sink failed for s3://{bucket}/{key}.")]
	Sink {
		/// Destination bucket.
		bucket: String,
		/// Destination key.
		key: String,
		/// Sink-specific failure.
		#[source]
		source: BoxError,
	},
}
impl UploadError {
	/// Wraps a sink-specific failure for the provided destination.
	pub fn sink(
		bucket: impl Into<String>,
		key: impl Into<String>,
		src: impl 'static + Send + Sync + std::error::Error,
	) -> Self {
		Self::Sink { bucket: bucket.into(), key: key.into(), source: Box::new(src) }
	}
}
