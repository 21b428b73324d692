//! Blocking transport primitives shared by the identity provider and the storage exchanger.
//!
//! The module exposes [`TokenHttpClient`] alongside [`ResponseMetadata`] and
//! [`ResponseMetadataSlot`] so downstream crates can plug in custom HTTP clients without
//! losing status and retry hints. Implementations call [`ResponseMetadataSlot::take`] before
//! dispatching a request and [`ResponseMetadataSlot::store`] once an HTTP status is known,
//! which lets [`TransportErrorMapper`] classify failures with consistent metadata.

// std
#[cfg(feature = "reqwest")] use std::ops::Deref;
// crates.io
use oauth2::{HttpClientError, HttpRequest, HttpResponse, SyncHttpClient};
#[cfg(feature = "reqwest")] use reqwest::header::{HeaderMap, RETRY_AFTER};
#[cfg(feature = "reqwest")] use time::format_description::well_known::Rfc2822;
// self
use crate::{
	_prelude::*,
	error::{ConfigError, TransientError, TransportError},
};

/// Abstraction over blocking HTTP transports used for token and credential exchanges.
///
/// The trait is the crate's only dependency on an HTTP stack. Callers provide an
/// implementation and the identity provider and exchanger request short-lived
/// [`SyncHttpClient`] handles that each carry a clone of a [`ResponseMetadataSlot`].
pub trait TokenHttpClient
where
	Self: 'static + Send + Sync,
{
	/// Concrete error emitted by the underlying transport.
	type TransportError: 'static + Send + Sync + StdError;

	/// [`SyncHttpClient`] handle tied to a [`ResponseMetadataSlot`].
	type Handle: SyncHttpClient<Error = HttpClientError<Self::TransportError>> + 'static + Send;

	/// Builds a [`SyncHttpClient`] handle that records outcomes in `slot`.
	///
	/// # Metadata Contract
	///
	/// - Call [`ResponseMetadataSlot::take`] before submitting the HTTP request so stale
	///   information never leaks across attempts.
	/// - Once an HTTP response (successful or erroneous) provides status headers, save them with
	///   [`ResponseMetadataSlot::store`].
	fn with_metadata(&self, slot: ResponseMetadataSlot) -> Self::Handle;
}

/// Upstream service a request was addressed to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Upstream {
	/// Identity provider token endpoint.
	Token,
	/// Storage credential exchange endpoint.
	Exchange,
}
impl Upstream {
	/// Returns a stable label suitable for messages and span fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			Upstream::Token => "token endpoint",
			Upstream::Exchange => "exchange endpoint",
		}
	}

	/// Builds the transient error variant matching this upstream.
	pub fn transient(self, message: impl Into<String>, meta: Option<&ResponseMetadata>) -> Error {
		let message = message.into();
		let status = meta.and_then(|value| value.status);
		let retry_after = meta.and_then(|value| value.retry_after);

		match self {
			Upstream::Token => TransientError::TokenEndpoint { message, status, retry_after },
			Upstream::Exchange => TransientError::ExchangeEndpoint { message, status, retry_after },
		}
		.into()
	}
}
impl Display for Upstream {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Maps HTTP transport failures into crate [`Error`] values.
pub trait TransportErrorMapper<E>
where
	Self: 'static + Send + Sync,
	E: 'static + Send + Sync + StdError,
{
	/// Converts an [`HttpClientError`] emitted by the transport into a crate error.
	fn map_transport_error(
		&self,
		upstream: Upstream,
		metadata: Option<&ResponseMetadata>,
		error: HttpClientError<E>,
	) -> Error;
}

/// Captures metadata from the most recent HTTP response for downstream error mapping.
#[derive(Clone, Debug, Default)]
pub struct ResponseMetadata {
	/// HTTP status code returned by the upstream, if available.
	pub status: Option<u16>,
	/// Retry-After hint expressed as a relative duration.
	pub retry_after: Option<Duration>,
}

/// Thread-safe slot for sharing [`ResponseMetadata`] between transport and error layers.
#[derive(Clone, Debug, Default)]
pub struct ResponseMetadataSlot(Arc<Mutex<Option<ResponseMetadata>>>);
impl ResponseMetadataSlot {
	/// Stores new metadata for the current request.
	pub fn store(&self, meta: ResponseMetadata) {
		*self.0.lock() = Some(meta);
	}

	/// Returns the captured metadata, if any, consuming it from the slot.
	pub fn take(&self) -> Option<ResponseMetadata> {
		self.0.lock().take()
	}
}

/// Thin wrapper around the blocking [`ReqwestClient`] so shared HTTP behavior lives in one
/// place. Token endpoints return results directly, so custom clients should disable redirect
/// following.
#[cfg(feature = "reqwest")]
#[derive(Clone, Default)]
pub struct ReqwestHttpClient(pub ReqwestClient);
#[cfg(feature = "reqwest")]
impl ReqwestHttpClient {
	/// Wraps an existing blocking reqwest [`ReqwestClient`].
	pub fn with_client(client: ReqwestClient) -> Self {
		Self(client)
	}

	/// Builds a client that never follows redirects.
	pub fn without_redirects() -> Result<Self> {
		let client = ReqwestClient::builder()
			.redirect(reqwest::redirect::Policy::none())
			.build()
			.map_err(ConfigError::from)?;

		Ok(Self(client))
	}
}
#[cfg(feature = "reqwest")]
impl AsRef<ReqwestClient> for ReqwestHttpClient {
	fn as_ref(&self) -> &ReqwestClient {
		&self.0
	}
}
#[cfg(feature = "reqwest")]
impl Deref for ReqwestHttpClient {
	type Target = ReqwestClient;

	fn deref(&self) -> &Self::Target {
		&self.0
	}
}
#[cfg(feature = "reqwest")]
impl TokenHttpClient for ReqwestHttpClient {
	type Handle = InstrumentedHandle;
	type TransportError = ReqwestError;

	fn with_metadata(&self, slot: ResponseMetadataSlot) -> Self::Handle {
		InstrumentedHandle { client: self.0.clone(), slot }
	}
}

/// Handle returned by [`ReqwestHttpClient`] that records response metadata.
#[cfg(feature = "reqwest")]
#[derive(Clone)]
pub struct InstrumentedHandle {
	client: ReqwestClient,
	slot: ResponseMetadataSlot,
}
#[cfg(feature = "reqwest")]
impl SyncHttpClient for InstrumentedHandle {
	type Error = HttpClientError<ReqwestError>;

	fn call(&self, request: HttpRequest) -> Result<HttpResponse, Self::Error> {
		self.slot.take();

		let response = self.client.execute(request.try_into().map_err(Box::new)?).map_err(Box::new)?;
		let status = response.status();
		let headers = response.headers().to_owned();
		let retry_after = parse_retry_after(&headers);

		self.slot.store(ResponseMetadata { status: Some(status.as_u16()), retry_after });

		let mut response_new = HttpResponse::new(response.bytes().map_err(Box::new)?.to_vec());

		*response_new.status_mut() = status;
		*response_new.headers_mut() = headers;

		Ok(response_new)
	}
}

/// Default mapper for reqwest-backed transports.
#[cfg(feature = "reqwest")]
#[derive(Clone, Debug, Default)]
pub struct ReqwestTransportErrorMapper;
#[cfg(feature = "reqwest")]
impl TransportErrorMapper<ReqwestError> for ReqwestTransportErrorMapper {
	fn map_transport_error(
		&self,
		upstream: Upstream,
		meta: Option<&ResponseMetadata>,
		err: HttpClientError<ReqwestError>,
	) -> Error {
		match err {
			HttpClientError::Reqwest(inner) => map_reqwest_error(upstream, meta, *inner),
			HttpClientError::Http(inner) => ConfigError::from(inner).into(),
			HttpClientError::Io(inner) => TransportError::Io(inner).into(),
			HttpClientError::Other(message) => upstream.transient(
				format!("HTTP client error occurred while calling the {upstream}: {message}"),
				meta,
			),
			_ => upstream
				.transient(format!("HTTP client error occurred while calling the {upstream}"), meta),
		}
	}
}

#[cfg(feature = "reqwest")]
fn map_reqwest_error(upstream: Upstream, meta: Option<&ResponseMetadata>, err: ReqwestError) -> Error {
	if err.is_builder() {
		return ConfigError::from(err).into();
	}
	if err.is_timeout() {
		let mut meta = meta.cloned().unwrap_or_default();

		meta.status = meta.status.or_else(|| err.status().map(|code| code.as_u16()));

		return upstream
			.transient(format!("Request timed out while calling the {upstream}"), Some(&meta));
	}

	TransportError::network(upstream.as_str(), err).into()
}

#[cfg(feature = "reqwest")]
fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
	let value = headers.get(RETRY_AFTER)?;
	let raw = value.to_str().ok()?.trim();

	if let Ok(secs) = raw.parse::<u64>() {
		return i64::try_from(secs).ok().map(Duration::seconds);
	}
	if let Ok(moment) = OffsetDateTime::parse(raw, &Rfc2822) {
		let delta = moment - OffsetDateTime::now_utc();

		if delta.is_positive() {
			return Some(delta);
		}
	}

	None
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn slot_take_consumes_metadata() {
		let slot = ResponseMetadataSlot::default();

		slot.store(ResponseMetadata { status: Some(429), retry_after: Some(Duration::seconds(3)) });

		let meta = slot.take().expect("Stored metadata should be returned once.");

		assert_eq!(meta.status, Some(429));
		assert!(slot.take().is_none());
	}

	#[test]
	fn upstream_selects_transient_variant() {
		let meta = ResponseMetadata { status: Some(503), retry_after: None };

		assert!(matches!(
			Upstream::Token.transient("down", Some(&meta)),
			Error::Transient(TransientError::TokenEndpoint { status: Some(503), .. })
		));
		assert!(matches!(
			Upstream::Exchange.transient("down", None),
			Error::Transient(TransientError::ExchangeEndpoint { status: None, .. })
		));
	}

	#[cfg(feature = "reqwest")]
	#[test]
	fn retry_after_accepts_delta_seconds() {
		let mut headers = HeaderMap::new();

		headers.insert(RETRY_AFTER, "120".parse().expect("Header value should parse."));

		assert_eq!(parse_retry_after(&headers), Some(Duration::seconds(120)));
	}

	#[cfg(feature = "reqwest")]
	#[test]
	fn retry_after_ignores_garbage() {
		let mut headers = HeaderMap::new();

		headers.insert(RETRY_AFTER, "soon".parse().expect("Header value should parse."));

		assert_eq!(parse_retry_after(&headers), None);
	}

	#[cfg(feature = "reqwest")]
	#[test]
	fn retry_after_rejects_out_of_range_seconds() {
		let mut headers = HeaderMap::new();

		headers.insert(
			RETRY_AFTER,
			u64::MAX.to_string().parse().expect("Header value should parse."),
		);

		assert_eq!(parse_retry_after(&headers), None);
	}
}
