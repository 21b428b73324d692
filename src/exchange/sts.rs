//! AWS STS `AssumeRoleWithWebIdentity` exchanger.

// crates.io
use oauth2::{
	SyncHttpClient,
	http::{Method, Request, header::ACCEPT},
};
use quick_xml::de;
use time::format_description::well_known::Rfc3339;
// self
use crate::{
	_prelude::*,
	error::{ConfigError, TransientError},
	exchange::{AssumeRoleRequest, ExchangeResult, StorageCredentialsPayload, StorageExchanger},
	http::{ResponseMetadata, ResponseMetadataSlot, TokenHttpClient, TransportErrorMapper, Upstream},
};
#[cfg(feature = "reqwest")]
use crate::http::{ReqwestHttpClient, ReqwestTransportErrorMapper};

/// STS query API version.
pub const STS_API_VERSION: &str = "2011-06-15";

const TRANSIENT_CODES: [&str; 5] = [
	"Throttling",
	"ThrottlingException",
	"ServiceUnavailable",
	"InternalFailure",
	"IDPCommunicationError",
];

/// Returns the regional STS endpoint for `region`.
pub fn sts_endpoint(region: &str) -> Result<Url> {
	let host = if region.starts_with("cn-") {
		format!("https://sts.{region}.amazonaws.com.cn/")
	} else {
		format!("https://sts.{region}.amazonaws.com/")
	};

	Url::parse(&host)
		.map_err(|_| ConfigError::InvalidUrl { name: "aws_region", value: region.into() }.into())
}

/// Exchanger specialized for the crate's default reqwest transport stack.
#[cfg(feature = "reqwest")]
pub type ReqwestStsExchanger = StsExchanger<ReqwestHttpClient, ReqwestTransportErrorMapper>;

/// Exchanger issuing unsigned `AssumeRoleWithWebIdentity` GET requests.
pub struct StsExchanger<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	endpoint: Url,
	http_client: Arc<C>,
	error_mapper: Arc<M>,
}
impl<C, M> StsExchanger<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Creates an exchanger that reuses the caller-provided transport + mapper pair.
	pub fn with_http_client(
		endpoint: Url,
		http_client: impl Into<Arc<C>>,
		error_mapper: impl Into<Arc<M>>,
	) -> Self {
		Self { endpoint, http_client: http_client.into(), error_mapper: error_mapper.into() }
	}

	/// Endpoint requests are sent to.
	pub fn endpoint(&self) -> &Url {
		&self.endpoint
	}

	/// Builds the query URL for `request`.
	pub fn request_url(&self, request: &AssumeRoleRequest<'_>) -> Url {
		let mut url = self.endpoint.clone();

		url.query_pairs_mut()
			.append_pair("Action", "AssumeRoleWithWebIdentity")
			.append_pair("DurationSeconds", &request.duration.whole_seconds().to_string())
			.append_pair("RoleArn", request.role_arn)
			.append_pair("RoleSessionName", request.session_name)
			.append_pair("WebIdentityToken", request.web_identity_token)
			.append_pair("Version", STS_API_VERSION);

		url
	}
}
#[cfg(feature = "reqwest")]
impl StsExchanger<ReqwestHttpClient, ReqwestTransportErrorMapper> {
	/// Creates an exchanger backed by the crate's default reqwest transport.
	pub fn new(endpoint: Url) -> Result<Self> {
		Ok(Self::with_http_client(
			endpoint,
			ReqwestHttpClient::without_redirects()?,
			ReqwestTransportErrorMapper,
		))
	}

	/// Creates an exchanger for the regional endpoint of `region`.
	pub fn for_region(region: &str) -> Result<Self> {
		Self::new(sts_endpoint(region)?)
	}
}
impl<C, M> StorageExchanger for StsExchanger<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn assume_role_with_web_identity(
		&self,
		request: &AssumeRoleRequest<'_>,
	) -> Result<ExchangeResult> {
		let meta = ResponseMetadataSlot::default();
		let instrumented = self.http_client.with_metadata(meta.clone());
		let http_request = Request::builder()
			.method(Method::GET)
			.uri(self.request_url(request).as_str())
			.header(ACCEPT, "application/xml")
			.body(Vec::new())
			.map_err(ConfigError::from)?;
		let response = instrumented.call(http_request).map_err(|err| {
			self.error_mapper.map_transport_error(Upstream::Exchange, meta.take().as_ref(), err)
		})?;
		let status = response.status();
		let meta = meta
			.take()
			.unwrap_or(ResponseMetadata { status: Some(status.as_u16()), retry_after: None });

		if !status.is_success() {
			return Err(map_error_document(response.body(), &meta));
		}

		parse_response(response.body(), status.as_u16())
	}
}
impl<C, M> Debug for StsExchanger<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("StsExchanger").field("endpoint", &self.endpoint).finish()
	}
}

#[derive(Default, Debug, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
struct AssumeRoleWithWebIdentityResponse {
	#[serde(rename = "AssumeRoleWithWebIdentityResult")]
	result: AssumeRoleWithWebIdentityResult,
}

#[derive(Default, Debug, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
struct AssumeRoleWithWebIdentityResult {
	credentials: Option<AssumeRoleWithWebIdentityCredentials>,
}

#[derive(Default, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
struct AssumeRoleWithWebIdentityCredentials {
	access_key_id: String,
	secret_access_key: String,
	session_token: String,
	expiration: String,
}
impl Debug for AssumeRoleWithWebIdentityCredentials {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("AssumeRoleWithWebIdentityCredentials")
			.field("access_key_id", &self.access_key_id)
			.field("secret_access_key", &"<redacted>")
			.field("session_token", &"<redacted>")
			.field("expiration", &self.expiration)
			.finish()
	}
}

#[derive(Default, Debug, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
struct ErrorResponse {
	error: ErrorDetail,
}

#[derive(Default, Debug, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
struct ErrorDetail {
	code: String,
	message: String,
}

fn parse_response(body: &[u8], status: u16) -> Result<ExchangeResult> {
	let document: AssumeRoleWithWebIdentityResponse = de::from_reader(body)
		.map_err(|source| TransientError::ExchangeResponseParse { source, status: Some(status) })?;
	let Some(credentials) = document.result.credentials else {
		return Ok(ExchangeResult::default());
	};
	let expiration = OffsetDateTime::parse(&credentials.expiration, &Rfc3339).map_err(|_| {
		Error::exchange(format!(
			"exchange service returned an invalid expiration `{}`",
			credentials.expiration
		))
	})?;

	Ok(ExchangeResult::new(StorageCredentialsPayload {
		access_key_id: credentials.access_key_id,
		secret_access_key: credentials.secret_access_key,
		session_token: credentials.session_token,
		expiration,
	}))
}

fn map_error_document(body: &[u8], meta: &ResponseMetadata) -> Error {
	let status = meta.status;
	let detail = de::from_reader::<_, ErrorResponse>(body).map(|document| document.error).ok();
	let throttled = matches!(status, Some(429)) || matches!(status, Some(code) if code >= 500);

	match detail {
		Some(detail) if !detail.code.is_empty() => {
			let message = format!("{}: {}", detail.code, detail.message);

			if throttled || TRANSIENT_CODES.contains(&detail.code.as_str()) {
				Upstream::Exchange.transient(message, Some(meta))
			} else {
				Error::exchange(message)
			}
		},
		_ if throttled => Upstream::Exchange.transient("exchange endpoint failed", Some(meta)),
		_ => Error::exchange(format!(
			"exchange endpoint rejected the request with status {}",
			status.map_or_else(|| "unknown".to_owned(), |code| code.to_string())
		)),
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use time::macros;
	// self
	use super::*;

	const SUCCESS: &str = r#"<AssumeRoleWithWebIdentityResponse xmlns="https://sts.amazonaws.com/doc/2011-06-15/">
  <AssumeRoleWithWebIdentityResult>
    <Audience>client-id</Audience>
    <AssumedRoleUser>
      <AssumedRoleId>AROA:prescient-s3-access</AssumedRoleId>
      <Arn>arn:aws:sts::123456789012:assumed-role/reader/prescient-s3-access</Arn>
    </AssumedRoleUser>
    <Credentials>
      <AccessKeyId>ASIAEXAMPLE</AccessKeyId>
      <SecretAccessKey>secret_access_key</SecretAccessKey>
      <SessionToken>session_token</SessionToken>
      <Expiration>2025-05-25T11:45:17Z</Expiration>
    </Credentials>
  </AssumeRoleWithWebIdentityResult>
  <ResponseMetadata>
    <RequestId>b1663ad1-23ab-45e9-b465-9af30b202eba</RequestId>
  </ResponseMetadata>
</AssumeRoleWithWebIdentityResponse>"#;

	fn error_document(code: &str) -> String {
		format!(
			r#"<ErrorResponse xmlns="https://sts.amazonaws.com/doc/2011-06-15/">
  <Error>
    <Type>Sender</Type>
    <Code>{code}</Code>
    <Message>Something went wrong.</Message>
  </Error>
  <RequestId>c6104cbe-af31-11e0-8154-cbc7ccf896c7</RequestId>
</ErrorResponse>"#
		)
	}

	#[test]
	fn regional_endpoints() {
		assert_eq!(
			sts_endpoint("eu-west-1").expect("Region should map.").as_str(),
			"https://sts.eu-west-1.amazonaws.com/"
		);
		assert_eq!(
			sts_endpoint("cn-north-1").expect("Region should map.").as_str(),
			"https://sts.cn-north-1.amazonaws.com.cn/"
		);
	}

	#[test]
	fn parses_credentials_document() {
		let result = parse_response(SUCCESS.as_bytes(), 200).expect("Document should parse.");
		let payload = result.credentials.expect("Document carries credentials.");

		assert_eq!(payload.access_key_id, "ASIAEXAMPLE");
		assert_eq!(payload.secret_access_key, "secret_access_key");
		assert_eq!(payload.expiration, macros::datetime!(2025-05-25 11:45:17 UTC));
	}

	#[test]
	fn missing_credentials_yield_empty_result() {
		let document = r#"<AssumeRoleWithWebIdentityResponse>
  <AssumeRoleWithWebIdentityResult><Audience>client-id</Audience></AssumeRoleWithWebIdentityResult>
</AssumeRoleWithWebIdentityResponse>"#;
		let result = parse_response(document.as_bytes(), 200).expect("Document should parse.");

		assert_eq!(result, ExchangeResult::default());
	}

	#[test]
	fn invalid_expiration_fails_exchange() {
		let document = SUCCESS.replace("2025-05-25T11:45:17Z", "tomorrow");

		assert!(matches!(
			parse_response(document.as_bytes(), 200),
			Err(Error::CredentialExchangeFailure { .. })
		));
	}

	#[test]
	fn sender_faults_fail_exchange() {
		let meta = ResponseMetadata { status: Some(400), retry_after: None };
		let err = map_error_document(error_document("InvalidIdentityToken").as_bytes(), &meta);

		assert!(matches!(
			err,
			Error::CredentialExchangeFailure { reason } if reason.starts_with("InvalidIdentityToken")
		));
	}

	#[test]
	fn throttling_is_transient() {
		let meta = ResponseMetadata { status: Some(400), retry_after: None };
		let err = map_error_document(error_document("Throttling").as_bytes(), &meta);

		assert!(matches!(err, Error::Transient(TransientError::ExchangeEndpoint { .. })));

		let meta = ResponseMetadata { status: Some(503), retry_after: None };
		let err = map_error_document(b"<html>bad gateway</html>", &meta);

		assert!(matches!(
			err,
			Error::Transient(TransientError::ExchangeEndpoint { status: Some(503), .. })
		));
	}

	#[cfg(feature = "reqwest")]
	#[test]
	fn request_url_carries_query_parameters() {
		let exchanger = StsExchanger::new(
			Url::parse("https://sts.us-east-1.amazonaws.com/").expect("Endpoint should parse."),
		)
		.expect("Exchanger should build.");
		let url = exchanger.request_url(&AssumeRoleRequest {
			duration: Duration::hours(1),
			role_arn: "arn:aws:iam::123456789012:role/reader",
			session_name: "prescient-s3-access",
			web_identity_token: "a.b.c",
		});
		let pairs: HashMap<_, _> = url.query_pairs().into_owned().collect();

		assert_eq!(pairs.get("Action").map(String::as_str), Some("AssumeRoleWithWebIdentity"));
		assert_eq!(pairs.get("DurationSeconds").map(String::as_str), Some("3600"));
		assert_eq!(pairs.get("WebIdentityToken").map(String::as_str), Some("a.b.c"));
		assert_eq!(pairs.get("Version").map(String::as_str), Some(STS_API_VERSION));
	}
}
