//! OAuth 2.0 / OpenID Connect identity provider built on the `oauth2` crate.

// std
use std::borrow::Cow;
// crates.io
use oauth2::{
	AuthType, AuthUrl, AuthorizationCode, Client, ClientId, EndpointNotSet, EndpointSet,
	ExtraTokenFields, HttpClientError, PkceCodeVerifier, RedirectUrl, RefreshToken,
	RequestTokenError, Scope, StandardRevocableToken, StandardTokenResponse, TokenResponse,
	TokenUrl,
	basic::{
		BasicErrorResponse, BasicRequestTokenError, BasicRevocationErrorResponse,
		BasicTokenIntrospectionResponse, BasicTokenType,
	},
};
// self
use crate::{
	_prelude::*,
	auth::{IdentityGrant, TokenSecret},
	error::{ConfigError, TransientError},
	http::{ResponseMetadata, ResponseMetadataSlot, TokenHttpClient, TransportErrorMapper, Upstream},
	identity::{
		AuthorizationPrompt, AuthorizationRequest, BrowserPrompt, IdentityEndpoints,
		IdentityErrorContext, IdentityErrorKind, IdentityProvider, LoopbackRedirect,
		RedirectOutcome, decode_claims,
	},
};
#[cfg(feature = "reqwest")]
use crate::http::{ReqwestHttpClient, ReqwestTransportErrorMapper};

/// Identity provider specialized for the crate's default reqwest transport stack.
#[cfg(feature = "reqwest")]
pub type ReqwestIdentityProvider =
	OAuthIdentityProvider<ReqwestHttpClient, ReqwestTransportErrorMapper>;

type IdentityTokenResponse = StandardTokenResponse<IdTokenFields, BasicTokenType>;
type ConfiguredClient = Client<
	BasicErrorResponse,
	IdentityTokenResponse,
	BasicTokenIntrospectionResponse,
	StandardRevocableToken,
	BasicRevocationErrorResponse,
	EndpointSet,
	EndpointNotSet,
	EndpointNotSet,
	EndpointNotSet,
	EndpointSet,
>;

/// OpenID Connect fields returned next to the standard token response.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct IdTokenFields {
	/// Signed ID token presented as the bearer token.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub id_token: Option<String>,
}
impl ExtraTokenFields for IdTokenFields {}

/// Identity provider speaking the authorization-code + PKCE and refresh-token grants.
///
/// Interactive acquisition binds a loopback listener, hands the authorize URL to an
/// [`AuthorizationPrompt`], and redeems the returned code. Refresh renews silently.
pub struct OAuthIdentityProvider<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	oauth_client: ConfiguredClient,
	client_id: String,
	endpoints: IdentityEndpoints,
	http_client: Arc<C>,
	error_mapper: Arc<M>,
	prompt: Arc<dyn AuthorizationPrompt>,
}
impl<C, M> OAuthIdentityProvider<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Creates a provider that reuses the caller-provided transport + mapper pair.
	pub fn with_http_client(
		client_id: impl Into<String>,
		endpoints: IdentityEndpoints,
		http_client: impl Into<Arc<C>>,
		error_mapper: impl Into<Arc<M>>,
	) -> Result<Self> {
		let client_id = client_id.into();
		let auth_url = AuthUrl::new(endpoints.authorization.to_string())
			.map_err(|source| ConfigError::InvalidEndpoint { source })?;
		let token_url = TokenUrl::new(endpoints.token.to_string())
			.map_err(|source| ConfigError::InvalidEndpoint { source })?;
		let oauth_client = Client::new(ClientId::new(client_id.clone()))
			.set_auth_uri(auth_url)
			.set_token_uri(token_url)
			.set_auth_type(AuthType::RequestBody);

		Ok(Self {
			oauth_client,
			client_id,
			endpoints,
			http_client: http_client.into(),
			error_mapper: error_mapper.into(),
			prompt: Arc::new(BrowserPrompt::default()),
		})
	}

	/// Replaces the prompt used to show the authorize URL.
	pub fn with_prompt(mut self, prompt: impl 'static + AuthorizationPrompt) -> Self {
		self.prompt = Arc::new(prompt);

		self
	}

	/// Endpoints this provider talks to.
	pub fn endpoints(&self) -> &IdentityEndpoints {
		&self.endpoints
	}

	/// Redeems an authorization code obtained out of band.
	pub fn redeem_authorization_code(
		&self,
		code: &str,
		pkce_verifier: &str,
		redirect_uri: &Url,
		scopes: &[&str],
	) -> Result<IdentityGrant> {
		let meta = ResponseMetadataSlot::default();
		let instrumented = self.http_client.with_metadata(meta.clone());
		let redirect_url = RedirectUrl::new(redirect_uri.to_string())
			.map_err(|source| ConfigError::InvalidEndpoint { source })?;
		let mut request = self
			.oauth_client
			.exchange_code(AuthorizationCode::new(code.to_owned()))
			.set_pkce_verifier(PkceCodeVerifier::new(pkce_verifier.to_owned()))
			.set_redirect_uri(Cow::Owned(redirect_url));

		if !scopes.is_empty() {
			request = request.add_extra_param("scope", scopes.join(" "));
		}

		let response = request
			.request(&instrumented)
			.map_err(|err| map_request_error(meta.take(), err, self.error_mapper.as_ref()))?;

		Ok(into_grant(response))
	}
}
#[cfg(feature = "reqwest")]
impl OAuthIdentityProvider<ReqwestHttpClient, ReqwestTransportErrorMapper> {
	/// Creates a provider backed by the crate's default reqwest transport.
	pub fn new(client_id: impl Into<String>, endpoints: IdentityEndpoints) -> Result<Self> {
		Self::with_http_client(
			client_id,
			endpoints,
			ReqwestHttpClient::without_redirects()?,
			ReqwestTransportErrorMapper,
		)
	}
}
impl<C, M> IdentityProvider for OAuthIdentityProvider<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn acquire_interactive(&self, scopes: &[&str]) -> Result<IdentityGrant> {
		let redirect = LoopbackRedirect::bind()?;
		let request = AuthorizationRequest::new(
			&self.endpoints.authorization,
			&self.client_id,
			redirect.redirect_uri()?,
			scopes,
		);

		self.prompt.present(&request.authorize_url)?;

		let code = match redirect.wait()? {
			RedirectOutcome::Code { code, state } => {
				request.validate_state(state.as_deref().unwrap_or_default())?;

				code
			},
			RedirectOutcome::Error { error, description } =>
				return Err(map_redirect_error(error, description)),
		};

		self.redeem_authorization_code(&code, request.verifier(), &request.redirect_uri, scopes)
	}

	fn acquire_by_refresh(&self, refresh_token: &str, scopes: &[&str]) -> Result<IdentityGrant> {
		let meta = ResponseMetadataSlot::default();
		let instrumented = self.http_client.with_metadata(meta.clone());
		let refresh_secret = RefreshToken::new(refresh_token.to_owned());
		let mut request = self.oauth_client.exchange_refresh_token(&refresh_secret);

		for scope in scopes {
			request = request.add_scope(Scope::new((*scope).to_owned()));
		}

		let response = request
			.request(&instrumented)
			.map_err(|err| map_request_error(meta.take(), err, self.error_mapper.as_ref()))?;

		Ok(into_grant(response))
	}
}
impl<C, M> Debug for OAuthIdentityProvider<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("OAuthIdentityProvider")
			.field("client_id", &self.client_id)
			.field("endpoints", &self.endpoints)
			.finish()
	}
}

fn into_grant(response: IdentityTokenResponse) -> IdentityGrant {
	let bearer_token = response.extra_fields().id_token.clone().map(TokenSecret::new);
	let claims = bearer_token.as_ref().and_then(|token| decode_claims(token.expose()));

	IdentityGrant {
		bearer_token,
		access_token: Some(TokenSecret::new(response.access_token().secret())),
		refresh_token: response.refresh_token().map(|token| TokenSecret::new(token.secret())),
		expires_in: response.expires_in().and_then(|hint| Duration::try_from(hint).ok()),
		claims,
	}
}

fn map_redirect_error(error: String, description: Option<String>) -> Error {
	let mut ctx = IdentityErrorContext::default().with_oauth_error(error.clone());

	if let Some(description) = &description {
		ctx = ctx.with_error_description(description.clone());
	}

	let message = description.unwrap_or(error);

	match ctx.classify() {
		IdentityErrorKind::Rejected => Error::authentication(message),
		IdentityErrorKind::Transient => Upstream::Token.transient(message, None),
	}
}

fn map_request_error<E, M>(
	meta: Option<ResponseMetadata>,
	err: BasicRequestTokenError<HttpClientError<E>>,
	mapper: &M,
) -> Error
where
	E: 'static + Send + Sync + StdError,
	M: ?Sized + TransportErrorMapper<E>,
{
	let meta_ref = meta.as_ref();

	match err {
		RequestTokenError::ServerResponse(response) => map_server_response_error(response, meta_ref),
		RequestTokenError::Request(error) =>
			mapper.map_transport_error(Upstream::Token, meta_ref, error),
		RequestTokenError::Parse(error, body) => map_parse_error(error, &body, meta_ref),
		RequestTokenError::Other(message) => Upstream::Token.transient(message, meta_ref),
	}
}

fn map_parse_error(
	error: serde_path_to_error::Error<serde_json::Error>,
	body: &[u8],
	meta: Option<&ResponseMetadata>,
) -> Error {
	let status = meta.and_then(|value| value.status);
	let parse_error = || Error::from(TransientError::TokenResponseParse { source: error, status });

	// A malformed success body is a provider fault, never a rejection.
	let Some(status) = status.filter(|code| !(200..300).contains(code)) else {
		return parse_error();
	};
	let ctx = IdentityErrorContext::default()
		.with_http_status(status)
		.with_body_preview(String::from_utf8_lossy(body));

	match ctx.classify() {
		IdentityErrorKind::Rejected => Error::authentication(format!(
			"token endpoint returned HTTP {status}: {}",
			ctx.body_preview.as_deref().unwrap_or_default().trim()
		)),
		IdentityErrorKind::Transient => parse_error(),
	}
}

fn map_server_response_error(
	response: BasicErrorResponse,
	meta: Option<&ResponseMetadata>,
) -> Error {
	let mut ctx =
		IdentityErrorContext::default().with_oauth_error(response.error().as_ref().to_string());

	if let Some(description) = response.error_description() {
		ctx = ctx.with_error_description(description.clone());
	}
	if let Some(status) = meta.and_then(|value| value.status) {
		ctx = ctx.with_http_status(status);
	}

	let message = match response.error_description() {
		Some(description) => format!("token endpoint returned an OAuth error: {description}"),
		None => format!("token endpoint returned an OAuth error: {}", response.error().as_ref()),
	};

	match ctx.classify() {
		IdentityErrorKind::Rejected => Error::authentication(message),
		IdentityErrorKind::Transient => Upstream::Token.transient(message, meta),
	}
}

#[cfg(all(test, feature = "reqwest"))]
mod tests {
	// self
	use super::*;

	fn endpoints() -> IdentityEndpoints {
		IdentityEndpoints::new(
			&Url::parse("https://login.example.com/").expect("Auth URL fixture should parse."),
			"tenant",
			"/oauth2/v2.0/token",
			"/oauth2/v2.0/authorize",
		)
		.expect("Endpoints fixture should derive.")
	}

	#[test]
	fn builds_public_client() {
		let provider = OAuthIdentityProvider::new("client-id", endpoints())
			.expect("Provider should build from valid endpoints.");

		assert_eq!(
			provider.endpoints().token.as_str(),
			"https://login.example.com/tenant/oauth2/v2.0/token"
		);
		assert!(format!("{provider:?}").contains("client-id"));
	}

	fn parse_failure() -> serde_path_to_error::Error<serde_json::Error> {
		serde_path_to_error::deserialize::<_, BasicErrorResponse>(
			&mut serde_json::Deserializer::from_str("<html>"),
		)
		.expect_err("HTML should not parse as an OAuth error.")
	}

	fn metadata(status: u16) -> ResponseMetadata {
		ResponseMetadata { status: Some(status), ..Default::default() }
	}

	#[test]
	fn unparseable_rejection_body_is_classified() {
		let err = map_parse_error(
			parse_failure(),
			b"<html><body>AADSTS70000: invalid_grant</body></html>",
			Some(&metadata(400)),
		);

		assert!(matches!(
			err,
			Error::AuthenticationFailure { reason } if reason.contains("invalid_grant")
		));

		let err =
			map_parse_error(parse_failure(), b"<html>Unauthorized</html>", Some(&metadata(401)));

		assert!(matches!(err, Error::AuthenticationFailure { .. }));
	}

	#[test]
	fn unparseable_transient_body_stays_a_parse_error() {
		let err =
			map_parse_error(parse_failure(), b"<html>Bad Gateway</html>", Some(&metadata(502)));

		assert!(matches!(
			err,
			Error::Transient(TransientError::TokenResponseParse { status: Some(502), .. })
		));

		let err = map_parse_error(parse_failure(), b"invalid_grant", Some(&metadata(200)));

		assert!(matches!(
			err,
			Error::Transient(TransientError::TokenResponseParse { status: Some(200), .. })
		));
	}

	#[test]
	fn redirect_errors_are_classified() {
		assert!(matches!(
			map_redirect_error("access_denied".into(), Some("User cancelled.".into())),
			Error::AuthenticationFailure { reason } if reason == "User cancelled."
		));
		assert!(matches!(
			map_redirect_error("temporarily_unavailable".into(), None),
			Error::Transient(TransientError::TokenEndpoint { .. })
		));
	}
}
