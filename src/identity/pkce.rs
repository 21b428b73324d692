//! Authorization Code + PKCE request state for the interactive login.

// std
use std::borrow::Cow;
// crates.io
use oauth2::{
	AuthUrl, ClientId, CsrfToken, PkceCodeChallenge, PkceCodeVerifier, RedirectUrl, Scope,
	basic::BasicClient,
};
// self
use crate::_prelude::*;

/// One interactive login attempt: the authorize URL plus the secrets needed to redeem it.
pub struct AuthorizationRequest {
	/// Loopback redirect URI registered in the authorize URL.
	pub redirect_uri: Url,
	/// Fully-formed authorize URL the user must visit.
	pub authorize_url: Url,
	state: CsrfToken,
	pkce_challenge: PkceCodeChallenge,
	pkce_verifier: PkceCodeVerifier,
}
impl AuthorizationRequest {
	/// Generates fresh state and S256 PKCE secrets and builds the authorize URL.
	pub fn new(
		authorization_endpoint: &Url,
		client_id: &str,
		redirect_uri: Url,
		scopes: &[&str],
	) -> Self {
		let (pkce_challenge, pkce_verifier) = PkceCodeChallenge::new_random_sha256();
		let client = BasicClient::new(ClientId::new(client_id.to_owned()))
			.set_auth_uri(AuthUrl::from_url(authorization_endpoint.clone()));
		let (authorize_url, state) = client
			.authorize_url(CsrfToken::new_random)
			.set_redirect_uri(Cow::Owned(RedirectUrl::from_url(redirect_uri.clone())))
			.add_scopes(scopes.iter().map(|scope| Scope::new((*scope).to_owned())))
			.set_pkce_challenge(pkce_challenge.clone())
			.url();

		Self { redirect_uri, authorize_url, state, pkce_challenge, pkce_verifier }
	}

	/// Opaque state value that must round-trip via the redirect.
	pub fn state(&self) -> &str {
		self.state.secret()
	}

	/// PKCE code challenge derived from the secret verifier.
	pub fn code_challenge(&self) -> &str {
		self.pkce_challenge.as_str()
	}

	/// PKCE challenge method (always `S256`).
	pub fn code_challenge_method(&self) -> &str {
		self.pkce_challenge.method().as_str()
	}

	/// Validates the `state` parameter returned on the redirect.
	pub fn validate_state(&self, returned_state: &str) -> Result<()> {
		if returned_state == self.state() {
			Ok(())
		} else {
			Err(Error::authentication("authorization state mismatch"))
		}
	}

	pub(crate) fn verifier(&self) -> &str {
		self.pkce_verifier.secret()
	}
}
impl Debug for AuthorizationRequest {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("AuthorizationRequest")
			.field("redirect_uri", &self.redirect_uri)
			.field("authorize_url", &self.authorize_url)
			.field("code_challenge", &self.code_challenge())
			.field("code_challenge_method", &self.code_challenge_method())
			.finish()
	}
}
