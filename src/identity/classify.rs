//! Classification of identity provider error responses.
//!
//! Structured OAuth fields (`error`, `error_description`) win, then body text hints, and
//! finally the HTTP status code. Network failures never reach this module; the transport
//! mapper handles them.

// self
use crate::_prelude::*;

/// Canonical categories for identity provider failures.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IdentityErrorKind {
	/// The provider rejected the grant or the client; surfaces as
	/// [`Error::AuthenticationFailure`].
	Rejected,
	/// The failure is temporary and the caller may retry.
	Transient,
}

/// Primitive data extracted from a failed token response.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct IdentityErrorContext {
	/// HTTP status code returned by the provider, when available.
	pub http_status: Option<u16>,
	/// Provider-supplied OAuth `error` field.
	pub oauth_error: Option<String>,
	/// Provider-supplied OAuth `error_description` field.
	pub error_description: Option<String>,
	/// Preview of the response body for non-JSON payloads.
	pub body_preview: Option<String>,
}
impl IdentityErrorContext {
	const BODY_PREVIEW_LIMIT: usize = 256;

	/// Adds an HTTP status code.
	pub fn with_http_status(mut self, status: u16) -> Self {
		self.http_status = Some(status);

		self
	}

	/// Adds the OAuth error code string.
	pub fn with_oauth_error(mut self, error: impl Into<String>) -> Self {
		self.oauth_error = Some(error.into());

		self
	}

	/// Adds the OAuth `error_description` field.
	pub fn with_error_description(mut self, description: impl Into<String>) -> Self {
		self.error_description = Some(description.into());

		self
	}

	/// Adds a truncated body preview.
	pub fn with_body_preview(mut self, body: impl Into<String>) -> Self {
		self.body_preview = Some(body.into().chars().take(Self::BODY_PREVIEW_LIMIT).collect());

		self
	}

	/// Classifies the failure.
	pub fn classify(&self) -> IdentityErrorKind {
		classify_value(self.oauth_error.as_deref())
			.or_else(|| classify_value(self.error_description.as_deref()))
			.or_else(|| classify_body(self.error_description.as_deref()))
			.or_else(|| classify_body(self.body_preview.as_deref()))
			.unwrap_or_else(|| classify_status(self.http_status))
	}
}

fn classify_value(value: Option<&str>) -> Option<IdentityErrorKind> {
	const REJECTED: [&str; 9] = [
		"invalid_grant",
		"access_denied",
		"invalid_client",
		"unauthorized_client",
		"invalid_scope",
		"insufficient_scope",
		"interaction_required",
		"login_required",
		"consent_required",
	];
	const TRANSIENT: [&str; 2] = ["temporarily_unavailable", "server_error"];

	let value = value?.trim();

	if REJECTED.iter().any(|code| value.eq_ignore_ascii_case(code)) {
		Some(IdentityErrorKind::Rejected)
	} else if TRANSIENT.iter().any(|code| value.eq_ignore_ascii_case(code)) {
		Some(IdentityErrorKind::Transient)
	} else {
		None
	}
}

fn classify_body(body: Option<&str>) -> Option<IdentityErrorKind> {
	let lowered = body?.to_ascii_lowercase();

	match lowered.as_str() {
		text if text.contains("invalid_grant")
			|| text.contains("invalid_client")
			|| text.contains("invalid_scope")
			|| text.contains("access_denied") =>
			Some(IdentityErrorKind::Rejected),
		text if text.contains("temporarily_unavailable") || text.contains("retry") =>
			Some(IdentityErrorKind::Transient),
		_ => None,
	}
}

fn classify_status(status: Option<u16>) -> IdentityErrorKind {
	match status {
		Some(400 | 401 | 403 | 404 | 410) => IdentityErrorKind::Rejected,
		_ => IdentityErrorKind::Transient,
	}
}
