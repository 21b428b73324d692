//! Loopback redirect listener that captures the authorization code.

// std
use std::{
	io::{BufRead, BufReader, Write},
	net::{SocketAddr, TcpListener, TcpStream},
	time::Duration as StdDuration,
};
// self
use crate::{
	_prelude::*,
	error::{ConfigError, TransportError},
};

const READ_TIMEOUT: StdDuration = StdDuration::from_secs(10);
const SUCCESS_PAGE: &str = "<html><body><p>Authentication complete. You can close this window.</p></body></html>";
const FAILURE_PAGE: &str = "<html><body><p>Authentication failed. Return to the application for details.</p></body></html>";

/// Parameters delivered to the redirect URI.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RedirectOutcome {
	/// The provider issued an authorization code.
	Code {
		/// Authorization code to redeem.
		code: String,
		/// Returned state value.
		state: Option<String>,
	},
	/// The provider reported an error.
	Error {
		/// OAuth `error` field.
		error: String,
		/// OAuth `error_description` field.
		description: Option<String>,
	},
}
impl RedirectOutcome {
	/// Extracts the outcome from a redirect target, ignoring unrelated requests.
	pub fn from_target(target: &str) -> Option<Self> {
		let url = Url::parse("http://127.0.0.1").ok()?.join(target).ok()?;
		let pairs: HashMap<_, _> = url.query_pairs().into_owned().collect();

		if let Some(error) = pairs.get("error") {
			return Some(Self::Error {
				error: error.to_owned(),
				description: pairs.get("error_description").cloned(),
			});
		}

		pairs
			.get("code")
			.map(|code| Self::Code { code: code.to_owned(), state: pairs.get("state").cloned() })
	}
}

/// Single-use HTTP listener bound to `127.0.0.1` on an ephemeral port.
#[derive(Debug)]
pub struct LoopbackRedirect {
	listener: TcpListener,
	addr: SocketAddr,
	read_timeout: StdDuration,
}
impl LoopbackRedirect {
	/// Binds the listener.
	pub fn bind() -> Result<Self> {
		let listener = TcpListener::bind(("127.0.0.1", 0)).map_err(TransportError::Io)?;
		let addr = listener.local_addr().map_err(TransportError::Io)?;

		Ok(Self { listener, addr, read_timeout: READ_TIMEOUT })
	}

	/// Overrides how long an accepted connection may stay silent before it is dropped.
	pub fn with_read_timeout(mut self, timeout: StdDuration) -> Self {
		self.read_timeout = timeout;

		self
	}

	/// Redirect URI to register in the authorize URL.
	pub fn redirect_uri(&self) -> Result<Url> {
		Url::parse(&format!("http://{}/", self.addr)).map_err(|_| {
			ConfigError::InvalidUrl { name: "redirect_uri", value: self.addr.to_string() }.into()
		})
	}

	/// Blocks until a request carrying a code or an error arrives.
	///
	/// Connections that stay idle or break before sending a request line are dropped and the
	/// listener keeps accepting. Only a failing listener ends the wait early.
	pub fn wait(self) -> Result<RedirectOutcome> {
		loop {
			let (stream, _peer) = self.listener.accept().map_err(TransportError::Io)?;

			match handle_connection(stream, self.read_timeout) {
				Ok(Some(outcome)) => return Ok(outcome),
				Ok(None) => continue,
				Err(_e) => {
					#[cfg(feature = "tracing")]
					tracing::debug!(error = %_e, peer = %_peer, "dropping redirect connection");
				},
			}
		}
	}
}

fn handle_connection(
	mut stream: TcpStream,
	read_timeout: StdDuration,
) -> Result<Option<RedirectOutcome>> {
	stream.set_read_timeout(Some(read_timeout)).map_err(TransportError::Io)?;

	let request_line = read_request_line(&stream)?;
	let outcome = request_line
		.split_whitespace()
		.nth(1)
		.and_then(RedirectOutcome::from_target);
	let (status, body) = match &outcome {
		Some(RedirectOutcome::Code { .. }) => ("200 OK", SUCCESS_PAGE),
		Some(RedirectOutcome::Error { .. }) => ("400 Bad Request", FAILURE_PAGE),
		None => ("404 Not Found", ""),
	};
	let response = format!(
		"HTTP/1.1 {status}\r\nContent-Type: text/html; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
		body.len()
	);

	// The outcome is already parsed; a browser that hung up early must not discard it.
	if let Err(_e) = stream.write_all(response.as_bytes()) {
		#[cfg(feature = "tracing")]
		tracing::debug!(error = %_e, "failed to answer redirect request");
	}

	Ok(outcome)
}

fn read_request_line(stream: &TcpStream) -> Result<String> {
	let mut reader = BufReader::new(stream);
	let mut request_line = String::new();

	reader.read_line(&mut request_line).map_err(TransportError::Io)?;

	// Drain headers so closing the socket does not reset the connection.
	loop {
		let mut header = String::new();
		let read = reader.read_line(&mut header).map_err(TransportError::Io)?;

		if read == 0 || header.trim().is_empty() {
			break;
		}
	}

	Ok(request_line)
}
