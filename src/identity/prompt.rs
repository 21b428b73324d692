//! Hand-off of the authorize URL to the user.

// self
use crate::_prelude::*;

/// Presents the authorize URL to the user during interactive acquisition.
pub trait AuthorizationPrompt
where
	Self: Send + Sync,
{
	/// Shows `authorize_url`; the redirect listener takes over once this returns.
	fn present(&self, authorize_url: &Url) -> Result<()>;
}

/// Opens the system browser, falling back to printing the URL on stderr.
#[derive(Clone, Debug, Default)]
pub struct BrowserPrompt {
	headless: bool,
}
impl BrowserPrompt {
	/// Creates a prompt that never launches a browser and only prints the URL.
	pub fn headless() -> Self {
		Self { headless: true }
	}
}
impl AuthorizationPrompt for BrowserPrompt {
	fn present(&self, authorize_url: &Url) -> Result<()> {
		eprintln!("\n=== Sign in ===");

		if self.headless {
			eprintln!("Please open the following URL in a browser:");
			eprintln!();
			eprintln!("  {authorize_url}");
			eprintln!();
		} else {
			eprintln!("Opening browser to sign in.");
			eprintln!("\nIf the browser doesn't open automatically, visit:");
			eprintln!("  {authorize_url}\n");

			if let Err(e) = webbrowser::open(authorize_url.as_str()) {
				#[cfg(feature = "tracing")]
				tracing::warn!(error = %e, "browser launch failed");

				eprintln!("Could not open browser automatically: {e}");
				eprintln!("Please open the URL manually.\n");
			}
		}

		eprintln!("Waiting for authorization...");

		Ok(())
	}
}

/// Prompt that does nothing, for callers driving the redirect themselves.
#[derive(Clone, Copy, Debug, Default)]
pub struct SilentPrompt;
impl AuthorizationPrompt for SilentPrompt {
	fn present(&self, _: &Url) -> Result<()> {
		Ok(())
	}
}
