//! Signs in through the browser, trades the identity token for storage credentials, and prints
//! the catalog URL plus the `AWS_*` variables a storage SDK would consume.
//!
//! Usage: `cargo run --example catalog_session -- [path/to/config.env]`.

// std
use std::path::PathBuf;
// crates.io
use color_eyre::Result;
// self
use prescient_sdk::Client;

fn main() -> Result<()> {
	color_eyre::install()?;

	let env_file = std::env::args_os().nth(1).map(PathBuf::from);
	let mut client = Client::connect(env_file.as_deref(), None)?;

	println!("Catalog API: {}.", client.catalog_url());

	client.refresh_credentials(false)?;

	let expires_at = client.cache().cached_identity().and_then(|identity| identity.expires_at);
	let headers = client.headers()?;

	println!("Identity valid until {expires_at:?}; sending {} catalog headers.", headers.len());

	for (name, value) in client.session()?.env_vars() {
		let shown = match name {
			"AWS_ACCESS_KEY_ID" | "AWS_REGION" => value,
			_ => "<redacted>".into(),
		};

		println!("{name}={shown}");
	}

	Ok(())
}
