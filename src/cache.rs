//! Dual-credential cache: identity bundle upstream, storage bundle downstream, one clock.
//!
//! Freshness of both bundles is judged by the identity bundle's engine-stamped expiry alone.
//! Each storage entry remembers the identity expiry it was derived from and is reusable only
//! while that identity is the current, unexpired one. The storage bundle's own `expiration` is
//! recorded but never consulted, so the two bundles go stale together:
//!
//! ```text
//! IDENTITY: EMPTY --interactive--> VALID --(expiry)--> EXPIRED --refresh--> VALID --force--> EXPIRED
//! STORAGE:  EMPTY --(valid identity) exchange--> VALID --(identity EXPIRED)--> STALE
//! ```
//!
//! Every upstream result is validated before it replaces a cached bundle, and nothing is
//! retried internally.

mod metrics;

pub use metrics::CredentialMetrics;

// self
use crate::{
	_prelude::*,
	auth::{IdentityBundle, StorageBundle},
	config::Settings,
	exchange::{AssumeRoleRequest, StorageExchanger},
	identity::{IDENTITY_SCOPES, IdentityProvider},
	obs::{self, FlowKind},
};

/// Owner of the identity and storage credential bundles.
///
/// Single-owner by construction: every mutating accessor takes `&mut self`, so concurrent use
/// requires the caller's own synchronization.
pub struct CredentialCache {
	identity_provider: Arc<dyn IdentityProvider>,
	exchanger: Arc<dyn StorageExchanger>,
	role_arn: String,
	session_name: String,
	validity: Duration,
	identity: Option<IdentityBundle>,
	storage: Option<StorageEntry>,
	metrics: Arc<CredentialMetrics>,
}
impl CredentialCache {
	/// Creates an empty cache over the provided capabilities.
	pub fn new(
		identity_provider: Arc<dyn IdentityProvider>,
		exchanger: Arc<dyn StorageExchanger>,
		role_arn: impl Into<String>,
		session_name: impl Into<String>,
		validity: Duration,
	) -> Self {
		Self {
			identity_provider,
			exchanger,
			role_arn: role_arn.into(),
			session_name: session_name.into(),
			validity,
			identity: None,
			storage: None,
			metrics: Default::default(),
		}
	}

	/// Creates an empty cache using the role, session name, and validity from `settings`.
	pub fn from_settings(
		settings: &Settings,
		identity_provider: Arc<dyn IdentityProvider>,
		exchanger: Arc<dyn StorageExchanger>,
	) -> Self {
		Self::new(
			identity_provider,
			exchanger,
			&settings.aws_role,
			&settings.session_name,
			settings.credential_validity,
		)
	}

	/// Engine-controlled validity applied to every identity acquisition.
	pub fn validity(&self) -> Duration {
		self.validity
	}

	/// Shared activity counters.
	pub fn metrics(&self) -> Arc<CredentialMetrics> {
		self.metrics.clone()
	}

	/// Returns `true` unless an identity bundle exists whose expiry lies strictly in the future.
	pub fn is_expired(&self) -> bool {
		self.is_expired_at(OffsetDateTime::now_utc())
	}

	/// Evaluates [`is_expired`](Self::is_expired) at a fixed instant.
	pub fn is_expired_at(&self, instant: OffsetDateTime) -> bool {
		!self.identity.as_ref().is_some_and(|bundle| bundle.is_valid_at(instant))
	}

	/// Cached identity bundle, without triggering any renewal.
	pub fn cached_identity(&self) -> Option<&IdentityBundle> {
		self.identity.as_ref()
	}

	/// Cached storage bundle, without triggering any renewal.
	pub fn cached_storage(&self) -> Option<&StorageBundle> {
		self.storage.as_ref().map(|entry| &entry.bundle)
	}

	/// Returns valid identity credentials, renewing them first if expired.
	///
	/// Renewal uses the refresh token when the cached bundle carries one and the interactive
	/// flow otherwise. The new bundle expires `validity` after the renewal started.
	pub fn identity_credentials(&mut self) -> Result<&IdentityBundle> {
		if self.is_expired() {
			self.renew_identity()?;
		} else {
			self.metrics.record_cache_hit();
		}

		self.identity
			.as_ref()
			.ok_or_else(|| Error::authentication("identity credentials are unavailable"))
	}

	/// Returns storage credentials, exchanging a fresh bearer token first if needed.
	///
	/// A cached bundle is reused while the identity it was derived from is still the current,
	/// unexpired identity, even if the bundle's own expiration has passed. Renewing the identity
	/// through any other accessor leaves the bundle stale.
	pub fn storage_credentials(&mut self) -> Result<&StorageBundle> {
		if self.storage_is_current_at(OffsetDateTime::now_utc()) {
			self.metrics.record_cache_hit();
		} else {
			self.renew_storage()?;
		}

		self.storage
			.as_ref()
			.map(|entry| &entry.bundle)
			.ok_or_else(|| Error::exchange("storage credentials are unavailable"))
	}

	/// Returns `true` if the cached storage bundle was derived from the current identity and that
	/// identity is valid at `instant`.
	pub fn storage_is_current_at(&self, instant: OffsetDateTime) -> bool {
		let (Some(identity), Some(entry)) = (&self.identity, &self.storage) else {
			return false;
		};

		identity.is_valid_at(instant) && entry.valid_until == identity.expires_at
	}

	/// Makes both bundles valid; with `force`, the identity is treated as expired first.
	pub fn refresh_credentials(&mut self, force: bool) -> Result<()> {
		if !force {
			return self.storage_credentials().map(|_| ());
		}

		obs::observe(FlowKind::ForceRefresh, "refresh_credentials", || {
			if let Some(identity) = self.identity.as_mut() {
				identity.invalidate();
			}

			self.storage_credentials().map(|_| ())
		})
	}

	/// Drops both bundles so the next access starts with the interactive flow.
	pub fn clear_credentials(&mut self) {
		self.identity = None;
		self.storage = None;
	}

	/// Replaces the cached identity bundle without validation.
	#[cfg(any(test, feature = "test"))]
	pub fn seed_identity(&mut self, bundle: IdentityBundle) {
		self.identity = Some(bundle);
	}

	/// Replaces the cached storage bundle without validation, binding it to the currently
	/// cached identity.
	#[cfg(any(test, feature = "test"))]
	pub fn seed_storage(&mut self, bundle: StorageBundle) {
		let valid_until = self.identity.as_ref().and_then(|identity| identity.expires_at);

		self.storage = Some(StorageEntry { bundle, valid_until });
	}

	fn renew_identity(&mut self) -> Result<()> {
		let refresh_token = self
			.identity
			.as_ref()
			.and_then(|bundle| bundle.refresh_token.as_ref())
			.map(|token| token.expose().to_owned());
		let (kind, stage) = match refresh_token {
			Some(_) => (FlowKind::Refresh, "acquire_by_refresh"),
			None => (FlowKind::Interactive, "acquire_interactive"),
		};
		let issued_at = OffsetDateTime::now_utc();
		let provider = &self.identity_provider;
		let bundle = obs::observe(kind, stage, || {
			let grant = match &refresh_token {
				Some(token) => provider.acquire_by_refresh(token, &IDENTITY_SCOPES),
				None => provider.acquire_interactive(&IDENTITY_SCOPES),
			}?;

			grant.into_bundle(issued_at, self.validity)
		})
		.inspect_err(|_| self.metrics.record_failure())?;

		match kind {
			FlowKind::Refresh => self.metrics.record_refresh(),
			_ => self.metrics.record_interactive(),
		}

		self.identity = Some(bundle);

		Ok(())
	}

	fn renew_storage(&mut self) -> Result<()> {
		let identity = self.identity_credentials()?;
		let bearer_token = identity.bearer_token.clone();
		let valid_until = identity.expires_at;
		let request = AssumeRoleRequest {
			duration: self.validity,
			role_arn: &self.role_arn,
			session_name: &self.session_name,
			web_identity_token: bearer_token.expose(),
		};
		let exchanger = &self.exchanger;
		let bundle = obs::observe(FlowKind::StorageExchange, "assume_role_with_web_identity", || {
			exchanger.assume_role_with_web_identity(&request)?.into_bundle()
		})
		.inspect_err(|_| self.metrics.record_failure())?;

		self.metrics.record_exchange();
		self.storage = Some(StorageEntry { bundle, valid_until });

		Ok(())
	}
}
impl Debug for CredentialCache {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("CredentialCache")
			.field("role_arn", &self.role_arn)
			.field("session_name", &self.session_name)
			.field("validity", &self.validity)
			.field("identity", &self.identity)
			.field("storage", &self.storage)
			.finish()
	}
}

/// Storage bundle plus the identity expiry it was derived from.
#[derive(Clone, Debug)]
struct StorageEntry {
	bundle: StorageBundle,
	valid_until: Option<OffsetDateTime>,
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::{
		auth::IdentityGrant,
		exchange::{ExchangeResult, StorageCredentialsPayload},
	};

	const ROLE: &str = "arn:aws:iam::123456789012:role/reader";

	#[derive(Clone, Debug, PartialEq, Eq)]
	enum IdentityCall {
		Interactive,
		Refresh(String),
	}

	struct FakeIdentity {
		calls: Mutex<Vec<IdentityCall>>,
		grant: Mutex<IdentityGrant>,
	}
	impl FakeIdentity {
		fn returning(grant: IdentityGrant) -> Arc<Self> {
			Arc::new(Self { calls: Mutex::new(Vec::new()), grant: Mutex::new(grant) })
		}

		fn calls(&self) -> Vec<IdentityCall> {
			self.calls.lock().clone()
		}
	}
	impl IdentityProvider for FakeIdentity {
		fn acquire_interactive(&self, scopes: &[&str]) -> Result<IdentityGrant> {
			assert_eq!(scopes, IDENTITY_SCOPES);

			self.calls.lock().push(IdentityCall::Interactive);

			Ok(self.grant.lock().clone())
		}

		fn acquire_by_refresh(&self, refresh_token: &str, scopes: &[&str]) -> Result<IdentityGrant> {
			assert_eq!(scopes, IDENTITY_SCOPES);

			self.calls.lock().push(IdentityCall::Refresh(refresh_token.to_owned()));

			Ok(self.grant.lock().clone())
		}
	}

	#[derive(Clone, Debug, PartialEq, Eq)]
	struct ExchangeCall {
		duration: Duration,
		role_arn: String,
		session_name: String,
		token: String,
	}

	struct FakeExchanger {
		calls: Mutex<Vec<ExchangeCall>>,
		result: Mutex<ExchangeResult>,
	}
	impl FakeExchanger {
		fn returning(result: ExchangeResult) -> Arc<Self> {
			Arc::new(Self { calls: Mutex::new(Vec::new()), result: Mutex::new(result) })
		}

		fn calls(&self) -> Vec<ExchangeCall> {
			self.calls.lock().clone()
		}
	}
	impl StorageExchanger for FakeExchanger {
		fn assume_role_with_web_identity(
			&self,
			request: &AssumeRoleRequest<'_>,
		) -> Result<ExchangeResult> {
			self.calls.lock().push(ExchangeCall {
				duration: request.duration,
				role_arn: request.role_arn.to_owned(),
				session_name: request.session_name.to_owned(),
				token: request.web_identity_token.to_owned(),
			});

			Ok(self.result.lock().clone())
		}
	}

	fn fresh_grant() -> IdentityGrant {
		IdentityGrant::new("fresh").with_refresh_token("r2").with_expires_in(Duration::seconds(5021))
	}

	fn credentials(access_key_id: &str) -> ExchangeResult {
		ExchangeResult::new(StorageCredentialsPayload {
			access_key_id: access_key_id.into(),
			secret_access_key: "secret".into(),
			session_token: "session".into(),
			expiration: OffsetDateTime::now_utc() + Duration::hours(1),
		})
	}

	fn cache(identity: &Arc<FakeIdentity>, exchanger: &Arc<FakeExchanger>) -> CredentialCache {
		CredentialCache::new(
			identity.clone(),
			exchanger.clone(),
			ROLE,
			"prescient-s3-access",
			Duration::hours(1),
		)
	}

	fn expired_identity() -> IdentityBundle {
		IdentityBundle::new("expired")
			.with_refresh_token("r")
			.expiring_at(OffsetDateTime::now_utc() - Duration::hours(1))
	}

	fn valid_identity() -> IdentityBundle {
		IdentityBundle::new("cached")
			.with_refresh_token("r")
			.expiring_at(OffsetDateTime::now_utc() + Duration::hours(1))
	}

	#[test]
	fn empty_cache_is_expired() {
		let identity = FakeIdentity::returning(fresh_grant());
		let exchanger = FakeExchanger::returning(credentials("AKIA"));
		let mut cache = cache(&identity, &exchanger);

		assert!(cache.is_expired());

		let instant = OffsetDateTime::now_utc() + Duration::minutes(5);

		cache.seed_identity(IdentityBundle::new("token").expiring_at(instant));

		assert!(!cache.is_expired_at(instant - Duration::SECOND));
		assert!(cache.is_expired_at(instant));
	}

	#[test]
	fn valid_identity_is_reused_without_calls() {
		let identity = FakeIdentity::returning(fresh_grant());
		let exchanger = FakeExchanger::returning(credentials("AKIA"));
		let mut cache = cache(&identity, &exchanger);
		let seeded = valid_identity();

		cache.seed_identity(seeded.clone());

		let bundle = cache.identity_credentials().expect("Cached identity should be returned.");

		assert_eq!(bundle.bearer_token, seeded.bearer_token);
		assert_eq!(bundle.expires_at, seeded.expires_at);
		assert!(identity.calls().is_empty());
		assert_eq!(cache.metrics().cache_hits(), 1);
	}

	#[test]
	fn expired_identity_with_refresh_token_is_refreshed() {
		let identity = FakeIdentity::returning(fresh_grant());
		let exchanger = FakeExchanger::returning(credentials("AKIA"));
		let mut cache = cache(&identity, &exchanger);

		cache.seed_identity(expired_identity());

		let before = OffsetDateTime::now_utc();
		let bundle =
			cache.identity_credentials().expect("Refresh should produce a new identity.").clone();
		let after = OffsetDateTime::now_utc();
		let expires_at = bundle.expires_at.expect("Renewed bundle carries an expiry.");

		assert_eq!(identity.calls(), vec![IdentityCall::Refresh("r".into())]);
		assert_eq!(bundle.bearer_token.expose(), "fresh");
		assert!(expires_at > after);
		assert!(expires_at >= before + Duration::hours(1));
		assert!(expires_at <= after + Duration::hours(1));
		assert_eq!(bundle.provider_expires_in, Some(Duration::seconds(5021)));
		assert_eq!(cache.metrics().refreshes(), 1);
	}

	#[test]
	fn missing_bundle_triggers_interactive_acquisition() {
		let identity = FakeIdentity::returning(fresh_grant());
		let exchanger = FakeExchanger::returning(credentials("AKIA"));
		let mut cache = cache(&identity, &exchanger);

		cache.identity_credentials().expect("Interactive acquisition should succeed.");

		assert_eq!(identity.calls(), vec![IdentityCall::Interactive]);
		assert_eq!(cache.metrics().interactive_acquisitions(), 1);
	}

	#[test]
	fn expired_bundle_without_refresh_token_goes_interactive() {
		let identity = FakeIdentity::returning(fresh_grant());
		let exchanger = FakeExchanger::returning(credentials("AKIA"));
		let mut cache = cache(&identity, &exchanger);

		cache.seed_identity(
			IdentityBundle::new("old").expiring_at(OffsetDateTime::now_utc() - Duration::hours(1)),
		);
		cache.identity_credentials().expect("Interactive acquisition should succeed.");

		assert_eq!(identity.calls(), vec![IdentityCall::Interactive]);
	}

	#[test]
	fn storage_exchange_refreshes_identity_first() {
		let identity = FakeIdentity::returning(fresh_grant());
		let exchanger = FakeExchanger::returning(credentials("AKIA"));
		let mut cache = cache(&identity, &exchanger);

		cache.seed_identity(expired_identity());

		let bundle = cache.storage_credentials().expect("Exchange should succeed.").clone();

		assert_eq!(identity.calls(), vec![IdentityCall::Refresh("r".into())]);
		assert_eq!(
			exchanger.calls(),
			vec![ExchangeCall {
				duration: Duration::hours(1),
				role_arn: ROLE.into(),
				session_name: "prescient-s3-access".into(),
				token: "fresh".into(),
			}]
		);
		assert_eq!(bundle.access_key_id, "AKIA");
	}

	#[test]
	fn stale_storage_expiration_is_ignored_while_identity_is_valid() {
		let identity = FakeIdentity::returning(fresh_grant());
		let exchanger = FakeExchanger::returning(credentials("NEW"));
		let mut cache = cache(&identity, &exchanger);

		cache.seed_identity(valid_identity());
		cache.seed_storage(StorageBundle::new(
			"OLD",
			"secret",
			"session",
			OffsetDateTime::now_utc() - Duration::hours(1),
		));

		let bundle = cache.storage_credentials().expect("Cached storage should be returned.");

		assert_eq!(bundle.access_key_id, "OLD");
		assert!(exchanger.calls().is_empty());
		assert!(identity.calls().is_empty());
	}

	#[test]
	fn force_refresh_renews_both_bundles_once() {
		let identity = FakeIdentity::returning(fresh_grant());
		let exchanger = FakeExchanger::returning(credentials("NEW"));
		let mut cache = cache(&identity, &exchanger);

		cache.seed_identity(valid_identity());
		cache.seed_storage(StorageBundle::new(
			"OLD",
			"secret",
			"session",
			OffsetDateTime::now_utc() + Duration::hours(1),
		));
		cache.refresh_credentials(true).expect("Forced refresh should succeed.");

		assert_eq!(identity.calls(), vec![IdentityCall::Refresh("r".into())]);
		assert_eq!(exchanger.calls().len(), 1);
		assert!(!cache.is_expired());
		assert_eq!(cache.cached_storage().map(|bundle| bundle.access_key_id.as_str()), Some("NEW"));
	}

	#[test]
	fn unforced_refresh_reuses_valid_credentials() {
		let identity = FakeIdentity::returning(fresh_grant());
		let exchanger = FakeExchanger::returning(credentials("AKIA"));
		let mut cache = cache(&identity, &exchanger);

		cache.refresh_credentials(false).expect("Initial refresh should succeed.");
		cache.refresh_credentials(false).expect("Second refresh should reuse the cache.");

		assert_eq!(identity.calls(), vec![IdentityCall::Interactive]);
		assert_eq!(exchanger.calls().len(), 1);
	}

	#[test]
	fn empty_exchange_keeps_previous_storage_bundle() {
		let identity = FakeIdentity::returning(fresh_grant());
		let exchanger = FakeExchanger::returning(ExchangeResult::default());
		let mut cache = cache(&identity, &exchanger);

		cache.seed_identity(expired_identity());
		cache.seed_storage(StorageBundle::new(
			"OLD",
			"secret",
			"session",
			OffsetDateTime::now_utc() + Duration::hours(1),
		));

		let err = cache.storage_credentials().expect_err("Empty payload should fail.");

		assert!(matches!(err, Error::CredentialExchangeFailure { .. }));
		assert_eq!(cache.cached_storage().map(|bundle| bundle.access_key_id.as_str()), Some("OLD"));
		assert_eq!(cache.metrics().failures(), 1);
	}

	#[test]
	fn empty_bearer_token_keeps_previous_identity_bundle() {
		let identity = FakeIdentity::returning(IdentityGrant::default().with_refresh_token("r2"));
		let exchanger = FakeExchanger::returning(credentials("AKIA"));
		let mut cache = cache(&identity, &exchanger);

		cache.seed_identity(expired_identity());

		let err = cache.identity_credentials().expect_err("Missing bearer token should fail.");

		assert!(matches!(err, Error::AuthenticationFailure { .. }));
		assert_eq!(
			cache.cached_identity().map(|bundle| bundle.bearer_token.expose()),
			Some("expired")
		);
		assert!(cache.is_expired());
	}

	#[test]
	fn identity_renewed_elsewhere_leaves_storage_stale() {
		let identity = FakeIdentity::returning(fresh_grant());
		let exchanger = FakeExchanger::returning(credentials("NEW"));
		let mut cache = cache(&identity, &exchanger);

		cache.seed_identity(expired_identity());
		cache.seed_storage(StorageBundle::new(
			"OLD",
			"secret",
			"session",
			OffsetDateTime::now_utc() + Duration::hours(1),
		));
		cache.identity_credentials().expect("Refresh should produce a new identity.");

		assert!(!cache.is_expired());
		assert!(!cache.storage_is_current_at(OffsetDateTime::now_utc()));

		let bundle = cache.storage_credentials().expect("Exchange should succeed.");

		assert_eq!(bundle.access_key_id, "NEW");
		assert_eq!(identity.calls(), vec![IdentityCall::Refresh("r".into())]);
		assert_eq!(exchanger.calls().len(), 1);
		assert_eq!(exchanger.calls()[0].token, "fresh");
	}

	#[test]
	fn failed_exchange_after_identity_renewal_is_retried() {
		let identity = FakeIdentity::returning(fresh_grant());
		let exchanger = FakeExchanger::returning(ExchangeResult::default());
		let mut cache = cache(&identity, &exchanger);

		cache.seed_identity(expired_identity());
		cache.seed_storage(StorageBundle::new(
			"OLD",
			"secret",
			"session",
			OffsetDateTime::now_utc() + Duration::hours(1),
		));

		let err = cache.storage_credentials().expect_err("Empty payload should fail.");

		assert!(matches!(err, Error::CredentialExchangeFailure { .. }));
		assert!(!cache.is_expired());

		*exchanger.result.lock() = credentials("NEW");

		let bundle = cache.storage_credentials().expect("Second exchange should succeed.");

		assert_eq!(bundle.access_key_id, "NEW");
		assert_eq!(identity.calls(), vec![IdentityCall::Refresh("r".into())]);
		assert_eq!(exchanger.calls().len(), 2);
		assert!(exchanger.calls().iter().all(|call| call.token == "fresh"));
	}

	#[test]
	fn clearing_credentials_restarts_interactive_flow() {
		let identity = FakeIdentity::returning(fresh_grant());
		let exchanger = FakeExchanger::returning(credentials("AKIA"));
		let mut cache = cache(&identity, &exchanger);

		cache.seed_identity(valid_identity());
		cache.clear_credentials();

		assert!(cache.cached_storage().is_none());

		cache.identity_credentials().expect("Interactive acquisition should succeed.");

		assert_eq!(identity.calls(), vec![IdentityCall::Interactive]);
	}
}
