//! Optional observability helpers for credential flows.
//!
//! # Feature Flags
//!
//! - Enable `tracing` to emit structured spans named `prescient_sdk.flow` with the `flow` and
//!   `stage` (call site) fields.
//! - Enable `metrics` to increment the `prescient_sdk_flow_total` counter for every
//!   attempt/success/failure, labeled by `flow` + `outcome`.

mod metrics;
mod tracing;

pub use metrics::*;
pub use tracing::*;

// self
use crate::_prelude::*;

/// Credential flows observed by the cache.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FlowKind {
	/// First-time interactive identity acquisition.
	Interactive,
	/// Silent identity renewal with a refresh token.
	Refresh,
	/// Bearer-token-for-storage-credentials exchange.
	StorageExchange,
	/// Caller-requested renewal of both bundles.
	ForceRefresh,
}
impl FlowKind {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			FlowKind::Interactive => "interactive",
			FlowKind::Refresh => "refresh",
			FlowKind::StorageExchange => "storage_exchange",
			FlowKind::ForceRefresh => "force_refresh",
		}
	}
}
impl Display for FlowKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Outcome labels recorded for each attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FlowOutcome {
	/// Entry to a flow.
	Attempt,
	/// Successful completion.
	Success,
	/// Failure propagated back to the caller.
	Failure,
}
impl FlowOutcome {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			FlowOutcome::Attempt => "attempt",
			FlowOutcome::Success => "success",
			FlowOutcome::Failure => "failure",
		}
	}
}
impl Display for FlowOutcome {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Runs `f` inside a flow span, recording attempt and outcome.
pub fn observe<T>(kind: FlowKind, stage: &'static str, f: impl FnOnce() -> Result<T>) -> Result<T> {
	let _guard = FlowSpan::new(kind, stage).entered();

	record_flow_outcome(kind, FlowOutcome::Attempt);

	let result = f();

	match &result {
		Ok(_) => record_flow_outcome(kind, FlowOutcome::Success),
		Err(_e) => {
			#[cfg(feature = "tracing")]
			::tracing::warn!(error = %_e, flow = kind.as_str(), "credential flow failed");

			record_flow_outcome(kind, FlowOutcome::Failure);
		},
	}

	result
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn labels_are_stable() {
		assert_eq!(FlowKind::StorageExchange.to_string(), "storage_exchange");
		assert_eq!(FlowOutcome::Failure.as_str(), "failure");
	}

	#[test]
	fn observe_passes_results_through() {
		let value = observe(FlowKind::Refresh, "test", || Ok(7)).expect("Closure result is Ok.");
		let err = observe::<()>(FlowKind::Interactive, "test", || Err(Error::authentication("no")));

		assert_eq!(value, 7);
		assert!(matches!(err, Err(Error::AuthenticationFailure { .. })));
	}
}
