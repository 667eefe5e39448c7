//! Observability helpers for session flows.
//!
//! Every refresh cycle, replay, and termination runs inside a span named `bearer_session.flow`
//! with `flow` and `stage` fields.
//!
//! # Feature Flags
//!
//! - Enable `metrics` to increment the `bearer_session_flow_total` counter for every
//!   outcome, labeled by `flow` and `outcome`. Without it outcomes are only traced.

mod span;

pub use span::*;

// self
use crate::_prelude::*;

/// Session flow kinds observed by the client.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FlowKind {
	/// Single-flight refresh cycle.
	Refresh,
	/// Replay of a request after a successful refresh.
	Replay,
	/// Session termination after an unrecoverable refresh failure.
	Terminate,
	/// Credential issuance through login or registration.
	Login,
}
impl FlowKind {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			FlowKind::Refresh => "refresh",
			FlowKind::Replay => "replay",
			FlowKind::Terminate => "terminate",
			FlowKind::Login => "login",
		}
	}
}
impl Display for FlowKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Outcome labels recorded for each flow.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FlowOutcome {
	/// Entry to a flow.
	Attempt,
	/// Successful completion.
	Success,
	/// Failure propagated back to the caller.
	Failure,
	/// Caller joined a flow already in progress instead of starting one.
	Coalesced,
}
impl FlowOutcome {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			FlowOutcome::Attempt => "attempt",
			FlowOutcome::Success => "success",
			FlowOutcome::Failure => "failure",
			FlowOutcome::Coalesced => "coalesced",
		}
	}
}
impl Display for FlowOutcome {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Reports one flow outcome as a `trace` event and, with `metrics` enabled, a counter increment.
///
/// `Attempt` is reported only when a network call is actually issued.
pub fn record_flow_outcome(kind: FlowKind, outcome: FlowOutcome) {
	tracing::trace!(flow = %kind, outcome = %outcome, "session flow outcome");

	#[cfg(feature = "metrics")]
	metrics::counter!(
		"bearer_session_flow_total",
		"flow" => kind.as_str(),
		"outcome" => outcome.as_str()
	)
	.increment(1);
}
