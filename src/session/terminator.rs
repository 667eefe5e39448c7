//! Session boundary: credential installation, local logout, and termination after an
//! unrecoverable refresh failure.

// std
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
// self
use crate::{
	_prelude::*,
	auth::CredentialPair,
	error::RefreshError,
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
	store::{CredentialStore, StoreError},
};

/// Hook that returns the application to its unauthenticated entry point.
pub trait LoginRedirect
where
	Self: Send + Sync,
{
	/// Navigates to `entry_point` (for example `/login`).
	fn redirect_to_login(&self, entry_point: &str);
}
impl<F> LoginRedirect for F
where
	F: Fn(&str) + Send + Sync,
{
	fn redirect_to_login(&self, entry_point: &str) {
		self(entry_point)
	}
}

/// Redirect hook for headless callers that only need the credentials cleared.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopRedirect;
impl LoginRedirect for NoopRedirect {
	fn redirect_to_login(&self, _entry_point: &str) {}
}

/// Owns the session boundary: who may write credentials, and when the user is sent to login.
///
/// Every session has a generation number. Login, logout, and termination start a new
/// generation under one lock, and a refresh only persists its pair when the generation it
/// started in is still current. Termination is idempotent: every call clears the store, but
/// only the first call after [`SessionTerminator::rearm`] (or construction) redirects.
pub struct SessionTerminator {
	store: Arc<dyn CredentialStore>,
	redirect: Arc<dyn LoginRedirect>,
	entry_point: String,
	generation: Mutex<u64>,
	terminated: AtomicBool,
	redirects: AtomicU64,
}
impl SessionTerminator {
	/// Creates a terminator redirecting to `entry_point`.
	pub fn new(
		store: Arc<dyn CredentialStore>,
		redirect: Arc<dyn LoginRedirect>,
		entry_point: impl Into<String>,
	) -> Self {
		Self {
			store,
			redirect,
			entry_point: entry_point.into(),
			generation: Mutex::new(0),
			terminated: AtomicBool::new(false),
			redirects: AtomicU64::new(0),
		}
	}

	/// Returns the current session generation.
	pub fn generation(&self) -> u64 {
		*self.generation.lock()
	}

	/// Installs `pair` as a new session and re-arms the redirect.
	pub fn begin_session(&self, pair: CredentialPair) -> Result<(), StoreError> {
		let mut generation = self.generation.lock();

		self.store.set(pair)?;
		*generation += 1;
		self.rearm();

		Ok(())
	}

	/// Ends the session locally without redirecting; an in-flight refresh will not persist.
	pub fn end_session(&self) -> Result<(), StoreError> {
		let mut generation = self.generation.lock();

		*generation += 1;

		self.store.clear()
	}

	/// Writes a refreshed pair if `generation` is still current.
	///
	/// Returns `Ok(false)` and leaves the store untouched when the session moved on.
	pub fn persist_refreshed(
		&self,
		generation: u64,
		pair: CredentialPair,
	) -> Result<bool, StoreError> {
		let current = self.generation.lock();

		if *current != generation {
			tracing::debug!(
				started = generation,
				current = *current,
				"session changed during refresh; discarding refreshed pair"
			);

			return Ok(false);
		}

		self.store.set(pair)?;
		self.rearm();

		Ok(true)
	}

	/// Clears the credentials and, unless this session was already terminated, redirects.
	///
	/// A store failure is logged and does not prevent the redirect.
	pub fn terminate(&self, reason: &RefreshError) {
		self.end(None, reason);
	}

	/// Terminates only if `generation` is still current; returns whether it did.
	pub fn terminate_generation(&self, generation: u64, reason: &RefreshError) -> bool {
		self.end(Some(generation), reason)
	}

	// The redirect hook runs after the session lock is released, so it may call back into the
	// client.
	fn end(&self, expected: Option<u64>, reason: &RefreshError) -> bool {
		let _span = FlowSpan::new(FlowKind::Terminate, "terminate").entered();

		{
			let mut current = self.generation.lock();

			if expected.is_some_and(|generation| generation != *current) {
				tracing::debug!(reason = %reason, "session changed during refresh; not terminating");

				return false;
			}
			if let Err(e) = self.store.clear() {
				tracing::error!(error = %e, "failed to clear credentials during session termination");
			}

			*current += 1;
		}

		if self.terminated.swap(true, Ordering::AcqRel) {
			tracing::debug!("session already terminated; skipping redirect");

			return true;
		}

		tracing::warn!(reason = %reason, entry_point = %self.entry_point, "session terminated");
		obs::record_flow_outcome(FlowKind::Terminate, FlowOutcome::Success);
		self.redirects.fetch_add(1, Ordering::Relaxed);
		self.redirect.redirect_to_login(&self.entry_point);

		true
	}

	/// Marks a new session as live so the next termination redirects again.
	pub fn rearm(&self) {
		self.terminated.store(false, Ordering::Release);
	}

	/// Returns `true` once the current session has been terminated.
	pub fn is_terminated(&self) -> bool {
		self.terminated.load(Ordering::Acquire)
	}

	/// Returns the number of effective redirects issued over the terminator's lifetime.
	pub fn redirects(&self) -> u64 {
		self.redirects.load(Ordering::Relaxed)
	}

	/// Returns the configured entry point.
	pub fn entry_point(&self) -> &str {
		&self.entry_point
	}
}
impl Debug for SessionTerminator {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("SessionTerminator")
			.field("entry_point", &self.entry_point)
			.field("generation", &self.generation())
			.field("terminated", &self.is_terminated())
			.finish()
	}
}
