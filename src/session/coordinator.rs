//! Single-flight refresh coordination.
//!
//! [`RefreshCoordinator::ensure_fresh_token`] either starts a refresh cycle (state `Idle`) or
//! joins the cycle already in flight (state `Refreshing`). The state and its waiter list live
//! behind one mutex, so the check-then-set that elects the starting caller is atomic even on a
//! multi-threaded runtime; the lock is never held across an `.await`.
//!
//! A cycle runs on its own task, detached from every caller. Cancelling the request that started
//! it does not cancel the refresh call, so a pair the server has already rotated is always
//! persisted. The cycle's side effects (persisting the new pair, or terminating the session)
//! complete before the state returns to `Idle`, and every caller then receives a clone of the
//! same outcome.

mod metrics;

pub use metrics::RefreshMetrics;

// std
use std::mem;
// crates.io
use tokio::sync::oneshot;
// self
use crate::{
	_prelude::*,
	auth::{CredentialPair, TokenSecret},
	error::RefreshError,
	http::TokenRefresher,
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
	session::SessionTerminator,
	store::CredentialStore,
};

type RefreshOutcome = Result<TokenSecret, RefreshError>;
type Waiter = oneshot::Sender<RefreshOutcome>;

/// Observable coordinator state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RefreshPhase {
	/// No refresh call is in flight.
	Idle,
	/// A refresh call is in flight; new callers queue behind it.
	Refreshing,
}

enum RefreshState {
	Idle,
	Refreshing { waiters: Vec<Waiter> },
}

/// Serializes refresh calls so concurrent session-expiry recoveries share one network call.
///
/// Must be used from within a Tokio runtime; each cycle is spawned onto it.
pub struct RefreshCoordinator {
	store: Arc<dyn CredentialStore>,
	refresher: Arc<dyn TokenRefresher>,
	terminator: Arc<SessionTerminator>,
	refresh_timeout: Option<Duration>,
	metrics: Arc<RefreshMetrics>,
	state: Arc<Mutex<RefreshState>>,
}
impl RefreshCoordinator {
	/// Creates an idle coordinator.
	pub fn new(
		store: Arc<dyn CredentialStore>,
		refresher: Arc<dyn TokenRefresher>,
		terminator: Arc<SessionTerminator>,
	) -> Self {
		Self {
			store,
			refresher,
			terminator,
			refresh_timeout: None,
			metrics: Default::default(),
			state: Arc::new(Mutex::new(RefreshState::Idle)),
		}
	}

	/// Bounds every refresh call; expiry fails the cycle with [`RefreshError::TimedOut`].
	pub fn with_refresh_timeout(mut self, timeout: Option<Duration>) -> Self {
		self.refresh_timeout = timeout;

		self
	}

	/// Returns the shared refresh counters.
	pub fn metrics(&self) -> &Arc<RefreshMetrics> {
		&self.metrics
	}

	/// Returns the current phase.
	pub fn phase(&self) -> RefreshPhase {
		match &*self.state.lock() {
			RefreshState::Idle => RefreshPhase::Idle,
			RefreshState::Refreshing { .. } => RefreshPhase::Refreshing,
		}
	}

	/// Returns how many callers are waiting on the in-flight refresh, the starting one included.
	pub fn pending_waiters(&self) -> usize {
		match &*self.state.lock() {
			RefreshState::Idle => 0,
			RefreshState::Refreshing { waiters } => waiters.len(),
		}
	}

	/// Returns a fresh access token, refreshing at most once per cycle.
	///
	/// Callers arriving while a refresh is in flight wait for it and receive its outcome.
	/// Dropping any caller, including the one that started the cycle, leaves the cycle running.
	/// On failure the credentials are cleared and the session is terminated before any caller
	/// observes the error.
	pub async fn ensure_fresh_token(&self) -> Result<TokenSecret, RefreshError> {
		let (sender, receiver) = oneshot::channel();

		if self.enqueue(sender) {
			self.spawn_cycle();
		} else {
			self.metrics.record_coalesced();
			obs::record_flow_outcome(FlowKind::Refresh, FlowOutcome::Coalesced);
			tracing::debug!("refresh already in flight; waiting for its outcome");
		}

		receiver.await.unwrap_or(Err(RefreshError::Abandoned))
	}

	// Returns `true` when this caller opened a new cycle.
	fn enqueue(&self, waiter: Waiter) -> bool {
		let mut state = self.state.lock();

		if let RefreshState::Refreshing { waiters } = &mut *state {
			waiters.push(waiter);

			return false;
		}

		*state = RefreshState::Refreshing { waiters: vec![waiter] };

		true
	}

	fn spawn_cycle(&self) {
		let cycle = Cycle {
			store: self.store.clone(),
			refresher: self.refresher.clone(),
			terminator: self.terminator.clone(),
			refresh_timeout: self.refresh_timeout,
			metrics: self.metrics.clone(),
			state: self.state.clone(),
			generation: self.terminator.generation(),
			settled: false,
		};
		let span = FlowSpan::new(FlowKind::Refresh, "ensure_fresh_token");

		tokio::spawn(span.instrument(cycle.run()));
	}
}
impl Debug for RefreshCoordinator {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("RefreshCoordinator")
			.field("phase", &self.phase())
			.field("pending_waiters", &self.pending_waiters())
			.field("refresh_timeout", &self.refresh_timeout)
			.finish()
	}
}

/// One refresh cycle, owned by its task.
///
/// If the task stops before settling (runtime shutdown or a panicking refresher), the drop
/// returns the coordinator to `Idle` and releases every waiter with [`RefreshError::Abandoned`].
struct Cycle {
	store: Arc<dyn CredentialStore>,
	refresher: Arc<dyn TokenRefresher>,
	terminator: Arc<SessionTerminator>,
	refresh_timeout: Option<Duration>,
	metrics: Arc<RefreshMetrics>,
	state: Arc<Mutex<RefreshState>>,
	generation: u64,
	settled: bool,
}
impl Cycle {
	async fn run(mut self) {
		let outcome = self.refresh_once().await;

		match &outcome {
			Ok(_) => {
				self.metrics.record_success();
				obs::record_flow_outcome(FlowKind::Refresh, FlowOutcome::Success);
			},
			Err(RefreshError::Superseded) => {
				tracing::debug!("session changed during refresh; nothing to terminate");
			},
			Err(err) => {
				self.metrics.record_failure();
				obs::record_flow_outcome(FlowKind::Refresh, FlowOutcome::Failure);
				tracing::warn!(error = %err, "refresh failed; terminating session");
				self.terminator.terminate_generation(self.generation, err);
			},
		}

		let waiters = self.settle();

		tracing::debug!(waiters = waiters.len(), success = outcome.is_ok(), "refresh cycle settled");

		for waiter in waiters {
			// A waiter whose request was dropped no longer listens.
			let _ = waiter.send(outcome.clone());
		}
	}

	async fn refresh_once(&self) -> RefreshOutcome {
		let stored = self.store.get();
		let Some(refresh_token) = stored.as_ref().and_then(CredentialPair::refresh) else {
			tracing::debug!("no refresh token stored; skipping refresh call");

			return Err(RefreshError::MissingRefreshToken);
		};

		self.metrics.record_attempt();
		obs::record_flow_outcome(FlowKind::Refresh, FlowOutcome::Attempt);

		let call = self.refresher.refresh(refresh_token);
		let pair = match self.refresh_timeout {
			Some(limit) => tokio::time::timeout(limit, call)
				.await
				.map_err(|_| RefreshError::TimedOut(limit))??,
			None => call.await?,
		};
		let access_token = pair.access_token.clone();

		let persisted =
			self.terminator.persist_refreshed(self.generation, pair).map_err(RefreshError::Persist)?;

		if !persisted {
			return Err(RefreshError::Superseded);
		}

		Ok(access_token)
	}

	fn settle(&mut self) -> Vec<Waiter> {
		self.settled = true;

		drain(&self.state)
	}
}
impl Drop for Cycle {
	fn drop(&mut self) {
		if self.settled {
			return;
		}

		let waiters = drain(&self.state);

		tracing::warn!(waiters = waiters.len(), "refresh abandoned before it settled");

		for waiter in waiters {
			let _ = waiter.send(Err(RefreshError::Abandoned));
		}
	}
}

fn drain(state: &Mutex<RefreshState>) -> Vec<Waiter> {
	match mem::replace(&mut *state.lock(), RefreshState::Idle) {
		RefreshState::Idle => Vec::new(),
		RefreshState::Refreshing { waiters } => waiters,
	}
}

#[cfg(test)]
mod tests {
	// std
	use std::sync::atomic::{AtomicUsize, Ordering};
	// crates.io
	use tokio::{sync::Semaphore, task::JoinHandle};
	// self
	use super::*;
	use crate::{http::RefreshFuture, session::LoginRedirect, store::MemoryStore};

	/// Refresher that blocks every call until the test releases it, then returns `outcome`.
	struct GatedRefresher {
		calls: AtomicUsize,
		gate: Semaphore,
		seen: Mutex<Vec<String>>,
		outcome: Result<CredentialPair, RefreshError>,
	}
	impl GatedRefresher {
		fn new(outcome: Result<CredentialPair, RefreshError>) -> Arc<Self> {
			Arc::new(Self {
				calls: AtomicUsize::new(0),
				gate: Semaphore::new(0),
				seen: Mutex::new(Vec::new()),
				outcome,
			})
		}

		fn calls(&self) -> usize {
			self.calls.load(Ordering::SeqCst)
		}

		fn release(&self) {
			self.gate.add_permits(Semaphore::MAX_PERMITS / 2);
		}
	}
	impl TokenRefresher for GatedRefresher {
		fn refresh<'a>(&'a self, refresh_token: &'a TokenSecret) -> RefreshFuture<'a> {
			Box::pin(async move {
				self.calls.fetch_add(1, Ordering::SeqCst);
				self.seen.lock().push(refresh_token.expose().to_owned());

				let _permit = self.gate.acquire().await.expect("Refresh gate should stay open.");

				self.outcome.clone()
			})
		}
	}

	#[derive(Default)]
	struct CountingRedirect(AtomicUsize);
	impl LoginRedirect for CountingRedirect {
		fn redirect_to_login(&self, _entry_point: &str) {
			self.0.fetch_add(1, Ordering::SeqCst);
		}
	}

	struct Fixture {
		coordinator: Arc<RefreshCoordinator>,
		refresher: Arc<GatedRefresher>,
		store: MemoryStore,
		redirects: Arc<CountingRedirect>,
	}

	fn fixture(
		seed: Option<CredentialPair>,
		outcome: Result<CredentialPair, RefreshError>,
		timeout: Option<Duration>,
	) -> Fixture {
		let store = seed.map(MemoryStore::with_pair).unwrap_or_default();
		let shared: Arc<dyn CredentialStore> = Arc::new(store.clone());
		let redirects = Arc::new(CountingRedirect::default());
		let terminator = Arc::new(SessionTerminator::new(shared.clone(), redirects.clone(), "/login"));
		let refresher = GatedRefresher::new(outcome);
		let coordinator = Arc::new(
			RefreshCoordinator::new(shared, refresher.clone(), terminator)
				.with_refresh_timeout(timeout),
		);

		Fixture { coordinator, refresher, store, redirects }
	}

	fn spawn_callers(
		coordinator: &Arc<RefreshCoordinator>,
		count: usize,
	) -> Vec<JoinHandle<RefreshOutcome>> {
		(0..count)
			.map(|_| {
				let coordinator = coordinator.clone();

				tokio::spawn(async move { coordinator.ensure_fresh_token().await })
			})
			.collect()
	}

	async fn wait_until(mut condition: impl FnMut() -> bool) {
		tokio::time::timeout(Duration::from_secs(5), async {
			while !condition() {
				tokio::time::sleep(Duration::from_millis(2)).await;
			}
		})
		.await
		.expect("Condition should hold within the test deadline.");
	}

	#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
	async fn concurrent_callers_share_one_refresh_call() {
		let Fixture { coordinator, refresher, store, redirects } = fixture(
			Some(CredentialPair::new("t1", "r1")),
			Ok(CredentialPair::new("t2", "r2")),
			None,
		);
		let handles = spawn_callers(&coordinator, 8);

		wait_until(|| coordinator.pending_waiters() == 8).await;

		assert_eq!(coordinator.phase(), RefreshPhase::Refreshing);
		assert_eq!(refresher.calls(), 1);

		refresher.release();

		for handle in handles {
			let token = handle
				.await
				.expect("Caller task should not panic.")
				.expect("Every caller should observe the refreshed token.");

			assert_eq!(token.expose(), "t2");
		}

		assert_eq!(refresher.calls(), 1);
		assert_eq!(*refresher.seen.lock(), vec!["r1".to_owned()]);
		assert_eq!(store.get(), Some(CredentialPair::new("t2", "r2")));
		assert_eq!(coordinator.phase(), RefreshPhase::Idle);
		assert_eq!(coordinator.pending_waiters(), 0);
		assert_eq!(coordinator.metrics().attempts(), 1);
		assert_eq!(coordinator.metrics().successes(), 1);
		assert_eq!(coordinator.metrics().coalesced(), 7);
		assert_eq!(redirects.0.load(Ordering::SeqCst), 0);
	}

	#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
	async fn failed_refresh_rejects_every_caller_and_terminates_once() {
		let Fixture { coordinator, refresher, store, redirects } = fixture(
			Some(CredentialPair::new("t1", "r1")),
			Err(RefreshError::Rejected { status: 401, message: Some("expired".into()) }),
			None,
		);
		let handles = spawn_callers(&coordinator, 5);

		wait_until(|| coordinator.pending_waiters() == 5).await;
		refresher.release();

		for handle in handles {
			let err = handle
				.await
				.expect("Caller task should not panic.")
				.expect_err("Every caller should observe the refresh failure.");

			assert!(matches!(err, RefreshError::Rejected { status: 401, .. }));
		}

		assert_eq!(refresher.calls(), 1);
		assert!(store.is_empty());
		assert_eq!(redirects.0.load(Ordering::SeqCst), 1);
		assert_eq!(coordinator.metrics().failures(), 1);
		assert_eq!(coordinator.phase(), RefreshPhase::Idle);
	}

	#[tokio::test]
	async fn missing_refresh_token_skips_network_call() {
		let Fixture { coordinator, refresher, store, redirects } =
			fixture(None, Ok(CredentialPair::new("t2", "r2")), None);
		let err = coordinator
			.ensure_fresh_token()
			.await
			.expect_err("Refreshing without a refresh token should fail.");

		assert!(matches!(err, RefreshError::MissingRefreshToken));
		assert_eq!(refresher.calls(), 0);
		assert_eq!(coordinator.metrics().attempts(), 0);
		assert!(store.is_empty());
		assert_eq!(redirects.0.load(Ordering::SeqCst), 1);
	}

	#[tokio::test]
	async fn blank_refresh_token_counts_as_missing() {
		let Fixture { coordinator, refresher, store, .. } = fixture(
			Some(CredentialPair::new("t1", "")),
			Ok(CredentialPair::new("t2", "r2")),
			None,
		);
		let err = coordinator.ensure_fresh_token().await.expect_err("Blank token should fail.");

		assert!(matches!(err, RefreshError::MissingRefreshToken));
		assert_eq!(refresher.calls(), 0);
		assert!(store.is_empty());
	}

	#[tokio::test(start_paused = true)]
	async fn stalled_refresh_times_out_and_fails_the_cycle() {
		let Fixture { coordinator, refresher, store, redirects } = fixture(
			Some(CredentialPair::new("t1", "r1")),
			Ok(CredentialPair::new("t2", "r2")),
			Some(Duration::from_secs(30)),
		);
		let err = coordinator
			.ensure_fresh_token()
			.await
			.expect_err("A refresh that never settles should time out.");

		assert!(matches!(err, RefreshError::TimedOut(limit) if limit == Duration::from_secs(30)));
		assert_eq!(refresher.calls(), 1);
		assert!(store.is_empty());
		assert_eq!(redirects.0.load(Ordering::SeqCst), 1);
		assert_eq!(coordinator.phase(), RefreshPhase::Idle);
	}

	#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
	async fn cancelled_starter_does_not_cancel_the_cycle() {
		let Fixture { coordinator, refresher, store, redirects } = fixture(
			Some(CredentialPair::new("t1", "r1")),
			Ok(CredentialPair::new("t2", "r2")),
			None,
		);
		let starter = spawn_callers(&coordinator, 1).remove(0);

		wait_until(|| refresher.calls() == 1).await;

		let waiter = spawn_callers(&coordinator, 1).remove(0);

		wait_until(|| coordinator.pending_waiters() == 2).await;
		starter.abort();
		refresher.release();

		let token = waiter
			.await
			.expect("Waiter task should not panic.")
			.expect("Waiter should receive the refreshed token.");

		assert_eq!(token.expose(), "t2");
		assert_eq!(refresher.calls(), 1);
		assert_eq!(store.get(), Some(CredentialPair::new("t2", "r2")));
		assert_eq!(coordinator.phase(), RefreshPhase::Idle);
		assert_eq!(redirects.0.load(Ordering::SeqCst), 0);
	}

	#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
	async fn ended_session_discards_refreshed_pair() {
		let store = MemoryStore::with_pair(CredentialPair::new("t1", "r1"));
		let shared: Arc<dyn CredentialStore> = Arc::new(store.clone());
		let redirects = Arc::new(CountingRedirect::default());
		let terminator = Arc::new(SessionTerminator::new(shared.clone(), redirects.clone(), "/login"));
		let refresher = GatedRefresher::new(Ok(CredentialPair::new("t2", "r2")));
		let coordinator =
			Arc::new(RefreshCoordinator::new(shared, refresher.clone(), terminator.clone()));
		let caller = spawn_callers(&coordinator, 1).remove(0);

		wait_until(|| refresher.calls() == 1).await;
		terminator.end_session().expect("Ending the session should clear the store.");
		refresher.release();

		let err = caller
			.await
			.expect("Caller task should not panic.")
			.expect_err("A refresh outliving its session should not hand out a token.");

		assert!(matches!(err, RefreshError::Superseded));
		assert!(store.is_empty());
		assert_eq!(redirects.0.load(Ordering::SeqCst), 0);
		assert_eq!(coordinator.metrics().failures(), 0);
		assert_eq!(coordinator.phase(), RefreshPhase::Idle);
	}

	#[tokio::test]
	async fn panicking_refresher_abandons_the_cycle() {
		struct PanickingRefresher;
		impl TokenRefresher for PanickingRefresher {
			fn refresh<'a>(&'a self, _refresh_token: &'a TokenSecret) -> RefreshFuture<'a> {
				Box::pin(async { panic!("refresher failure") })
			}
		}

		let store = MemoryStore::with_pair(CredentialPair::new("t1", "r1"));
		let shared: Arc<dyn CredentialStore> = Arc::new(store.clone());
		let redirects = Arc::new(CountingRedirect::default());
		let terminator = Arc::new(SessionTerminator::new(shared.clone(), redirects.clone(), "/login"));
		let coordinator = RefreshCoordinator::new(shared, Arc::new(PanickingRefresher), terminator);
		let err = coordinator
			.ensure_fresh_token()
			.await
			.expect_err("A cycle whose task dies should release its callers.");

		assert!(matches!(err, RefreshError::Abandoned));
		assert_eq!(coordinator.phase(), RefreshPhase::Idle);
		assert_eq!(store.get(), Some(CredentialPair::new("t1", "r1")));
		assert_eq!(redirects.0.load(Ordering::SeqCst), 0);
	}

	#[tokio::test]
	async fn next_cycle_starts_after_previous_settles() {
		let Fixture { coordinator, refresher, store, .. } = fixture(
			Some(CredentialPair::new("t1", "r1")),
			Ok(CredentialPair::new("t2", "r2")),
			None,
		);

		refresher.release();
		coordinator.ensure_fresh_token().await.expect("First cycle should succeed.");
		coordinator.ensure_fresh_token().await.expect("Second cycle should succeed.");

		assert_eq!(refresher.calls(), 2);
		assert_eq!(*refresher.seen.lock(), vec!["r1".to_owned(), "r2".to_owned()]);
		assert_eq!(store.get(), Some(CredentialPair::new("t2", "r2")));
	}
}
