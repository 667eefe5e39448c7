//! Response inspection, refresh-and-replay, and the per-request retry marker.

// self
use crate::{
	_prelude::*,
	auth::TokenSecret,
	error::TransportError,
	obs::{FlowKind, FlowSpan},
	session::{RefreshCoordinator, RequestAuthenticator},
};

/// What the interceptor does with a response.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Disposition {
	/// Return the response to the caller unchanged.
	PassThrough,
	/// Refresh the token and replay the request once.
	Recoverable,
	/// Propagate the unauthorized response as a terminal error.
	Fatal,
}
impl Disposition {
	/// Classifies a response status given the request's retry marker.
	pub fn classify(status: StatusCode, marker: RetryMarker) -> Self {
		if status != StatusCode::UNAUTHORIZED {
			return Self::PassThrough;
		}

		if marker.is_set() { Self::Fatal } else { Self::Recoverable }
	}
}

/// Per-request flag recording that the request has already been replayed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RetryMarker(bool);
impl RetryMarker {
	/// Returns `true` once the request has been replayed.
	pub fn is_set(self) -> bool {
		self.0
	}

	/// Marks the request as replayed.
	pub fn set(&mut self) {
		self.0 = true;
	}
}

/// Sends requests and recovers from token expiry by refreshing and replaying at most once.
#[derive(Clone)]
pub struct ResponseInterceptor {
	http: ReqwestClient,
	authenticator: RequestAuthenticator,
	coordinator: Arc<RefreshCoordinator>,
}
impl ResponseInterceptor {
	/// Creates an interceptor dispatching through `http`.
	pub fn new(
		http: ReqwestClient,
		authenticator: RequestAuthenticator,
		coordinator: Arc<RefreshCoordinator>,
	) -> Self {
		Self { http, authenticator, coordinator }
	}

	/// Sends `request`, transparently recovering from one authorization expiry.
	///
	/// - Non-401 responses, success or not, are returned unchanged.
	/// - A first 401 triggers [`RefreshCoordinator::ensure_fresh_token`] and a single replay with
	///   the new token; a refresh failure surfaces as [`Error::AuthorizationInvalid`].
	/// - A 401 on the replay surfaces as [`Error::RepeatedUnauthorized`].
	/// - A 401 on a request whose body cannot be cloned surfaces as [`Error::Unreplayable`].
	/// - Transport errors are propagated without refresh involvement.
	pub async fn execute(&self, request: Request) -> Result<Response> {
		let mut marker = RetryMarker::default();
		let mut pending = request;
		let mut token = None;

		// Bounded: the marker is set before the only replay, so a second 401 is `Fatal`.
		loop {
			let replay = pending.try_clone();
			let response = self.dispatch(pending, token.as_ref()).await?;

			match Disposition::classify(response.status(), marker) {
				Disposition::PassThrough => return Ok(response),
				Disposition::Fatal => {
					tracing::warn!(url = %response.url(), "request rejected again after refresh");

					return Err(Error::RepeatedUnauthorized { response: Box::new(response) });
				},
				Disposition::Recoverable => {
					let Some(replay) = replay else {
						tracing::warn!(url = %response.url(), "unauthorized request cannot be replayed");

						return Err(Error::Unreplayable { response: Box::new(response) });
					};

					marker.set();
					tracing::debug!(url = %response.url(), "access token rejected; refreshing");
					token = Some(self.coordinator.ensure_fresh_token().await?);
					pending = replay;
				},
			}
		}
	}

	async fn dispatch(&self, mut request: Request, token: Option<&TokenSecret>) -> Result<Response> {
		match token {
			Some(token) => {
				self.authenticator.authenticate_with(&mut request, token)?;

				let span = FlowSpan::new(FlowKind::Replay, "dispatch");

				span.instrument(self.send(request)).await
			},
			None => {
				self.authenticator.authenticate(&mut request)?;

				self.send(request).await
			},
		}
	}

	async fn send(&self, request: Request) -> Result<Response> {
		Ok(self.http.execute(request).await.map_err(TransportError::from)?)
	}

	/// Returns the coordinator shared by every request of this interceptor.
	pub fn coordinator(&self) -> &Arc<RefreshCoordinator> {
		&self.coordinator
	}
}
impl Debug for ResponseInterceptor {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("ResponseInterceptor").field("coordinator", &self.coordinator).finish()
	}
}
