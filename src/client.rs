//! The authenticated client facade.
//!
//! [`SessionClient`] owns one [`RefreshCoordinator`] and wires the credential store, request
//! authenticator, response interceptor, and session terminator around it. Domain API modules
//! build requests relative to the configured base URL and observe only the final response or
//! error; refresh mechanics stay invisible to them.

// crates.io
use reqwest::RequestBuilder;
// self
use crate::{
	_prelude::*,
	auth::CredentialPair,
	config::ClientConfig,
	error::ConfigError,
	http::{self, ReqwestRefresher, TokenRefresher},
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
	session::{
		LoginRedirect, RefreshCoordinator, RefreshMetrics, RequestAuthenticator,
		ResponseInterceptor, SessionTerminator,
	},
	store::CredentialStore,
};

const LOGIN_PATH: &str = "auth/login";
const REGISTER_PATH: &str = "auth/register";

/// Role requested when registering a new account.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
	/// Organization administrator.
	Admin,
	/// Facility manager.
	Manager,
	/// Field assessor.
	Assessor,
}

/// Payload for [`SessionClient::register`].
#[derive(Clone, Serialize)]
pub struct Registration {
	/// Account email.
	pub email: String,
	/// Account password; never logged.
	pub password: String,
	/// Display name.
	pub name: String,
	/// Requested role.
	pub role: Role,
}
impl Debug for Registration {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Registration")
			.field("email", &self.email)
			.field("name", &self.name)
			.field("role", &self.role)
			.finish_non_exhaustive()
	}
}

#[derive(Serialize)]
struct LoginRequest<'a> {
	email: &'a str,
	password: &'a str,
}

/// HTTP client that keeps requests authenticated across access-token expiry.
///
/// Cloning is cheap and clones share the same coordinator, store, and terminator.
#[derive(Clone)]
pub struct SessionClient {
	config: Arc<ClientConfig>,
	http: ReqwestClient,
	store: Arc<dyn CredentialStore>,
	terminator: Arc<SessionTerminator>,
	interceptor: ResponseInterceptor,
}
impl SessionClient {
	/// Creates a client with its own reqwest transport and refresh endpoint.
	pub fn new(
		config: ClientConfig,
		store: Arc<dyn CredentialStore>,
		redirect: Arc<dyn LoginRedirect>,
	) -> Result<Self> {
		let config = config.validate()?;
		let http = http::build_client(config.request_timeout)?;
		let refresher = Arc::new(ReqwestRefresher::new(http.clone(), config.refresh_endpoint()?));

		Self::with_refresher(config, store, redirect, http, refresher)
	}

	/// Creates a client that reuses the caller-provided transport and refresher.
	pub fn with_refresher(
		config: ClientConfig,
		store: Arc<dyn CredentialStore>,
		redirect: Arc<dyn LoginRedirect>,
		http: ReqwestClient,
		refresher: Arc<dyn TokenRefresher>,
	) -> Result<Self> {
		let config = config.validate()?;
		let terminator =
			Arc::new(SessionTerminator::new(store.clone(), redirect, &config.login_entry_point));
		let coordinator = Arc::new(
			RefreshCoordinator::new(store.clone(), refresher, terminator.clone())
				.with_refresh_timeout(config.refresh_timeout),
		);
		let interceptor = ResponseInterceptor::new(
			http.clone(),
			RequestAuthenticator::new(store.clone()),
			coordinator,
		);

		Ok(Self { config: Arc::new(config), http, store, terminator, interceptor })
	}

	/// Starts a request to `path`, resolved against the base URL.
	pub fn request(&self, method: Method, path: &str) -> Result<RequestBuilder> {
		Ok(self.http.request(method, self.config.endpoint(path)?))
	}

	/// Starts a `GET` request.
	pub fn get(&self, path: &str) -> Result<RequestBuilder> {
		self.request(Method::GET, path)
	}

	/// Starts a `POST` request.
	pub fn post(&self, path: &str) -> Result<RequestBuilder> {
		self.request(Method::POST, path)
	}

	/// Starts a `PUT` request.
	pub fn put(&self, path: &str) -> Result<RequestBuilder> {
		self.request(Method::PUT, path)
	}

	/// Starts a `PATCH` request.
	pub fn patch(&self, path: &str) -> Result<RequestBuilder> {
		self.request(Method::PATCH, path)
	}

	/// Starts a `DELETE` request.
	pub fn delete(&self, path: &str) -> Result<RequestBuilder> {
		self.request(Method::DELETE, path)
	}

	/// Builds and sends a request through the interceptor.
	pub async fn send(&self, builder: RequestBuilder) -> Result<Response> {
		let request = builder.build().map_err(|source| ConfigError::RequestBuild { source })?;

		self.execute(request).await
	}

	/// Sends a prepared request through the interceptor.
	///
	/// See [`ResponseInterceptor::execute`] for the recovery rules.
	pub async fn execute(&self, request: Request) -> Result<Response> {
		self.interceptor.execute(request).await
	}

	/// Logs in and installs the issued credential pair.
	///
	/// The call bypasses the interceptor: a 401 here means bad credentials, not an expired
	/// session, and surfaces as [`Error::Rejected`].
	pub async fn login(&self, email: &str, password: &str) -> Result<CredentialPair> {
		self.issue(LOGIN_PATH, &LoginRequest { email, password }).await
	}

	/// Registers an account and installs the issued credential pair.
	pub async fn register(&self, registration: &Registration) -> Result<CredentialPair> {
		self.issue(REGISTER_PATH, registration).await
	}

	/// Clears the stored credentials locally; no network call is made.
	///
	/// A refresh still in flight settles with
	/// [`RefreshError::Superseded`](crate::error::RefreshError::Superseded) and does not write
	/// its pair back.
	pub fn logout(&self) -> Result<()> {
		tracing::debug!("logging out");

		Ok(self.terminator.end_session()?)
	}

	/// Replaces the stored pair and marks a new session as live.
	pub fn install_credentials(&self, pair: CredentialPair) -> Result<()> {
		Ok(self.terminator.begin_session(pair)?)
	}

	/// Returns the stored pair, if any.
	pub fn credentials(&self) -> Option<CredentialPair> {
		self.store.get()
	}

	/// Returns `true` once the current session has been terminated.
	pub fn is_session_terminated(&self) -> bool {
		self.terminator.is_terminated()
	}

	/// Returns the refresh counters of this client's coordinator.
	pub fn refresh_metrics(&self) -> &Arc<RefreshMetrics> {
		self.interceptor.coordinator().metrics()
	}

	/// Returns this client's coordinator.
	pub fn coordinator(&self) -> &Arc<RefreshCoordinator> {
		self.interceptor.coordinator()
	}

	/// Returns the validated configuration.
	pub fn config(&self) -> &ClientConfig {
		&self.config
	}

	async fn issue<T>(&self, path: &'static str, body: &T) -> Result<CredentialPair>
	where
		T: ?Sized + Serialize,
	{
		let span = FlowSpan::new(FlowKind::Login, path);

		obs::record_flow_outcome(FlowKind::Login, FlowOutcome::Attempt);

		let result = span
			.instrument(async move {
				let url = self.config.endpoint(path)?;
				let (status, bytes) = http::post_json(&self.http, url, body).await?;

				if !status.is_success() {
					return Err(Error::Rejected {
						status: status.as_u16(),
						message: http::error_message(&bytes),
					});
				}

				let pair = http::parse_tokens(&bytes).map_err(|message| Error::MalformedResponse {
					endpoint: path.into(),
					message,
				})?;

				self.install_credentials(pair.clone())?;

				Ok(pair)
			})
			.await;

		match &result {
			Ok(_) => obs::record_flow_outcome(FlowKind::Login, FlowOutcome::Success),
			Err(err) => {
				tracing::warn!(error = %err, endpoint = path, "credential request failed");
				obs::record_flow_outcome(FlowKind::Login, FlowOutcome::Failure);
			},
		}

		result
	}
}
impl Debug for SessionClient {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("SessionClient")
			.field("base_url", &self.config.base_url.as_str())
			.field("terminator", &self.terminator)
			.field("interceptor", &self.interceptor)
			.finish()
	}
}
