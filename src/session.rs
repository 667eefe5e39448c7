//! Token-lifecycle coordination for the authenticated client.
//!
//! Requests flow through the [`RequestAuthenticator`] (stamps the bearer token), the network,
//! and the [`ResponseInterceptor`] (classifies the response). An unauthorized response on a
//! first attempt asks the [`RefreshCoordinator`] for a fresh token; at most one refresh call is
//! in flight per coordinator and every caller that arrives meanwhile shares its outcome. When
//! recovery is impossible the [`SessionTerminator`] clears the credentials and redirects to the
//! login entry point.

pub mod authenticator;
pub mod coordinator;
pub mod interceptor;
pub mod terminator;

pub use authenticator::*;
pub use coordinator::*;
pub use interceptor::*;
pub use terminator::*;
