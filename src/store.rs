//! Credential store contract and built-in store implementations.

pub mod file;
pub mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

// self
use crate::{_prelude::*, auth::CredentialPair};

/// Durable holder of the current credential pair.
///
/// Reads and writes are synchronous and short compared to any network call, so callers may
/// invoke them while holding other locks. Implementations never inspect token contents.
pub trait CredentialStore
where
	Self: Send + Sync,
{
	/// Returns the stored pair, if any.
	fn get(&self) -> Option<CredentialPair>;

	/// Atomically replaces both tokens.
	fn set(&self, pair: CredentialPair) -> Result<(), StoreError>;

	/// Removes both tokens. Clearing an empty store succeeds.
	fn clear(&self) -> Result<(), StoreError>;
}
impl<S> CredentialStore for Arc<S>
where
	S: ?Sized + CredentialStore,
{
	fn get(&self) -> Option<CredentialPair> {
		(**self).get()
	}

	fn set(&self, pair: CredentialPair) -> Result<(), StoreError> {
		(**self).set(pair)
	}

	fn clear(&self) -> Result<(), StoreError> {
		(**self).clear()
	}
}

/// Error type produced by [`CredentialStore`] implementations.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum StoreError {
	/// Serialization failures surfaced by the backend.
	#[error("Serialization error: {message}.")]
	Serialization {
		/// Human-readable error payload.
		message: String,
	},
	/// Backend-level failure for the storage engine.
	#[error("Backend failure: {message}.")]
	Backend {
		/// Human-readable error payload.
		message: String,
	},
}
