//! Thread-safe in-memory [`CredentialStore`] implementation for local development and tests.

// self
use crate::{
	_prelude::*,
	auth::CredentialPair,
	store::{CredentialStore, StoreError},
};

/// Thread-safe storage backend that keeps the pair in-process; clones share the same slot.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore(Arc<RwLock<Option<CredentialPair>>>);
impl MemoryStore {
	/// Creates a store already holding `pair`.
	pub fn with_pair(pair: CredentialPair) -> Self {
		Self(Arc::new(RwLock::new(Some(pair))))
	}

	/// Returns `true` when no pair is stored.
	pub fn is_empty(&self) -> bool {
		self.0.read().is_none()
	}
}
impl CredentialStore for MemoryStore {
	fn get(&self) -> Option<CredentialPair> {
		self.0.read().clone()
	}

	fn set(&self, pair: CredentialPair) -> Result<(), StoreError> {
		*self.0.write() = Some(pair);

		Ok(())
	}

	fn clear(&self) -> Result<(), StoreError> {
		self.0.write().take();

		Ok(())
	}
}
