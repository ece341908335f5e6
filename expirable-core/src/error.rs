//! Error types for the expirable dictionaries.

use thiserror::Error;

/// Errors returned by the strict dictionary operations.
///
/// Every other operation is total and reports absence through `Option` or
/// `bool` instead.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreError {
    /// `add` found a live entry already stored under the key
    #[error("an entry with the same key already exists")]
    DuplicateKey,

    /// `get` found no live entry for the key
    #[error("the key is not present or its entry has expired")]
    KeyNotFound,
}

impl StoreError {
    /// Returns `true` if a strict insert collided with a live entry.
    pub fn is_duplicate_key(&self) -> bool {
        matches!(self, StoreError::DuplicateKey)
    }

    /// Returns `true` if a strict read found nothing live.
    pub fn is_key_not_found(&self) -> bool {
        matches!(self, StoreError::KeyNotFound)
    }
}
