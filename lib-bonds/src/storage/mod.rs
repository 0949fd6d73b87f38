//! Bond Storage
//!
//! Point lookups and updates for bonds, live batches and last batches, plus
//! ordered iteration over bond tokens for the per-block settlement pass.
//!
//! # Implementations
//! - [`InMemoryBondStore`]: `BTreeMap`-backed, for tests and embedding
//! - [`SledBondStore`]: sled tree with bincode values and prefixed keys

pub mod keys;
pub mod memory;
pub mod sled_store;

pub use memory::InMemoryBondStore;
pub use sled_store::SledBondStore;

use crate::batch::Batch;
use crate::bond::Bond;
use thiserror::Error;

/// Storage layer result type
pub type StorageResult<T> = Result<T, StorageError>;

/// Storage errors
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Sled backend error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Storage corruption detected: {0}")]
    Corruption(String),
}

impl From<sled::Error> for StorageError {
    fn from(e: sled::Error) -> Self {
        StorageError::Database(e.to_string())
    }
}

/// Persistent keyed store for bond state
pub trait BondStore {
    fn get_bond(&self, token: &str) -> StorageResult<Option<Bond>>;

    fn set_bond(&mut self, bond: &Bond) -> StorageResult<()>;

    fn has_bond(&self, token: &str) -> StorageResult<bool> {
        Ok(self.get_bond(token)?.is_some())
    }

    fn get_batch(&self, token: &str) -> StorageResult<Option<Batch>>;

    fn set_batch(&mut self, batch: &Batch) -> StorageResult<()>;

    fn get_last_batch(&self, token: &str) -> StorageResult<Option<Batch>>;

    fn set_last_batch(&mut self, batch: &Batch) -> StorageResult<()>;

    /// All bond tokens in lexical order
    fn bond_tokens(&self) -> StorageResult<Vec<String>>;

    /// Writes the post-settlement bond, archives the settled batch and
    /// installs the fresh one. Backends that can should make this atomic.
    fn commit_settlement(&mut self, bond: &Bond, settled: &Batch, fresh: &Batch) -> StorageResult<()> {
        self.set_bond(bond)?;
        self.set_last_batch(settled)?;
        self.set_batch(fresh)
    }
}
