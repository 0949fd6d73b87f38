//! In-Memory Bond Store

use super::{BondStore, StorageResult};
use crate::batch::Batch;
use crate::bond::Bond;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default)]
pub struct InMemoryBondStore {
    bonds: BTreeMap<String, Bond>,
    batches: BTreeMap<String, Batch>,
    last_batches: BTreeMap<String, Batch>,
}

impl InMemoryBondStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl BondStore for InMemoryBondStore {
    fn get_bond(&self, token: &str) -> StorageResult<Option<Bond>> {
        Ok(self.bonds.get(token).cloned())
    }

    fn set_bond(&mut self, bond: &Bond) -> StorageResult<()> {
        self.bonds.insert(bond.token.clone(), bond.clone());
        Ok(())
    }

    fn get_batch(&self, token: &str) -> StorageResult<Option<Batch>> {
        Ok(self.batches.get(token).cloned())
    }

    fn set_batch(&mut self, batch: &Batch) -> StorageResult<()> {
        self.batches.insert(batch.token.clone(), batch.clone());
        Ok(())
    }

    fn get_last_batch(&self, token: &str) -> StorageResult<Option<Batch>> {
        Ok(self.last_batches.get(token).cloned())
    }

    fn set_last_batch(&mut self, batch: &Batch) -> StorageResult<()> {
        self.last_batches.insert(batch.token.clone(), batch.clone());
        Ok(())
    }

    fn bond_tokens(&self) -> StorageResult<Vec<String>> {
        Ok(self.bonds.keys().cloned().collect())
    }
}
