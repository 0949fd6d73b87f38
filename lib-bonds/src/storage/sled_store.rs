//! Sled-based BondStore Implementation
//!
//! One tree, prefix-encoded keys (see [`super::keys`]), bincode values.

use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;
use sled::{Db, Tree};

use super::{keys, BondStore, StorageError, StorageResult};
use crate::batch::Batch;
use crate::bond::Bond;

// =============================================================================
// TREE NAMES (FIXED - DO NOT CHANGE)
// =============================================================================

const TREE_BONDS: &str = "bonds";

/// Sled-based implementation of BondStore
pub struct SledBondStore {
    db: Db,
    bonds: Tree,
}

impl std::fmt::Debug for SledBondStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SledBondStore")
            .field("records", &self.bonds.len())
            .finish()
    }
}

impl SledBondStore {
    /// Open or create a store at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> StorageResult<Self> {
        let db = sled::open(path)?;
        Self::from_db(db)
    }

    /// Open a store that is deleted when dropped
    pub fn open_temporary() -> StorageResult<Self> {
        let db = sled::Config::new().temporary(true).open()?;
        Self::from_db(db)
    }

    fn from_db(db: Db) -> StorageResult<Self> {
        let bonds = db.open_tree(TREE_BONDS)?;
        Ok(Self { db, bonds })
    }

    /// Flush all pending writes to disk
    pub fn flush(&self) -> StorageResult<()> {
        self.db.flush()?;
        Ok(())
    }

    fn serialize<T: Serialize>(value: &T) -> StorageResult<Vec<u8>> {
        bincode::serialize(value).map_err(|e| StorageError::Serialization(e.to_string()))
    }

    fn deserialize<T: DeserializeOwned>(bytes: &[u8]) -> StorageResult<T> {
        bincode::deserialize(bytes).map_err(|e| StorageError::Serialization(e.to_string()))
    }

    fn get<T: DeserializeOwned>(&self, key: &[u8]) -> StorageResult<Option<T>> {
        match self.bonds.get(key)? {
            Some(bytes) => Ok(Some(Self::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    fn put<T: Serialize>(&self, key: Vec<u8>, value: &T) -> StorageResult<()> {
        self.bonds.insert(key, Self::serialize(value)?)?;
        Ok(())
    }
}

impl BondStore for SledBondStore {
    fn get_bond(&self, token: &str) -> StorageResult<Option<Bond>> {
        self.get(&keys::bond_key(token))
    }

    fn set_bond(&mut self, bond: &Bond) -> StorageResult<()> {
        self.put(keys::bond_key(&bond.token), bond)
    }

    fn has_bond(&self, token: &str) -> StorageResult<bool> {
        Ok(self.bonds.contains_key(keys::bond_key(token))?)
    }

    fn get_batch(&self, token: &str) -> StorageResult<Option<Batch>> {
        self.get(&keys::batch_key(token))
    }

    fn set_batch(&mut self, batch: &Batch) -> StorageResult<()> {
        self.put(keys::batch_key(&batch.token), batch)
    }

    fn get_last_batch(&self, token: &str) -> StorageResult<Option<Batch>> {
        self.get(&keys::last_batch_key(token))
    }

    fn set_last_batch(&mut self, batch: &Batch) -> StorageResult<()> {
        self.put(keys::last_batch_key(&batch.token), batch)
    }

    fn bond_tokens(&self) -> StorageResult<Vec<String>> {
        let mut tokens = Vec::new();
        for item in self.bonds.scan_prefix([keys::BOND_PREFIX]) {
            let (key, _) = item?;
            let token = keys::parse_bond_key(&key).ok_or_else(|| {
                StorageError::Corruption(format!("malformed bond key {}", hex::encode(&key)))
            })?;
            tokens.push(token.to_string());
        }
        Ok(tokens)
    }

    fn commit_settlement(&mut self, bond: &Bond, settled: &Batch, fresh: &Batch) -> StorageResult<()> {
        let mut batch = sled::Batch::default();
        batch.insert(keys::bond_key(&bond.token), Self::serialize(bond)?);
        batch.insert(keys::last_batch_key(&settled.token), Self::serialize(settled)?);
        batch.insert(keys::batch_key(&fresh.token), Self::serialize(fresh)?);
        self.bonds.apply_batch(batch)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::order::BuyOrder;
    use crate::test_support::{addr, power_bond_msg};
    use lib_types::Coin;

    #[test]
    fn test_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let bond = Bond::new(power_bond_msg("abc", &["res"])).unwrap();
        let mut batch = Batch::new("abc", 4);
        batch.buys.push(BuyOrder::new(addr(1), Coin::new("abc", 3), "10res".parse().unwrap()));

        {
            let mut store = SledBondStore::open(dir.path()).unwrap();
            store.set_bond(&bond).unwrap();
            store.set_batch(&batch).unwrap();
            store.flush().unwrap();
        }

        let store = SledBondStore::open(dir.path()).unwrap();
        assert_eq!(store.get_bond("abc").unwrap(), Some(bond));
        assert_eq!(store.get_batch("abc").unwrap(), Some(batch));
        assert!(store.has_bond("abc").unwrap());
        assert!(store.get_last_batch("abc").unwrap().is_none());
    }

    #[test]
    fn test_bond_tokens_skip_batches() {
        let mut store = SledBondStore::open_temporary().unwrap();
        for token in ["ccc", "aaa", "bbb"] {
            store.set_bond(&Bond::new(power_bond_msg(token, &["res"])).unwrap()).unwrap();
            store.set_batch(&Batch::new(token, 1)).unwrap();
        }
        assert_eq!(store.bond_tokens().unwrap(), vec!["aaa", "bbb", "ccc"]);
    }

    #[test]
    fn test_commit_settlement_writes_all_records() {
        let mut store = SledBondStore::open_temporary().unwrap();
        let mut bond = Bond::new(power_bond_msg("abc", &["res"])).unwrap();
        bond.current_supply = Coin::new("abc", 7);
        let mut settled = Batch::new("abc", 0);
        settled.total_buy_amount = 7;
        let fresh = Batch::new("abc", 5);

        store.commit_settlement(&bond, &settled, &fresh).unwrap();

        assert_eq!(store.get_bond("abc").unwrap().unwrap().current_supply.amount, 7);
        assert_eq!(store.get_last_batch("abc").unwrap(), Some(settled));
        assert_eq!(store.get_batch("abc").unwrap(), Some(fresh));
    }
}
