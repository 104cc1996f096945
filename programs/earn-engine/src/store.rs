use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use anchor_lang::prelude::*;
use parking_lot::{Mutex, RwLock};

use crate::errors::EarnError;
use crate::state::{
    EARN_MASTER_SEED, IDEMPOTENCY_SEED, OPERATION_SEED, STAKE_SEED, STAKING_POOL_SEED,
    TOKEN_CONFIG_SEED, TREASURY_SEED,
};

/// Bounded retries for optimistic read-modify-write loops.
pub const MAX_CAS_ATTEMPTS: usize = 16;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BatchOp {
    /// Insert or overwrite a key-value pair.
    Put { key: Vec<u8>, value: Vec<u8> },
    /// Remove a key.
    Delete { key: Vec<u8> },
    /// Write `value` only if the key currently holds `expected` (`None`
    /// meaning absent). A mismatch aborts the whole batch.
    CompareAndSwap {
        key: Vec<u8>,
        expected: Option<Vec<u8>>,
        value: Vec<u8>,
    },
}

/// Backing store for every ledger. Implementations must make each method
/// atomic; `write_batch` applies all operations or none.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>>;

    fn put(&self, key: &[u8], value: Vec<u8>) -> Result<()>;

    /// No error is returned if the key does not exist.
    fn delete(&self, key: &[u8]) -> Result<()>;

    /// Replace the value at `key` with `new` only if it currently equals
    /// `expected` (`None` meaning absent). `new = None` deletes the key.
    /// Returns whether the swap happened.
    fn compare_and_swap(&self, key: &[u8], expected: Option<&[u8]>, new: Option<Vec<u8>>) -> Result<bool>;

    /// Returns `false`, having written nothing, when a `CompareAndSwap`
    /// guard in the batch does not match.
    fn write_batch(&self, ops: Vec<BatchOp>) -> Result<bool>;

    /// Keys in lexicographic order.
    fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>>;
}

/// Single-process store. Valid, but everything is lost on restart.
#[derive(Default)]
pub struct MemoryStore {
    entries: RwLock<BTreeMap<Vec<u8>, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self.entries.read().get(key).cloned())
    }

    fn put(&self, key: &[u8], value: Vec<u8>) -> Result<()> {
        self.entries.write().insert(key.to_vec(), value);
        Ok(())
    }

    fn delete(&self, key: &[u8]) -> Result<()> {
        self.entries.write().remove(key);
        Ok(())
    }

    fn compare_and_swap(&self, key: &[u8], expected: Option<&[u8]>, new: Option<Vec<u8>>) -> Result<bool> {
        let mut entries = self.entries.write();
        if entries.get(key).map(Vec::as_slice) != expected {
            return Ok(false);
        }
        match new {
            Some(value) => entries.insert(key.to_vec(), value),
            None => entries.remove(key),
        };
        Ok(true)
    }

    fn write_batch(&self, ops: Vec<BatchOp>) -> Result<bool> {
        let mut entries = self.entries.write();
        let guards_hold = ops.iter().all(|op| match op {
            BatchOp::CompareAndSwap { key, expected, .. } => entries.get(key) == expected.as_ref(),
            _ => true,
        });
        if !guards_hold {
            return Ok(false);
        }
        for op in ops {
            match op {
                BatchOp::Put { key, value } | BatchOp::CompareAndSwap { key, value, .. } => {
                    entries.insert(key, value);
                }
                BatchOp::Delete { key } => {
                    entries.remove(&key);
                }
            }
        }
        Ok(true)
    }

    fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        Ok(self
            .entries
            .read()
            .range(prefix.to_vec()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }
}

// ── Keys ──────────────────────────────────────────────────────────────

fn key(seed: &[u8], parts: &[&[u8]]) -> Vec<u8> {
    let mut key = seed.to_vec();
    for part in parts {
        key.push(b'|');
        key.extend_from_slice(part);
    }
    key
}

pub fn token_config_key(mint: &Pubkey) -> Vec<u8> {
    key(TOKEN_CONFIG_SEED, &[mint.as_ref()])
}

pub fn treasury_key(mint: &Pubkey) -> Vec<u8> {
    key(TREASURY_SEED, &[mint.as_ref()])
}

pub fn staking_pool_key(mint: &Pubkey) -> Vec<u8> {
    key(STAKING_POOL_SEED, &[mint.as_ref()])
}

pub fn stake_key(mint: &Pubkey, owner: &Pubkey) -> Vec<u8> {
    key(STAKE_SEED, &[mint.as_ref(), owner.as_ref()])
}

pub fn stake_prefix(mint: &Pubkey) -> Vec<u8> {
    let mut prefix = key(STAKE_SEED, &[mint.as_ref()]);
    prefix.push(b'|');
    prefix
}

pub fn protocol_stats_key() -> Vec<u8> {
    EARN_MASTER_SEED.to_vec()
}

pub fn operation_key(operation_id: &str) -> Vec<u8> {
    key(OPERATION_SEED, &[operation_id.as_bytes()])
}

pub fn operation_prefix() -> Vec<u8> {
    let mut prefix = OPERATION_SEED.to_vec();
    prefix.push(b'|');
    prefix
}

pub fn idempotency_key(idempotency_key: &str) -> Vec<u8> {
    key(IDEMPOTENCY_SEED, &[idempotency_key.as_bytes()])
}

// ── Typed access ──────────────────────────────────────────────────────

pub fn encode<T: AnchorSerialize>(value: &T) -> Result<Vec<u8>> {
    value.try_to_vec().map_err(|e| {
        log::error!("Failed to encode record: {}", e);
        error!(EarnError::StorageFailure)
    })
}

pub fn decode<T: AnchorDeserialize>(bytes: &[u8]) -> Result<T> {
    T::try_from_slice(bytes).map_err(|e| {
        log::error!("Failed to decode record: {}", e);
        error!(EarnError::StorageFailure)
    })
}

pub fn load<T: AnchorDeserialize>(store: &dyn KeyValueStore, key: &[u8]) -> Result<Option<T>> {
    store.get(key)?.map(|bytes| decode(&bytes)).transpose()
}

pub fn put_op<T: AnchorSerialize>(key: Vec<u8>, value: &T) -> Result<BatchOp> {
    Ok(BatchOp::Put {
        key,
        value: encode(value)?,
    })
}

/// Commit `ops` together with an optimistic update of the record at `key`.
/// Either everything lands or nothing does; a lost race on `key` retries
/// the whole batch against the fresh value.
pub fn commit_with_update<T, F>(store: &dyn KeyValueStore, ops: Vec<BatchOp>, key: &[u8], mut update: F) -> Result<T>
where
    T: AnchorSerialize + AnchorDeserialize,
    F: FnMut(Option<T>) -> Result<T>,
{
    for _ in 0..MAX_CAS_ATTEMPTS {
        let current = store.get(key)?;
        let decoded = current.as_deref().map(decode::<T>).transpose()?;
        let next = update(decoded)?;
        let mut batch = ops.clone();
        batch.push(BatchOp::CompareAndSwap {
            key: key.to_vec(),
            expected: current,
            value: encode(&next)?,
        });
        if store.write_batch(batch)? {
            return Ok(next);
        }
    }
    log::error!("Gave up committing batch on contended key after {} attempts", MAX_CAS_ATTEMPTS);
    err!(EarnError::StorageFailure)
}

// ── Per-token locks ───────────────────────────────────────────────────

/// One lock per mint. Mutations for the same token run one at a time;
/// different tokens never contend.
#[derive(Default)]
pub struct TokenLocks {
    locks: Mutex<HashMap<Pubkey, Arc<Mutex<()>>>>,
}

impl TokenLocks {
    /// Run `f` while holding the lock for `mint`. `f` is synchronous, so the
    /// lock is never held across an await point.
    /// The entry is dropped again once no other caller holds it.
    pub fn with<T>(&self, mint: &Pubkey, f: impl FnOnce() -> T) -> T {
        let lock = self.locks.lock().entry(*mint).or_default().clone();
        let result = {
            let _guard = lock.lock();
            f()
        };
        let mut locks = self.locks.lock();
        // Clones are only taken under the map lock, so two means the map and us
        if Arc::strong_count(&lock) == 2 {
            locks.remove(mint);
        }
        result
    }
}
