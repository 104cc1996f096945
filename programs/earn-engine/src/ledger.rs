use std::sync::Arc;

use anchor_lang::error::Error;
use anchor_lang::prelude::*;
use constant_time_eq::constant_time_eq;

use crate::errors::{EarnError, StoredError};
use crate::state::{OperationKind, OperationRecord, OperationStatus};
use crate::store::{self, BatchOp, KeyValueStore, MAX_CAS_ATTEMPTS};

/// blake3 over the operation kind and its JSON payload.
pub fn payload_hash(kind: OperationKind, payload: &serde_json::Value) -> [u8; 32] {
    let mut hasher = blake3::Hasher::new();
    hasher.update(kind.as_str().as_bytes());
    hasher.update(&[0]);
    hasher.update(payload.to_string().as_bytes());
    *hasher.finalize().as_bytes()
}

/// Outcome of a status change.
#[derive(Clone, Debug, Default)]
pub struct Transition {
    pub result: Option<String>,
    pub error: Option<StoredError>,
    pub tx_signature: Option<String>,
}

/// At-most-once bookkeeping for mutating calls.
pub struct OperationLedger {
    store: Arc<dyn KeyValueStore>,
}

impl OperationLedger {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Create a pending record, or return the one already bound to
    /// `idempotency_key`. The boolean is true when the record is new and the
    /// caller owns its execution.
    pub fn get_or_create(
        &self,
        idempotency_key: Option<&str>,
        kind: OperationKind,
        payload: &serde_json::Value,
        now: i64,
    ) -> Result<(OperationRecord, bool)> {
        let hash = payload_hash(kind, payload);
        let record = OperationRecord {
            operation_id: uuid::Uuid::new_v4().to_string(),
            idempotency_key: idempotency_key.map(str::to_string),
            kind,
            status: OperationStatus::Pending,
            payload_hash: hash,
            request: payload.to_string(),
            result: None,
            error: None,
            tx_signature: None,
            created_at: now,
            updated_at: now,
        };
        let record_key = store::operation_key(&record.operation_id);

        let Some(idempotency_key) = idempotency_key else {
            self.store.put(&record_key, store::encode(&record)?)?;
            return Ok((record, true));
        };

        // Record first, then claim the key; losers remove their record.
        let index_key = store::idempotency_key(idempotency_key);
        self.store.put(&record_key, store::encode(&record)?)?;
        let claimed = self.store.compare_and_swap(
            &index_key,
            None,
            Some(record.operation_id.as_bytes().to_vec()),
        )?;
        if claimed {
            log::info!(
                "Operation {} ({}) created for key {}",
                record.operation_id,
                kind.as_str(),
                idempotency_key
            );
            return Ok((record, true));
        }
        self.store.delete(&record_key)?;

        let existing_id = self
            .store
            .get(&index_key)?
            .ok_or(EarnError::OperationNotFound)?;
        let existing_id = String::from_utf8(existing_id).map_err(|_| error!(EarnError::StorageFailure))?;
        let existing = self.get(&existing_id)?;

        if existing.kind != kind || !constant_time_eq(&existing.payload_hash, &hash) {
            log::warn!(
                "Idempotency key {} reused with a different {} payload",
                idempotency_key,
                kind.as_str()
            );
            return err!(EarnError::IdempotencyKeyConflict);
        }

        log::info!(
            "Replaying operation {} for key {} ({:?})",
            existing.operation_id,
            idempotency_key,
            existing.status
        );
        Ok((existing, false))
    }

    pub fn get(&self, operation_id: &str) -> Result<OperationRecord> {
        store::load(self.store.as_ref(), &store::operation_key(operation_id))?
            .ok_or_else(|| error!(EarnError::OperationNotFound))
    }

    /// Move a record along pending -> processing -> {completed | failed}.
    pub fn transition(
        &self,
        operation_id: &str,
        next: OperationStatus,
        outcome: Transition,
        now: i64,
    ) -> Result<OperationRecord> {
        let key = store::operation_key(operation_id);

        for _ in 0..MAX_CAS_ATTEMPTS {
            let current = self
                .store
                .get(&key)?
                .ok_or(EarnError::OperationNotFound)?;
            let mut record: OperationRecord = store::decode(&current)?;

            if !record.status.can_transition_to(next) {
                log::warn!(
                    "Rejected transition {:?} -> {:?} for operation {}",
                    record.status,
                    next,
                    operation_id
                );
                return err!(EarnError::InvalidStatusTransition);
            }

            record.status = next;
            record.updated_at = now;
            if outcome.result.is_some() {
                record.result = outcome.result.clone();
            }
            if outcome.error.is_some() {
                record.error = outcome.error.clone();
            }
            if outcome.tx_signature.is_some() {
                record.tx_signature = outcome.tx_signature.clone();
            }

            if self
                .store
                .compare_and_swap(&key, Some(current.as_slice()), Some(store::encode(&record)?))?
            {
                return Ok(record);
            }
        }
        err!(EarnError::StorageFailure)
    }

    pub fn complete(&self, operation_id: &str, result: String, now: i64) -> Result<OperationRecord> {
        self.transition(
            operation_id,
            OperationStatus::Completed,
            Transition {
                result: Some(result),
                ..Transition::default()
            },
            now,
        )
    }

    pub fn fail(&self, operation_id: &str, err: &Error, now: i64) -> Result<OperationRecord> {
        self.transition(
            operation_id,
            OperationStatus::Failed,
            Transition {
                error: Some(StoredError::from_error(err)),
                ..Transition::default()
            },
            now,
        )
    }

    fn records(&self) -> Result<Vec<OperationRecord>> {
        self.store
            .scan_prefix(&store::operation_prefix())?
            .iter()
            .map(|(_, bytes)| store::decode(bytes))
            .collect()
    }

    /// Fail every non-terminal record untouched for `timeout_secs`.
    /// Returns how many were expired.
    pub fn expire_stale(&self, now: i64, timeout_secs: u64) -> Result<usize> {
        let timed_out: Error = EarnError::OperationTimedOut.into();
        let mut expired = 0;

        for record in self.records()? {
            if record.status.is_terminal() || record.updated_at.saturating_add(timeout_secs as i64) > now {
                continue;
            }
            match self.fail(&record.operation_id, &timed_out, now) {
                Ok(_) => {
                    log::warn!("Operation {} timed out", record.operation_id);
                    expired += 1;
                }
                // Finished between the scan and the transition
                Err(e) if e == Error::from(EarnError::InvalidStatusTransition) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(expired)
    }

    /// Delete terminal records older than `retention_secs` together with
    /// their idempotency index. Non-terminal records are never purged.
    pub fn purge(&self, now: i64, retention_secs: u64) -> Result<usize> {
        let mut ops = Vec::new();
        let mut purged = 0;

        for record in self.records()? {
            if !record.status.is_terminal() || record.updated_at.saturating_add(retention_secs as i64) > now {
                continue;
            }
            ops.push(BatchOp::Delete {
                key: store::operation_key(&record.operation_id),
            });
            if let Some(key) = &record.idempotency_key {
                ops.push(BatchOp::Delete {
                    key: store::idempotency_key(key),
                });
            }
            purged += 1;
        }

        if !ops.is_empty() {
            self.store.write_batch(ops)?;
            log::info!("Purged {} operation records", purged);
        }
        Ok(purged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use serde_json::json;

    fn ledger() -> OperationLedger {
        OperationLedger::new(Arc::new(MemoryStore::new()))
    }

    #[test]
    fn same_key_same_payload_returns_first_record() {
        let ledger = ledger();
        let payload = json!({"amount": 5});

        let (first, is_new) = ledger.get_or_create(Some("k"), OperationKind::Stake, &payload, 1).unwrap();
        assert!(is_new);

        let (second, is_new) = ledger.get_or_create(Some("k"), OperationKind::Stake, &payload, 2).unwrap();
        assert!(!is_new);
        assert_eq!(second.operation_id, first.operation_id);
    }

    #[test]
    fn same_key_different_payload_conflicts() {
        let ledger = ledger();
        ledger
            .get_or_create(Some("k"), OperationKind::Stake, &json!({"amount": 5}), 1)
            .unwrap();

        let err = ledger
            .get_or_create(Some("k"), OperationKind::Stake, &json!({"amount": 6}), 2)
            .unwrap_err();
        assert_eq!(err, EarnError::IdempotencyKeyConflict.into());

        let err = ledger
            .get_or_create(Some("k"), OperationKind::Claim, &json!({"amount": 5}), 2)
            .unwrap_err();
        assert_eq!(err, EarnError::IdempotencyKeyConflict.into());
    }

    #[test]
    fn no_key_always_creates() {
        let ledger = ledger();
        let payload = json!({});
        let (a, _) = ledger.get_or_create(None, OperationKind::Claim, &payload, 1).unwrap();
        let (b, is_new) = ledger.get_or_create(None, OperationKind::Claim, &payload, 1).unwrap();
        assert!(is_new);
        assert_ne!(a.operation_id, b.operation_id);
    }

    #[test]
    fn lifecycle_and_terminal_lock() {
        let ledger = ledger();
        let (record, _) = ledger.get_or_create(None, OperationKind::Claim, &json!({}), 1).unwrap();
        let id = record.operation_id;

        assert_eq!(
            ledger.complete(&id, "{}".to_string(), 2).unwrap_err(),
            EarnError::InvalidStatusTransition.into()
        );

        ledger
            .transition(&id, OperationStatus::Processing, Transition::default(), 2)
            .unwrap();
        let done = ledger.complete(&id, "{\"ok\":true}".to_string(), 3).unwrap();
        assert_eq!(done.status, OperationStatus::Completed);
        assert_eq!(done.result.as_deref(), Some("{\"ok\":true}"));

        assert_eq!(
            ledger.fail(&id, &EarnError::Overflow.into(), 4).unwrap_err(),
            EarnError::InvalidStatusTransition.into()
        );
        assert_eq!(ledger.get(&id).unwrap().status, OperationStatus::Completed);
    }

    #[test]
    fn stale_records_time_out_as_retryable() {
        let ledger = ledger();
        let (stale, _) = ledger.get_or_create(Some("a"), OperationKind::ComposeSwap, &json!({}), 0).unwrap();
        ledger
            .transition(&stale.operation_id, OperationStatus::Processing, Transition::default(), 0)
            .unwrap();
        let (fresh, _) = ledger.get_or_create(Some("b"), OperationKind::ComposeSwap, &json!({}), 50).unwrap();

        assert_eq!(ledger.expire_stale(60, 60).unwrap(), 1);

        let stale = ledger.get(&stale.operation_id).unwrap();
        assert_eq!(stale.status, OperationStatus::Failed);
        assert!(stale.retryable());
        assert_eq!(ledger.get(&fresh.operation_id).unwrap().status, OperationStatus::Pending);
    }

    #[test]
    fn purge_skips_in_flight_and_frees_key() {
        let ledger = ledger();
        let (done, _) = ledger.get_or_create(Some("done"), OperationKind::Claim, &json!({}), 0).unwrap();
        ledger
            .transition(&done.operation_id, OperationStatus::Processing, Transition::default(), 0)
            .unwrap();
        ledger.complete(&done.operation_id, "null".to_string(), 0).unwrap();

        let (busy, _) = ledger.get_or_create(Some("busy"), OperationKind::Claim, &json!({}), 0).unwrap();
        ledger
            .transition(&busy.operation_id, OperationStatus::Processing, Transition::default(), 0)
            .unwrap();

        assert_eq!(ledger.purge(1_000, 100).unwrap(), 1);
        assert_eq!(
            ledger.get(&done.operation_id).unwrap_err(),
            EarnError::OperationNotFound.into()
        );
        assert_eq!(ledger.get(&busy.operation_id).unwrap().status, OperationStatus::Processing);

        let (_, is_new) = ledger.get_or_create(Some("done"), OperationKind::Claim, &json!({}), 1_001).unwrap();
        assert!(is_new);
    }
}
