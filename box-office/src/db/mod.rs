//! redb-based durable record store
//!
//! # Tables
//!
//! | Table | Key | Value | Purpose |
//! |-------|-----|-------|---------|
//! | `ticket_types` | id | versioned JSON | Capacity counters (contended) |
//! | `promo_codes` | id | versioned JSON | Promo code records |
//! | `orders` | id | versioned JSON | Orders with embedded line items |
//! | `tickets` | id | versioned JSON | Issued tickets (contended on scan) |
//! | `refund_requests` | id | versioned JSON | Refund workflow records |
//! | `settlement_requests` | id | versioned JSON | Settlement workflow records |
//! | `fees` | id | versioned JSON | Fee rules |
//! | `event_settings` | event_id | versioned JSON | Per-event billing config |
//! | `reservations` | `order:type` | plain JSON | Checkout holds (TTL sweep) |
//! | `ticket_code_idx` | code | ticket id | Unique-code lookup |
//! | `order_number_idx` | number | order id | Unique-number lookup |
//! | `promo_code_idx` | CODE | promo id | Case-insensitive code lookup |
//! | `promo_consumptions` | `promo:order` | customer email | Usage idempotency |
//! | `counters` | name | u64 | Per-year order sequence |
//!
//! # Concurrency
//!
//! Every record carries a version stamp. Contended records (ticket-type
//! counters, ticket status) are mutated exclusively through
//! [`Store::put_if_version`]-style compare-and-swap: read the stamped
//! record, compute the new state, write back only if the stored version
//! is unchanged. redb's single-writer transactions make the version
//! check and the write atomic, so concurrent updaters of the same
//! record are linearized; losers observe `false` and retry.
//!
//! # Durability
//!
//! redb commits are persistent as soon as `commit()` returns
//! (copy-on-write with atomic pointer swap), so a conditional update
//! either fully applies or fully fails — partial mutations are never
//! observable.

use redb::{
    Database, ReadableDatabase, ReadableTable, ReadableTableMetadata, TableDefinition,
    WriteTransaction,
};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Versioned entity tables
pub const TICKET_TYPES: TableDefinition<&str, &[u8]> = TableDefinition::new("ticket_types");
pub const PROMO_CODES: TableDefinition<&str, &[u8]> = TableDefinition::new("promo_codes");
pub const ORDERS: TableDefinition<&str, &[u8]> = TableDefinition::new("orders");
pub const TICKETS: TableDefinition<&str, &[u8]> = TableDefinition::new("tickets");
pub const REFUND_REQUESTS: TableDefinition<&str, &[u8]> = TableDefinition::new("refund_requests");
pub const SETTLEMENT_REQUESTS: TableDefinition<&str, &[u8]> =
    TableDefinition::new("settlement_requests");
pub const FEES: TableDefinition<&str, &[u8]> = TableDefinition::new("fees");
pub const EVENT_SETTINGS: TableDefinition<&str, &[u8]> = TableDefinition::new("event_settings");

/// Plain (unversioned) record tables
pub const RESERVATIONS: TableDefinition<&str, &[u8]> = TableDefinition::new("reservations");

/// Unique-field index tables: indexed value -> record id
pub const TICKET_CODE_IDX: TableDefinition<&str, &str> = TableDefinition::new("ticket_code_idx");
pub const ORDER_NUMBER_IDX: TableDefinition<&str, &str> = TableDefinition::new("order_number_idx");
pub const PROMO_CODE_IDX: TableDefinition<&str, &str> = TableDefinition::new("promo_code_idx");

/// Promo usage idempotency: key = `promo_id:order_id`, value = customer email
const PROMO_CONSUMPTIONS: TableDefinition<&str, &str> = TableDefinition::new("promo_consumptions");

/// Named monotonic counters (per-year order sequence)
const COUNTERS: TableDefinition<&str, u64> = TableDefinition::new("counters");

/// Storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] redb::DatabaseError),

    #[error("Transaction error: {0}")]
    Transaction(#[from] redb::TransactionError),

    #[error("Table error: {0}")]
    Table(#[from] redb::TableError),

    #[error("Storage error: {0}")]
    Storage(#[from] redb::StorageError),

    #[error("Commit error: {0}")]
    Commit(#[from] redb::CommitError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Record already exists: {0}")]
    AlreadyExists(String),
}

pub type StorageResult<T> = Result<T, StorageError>;

impl From<StorageError> for crate::utils::AppError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::NotFound(msg) => crate::utils::AppError::NotFound(msg),
            StorageError::AlreadyExists(msg) => crate::utils::AppError::Conflict(msg),
            other => crate::utils::AppError::Database(other.to_string()),
        }
    }
}

/// Version-stamped envelope around a stored record.
#[derive(serde::Serialize, serde::Deserialize)]
struct Envelope {
    version: u64,
    record: serde_json::Value,
}

fn encode<T: Serialize>(version: u64, record: &T) -> StorageResult<Vec<u8>> {
    let env = Envelope {
        version,
        record: serde_json::to_value(record)?,
    };
    Ok(serde_json::to_vec(&env)?)
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> StorageResult<(u64, T)> {
    let env: Envelope = serde_json::from_slice(bytes)?;
    let record = serde_json::from_value(env.record)?;
    Ok((env.version, record))
}

/// Retry policy for optimistic-update loops.
///
/// Conflicts are transient by nature: retries back off linearly
/// (`attempt * base_delay`) and give up after `max_retries`, at which
/// point the caller surfaces a `ConcurrencyConflict`.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay_ms: u64) -> Self {
        Self {
            max_retries,
            base_delay: Duration::from_millis(base_delay_ms),
        }
    }

    pub fn from_config(config: &crate::core::Config) -> Self {
        Self::new(config.conflict_max_retries, config.conflict_retry_base_ms)
    }

    /// Backoff before retry number `attempt` (1-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        self.base_delay * attempt
    }
}

/// Durable record store backed by redb
#[derive(Clone)]
pub struct Store {
    db: Arc<Database>,
}

impl Store {
    /// Open or create the database at the given path
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        let db = Database::create(path)?;
        let store = Self { db: Arc::new(db) };
        store.init_tables()?;
        Ok(store)
    }

    /// Open an in-memory database (used by tests)
    pub fn open_in_memory() -> StorageResult<Self> {
        let db = Database::builder().create_with_backend(redb::backends::InMemoryBackend::new())?;
        let store = Self { db: Arc::new(db) };
        store.init_tables()?;
        Ok(store)
    }

    fn init_tables(&self) -> StorageResult<()> {
        let txn = self.db.begin_write()?;
        {
            let _ = txn.open_table(TICKET_TYPES)?;
            let _ = txn.open_table(PROMO_CODES)?;
            let _ = txn.open_table(ORDERS)?;
            let _ = txn.open_table(TICKETS)?;
            let _ = txn.open_table(REFUND_REQUESTS)?;
            let _ = txn.open_table(SETTLEMENT_REQUESTS)?;
            let _ = txn.open_table(FEES)?;
            let _ = txn.open_table(EVENT_SETTINGS)?;
            let _ = txn.open_table(RESERVATIONS)?;
            let _ = txn.open_table(TICKET_CODE_IDX)?;
            let _ = txn.open_table(ORDER_NUMBER_IDX)?;
            let _ = txn.open_table(PROMO_CODE_IDX)?;
            let _ = txn.open_table(PROMO_CONSUMPTIONS)?;
            let _ = txn.open_table(COUNTERS)?;
        }
        txn.commit()?;
        Ok(())
    }

    // ========== Versioned Record Operations ==========

    /// Insert a new record with version 1. Fails if the id is taken.
    pub fn insert_new<T: Serialize>(
        &self,
        table: TableDefinition<&str, &[u8]>,
        id: &str,
        record: &T,
    ) -> StorageResult<()> {
        let txn = self.db.begin_write()?;
        {
            let mut t = txn.open_table(table)?;
            if t.get(id)?.is_some() {
                return Err(StorageError::AlreadyExists(id.to_string()));
            }
            let value = encode(1, record)?;
            t.insert(id, value.as_slice())?;
        }
        txn.commit()?;
        Ok(())
    }

    /// Insert or replace a record, bumping the version stamp.
    ///
    /// For uncontended configuration records; contended records go
    /// through [`Store::put_if_version`] instead.
    pub fn upsert<T: Serialize>(
        &self,
        table: TableDefinition<&str, &[u8]>,
        id: &str,
        record: &T,
    ) -> StorageResult<()> {
        let txn = self.db.begin_write()?;
        {
            let mut t = txn.open_table(table)?;
            let version = match t.get(id)? {
                Some(value) => {
                    let env: Envelope = serde_json::from_slice(value.value())?;
                    env.version
                }
                None => 0,
            };
            let value = encode(version + 1, record)?;
            t.insert(id, value.as_slice())?;
        }
        txn.commit()?;
        Ok(())
    }

    /// Get a record, discarding its version stamp.
    pub fn get<T: DeserializeOwned>(
        &self,
        table: TableDefinition<&str, &[u8]>,
        id: &str,
    ) -> StorageResult<Option<T>> {
        Ok(self.get_versioned(table, id)?.map(|(_, record)| record))
    }

    /// Get a record together with its version stamp.
    pub fn get_versioned<T: DeserializeOwned>(
        &self,
        table: TableDefinition<&str, &[u8]>,
        id: &str,
    ) -> StorageResult<Option<(u64, T)>> {
        let txn = self.db.begin_read()?;
        let t = txn.open_table(table)?;
        match t.get(id)? {
            Some(value) => Ok(Some(decode(value.value())?)),
            None => Ok(None),
        }
    }

    /// Conditional write: replaces the record only if its stored
    /// version still equals `expected_version`, bumping the stamp.
    ///
    /// Returns `false` when another writer got there first; the caller
    /// re-reads and retries per its [`RetryPolicy`].
    pub fn put_if_version<T: Serialize>(
        &self,
        table: TableDefinition<&str, &[u8]>,
        id: &str,
        expected_version: u64,
        record: &T,
    ) -> StorageResult<bool> {
        self.put_if_version_with(table, id, expected_version, record, |_| Ok(()))
    }

    /// Conditional write plus side records in the same transaction.
    ///
    /// `extra` runs only when the version check passes; it commits or
    /// fails atomically with the main record (used by the inventory
    /// ledger to keep counters and reservation records in step).
    pub fn put_if_version_with<T: Serialize>(
        &self,
        table: TableDefinition<&str, &[u8]>,
        id: &str,
        expected_version: u64,
        record: &T,
        extra: impl FnOnce(&WriteTransaction) -> StorageResult<()>,
    ) -> StorageResult<bool> {
        let txn = self.db.begin_write()?;
        {
            let mut t = txn.open_table(table)?;
            let current = match t.get(id)? {
                Some(value) => {
                    let env: Envelope = serde_json::from_slice(value.value())?;
                    env.version
                }
                None => return Err(StorageError::NotFound(id.to_string())),
            };
            if current != expected_version {
                return Ok(false);
            }
            let value = encode(expected_version + 1, record)?;
            t.insert(id, value.as_slice())?;
        }
        extra(&txn)?;
        txn.commit()?;
        Ok(true)
    }

    /// All records of a table (version stamps discarded).
    pub fn scan<T: DeserializeOwned>(
        &self,
        table: TableDefinition<&str, &[u8]>,
    ) -> StorageResult<Vec<T>> {
        let txn = self.db.begin_read()?;
        let t = txn.open_table(table)?;
        let mut records = Vec::new();
        for result in t.iter()? {
            let (_key, value) = result?;
            let (_, record) = decode(value.value())?;
            records.push(record);
        }
        Ok(records)
    }

    // ========== Unique-Index Operations ==========

    /// Insert a record and its unique-index entry in one transaction.
    ///
    /// Returns `false` without writing anything when the index key is
    /// already taken (ticket-code collision, duplicate promo code).
    pub fn insert_with_index<T: Serialize>(
        &self,
        table: TableDefinition<&str, &[u8]>,
        id: &str,
        record: &T,
        index: TableDefinition<&str, &str>,
        index_key: &str,
    ) -> StorageResult<bool> {
        let txn = self.db.begin_write()?;
        {
            let mut idx = txn.open_table(index)?;
            if idx.get(index_key)?.is_some() {
                return Ok(false);
            }
            idx.insert(index_key, id)?;

            let mut t = txn.open_table(table)?;
            if t.get(id)?.is_some() {
                return Err(StorageError::AlreadyExists(id.to_string()));
            }
            let value = encode(1, record)?;
            t.insert(id, value.as_slice())?;
        }
        txn.commit()?;
        Ok(true)
    }

    /// Resolve a unique index key to its record id.
    pub fn get_index(
        &self,
        index: TableDefinition<&str, &str>,
        key: &str,
    ) -> StorageResult<Option<String>> {
        let txn = self.db.begin_read()?;
        let t = txn.open_table(index)?;
        Ok(t.get(key)?.map(|guard| guard.value().to_string()))
    }

    // ========== Plain Record Operations (reservations) ==========

    /// Write a plain (unversioned) record inside an open transaction.
    pub fn put_plain_txn<T: Serialize>(
        &self,
        txn: &WriteTransaction,
        table: TableDefinition<&str, &[u8]>,
        key: &str,
        record: &T,
    ) -> StorageResult<()> {
        let mut t = txn.open_table(table)?;
        let value = serde_json::to_vec(record)?;
        t.insert(key, value.as_slice())?;
        Ok(())
    }

    /// Remove a plain record inside an open transaction.
    pub fn delete_plain_txn(
        &self,
        txn: &WriteTransaction,
        table: TableDefinition<&str, &[u8]>,
        key: &str,
    ) -> StorageResult<()> {
        let mut t = txn.open_table(table)?;
        t.remove(key)?;
        Ok(())
    }

    /// Write a plain record in its own transaction.
    pub fn put_plain<T: Serialize>(
        &self,
        table: TableDefinition<&str, &[u8]>,
        key: &str,
        record: &T,
    ) -> StorageResult<()> {
        let txn = self.db.begin_write()?;
        self.put_plain_txn(&txn, table, key, record)?;
        txn.commit()?;
        Ok(())
    }

    pub fn get_plain<T: DeserializeOwned>(
        &self,
        table: TableDefinition<&str, &[u8]>,
        key: &str,
    ) -> StorageResult<Option<T>> {
        let txn = self.db.begin_read()?;
        let t = txn.open_table(table)?;
        match t.get(key)? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    pub fn scan_plain<T: DeserializeOwned>(
        &self,
        table: TableDefinition<&str, &[u8]>,
    ) -> StorageResult<Vec<T>> {
        let txn = self.db.begin_read()?;
        let t = txn.open_table(table)?;
        let mut records = Vec::new();
        for result in t.iter()? {
            let (_key, value) = result?;
            records.push(serde_json::from_slice(value.value())?);
        }
        Ok(records)
    }

    // ========== Counters ==========

    /// Increment and return the named counter (starts at 1).
    pub fn next_counter(&self, name: &str) -> StorageResult<u64> {
        let txn = self.db.begin_write()?;
        let next = {
            let mut t = txn.open_table(COUNTERS)?;
            let current = t.get(name)?.map(|g| g.value()).unwrap_or(0);
            let next = current + 1;
            t.insert(name, next)?;
            next
        };
        txn.commit()?;
        Ok(next)
    }

    // ========== Promo Usage Idempotency ==========

    /// Record that `order_id` consumed `promo_id`.
    ///
    /// Returns `false` if the consumption was already recorded, which
    /// makes usage increments idempotent against retried
    /// payment-confirmation callbacks.
    pub fn record_promo_consumption(
        &self,
        promo_id: &str,
        order_id: &str,
        customer_email: &str,
    ) -> StorageResult<bool> {
        let key = format!("{}:{}", promo_id, order_id);
        let txn = self.db.begin_write()?;
        let inserted = {
            let mut t = txn.open_table(PROMO_CONSUMPTIONS)?;
            if t.get(key.as_str())?.is_some() {
                false
            } else {
                t.insert(key.as_str(), customer_email)?;
                true
            }
        };
        txn.commit()?;
        Ok(inserted)
    }

    /// Number of paid orders by `customer_email` that consumed
    /// `promo_id` (backs the per-user usage cap).
    pub fn promo_uses_by_user(
        &self,
        promo_id: &str,
        customer_email: &str,
    ) -> StorageResult<u32> {
        let txn = self.db.begin_read()?;
        let t = txn.open_table(PROMO_CONSUMPTIONS)?;
        let prefix = format!("{}:", promo_id);
        // ':' + 1 == ';' bounds the key range to this promo id
        let end = format!("{};", promo_id);
        let mut count = 0;
        for result in t.range(prefix.as_str()..end.as_str())? {
            let (_key, value) = result?;
            if value.value() == customer_email {
                count += 1;
            }
        }
        Ok(count)
    }

    // ========== Statistics ==========

    /// Get storage statistics
    pub fn stats(&self) -> StorageResult<StorageStats> {
        let txn = self.db.begin_read()?;
        Ok(StorageStats {
            ticket_type_count: txn.open_table(TICKET_TYPES)?.len()?,
            order_count: txn.open_table(ORDERS)?.len()?,
            ticket_count: txn.open_table(TICKETS)?.len()?,
            reservation_count: txn.open_table(RESERVATIONS)?.len()?,
            refund_request_count: txn.open_table(REFUND_REQUESTS)?.len()?,
            settlement_request_count: txn.open_table(SETTLEMENT_REQUESTS)?.len()?,
        })
    }
}

/// Storage statistics
#[derive(Debug, Clone, serde::Serialize)]
pub struct StorageStats {
    pub ticket_type_count: u64,
    pub order_count: u64,
    pub ticket_count: u64,
    pub reservation_count: u64,
    pub refund_request_count: u64,
    pub settlement_request_count: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::models::TicketType;
    use shared::util::now_millis;

    fn ticket_type(id: &str) -> TicketType {
        TicketType {
            id: id.to_string(),
            event_id: "ev-1".to_string(),
            name: "GA".to_string(),
            price: 20.0,
            capacity: 50,
            sold: 0,
            reserved: 0,
            min_per_order: 1,
            max_per_order: None,
            sales_start: None,
            sales_end: None,
            active: true,
            created_at: now_millis(),
        }
    }

    #[test]
    fn test_insert_and_get_versioned() {
        let store = Store::open_in_memory().unwrap();
        let tt = ticket_type("tt-1");
        store.insert_new(TICKET_TYPES, &tt.id, &tt).unwrap();

        let (version, loaded): (u64, TicketType) =
            store.get_versioned(TICKET_TYPES, "tt-1").unwrap().unwrap();
        assert_eq!(version, 1);
        assert_eq!(loaded, tt);
    }

    #[test]
    fn test_insert_duplicate_id_rejected() {
        let store = Store::open_in_memory().unwrap();
        let tt = ticket_type("tt-1");
        store.insert_new(TICKET_TYPES, &tt.id, &tt).unwrap();
        let err = store.insert_new(TICKET_TYPES, &tt.id, &tt).unwrap_err();
        assert!(matches!(err, StorageError::AlreadyExists(_)));
    }

    #[test]
    fn test_put_if_version_detects_conflict() {
        let store = Store::open_in_memory().unwrap();
        let mut tt = ticket_type("tt-1");
        store.insert_new(TICKET_TYPES, &tt.id, &tt).unwrap();

        tt.reserved = 2;
        assert!(store.put_if_version(TICKET_TYPES, "tt-1", 1, &tt).unwrap());

        // Stale version is rejected, record unchanged
        tt.reserved = 99;
        assert!(!store.put_if_version(TICKET_TYPES, "tt-1", 1, &tt).unwrap());

        let (version, loaded): (u64, TicketType) =
            store.get_versioned(TICKET_TYPES, "tt-1").unwrap().unwrap();
        assert_eq!(version, 2);
        assert_eq!(loaded.reserved, 2);
    }

    #[test]
    fn test_put_if_version_missing_record() {
        let store = Store::open_in_memory().unwrap();
        let tt = ticket_type("ghost");
        let err = store
            .put_if_version(TICKET_TYPES, "ghost", 1, &tt)
            .unwrap_err();
        assert!(matches!(err, StorageError::NotFound(_)));
    }

    #[test]
    fn test_insert_with_index_collision() {
        let store = Store::open_in_memory().unwrap();
        let a = ticket_type("tt-a");
        let b = ticket_type("tt-b");

        assert!(
            store
                .insert_with_index(TICKET_TYPES, &a.id, &a, TICKET_CODE_IDX, "SAME-KEY")
                .unwrap()
        );
        // Same index key: nothing written
        assert!(
            !store
                .insert_with_index(TICKET_TYPES, &b.id, &b, TICKET_CODE_IDX, "SAME-KEY")
                .unwrap()
        );
        assert!(
            store
                .get::<TicketType>(TICKET_TYPES, "tt-b")
                .unwrap()
                .is_none()
        );
        assert_eq!(
            store.get_index(TICKET_CODE_IDX, "SAME-KEY").unwrap(),
            Some("tt-a".to_string())
        );
    }

    #[test]
    fn test_counter_increments() {
        let store = Store::open_in_memory().unwrap();
        assert_eq!(store.next_counter("order_seq:2026").unwrap(), 1);
        assert_eq!(store.next_counter("order_seq:2026").unwrap(), 2);
        // Independent counters per year
        assert_eq!(store.next_counter("order_seq:2027").unwrap(), 1);
    }

    #[test]
    fn test_promo_consumption_idempotency() {
        let store = Store::open_in_memory().unwrap();
        assert!(
            store
                .record_promo_consumption("pc-1", "ord-1", "a@example.com")
                .unwrap()
        );
        // Retried confirmation: not recorded twice
        assert!(
            !store
                .record_promo_consumption("pc-1", "ord-1", "a@example.com")
                .unwrap()
        );
        store
            .record_promo_consumption("pc-1", "ord-2", "a@example.com")
            .unwrap();
        store
            .record_promo_consumption("pc-1", "ord-3", "b@example.com")
            .unwrap();

        assert_eq!(store.promo_uses_by_user("pc-1", "a@example.com").unwrap(), 2);
        assert_eq!(store.promo_uses_by_user("pc-1", "b@example.com").unwrap(), 1);
        assert_eq!(store.promo_uses_by_user("pc-2", "a@example.com").unwrap(), 0);
    }

    #[test]
    fn test_retry_policy_backoff_grows() {
        let policy = RetryPolicy::new(5, 10);
        assert_eq!(policy.delay(1), Duration::from_millis(10));
        assert_eq!(policy.delay(3), Duration::from_millis(30));
    }

    #[test]
    fn test_open_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.redb");
        let store = Store::open(&path).unwrap();
        let tt = ticket_type("tt-1");
        store.insert_new(TICKET_TYPES, &tt.id, &tt).unwrap();
        drop(store);

        // Reopen and read back
        let store = Store::open(&path).unwrap();
        let loaded: TicketType = store.get(TICKET_TYPES, "tt-1").unwrap().unwrap();
        assert_eq!(loaded, tt);
    }
}
