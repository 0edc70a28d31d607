use crate::domain::ports::TransactionStore;
use crate::domain::transaction::{
    NewTransaction, StatusUpdate, Transaction, TransactionId, TransactionStatus,
};
use crate::error::{GatewayError, Result};
use async_trait::async_trait;
use chrono::Utc;
use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, DB, Options};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Column Family holding one JSON row per transaction.
pub const CF_TRANSACTIONS: &str = "transactions";
/// Column Family for bookkeeping such as the id sequence.
pub const CF_META: &str = "meta";

const SEQUENCE_KEY: &[u8] = b"transaction_seq";

/// A persistent transaction store using RocksDB.
///
/// Rows are keyed by the big-endian transaction id so iteration follows
/// insertion order. Every read-check-write sequence runs under `write_lock`,
/// giving `update_status` the same atomicity as the in-memory store within
/// one process.
///
/// This struct is thread-safe (`Clone` shares the underlying `Arc<DB>`).
#[derive(Clone)]
pub struct RocksDBStore {
    db: Arc<DB>,
    write_lock: Arc<Mutex<()>>,
}

impl RocksDBStore {
    /// Opens or creates a RocksDB instance at the specified path.
    ///
    /// Ensures that the required column families ("transactions" and "meta") exist.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf_transactions = ColumnFamilyDescriptor::new(CF_TRANSACTIONS, Options::default());
        let cf_meta = ColumnFamilyDescriptor::new(CF_META, Options::default());

        let db = DB::open_cf_descriptors(&opts, path, vec![cf_transactions, cf_meta])?;

        Ok(Self {
            db: Arc::new(db),
            write_lock: Arc::new(Mutex::new(())),
        })
    }

    fn cf(&self, name: &str) -> Result<&ColumnFamily> {
        self.db.cf_handle(name).ok_or_else(|| {
            GatewayError::InternalError(Box::new(std::io::Error::other(format!(
                "{name} column family not found"
            ))))
        })
    }

    fn read_row(&self, id: TransactionId) -> Result<Option<Transaction>> {
        let cf = self.cf(CF_TRANSACTIONS)?;
        match self.db.get_cf(&cf, id.to_be_bytes())? {
            Some(bytes) => serde_json::from_slice(&bytes).map(Some).map_err(|e| {
                GatewayError::InternalError(Box::new(std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    format!("Deserialization error: {}", e),
                )))
            }),
            None => Ok(None),
        }
    }

    fn write_row(&self, row: &Transaction) -> Result<()> {
        let cf = self.cf(CF_TRANSACTIONS)?;
        let value = serde_json::to_vec(row).map_err(|e| {
            GatewayError::InternalError(Box::new(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("Serialization error: {}", e),
            )))
        })?;
        self.db.put_cf(&cf, row.id.to_be_bytes(), value)?;
        Ok(())
    }

    fn next_id(&self) -> Result<TransactionId> {
        let cf = self.cf(CF_META)?;
        let last = match self.db.get_cf(&cf, SEQUENCE_KEY)? {
            Some(bytes) => {
                let raw: [u8; 8] = bytes.as_slice().try_into().map_err(|_| {
                    GatewayError::InternalError(Box::new(std::io::Error::other(
                        "corrupt transaction sequence",
                    )))
                })?;
                u64::from_be_bytes(raw)
            }
            None => 0,
        };
        let next = last + 1;
        self.db.put_cf(&cf, SEQUENCE_KEY, next.to_be_bytes())?;
        Ok(next)
    }
}

#[async_trait]
impl TransactionStore for RocksDBStore {
    async fn insert(&self, tx: NewTransaction) -> Result<Transaction> {
        let _guard = self.write_lock.lock().await;
        let row = Transaction::create(self.next_id()?, tx);
        self.write_row(&row)?;
        Ok(row)
    }

    async fn find(&self, id: TransactionId) -> Result<Option<Transaction>> {
        Ok(self.read_row(id)?.filter(|row| !row.is_deleted()))
    }

    async fn update_status(
        &self,
        id: TransactionId,
        expected: TransactionStatus,
        update: StatusUpdate,
    ) -> Result<bool> {
        let _guard = self.write_lock.lock().await;
        let Some(mut row) = self.read_row(id)? else {
            return Ok(false);
        };
        if row.is_deleted() || row.status != expected {
            return Ok(false);
        }
        row.apply(update)?;
        self.write_row(&row)?;
        Ok(true)
    }

    async fn soft_delete(&self, id: TransactionId) -> Result<bool> {
        let _guard = self.write_lock.lock().await;
        match self.read_row(id)? {
            Some(mut row) if !row.is_deleted() => {
                row.deleted_at = Some(Utc::now());
                self.write_row(&row)?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}
