use crate::domain::ports::{SessionStore, TransactionStore};
use crate::domain::transaction::{
    NewTransaction, StatusUpdate, Transaction, TransactionId, TransactionStatus,
};
use crate::error::Result;
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Default)]
struct Table {
    rows: HashMap<TransactionId, Transaction>,
    last_id: TransactionId,
}

/// A thread-safe in-memory store for transaction rows.
///
/// Uses `Arc<RwLock<..>>` so clones share the same table. The conditional
/// update runs entirely under the write lock, which makes it atomic with
/// respect to every other writer.
#[derive(Default, Clone)]
pub struct InMemoryTransactionStore {
    table: Arc<RwLock<Table>>,
}

impl InMemoryTransactionStore {
    /// Creates a new, empty in-memory transaction store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TransactionStore for InMemoryTransactionStore {
    async fn insert(&self, tx: NewTransaction) -> Result<Transaction> {
        let mut table = self.table.write().await;
        table.last_id += 1;
        let row = Transaction::create(table.last_id, tx);
        table.rows.insert(row.id, row.clone());
        Ok(row)
    }

    async fn find(&self, id: TransactionId) -> Result<Option<Transaction>> {
        let table = self.table.read().await;
        Ok(table.rows.get(&id).filter(|row| !row.is_deleted()).cloned())
    }

    async fn update_status(
        &self,
        id: TransactionId,
        expected: TransactionStatus,
        update: StatusUpdate,
    ) -> Result<bool> {
        let mut table = self.table.write().await;
        let Some(row) = table.rows.get_mut(&id) else {
            return Ok(false);
        };
        if row.is_deleted() || row.status != expected {
            return Ok(false);
        }

        // Validate on a copy so a rejected update leaves the row untouched.
        let mut next = row.clone();
        next.apply(update)?;
        *row = next;
        Ok(true)
    }

    async fn soft_delete(&self, id: TransactionId) -> Result<bool> {
        let mut table = self.table.write().await;
        match table.rows.get_mut(&id) {
            Some(row) if !row.is_deleted() => {
                row.deleted_at = Some(Utc::now());
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

/// Session scope backed by a shared map; one instance per browser session.
#[derive(Default, Clone)]
pub struct InMemorySessionStore {
    values: Arc<RwLock<HashMap<String, String>>>,
}

impl InMemorySessionStore {
    /// Creates a new, empty session scope.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn get(&self, key: &str) -> Option<String> {
        self.values.read().await.get(key).cloned()
    }

    async fn set(&self, key: &str, value: String) {
        self.values.write().await.insert(key.to_string(), value);
    }

    async fn forget(&self, keys: &[String]) {
        let mut values = self.values.write().await;
        for key in keys {
            values.remove(key);
        }
    }

    async fn entries(&self) -> Vec<(String, String)> {
        self.values
            .read()
            .await
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    async fn pull(&self, key: &str) -> Option<String> {
        self.values.write().await.remove(key)
    }
}
