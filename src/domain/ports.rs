use super::protocol::{WireRequest, WireResponse};
use super::transaction::{NewTransaction, StatusUpdate, Transaction, TransactionId, TransactionStatus};
use crate::error::{Result, TransportError};
use async_trait::async_trait;
use std::sync::Arc;

/// Record store for transaction rows, keyed by transaction id.
#[async_trait]
pub trait TransactionStore: Send + Sync {
    /// Persists a new `Init` row and returns it with its assigned id.
    async fn insert(&self, tx: NewTransaction) -> Result<Transaction>;

    /// Looks up a row; soft-deleted rows are reported as absent.
    async fn find(&self, id: TransactionId) -> Result<Option<Transaction>>;

    /// Atomically applies `update` only if the row is currently in `expected`.
    ///
    /// Returns `false` when the row is missing or its status differs, which
    /// callers treat as a lost race.
    async fn update_status(
        &self,
        id: TransactionId,
        expected: TransactionStatus,
        update: StatusUpdate,
    ) -> Result<bool>;

    /// Marks a row deleted; it stays stored for audit.
    async fn soft_delete(&self, id: TransactionId) -> Result<bool>;
}

/// Key/value scope tied to one browser session.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn get(&self, key: &str) -> Option<String>;
    async fn set(&self, key: &str, value: String);
    async fn forget(&self, keys: &[String]);
    async fn entries(&self) -> Vec<(String, String)>;

    /// Reads a value and removes it in one step.
    async fn pull(&self, key: &str) -> Option<String> {
        let value = self.get(key).await;
        self.forget(&[key.to_string()]).await;
        value
    }
}

/// Whether a flow is tied to a browser session.
#[derive(Clone, Copy)]
pub enum SessionMode<'a> {
    /// Browser flow; the anti-replay token travels through this session.
    Stateful(&'a dyn SessionStore),
    /// Server-to-server flow; no session exists.
    Stateless,
}

/// Opaque remote call capability shared by SOAP and plain HTTP providers.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn call(&self, request: WireRequest) -> std::result::Result<WireResponse, TransportError>;
}

pub type TransactionStoreRef = Arc<dyn TransactionStore>;
pub type TransportRef = Arc<dyn Transport>;
