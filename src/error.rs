use crate::domain::transaction::{ProviderKind, TransactionId};
use thiserror::Error;

/// A provider rejected authorization or settlement.
///
/// Only the raw provider code is carried; human-readable text is looked up
/// from the provider's table on demand.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{provider} rejected the transaction with code {code}")]
pub struct ProviderError {
    pub provider: ProviderKind,
    pub code: String,
    pub raw_message: Option<String>,
}

impl ProviderError {
    pub fn new(provider: ProviderKind, code: impl Into<String>) -> Self {
        Self {
            provider,
            code: code.into(),
            raw_message: None,
        }
    }

    pub fn with_raw_message(mut self, message: impl Into<String>) -> Self {
        self.raw_message = Some(message.into());
        self
    }

    /// Text for the code from the provider's table, or a generic fallback.
    pub fn message(&self) -> &'static str {
        crate::providers::describe(self.provider, &self.code)
    }
}

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("Failed to encode request body: {0}")]
    Encode(String),
}

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("Request parameters are not valid: {0}")]
    InvalidRequest(String),
    #[error("Invalid or missing state token")]
    InvalidState,
    #[error("Transaction {0} not found")]
    NotFoundTransaction(TransactionId),
    #[error("Transaction {0} is already finalized")]
    Retry(TransactionId),
    #[error("Transaction {0} was never authorized")]
    NotAuthorized(TransactionId),
    #[error(transparent)]
    Transaction(#[from] ProviderError),
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
    #[error("Malformed provider response: {0}")]
    MalformedResponse(String),
    #[error("Configuration error: {0}")]
    Configuration(String),
    #[error("Validation error: {0}")]
    ValidationError(String),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[cfg(feature = "storage-rocksdb")]
    #[error("RocksDB error: {0}")]
    RocksDB(#[from] rocksdb::Error),
    #[error("Internal error: {0}")]
    InternalError(Box<dyn std::error::Error + Send + Sync>),
}

pub type Result<T> = std::result::Result<T, GatewayError>;
