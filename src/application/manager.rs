use super::adapter::{AdapterSettings, ProviderAdapter, STATE_SESSION_KEY};
use crate::config::{DriverEntry, GatewayConfig};
use crate::domain::callback::{CallbackParameters, STATE_PARAM, resolve_transaction_id};
use crate::domain::ports::{SessionMode, SessionStore, TransactionStoreRef, TransportRef};
use crate::domain::protocol::ProviderProtocol;
use crate::domain::transaction::{ProviderKind, SettledTransaction, Transaction};
use crate::error::{GatewayError, Result};
use crate::providers;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, warn};

/// Prefix for callback parameters staged in the session.
pub const STAGED_PREFIX: &str = "gateway_";

/// Registry of configured providers and resolver for inbound callbacks.
///
/// Protocols are built once from configuration; [`driver`](Self::driver)
/// hands out cheap adapters sharing them.
pub struct GatewayManager {
    config: GatewayConfig,
    store: TransactionStoreRef,
    transport: TransportRef,
    protocols: HashMap<ProviderKind, Arc<dyn ProviderProtocol>>,
}

impl GatewayManager {
    /// Builds every configured protocol; missing credentials fail here.
    pub fn new(
        config: GatewayConfig,
        store: TransactionStoreRef,
        transport: TransportRef,
    ) -> Result<Self> {
        let protocols = config
            .configured()
            .map(|(kind, provider)| {
                providers::build(kind, provider).map(|protocol| (kind, protocol))
            })
            .collect::<Result<HashMap<_, _>>>()?;

        Ok(Self {
            config,
            store,
            transport,
            protocols,
        })
    }

    /// Adapter for a named provider; unknown or unconfigured names fail.
    pub fn driver(&self, name: &str) -> Result<ProviderAdapter> {
        self.adapter(ProviderKind::from_str(name)?)
    }

    /// Adapter for a provider kind; fails if the provider is not configured.
    pub fn adapter(&self, kind: ProviderKind) -> Result<ProviderAdapter> {
        let not_configured =
            || GatewayError::Configuration(format!("Gateway driver [{kind}] is not configured"));
        let protocol = self.protocols.get(&kind).ok_or_else(not_configured)?;
        let provider = self.config.provider(kind).ok_or_else(not_configured)?;

        Ok(ProviderAdapter::new(
            Arc::clone(protocol),
            Arc::clone(&self.store),
            Arc::clone(&self.transport),
            AdapterSettings {
                base_url: self.config.base_url.clone(),
                callback_url: provider.callback_url.clone(),
                verify_tls: self.config.verify_tls_for(provider),
            },
        ))
    }

    /// Active providers in configured display order.
    pub fn active_drivers(&self) -> Vec<DriverEntry> {
        self.config.active_drivers()
    }

    /// Stores inbound parameters in the session for a later stateful resolve.
    ///
    /// Used when a provider posts to the server before the browser returns.
    /// The state parameter is never staged.
    pub async fn stage_callback(&self, params: &CallbackParameters, session: &dyn SessionStore) {
        for (name, value) in params.iter().filter(|(name, _)| *name != STATE_PARAM) {
            session
                .set(&format!("{STAGED_PREFIX}{name}"), value.to_string())
                .await;
        }
    }

    /// Resolves and guards the transaction a callback refers to.
    ///
    /// In stateful mode the callback's `_state` must match the token stored
    /// at authorization time.
    pub async fn transaction_from_callback(
        &self,
        params: &CallbackParameters,
        mode: SessionMode<'_>,
    ) -> Result<Transaction> {
        self.resolve(params, mode).await.map(|(row, _)| row)
    }

    /// Resolves the callback and returns an adapter bound to its transaction.
    pub async fn driver_from_callback(
        &self,
        params: &CallbackParameters,
        mode: SessionMode<'_>,
    ) -> Result<ProviderAdapter> {
        let (row, params) = self.resolve(params, mode).await?;
        let adapter = self.adapter(row.provider)?.bind(row.id, params);
        Ok(match mode {
            SessionMode::Stateless => adapter.stateless(),
            SessionMode::Stateful(_) => adapter,
        })
    }

    /// Resolves the callback and settles the bound transaction.
    pub async fn settle(
        &self,
        params: &CallbackParameters,
        mode: SessionMode<'_>,
    ) -> Result<SettledTransaction> {
        self.driver_from_callback(params, mode).await?.settle().await
    }

    async fn resolve(
        &self,
        params: &CallbackParameters,
        mode: SessionMode<'_>,
    ) -> Result<(Transaction, CallbackParameters)> {
        let params = match mode {
            SessionMode::Stateful(session) => Self::restore_session(params, session).await?,
            SessionMode::Stateless => params.clone(),
        };

        let id = resolve_transaction_id(&params)?;
        let row = self
            .store
            .find(id)
            .await?
            .ok_or(GatewayError::NotFoundTransaction(id))?;

        if row.status.is_terminal() {
            warn!(transaction_id = id, status = ?row.status, "callback for finalized transaction");
            return Err(GatewayError::Retry(id));
        }
        debug!(transaction_id = id, provider = %row.provider, "callback resolved");
        Ok((row, params))
    }

    /// Consumes the session token and staged parameters, then checks `_state`.
    ///
    /// The token is pulled before comparison so it can never be replayed,
    /// even when the check fails.
    async fn restore_session(
        params: &CallbackParameters,
        session: &dyn SessionStore,
    ) -> Result<CallbackParameters> {
        let expected = session.pull(STATE_SESSION_KEY).await;

        let staged: Vec<(String, String)> = session
            .entries()
            .await
            .into_iter()
            .filter(|(key, _)| key.starts_with(STAGED_PREFIX))
            .collect();
        let staged_keys: Vec<String> = staged.iter().map(|(key, _)| key.clone()).collect();
        session.forget(&staged_keys).await;

        let mut merged = params.clone();
        merged.extend(staged.into_iter().map(|(key, value)| {
            (key[STAGED_PREFIX.len()..].to_string(), value)
        }));

        let verified = match (expected.as_deref(), merged.filled(STATE_PARAM)) {
            (Some(expected), Some(provided)) => expected == provided,
            _ => false,
        };
        if !verified {
            warn!("callback state token missing or mismatched");
            return Err(GatewayError::InvalidState);
        }
        Ok(merged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::TransactionStore;
    use crate::domain::transaction::{
        Amount, NewTransaction, PaymentRequest, StatusUpdate, TransactionStatus,
    };
    use crate::infrastructure::http::HttpTransport;
    use crate::infrastructure::in_memory::{InMemorySessionStore, InMemoryTransactionStore};
    use rust_decimal_macros::dec;

    const CONFIG: &str = r#"
        base_url = "https://shop.example.com"

        [providers.payir]
        active = true
        order = 1
        name = "Pay.ir"
        callback_url = "/callback"
        [providers.payir.credentials]
        api = "test"

        [providers.nextpay]
        active = true
        order = 0
        name = "NextPay"
        callback_url = "/callback"
        api_type = "http"
        [providers.nextpay.credentials]
        api = "key"
    "#;

    fn manager(store: &InMemoryTransactionStore) -> GatewayManager {
        GatewayManager::new(
            GatewayConfig::from_toml_str(CONFIG).unwrap(),
            Arc::new(store.clone()),
            Arc::new(HttpTransport::new(None).unwrap()),
        )
        .unwrap()
    }

    async fn seeded(store: &InMemoryTransactionStore, status: TransactionStatus) -> Transaction {
        let row = store
            .insert(NewTransaction {
                provider: ProviderKind::Payir,
                request: PaymentRequest::new(Amount::new(dec!(50000)).unwrap()),
            })
            .await
            .unwrap();
        if status != TransactionStatus::Init {
            store
                .update_status(row.id, TransactionStatus::Init, StatusUpdate::authorized("tok"))
                .await
                .unwrap();
        }
        if status == TransactionStatus::Failed {
            store
                .update_status(row.id, TransactionStatus::Authorized, StatusUpdate::failed())
                .await
                .unwrap();
        }
        store.find(row.id).await.unwrap().unwrap()
    }

    #[test]
    fn test_missing_credentials_fail_at_build() {
        let raw = r#"
            base_url = "https://shop.example.com"
            [providers.sabapay]
            name = "SabaPay"
            callback_url = "/cb"
        "#;
        let result = GatewayManager::new(
            GatewayConfig::from_toml_str(raw).unwrap(),
            Arc::new(InMemoryTransactionStore::new()),
            Arc::new(HttpTransport::new(None).unwrap()),
        );
        assert!(matches!(result, Err(GatewayError::Configuration(_))));
    }

    #[test]
    fn test_driver_lookup() {
        let manager = manager(&InMemoryTransactionStore::new());
        assert_eq!(manager.driver("PAYIR").unwrap().kind(), ProviderKind::Payir);
        assert_eq!(manager.driver("next_pay").unwrap().kind(), ProviderKind::NextPay);
        assert!(matches!(
            manager.driver("irankish"),
            Err(GatewayError::Configuration(_))
        ));
        assert!(matches!(
            manager.driver("mellat"),
            Err(GatewayError::Configuration(_))
        ));

        let keys: Vec<_> = manager
            .active_drivers()
            .into_iter()
            .map(|driver| driver.key)
            .collect();
        assert_eq!(keys, vec!["nextpay", "payir"]);
    }

    #[tokio::test]
    async fn test_stateful_resolve_checks_token() {
        let store = InMemoryTransactionStore::new();
        let manager = manager(&store);
        let row = seeded(&store, TransactionStatus::Authorized).await;
        let session = InMemorySessionStore::new();

        session.set(STATE_SESSION_KEY, "good".to_string()).await;
        let params: CallbackParameters =
            [("transaction_id", row.id.to_string()), ("_state", "bad".into())]
                .into_iter()
                .collect();
        assert!(matches!(
            manager
                .transaction_from_callback(&params, SessionMode::Stateful(&session))
                .await,
            Err(GatewayError::InvalidState)
        ));
        // The token was consumed by the failed attempt.
        assert!(session.get(STATE_SESSION_KEY).await.is_none());

        // Stateless mode ignores the mismatch.
        let resolved = manager
            .transaction_from_callback(&params, SessionMode::Stateless)
            .await
            .unwrap();
        assert_eq!(resolved.id, row.id);

        let adapter = manager
            .driver_from_callback(&params, SessionMode::Stateless)
            .await
            .unwrap();
        assert!(adapter.is_stateless());
    }

    #[tokio::test]
    async fn test_staged_parameters_are_merged_and_forgotten() {
        let store = InMemoryTransactionStore::new();
        let manager = manager(&store);
        let row = seeded(&store, TransactionStatus::Authorized).await;
        let session = InMemorySessionStore::new();
        session.set(STATE_SESSION_KEY, "tok3n".to_string()).await;

        let posted: CallbackParameters =
            [("status", "1"), ("token", "tok"), ("_state", "forged")].into_iter().collect();
        manager.stage_callback(&posted, &session).await;

        let browser: CallbackParameters = [("iN", row.id.to_string()), ("_state", "tok3n".into())]
            .into_iter()
            .collect();
        let adapter = manager
            .driver_from_callback(&browser, SessionMode::Stateful(&session))
            .await
            .unwrap();
        assert_eq!(adapter.bound_transaction(), Some(row.id));
        assert_eq!(adapter.kind(), ProviderKind::Payir);
        assert!(!adapter.is_stateless());
        assert!(session.entries().await.is_empty());
    }

    #[tokio::test]
    async fn test_resolve_guards() {
        let store = InMemoryTransactionStore::new();
        let manager = manager(&store);

        let missing: CallbackParameters = [("status", "1")].into_iter().collect();
        assert!(matches!(
            manager
                .transaction_from_callback(&missing, SessionMode::Stateless)
                .await,
            Err(GatewayError::InvalidRequest(_))
        ));

        let unknown: CallbackParameters = [("transaction_id", "404")].into_iter().collect();
        assert!(matches!(
            manager
                .transaction_from_callback(&unknown, SessionMode::Stateless)
                .await,
            Err(GatewayError::NotFoundTransaction(404))
        ));

        let failed = seeded(&store, TransactionStatus::Failed).await;
        let params: CallbackParameters =
            [("transaction_id", failed.id.to_string())].into_iter().collect();
        assert!(matches!(
            manager.settle(&params, SessionMode::Stateless).await,
            Err(GatewayError::Retry(id)) if id == failed.id
        ));
    }
}
