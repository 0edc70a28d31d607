use crate::domain::callback::{CallbackParameters, STATE_PARAM};
use crate::domain::ports::{SessionMode, SessionStore, TransactionStoreRef, TransportRef};
use crate::domain::protocol::{ProviderProtocol, RedirectInstruction, SettlementResult};
use crate::domain::transaction::{
    AuthorizedTransaction, NewTransaction, PaymentRequest, ProviderKind, SettledTransaction,
    StatusUpdate, Transaction, TransactionId, TransactionStatus, UnAuthorizedTransaction,
};
use crate::error::{GatewayError, Result};
use chrono::Utc;
use rand::Rng;
use rand::distributions::Alphanumeric;
use std::sync::Arc;
use tracing::{info, warn};
use url::Url;

/// Session key holding the anti-replay token between authorize and callback.
pub const STATE_SESSION_KEY: &str = "gateway__state";

const STATE_TOKEN_LEN: usize = 40;

/// Per-provider wiring resolved from configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct AdapterSettings {
    /// Application base URL; relative callback URLs are resolved against it.
    pub base_url: String,
    /// Default callback URL, absolute or starting with `/`.
    pub callback_url: String,
    pub verify_tls: bool,
}

#[derive(Debug, Clone)]
struct Binding {
    transaction_id: TransactionId,
    params: CallbackParameters,
}

/// The authorize / redirect / settle algorithm shared by every provider.
///
/// The provider-specific parts are delegated to a [`ProviderProtocol`]; this
/// type owns the remote calls, persistence and lifecycle guards. Instances
/// are cheap to clone and are usually obtained from
/// [`GatewayManager`](super::manager::GatewayManager).
#[derive(Clone)]
pub struct ProviderAdapter {
    protocol: Arc<dyn ProviderProtocol>,
    store: TransactionStoreRef,
    transport: TransportRef,
    settings: AdapterSettings,
    callback_override: Option<String>,
    stateless: bool,
    binding: Option<Binding>,
}

impl ProviderAdapter {
    /// Wires a protocol to the shared store and transport.
    pub fn new(
        protocol: Arc<dyn ProviderProtocol>,
        store: TransactionStoreRef,
        transport: TransportRef,
        settings: AdapterSettings,
    ) -> Self {
        Self {
            protocol,
            store,
            transport,
            settings,
            callback_override: None,
            stateless: false,
            binding: None,
        }
    }

    /// Returns the provider this adapter speaks for.
    pub fn kind(&self) -> ProviderKind {
        self.protocol.kind()
    }

    /// Overrides the configured callback URL for this adapter.
    pub fn callback_url(mut self, url: impl Into<String>) -> Self {
        self.callback_override = Some(url.into());
        self
    }

    /// Skips the session state token; for server-to-server flows.
    pub fn stateless(mut self) -> Self {
        self.stateless = true;
        self
    }

    /// Returns whether the session state token is skipped.
    pub fn is_stateless(&self) -> bool {
        self.stateless
    }

    /// Binds the adapter to a resolved callback so [`settle`](Self::settle) can run.
    pub fn bind(mut self, transaction_id: TransactionId, params: CallbackParameters) -> Self {
        self.binding = Some(Binding {
            transaction_id,
            params,
        });
        self
    }

    /// Returns the transaction id bound by a resolved callback, if any.
    pub fn bound_transaction(&self) -> Option<TransactionId> {
        self.binding.as_ref().map(|b| b.transaction_id)
    }

    /// Registers a new payment with the provider.
    ///
    /// Creates the `INIT` row, obtains the provider reference and moves the
    /// row to `AUTHORIZED`. A rejected authorization leaves the row in `INIT`.
    /// In stateful mode a fresh state token is stored in the session and
    /// echoed on the callback URL; a stateless adapter never uses one.
    pub async fn authorize(
        &self,
        request: PaymentRequest,
        mode: SessionMode<'_>,
    ) -> Result<AuthorizedTransaction> {
        let session: Option<&dyn SessionStore> = match mode {
            SessionMode::Stateful(session) if !self.stateless => Some(session),
            _ => None,
        };

        let row = self
            .store
            .insert(NewTransaction {
                provider: self.kind(),
                request,
            })
            .await?;

        let state = match session {
            Some(session) => {
                let token = state_token();
                session.set(STATE_SESSION_KEY, token.clone()).await;
                Some(token)
            }
            None => None,
        };

        let callback_url = self.callback_url_for(row.id, state.as_deref())?;
        let unauthorized = UnAuthorizedTransaction::from_record(&row, callback_url);

        let mut wire = self.protocol.build_authorization_request(&unauthorized)?;
        wire.verify_tls = self.settings.verify_tls;
        let response = self.transport.call(wire).await?;

        let reference = self
            .protocol
            .parse_authorization_response(&unauthorized, &response)
            .inspect_err(|e| {
                warn!(
                    transaction_id = row.id,
                    provider = %self.kind(),
                    error = %e,
                    "authorization rejected"
                );
            })?;

        let applied = self
            .store
            .update_status(
                row.id,
                TransactionStatus::Init,
                StatusUpdate::authorized(reference.as_str()),
            )
            .await?;
        if !applied {
            warn!(transaction_id = row.id, "transaction changed while authorizing");
            return Err(GatewayError::Retry(row.id));
        }

        info!(transaction_id = row.id, provider = %self.kind(), "transaction authorized");
        Ok(AuthorizedTransaction::promote(unauthorized, reference))
    }

    /// Tells the caller how to send the payer to the provider. Pure.
    pub fn redirect(&self, tx: &AuthorizedTransaction) -> RedirectInstruction {
        self.protocol.build_redirect_instruction(tx)
    }

    /// Verifies the bound callback with the provider and finalizes the row.
    ///
    /// Every failure past the terminal-state guard marks the row `FAILED`.
    /// The final write is conditional on the row still being `AUTHORIZED`;
    /// losing that race yields `Retry`.
    pub async fn settle(&self) -> Result<SettledTransaction> {
        let binding = self.binding.as_ref().ok_or_else(|| {
            GatewayError::InvalidRequest("adapter is not bound to a callback".to_string())
        })?;
        let id = binding.transaction_id;

        let row = self
            .store
            .find(id)
            .await?
            .ok_or(GatewayError::NotFoundTransaction(id))?;
        let authorized = self.authorized_view(&row)?;

        match self.verify(&authorized, &binding.params).await {
            Ok(result) => {
                let paid_at = Utc::now();
                let update = StatusUpdate::succeeded(
                    result.tracking_code.clone(),
                    result.card_number.clone(),
                    paid_at,
                )
                .with_extra(result.extra);
                self.finish(id, update).await?;
                info!(transaction_id = id, provider = %self.kind(), "transaction settled");
                Ok(SettledTransaction::promote(
                    authorized,
                    result.tracking_code,
                    result.card_number,
                    paid_at,
                ))
            }
            Err(err) => {
                self.finish(id, StatusUpdate::failed()).await?;
                warn!(
                    transaction_id = id,
                    provider = %self.kind(),
                    error = %err,
                    "settlement failed"
                );
                Err(err)
            }
        }
    }

    fn authorized_view(&self, row: &Transaction) -> Result<AuthorizedTransaction> {
        if row.provider != self.kind() {
            return Err(GatewayError::InvalidRequest(format!(
                "transaction {} belongs to {}, not {}",
                row.id,
                row.provider,
                self.kind()
            )));
        }
        if row.status.is_terminal() {
            return Err(GatewayError::Retry(row.id));
        }
        if row.status != TransactionStatus::Authorized {
            return Err(GatewayError::NotAuthorized(row.id));
        }
        let callback_url = self.callback_url_for(row.id, None)?;
        AuthorizedTransaction::from_record(row, callback_url)
            .ok_or(GatewayError::NotAuthorized(row.id))
    }

    async fn verify(
        &self,
        tx: &AuthorizedTransaction,
        params: &CallbackParameters,
    ) -> Result<SettlementResult> {
        self.protocol.validate_callback(params)?;
        let mut wire = self.protocol.build_settlement_request(tx, params)?;
        wire.verify_tls = self.settings.verify_tls;
        let response = self.transport.call(wire).await?;
        self.protocol.parse_settlement_response(tx, params, &response)
    }

    async fn finish(&self, id: TransactionId, update: StatusUpdate) -> Result<()> {
        if self
            .store
            .update_status(id, TransactionStatus::Authorized, update)
            .await?
        {
            Ok(())
        } else {
            warn!(transaction_id = id, "lost settlement race");
            Err(GatewayError::Retry(id))
        }
    }

    /// Effective callback URL with the correlation parameters appended.
    fn callback_url_for(&self, id: TransactionId, state: Option<&str>) -> Result<String> {
        let configured = self
            .callback_override
            .as_deref()
            .unwrap_or(&self.settings.callback_url);

        let absolute = if configured.starts_with('/') {
            format!("{}{}", self.settings.base_url.trim_end_matches('/'), configured)
        } else {
            configured.to_string()
        };
        let mut url = Url::parse(&absolute).map_err(|e| {
            GatewayError::Configuration(format!("invalid callback url [{absolute}]: {e}"))
        })?;

        {
            let mut query = url.query_pairs_mut();
            query.append_pair("transaction_id", &id.to_string());
            if let Some(state) = state {
                query.append_pair(STATE_PARAM, state);
            }
        }
        Ok(url.into())
    }
}

fn state_token() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(STATE_TOKEN_LEN)
        .map(char::from)
        .collect()
}
