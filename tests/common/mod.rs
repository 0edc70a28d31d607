#![allow(dead_code)]

use async_trait::async_trait;
use paygate::application::manager::GatewayManager;
use paygate::config::GatewayConfig;
use paygate::domain::callback::CallbackParameters;
use paygate::domain::ports::Transport;
use paygate::domain::protocol::{WireRequest, WireResponse};
use paygate::domain::transaction::{Amount, AuthorizedTransaction, PaymentRequest};
use paygate::error::TransportError;
use paygate::infrastructure::in_memory::InMemoryTransactionStore;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const CONFIG: &str = r#"
base_url = "https://shop.example.com"

[providers.irankish]
active = true
order = 0
name = "Irankish"
callback_url = "/payments/callback"
[providers.irankish.credentials]
merchant-id = "M-100"
sha1-key = "secret"

[providers.sabapay]
active = true
order = 1
name = "SabaPay"
callback_url = "/payments/callback"
verify_tls = false
[providers.sabapay.credentials]
api = "saba-key"

[providers.payir]
active = false
order = 2
name = "Pay.ir"
callback_url = "https://shop.example.com/payir/callback"
[providers.payir.credentials]
api = "test"

[providers.nextpay]
active = true
order = 3
name = "NextPay"
callback_url = "/payments/callback"
api_type = "http"
[providers.nextpay.credentials]
api = "next-key"
"#;

#[derive(Clone)]
enum Script {
    Respond(WireResponse),
    Fail,
}

/// Transport answering from per-endpoint scripts and recording every request.
#[derive(Default)]
pub struct ScriptedTransport {
    scripts: Mutex<HashMap<String, Script>>,
    requests: Mutex<Vec<WireRequest>>,
    delay: Mutex<Option<Duration>>,
}

impl ScriptedTransport {
    pub fn respond(&self, endpoint: impl Into<String>, status: u16, body: &str) {
        self.scripts.lock().unwrap().insert(
            endpoint.into(),
            Script::Respond(WireResponse::new(status, body)),
        );
    }

    pub fn fail(&self, endpoint: impl Into<String>) {
        self.scripts
            .lock()
            .unwrap()
            .insert(endpoint.into(), Script::Fail);
    }

    /// Delays every response, to widen race windows.
    pub fn delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    pub fn calls_to(&self, endpoint: &str) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|request| request.endpoint.starts_with(endpoint))
            .count()
    }

    pub fn last_request(&self) -> Option<WireRequest> {
        self.requests.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn call(&self, request: WireRequest) -> Result<WireResponse, TransportError> {
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let script = self.scripts.lock().unwrap().get(&request.endpoint).cloned();
        self.requests.lock().unwrap().push(request);
        match script {
            Some(Script::Respond(response)) => Ok(response),
            Some(Script::Fail) | None => {
                Err(TransportError::Encode("connection refused".to_string()))
            }
        }
    }
}

pub struct Harness {
    pub manager: GatewayManager,
    pub store: InMemoryTransactionStore,
    pub transport: Arc<ScriptedTransport>,
}

pub fn harness() -> Harness {
    let store = InMemoryTransactionStore::new();
    let transport = Arc::new(ScriptedTransport::default());
    let manager = GatewayManager::new(
        GatewayConfig::from_toml_str(CONFIG).unwrap(),
        Arc::new(store.clone()),
        transport.clone(),
    )
    .unwrap();
    Harness {
        manager,
        store,
        transport,
    }
}

pub fn payment(amount: Decimal) -> PaymentRequest {
    PaymentRequest::new(Amount::new(amount).unwrap())
}

/// The query the provider echoes back when it redirects to our callback URL.
pub fn callback_query(tx: &AuthorizedTransaction) -> CallbackParameters {
    let url = url::Url::parse(tx.callback_url()).unwrap();
    CallbackParameters::from_query(url.query().unwrap_or_default())
}

pub fn irankish_token(token: &str) -> String {
    format!(
        "<soap:Envelope xmlns:soap=\"http://schemas.xmlsoap.org/soap/envelope/\"><soap:Body>\
         <MakeTokenResponse xmlns=\"http://tempuri.org/\"><MakeTokenResult>\
         <result>true</result><message /><token>{token}</token>\
         </MakeTokenResult></MakeTokenResponse></soap:Body></soap:Envelope>"
    )
}

pub fn irankish_verification(result: &str) -> String {
    format!(
        "<soap:Envelope xmlns:soap=\"http://schemas.xmlsoap.org/soap/envelope/\"><soap:Body>\
         <KicccPaymentsVerificationResponse xmlns=\"http://tempuri.org/\">\
         <KicccPaymentsVerificationResult>{result}</KicccPaymentsVerificationResult>\
         </KicccPaymentsVerificationResponse></soap:Body></soap:Envelope>"
    )
}
