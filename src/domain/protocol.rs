//! The contract every payment provider plugs into.
//!
//! A protocol is a pure translator between canonical transactions and one
//! provider's wire format. It never performs I/O itself; the engine in
//! `application::adapter` owns the remote call, persistence and state checks.

use super::callback::CallbackParameters;
use super::transaction::{
    AuthorizedTransaction, Extra, ProviderKind, ProviderReference, UnAuthorizedTransaction,
};
use crate::error::{GatewayError, ProviderError, Result};
use quick_xml::events::Event;
use quick_xml::reader::Reader;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq)]
pub enum WireBody {
    /// `application/x-www-form-urlencoded` fields.
    Form(Vec<(String, String)>),
    Json(serde_json::Value),
    /// A SOAP 1.1 call of `operation` with flat string arguments.
    Soap {
        operation: String,
        fields: Vec<(String, String)>,
    },
}

impl WireBody {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Form(_) => "form",
            Self::Json(_) => "json",
            Self::Soap { .. } => "soap",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct WireRequest {
    pub endpoint: String,
    pub body: WireBody,
    pub verify_tls: bool,
}

impl WireRequest {
    /// Form-encoded POST to `endpoint`.
    pub fn form<K: Into<String>, V: Into<String>>(
        endpoint: impl Into<String>,
        fields: impl IntoIterator<Item = (K, V)>,
    ) -> Self {
        Self::new(endpoint, WireBody::Form(pairs(fields)))
    }

    /// JSON POST to `endpoint`.
    pub fn json(endpoint: impl Into<String>, body: serde_json::Value) -> Self {
        Self::new(endpoint, WireBody::Json(body))
    }

    /// SOAP 1.1 call of `operation` at `endpoint`.
    pub fn soap<K: Into<String>, V: Into<String>>(
        endpoint: impl Into<String>,
        operation: impl Into<String>,
        fields: impl IntoIterator<Item = (K, V)>,
    ) -> Self {
        Self::new(
            endpoint,
            WireBody::Soap {
                operation: operation.into(),
                fields: pairs(fields),
            },
        )
    }

    fn new(endpoint: impl Into<String>, body: WireBody) -> Self {
        Self {
            endpoint: endpoint.into(),
            body,
            verify_tls: true,
        }
    }
}

fn pairs<K: Into<String>, V: Into<String>>(
    fields: impl IntoIterator<Item = (K, V)>,
) -> Vec<(String, String)> {
    fields
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}

/// Raw provider response. Non-2xx statuses are delivered too, since several
/// providers report rejections in the body of a 4xx.
#[derive(Debug, Clone, PartialEq)]
pub struct WireResponse {
    pub status: u16,
    pub body: String,
}

impl WireResponse {
    /// Wraps a status code and raw body.
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// Parses the body as JSON.
    pub fn json(&self) -> Result<serde_json::Value> {
        serde_json::from_str(&self.body).map_err(|e| {
            GatewayError::MalformedResponse(format!("expected JSON (status {}): {e}", self.status))
        })
    }

    /// Flattens the leaf elements of a SOAP/XML body into `local-name -> text`.
    ///
    /// Namespace prefixes are dropped. When a name repeats the last value wins.
    pub fn soap_fields(&self) -> Result<SoapFields> {
        let mut reader = Reader::from_str(&self.body);
        reader.trim_text(true);

        let mut fields = BTreeMap::new();
        let mut open: Vec<String> = Vec::new();
        let mut text: Option<String> = None;

        loop {
            match reader.read_event() {
                Ok(Event::Start(e)) => {
                    open.push(String::from_utf8_lossy(e.local_name().as_ref()).into_owned());
                    text = None;
                }
                Ok(Event::Text(t)) => {
                    let value = t.unescape().map_err(|e| {
                        GatewayError::MalformedResponse(format!("bad XML text: {e}"))
                    })?;
                    text = Some(value.into_owned());
                }
                Ok(Event::CData(c)) => {
                    text = Some(String::from_utf8_lossy(&c.into_inner()).into_owned());
                }
                Ok(Event::End(_)) => {
                    if let Some(name) = open.pop()
                        && let Some(value) = text.take()
                    {
                        fields.insert(name, value);
                    }
                }
                Ok(Event::Empty(e)) => {
                    fields.insert(
                        String::from_utf8_lossy(e.local_name().as_ref()).into_owned(),
                        String::new(),
                    );
                }
                Ok(Event::Eof) => break,
                Err(e) => {
                    return Err(GatewayError::MalformedResponse(format!(
                        "expected XML (status {}): {e}",
                        self.status
                    )));
                }
                _ => {}
            }
        }

        if fields.is_empty() {
            return Err(GatewayError::MalformedResponse(
                "XML body carried no values".to_string(),
            ));
        }
        Ok(SoapFields(fields))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SoapFields(BTreeMap<String, String>);

impl SoapFields {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    /// Like `get`, but a missing element is a malformed response.
    pub fn require(&self, name: &str) -> Result<&str> {
        self.get(name)
            .ok_or_else(|| GatewayError::MalformedResponse(format!("missing <{name}> in response")))
    }
}

/// How to send the payer to the provider's hosted page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RedirectInstruction {
    /// Plain GET redirect.
    Redirect { url: String },
    /// Auto-submitting form POST.
    AutoPost {
        action: String,
        fields: Vec<(String, String)>,
    },
}

impl RedirectInstruction {
    pub fn target(&self) -> &str {
        match self {
            Self::Redirect { url } => url,
            Self::AutoPost { action, .. } => action,
        }
    }
}

/// Receipts extracted from a successful verification.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SettlementResult {
    pub tracking_code: Option<String>,
    pub card_number: Option<String>,
    /// Provider bookkeeping merged into the row's `extra` document.
    pub extra: Extra,
}

/// One provider's wire protocol.
///
/// Each implementation owns its amount conversion and its code table; a
/// failure returned from any method is terminal for the current request.
pub trait ProviderProtocol: Send + Sync {
    fn kind(&self) -> ProviderKind;

    fn build_authorization_request(&self, tx: &UnAuthorizedTransaction) -> Result<WireRequest>;

    fn parse_authorization_response(
        &self,
        tx: &UnAuthorizedTransaction,
        response: &WireResponse,
    ) -> Result<ProviderReference>;

    fn build_redirect_instruction(&self, tx: &AuthorizedTransaction) -> RedirectInstruction;

    /// Decides from the callback alone whether settlement should proceed.
    fn validate_callback(&self, _params: &CallbackParameters) -> Result<()> {
        Ok(())
    }

    fn build_settlement_request(
        &self,
        tx: &AuthorizedTransaction,
        params: &CallbackParameters,
    ) -> Result<WireRequest>;

    fn parse_settlement_response(
        &self,
        tx: &AuthorizedTransaction,
        params: &CallbackParameters,
        response: &WireResponse,
    ) -> Result<SettlementResult>;

    fn reject(&self, code: impl Into<String>) -> GatewayError
    where
        Self: Sized,
    {
        ProviderError::new(self.kind(), code).into()
    }
}
