//! SabaPay: form-encoded invoice service answering in JSON.

use super::json_str;
use crate::config::ProviderConfig;
use crate::domain::callback::CallbackParameters;
use crate::domain::protocol::{
    ProviderProtocol, RedirectInstruction, SettlementResult, WireRequest, WireResponse,
};
use crate::domain::transaction::{
    AuthorizedTransaction, BillingUnit, ProviderKind, ProviderReference, UnAuthorizedTransaction,
};
use crate::error::{GatewayError, Result};

pub const SERVER_URL: &str = "http://pay.sabanovin.com/invoice/request";
pub const SERVER_VERIFY_URL: &str = "http://pay.sabanovin.com/invoice/check/";
pub const URL_GATE: &str = "http://pay.sabanovin.com/invoice/pay/";

const BILLING_UNIT: BillingUnit = BillingUnit::Toman;
// The callback reports success as 0 while the API reports it as 1.
const CALLBACK_SUCCESS: &str = "0";
const API_SUCCESS: &str = "1";
const FAILED: &str = "failed";

pub(crate) const ERRORS: &[(&str, &str)] = &[
    (FAILED, "the payment was not completed"),
    ("1", "the payer cancelled the payment"),
    ("2", "the bank declined the payment"),
    ("-1", "api key is invalid"),
    ("-2", "amount is below the minimum"),
    ("-3", "return url is invalid"),
    ("-4", "invoice not found"),
    ("-5", "invoice has already been checked"),
    ("-6", "invoice has not been paid"),
];

pub struct SabaPay {
    api_key: String,
}

impl SabaPay {
    pub fn from_config(config: &ProviderConfig) -> Result<Self> {
        Ok(Self {
            api_key: config.credential("api")?.to_string(),
        })
    }

    fn error_code(body: &serde_json::Value) -> String {
        json_str(body, "errorCode").unwrap_or_else(|| FAILED.to_string())
    }
}

impl ProviderProtocol for SabaPay {
    fn kind(&self) -> ProviderKind {
        ProviderKind::SabaPay
    }

    fn build_authorization_request(&self, tx: &UnAuthorizedTransaction) -> Result<WireRequest> {
        Ok(WireRequest::form(
            SERVER_URL,
            [
                ("api_key", self.api_key.clone()),
                ("amount", tx.amount().format_in(BILLING_UNIT)?),
                ("return_url", tx.callback_url().to_string()),
            ],
        ))
    }

    fn parse_authorization_response(
        &self,
        _tx: &UnAuthorizedTransaction,
        response: &WireResponse,
    ) -> Result<ProviderReference> {
        let body = response.json()?;
        if json_str(&body, "status").as_deref() != Some(API_SUCCESS) {
            return Err(self.reject(Self::error_code(&body)));
        }
        json_str(&body, "invoice_key")
            .filter(|key| !key.is_empty())
            .map(ProviderReference::new)
            .ok_or_else(|| GatewayError::MalformedResponse("invoice_key missing".to_string()))
    }

    fn build_redirect_instruction(&self, tx: &AuthorizedTransaction) -> RedirectInstruction {
        RedirectInstruction::Redirect {
            url: format!("{URL_GATE}{}", tx.reference()),
        }
    }

    fn validate_callback(&self, params: &CallbackParameters) -> Result<()> {
        match params.filled("status") {
            Some(CALLBACK_SUCCESS) => Ok(()),
            Some(code) => Err(self.reject(code)),
            None => Err(self.reject(FAILED)),
        }
    }

    fn build_settlement_request(
        &self,
        tx: &AuthorizedTransaction,
        _params: &CallbackParameters,
    ) -> Result<WireRequest> {
        // The stored invoice key is used rather than the one echoed on the callback.
        Ok(WireRequest::form(
            format!("{SERVER_VERIFY_URL}{}", tx.reference()),
            [("api_key", self.api_key.clone())],
        ))
    }

    fn parse_settlement_response(
        &self,
        _tx: &AuthorizedTransaction,
        params: &CallbackParameters,
        response: &WireResponse,
    ) -> Result<SettlementResult> {
        let body = response.json()?;
        if json_str(&body, "status").as_deref() != Some(API_SUCCESS) {
            return Err(self.reject(Self::error_code(&body)));
        }
        Ok(SettlementResult {
            tracking_code: params.filled("bank_code").map(str::to_string),
            card_number: params.filled("card_number").map(str::to_string),
            ..Default::default()
        })
    }
}
