//! Pay.ir: JSON over HTTP, billed in rials.

use super::json_str;
use crate::config::ProviderConfig;
use crate::domain::callback::CallbackParameters;
use crate::domain::protocol::{
    ProviderProtocol, RedirectInstruction, SettlementResult, WireRequest, WireResponse,
};
use crate::domain::transaction::{
    AuthorizedTransaction, BillingUnit, ProviderKind, ProviderReference, UnAuthorizedTransaction,
};
use crate::error::{GatewayError, ProviderError, Result};
use rust_decimal::Decimal;
use serde_json::json;
use std::str::FromStr;

pub const SERVER_SEND: &str = "https://pay.ir/pg/send";
pub const SERVER_VERIFY: &str = "https://pay.ir/pg/verify";
pub const URL_GATE: &str = "https://pay.ir/pg/";

const BILLING_UNIT: BillingUnit = BillingUnit::Rial;
const SUCCESS: &str = "1";
const FAILED: &str = "failed";
const AMOUNT_MISMATCH: &str = "amount-mismatch";

pub(crate) const ERRORS: &[(&str, &str)] = &[
    ("-1", "api key is required"),
    ("-2", "amount is required"),
    ("-3", "amount must be numeric"),
    ("-4", "amount must not be less than 1000 rials"),
    ("-5", "redirect url is required"),
    ("-6", "no active gateway was found for the api key"),
    ("-7", "the merchant is inactive"),
    ("-8", "redirect url does not match the registered gateway address"),
    (FAILED, "the transaction failed"),
    (AMOUNT_MISMATCH, "verified amount differs from the requested amount"),
];

pub struct Payir {
    api: String,
}

impl Payir {
    pub fn from_config(config: &ProviderConfig) -> Result<Self> {
        Ok(Self {
            api: config.credential("api")?.to_string(),
        })
    }

    fn rejection(&self, body: &serde_json::Value) -> GatewayError {
        let mut err = ProviderError::new(
            self.kind(),
            json_str(body, "errorCode").unwrap_or_else(|| FAILED.to_string()),
        );
        if let Some(message) = json_str(body, "errorMessage") {
            err = err.with_raw_message(message);
        }
        err.into()
    }
}

impl ProviderProtocol for Payir {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Payir
    }

    fn build_authorization_request(&self, tx: &UnAuthorizedTransaction) -> Result<WireRequest> {
        let amount = tx.amount().format_in(BILLING_UNIT)?;
        Ok(WireRequest::json(
            SERVER_SEND,
            json!({
                "api": self.api,
                "amount": amount,
                "redirect": tx.callback_url(),
                "factorNumber": tx.id().to_string(),
            }),
        ))
    }

    fn parse_authorization_response(
        &self,
        _tx: &UnAuthorizedTransaction,
        response: &WireResponse,
    ) -> Result<ProviderReference> {
        let body = response.json()?;
        if json_str(&body, "status").as_deref() != Some(SUCCESS) {
            return Err(self.rejection(&body));
        }
        json_str(&body, "token")
            .filter(|token| !token.is_empty())
            .map(ProviderReference::new)
            .ok_or_else(|| GatewayError::MalformedResponse("token missing".to_string()))
    }

    fn build_redirect_instruction(&self, tx: &AuthorizedTransaction) -> RedirectInstruction {
        RedirectInstruction::Redirect {
            url: format!("{URL_GATE}{}", tx.reference()),
        }
    }

    fn validate_callback(&self, params: &CallbackParameters) -> Result<()> {
        if params.filled("status") == Some(SUCCESS) {
            Ok(())
        } else {
            Err(self.reject(FAILED))
        }
    }

    fn build_settlement_request(
        &self,
        tx: &AuthorizedTransaction,
        _params: &CallbackParameters,
    ) -> Result<WireRequest> {
        Ok(WireRequest::json(
            SERVER_VERIFY,
            json!({
                "api": self.api,
                "token": tx.reference().as_str(),
            }),
        ))
    }

    fn parse_settlement_response(
        &self,
        tx: &AuthorizedTransaction,
        _params: &CallbackParameters,
        response: &WireResponse,
    ) -> Result<SettlementResult> {
        let body = response.json()?;
        if json_str(&body, "status").as_deref() != Some(SUCCESS) {
            return Err(self.rejection(&body));
        }
        if let Some(amount) = json_str(&body, "amount")
            && Decimal::from_str(amount.trim()).ok() != Some(tx.amount().in_unit(BILLING_UNIT))
        {
            return Err(self.reject(AMOUNT_MISMATCH));
        }
        let extra = [("factorNumber", "factor_number"), ("mobile", "mobile")]
            .into_iter()
            .filter_map(|(field, key)| {
                json_str(&body, field).map(|value| (key.to_string(), value.into()))
            })
            .collect();
        Ok(SettlementResult {
            tracking_code: json_str(&body, "transId"),
            card_number: json_str(&body, "cardNumber"),
            extra,
        })
    }
}
