//! NextPay: token and verify services reachable over SOAP or plain HTTP.

use super::json_str;
use crate::config::{ApiType, ProviderConfig};
use crate::domain::callback::CallbackParameters;
use crate::domain::protocol::{
    ProviderProtocol, RedirectInstruction, SettlementResult, WireRequest, WireResponse,
};
use crate::domain::transaction::{
    AuthorizedTransaction, BillingUnit, ProviderKind, ProviderReference, UnAuthorizedTransaction,
};
use crate::error::{GatewayError, Result};

pub const SERVER_SOAP: &str = "https://api.nextpay.org/gateway/token.wsdl";
pub const SERVER_HTTP: &str = "https://api.nextpay.org/gateway/token.http";
pub const URL_PAYMENT: &str = "https://api.nextpay.org/gateway/payment/";
pub const SERVER_VERIFY_SOAP: &str = "https://api.nextpay.org/gateway/verify.wsdl";
pub const SERVER_VERIFY_HTTP: &str = "https://api.nextpay.org/gateway/verify.http";

const BILLING_UNIT: BillingUnit = BillingUnit::Toman;
const TOKEN_ISSUED: &str = "-1";
const PAYMENT_VERIFIED: &str = "0";

pub(crate) const ERRORS: &[(&str, &str)] = &[
    ("-2", "the bank rejected the payment or the payer cancelled"),
    ("-3", "payment is still pending at the bank"),
    ("-4", "the payment was cancelled"),
    ("-20", "api key was not sent"),
    ("-21", "transaction id was not sent"),
    ("-22", "amount was not sent"),
    ("-23", "callback url was not sent"),
    ("-24", "amount is invalid"),
    ("-25", "transaction id is duplicated or not accepted"),
    ("-26", "token was not sent"),
    ("-30", "amount is below 100 toman"),
    ("-32", "callback url is invalid"),
    ("-33", "invalid api key"),
    ("-34", "transaction id is invalid"),
    ("-35", "api key type is invalid"),
    ("-36", "order id was not sent"),
    ("-37", "transaction not found"),
    ("-38", "token not found"),
    ("-39", "api key not found"),
    ("-40", "api key is blocked"),
    ("-41", "request parameters are invalid"),
    ("-42", "payment system problem"),
    ("-43", "gateway not found"),
    ("-44", "bank response is invalid"),
    ("-45", "payment system is inactive"),
    ("-46", "request is invalid"),
    ("-48", "commission rate is not configured"),
    ("-49", "transaction is a duplicate"),
    ("-90", "internal error"),
];

pub struct NextPay {
    api_key: String,
    api_type: ApiType,
}

impl NextPay {
    pub fn from_config(config: &ProviderConfig) -> Result<Self> {
        Ok(Self {
            api_key: config.credential("api")?.to_string(),
            api_type: config.api_type.unwrap_or_default(),
        })
    }

    fn request(
        &self,
        soap_endpoint: &str,
        http_endpoint: &str,
        operation: &str,
        fields: Vec<(&str, String)>,
    ) -> WireRequest {
        match self.api_type {
            ApiType::Soap => WireRequest::soap(soap_endpoint, operation, fields),
            ApiType::Http => WireRequest::form(http_endpoint, fields),
        }
    }

    /// Extracts `(code, trans_id)` regardless of transport.
    fn result_fields(&self, response: &WireResponse) -> Result<(String, Option<String>)> {
        match self.api_type {
            ApiType::Soap => {
                let fields = response.soap_fields()?;
                Ok((
                    fields.require("code")?.trim().to_string(),
                    fields.get("trans_id").map(str::to_string),
                ))
            }
            ApiType::Http => {
                let body = response.json()?;
                let code = json_str(&body, "code").ok_or_else(|| {
                    GatewayError::MalformedResponse("code missing from NextPay response".into())
                })?;
                Ok((code, json_str(&body, "trans_id")))
            }
        }
    }

    fn callback_field<'a>(&self, params: &'a CallbackParameters, name: &str) -> Result<&'a str> {
        params
            .filled(name)
            .ok_or_else(|| GatewayError::InvalidRequest(format!("{name} missing from callback")))
    }
}

impl ProviderProtocol for NextPay {
    fn kind(&self) -> ProviderKind {
        ProviderKind::NextPay
    }

    fn build_authorization_request(&self, tx: &UnAuthorizedTransaction) -> Result<WireRequest> {
        Ok(self.request(
            SERVER_SOAP,
            SERVER_HTTP,
            "TokenGenerator",
            vec![
                ("api_key", self.api_key.clone()),
                ("order_id", tx.id().to_string()),
                ("amount", tx.amount().format_in(BILLING_UNIT)?),
                ("callback_uri", tx.callback_url().to_string()),
            ],
        ))
    }

    fn parse_authorization_response(
        &self,
        _tx: &UnAuthorizedTransaction,
        response: &WireResponse,
    ) -> Result<ProviderReference> {
        let (code, trans_id) = self.result_fields(response)?;
        if code != TOKEN_ISSUED {
            return Err(self.reject(code));
        }
        trans_id
            .filter(|id| !id.is_empty())
            .map(ProviderReference::new)
            .ok_or_else(|| GatewayError::MalformedResponse("trans_id missing".to_string()))
    }

    fn build_redirect_instruction(&self, tx: &AuthorizedTransaction) -> RedirectInstruction {
        RedirectInstruction::Redirect {
            url: format!("{URL_PAYMENT}{}", tx.reference()),
        }
    }

    fn validate_callback(&self, params: &CallbackParameters) -> Result<()> {
        self.callback_field(params, "order_id")?;
        self.callback_field(params, "trans_id")?;
        Ok(())
    }

    fn build_settlement_request(
        &self,
        tx: &AuthorizedTransaction,
        params: &CallbackParameters,
    ) -> Result<WireRequest> {
        let trans_id = self.callback_field(params, "trans_id")?;
        if trans_id != tx.reference().as_str() {
            return Err(GatewayError::InvalidRequest(
                "trans_id does not match the authorized reference".to_string(),
            ));
        }

        Ok(self.request(
            SERVER_VERIFY_SOAP,
            SERVER_VERIFY_HTTP,
            "PaymentVerification",
            vec![
                ("api_key", self.api_key.clone()),
                ("order_id", self.callback_field(params, "order_id")?.to_string()),
                ("amount", tx.amount().format_in(BILLING_UNIT)?),
                ("trans_id", trans_id.to_string()),
            ],
        ))
    }

    fn parse_settlement_response(
        &self,
        tx: &AuthorizedTransaction,
        params: &CallbackParameters,
        response: &WireResponse,
    ) -> Result<SettlementResult> {
        let (code, _) = self.result_fields(response)?;
        if code != PAYMENT_VERIFIED {
            return Err(self.reject(code));
        }
        Ok(SettlementResult {
            tracking_code: Some(tx.reference().to_string()),
            card_number: params.filled("card_holder").map(str::to_string),
            ..Default::default()
        })
    }
}
