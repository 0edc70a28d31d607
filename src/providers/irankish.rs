//! Irankish: SOAP token service with an auto-posted payment page.

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
use std::str::FromStr;

pub const SERVER_URL: &str = "https://ikc.shaparak.ir/XToken/Tokens.xml";
pub const SERVER_VERIFY_URL: &str = "https://ikc.shaparak.ir/XVerify/Verify.xml";
pub const URL_GATE: &str = "https://ikc.shaparak.ir/TPayment/Payment/index";

const BILLING_UNIT: BillingUnit = BillingUnit::Rial;
const SUCCESS_RESULT_CODE: &str = "100";
const TOKEN_REJECTED: &str = "token-rejected";

pub(crate) const ERRORS: &[(&str, &str)] = &[
    (TOKEN_REJECTED, "the provider refused to issue a payment token"),
    ("110", "the cardholder cancelled the payment"),
    ("120", "insufficient account balance"),
    ("130", "card information is invalid"),
    ("131", "card password is invalid"),
    ("132", "card is blocked"),
    ("133", "card is expired"),
    ("140", "payment session timed out"),
    ("150", "internal bank error"),
    ("160", "CVV2 or expiry date is invalid"),
    ("166", "the issuing bank declined the transaction"),
    ("200", "amount exceeds the per-transaction limit"),
    ("201", "amount exceeds the daily limit"),
    ("202", "amount exceeds the monthly limit"),
    ("-20", "request contains invalid characters"),
    ("-30", "transaction has already been reversed"),
    ("-50", "request length is invalid"),
    ("-51", "request is malformed"),
    ("-80", "transaction not found"),
    ("-81", "internal bank error during verification"),
    ("-90", "transaction already verified"),
];

pub struct Irankish {
    merchant_id: String,
    sha1_key: String,
    description: String,
}

impl Irankish {
    pub fn from_config(config: &ProviderConfig) -> Result<Self> {
        Ok(Self {
            merchant_id: config.credential("merchant-id")?.to_string(),
            sha1_key: config.credential("sha1-key")?.to_string(),
            description: config.credential_or("description", "").to_string(),
        })
    }
}

impl ProviderProtocol for Irankish {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Irankish
    }

    fn build_authorization_request(&self, tx: &UnAuthorizedTransaction) -> Result<WireRequest> {
        let id = tx.id().to_string();
        Ok(WireRequest::soap(
            SERVER_URL,
            "MakeToken",
            [
                ("amount", tx.amount().format_in(BILLING_UNIT)?),
                ("merchantId", self.merchant_id.clone()),
                ("description", self.description.clone()),
                ("invoiceNo", id.clone()),
                ("paymentId", id.clone()),
                ("specialPaymentId", id),
                ("revertURL", tx.callback_url().to_string()),
            ],
        ))
    }

    fn parse_authorization_response(
        &self,
        _tx: &UnAuthorizedTransaction,
        response: &WireResponse,
    ) -> Result<ProviderReference> {
        let fields = response.soap_fields()?;
        if !fields.require("result")?.eq_ignore_ascii_case("true") {
            let mut err = ProviderError::new(self.kind(), TOKEN_REJECTED);
            if let Some(message) = fields.get("message").filter(|m| !m.is_empty()) {
                err = err.with_raw_message(message);
            }
            return Err(err.into());
        }

        match fields.get("token").filter(|t| !t.is_empty()) {
            Some(token) => Ok(ProviderReference::new(token)),
            None => Err(GatewayError::MalformedResponse(
                "token missing from MakeToken result".to_string(),
            )),
        }
    }

    fn build_redirect_instruction(&self, tx: &AuthorizedTransaction) -> RedirectInstruction {
        RedirectInstruction::AutoPost {
            action: URL_GATE.to_string(),
            fields: vec![
                ("token".to_string(), tx.reference().to_string()),
                ("merchantId".to_string(), self.merchant_id.clone()),
            ],
        }
    }

    fn validate_callback(&self, params: &CallbackParameters) -> Result<()> {
        match params.input("resultCode") {
            Some(SUCCESS_RESULT_CODE) => Ok(()),
            Some(code) => Err(self.reject(code)),
            None => Err(GatewayError::InvalidRequest(
                "resultCode missing from callback".to_string(),
            )),
        }
    }

    fn build_settlement_request(
        &self,
        tx: &AuthorizedTransaction,
        params: &CallbackParameters,
    ) -> Result<WireRequest> {
        let reference_number = params.filled("referenceId").ok_or_else(|| {
            GatewayError::InvalidRequest("referenceId missing from callback".to_string())
        })?;

        Ok(WireRequest::soap(
            SERVER_VERIFY_URL,
            "KicccPaymentsVerification",
            [
                ("token", tx.reference().to_string()),
                ("referenceNumber", reference_number.to_string()),
                ("merchantId", self.merchant_id.clone()),
                ("sha1Key", self.sha1_key.clone()),
            ],
        ))
    }

    fn parse_settlement_response(
        &self,
        _tx: &AuthorizedTransaction,
        params: &CallbackParameters,
        response: &WireResponse,
    ) -> Result<SettlementResult> {
        let fields = response.soap_fields()?;
        let raw = fields.require("KicccPaymentsVerificationResult")?.trim();
        let verified = Decimal::from_str(raw).map_err(|_| {
            GatewayError::MalformedResponse(format!("non-numeric verification result [{raw}]"))
        })?;

        if verified > Decimal::ZERO {
            Ok(SettlementResult {
                tracking_code: params.filled("referenceId").map(str::to_string),
                card_number: None,
                ..Default::default()
            })
        } else {
            Err(self.reject(raw))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::protocol::WireBody;
    use crate::domain::transaction::{Amount, NewTransaction, PaymentRequest, Transaction};
    use rust_decimal_macros::dec;
    use std::collections::BTreeMap;

    fn protocol() -> Irankish {
        let config = ProviderConfig {
            active: true,
            order: 0,
            name: "Irankish".to_string(),
            callback_url: "/cb".to_string(),
            verify_tls: None,
            api_type: None,
            credentials: BTreeMap::from([
                ("merchant-id".to_string(), "M-1".to_string()),
                ("sha1-key".to_string(), "secret".to_string()),
            ]),
        };
        Irankish::from_config(&config).unwrap()
    }

    fn unauthorized() -> UnAuthorizedTransaction {
        let record = Transaction::create(
            9,
            NewTransaction {
                provider: ProviderKind::Irankish,
                request: PaymentRequest::new(Amount::new(dec!(150000)).unwrap()),
            },
        );
        UnAuthorizedTransaction::from_record(&record, "https://shop/cb?transaction_id=9".into())
    }

    #[test]
    fn test_missing_credentials_fail() {
        let config = ProviderConfig {
            active: true,
            order: 0,
            name: "Irankish".to_string(),
            callback_url: "/cb".to_string(),
            verify_tls: None,
            api_type: None,
            credentials: BTreeMap::new(),
        };
        assert!(matches!(
            Irankish::from_config(&config),
            Err(GatewayError::Configuration(_))
        ));
    }

    #[test]
    fn test_authorization_request_bills_in_rials() {
        let request = protocol().build_authorization_request(&unauthorized()).unwrap();
        let WireBody::Soap { operation, fields, .. } = request.body else {
            panic!("expected SOAP body");
        };
        assert_eq!(operation, "MakeToken");
        assert!(fields.contains(&("amount".to_string(), "150000".to_string())));
        assert!(fields.contains(&("invoiceNo".to_string(), "9".to_string())));
        assert!(fields.contains(&(
            "revertURL".to_string(),
            "https://shop/cb?transaction_id=9".to_string()
        )));
    }

    #[test]
    fn test_rejected_token_carries_raw_message() {
        let body = "<MakeTokenResult><result>false</result><message>bad merchant</message></MakeTokenResult>";
        let err = protocol()
            .parse_authorization_response(&unauthorized(), &WireResponse::new(200, body))
            .unwrap_err();
        match err {
            GatewayError::Transaction(e) => {
                assert_eq!(e.code, TOKEN_REJECTED);
                assert_eq!(e.raw_message.as_deref(), Some("bad merchant"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_callback_requires_success_code() {
        let ok: CallbackParameters = [("resultCode", "100")].into_iter().collect();
        assert!(protocol().validate_callback(&ok).is_ok());

        let cancelled: CallbackParameters = [("resultCode", "110")].into_iter().collect();
        assert!(matches!(
            protocol().validate_callback(&cancelled),
            Err(GatewayError::Transaction(ref e)) if e.code == "110"
        ));
    }

    #[test]
    fn test_redirect_is_auto_post() {
        let authorized =
            AuthorizedTransaction::promote(unauthorized(), ProviderReference::new("ABC123"));
        let instruction = protocol().build_redirect_instruction(&authorized);
        assert_eq!(instruction.target(), URL_GATE);
        let RedirectInstruction::AutoPost { fields, .. } = instruction else {
            panic!("expected auto-post");
        };
        assert_eq!(fields[0], ("token".to_string(), "ABC123".to_string()));
    }

    #[test]
    fn test_non_positive_verification_is_rejected() {
        let authorized =
            AuthorizedTransaction::promote(unauthorized(), ProviderReference::new("ABC123"));
        let params: CallbackParameters = [("referenceId", "TRK-1")].into_iter().collect();
        let body = "<KicccPaymentsVerificationResult>-90</KicccPaymentsVerificationResult>";
        let err = protocol()
            .parse_settlement_response(&authorized, &params, &WireResponse::new(200, body))
            .unwrap_err();
        assert!(matches!(err, GatewayError::Transaction(ref e) if e.code == "-90"));
    }
}
