use crate::error::{GatewayError, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub type TransactionId = u64;

/// Free-form provider bookkeeping stored alongside a transaction.
pub type Extra = serde_json::Map<String, serde_json::Value>;

/// Lifecycle state of a transaction.
///
/// Only forward transitions are legal: `Init -> Authorized -> {Succeeded | Failed}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionStatus {
    #[default]
    Init,
    Authorized,
    Succeeded,
    Failed,
}

impl TransactionStatus {
    /// `SUCCEEDED` and `FAILED` accept no further transitions.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }

    pub fn can_transition_to(self, next: TransactionStatus) -> bool {
        matches!(
            (self, next),
            (Self::Init, Self::Authorized)
                | (Self::Authorized, Self::Succeeded)
                | (Self::Authorized, Self::Failed)
        )
    }
}

/// Identifies which protocol owns a transaction. Immutable after creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProviderKind {
    Irankish,
    NextPay,
    SabaPay,
    Payir,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 4] = [
        ProviderKind::Irankish,
        ProviderKind::NextPay,
        ProviderKind::SabaPay,
        ProviderKind::Payir,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Irankish => "IRANKISH",
            Self::NextPay => "NEXT_PAY",
            Self::SabaPay => "SABA_PAY",
            Self::Payir => "PAYIR",
        }
    }

    /// Lowercase key used in configuration files.
    pub fn config_key(self) -> &'static str {
        match self {
            Self::Irankish => "irankish",
            Self::NextPay => "nextpay",
            Self::SabaPay => "sabapay",
            Self::Payir => "payir",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = GatewayError;

    /// Accepts both the config key and the stored code, case-insensitively.
    fn from_str(s: &str) -> Result<Self> {
        let normalized: String = s
            .chars()
            .filter(|c| *c != '_' && *c != '-')
            .collect::<String>()
            .to_ascii_lowercase();
        ProviderKind::ALL
            .into_iter()
            .find(|kind| kind.config_key() == normalized)
            .ok_or_else(|| GatewayError::Configuration(format!("Unknown gateway driver [{s}]")))
    }
}

/// Unit a provider bills in. Stored amounts are always canonical rials.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BillingUnit {
    Rial,
    /// One toman is ten rials.
    Toman,
}

/// A positive amount in the canonical unit, kept to 2 fractional digits.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct Amount(Decimal);

impl Amount {
    /// Rounds to 2 fractional digits; the rounded value must stay positive.
    pub fn new(value: Decimal) -> Result<Self> {
        let value = value.round_dp(2);
        if value > Decimal::ZERO {
            Ok(Self(value))
        } else {
            Err(GatewayError::ValidationError(
                "Amount must be positive".to_string(),
            ))
        }
    }

    /// The canonical value in rials.
    pub fn value(&self) -> Decimal {
        self.0
    }

    /// The value expressed in `unit`, possibly fractional.
    pub fn in_unit(&self, unit: BillingUnit) -> Decimal {
        match unit {
            BillingUnit::Rial => self.0,
            BillingUnit::Toman => self.0 / Decimal::TEN,
        }
    }

    /// Whole-number rendering for wire fields.
    ///
    /// Amounts that are not a whole number of `unit` are rejected.
    pub fn format_in(&self, unit: BillingUnit) -> Result<String> {
        let value = self.in_unit(unit);
        if value.fract() != Decimal::ZERO {
            return Err(GatewayError::ValidationError(format!(
                "amount {} is not a whole number of {unit:?}",
                self.0
            )));
        }
        Ok(value.normalize().to_string())
    }
}

impl TryFrom<Decimal> for Amount {
    type Error = GatewayError;

    fn try_from(value: Decimal) -> Result<Self> {
        Self::new(value)
    }
}

impl From<Amount> for Decimal {
    fn from(amount: Amount) -> Self {
        amount.0
    }
}

/// Input for a new payment attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentRequest {
    pub amount: Amount,
    pub currency: Option<String>,
    pub ip: Option<String>,
    pub extra: Extra,
}

impl PaymentRequest {
    /// Creates a request with no currency, ip or extra data.
    pub fn new(amount: Amount) -> Self {
        Self {
            amount,
            currency: None,
            ip: None,
            extra: Extra::new(),
        }
    }

    pub fn with_currency(mut self, currency: impl Into<String>) -> Self {
        self.currency = Some(currency.into());
        self
    }

    pub fn with_ip(mut self, ip: impl Into<String>) -> Self {
        self.ip = Some(ip.into());
        self
    }

    /// Adds an entry to the free-form document stored with the row.
    pub fn with_extra(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }
}

/// A row as it is handed to storage before an id has been assigned.
#[derive(Debug, Clone, PartialEq)]
pub struct NewTransaction {
    pub provider: ProviderKind,
    pub request: PaymentRequest,
}

/// The persistent record of a payment attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TransactionId,
    pub provider: ProviderKind,
    pub amount: Amount,
    pub currency: Option<String>,
    pub ref_id: Option<String>,
    pub tracking_code: Option<String>,
    pub card_number: Option<String>,
    pub status: TransactionStatus,
    pub ip: Option<String>,
    #[serde(default)]
    pub extra: Extra,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Transaction {
    /// Materializes a freshly inserted row.
    pub fn create(id: TransactionId, new: NewTransaction) -> Self {
        let now = Utc::now();
        Self {
            id,
            provider: new.provider,
            amount: new.request.amount,
            currency: new.request.currency,
            ref_id: None,
            tracking_code: None,
            card_number: None,
            status: TransactionStatus::Init,
            ip: new.request.ip,
            extra: new.request.extra,
            paid_at: None,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Applies a status transition, enforcing the record invariants.
    ///
    /// The caller is responsible for having checked the expected prior status
    /// atomically; this only validates that the transition itself is legal.
    pub fn apply(&mut self, update: StatusUpdate) -> Result<()> {
        if !self.status.can_transition_to(update.status) {
            return Err(GatewayError::ValidationError(format!(
                "illegal transition {:?} -> {:?} for transaction {}",
                self.status, update.status, self.id
            )));
        }
        if update.ref_id.is_some() && update.status != TransactionStatus::Authorized {
            return Err(GatewayError::ValidationError(
                "ref_id may only be set when authorizing".to_string(),
            ));
        }
        if update.paid_at.is_some() != (update.status == TransactionStatus::Succeeded) {
            return Err(GatewayError::ValidationError(
                "paid_at must be set exactly when the transaction succeeds".to_string(),
            ));
        }

        self.status = update.status;
        if let Some(ref_id) = update.ref_id {
            self.ref_id = Some(ref_id);
        }
        if update.tracking_code.is_some() {
            self.tracking_code = update.tracking_code;
        }
        if update.card_number.is_some() {
            self.card_number = update.card_number;
        }
        self.paid_at = update.paid_at;
        self.extra.extend(update.extra);
        self.updated_at = Utc::now();
        Ok(())
    }
}

/// Fields written together with a conditional status change.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusUpdate {
    pub status: TransactionStatus,
    pub ref_id: Option<String>,
    pub tracking_code: Option<String>,
    pub card_number: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
    pub extra: Extra,
}

impl StatusUpdate {
    /// Moves the row to `AUTHORIZED` with the provider reference.
    pub fn authorized(ref_id: impl Into<String>) -> Self {
        Self {
            status: TransactionStatus::Authorized,
            ref_id: Some(ref_id.into()),
            ..Self::bare(TransactionStatus::Authorized)
        }
    }

    /// Moves the row to `SUCCEEDED`; `paid_at` is mandatory.
    pub fn succeeded(
        tracking_code: Option<String>,
        card_number: Option<String>,
        paid_at: DateTime<Utc>,
    ) -> Self {
        Self {
            tracking_code,
            card_number,
            paid_at: Some(paid_at),
            ..Self::bare(TransactionStatus::Succeeded)
        }
    }

    /// Moves the row to `FAILED`.
    pub fn failed() -> Self {
        Self::bare(TransactionStatus::Failed)
    }

    /// Merges provider bookkeeping into the row's `extra` document.
    pub fn with_extra(mut self, extra: Extra) -> Self {
        self.extra = extra;
        self
    }

    fn bare(status: TransactionStatus) -> Self {
        Self {
            status,
            ref_id: None,
            tracking_code: None,
            card_number: None,
            paid_at: None,
            extra: Extra::new(),
        }
    }
}

/// Provider-assigned reference obtained at authorization time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderReference(String);

impl ProviderReference {
    /// Wraps a reference exactly as the provider returned it.
    pub fn new(reference: impl Into<String>) -> Self {
        Self(reference.into())
    }

    /// Returns the raw reference.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProviderReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Fields known before authorization.
#[derive(Debug, Clone, PartialEq)]
pub struct UnAuthorizedTransaction {
    id: TransactionId,
    provider: ProviderKind,
    amount: Amount,
    currency: Option<String>,
    callback_url: String,
    extra: Extra,
}

impl UnAuthorizedTransaction {
    pub(crate) fn from_record(record: &Transaction, callback_url: String) -> Self {
        Self {
            id: record.id,
            provider: record.provider,
            amount: record.amount,
            currency: record.currency.clone(),
            callback_url,
            extra: record.extra.clone(),
        }
    }

    /// Returns the store-assigned transaction id.
    pub fn id(&self) -> TransactionId {
        self.id
    }

    /// Returns the provider that owns the transaction.
    pub fn provider(&self) -> ProviderKind {
        self.provider
    }

    /// Returns the amount in canonical rials.
    pub fn amount(&self) -> Amount {
        self.amount
    }

    /// Returns the optional ISO currency code.
    pub fn currency(&self) -> Option<&str> {
        self.currency.as_deref()
    }

    /// Returns the effective callback URL, correlation parameters included.
    pub fn callback_url(&self) -> &str {
        &self.callback_url
    }

    /// Returns the free-form document stored with the row.
    pub fn extra(&self) -> &Extra {
        &self.extra
    }
}

/// An authorized transaction: everything before plus the provider reference.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthorizedTransaction {
    base: UnAuthorizedTransaction,
    reference: ProviderReference,
}

impl AuthorizedTransaction {
    /// Extends an unauthorized view with the reference the provider issued.
    pub fn promote(base: UnAuthorizedTransaction, reference: ProviderReference) -> Self {
        Self { base, reference }
    }

    /// Rebuilds the view from a stored row; `None` unless the row carries a reference.
    pub(crate) fn from_record(record: &Transaction, callback_url: String) -> Option<Self> {
        let reference = ProviderReference::new(record.ref_id.clone()?);
        Some(Self::promote(
            UnAuthorizedTransaction::from_record(record, callback_url),
            reference,
        ))
    }

    /// Returns the provider reference obtained at authorization.
    pub fn reference(&self) -> &ProviderReference {
        &self.reference
    }

    /// Returns the store-assigned transaction id.
    pub fn id(&self) -> TransactionId {
        self.base.id()
    }

    pub fn provider(&self) -> ProviderKind {
        self.base.provider()
    }

    pub fn amount(&self) -> Amount {
        self.base.amount()
    }

    pub fn currency(&self) -> Option<&str> {
        self.base.currency()
    }

    pub fn callback_url(&self) -> &str {
        self.base.callback_url()
    }

    pub fn extra(&self) -> &Extra {
        self.base.extra()
    }
}

/// A settled transaction: everything before plus provider-supplied receipts.
#[derive(Debug, Clone, PartialEq)]
pub struct SettledTransaction {
    base: AuthorizedTransaction,
    tracking_code: Option<String>,
    card_number: Option<String>,
    paid_at: DateTime<Utc>,
}

impl SettledTransaction {
    /// Extends an authorized view with the settlement receipts.
    pub fn promote(
        base: AuthorizedTransaction,
        tracking_code: Option<String>,
        card_number: Option<String>,
        paid_at: DateTime<Utc>,
    ) -> Self {
        Self {
            base,
            tracking_code,
            card_number,
            paid_at,
        }
    }

    /// Returns the authorized view this settlement was promoted from.
    pub fn authorized(&self) -> &AuthorizedTransaction {
        &self.base
    }

    pub fn id(&self) -> TransactionId {
        self.base.id()
    }

    pub fn reference(&self) -> &ProviderReference {
        self.base.reference()
    }

    /// Returns the provider's tracking code, when it reported one.
    pub fn tracking_code(&self) -> Option<&str> {
        self.tracking_code.as_deref()
    }

    /// Returns the (usually masked) card number, when reported.
    pub fn card_number(&self) -> Option<&str> {
        self.card_number.as_deref()
    }

    /// Returns when the payment was confirmed.
    pub fn paid_at(&self) -> DateTime<Utc> {
        self.paid_at
    }
}
