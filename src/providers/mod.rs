//! Concrete provider protocols and their error-code tables.

pub mod irankish;
pub mod nextpay;
pub mod payir;
pub mod sabapay;

use crate::config::ProviderConfig;
use crate::domain::protocol::ProviderProtocol;
use crate::domain::transaction::ProviderKind;
use crate::error::Result;
use std::sync::Arc;

pub const UNKNOWN_ERROR: &str = "unknown error";

/// Builds the protocol for `kind` from its configuration entry.
pub fn build(kind: ProviderKind, config: &ProviderConfig) -> Result<Arc<dyn ProviderProtocol>> {
    Ok(match kind {
        ProviderKind::Irankish => Arc::new(irankish::Irankish::from_config(config)?),
        ProviderKind::NextPay => Arc::new(nextpay::NextPay::from_config(config)?),
        ProviderKind::SabaPay => Arc::new(sabapay::SabaPay::from_config(config)?),
        ProviderKind::Payir => Arc::new(payir::Payir::from_config(config)?),
    })
}

/// Human-readable text for a provider code; never fails.
pub fn describe(kind: ProviderKind, code: &str) -> &'static str {
    let table = match kind {
        ProviderKind::Irankish => irankish::ERRORS,
        ProviderKind::NextPay => nextpay::ERRORS,
        ProviderKind::SabaPay => sabapay::ERRORS,
        ProviderKind::Payir => payir::ERRORS,
    };
    lookup(table, code).unwrap_or(UNKNOWN_ERROR)
}

fn lookup(table: &[(&str, &'static str)], code: &str) -> Option<&'static str> {
    table
        .iter()
        .find(|(candidate, _)| *candidate == code.trim())
        .map(|(_, message)| *message)
}

/// Reads a scalar JSON field as a string; providers disagree on whether
/// codes are numbers or strings.
pub(crate) fn json_str(value: &serde_json::Value, key: &str) -> Option<String> {
    match value.get(key)? {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        serde_json::Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}
