use crate::domain::transaction::TransactionId;
use crate::error::{GatewayError, Result};
use std::collections::BTreeMap;

/// Accepted names for the correlation parameter, in priority order.
pub const TRANSACTION_ID_PARAMS: [&str; 2] = ["transaction_id", "iN"];

/// Name of the anti-replay token field echoed back on the callback.
pub const STATE_PARAM: &str = "_state";

/// Inbound parameters a returning provider supplies (query string or POST body).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallbackParameters {
    values: BTreeMap<String, String>,
}

impl CallbackParameters {
    /// Creates an empty parameter set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the raw value of `name`, if present.
    pub fn input(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    /// Like `input`, but treats blank values as absent.
    pub fn filled(&self, name: &str) -> Option<&str> {
        self.input(name).filter(|value| !value.trim().is_empty())
    }

    /// Sets `name`, replacing any previous value.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.values.insert(name.into(), value.into());
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Parses an `application/x-www-form-urlencoded` string.
    pub fn from_query(query: &str) -> Self {
        url::form_urlencoded::parse(query.trim_start_matches('?').as_bytes())
            .into_owned()
            .collect()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for CallbackParameters {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            values: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

impl Extend<(String, String)> for CallbackParameters {
    fn extend<I: IntoIterator<Item = (String, String)>>(&mut self, iter: I) {
        self.values.extend(iter);
    }
}

/// Normalizes the two historical aliases for the transaction id into one value.
pub fn resolve_transaction_id(params: &CallbackParameters) -> Result<TransactionId> {
    let raw = TRANSACTION_ID_PARAMS
        .iter()
        .find_map(|name| params.filled(name))
        .ok_or_else(|| GatewayError::InvalidRequest("missing transaction id".to_string()))?;

    raw.trim()
        .parse()
        .map_err(|_| GatewayError::InvalidRequest(format!("malformed transaction id [{raw}]")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_prefers_transaction_id() {
        let params: CallbackParameters = [("transaction_id", "12"), ("iN", "99")].into_iter().collect();
        assert_eq!(resolve_transaction_id(&params).unwrap(), 12);
    }

    #[test]
    fn test_resolve_accepts_short_alias() {
        let params: CallbackParameters = [("iN", "42")].into_iter().collect();
        assert_eq!(resolve_transaction_id(&params).unwrap(), 42);
    }

    #[test]
    fn test_resolve_requires_an_id() {
        let params: CallbackParameters = [("resultCode", "100")].into_iter().collect();
        assert!(matches!(
            resolve_transaction_id(&params),
            Err(GatewayError::InvalidRequest(_))
        ));

        let garbage: CallbackParameters = [("transaction_id", "abc")].into_iter().collect();
        assert!(matches!(
            resolve_transaction_id(&garbage),
            Err(GatewayError::InvalidRequest(_))
        ));
    }

    #[test]
    fn test_from_query_decodes_pairs() {
        let params = CallbackParameters::from_query("?transaction_id=5&_state=a%2Bb&card=6037+99");
        assert_eq!(params.input("transaction_id"), Some("5"));
        assert_eq!(params.input(STATE_PARAM), Some("a+b"));
        assert_eq!(params.input("card"), Some("6037 99"));
    }
}
