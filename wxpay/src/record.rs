//! Key-value record shared by every request, response and callback

use crate::{fields, sign, xml, Result};
use serde::Serialize;
use std::collections::BTreeMap;

/// Field value
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Value {
    /// Scalar text (numeric values are text too)
    Text(String),
    /// Structured value parsed from nested XML; never signed
    Nested(Record),
}

impl Value {
    /// Scalar text, if any
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            Value::Nested(_) => None,
        }
    }

    /// Whether this value takes part in signing
    fn is_signable(&self) -> bool {
        matches!(self, Value::Text(s) if !s.is_empty())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

/// Gateway record.
///
/// Keys are kept in byte-lexicographic order, which is the order the
/// signature is computed in. A key is either unset, set to an empty string,
/// or set to a non-empty value; only "set" matters for required-field checks.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Record {
    fields: BTreeMap<String, Value>,
}

impl Record {
    /// Create empty record
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a record from the gateway's XML wire format
    pub fn from_xml(bytes: &[u8]) -> Result<Self> {
        xml::decode(bytes)
    }

    /// Serialize to the gateway's XML wire format
    pub fn to_xml(&self) -> Result<String> {
        xml::encode(self)
    }

    /// Set a scalar field
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.fields.insert(key.into(), Value::Text(value.into()));
    }

    /// Set a field to an arbitrary value
    pub fn set_value(&mut self, key: impl Into<String>, value: Value) {
        self.fields.insert(key.into(), value);
    }

    /// Set a scalar field only if it is currently unset
    pub fn set_default(&mut self, key: &str, value: impl Into<String>) {
        if !self.is_set(key) {
            self.set(key, value);
        }
    }

    /// Get a field
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Get a scalar field
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(Value::as_str)
    }

    /// Whether the field is set (an empty string counts as set)
    pub fn is_set(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    /// Remove a field
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.fields.remove(key)
    }

    /// Number of fields
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether the record has no fields
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Iterate fields in key order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Signing input: `k=v&...` over non-empty scalar fields except `sign`,
    /// in key order, values unencoded.
    pub fn to_url_params(&self) -> String {
        self.signable()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("&")
    }

    /// Same field selection as [`Record::to_url_params`], percent-encoded
    pub fn to_query_string(&self) -> String {
        url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(self.signable())
            .finish()
    }

    fn signable(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields
            .iter()
            .filter(|(k, v)| k.as_str() != fields::SIGN && v.is_signable())
            .filter_map(|(k, v)| v.as_str().map(|s| (k.as_str(), s)))
    }

    /// Compute the signature without storing it
    pub fn make_sign(&self, secret: &str) -> String {
        sign::sign(self, secret)
    }

    /// Compute the signature and store it in `sign`
    pub fn set_sign(&mut self, secret: &str) -> String {
        let signature = self.make_sign(secret);
        self.set(fields::SIGN, signature.clone());
        signature
    }

    /// Stored signature
    pub fn sign(&self) -> Option<&str> {
        self.get_str(fields::SIGN)
    }

    /// Whether a signature is stored
    pub fn has_sign(&self) -> bool {
        self.is_set(fields::SIGN)
    }

    /// Verify the stored signature against `secret`
    pub fn verify_sign(&self, secret: &str) -> bool {
        sign::verify(self, secret)
    }

    /// `return_code` value
    pub fn return_code(&self) -> Option<&str> {
        self.get_str(fields::RETURN_CODE)
    }

    /// `return_msg` value
    pub fn return_msg(&self) -> Option<&str> {
        self.get_str(fields::RETURN_MSG)
    }

    /// `result_code` value
    pub fn result_code(&self) -> Option<&str> {
        self.get_str(fields::RESULT_CODE)
    }

    /// Both communication and business status are SUCCESS
    pub fn is_success(&self) -> bool {
        self.return_code() == Some(fields::SUCCESS) && self.result_code() == Some(fields::SUCCESS)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Record {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut record = Record::new();
        for (k, v) in iter {
            record.set(k, v);
        }
        record
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presence_is_tri_state() {
        let mut record = Record::new();
        assert!(!record.is_set("attach"));

        record.set("attach", "");
        assert!(record.is_set("attach"));
        assert_eq!(record.get_str("attach"), Some(""));

        record.set("attach", "gift");
        assert_eq!(record.get_str("attach"), Some("gift"));
    }

    #[test]
    fn test_url_params_skip_sign_empty_and_nested() {
        let mut nested = Record::new();
        nested.set("inner", "1");

        let mut record: Record = [("mch_id", "10000100"), ("body", "a b&c"), ("attach", "")]
            .into_iter()
            .collect();
        record.set("sign", "ABC");
        record.set_value("detail", Value::Nested(nested));

        assert_eq!(record.to_url_params(), "body=a b&c&mch_id=10000100");
        assert_eq!(record.to_query_string(), "body=a+b%26c&mch_id=10000100");
    }

    #[test]
    fn test_set_default_keeps_caller_value() {
        let mut record = Record::new();
        record.set("appid", "caller");
        record.set_default("appid", "config");
        record.set_default("mch_id", "config");

        assert_eq!(record.get_str("appid"), Some("caller"));
        assert_eq!(record.get_str("mch_id"), Some("config"));
    }

    #[test]
    fn test_success_requires_both_codes() {
        let mut record = Record::new();
        record.set("return_code", "SUCCESS");
        assert!(!record.is_success());

        record.set("result_code", "SUCCESS");
        assert!(record.is_success());
    }
}
