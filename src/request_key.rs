//! # Request Keys
//!
//! A [`RequestKey`] is the deterministic identity of a lookup. It is derived
//! from the identifying fields present on [`LookupParams`]: empty fields are
//! ignored, the rest are sorted by field name and joined, so two parameter
//! sets carrying the same values always map to the same key.

use crate::constants::MAX_RAW_KEY_LENGTH;
use crate::error::{ClassifiedError, LookupResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use xxhash_rust::xxh3::xxh3_64;

/// Identifying parameters of a risk profile lookup
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LookupParams {
    pub checkout_token: Option<String>,
    pub phone: Option<String>,
    pub order_name: Option<String>,
    pub order_id: Option<String>,
}

impl LookupParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_checkout_token(mut self, token: impl Into<String>) -> Self {
        self.checkout_token = Some(token.into());
        self
    }

    pub fn with_phone(mut self, phone: impl Into<String>) -> Self {
        self.phone = Some(phone.into());
        self
    }

    pub fn with_order_name(mut self, name: impl Into<String>) -> Self {
        self.order_name = Some(name.into());
        self
    }

    pub fn with_order_id(mut self, id: impl Into<String>) -> Self {
        self.order_id = Some(id.into());
        self
    }

    /// Non-empty identifying fields as `(field_name, trimmed_value)`, sorted by name
    pub fn identifying_fields(&self) -> Vec<(&'static str, &str)> {
        let mut fields: Vec<(&'static str, &str)> = [
            ("checkout_token", self.checkout_token.as_deref()),
            ("order_id", self.order_id.as_deref()),
            ("order_name", self.order_name.as_deref()),
            ("phone", self.phone.as_deref()),
        ]
        .into_iter()
        .filter_map(|(name, value)| {
            value
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(|v| (name, v))
        })
        .collect();
        fields.sort_by_key(|(name, _)| *name);
        fields
    }

    pub fn is_empty(&self) -> bool {
        self.identifying_fields().is_empty()
    }
}

/// Deterministic identifier of a logical lookup request
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RequestKey(String);

impl RequestKey {
    /// Derive the key for `params`. Fails with `VALIDATION` when no identifying
    /// field is present.
    pub fn from_params(params: &LookupParams) -> LookupResult<Self> {
        let fields = params.identifying_fields();
        if fields.is_empty() {
            return Err(ClassifiedError::validation(
                "at least one identifying field is required",
            ));
        }

        let canonical = fields
            .iter()
            .map(|(name, value)| format!("{name}={value}"))
            .collect::<Vec<_>>()
            .join("|");

        if canonical.len() > MAX_RAW_KEY_LENGTH {
            return Ok(Self(format!("xxh3:{:016x}", xxh3_64(canonical.as_bytes()))));
        }
        Ok(Self(canonical))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RequestKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RequestKey {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}
