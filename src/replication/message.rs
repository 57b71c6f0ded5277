//! Change Message Module
//!
//! Wire payload carried between replicas and the broker envelope around it.

use serde::{Deserialize, Serialize};

use crate::cache::{CacheKey, MAX_KEY_COMPONENT_LENGTH, MAX_VALUE_SIZE};
use crate::error::{CacheError, Result};

// == Change Message ==
/// One attribute write, as published to the change topic.
///
/// Serialized with camelCase field names; PascalCase names are accepted on input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeMessage {
    #[serde(alias = "AccountCode")]
    pub account_code: String,
    #[serde(alias = "SubAccountCode")]
    pub sub_account_code: String,
    #[serde(alias = "AttributeCode")]
    pub attribute_code: String,
    #[serde(alias = "AttributeValue")]
    pub attribute_value: String,
}

impl ChangeMessage {
    pub fn new(
        account_code: impl Into<String>,
        sub_account_code: impl Into<String>,
        attribute_code: impl Into<String>,
        attribute_value: impl Into<String>,
    ) -> Self {
        Self {
            account_code: account_code.into(),
            sub_account_code: sub_account_code.into(),
            attribute_code: attribute_code.into(),
            attribute_value: attribute_value.into(),
        }
    }

    /// Cache key addressed by this change.
    pub fn key(&self) -> CacheKey {
        CacheKey::new(
            self.account_code.as_str(),
            self.sub_account_code.as_str(),
            self.attribute_code.as_str(),
        )
    }

    // == Validate ==
    /// Checks that every component and the value are non-empty and within limits.
    pub fn validate(&self) -> Result<()> {
        let fields = [
            ("accountCode", &self.account_code),
            ("subAccountCode", &self.sub_account_code),
            ("attributeCode", &self.attribute_code),
        ];

        for (name, value) in fields {
            if value.is_empty() {
                return Err(CacheError::InvalidRequest(format!("{} cannot be empty", name)));
            }
            if value.len() > MAX_KEY_COMPONENT_LENGTH {
                return Err(CacheError::InvalidRequest(format!(
                    "{} exceeds maximum length of {} bytes",
                    name, MAX_KEY_COMPONENT_LENGTH
                )));
            }
        }

        if self.attribute_value.is_empty() {
            return Err(CacheError::InvalidRequest(
                "attributeValue cannot be empty".to_string(),
            ));
        }
        if self.attribute_value.len() > MAX_VALUE_SIZE {
            return Err(CacheError::InvalidRequest(format!(
                "attributeValue exceeds maximum size of {} bytes",
                MAX_VALUE_SIZE
            )));
        }

        Ok(())
    }

    /// Encodes the change as the JSON payload handed to the broker.
    pub fn to_payload(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    // == From Envelope ==
    /// Decodes a delivered message body.
    ///
    /// The body is a notification envelope whose `Message` field is itself the
    /// JSON-encoded change, so decoding happens twice.
    pub fn from_envelope(body: &str) -> Result<Self> {
        let envelope: Envelope = serde_json::from_str(body)?;
        Ok(serde_json::from_str(&envelope.message)?)
    }
}

/// Notification wrapper added by the broker on publish.
#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(rename = "Message")]
    message: String,
}
