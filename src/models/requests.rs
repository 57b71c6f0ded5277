//! Request DTOs for the cache server API
//!
//! Defines the structure of incoming HTTP request bodies.

use serde::Deserialize;

use crate::replication::ChangeMessage;

/// Request body for `POST /attribute`
///
/// Field names are camelCase; PascalCase is accepted as well.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetAttributeRequest {
    #[serde(alias = "AccountCode")]
    pub account_code: String,
    #[serde(alias = "SubAccountCode")]
    pub sub_account_code: String,
    #[serde(alias = "AttributeCode")]
    pub attribute_code: String,
    #[serde(alias = "AttributeValue")]
    pub attribute_value: String,
}

impl From<SetAttributeRequest> for ChangeMessage {
    fn from(req: SetAttributeRequest) -> Self {
        ChangeMessage::new(
            req.account_code,
            req.sub_account_code,
            req.attribute_code,
            req.attribute_value,
        )
    }
}
