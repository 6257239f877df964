//! Inbound processor notification wire types.
//!
//! The processor reports payment changes either as query parameters
//! (`?type=payment&data.id=123`) or as a JSON body of the shape
//! `{"type": "payment", "data": {"id": "123"}}`. Both forms carry the same
//! two facts: what kind of resource changed and its processor-side id.

use serde::{Deserialize, Deserializer, Serialize};

/// The only notification type that triggers reconciliation.
pub const PAYMENT_EVENT_TYPE: &str = "payment";

/// JSON body of a processor webhook.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationBody {
    #[serde(rename = "type", default)]
    pub event_type: Option<String>,
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub data: Option<NotificationData>,
}

/// Resource reference inside a [`NotificationBody`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationData {
    /// The processor sends this as either a string or a number.
    #[serde(default, deserialize_with = "string_or_number")]
    pub id: Option<String>,
}

impl NotificationBody {
    /// The referenced resource id, if any.
    pub fn reference_id(&self) -> Option<&str> {
        self.data.as_ref().and_then(|d| d.id.as_deref())
    }
}

fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    match value {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(serde_json::Value::String(s)) => Ok(Some(s)),
        Some(serde_json::Value::Number(n)) => Ok(Some(n.to_string())),
        Some(other) => Err(serde::de::Error::custom(format!(
            "expected string or number id, got {other}"
        ))),
    }
}
