//! Enriched ticket data model.
//!
//! Raw tickets arrive from the platform with untyped custom-field values;
//! the types here carry the typed projection the chunker and vector
//! metadata are built from.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Who authored a conversation entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    /// The ticket requester.
    Customer,
    /// Anyone who is not the requester.
    Agent,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Customer => write!(f, "Customer"),
            Role::Agent => write!(f, "Agent"),
        }
    }
}

/// One entry in a ticket's conversation, in server order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationEntry {
    pub role: Role,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    /// Whether the entry is visible to the requester.
    pub public: bool,
}

/// Declared type of a custom field, parsed from the platform's type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    Text,
    Number,
    Bool,
    Date,
    Select,
    System,
    Unknown,
}

impl FieldType {
    /// Parses the platform's type tag.
    pub fn from_platform(tag: &str) -> Self {
        match tag {
            "text" | "textarea" | "regexp" => FieldType::Text,
            "integer" | "decimal" => FieldType::Number,
            "checkbox" => FieldType::Bool,
            "date" => FieldType::Date,
            "tagger" | "multiselect" | "lookup" => FieldType::Select,
            "subject" | "description" | "status" | "priority" | "group" | "assignee"
            | "tickettype" => FieldType::System,
            _ => FieldType::Unknown,
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FieldType::Text => "text",
            FieldType::Number => "number",
            FieldType::Bool => "bool",
            FieldType::Date => "date",
            FieldType::Select => "select",
            FieldType::System => "system",
            FieldType::Unknown => "unknown",
        };
        write!(f, "{}", s)
    }
}

/// A custom field value, coerced from its transport JSON using the declared
/// field type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Text(String),
    Number(f64),
    Bool(bool),
    Date(NaiveDate),
    Null,
}

impl FieldValue {
    /// Coerces a transport value using the declared type. Values that do not
    /// match their declared type fall back to a textual rendering rather
    /// than being dropped.
    pub fn from_json(value: &Value, declared: FieldType) -> Self {
        match value {
            Value::Null => FieldValue::Null,
            Value::Bool(b) => FieldValue::Bool(*b),
            Value::Number(n) => FieldValue::Number(n.as_f64().unwrap_or(0.0)),
            Value::String(s) => {
                if declared == FieldType::Date {
                    if let Ok(date) = s.parse::<NaiveDate>() {
                        return FieldValue::Date(date);
                    }
                }
                FieldValue::Text(s.clone())
            }
            // Multi-select values arrive as arrays of tags
            Value::Array(items) => {
                let joined = items
                    .iter()
                    .map(|v| match v {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    })
                    .collect::<Vec<_>>()
                    .join(", ");
                FieldValue::Text(joined)
            }
            other => FieldValue::Text(other.to_string()),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    /// Textual rendering for chunk text and audit payloads.
    pub fn render(&self) -> String {
        match self {
            FieldValue::Text(s) => s.clone(),
            FieldValue::Number(n) => {
                if n.fract() == 0.0 {
                    format!("{}", *n as i64)
                } else {
                    format!("{}", n)
                }
            }
            FieldValue::Bool(b) => b.to_string(),
            FieldValue::Date(d) => d.to_string(),
            FieldValue::Null => String::new(),
        }
    }
}

/// A custom field projected through the registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomField {
    pub value: FieldValue,
    pub field_type: FieldType,
    pub key: Option<String>,
    pub description: Option<String>,
}

/// A ticket expanded with its conversation, resolution, and typed custom
/// fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichedTicket {
    pub id: u64,
    pub subject: String,
    pub description: String,
    pub status: String,
    pub priority: Option<String>,
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Conversation in server order.
    pub conversation: Vec<ConversationEntry>,
    /// The last agent message with a non-whitespace body, if any.
    pub resolution: Option<String>,
    /// Custom fields keyed by field title (ordered for deterministic
    /// rendering).
    pub custom_fields: BTreeMap<String, CustomField>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_field_type_from_platform() {
        assert_eq!(FieldType::from_platform("text"), FieldType::Text);
        assert_eq!(FieldType::from_platform("textarea"), FieldType::Text);
        assert_eq!(FieldType::from_platform("integer"), FieldType::Number);
        assert_eq!(FieldType::from_platform("decimal"), FieldType::Number);
        assert_eq!(FieldType::from_platform("checkbox"), FieldType::Bool);
        assert_eq!(FieldType::from_platform("date"), FieldType::Date);
        assert_eq!(FieldType::from_platform("tagger"), FieldType::Select);
        assert_eq!(FieldType::from_platform("status"), FieldType::System);
        assert_eq!(FieldType::from_platform("mystery"), FieldType::Unknown);
    }

    #[test]
    fn test_field_value_coercion() {
        assert_eq!(
            FieldValue::from_json(&json!("hello"), FieldType::Text),
            FieldValue::Text("hello".to_string())
        );
        assert_eq!(
            FieldValue::from_json(&json!(42), FieldType::Number),
            FieldValue::Number(42.0)
        );
        assert_eq!(
            FieldValue::from_json(&json!(true), FieldType::Bool),
            FieldValue::Bool(true)
        );
        assert_eq!(
            FieldValue::from_json(&json!("2024-06-15"), FieldType::Date),
            FieldValue::Date(NaiveDate::from_ymd_opt(2024, 6, 15).unwrap())
        );
        assert_eq!(FieldValue::from_json(&json!(null), FieldType::Text), FieldValue::Null);
    }

    #[test]
    fn test_date_that_does_not_parse_falls_back_to_text() {
        assert_eq!(
            FieldValue::from_json(&json!("soonish"), FieldType::Date),
            FieldValue::Text("soonish".to_string())
        );
    }

    #[test]
    fn test_multiselect_array_joins_tags() {
        let value = FieldValue::from_json(&json!(["billing", "refund"]), FieldType::Select);
        assert_eq!(value, FieldValue::Text("billing, refund".to_string()));
    }

    #[test]
    fn test_render() {
        assert_eq!(FieldValue::Number(3.0).render(), "3");
        assert_eq!(FieldValue::Number(2.5).render(), "2.5");
        assert_eq!(FieldValue::Bool(false).render(), "false");
        assert_eq!(FieldValue::Null.render(), "");
    }

    #[test]
    fn test_role_display() {
        assert_eq!(Role::Customer.to_string(), "Customer");
        assert_eq!(Role::Agent.to_string(), "Agent");
    }
}
