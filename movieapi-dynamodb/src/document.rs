//! Plain JSON view of typed items
//!
//! Handlers answer with records as plain JSON objects (`"title": "Dune"`,
//! `"year": 2022`) rather than the typed wire form (`{"S": "Dune"}`).

use serde_json::{Map, Number, Value};

use crate::storage::{AttributeValue, Item};

/// Parse a DynamoDB number string into a JSON number.
///
/// Integers stay integers; anything else goes through `f64`. Strings that
/// are not numbers at all are kept as strings.
pub fn number_value(n: &str) -> Value {
    let trimmed = n.trim();
    if let Ok(i) = trimmed.parse::<i64>() {
        return Value::Number(i.into());
    }
    trimmed
        .parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .map(Value::Number)
        .unwrap_or_else(|| Value::String(n.to_string()))
}

impl AttributeValue {
    /// Convert to the plain JSON value a document client would return
    #[allow(non_snake_case)]
    pub fn to_plain(&self) -> Value {
        match self {
            AttributeValue::S { S } => Value::String(S.clone()),
            AttributeValue::N { N } => number_value(N),
            AttributeValue::B { B } => Value::String(B.clone()),
            AttributeValue::BOOL { BOOL } => Value::Bool(*BOOL),
            AttributeValue::NULL { .. } => Value::Null,
            AttributeValue::L { L } => Value::Array(L.iter().map(AttributeValue::to_plain).collect()),
            AttributeValue::M { M } => Value::Object(
                M.iter()
                    .map(|(k, v)| (k.clone(), v.to_plain()))
                    .collect::<Map<String, Value>>(),
            ),
            AttributeValue::SS { SS } => {
                Value::Array(SS.iter().cloned().map(Value::String).collect())
            }
            AttributeValue::NS { NS } => Value::Array(NS.iter().map(|n| number_value(n)).collect()),
            AttributeValue::BS { BS } => {
                Value::Array(BS.iter().cloned().map(Value::String).collect())
            }
        }
    }
}

impl AttributeValue {
    /// Typed form of a plain JSON value; `null` has no typed form here
    pub fn from_plain(value: &Value) -> Option<Self> {
        Some(match value {
            Value::Null => return None,
            Value::String(s) => AttributeValue::string(s.as_str()),
            Value::Number(n) => AttributeValue::number(n.to_string()),
            Value::Bool(b) => AttributeValue::BOOL { BOOL: *b },
            Value::Array(values) => AttributeValue::L {
                L: values.iter().filter_map(AttributeValue::from_plain).collect(),
            },
            Value::Object(map) => AttributeValue::M {
                M: map
                    .iter()
                    .filter_map(|(k, v)| AttributeValue::from_plain(v).map(|av| (k.clone(), av)))
                    .collect(),
            },
        })
    }
}

/// Render a whole item as a plain JSON object
pub fn item_to_json(item: &Item) -> Value {
    Value::Object(
        item.iter()
            .map(|(k, v)| (k.clone(), v.to_plain()))
            .collect::<Map<String, Value>>(),
    )
}

/// Render a sequence of items, keeping their order
pub fn items_to_json(items: &[Item]) -> Value {
    Value::Array(items.iter().map(item_to_json).collect())
}
