//! DynamoDB expression parsing
//!
//! Supports the expression shapes the single-table store serves:
//! - KeyConditionExpression of the form `pk = :value`
//! - ConditionExpression `attribute_not_exists(path)` / `attribute_exists(path)`

use once_cell::sync::Lazy;
use std::collections::HashMap;
use thiserror::Error;

use crate::storage::{AttributeValue, Item};

static KEY_EQUALITY_RE: Lazy<regex_lite::Regex> = Lazy::new(|| {
    regex_lite::Regex::new(r"^([#\w]+)\s*=\s*(:\w+)$").expect("valid key condition pattern")
});

static EXISTENCE_RE: Lazy<regex_lite::Regex> = Lazy::new(|| {
    regex_lite::Regex::new(r"^(attribute_not_exists|attribute_exists)\s*\(\s*([#\w]+)\s*\)$")
        .expect("valid condition pattern")
});

#[derive(Debug, Error)]
pub enum ExpressionError {
    #[error("Invalid expression: {0}")]
    Invalid(String),

    #[error("Missing expression attribute name: {0}")]
    MissingAttributeName(String),

    #[error("Missing expression attribute value: {0}")]
    MissingAttributeValue(String),
}

/// Expression context for placeholder resolution
pub struct ExpressionContext<'a> {
    pub attribute_names: Option<&'a HashMap<String, String>>,
    pub attribute_values: Option<&'a HashMap<String, AttributeValue>>,
}

impl<'a> ExpressionContext<'a> {
    pub fn new(
        names: Option<&'a HashMap<String, String>>,
        values: Option<&'a HashMap<String, AttributeValue>>,
    ) -> Self {
        Self {
            attribute_names: names,
            attribute_values: values,
        }
    }

    /// Resolve an attribute name (handles #name placeholders)
    pub fn resolve_name(&self, name: &str) -> Result<String, ExpressionError> {
        if name.starts_with('#') {
            self.attribute_names
                .and_then(|m| m.get(name))
                .cloned()
                .ok_or_else(|| ExpressionError::MissingAttributeName(name.to_string()))
        } else {
            Ok(name.to_string())
        }
    }

    /// Resolve an attribute value (handles :value placeholders)
    pub fn resolve_value(&self, placeholder: &str) -> Result<&AttributeValue, ExpressionError> {
        self.attribute_values
            .and_then(|m| m.get(placeholder))
            .ok_or_else(|| ExpressionError::MissingAttributeValue(placeholder.to_string()))
    }
}

/// Partition-key equality, the only key condition the store accepts
#[derive(Debug, Clone, PartialEq)]
pub struct KeyCondition {
    pub attribute: String,
    pub value: AttributeValue,
}

/// Parse and resolve `pk = :value`
pub fn parse_key_condition(
    expression: &str,
    ctx: &ExpressionContext<'_>,
) -> Result<KeyCondition, ExpressionError> {
    let expression = expression.trim();
    let caps = KEY_EQUALITY_RE.captures(expression).ok_or_else(|| {
        ExpressionError::Invalid(format!("Unsupported key condition: {}", expression))
    })?;

    Ok(KeyCondition {
        attribute: ctx.resolve_name(&caps[1])?,
        value: ctx.resolve_value(&caps[2])?.clone(),
    })
}

/// Write guard evaluated against the currently stored item
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Condition {
    AttributeExists(String),
    AttributeNotExists(String),
}

impl Condition {
    /// Evaluate against the existing item, if any
    pub fn holds(&self, existing: Option<&Item>) -> bool {
        match self {
            Self::AttributeExists(path) => existing.is_some_and(|item| item.contains_key(path)),
            Self::AttributeNotExists(path) => !existing.is_some_and(|item| item.contains_key(path)),
        }
    }
}

/// Parse and resolve a condition expression
pub fn parse_condition(
    expression: &str,
    ctx: &ExpressionContext<'_>,
) -> Result<Condition, ExpressionError> {
    let expression = expression.trim();
    let caps = EXISTENCE_RE.captures(expression).ok_or_else(|| {
        ExpressionError::Invalid(format!("Unsupported condition: {}", expression))
    })?;

    let path = ctx.resolve_name(&caps[2])?;
    match &caps[1] {
        "attribute_not_exists" => Ok(Condition::AttributeNotExists(path)),
        _ => Ok(Condition::AttributeExists(path)),
    }
}
