//! Record rendering and batch handling

use movieapi_catalog::Entity;
use movieapi_dynamodb::AttributeValue;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{error, info};

use crate::event::{ChangeRecord, StreamEvent};

/// Log target carrying the projected lines
pub const STATE_CHANGE_TARGET: &str = "movieapi::state_change";

/// Tags of the typed attribute-value encoding
const TYPE_TAGS: [&str; 10] = ["S", "N", "B", "BOOL", "NULL", "L", "M", "SS", "NS", "BS"];

#[derive(Debug, Error)]
pub enum StreamError {
    #[error("malformed record: {0}")]
    BadRecord(#[source] serde_json::Error),

    #[error("image is not an object")]
    NotAnObject,

    #[error("attribute {name}: {source}")]
    BadAttribute {
        name: String,
        source: serde_json::Error,
    },
}

/// Whether `value` looks like a typed attribute value such as `{"S": "x"}`
fn is_typed(value: &Value) -> bool {
    match value {
        Value::Object(map) if map.len() == 1 => map.keys().all(|k| TYPE_TAGS.contains(&k.as_str())),
        _ => false,
    }
}

/// Decode a typed image into plain values. Attributes already in plain
/// form pass through unchanged.
pub fn unwrap_image(image: &Value) -> Result<Map<String, Value>, StreamError> {
    let Value::Object(attributes) = image else {
        return Err(StreamError::NotAnObject);
    };

    attributes
        .iter()
        .map(|(name, value)| {
            if !is_typed(value) {
                return Ok((name.clone(), value.clone()));
            }
            serde_json::from_value::<AttributeValue>(value.clone())
                .map(|av| (name.clone(), av.to_plain()))
                .map_err(|source| StreamError::BadAttribute {
                    name: name.clone(),
                    source,
                })
        })
        .collect()
}

/// One-line description of a plain record; unknown records are dumped as JSON
pub fn render(record: &Map<String, Value>) -> String {
    match Entity::decode(record) {
        Ok(entity) => entity.to_string(),
        Err(_) => Value::Object(record.clone()).to_string(),
    }
}

/// Line for one change record, if it produces one
pub fn project(record: &ChangeRecord) -> Result<Option<String>, StreamError> {
    match record.event_name.as_deref() {
        Some("INSERT") => match record.new_image() {
            Some(image) => Ok(Some(format!("POST + {}", render(&unwrap_image(image)?)))),
            None => Ok(None),
        },
        Some("REMOVE") => match record.old_image() {
            Some(image) => Ok(Some(format!("DELETE {}", render(&unwrap_image(image)?)))),
            None => Ok(None),
        },
        _ => Ok(None),
    }
}

/// What a batch produced
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub lines: Vec<String>,
    pub failures: usize,
}

impl BatchReport {
    fn record(&mut self, outcome: Result<Option<String>, StreamError>, event_id: Option<&str>) {
        match outcome {
            Ok(Some(line)) => {
                info!(target: STATE_CHANGE_TARGET, "{}", line);
                self.lines.push(line);
            }
            Ok(None) => {}
            Err(e) => {
                error!(
                    error = %e,
                    event_id = event_id.unwrap_or(""),
                    "state-change-logger failure"
                );
                self.failures += 1;
            }
        }
    }
}

/// Project records one at a time, in delivery order.
///
/// A record that fails is logged and skipped; the rest of the batch still
/// runs.
pub fn handle_batch(records: &[ChangeRecord]) -> BatchReport {
    let mut report = BatchReport::default();
    for record in records {
        report.record(project(record), record.event_id.as_deref());
    }
    report
}

/// Like [`handle_batch`] for a delivered event, decoding each entry on its
/// own. An entry that does not decode counts as a failed record.
pub fn handle_event(event: &StreamEvent) -> BatchReport {
    let mut report = BatchReport::default();
    for raw in &event.records {
        let outcome = ChangeRecord::decode(raw).and_then(|record| project(&record));
        report.record(outcome, raw.get("eventID").and_then(Value::as_str));
    }
    report
}
