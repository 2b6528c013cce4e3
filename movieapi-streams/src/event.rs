//! Inbound change-record shape
//!
//! Images are kept as raw JSON: Lambda deliveries carry typed attribute
//! values (`{"S": "m1"}`), while some producers send plain maps.

use movieapi_dynamodb::{Item, StreamRecord};
use serde::Deserialize;
use serde_json::Value;

use crate::projector::StreamError;

/// A delivered batch of change records.
///
/// Entries stay raw until projected so one malformed record cannot reject
/// its neighbours.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StreamEvent {
    #[serde(rename = "Records", default)]
    pub records: Vec<Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChangeRecord {
    #[serde(rename = "eventID", default)]
    pub event_id: Option<String>,
    #[serde(rename = "eventName", default)]
    pub event_name: Option<String>,
    #[serde(default)]
    pub dynamodb: Option<ChangeImages>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ChangeImages {
    #[serde(default)]
    pub new_image: Option<Value>,
    #[serde(default)]
    pub old_image: Option<Value>,
}

impl ChangeRecord {
    /// Decode one entry of a delivered batch
    pub fn decode(raw: &Value) -> Result<Self, StreamError> {
        Self::deserialize(raw).map_err(StreamError::BadRecord)
    }

    pub fn new_image(&self) -> Option<&Value> {
        self.dynamodb.as_ref()?.new_image.as_ref()
    }

    pub fn old_image(&self) -> Option<&Value> {
        self.dynamodb.as_ref()?.old_image.as_ref()
    }
}

impl From<StreamRecord> for ChangeRecord {
    fn from(record: StreamRecord) -> Self {
        let image = |item: &Item| serde_json::to_value(item).ok();
        Self {
            event_id: Some(record.event_id),
            event_name: Some(record.event_name.as_str().to_string()),
            dynamodb: Some(ChangeImages {
                new_image: record.dynamodb.new_image.as_ref().and_then(image),
                old_image: record.dynamodb.old_image.as_ref().and_then(image),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_lambda_event() {
        let event: StreamEvent = serde_json::from_value(json!({
            "Records": [
                {
                    "eventID": "1",
                    "eventName": "INSERT",
                    "eventSource": "aws:dynamodb",
                    "dynamodb": {
                        "Keys": { "id": { "S": "m1" }, "sk": { "S": "xxxx" } },
                        "NewImage": { "id": { "S": "m1" }, "sk": { "S": "xxxx" } },
                        "StreamViewType": "NEW_AND_OLD_IMAGES"
                    }
                },
                { "eventName": "REMOVE" }
            ]
        }))
        .unwrap();

        assert_eq!(event.records.len(), 2);
        let insert = ChangeRecord::decode(&event.records[0]).unwrap();
        assert_eq!(insert.event_name.as_deref(), Some("INSERT"));
        assert_eq!(insert.new_image().unwrap()["id"]["S"], "m1");
        assert!(ChangeRecord::decode(&event.records[1])
            .unwrap()
            .old_image()
            .is_none());
    }

    #[test]
    fn test_bad_envelope_stays_in_its_record() {
        let event: StreamEvent = serde_json::from_value(json!({
            "Records": [
                { "eventName": "INSERT" },
                { "eventName": 5 },
                { "eventName": "REMOVE", "dynamodb": [] }
            ]
        }))
        .unwrap();

        assert_eq!(event.records.len(), 3);
        assert!(ChangeRecord::decode(&event.records[0]).is_ok());
        assert!(matches!(
            ChangeRecord::decode(&event.records[1]),
            Err(StreamError::BadRecord(_))
        ));
        assert!(ChangeRecord::decode(&event.records[2]).is_err());
    }

    #[test]
    fn test_empty_event() {
        let event: StreamEvent = serde_json::from_value(json!({})).unwrap();
        assert!(event.records.is_empty());
    }
}
