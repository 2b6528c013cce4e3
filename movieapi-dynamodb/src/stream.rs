//! Table change feed
//!
//! Every effective mutation of a stream-enabled table produces one
//! [`StreamRecord`] carrying the key plus the before and after images.
//! Records are delivered in mutation order to a single consumer.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;
use tracing::debug;

use crate::storage::Item;

/// Kind of mutation a stream record describes
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum StreamEventName {
    Insert,
    Modify,
    Remove,
}

impl StreamEventName {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Insert => "INSERT",
            Self::Modify => "MODIFY",
            Self::Remove => "REMOVE",
        }
    }
}

/// The `dynamodb` section of a stream record
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct StreamPayload {
    pub approximate_creation_date_time: f64,
    pub keys: Item,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub new_image: Option<Item>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub old_image: Option<Item>,
    pub sequence_number: String,
    pub size_bytes: usize,
    pub stream_view_type: String,
}

/// A single change record, shaped like a DynamoDB Streams record
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StreamRecord {
    #[serde(rename = "eventID")]
    pub event_id: String,
    #[serde(rename = "eventName")]
    pub event_name: StreamEventName,
    #[serde(rename = "eventVersion")]
    pub event_version: String,
    #[serde(rename = "eventSource")]
    pub event_source: String,
    #[serde(rename = "awsRegion")]
    pub aws_region: String,
    pub dynamodb: StreamPayload,
    #[serde(rename = "eventSourceARN")]
    pub event_source_arn: String,
}

/// Sender half of a table's change feed plus its not-yet-claimed receiver
pub(crate) struct StreamChannel {
    arn: String,
    sender: mpsc::UnboundedSender<StreamRecord>,
    receiver: Mutex<Option<mpsc::UnboundedReceiver<StreamRecord>>>,
    sequence: AtomicU64,
}

impl StreamChannel {
    pub(crate) fn new(table_arn: &str) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            arn: format!(
                "{}/stream/{}",
                table_arn,
                chrono::Utc::now().format("%Y-%m-%dT%H:%M:%S%.3f")
            ),
            sender,
            receiver: Mutex::new(Some(receiver)),
            sequence: AtomicU64::new(0),
        }
    }

    pub(crate) fn arn(&self) -> &str {
        &self.arn
    }

    /// Hand out the receiver; only the first caller gets it
    pub(crate) fn take_receiver(&self) -> Option<mpsc::UnboundedReceiver<StreamRecord>> {
        self.receiver.lock().take()
    }

    /// Publish a change. Must be called while the table's write lock is held
    /// so that sequence numbers and delivery order agree.
    pub(crate) fn publish(
        &self,
        keys: Item,
        old_image: Option<Item>,
        new_image: Option<Item>,
    ) {
        let event_name = match (&old_image, &new_image) {
            (None, Some(_)) => StreamEventName::Insert,
            (Some(_), Some(_)) => StreamEventName::Modify,
            (Some(_), None) => StreamEventName::Remove,
            (None, None) => return,
        };

        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;
        let size_bytes = serde_json::to_vec(&(&keys, &old_image, &new_image))
            .map(|v| v.len())
            .unwrap_or_default();

        let record = StreamRecord {
            event_id: uuid::Uuid::new_v4().simple().to_string(),
            event_name,
            event_version: "1.1".to_string(),
            event_source: "aws:dynamodb".to_string(),
            aws_region: "us-east-1".to_string(),
            dynamodb: StreamPayload {
                approximate_creation_date_time: chrono::Utc::now().timestamp() as f64,
                keys,
                new_image,
                old_image,
                sequence_number: format!("{:021}", sequence),
                size_bytes,
                stream_view_type: "NEW_AND_OLD_IMAGES".to_string(),
            },
            event_source_arn: self.arn.clone(),
        };

        if self.sender.send(record).is_err() {
            debug!(stream = %self.arn, "Stream consumer gone, dropping record");
        }
    }
}
