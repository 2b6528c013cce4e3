//! DynamoDB-compatible single-table store for the movie API
//!
//! Provides an in-memory table with composite `(hash, range)` keys, a
//! conditional create guard, partition queries, bounded batch deletes and an
//! ordered change feed. The same operations are reachable over the DynamoDB
//! JSON protocol, either served by [`handlers::handle_request`] or consumed
//! from a remote endpoint through [`DynamoDBClient`].

pub mod client;
pub mod document;
pub mod expression;
pub mod handlers;
pub mod storage;
pub mod stream;
pub mod traits;

#[cfg(test)]
mod storage_tests;

pub use client::DynamoDBClient;
pub use document::{item_to_json, items_to_json};
pub use handlers::{handle_request, DynamoDBState};
pub use storage::{AttributeValue, DynamoDBError, DynamoDBStorage, Item, LocalTable};
pub use stream::{StreamEventName, StreamPayload, StreamRecord};
pub use traits::{ItemKey, ItemStore, MAX_BATCH_WRITE_ITEMS};
