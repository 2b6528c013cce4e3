//! Remote DynamoDB client
//!
//! Speaks the DynamoDB JSON protocol to an endpoint (DynamoDB Local, a
//! locally served [`crate::handlers::handle_request`], or a compatible
//! emulator). Request signing is left to whatever sits in front of the
//! endpoint.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use crate::storage::{DynamoDBError, Item};
use crate::traits::{ItemKey, ItemStore, MAX_BATCH_WRITE_ITEMS};

impl From<reqwest::Error> for DynamoDBError {
    fn from(error: reqwest::Error) -> Self {
        DynamoDBError::Transport(error.to_string())
    }
}

#[derive(Debug, Deserialize)]
struct WireError {
    #[serde(rename = "__type", default)]
    error_type: String,
    #[serde(alias = "Message", default)]
    message: String,
}

impl WireError {
    fn into_error(self) -> DynamoDBError {
        let code = self
            .error_type
            .rsplit('#')
            .next()
            .unwrap_or(&self.error_type);
        match code {
            "ConditionalCheckFailedException" => DynamoDBError::ConditionalCheckFailed,
            "ResourceNotFoundException" => DynamoDBError::ResourceNotFound(self.message),
            "ResourceInUseException" => DynamoDBError::ResourceInUse(self.message),
            "ValidationException" => DynamoDBError::ValidationError(self.message),
            _ => DynamoDBError::Internal(format!("{}: {}", code, self.message)),
        }
    }
}

/// Table-bound client for a remote DynamoDB endpoint
#[derive(Clone)]
pub struct DynamoDBClient {
    endpoint: String,
    table_name: String,
    hash_key: String,
    range_key: String,
    client: reqwest::Client,
}

impl DynamoDBClient {
    /// Create a client for `table_name` keyed by `id` / `sk`
    pub fn new(endpoint: impl Into<String>, table_name: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            table_name: table_name.into(),
            hash_key: "id".to_string(),
            range_key: "sk".to_string(),
            client: reqwest::Client::new(),
        }
    }

    /// Override the key attribute names
    pub fn with_key_schema(mut self, hash_key: &str, range_key: &str) -> Self {
        self.hash_key = hash_key.to_string();
        self.range_key = range_key.to_string();
        self
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    /// Send one action and return the decoded response body
    pub async fn call(&self, action: &str, body: Value) -> Result<Value, DynamoDBError> {
        debug!(action, table = %self.table_name, "Calling remote DynamoDB");

        let response = self
            .client
            .post(&self.endpoint)
            .header("X-Amz-Target", format!("DynamoDB_20120810.{}", action))
            .header("Content-Type", "application/x-amz-json-1.0")
            .body(body.to_string())
            .send()
            .await?;

        let status = response.status();
        let bytes = response.bytes().await?;

        if status.is_success() {
            return serde_json::from_slice(&bytes)
                .map_err(|e| DynamoDBError::Transport(format!("Invalid response body: {}", e)));
        }

        match serde_json::from_slice::<WireError>(&bytes) {
            Ok(wire) => Err(wire.into_error()),
            Err(_) => Err(DynamoDBError::Transport(format!(
                "HTTP {} from {}",
                status, self.endpoint
            ))),
        }
    }

    fn key_json(&self, key: &ItemKey) -> Value {
        json!(key.to_item(&self.hash_key, &self.range_key))
    }
}

fn decode_items(value: &Value) -> Result<Vec<Item>, DynamoDBError> {
    match value.get("Items") {
        Some(items) => serde_json::from_value(items.clone())
            .map_err(|e| DynamoDBError::Transport(format!("Invalid Items: {}", e))),
        None => Ok(Vec::new()),
    }
}

#[async_trait]
impl ItemStore for DynamoDBClient {
    fn hash_key(&self) -> &str {
        &self.hash_key
    }

    fn range_key(&self) -> &str {
        &self.range_key
    }

    async fn get_item(&self, key: &ItemKey) -> Result<Option<Item>, DynamoDBError> {
        let response = self
            .call(
                "GetItem",
                json!({ "TableName": self.table_name, "Key": self.key_json(key) }),
            )
            .await?;

        response
            .get("Item")
            .map(|item| {
                serde_json::from_value(item.clone())
                    .map_err(|e| DynamoDBError::Transport(format!("Invalid Item: {}", e)))
            })
            .transpose()
    }

    async fn put_item_if_absent(&self, item: Item) -> Result<(), DynamoDBError> {
        self.call(
            "PutItem",
            json!({
                "TableName": self.table_name,
                "Item": item,
                "ConditionExpression": "attribute_not_exists(#pk)",
                "ExpressionAttributeNames": { "#pk": self.hash_key },
            }),
        )
        .await
        .map(|_| ())
    }

    async fn delete_item(&self, key: &ItemKey) -> Result<(), DynamoDBError> {
        self.call(
            "DeleteItem",
            json!({ "TableName": self.table_name, "Key": self.key_json(key) }),
        )
        .await
        .map(|_| ())
    }

    async fn query_partition(&self, partition: &str) -> Result<Vec<Item>, DynamoDBError> {
        let mut items = Vec::new();
        let mut start_key: Option<Value> = None;

        loop {
            let mut body = json!({
                "TableName": self.table_name,
                "KeyConditionExpression": "#pk = :pk",
                "ExpressionAttributeNames": { "#pk": self.hash_key },
                "ExpressionAttributeValues": { ":pk": { "S": partition } },
            });
            if let Some(key) = start_key.take() {
                body["ExclusiveStartKey"] = key;
            }

            let response = self.call("Query", body).await?;
            items.extend(decode_items(&response)?);

            match response.get("LastEvaluatedKey") {
                Some(key) if !key.is_null() => start_key = Some(key.clone()),
                _ => break,
            }
        }

        Ok(items)
    }

    async fn batch_delete(&self, keys: &[ItemKey]) -> Result<(), DynamoDBError> {
        if keys.is_empty() || keys.len() > MAX_BATCH_WRITE_ITEMS {
            return Err(DynamoDBError::ValidationError(format!(
                "BatchWriteItem accepts 1 to {} requests, got {}",
                MAX_BATCH_WRITE_ITEMS,
                keys.len()
            )));
        }

        let requests: Vec<Value> = keys
            .iter()
            .map(|k| json!({ "DeleteRequest": { "Key": self.key_json(k) } }))
            .collect();

        let mut request_items = serde_json::Map::new();
        request_items.insert(self.table_name.clone(), Value::Array(requests));

        let response = self
            .call("BatchWriteItem", json!({ "RequestItems": request_items }))
            .await?;

        let unprocessed = response["UnprocessedItems"]
            .as_object()
            .map_or(0, |tables| {
                tables
                    .values()
                    .filter_map(Value::as_array)
                    .map(Vec::len)
                    .sum()
            });
        if unprocessed > 0 {
            return Err(DynamoDBError::Internal(format!(
                "{} delete requests left unprocessed",
                unprocessed
            )));
        }

        Ok(())
    }
}
