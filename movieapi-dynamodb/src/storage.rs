//! DynamoDB table storage

use async_trait::async_trait;
use dashmap::{mapref::entry::Entry, DashMap};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::expression::{Condition, ExpressionError, KeyCondition};
use crate::stream::{StreamChannel, StreamRecord};
use crate::traits::{ItemKey, ItemStore, MAX_BATCH_WRITE_ITEMS};

/// DynamoDB errors
#[derive(Debug, Error)]
pub enum DynamoDBError {
    #[error("Resource not found: {0}")]
    ResourceNotFound(String),

    #[error("Resource in use: {0}")]
    ResourceInUse(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("The conditional request failed")]
    ConditionalCheckFailed,

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Expression error: {0}")]
    Expression(#[from] ExpressionError),
}

/// Key schema element
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeySchemaElement {
    #[serde(rename = "AttributeName")]
    pub attribute_name: String,
    #[serde(rename = "KeyType")]
    pub key_type: KeyType,
}

impl KeySchemaElement {
    pub fn hash(name: impl Into<String>) -> Self {
        Self {
            attribute_name: name.into(),
            key_type: KeyType::HASH,
        }
    }

    pub fn range(name: impl Into<String>) -> Self {
        Self {
            attribute_name: name.into(),
            key_type: KeyType::RANGE,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum KeyType {
    HASH,
    RANGE,
}

/// Attribute definition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttributeDefinition {
    #[serde(rename = "AttributeName")]
    pub attribute_name: String,
    #[serde(rename = "AttributeType")]
    pub attribute_type: AttributeType,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum AttributeType {
    S, // String
    N, // Number
    B, // Binary
}

/// Stream settings of a table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamSpecification {
    #[serde(rename = "StreamEnabled")]
    pub stream_enabled: bool,
    #[serde(rename = "StreamViewType", skip_serializing_if = "Option::is_none")]
    pub stream_view_type: Option<String>,
}

/// Table description
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableDescription {
    #[serde(rename = "TableName")]
    pub table_name: String,
    #[serde(rename = "TableArn")]
    pub table_arn: String,
    #[serde(rename = "TableStatus")]
    pub table_status: TableStatus,
    #[serde(rename = "KeySchema")]
    pub key_schema: Vec<KeySchemaElement>,
    #[serde(rename = "AttributeDefinitions")]
    pub attribute_definitions: Vec<AttributeDefinition>,
    #[serde(rename = "CreationDateTime")]
    pub creation_date_time: f64,
    #[serde(rename = "ItemCount")]
    pub item_count: i64,
    #[serde(rename = "StreamSpecification", skip_serializing_if = "Option::is_none")]
    pub stream_specification: Option<StreamSpecification>,
    #[serde(rename = "LatestStreamArn", skip_serializing_if = "Option::is_none")]
    pub latest_stream_arn: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum TableStatus {
    CREATING,
    ACTIVE,
    DELETING,
    UPDATING,
}

/// An item in DynamoDB (simplified attribute value)
pub type Item = HashMap<String, AttributeValue>;

/// Simplified attribute value representation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
#[allow(non_snake_case)]
pub enum AttributeValue {
    S { S: String },
    N { N: String },
    B { B: String },
    BOOL { BOOL: bool },
    NULL { NULL: bool },
    L { L: Vec<AttributeValue> },
    M { M: HashMap<String, AttributeValue> },
    SS { SS: Vec<String> },
    NS { NS: Vec<String> },
    BS { BS: Vec<String> },
}

impl AttributeValue {
    pub fn string(s: impl Into<String>) -> Self {
        AttributeValue::S { S: s.into() }
    }

    pub fn number(n: impl Into<String>) -> Self {
        AttributeValue::N { N: n.into() }
    }

    /// Get the string value if this is an S type
    pub fn as_string(&self) -> Option<&str> {
        match self {
            AttributeValue::S { S } => Some(S),
            _ => None,
        }
    }

    /// Get the number string if this is an N type
    pub fn as_number(&self) -> Option<&str> {
        match self {
            AttributeValue::N { N } => Some(N),
            _ => None,
        }
    }

    /// Scalar type and value, for the types a key attribute may have
    fn key_component(&self) -> Option<(AttributeType, &str)> {
        match self {
            AttributeValue::S { S } => Some((AttributeType::S, S)),
            AttributeValue::N { N } => Some((AttributeType::N, N)),
            AttributeValue::B { B } => Some((AttributeType::B, B)),
            _ => None,
        }
    }
}

/// A write inside a BatchWriteItem call
#[derive(Debug, Clone)]
pub enum WriteRequest {
    Put(Item),
    Delete(Item),
}

/// Query result
#[derive(Debug)]
pub struct QueryResult {
    pub items: Vec<Item>,
    pub count: usize,
    pub scanned_count: usize,
}

type StorageKey = (String, String);

/// A table with its items
struct Table {
    description: TableDescription,
    items: RwLock<BTreeMap<StorageKey, Item>>,
    stream: Option<StreamChannel>,
}

impl Table {
    /// Get the primary key for an item
    fn get_key(&self, item: &Item) -> Result<StorageKey, DynamoDBError> {
        let mut partition = None;
        let mut sort = String::new();

        for key_elem in &self.description.key_schema {
            let attr = item.get(&key_elem.attribute_name).ok_or_else(|| {
                DynamoDBError::ValidationError(format!(
                    "Missing key attribute: {}",
                    key_elem.attribute_name
                ))
            })?;

            let component = self.key_value(&key_elem.attribute_name, attr)?;

            match key_elem.key_type {
                KeyType::HASH => partition = Some(component.to_string()),
                KeyType::RANGE => sort = component.to_string(),
            }
        }

        let partition = partition.ok_or_else(|| {
            DynamoDBError::Internal(format!(
                "Table {} has no hash key",
                self.description.table_name
            ))
        })?;
        Ok((partition, sort))
    }

    /// Check a key attribute against its declared type and return its value
    fn key_value<'a>(
        &self,
        name: &str,
        attr: &'a AttributeValue,
    ) -> Result<&'a str, DynamoDBError> {
        let declared = self
            .description
            .attribute_definitions
            .iter()
            .find(|d| d.attribute_name == name)
            .map(|d| d.attribute_type);

        match attr.key_component() {
            Some((actual, value)) if Some(actual) == declared => Ok(value),
            Some((actual, _)) => Err(DynamoDBError::ValidationError(format!(
                "Type mismatch for key {}: expected {:?}, got {:?}",
                name, declared, actual
            ))),
            None => Err(DynamoDBError::ValidationError(format!(
                "Invalid key attribute type for {}",
                name
            ))),
        }
    }

    /// Extract key attributes from an item
    fn extract_key(&self, item: &Item) -> Item {
        let mut key = Item::new();
        for key_elem in &self.description.key_schema {
            if let Some(attr) = item.get(&key_elem.attribute_name) {
                key.insert(key_elem.attribute_name.clone(), attr.clone());
            }
        }
        key
    }

    fn key_name(&self, key_type: &KeyType) -> Option<&str> {
        self.description
            .key_schema
            .iter()
            .find(|k| &k.key_type == key_type)
            .map(|k| k.attribute_name.as_str())
    }

    /// Insert or replace under the write lock, publishing the change
    fn put(&self, item: Item, condition: Option<&Condition>) -> Result<Option<Item>, DynamoDBError> {
        let key = self.get_key(&item)?;
        let mut items = self.items.write();

        if let Some(cond) = condition {
            if !cond.holds(items.get(&key)) {
                return Err(DynamoDBError::ConditionalCheckFailed);
            }
        }

        let keys = self.extract_key(&item);
        let new_image = self.stream.as_ref().map(|_| item.clone());
        let old = items.insert(key, item);

        if let Some(stream) = &self.stream {
            stream.publish(keys, old.clone(), new_image);
        }

        Ok(old)
    }

    /// Remove under the write lock, publishing the change if anything was removed
    fn delete(&self, key_item: &Item) -> Result<Option<Item>, DynamoDBError> {
        let key = self.get_key(key_item)?;
        let mut items = self.items.write();
        let old = items.remove(&key);

        if let (Some(stream), Some(old_item)) = (&self.stream, &old) {
            stream.publish(self.extract_key(old_item), Some(old_item.clone()), None);
        }

        Ok(old)
    }
}

/// In-memory DynamoDB storage
pub struct DynamoDBStorage {
    tables: DashMap<String, Table>,
}

impl Default for DynamoDBStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl DynamoDBStorage {
    pub fn new() -> Self {
        Self {
            tables: DashMap::new(),
        }
    }

    /// Create a new table
    pub fn create_table(
        &self,
        table_name: &str,
        key_schema: Vec<KeySchemaElement>,
        attribute_definitions: Vec<AttributeDefinition>,
        stream_enabled: bool,
    ) -> Result<TableDescription, DynamoDBError> {
        let entry = match self.tables.entry(table_name.to_string()) {
            Entry::Occupied(_) => {
                return Err(DynamoDBError::ResourceInUse(table_name.to_string()))
            }
            Entry::Vacant(entry) => entry,
        };

        let hash_keys = key_schema
            .iter()
            .filter(|k| k.key_type == KeyType::HASH)
            .count();
        let range_keys = key_schema.len() - hash_keys;
        if hash_keys != 1 || range_keys > 1 {
            return Err(DynamoDBError::ValidationError(
                "KeySchema must have exactly one HASH key and at most one RANGE key".to_string(),
            ));
        }
        if let Some(undeclared) = key_schema.iter().find(|k| {
            !attribute_definitions
                .iter()
                .any(|d| d.attribute_name == k.attribute_name)
        }) {
            return Err(DynamoDBError::ValidationError(format!(
                "Key attribute {} has no AttributeDefinition",
                undeclared.attribute_name
            )));
        }

        let table_arn = format!(
            "arn:aws:dynamodb:us-east-1:000000000000:table/{}",
            table_name
        );
        let stream = stream_enabled.then(|| StreamChannel::new(&table_arn));

        let description = TableDescription {
            table_name: table_name.to_string(),
            table_arn,
            table_status: TableStatus::ACTIVE,
            key_schema,
            attribute_definitions,
            creation_date_time: chrono::Utc::now().timestamp() as f64,
            item_count: 0,
            stream_specification: Some(StreamSpecification {
                stream_enabled,
                stream_view_type: stream_enabled.then(|| "NEW_AND_OLD_IMAGES".to_string()),
            }),
            latest_stream_arn: stream.as_ref().map(|s| s.arn().to_string()),
        };

        let table = Table {
            description: description.clone(),
            items: RwLock::new(BTreeMap::new()),
            stream,
        };
        entry.insert(table);

        Ok(description)
    }

    /// Describe a table
    pub fn describe_table(&self, table_name: &str) -> Result<TableDescription, DynamoDBError> {
        let table = self.table(table_name)?;

        let mut desc = table.description.clone();
        desc.item_count = table.items.read().len() as i64;
        Ok(desc)
    }

    /// List all tables
    pub fn list_tables(&self) -> Vec<String> {
        self.tables.iter().map(|r| r.key().clone()).collect()
    }

    /// Claim the change feed of a table. Succeeds once; later calls get `None`.
    pub fn take_stream(
        &self,
        table_name: &str,
    ) -> Result<Option<mpsc::UnboundedReceiver<StreamRecord>>, DynamoDBError> {
        let table = self.table(table_name)?;
        Ok(table.stream.as_ref().and_then(StreamChannel::take_receiver))
    }

    /// Put an item, optionally guarded by a condition on the existing item
    pub fn put_item(
        &self,
        table_name: &str,
        item: Item,
        condition: Option<&Condition>,
    ) -> Result<Option<Item>, DynamoDBError> {
        self.table(table_name)?.put(item, condition)
    }

    /// Get an item by key
    pub fn get_item(&self, table_name: &str, key: &Item) -> Result<Option<Item>, DynamoDBError> {
        let table = self.table(table_name)?;
        let key_str = table.get_key(key)?;
        let item = table.items.read().get(&key_str).cloned();
        Ok(item)
    }

    /// Delete an item; returns the removed item if there was one
    pub fn delete_item(&self, table_name: &str, key: &Item) -> Result<Option<Item>, DynamoDBError> {
        self.table(table_name)?.delete(key)
    }

    /// All items whose partition key matches, ascending by sort key
    pub fn query(
        &self,
        table_name: &str,
        condition: &KeyCondition,
    ) -> Result<QueryResult, DynamoDBError> {
        let table = self.table(table_name)?;

        if table.key_name(&KeyType::HASH) != Some(condition.attribute.as_str()) {
            return Err(DynamoDBError::ValidationError(format!(
                "Query condition must target the partition key, got {}",
                condition.attribute
            )));
        }
        let partition = table
            .key_value(&condition.attribute, &condition.value)?
            .to_string();

        let mut items: Vec<Item> = table
            .items
            .read()
            .range((partition.clone(), String::new())..)
            .take_while(|((pk, _), _)| *pk == partition)
            .map(|(_, item)| item.clone())
            .collect();

        // Numeric sort keys must not follow their string order
        if let Some(range_key) = table.key_name(&KeyType::RANGE) {
            items.sort_by(|a, b| compare_attribute_values_opt(a.get(range_key), b.get(range_key)));
        }

        Ok(QueryResult {
            count: items.len(),
            scanned_count: items.len(),
            items,
        })
    }

    /// Apply up to [`MAX_BATCH_WRITE_ITEMS`] writes to one table
    pub fn batch_write(
        &self,
        table_name: &str,
        requests: Vec<WriteRequest>,
    ) -> Result<(), DynamoDBError> {
        if requests.is_empty() || requests.len() > MAX_BATCH_WRITE_ITEMS {
            return Err(DynamoDBError::ValidationError(format!(
                "BatchWriteItem accepts 1 to {} requests, got {}",
                MAX_BATCH_WRITE_ITEMS,
                requests.len()
            )));
        }

        let table = self.table(table_name)?;
        for request in requests {
            match request {
                WriteRequest::Put(item) => {
                    table.put(item, None)?;
                }
                WriteRequest::Delete(key) => {
                    table.delete(&key)?;
                }
            }
        }
        Ok(())
    }

    fn table(
        &self,
        table_name: &str,
    ) -> Result<dashmap::mapref::one::Ref<'_, String, Table>, DynamoDBError> {
        self.tables
            .get(table_name)
            .ok_or_else(|| DynamoDBError::ResourceNotFound(table_name.to_string()))
    }
}

/// Handle on one table of an in-process [`DynamoDBStorage`]
#[derive(Clone)]
pub struct LocalTable {
    storage: Arc<DynamoDBStorage>,
    table_name: String,
    hash_key: String,
    range_key: String,
}

impl LocalTable {
    /// Bind to an existing table with a `(HASH, RANGE)` key schema
    pub fn new(storage: Arc<DynamoDBStorage>, table_name: &str) -> Result<Self, DynamoDBError> {
        let (hash_key, range_key) = {
            let table = storage.table(table_name)?;
            let hash = table.key_name(&KeyType::HASH).map(str::to_string);
            let range = table.key_name(&KeyType::RANGE).map(str::to_string);
            (hash, range)
        };

        match (hash_key, range_key) {
            (Some(hash_key), Some(range_key)) => Ok(Self {
                storage,
                table_name: table_name.to_string(),
                hash_key,
                range_key,
            }),
            _ => Err(DynamoDBError::ValidationError(format!(
                "Table {} needs both a HASH and a RANGE key",
                table_name
            ))),
        }
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    pub fn storage(&self) -> &Arc<DynamoDBStorage> {
        &self.storage
    }
}

#[async_trait]
impl ItemStore for LocalTable {
    fn hash_key(&self) -> &str {
        &self.hash_key
    }

    fn range_key(&self) -> &str {
        &self.range_key
    }

    async fn get_item(&self, key: &ItemKey) -> Result<Option<Item>, DynamoDBError> {
        self.storage.get_item(
            &self.table_name,
            &key.to_item(&self.hash_key, &self.range_key),
        )
    }

    async fn put_item_if_absent(&self, item: Item) -> Result<(), DynamoDBError> {
        let guard = Condition::AttributeNotExists(self.hash_key.clone());
        self.storage
            .put_item(&self.table_name, item, Some(&guard))
            .map(|_| ())
    }

    async fn delete_item(&self, key: &ItemKey) -> Result<(), DynamoDBError> {
        self.storage
            .delete_item(
                &self.table_name,
                &key.to_item(&self.hash_key, &self.range_key),
            )
            .map(|_| ())
    }

    async fn query_partition(&self, partition: &str) -> Result<Vec<Item>, DynamoDBError> {
        let condition = KeyCondition {
            attribute: self.hash_key.clone(),
            value: AttributeValue::string(partition),
        };
        Ok(self.storage.query(&self.table_name, &condition)?.items)
    }

    async fn batch_delete(&self, keys: &[ItemKey]) -> Result<(), DynamoDBError> {
        let requests = keys
            .iter()
            .map(|k| WriteRequest::Delete(k.to_item(&self.hash_key, &self.range_key)))
            .collect();
        self.storage.batch_write(&self.table_name, requests)
    }
}

/// Helper to compare optional attribute values
fn compare_attribute_values_opt(
    a: Option<&AttributeValue>,
    b: Option<&AttributeValue>,
) -> std::cmp::Ordering {
    match (a, b) {
        (None, None) => std::cmp::Ordering::Equal,
        (None, Some(_)) => std::cmp::Ordering::Less,
        (Some(_), None) => std::cmp::Ordering::Greater,
        (Some(av), Some(bv)) => compare_attribute_values(av, bv),
    }
}

fn compare_attribute_values(a: &AttributeValue, b: &AttributeValue) -> std::cmp::Ordering {
    match (a, b) {
        (AttributeValue::S { S: s1 }, AttributeValue::S { S: s2 }) => s1.cmp(s2),
        (AttributeValue::N { N: n1 }, AttributeValue::N { N: n2 }) => {
            let num1: f64 = n1.parse().unwrap_or(0.0);
            let num2: f64 = n2.parse().unwrap_or(0.0);
            num1.partial_cmp(&num2).unwrap_or(std::cmp::Ordering::Equal)
        }
        (AttributeValue::B { B: b1 }, AttributeValue::B { B: b2 }) => b1.cmp(b2),
        _ => std::cmp::Ordering::Equal,
    }
}
