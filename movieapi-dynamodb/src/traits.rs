//! Store client trait used by the request handlers

use async_trait::async_trait;

use crate::storage::{AttributeValue, DynamoDBError, Item};

/// Maximum number of write requests accepted by one BatchWriteItem call
pub const MAX_BATCH_WRITE_ITEMS: usize = 25;

/// Primary key of a record in a `(partition, sort)` table
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ItemKey {
    pub partition: String,
    pub sort: String,
}

impl ItemKey {
    pub fn new(partition: impl Into<String>, sort: impl Into<String>) -> Self {
        Self {
            partition: partition.into(),
            sort: sort.into(),
        }
    }

    /// Read the key back out of a stored item
    pub fn from_item(item: &Item, hash_key: &str, range_key: &str) -> Option<Self> {
        let partition = item.get(hash_key)?.as_string()?;
        let sort = item.get(range_key)?.as_string()?;
        Some(Self::new(partition, sort))
    }

    /// Render as a key-attribute map for the given key schema
    pub fn to_item(&self, hash_key: &str, range_key: &str) -> Item {
        let mut item = Item::new();
        item.insert(hash_key.to_string(), AttributeValue::string(&self.partition));
        item.insert(range_key.to_string(), AttributeValue::string(&self.sort));
        item
    }
}

/// Operations the movie handlers need from the single-table store.
///
/// Implementations are bound to one table whose key schema is a string
/// partition key and a string sort key.
#[async_trait]
pub trait ItemStore: Send + Sync {
    /// Name of the partition key attribute
    fn hash_key(&self) -> &str;

    /// Name of the sort key attribute
    fn range_key(&self) -> &str;

    /// Point lookup by full key
    async fn get_item(&self, key: &ItemKey) -> Result<Option<Item>, DynamoDBError>;

    /// Insert that fails with [`DynamoDBError::ConditionalCheckFailed`] when
    /// a record with the same key already exists
    async fn put_item_if_absent(&self, item: Item) -> Result<(), DynamoDBError>;

    /// Unconditional delete; deleting an absent key is not an error
    async fn delete_item(&self, key: &ItemKey) -> Result<(), DynamoDBError>;

    /// All items of one partition, ascending by sort key
    async fn query_partition(&self, partition: &str) -> Result<Vec<Item>, DynamoDBError>;

    /// Delete at most [`MAX_BATCH_WRITE_ITEMS`] keys in one call
    async fn batch_delete(&self, keys: &[ItemKey]) -> Result<(), DynamoDBError>;
}
