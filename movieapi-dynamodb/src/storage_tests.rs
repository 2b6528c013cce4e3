//! Tests for the single-table storage layer and its change feed

use crate::expression::{Condition, KeyCondition};
use crate::storage::*;
use crate::stream::StreamEventName;
use crate::traits::{ItemKey, ItemStore};
use std::sync::Arc;

// =============================================================================
// TEST HELPERS
// =============================================================================

fn movie_table(storage: &DynamoDBStorage, name: &str, stream_enabled: bool) {
    storage
        .create_table(
            name,
            vec![KeySchemaElement::hash("id"), KeySchemaElement::range("sk")],
            vec![
                AttributeDefinition {
                    attribute_name: "id".to_string(),
                    attribute_type: AttributeType::S,
                },
                AttributeDefinition {
                    attribute_name: "sk".to_string(),
                    attribute_type: AttributeType::S,
                },
            ],
            stream_enabled,
        )
        .unwrap();
}

fn make_item(attrs: Vec<(&str, AttributeValue)>) -> Item {
    attrs.into_iter().map(|(k, v)| (k.to_string(), v)).collect()
}

fn key(id: &str, sk: &str) -> Item {
    make_item(vec![
        ("id", AttributeValue::string(id)),
        ("sk", AttributeValue::string(sk)),
    ])
}

fn partition(id: &str) -> KeyCondition {
    KeyCondition {
        attribute: "id".to_string(),
        value: AttributeValue::string(id),
    }
}

// =============================================================================
// TABLE OPERATIONS
// =============================================================================

mod table_tests {
    use super::*;

    #[test]
    fn test_create_and_describe_table() {
        let s = DynamoDBStorage::new();
        movie_table(&s, "movies", true);

        let desc = s.describe_table("movies").unwrap();
        assert_eq!(desc.table_name, "movies");
        assert_eq!(desc.table_status, TableStatus::ACTIVE);
        assert!(desc.latest_stream_arn.unwrap().contains("table/movies/stream/"));
    }

    #[test]
    fn test_create_table_already_exists() {
        let s = DynamoDBStorage::new();
        movie_table(&s, "movies", false);

        let result = s.create_table("movies", vec![KeySchemaElement::hash("id")], vec![], false);
        assert!(matches!(result, Err(DynamoDBError::ResourceInUse(_))));
    }

    #[test]
    fn test_create_table_requires_hash_key() {
        let s = DynamoDBStorage::new();
        let result = s.create_table("bad", vec![KeySchemaElement::range("sk")], vec![], false);
        assert!(matches!(result, Err(DynamoDBError::ValidationError(_))));
    }

    #[test]
    fn test_create_table_requires_key_definitions() {
        let s = DynamoDBStorage::new();
        let result = s.create_table(
            "movies",
            vec![KeySchemaElement::hash("id"), KeySchemaElement::range("sk")],
            vec![AttributeDefinition {
                attribute_name: "id".to_string(),
                attribute_type: AttributeType::S,
            }],
            false,
        );
        assert!(matches!(result, Err(DynamoDBError::ValidationError(_))));
        assert!(s.list_tables().is_empty());
    }

    #[test]
    fn test_concurrent_create_keeps_one_table() {
        let s = Arc::new(DynamoDBStorage::new());

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let s = s.clone();
                std::thread::spawn(move || {
                    let result = s.create_table(
                        "movies",
                        vec![KeySchemaElement::hash("id")],
                        vec![AttributeDefinition {
                            attribute_name: "id".to_string(),
                            attribute_type: AttributeType::S,
                        }],
                        false,
                    );
                    if result.is_ok() {
                        s.put_item(
                            "movies",
                            make_item(vec![("id", AttributeValue::string(format!("m{}", i)))]),
                            None,
                        )
                        .unwrap();
                    }
                    result.is_ok()
                })
            })
            .collect();

        let created = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();
        assert_eq!(created, 1);
        assert_eq!(s.describe_table("movies").unwrap().item_count, 1);
    }

    #[test]
    fn test_unknown_table() {
        let s = DynamoDBStorage::new();
        assert!(matches!(
            s.get_item("missing", &key("m1", "xxxx")),
            Err(DynamoDBError::ResourceNotFound(_))
        ));
    }

    #[test]
    fn test_list_tables() {
        let s = DynamoDBStorage::new();
        movie_table(&s, "a", false);
        movie_table(&s, "b", false);

        let mut names = s.list_tables();
        names.sort();
        assert_eq!(names, vec!["a".to_string(), "b".to_string()]);
    }
}

// =============================================================================
// ITEM OPERATIONS
// =============================================================================

mod item_tests {
    use super::*;

    #[test]
    fn test_put_get_delete() {
        let s = DynamoDBStorage::new();
        movie_table(&s, "t", false);

        let mut item = key("m1", "xxxx");
        item.insert("title".to_string(), AttributeValue::string("Dune"));
        s.put_item("t", item, None).unwrap();

        let got = s.get_item("t", &key("m1", "xxxx")).unwrap().unwrap();
        assert_eq!(got.get("title").unwrap().as_string(), Some("Dune"));

        let removed = s.delete_item("t", &key("m1", "xxxx")).unwrap();
        assert!(removed.is_some());
        assert!(s.get_item("t", &key("m1", "xxxx")).unwrap().is_none());
    }

    #[test]
    fn test_delete_missing_item_is_not_an_error() {
        let s = DynamoDBStorage::new();
        movie_table(&s, "t", false);

        assert!(s.delete_item("t", &key("m404", "xxxx")).unwrap().is_none());
    }

    #[test]
    fn test_missing_key_attribute() {
        let s = DynamoDBStorage::new();
        movie_table(&s, "t", false);

        let item = make_item(vec![("id", AttributeValue::string("m1"))]);
        assert!(matches!(
            s.put_item("t", item, None),
            Err(DynamoDBError::ValidationError(_))
        ));
    }

    #[test]
    fn test_key_type_must_match_definition() {
        let s = DynamoDBStorage::new();
        movie_table(&s, "t", false);

        let numeric_sort = make_item(vec![
            ("id", AttributeValue::string("c1")),
            ("sk", AttributeValue::number("7")),
        ]);
        assert!(matches!(
            s.put_item("t", numeric_sort.clone(), None),
            Err(DynamoDBError::ValidationError(_))
        ));
        assert!(matches!(
            s.delete_item("t", &numeric_sort),
            Err(DynamoDBError::ValidationError(_))
        ));

        // The string key with the same digits is a different record
        s.put_item("t", key("c1", "7"), None).unwrap();
        assert!(s.get_item("t", &numeric_sort).is_err());
        assert!(s.get_item("t", &key("c1", "7")).unwrap().is_some());

        let numeric_partition = KeyCondition {
            attribute: "id".to_string(),
            value: AttributeValue::number("1"),
        };
        assert!(s.query("t", &numeric_partition).is_err());
    }

    #[test]
    fn test_conditional_put_keeps_first_write() {
        let s = DynamoDBStorage::new();
        movie_table(&s, "t", false);
        let guard = Condition::AttributeNotExists("id".to_string());

        let mut first = key("m1", "xxxx");
        first.insert("title".to_string(), AttributeValue::string("First"));
        s.put_item("t", first.clone(), Some(&guard)).unwrap();

        let mut second = key("m1", "xxxx");
        second.insert("title".to_string(), AttributeValue::string("Second"));
        let result = s.put_item("t", second, Some(&guard));
        assert!(matches!(result, Err(DynamoDBError::ConditionalCheckFailed)));

        assert_eq!(s.get_item("t", &key("m1", "xxxx")).unwrap(), Some(first));
    }

    #[test]
    fn test_query_returns_partition_in_sort_order() {
        let s = DynamoDBStorage::new();
        movie_table(&s, "t", false);

        for sk in ["9", "10", "2"] {
            s.put_item("t", key("c1", sk), None).unwrap();
        }
        s.put_item("t", key("c10", "1"), None).unwrap();
        s.put_item("t", key("c", "1"), None).unwrap();

        let result = s.query("t", &partition("c1")).unwrap();
        let sks: Vec<&str> = result
            .items
            .iter()
            .map(|i| i.get("sk").unwrap().as_string().unwrap())
            .collect();
        assert_eq!(sks, vec!["10", "2", "9"]);
        assert_eq!(result.count, 3);
    }

    #[test]
    fn test_query_empty_partition() {
        let s = DynamoDBStorage::new();
        movie_table(&s, "t", false);

        let result = s.query("t", &partition("w5")).unwrap();
        assert!(result.items.is_empty());
    }

    #[test]
    fn test_query_on_sort_key_rejected() {
        let s = DynamoDBStorage::new();
        movie_table(&s, "t", false);

        let cond = KeyCondition {
            attribute: "sk".to_string(),
            value: AttributeValue::string("xxxx"),
        };
        assert!(matches!(
            s.query("t", &cond),
            Err(DynamoDBError::ValidationError(_))
        ));
    }

    #[test]
    fn test_batch_write_limits() {
        let s = DynamoDBStorage::new();
        movie_table(&s, "t", false);

        assert!(s.batch_write("t", vec![]).is_err());

        let too_many: Vec<WriteRequest> = (0..26)
            .map(|i| WriteRequest::Delete(key("c1", &i.to_string())))
            .collect();
        assert!(matches!(
            s.batch_write("t", too_many),
            Err(DynamoDBError::ValidationError(_))
        ));
    }

    #[test]
    fn test_batch_write_puts_and_deletes() {
        let s = DynamoDBStorage::new();
        movie_table(&s, "t", false);
        s.put_item("t", key("c1", "1"), None).unwrap();

        s.batch_write(
            "t",
            vec![
                WriteRequest::Delete(key("c1", "1")),
                WriteRequest::Put(key("c1", "2")),
            ],
        )
        .unwrap();

        let items = s.query("t", &partition("c1")).unwrap().items;
        assert_eq!(items, vec![key("c1", "2")]);
    }
}

// =============================================================================
// CHANGE FEED
// =============================================================================

mod stream_tests {
    use super::*;

    #[test]
    fn test_stream_records_in_mutation_order() {
        let s = DynamoDBStorage::new();
        movie_table(&s, "t", true);
        let mut rx = s.take_stream("t").unwrap().unwrap();

        let mut item = key("m1", "xxxx");
        item.insert("title".to_string(), AttributeValue::string("Dune"));
        s.put_item("t", item.clone(), None).unwrap();
        s.put_item("t", item.clone(), None).unwrap();
        s.delete_item("t", &key("m1", "xxxx")).unwrap();
        s.delete_item("t", &key("m1", "xxxx")).unwrap();

        let insert = rx.try_recv().unwrap();
        assert_eq!(insert.event_name, StreamEventName::Insert);
        assert_eq!(insert.dynamodb.new_image, Some(item.clone()));
        assert!(insert.dynamodb.old_image.is_none());
        assert_eq!(insert.dynamodb.keys, key("m1", "xxxx"));

        let modify = rx.try_recv().unwrap();
        assert_eq!(modify.event_name, StreamEventName::Modify);

        let remove = rx.try_recv().unwrap();
        assert_eq!(remove.event_name, StreamEventName::Remove);
        assert_eq!(remove.dynamodb.old_image, Some(item));
        assert!(remove.dynamodb.new_image.is_none());

        assert!(insert.dynamodb.sequence_number < modify.dynamodb.sequence_number);
        assert!(modify.dynamodb.sequence_number < remove.dynamodb.sequence_number);

        // Deleting an absent key changes nothing
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_stream_has_single_consumer() {
        let s = DynamoDBStorage::new();
        movie_table(&s, "t", true);

        assert!(s.take_stream("t").unwrap().is_some());
        assert!(s.take_stream("t").unwrap().is_none());
    }

    #[test]
    fn test_failed_condition_emits_nothing() {
        let s = DynamoDBStorage::new();
        movie_table(&s, "t", true);
        let mut rx = s.take_stream("t").unwrap().unwrap();
        let guard = Condition::AttributeNotExists("id".to_string());

        s.put_item("t", key("m1", "xxxx"), Some(&guard)).unwrap();
        assert!(s.put_item("t", key("m1", "xxxx"), Some(&guard)).is_err());

        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_stream_record_wire_shape() {
        let s = DynamoDBStorage::new();
        movie_table(&s, "t", true);
        let mut rx = s.take_stream("t").unwrap().unwrap();
        s.put_item("t", key("c1", "7"), None).unwrap();

        let record = rx.try_recv().unwrap();
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["eventName"], "INSERT");
        assert_eq!(json["eventSource"], "aws:dynamodb");
        assert_eq!(json["dynamodb"]["NewImage"]["id"]["S"], "c1");
        assert_eq!(json["dynamodb"]["StreamViewType"], "NEW_AND_OLD_IMAGES");
        assert!(json["dynamodb"].get("OldImage").is_none());
    }
}

// =============================================================================
// ITEM STORE HANDLE
// =============================================================================

mod local_table_tests {
    use super::*;

    fn local() -> LocalTable {
        let storage = Arc::new(DynamoDBStorage::new());
        movie_table(&storage, "movies", false);
        LocalTable::new(storage, "movies").unwrap()
    }

    #[test]
    fn test_requires_composite_key() {
        let storage = Arc::new(DynamoDBStorage::new());
        storage
            .create_table(
                "flat",
                vec![KeySchemaElement::hash("id")],
                vec![AttributeDefinition {
                    attribute_name: "id".to_string(),
                    attribute_type: AttributeType::S,
                }],
                false,
            )
            .unwrap();
        assert!(LocalTable::new(storage, "flat").is_err());
    }

    #[tokio::test]
    async fn test_put_if_absent_conflicts() {
        let table = local();

        table.put_item_if_absent(key("m1", "xxxx")).await.unwrap();
        let result = table.put_item_if_absent(key("m1", "xxxx")).await;
        assert!(matches!(result, Err(DynamoDBError::ConditionalCheckFailed)));
    }

    #[tokio::test]
    async fn test_batch_delete_and_query() {
        let table = local();
        for i in 0..5 {
            table
                .storage()
                .put_item("movies", key("w1", &format!("body{}", i)), None)
                .unwrap();
        }

        let keys: Vec<ItemKey> = (0..3)
            .map(|i| ItemKey::new("w1", format!("body{}", i)))
            .collect();
        table.batch_delete(&keys).await.unwrap();

        let remaining = table.query_partition("w1").await.unwrap();
        assert_eq!(remaining.len(), 2);
        assert!(table
            .get_item(&ItemKey::new("w1", "body0"))
            .await
            .unwrap()
            .is_none());
    }
}
