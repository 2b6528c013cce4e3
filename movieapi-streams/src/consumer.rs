//! In-process consumer of the table change feed

use movieapi_dynamodb::StreamRecord;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, info};

use crate::event::ChangeRecord;
use crate::projector::handle_batch;

/// Running counts kept by [`run_projector`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProjectorTotals {
    pub batches: usize,
    pub lines: usize,
    pub failures: usize,
}

/// Drain the feed until every sender is gone.
///
/// Waits for one record, then takes whatever else is already queued (up to
/// `batch_size`) and projects the batch in order. Lines are logged and then
/// dropped; only the counts are kept.
pub async fn run_projector(
    mut feed: UnboundedReceiver<StreamRecord>,
    batch_size: usize,
) -> ProjectorTotals {
    let batch_size = batch_size.max(1);
    let mut totals = ProjectorTotals::default();

    info!(batch_size, "State-change projector started");

    while let Some(first) = feed.recv().await {
        let mut batch: Vec<ChangeRecord> = vec![first.into()];
        while batch.len() < batch_size {
            match feed.try_recv() {
                Ok(record) => batch.push(record.into()),
                Err(_) => break,
            }
        }

        debug!(records = batch.len(), "Projecting change batch");
        let report = handle_batch(&batch);
        totals.batches += 1;
        totals.lines += report.lines.len();
        totals.failures += report.failures;
    }

    info!(
        batches = totals.batches,
        lines = totals.lines,
        failures = totals.failures,
        "State-change projector stopped"
    );
    totals
}

#[cfg(test)]
mod tests {
    use super::*;
    use movieapi_dynamodb::storage::{AttributeDefinition, AttributeType, KeySchemaElement};
    use movieapi_dynamodb::{AttributeValue, DynamoDBStorage, Item};

    fn item(attrs: &[(&str, &str)]) -> Item {
        attrs
            .iter()
            .map(|(k, v)| (k.to_string(), AttributeValue::string(*v)))
            .collect()
    }

    fn movie_table() -> DynamoDBStorage {
        let storage = DynamoDBStorage::new();
        storage
            .create_table(
                "movies",
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
                true,
            )
            .unwrap();
        storage
    }

    #[tokio::test]
    async fn test_projects_store_mutations_in_order() {
        let storage = movie_table();
        let mut feed = storage.take_stream("movies").unwrap().unwrap();

        let dune = item(&[
            ("id", "m1"),
            ("sk", "xxxx"),
            ("title", "Dune"),
            ("releaseDate", "2021"),
            ("overview", "..."),
        ]);
        storage.put_item("movies", dune.clone(), None).unwrap();
        storage.put_item("movies", dune, None).unwrap();
        storage
            .put_item("movies", item(&[("id", "c1"), ("sk", "7"), ("roleName", "Paul")]), None)
            .unwrap();
        storage
            .delete_item("movies", &item(&[("id", "m1"), ("sk", "xxxx")]))
            .unwrap();

        // Dropping the storage closes the feed
        drop(storage);
        let mut records = Vec::new();
        while let Some(record) = feed.recv().await {
            records.push(ChangeRecord::from(record));
        }

        let report = handle_batch(&records);
        assert_eq!(report.failures, 0);
        assert_eq!(
            report.lines,
            vec![
                "POST + m1 | xxxx | Dune | 2021 | ...",
                "POST + c1 | 7 | Paul | ",
                "DELETE m1 | xxxx | Dune | 2021 | ...",
            ]
        );
    }

    #[tokio::test]
    async fn test_projector_keeps_only_counts() {
        let storage = movie_table();
        let feed = storage.take_stream("movies").unwrap().unwrap();

        for i in 0..1000 {
            let id = format!("m{}", i);
            storage
                .put_item("movies", item(&[("id", id.as_str()), ("sk", "xxxx"), ("title", "Dune")]), None)
                .unwrap();
        }

        drop(storage);
        let totals = run_projector(feed, 10).await;
        assert_eq!(
            totals,
            ProjectorTotals {
                batches: 100,
                lines: 1000,
                failures: 0,
            }
        );
    }
}
