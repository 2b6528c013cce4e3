//! DynamoDB HTTP request handlers

use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::Response,
};
use bytes::Bytes;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use crate::expression::{parse_condition, parse_key_condition, ExpressionContext};
use crate::storage::{
    AttributeDefinition, AttributeType, AttributeValue, DynamoDBError, DynamoDBStorage, Item,
    KeySchemaElement, KeyType, WriteRequest,
};

/// Shared state for DynamoDB handlers
pub struct DynamoDBState {
    pub storage: Arc<DynamoDBStorage>,
}

/// Handle a DynamoDB request
pub async fn handle_request(
    State(state): State<Arc<DynamoDBState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    // Get the target action from x-amz-target header
    let target = match headers.get("x-amz-target") {
        Some(t) => match t.to_str() {
            Ok(s) => s,
            Err(_) => return error_response("SerializationException", "Invalid target header"),
        },
        None => return error_response("MissingAction", "Missing x-amz-target header"),
    };

    // Parse action from target (format: DynamoDB_20120810.ActionName)
    let action = target.rsplit('.').next().unwrap_or(target);
    debug!(action, "DynamoDB request");

    let body_json: Value = match serde_json::from_slice(&body) {
        Ok(v) => v,
        Err(e) => return error_response("SerializationException", &format!("Invalid JSON: {}", e)),
    };

    let result = match action {
        "CreateTable" => handle_create_table(&state.storage, &body_json),
        "DescribeTable" => handle_describe_table(&state.storage, &body_json),
        "ListTables" => Ok(handle_list_tables(&state.storage)),
        "PutItem" => handle_put_item(&state.storage, &body_json),
        "GetItem" => handle_get_item(&state.storage, &body_json),
        "DeleteItem" => handle_delete_item(&state.storage, &body_json),
        "Query" => handle_query(&state.storage, &body_json),
        "BatchWriteItem" => handle_batch_write_item(&state.storage, &body_json),
        _ => Err(DynamoDBError::ValidationError(format!(
            "Unknown action: {}",
            action
        ))),
    };

    match result {
        Ok(response_body) => json_response(StatusCode::OK, &response_body),
        Err(e) => dynamodb_error_response(&e),
    }
}

// === Table Operations ===

fn handle_create_table(storage: &DynamoDBStorage, body: &Value) -> Result<Value, DynamoDBError> {
    let table_name = table_name(body)?;

    let key_schema: Vec<KeySchemaElement> = body["KeySchema"]
        .as_array()
        .ok_or_else(|| DynamoDBError::ValidationError("Missing KeySchema".to_string()))?
        .iter()
        .map(parse_key_schema_element)
        .collect::<Result<Vec<_>, _>>()?;

    let attribute_definitions: Vec<AttributeDefinition> = body["AttributeDefinitions"]
        .as_array()
        .ok_or_else(|| DynamoDBError::ValidationError("Missing AttributeDefinitions".to_string()))?
        .iter()
        .map(parse_attribute_definition)
        .collect::<Result<Vec<_>, _>>()?;

    let stream_enabled = body["StreamSpecification"]["StreamEnabled"]
        .as_bool()
        .unwrap_or(false);

    let description =
        storage.create_table(table_name, key_schema, attribute_definitions, stream_enabled)?;

    Ok(json!({
        "TableDescription": description
    }))
}

fn handle_describe_table(storage: &DynamoDBStorage, body: &Value) -> Result<Value, DynamoDBError> {
    let description = storage.describe_table(table_name(body)?)?;

    Ok(json!({
        "Table": description
    }))
}

fn handle_list_tables(storage: &DynamoDBStorage) -> Value {
    let mut names = storage.list_tables();
    names.sort();

    json!({
        "TableNames": names
    })
}

// === Item Operations ===

fn handle_put_item(storage: &DynamoDBStorage, body: &Value) -> Result<Value, DynamoDBError> {
    let table_name = table_name(body)?;
    let item = parse_item(&body["Item"])?;

    let expression_attribute_names = parse_expression_attribute_names(body);
    let expression_attribute_values = parse_expression_attribute_values(body)?;
    let ctx = ExpressionContext::new(
        expression_attribute_names.as_ref(),
        expression_attribute_values.as_ref(),
    );
    let condition = body
        .get("ConditionExpression")
        .and_then(|v| v.as_str())
        .map(|expr| parse_condition(expr, &ctx))
        .transpose()?;

    let old_item = storage.put_item(table_name, item, condition.as_ref())?;

    Ok(return_old_values(body, old_item))
}

fn handle_get_item(storage: &DynamoDBStorage, body: &Value) -> Result<Value, DynamoDBError> {
    let table_name = table_name(body)?;
    let key = parse_item(&body["Key"])?;

    match storage.get_item(table_name, &key)? {
        Some(i) => Ok(json!({ "Item": i })),
        None => Ok(json!({})),
    }
}

fn handle_delete_item(storage: &DynamoDBStorage, body: &Value) -> Result<Value, DynamoDBError> {
    let table_name = table_name(body)?;
    let key = parse_item(&body["Key"])?;

    let old_item = storage.delete_item(table_name, &key)?;

    Ok(return_old_values(body, old_item))
}

fn handle_query(storage: &DynamoDBStorage, body: &Value) -> Result<Value, DynamoDBError> {
    let table_name = table_name(body)?;

    let key_condition_expression = body["KeyConditionExpression"].as_str().ok_or_else(|| {
        DynamoDBError::ValidationError("Missing KeyConditionExpression".to_string())
    })?;
    let expression_attribute_names = parse_expression_attribute_names(body);
    let expression_attribute_values = parse_expression_attribute_values(body)?;
    let ctx = ExpressionContext::new(
        expression_attribute_names.as_ref(),
        expression_attribute_values.as_ref(),
    );
    let key_condition = parse_key_condition(key_condition_expression, &ctx)?;

    let result = storage.query(table_name, &key_condition)?;

    Ok(json!({
        "Items": result.items,
        "Count": result.count,
        "ScannedCount": result.scanned_count
    }))
}

// === Batch Operations ===

fn handle_batch_write_item(
    storage: &DynamoDBStorage,
    body: &Value,
) -> Result<Value, DynamoDBError> {
    let request_items = body
        .get("RequestItems")
        .and_then(|v| v.as_object())
        .ok_or_else(|| DynamoDBError::ValidationError("Missing RequestItems".to_string()))?;

    for (table_name, requests) in request_items {
        let operations = requests
            .as_array()
            .ok_or_else(|| DynamoDBError::ValidationError("Invalid request format".to_string()))?;

        let mut writes = Vec::with_capacity(operations.len());
        for op in operations {
            if let Some(put_request) = op.get("PutRequest") {
                writes.push(WriteRequest::Put(parse_item(&put_request["Item"])?));
            } else if let Some(delete_request) = op.get("DeleteRequest") {
                writes.push(WriteRequest::Delete(parse_item(&delete_request["Key"])?));
            } else {
                return Err(DynamoDBError::ValidationError(
                    "Write request must be a PutRequest or DeleteRequest".to_string(),
                ));
            }
        }

        storage.batch_write(table_name, writes)?;
    }

    Ok(json!({
        "UnprocessedItems": {}
    }))
}

// === Helper Functions ===

fn table_name(body: &Value) -> Result<&str, DynamoDBError> {
    body["TableName"]
        .as_str()
        .ok_or_else(|| DynamoDBError::ValidationError("Missing TableName".to_string()))
}

fn return_old_values(body: &Value, old_item: Option<Item>) -> Value {
    match (body["ReturnValues"].as_str(), old_item) {
        (Some("ALL_OLD"), Some(old)) => json!({ "Attributes": old }),
        _ => json!({}),
    }
}

fn parse_key_schema_element(value: &Value) -> Result<KeySchemaElement, DynamoDBError> {
    Ok(KeySchemaElement {
        attribute_name: value["AttributeName"]
            .as_str()
            .ok_or_else(|| {
                DynamoDBError::ValidationError("Missing AttributeName in KeySchema".to_string())
            })?
            .to_string(),
        key_type: match value["KeyType"].as_str() {
            Some("HASH") => KeyType::HASH,
            Some("RANGE") => KeyType::RANGE,
            _ => {
                return Err(DynamoDBError::ValidationError(
                    "Invalid KeyType".to_string(),
                ))
            }
        },
    })
}

fn parse_attribute_definition(value: &Value) -> Result<AttributeDefinition, DynamoDBError> {
    Ok(AttributeDefinition {
        attribute_name: value["AttributeName"]
            .as_str()
            .ok_or_else(|| DynamoDBError::ValidationError("Missing AttributeName".to_string()))?
            .to_string(),
        attribute_type: match value["AttributeType"].as_str() {
            Some("S") => AttributeType::S,
            Some("N") => AttributeType::N,
            Some("B") => AttributeType::B,
            _ => {
                return Err(DynamoDBError::ValidationError(
                    "Invalid AttributeType".to_string(),
                ))
            }
        },
    })
}

fn parse_expression_attribute_names(body: &Value) -> Option<HashMap<String, String>> {
    body.get("ExpressionAttributeNames")
        .and_then(|v| v.as_object())
        .map(|obj| {
            obj.iter()
                .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                .collect()
        })
}

fn parse_expression_attribute_values(
    body: &Value,
) -> Result<Option<HashMap<String, AttributeValue>>, DynamoDBError> {
    body.get("ExpressionAttributeValues")
        .and_then(|v| v.as_object())
        .map(|obj| {
            obj.iter()
                .map(|(k, v)| parse_attribute_value(v).map(|av| (k.clone(), av)))
                .collect::<Result<HashMap<_, _>, _>>()
        })
        .transpose()
}

/// Parse a DynamoDB item from JSON
fn parse_item(value: &Value) -> Result<Item, DynamoDBError> {
    let obj = value
        .as_object()
        .ok_or_else(|| DynamoDBError::ValidationError("Item must be an object".to_string()))?;

    let mut item = Item::new();
    for (k, v) in obj {
        item.insert(k.clone(), parse_attribute_value(v)?);
    }
    Ok(item)
}

/// Payload of a string-encoded scalar (`S`, `N`, `B` and set members)
fn string_payload(tag: &str, value: &Value) -> Result<String, DynamoDBError> {
    value.as_str().map(str::to_string).ok_or_else(|| {
        DynamoDBError::ValidationError(format!("{} value must be a string, got {}", tag, value))
    })
}

fn bool_payload(tag: &str, value: &Value) -> Result<bool, DynamoDBError> {
    value.as_bool().ok_or_else(|| {
        DynamoDBError::ValidationError(format!("{} value must be a boolean, got {}", tag, value))
    })
}

/// Parse a single attribute value
fn parse_attribute_value(value: &Value) -> Result<AttributeValue, DynamoDBError> {
    if let Some(s) = value.get("S") {
        return Ok(AttributeValue::S {
            S: string_payload("S", s)?,
        });
    }
    if let Some(n) = value.get("N") {
        return Ok(AttributeValue::N {
            N: string_payload("N", n)?,
        });
    }
    if let Some(b) = value.get("B") {
        return Ok(AttributeValue::B {
            B: string_payload("B", b)?,
        });
    }
    if let Some(b) = value.get("BOOL") {
        return Ok(AttributeValue::BOOL {
            BOOL: bool_payload("BOOL", b)?,
        });
    }
    if let Some(n) = value.get("NULL") {
        return Ok(AttributeValue::NULL {
            NULL: bool_payload("NULL", n)?,
        });
    }
    if let Some(l) = value.get("L") {
        let arr = l
            .as_array()
            .ok_or_else(|| DynamoDBError::ValidationError("L must be an array".to_string()))?;
        let values: Result<Vec<_>, _> = arr.iter().map(parse_attribute_value).collect();
        return Ok(AttributeValue::L { L: values? });
    }
    if let Some(m) = value.get("M") {
        let obj = m
            .as_object()
            .ok_or_else(|| DynamoDBError::ValidationError("M must be an object".to_string()))?;
        let mut map = HashMap::new();
        for (k, v) in obj {
            map.insert(k.clone(), parse_attribute_value(v)?);
        }
        return Ok(AttributeValue::M { M: map });
    }
    for set_type in ["SS", "NS", "BS"] {
        if let Some(set) = value.get(set_type) {
            let values: Vec<String> = set
                .as_array()
                .ok_or_else(|| {
                    DynamoDBError::ValidationError(format!("{} must be an array", set_type))
                })?
                .iter()
                .map(|v| string_payload(set_type, v))
                .collect::<Result<_, _>>()?;
            return Ok(match set_type {
                "SS" => AttributeValue::SS { SS: values },
                "NS" => AttributeValue::NS { NS: values },
                _ => AttributeValue::BS { BS: values },
            });
        }
    }

    Err(DynamoDBError::ValidationError(format!(
        "Unknown attribute type: {:?}",
        value
    )))
}

/// Create a JSON response
fn json_response(status: StatusCode, body: &Value) -> Response {
    let mut response = Response::new(Body::from(
        serde_json::to_string(body).unwrap_or_default(),
    ));
    *response.status_mut() = status;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        header::HeaderValue::from_static("application/x-amz-json-1.0"),
    );
    response
}

/// Create an error response
fn error_response(error_type: &str, message: &str) -> Response {
    let body = json!({
        "__type": format!("com.amazonaws.dynamodb.v20120810#{}", error_type),
        "message": message
    });
    json_response(StatusCode::BAD_REQUEST, &body)
}

/// Wire error code for a storage error
pub(crate) fn error_type(error: &DynamoDBError) -> &'static str {
    match error {
        DynamoDBError::ResourceNotFound(_) => "ResourceNotFoundException",
        DynamoDBError::ResourceInUse(_) => "ResourceInUseException",
        DynamoDBError::ValidationError(_) | DynamoDBError::Expression(_) => "ValidationException",
        DynamoDBError::ConditionalCheckFailed => "ConditionalCheckFailedException",
        DynamoDBError::Internal(_) | DynamoDBError::Transport(_) => "InternalServerError",
    }
}

/// Map DynamoDBError to HTTP response
fn dynamodb_error_response(error: &DynamoDBError) -> Response {
    let status = match error {
        DynamoDBError::Internal(_) | DynamoDBError::Transport(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
        _ => StatusCode::BAD_REQUEST,
    };

    let message = match error {
        DynamoDBError::ConditionalCheckFailed => error.to_string(),
        DynamoDBError::ResourceNotFound(name) => {
            format!("Requested resource not found: Table: {} not found", name)
        }
        _ => error.to_string(),
    };

    let body = json!({
        "__type": format!("com.amazonaws.dynamodb.v20120810#{}", error_type(error)),
        "message": message
    });
    json_response(status, &body)
}
