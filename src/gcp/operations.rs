//! Operations: globalOperations, regionOperations and zoneOperations
//!
//! Operations are stored under their own path
//! (`projects/p/zones/z/operations/operation-...`). Since every operation is
//! DONE when it is created, `wait` answers exactly like `get`.

use std::sync::OnceLock;

use serde_json::{json, Map, Value};

use crate::core::operation::format_timestamp;
use crate::core::{FieldMap, Operation, OperationScope, Outcome, Resource};

use super::links::{absolute, collection_path, resource_path, scope_path};
use super::{in_collection, ComputeState, ListQuery};

/// Render an operation with absolute links
pub fn to_json(op: &Operation, base_url: &str) -> Value {
    let mut body = Map::new();
    body.insert("kind".into(), json!(Operation::def().kind.clone().unwrap_or_default()));
    body.insert("id".into(), json!(op.id));
    body.insert("name".into(), json!(op.name));
    body.insert("operationType".into(), json!(op.operation_type.as_str()));
    body.insert("targetLink".into(), json!(absolute(base_url, &op.target_link)));
    if let Some(target_id) = &op.target_id {
        body.insert("targetId".into(), json!(target_id));
    }
    body.insert("status".into(), json!(op.status.as_str()));
    body.insert("progress".into(), json!(op.progress));
    if let Some(user) = &op.user {
        body.insert("user".into(), json!(user));
    }
    body.insert("insertTime".into(), json!(format_timestamp(&op.insert_time)));
    if let Some(start) = &op.start_time {
        body.insert("startTime".into(), json!(format_timestamp(start)));
    }
    if let Some(end) = &op.end_time {
        body.insert("endTime".into(), json!(format_timestamp(end)));
    }
    body.insert("selfLink".into(), json!(absolute(base_url, op.path())));

    let location = scope_path(&op.project, &op.scope);
    match &op.scope {
        OperationScope::Zone(_) => {
            body.insert("zone".into(), json!(absolute(base_url, &location)));
        }
        OperationScope::Region(_) => {
            body.insert("region".into(), json!(absolute(base_url, &location)));
        }
        OperationScope::Global => {}
    }

    if let Some(err) = &op.error {
        body.insert(
            "error".into(),
            json!({
                "errors": [{ "code": err.code, "message": err.message }]
            }),
        );
        body.insert("httpErrorStatusCode".into(), json!(err.http_status));
        body.insert("httpErrorMessage".into(), json!(err.message));
    }
    Value::Object(body)
}

fn fields() -> &'static FieldMap<Operation> {
    static FIELDS: OnceLock<FieldMap<Operation>> = OnceLock::new();
    FIELDS.get_or_init(|| {
        FieldMap::new()
            .field("name", |op: &Operation| op.name.clone())
            .field("id", |op: &Operation| op.id.clone())
            .field("operationType", |op: &Operation| op.operation_type.as_str().to_string())
            .field("status", |op: &Operation| op.status.as_str().to_string())
            .field("targetId", |op: &Operation| op.target_id.clone().unwrap_or_default())
            .multi("targetLink", |op: &Operation| {
                vec![op.target_link.clone(), super::links::short_name(&op.target_link).to_string()]
            })
            .field("insertTime", |op: &Operation| format_timestamp(&op.insert_time))
    })
}

fn check_scope(state: &ComputeState, project: &str, scope: &OperationScope) -> Outcome<()> {
    match scope {
        OperationScope::Global => Ok(()),
        OperationScope::Region(region) => state.check_region(project, region),
        OperationScope::Zone(zone) => state.check_zone(project, zone),
    }
}

/// `{global,region,zone}Operations.get`
pub fn get(state: &ComputeState, project: &str, scope: &OperationScope, name: &str) -> Outcome<Value> {
    check_scope(state, project, scope)?;
    let path = resource_path(project, scope, Operation::def().collection(), name);
    let op = state.operations.get_or_err(&path)?;
    Ok(to_json(op, &state.settings.base_url))
}

/// `{global,region,zone}Operations.wait`; operations never outlive the call
/// that created them, so this is `get`
pub fn wait(state: &ComputeState, project: &str, scope: &OperationScope, name: &str) -> Outcome<Value> {
    get(state, project, scope, name)
}

/// `{global,region,zone}Operations.list`
pub fn list(
    state: &ComputeState,
    project: &str,
    scope: &OperationScope,
    query: &ListQuery,
) -> Outcome<Value> {
    check_scope(state, project, scope)?;
    let collection = collection_path(project, scope, Operation::def().collection());
    let page = state.list_page(in_collection(&state.operations, &collection), query, fields())?;

    let mut body = Map::new();
    body.insert("kind".into(), json!(Operation::def().list_kind()));
    body.insert("id".into(), json!(collection));
    if !page.items.is_empty() {
        let items = page
            .items
            .iter()
            .map(|op| to_json(op, &state.settings.base_url))
            .collect();
        body.insert("items".into(), Value::Array(items));
    }
    body.insert("selfLink".into(), json!(state.link(&collection)));
    if let Some(token) = page.next_token {
        body.insert("nextPageToken".into(), json!(token));
    }
    Ok(Value::Object(body))
}
