//! Compute REST endpoints under `/compute/v1`

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};

use crate::core::{Dialect, ErrorEnvelope, OperationScope, Outcome};
use crate::gcp::json::error_body;
use crate::gcp::{disk, firewall, instance, network, operations, subnetwork};
use crate::gcp::{ComputeState, ListQuery};
use crate::state::AppState;

use super::sanitize_for_log;

type Project = Path<String>;
type ProjectName = Path<(String, String)>;
type ProjectScopeName = Path<(String, String, String)>;

pub(super) fn routes() -> Router<AppState> {
    Router::new()
        // networks
        .route(
            "/projects/{project}/global/networks",
            get(list_networks).post(insert_network),
        )
        .route(
            "/projects/{project}/global/networks/{name}",
            get(get_network).patch(patch_network).delete(delete_network),
        )
        // subnetworks
        .route(
            "/projects/{project}/regions/{region}/subnetworks",
            get(list_subnetworks).post(insert_subnetwork),
        )
        .route(
            "/projects/{project}/regions/{region}/subnetworks/{name}",
            get(get_subnetwork).delete(delete_subnetwork),
        )
        .route(
            "/projects/{project}/aggregated/subnetworks",
            get(aggregated_subnetworks),
        )
        // firewalls
        .route(
            "/projects/{project}/global/firewalls",
            get(list_firewalls).post(insert_firewall),
        )
        .route(
            "/projects/{project}/global/firewalls/{name}",
            get(get_firewall).delete(delete_firewall),
        )
        // disks
        .route(
            "/projects/{project}/zones/{zone}/disks",
            get(list_disks).post(insert_disk),
        )
        .route(
            "/projects/{project}/zones/{zone}/disks/{name}",
            get(get_disk).delete(delete_disk),
        )
        .route("/projects/{project}/zones/{zone}/disks/{name}/resize", post(resize_disk))
        .route(
            "/projects/{project}/zones/{zone}/disks/{name}/setLabels",
            post(set_disk_labels),
        )
        .route("/projects/{project}/aggregated/disks", get(aggregated_disks))
        // instances
        .route(
            "/projects/{project}/zones/{zone}/instances",
            get(list_instances).post(insert_instance),
        )
        .route(
            "/projects/{project}/zones/{zone}/instances/{name}",
            get(get_instance).delete(delete_instance),
        )
        .route(
            "/projects/{project}/zones/{zone}/instances/{name}/start",
            post(start_instance),
        )
        .route(
            "/projects/{project}/zones/{zone}/instances/{name}/stop",
            post(stop_instance),
        )
        .route("/projects/{project}/aggregated/instances", get(aggregated_instances))
        // operations
        .route("/projects/{project}/global/operations", get(list_global_operations))
        .route(
            "/projects/{project}/global/operations/{name}",
            get(get_global_operation),
        )
        .route(
            "/projects/{project}/global/operations/{name}/wait",
            post(wait_global_operation),
        )
        .route(
            "/projects/{project}/regions/{region}/operations",
            get(list_region_operations),
        )
        .route(
            "/projects/{project}/regions/{region}/operations/{name}",
            get(get_region_operation),
        )
        .route(
            "/projects/{project}/regions/{region}/operations/{name}/wait",
            post(wait_region_operation),
        )
        .route(
            "/projects/{project}/zones/{zone}/operations",
            get(list_zone_operations),
        )
        .route(
            "/projects/{project}/zones/{zone}/operations/{name}",
            get(get_zone_operation),
        )
        .route(
            "/projects/{project}/zones/{zone}/operations/{name}/wait",
            post(wait_zone_operation),
        )
}

fn respond(outcome: Outcome<Value>) -> Response {
    match outcome {
        Ok(body) => (StatusCode::OK, Json(body)).into_response(),
        Err(err) => {
            let status = StatusCode::from_u16(err.http_status).unwrap_or(StatusCode::BAD_REQUEST);
            (status, Json(error_body(&err))).into_response()
        }
    }
}

/// Decode a JSON request body; an empty body is an empty object
fn parse_body<T: DeserializeOwned + Default>(body: &Bytes) -> Outcome<T> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    debug!("Compute request body: {}", sanitize_for_log(&String::from_utf8_lossy(body)));
    serde_json::from_slice(body).map_err(|e| {
        ErrorEnvelope::invalid_value(Dialect::Gcp, format!("Invalid JSON payload received. {}", e))
    })
}

async fn read(state: &AppState, f: impl FnOnce(&ComputeState) -> Outcome<Value>) -> Response {
    let compute = state.compute.read().await;
    respond(f(&*compute))
}

async fn write(state: &AppState, f: impl FnOnce(&mut ComputeState) -> Outcome<Value>) -> Response {
    let mut compute = state.compute.write().await;
    let outcome = f(&mut *compute);
    if let Err(err) = &outcome {
        warn!("Compute mutation rejected: {}", err);
    }
    respond(outcome)
}

// networks

async fn list_networks(
    State(state): State<AppState>,
    Path(project): Project,
    Query(query): Query<ListQuery>,
) -> Response {
    read(&state, |s| network::list(s, &project, &query)).await
}

async fn insert_network(State(state): State<AppState>, Path(project): Project, body: Bytes) -> Response {
    write(&state, |s| network::insert(s, &project, parse_body(&body)?)).await
}

async fn get_network(State(state): State<AppState>, Path((project, name)): ProjectName) -> Response {
    read(&state, |s| network::get(s, &project, &name)).await
}

async fn patch_network(
    State(state): State<AppState>,
    Path((project, name)): ProjectName,
    body: Bytes,
) -> Response {
    write(&state, |s| network::patch(s, &project, &name, parse_body(&body)?)).await
}

async fn delete_network(State(state): State<AppState>, Path((project, name)): ProjectName) -> Response {
    write(&state, |s| network::delete(s, &project, &name)).await
}

// subnetworks

async fn list_subnetworks(
    State(state): State<AppState>,
    Path((project, region)): ProjectName,
    Query(query): Query<ListQuery>,
) -> Response {
    read(&state, |s| subnetwork::list(s, &project, &region, &query)).await
}

async fn insert_subnetwork(
    State(state): State<AppState>,
    Path((project, region)): ProjectName,
    body: Bytes,
) -> Response {
    write(&state, |s| subnetwork::insert(s, &project, &region, parse_body(&body)?)).await
}

async fn get_subnetwork(
    State(state): State<AppState>,
    Path((project, region, name)): ProjectScopeName,
) -> Response {
    read(&state, |s| subnetwork::get(s, &project, &region, &name)).await
}

async fn delete_subnetwork(
    State(state): State<AppState>,
    Path((project, region, name)): ProjectScopeName,
) -> Response {
    write(&state, |s| subnetwork::delete(s, &project, &region, &name)).await
}

async fn aggregated_subnetworks(
    State(state): State<AppState>,
    Path(project): Project,
    Query(query): Query<ListQuery>,
) -> Response {
    read(&state, |s| subnetwork::aggregated_list(s, &project, &query)).await
}

// firewalls

async fn list_firewalls(
    State(state): State<AppState>,
    Path(project): Project,
    Query(query): Query<ListQuery>,
) -> Response {
    read(&state, |s| firewall::list(s, &project, &query)).await
}

async fn insert_firewall(State(state): State<AppState>, Path(project): Project, body: Bytes) -> Response {
    write(&state, |s| firewall::insert(s, &project, parse_body(&body)?)).await
}

async fn get_firewall(State(state): State<AppState>, Path((project, name)): ProjectName) -> Response {
    read(&state, |s| firewall::get(s, &project, &name)).await
}

async fn delete_firewall(State(state): State<AppState>, Path((project, name)): ProjectName) -> Response {
    write(&state, |s| firewall::delete(s, &project, &name)).await
}

// disks

async fn list_disks(
    State(state): State<AppState>,
    Path((project, zone)): ProjectName,
    Query(query): Query<ListQuery>,
) -> Response {
    read(&state, |s| disk::list(s, &project, &zone, &query)).await
}

async fn insert_disk(
    State(state): State<AppState>,
    Path((project, zone)): ProjectName,
    body: Bytes,
) -> Response {
    write(&state, |s| disk::insert(s, &project, &zone, parse_body(&body)?)).await
}

async fn get_disk(State(state): State<AppState>, Path((project, zone, name)): ProjectScopeName) -> Response {
    read(&state, |s| disk::get(s, &project, &zone, &name)).await
}

async fn delete_disk(
    State(state): State<AppState>,
    Path((project, zone, name)): ProjectScopeName,
) -> Response {
    write(&state, |s| disk::delete(s, &project, &zone, &name)).await
}

async fn resize_disk(
    State(state): State<AppState>,
    Path((project, zone, name)): ProjectScopeName,
    body: Bytes,
) -> Response {
    write(&state, |s| disk::resize(s, &project, &zone, &name, parse_body(&body)?)).await
}

async fn set_disk_labels(
    State(state): State<AppState>,
    Path((project, zone, name)): ProjectScopeName,
    body: Bytes,
) -> Response {
    write(&state, |s| disk::set_labels(s, &project, &zone, &name, parse_body(&body)?)).await
}

async fn aggregated_disks(
    State(state): State<AppState>,
    Path(project): Project,
    Query(query): Query<ListQuery>,
) -> Response {
    read(&state, |s| disk::aggregated_list(s, &project, &query)).await
}

// instances

async fn list_instances(
    State(state): State<AppState>,
    Path((project, zone)): ProjectName,
    Query(query): Query<ListQuery>,
) -> Response {
    read(&state, |s| instance::list(s, &project, &zone, &query)).await
}

async fn insert_instance(
    State(state): State<AppState>,
    Path((project, zone)): ProjectName,
    body: Bytes,
) -> Response {
    write(&state, |s| instance::insert(s, &project, &zone, parse_body(&body)?)).await
}

async fn get_instance(
    State(state): State<AppState>,
    Path((project, zone, name)): ProjectScopeName,
) -> Response {
    read(&state, |s| instance::get(s, &project, &zone, &name)).await
}

async fn delete_instance(
    State(state): State<AppState>,
    Path((project, zone, name)): ProjectScopeName,
) -> Response {
    write(&state, |s| instance::delete(s, &project, &zone, &name)).await
}

async fn start_instance(
    State(state): State<AppState>,
    Path((project, zone, name)): ProjectScopeName,
) -> Response {
    write(&state, |s| instance::start(s, &project, &zone, &name)).await
}

async fn stop_instance(
    State(state): State<AppState>,
    Path((project, zone, name)): ProjectScopeName,
) -> Response {
    write(&state, |s| instance::stop(s, &project, &zone, &name)).await
}

async fn aggregated_instances(
    State(state): State<AppState>,
    Path(project): Project,
    Query(query): Query<ListQuery>,
) -> Response {
    read(&state, |s| instance::aggregated_list(s, &project, &query)).await
}

// operations

async fn list_global_operations(
    State(state): State<AppState>,
    Path(project): Project,
    Query(query): Query<ListQuery>,
) -> Response {
    read(&state, |s| operations::list(s, &project, &OperationScope::Global, &query)).await
}

async fn get_global_operation(
    State(state): State<AppState>,
    Path((project, name)): ProjectName,
) -> Response {
    read(&state, |s| operations::get(s, &project, &OperationScope::Global, &name)).await
}

async fn wait_global_operation(
    State(state): State<AppState>,
    Path((project, name)): ProjectName,
) -> Response {
    read(&state, |s| operations::wait(s, &project, &OperationScope::Global, &name)).await
}

async fn list_region_operations(
    State(state): State<AppState>,
    Path((project, region)): ProjectName,
    Query(query): Query<ListQuery>,
) -> Response {
    let scope = OperationScope::Region(region);
    read(&state, |s| operations::list(s, &project, &scope, &query)).await
}

async fn get_region_operation(
    State(state): State<AppState>,
    Path((project, region, name)): ProjectScopeName,
) -> Response {
    let scope = OperationScope::Region(region);
    read(&state, |s| operations::get(s, &project, &scope, &name)).await
}

async fn wait_region_operation(
    State(state): State<AppState>,
    Path((project, region, name)): ProjectScopeName,
) -> Response {
    let scope = OperationScope::Region(region);
    read(&state, |s| operations::wait(s, &project, &scope, &name)).await
}

async fn list_zone_operations(
    State(state): State<AppState>,
    Path((project, zone)): ProjectName,
    Query(query): Query<ListQuery>,
) -> Response {
    let scope = OperationScope::Zone(zone);
    read(&state, |s| operations::list(s, &project, &scope, &query)).await
}

async fn get_zone_operation(
    State(state): State<AppState>,
    Path((project, zone, name)): ProjectScopeName,
) -> Response {
    let scope = OperationScope::Zone(zone);
    read(&state, |s| operations::get(s, &project, &scope, &name)).await
}

async fn wait_zone_operation(
    State(state): State<AppState>,
    Path((project, zone, name)): ProjectScopeName,
) -> Response {
    let scope = OperationScope::Zone(zone);
    read(&state, |s| operations::wait(s, &project, &scope, &name)).await
}
