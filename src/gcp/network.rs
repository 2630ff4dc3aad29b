//! VPC networks (global)

use std::sync::OnceLock;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::{
    Dependents, Dialect, ErrorEnvelope, FieldMap, HasDependents, OperationScope, OperationType,
    Outcome, Resource,
};

use super::json::to_object;
use super::links::global_path;
use super::{common_fields, now, require, validate_name, ComputeState, ListQuery};

const MIN_MTU: i64 = 1300;
const MAX_MTU: i64 = 8896;
const DEFAULT_MTU: i64 = 1460;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoutingConfig {
    pub routing_mode: String,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            routing_mode: "REGIONAL".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Network {
    pub kind: String,
    pub id: String,
    pub creation_timestamp: String,
    pub name: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub description: String,
    pub self_link: String,
    pub auto_create_subnetworks: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub subnetworks: Vec<String>,
    pub routing_config: RoutingConfig,
    pub mtu: i64,
    #[serde(skip)]
    pub path: String,
    #[serde(skip)]
    pub dependents: Dependents,
}

impl Resource for Network {
    const KIND: &'static str = "compute-networks";

    fn key(&self) -> &str {
        &self.path
    }
}

impl HasDependents for Network {
    fn dependents(&self) -> &Dependents {
        &self.dependents
    }

    fn dependents_mut(&mut self) -> &mut Dependents {
        &mut self.dependents
    }
}

/// Body of `networks.insert` and `networks.patch`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NetworkRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub auto_create_subnetworks: Option<bool>,
    pub routing_config: Option<RoutingConfig>,
    pub mtu: Option<i64>,
    #[serde(rename = "IPv4Range")]
    pub ipv4_range: Option<String>,
}

fn fields() -> &'static FieldMap<Network> {
    static FIELDS: OnceLock<FieldMap<Network>> = OnceLock::new();
    FIELDS.get_or_init(|| {
        common_fields(
            |n: &Network| n.name.as_str(),
            |n: &Network| n.id.as_str(),
            |n: &Network| n.description.as_str(),
            |n: &Network| n.creation_timestamp.as_str(),
            |n: &Network| n.self_link.as_str(),
        )
        .field("autoCreateSubnetworks", |n: &Network| {
            n.auto_create_subnetworks.to_string()
        })
        .field("mtu", |n: &Network| n.mtu.to_string())
        .field("routingConfig.routingMode", |n: &Network| {
            n.routing_config.routing_mode.clone()
        })
    })
}

fn validate_routing(routing: &RoutingConfig) -> Outcome<()> {
    match routing.routing_mode.as_str() {
        "REGIONAL" | "GLOBAL" => Ok(()),
        other => Err(ErrorEnvelope::invalid_value(
            Dialect::Gcp,
            format!("Invalid value for field 'routingConfig.routingMode': '{}'.", other),
        )),
    }
}

fn validate_mtu(mtu: i64) -> Outcome<()> {
    if (MIN_MTU..=MAX_MTU).contains(&mtu) {
        return Ok(());
    }
    Err(ErrorEnvelope::invalid_value(
        Dialect::Gcp,
        format!(
            "Invalid value for field 'mtu': '{}'. Must be between {} and {}.",
            mtu, MIN_MTU, MAX_MTU
        ),
    ))
}

/// networks.insert
pub fn insert(state: &mut ComputeState, project: &str, body: NetworkRequest) -> Outcome<Value> {
    let name = require("resource.name", &body.name)?;
    validate_name("resource.name", name)?;
    if body.ipv4_range.is_some() {
        return Err(ErrorEnvelope::invalid_value(
            Dialect::Gcp,
            "Legacy networks are not supported; omit 'IPv4Range'",
        ));
    }
    let routing_config = body.routing_config.clone().unwrap_or_default();
    validate_routing(&routing_config)?;
    let mtu = body.mtu.unwrap_or(DEFAULT_MTU);
    validate_mtu(mtu)?;

    let path = global_path(project, Network::def().collection(), name);
    state.networks.ensure_absent(&path)?;

    let network = Network {
        kind: Network::def().kind.clone().unwrap_or_default(),
        id: state.new_id(),
        creation_timestamp: now(),
        name: name.to_string(),
        description: body.description.unwrap_or_default(),
        self_link: state.link(&path),
        auto_create_subnetworks: body.auto_create_subnetworks.unwrap_or(true),
        subnetworks: Vec::new(),
        routing_config,
        mtu,
        path: path.clone(),
        dependents: Dependents::new(),
    };
    let id = network.id.clone();
    state.networks.put(network);

    Ok(state.record_operation(
        project,
        OperationScope::Global,
        OperationType::Insert,
        &path,
        Some(id),
    ))
}

/// networks.get
pub fn get(state: &ComputeState, project: &str, name: &str) -> Outcome<Value> {
    let path = global_path(project, Network::def().collection(), name);
    state.networks.get_or_err(&path).map(to_object)
}

/// networks.list
pub fn list(state: &ComputeState, project: &str, query: &ListQuery) -> Outcome<Value> {
    state.list_collection(&state.networks, project, &OperationScope::Global, query, fields())
}

/// networks.patch: description, routing mode, MTU, and auto to custom mode
pub fn patch(state: &mut ComputeState, project: &str, name: &str, body: NetworkRequest) -> Outcome<Value> {
    let path = global_path(project, Network::def().collection(), name);
    let current = state.networks.get_or_err(&path)?;

    if let Some(renamed) = body.name.as_deref().filter(|n| *n != name) {
        return Err(ErrorEnvelope::invalid_value(
            Dialect::Gcp,
            format!("Network name cannot be changed (got '{}')", renamed),
        ));
    }
    if let Some(routing) = &body.routing_config {
        validate_routing(routing)?;
    }
    if let Some(mtu) = body.mtu {
        validate_mtu(mtu)?;
    }
    if body.auto_create_subnetworks == Some(true) && !current.auto_create_subnetworks {
        return Err(ErrorEnvelope::invalid_value(
            Dialect::Gcp,
            "Custom mode networks cannot be switched to auto mode",
        ));
    }

    let network = state.networks.get_mut_or_err(&path)?;
    if let Some(description) = body.description {
        network.description = description;
    }
    if let Some(routing) = body.routing_config {
        network.routing_config = routing;
    }
    if let Some(mtu) = body.mtu {
        network.mtu = mtu;
    }
    if body.auto_create_subnetworks == Some(false) {
        network.auto_create_subnetworks = false;
    }
    let id = network.id.clone();

    Ok(state.record_operation(
        project,
        OperationScope::Global,
        OperationType::Patch,
        &path,
        Some(id),
    ))
}

/// networks.delete, refused while subnetworks, firewalls or instances use it
pub fn delete(state: &mut ComputeState, project: &str, name: &str) -> Outcome<Value> {
    let path = global_path(project, Network::def().collection(), name);
    let network = state.networks.delete_checked(&path)?;

    Ok(state.record_operation(
        project,
        OperationScope::Global,
        OperationType::Delete,
        &path,
        Some(network.id),
    ))
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;
    use serde_json::json;

    #[test]
    fn test_insert_returns_done_operation() {
        let mut s = state();
        let op = insert(&mut s, PROJECT, body(json!({"name": "vpc-a"}))).expect("insert");
        assert_eq!(op["kind"], "compute#operation");
        assert_eq!(op["status"], "DONE");
        assert_eq!(op["operationType"], "insert");
        assert_eq!(
            op["targetLink"],
            format!("{}/projects/demo/global/networks/vpc-a", crate::config::DEFAULT_BASE_URL)
        );

        let network = get(&s, PROJECT, "vpc-a").expect("get");
        assert_eq!(network["kind"], "compute#network");
        assert_eq!(network["autoCreateSubnetworks"], true);
        assert_eq!(network["mtu"], 1460);
        assert_eq!(network["id"], op["targetId"]);
        assert!(network.get("description").is_none());
    }

    #[test]
    fn test_duplicate_and_invalid_names() {
        let mut s = state();
        insert(&mut s, PROJECT, body(json!({"name": "vpc-a"}))).expect("insert");
        let err = insert(&mut s, PROJECT, body(json!({"name": "vpc-a"}))).unwrap_err();
        assert_eq!(err.code, "ALREADY_EXISTS");
        assert_eq!(err.http_status, 409);

        let err = insert(&mut s, PROJECT, body(json!({"name": "VPC"}))).unwrap_err();
        assert_eq!(err.code, "INVALID_ARGUMENT");
        let err = insert(&mut s, PROJECT, body(json!({}))).unwrap_err();
        assert_eq!(err.code, "INVALID_ARGUMENT");

        insert(&mut s, "other-project", body(json!({"name": "vpc-a"}))).expect("other project");
    }

    #[test]
    fn test_patch() {
        let mut s = state();
        insert(&mut s, PROJECT, body(json!({"name": "vpc-a", "autoCreateSubnetworks": false})))
            .expect("insert");
        patch(
            &mut s,
            PROJECT,
            "vpc-a",
            body(json!({"description": "main", "routingConfig": {"routingMode": "GLOBAL"}})),
        )
        .expect("patch");
        let network = get(&s, PROJECT, "vpc-a").expect("get");
        assert_eq!(network["description"], "main");
        assert_eq!(network["routingConfig"]["routingMode"], "GLOBAL");

        let err = patch(&mut s, PROJECT, "vpc-a", body(json!({"autoCreateSubnetworks": true})))
            .unwrap_err();
        assert_eq!(err.code, "INVALID_ARGUMENT");
        let err = patch(&mut s, PROJECT, "nope", body(json!({}))).unwrap_err();
        assert_eq!(err.code, "NOT_FOUND");
    }

    #[test]
    fn test_list_filter_and_delete() {
        let mut s = state();
        for name in ["alpha", "beta", "gamma"] {
            insert(&mut s, PROJECT, body(json!({"name": name}))).expect("insert");
        }
        let listed = list(&s, PROJECT, &query(Some("name ne \"b.*\""), None, None)).expect("list");
        assert_eq!(names(&listed), vec!["alpha", "gamma"]);
        assert_eq!(listed["kind"], "compute#networkList");

        delete(&mut s, PROJECT, "beta").expect("delete");
        let err = get(&s, PROJECT, "beta").unwrap_err();
        assert_eq!(err.http_status, 404);
        let err = delete(&mut s, PROJECT, "beta").unwrap_err();
        assert_eq!(err.code, "NOT_FOUND");
    }
}
