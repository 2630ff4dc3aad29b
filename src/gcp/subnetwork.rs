//! Subnetworks (regional)

use std::sync::OnceLock;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::cidr::Cidr;
use crate::core::{
    attach, detach, verify_parents, Dependents, DependsOn, Dialect, ErrorEnvelope, FieldMap,
    HasDependents, OperationScope, OperationType, Outcome, Resource,
};

use super::json::to_object;
use super::links::{global_path, regional_path, short_name};
use super::network::Network;
use super::{common_fields, link_values, now, require, validate_name, ComputeState, ListQuery};

/// Prefix lengths Compute accepts for a primary range
const MIN_PREFIX: u8 = 8;
const MAX_PREFIX: u8 = 29;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Subnetwork {
    pub kind: String,
    pub id: String,
    pub creation_timestamp: String,
    pub name: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub description: String,
    pub network: String,
    pub ip_cidr_range: String,
    pub gateway_address: String,
    pub region: String,
    pub self_link: String,
    pub private_ip_google_access: bool,
    pub purpose: String,
    pub stack_type: String,
    pub fingerprint: String,
    #[serde(skip)]
    pub range: Option<Cidr>,
    #[serde(skip)]
    pub path: String,
    #[serde(skip)]
    pub network_path: String,
    #[serde(skip)]
    pub dependents: Dependents,
}

impl Resource for Subnetwork {
    const KIND: &'static str = "compute-subnetworks";

    fn key(&self) -> &str {
        &self.path
    }
}

impl HasDependents for Subnetwork {
    fn dependents(&self) -> &Dependents {
        &self.dependents
    }

    fn dependents_mut(&mut self) -> &mut Dependents {
        &mut self.dependents
    }
}

impl DependsOn<Network> for Subnetwork {
    fn parent_keys(&self) -> Vec<String> {
        vec![self.network_path.clone()]
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SubnetworkRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub network: Option<String>,
    pub ip_cidr_range: Option<String>,
    pub private_ip_google_access: Option<bool>,
}

fn fields() -> &'static FieldMap<Subnetwork> {
    static FIELDS: OnceLock<FieldMap<Subnetwork>> = OnceLock::new();
    FIELDS.get_or_init(|| {
        common_fields(
            |s: &Subnetwork| s.name.as_str(),
            |s: &Subnetwork| s.id.as_str(),
            |s: &Subnetwork| s.description.as_str(),
            |s: &Subnetwork| s.creation_timestamp.as_str(),
            |s: &Subnetwork| s.self_link.as_str(),
        )
        .multi("network", |s: &Subnetwork| link_values(&s.network))
        .multi("region", |s: &Subnetwork| link_values(&s.region))
        .field("ipCidrRange", |s: &Subnetwork| s.ip_cidr_range.clone())
        .field("gatewayAddress", |s: &Subnetwork| s.gateway_address.clone())
        .field("privateIpGoogleAccess", |s: &Subnetwork| {
            s.private_ip_google_access.to_string()
        })
    })
}

fn parse_range(raw: &str) -> Outcome<Cidr> {
    let invalid = || {
        ErrorEnvelope::invalid_value(
            Dialect::Gcp,
            format!("Invalid IPCidrRange: {}", raw),
        )
    };
    let range: Cidr = raw.parse().map_err(|_| invalid())?;
    if !(MIN_PREFIX..=MAX_PREFIX).contains(&range.prefix()) {
        return Err(invalid());
    }
    Ok(range)
}

/// subnetworks.insert
pub fn insert(
    state: &mut ComputeState,
    project: &str,
    region: &str,
    body: SubnetworkRequest,
) -> Outcome<Value> {
    state.check_region(project, region)?;
    let name = require("resource.name", &body.name)?;
    validate_name("resource.name", name)?;
    let network_ref = require("resource.network", &body.network)?;
    let range = parse_range(require("resource.ipCidrRange", &body.ip_cidr_range)?)?;

    let path = regional_path(project, region, Subnetwork::def().collection(), name);
    state.subnetworks.ensure_absent(&path)?;
    let network_path = global_path(project, Network::def().collection(), short_name(network_ref));
    state.networks.get_or_err(&network_path)?;

    let overlapping = state.subnetworks.find(|s| {
        s.network_path == network_path && s.range.is_some_and(|r| r.overlaps(&range))
    });
    if let Some(existing) = overlapping {
        return Err(ErrorEnvelope::invalid_value(
            Dialect::Gcp,
            format!(
                "Invalid IPCidrRange: {} conflicts with existing subnetwork '{}' in region '{}'.",
                range,
                existing.name,
                short_name(&existing.region)
            ),
        ));
    }

    let gateway = range
        .host(1)
        .map(|ip| ip.to_string())
        .unwrap_or_default();
    let subnetwork = Subnetwork {
        kind: Subnetwork::def().kind.clone().unwrap_or_default(),
        id: state.new_id(),
        creation_timestamp: now(),
        name: name.to_string(),
        description: body.description.unwrap_or_default(),
        network: state.link(&network_path),
        ip_cidr_range: range.to_string(),
        gateway_address: gateway,
        region: state.link(&format!("projects/{}/regions/{}", project, region)),
        self_link: state.link(&path),
        private_ip_google_access: body.private_ip_google_access.unwrap_or(false),
        purpose: "PRIVATE".to_string(),
        stack_type: "IPV4_ONLY".to_string(),
        fingerprint: state.ids.hex_token(16),
        range: Some(range),
        path: path.clone(),
        network_path: network_path.clone(),
        dependents: Dependents::new(),
    };

    verify_parents(&subnetwork, &state.networks)?;
    attach(&subnetwork, &mut state.networks);
    if let Some(network) = state.networks.get_mut(&network_path) {
        network.subnetworks.push(subnetwork.self_link.clone());
    }
    let id = subnetwork.id.clone();
    state.subnetworks.put(subnetwork);

    Ok(state.record_operation(
        project,
        OperationScope::Region(region.to_string()),
        OperationType::Insert,
        &path,
        Some(id),
    ))
}

/// subnetworks.get
pub fn get(state: &ComputeState, project: &str, region: &str, name: &str) -> Outcome<Value> {
    let path = regional_path(project, region, Subnetwork::def().collection(), name);
    state.subnetworks.get_or_err(&path).map(to_object)
}

/// subnetworks.list
pub fn list(state: &ComputeState, project: &str, region: &str, query: &ListQuery) -> Outcome<Value> {
    state.check_region(project, region)?;
    state.list_collection(
        &state.subnetworks,
        project,
        &OperationScope::Region(region.to_string()),
        query,
        fields(),
    )
}

/// subnetworks.aggregatedList
pub fn aggregated_list(state: &ComputeState, project: &str, query: &ListQuery) -> Outcome<Value> {
    state.aggregated_list(&state.subnetworks, project, query, fields())
}

/// subnetworks.delete, refused while instances have interfaces in it
pub fn delete(state: &mut ComputeState, project: &str, region: &str, name: &str) -> Outcome<Value> {
    let path = regional_path(project, region, Subnetwork::def().collection(), name);
    let subnetwork = state.subnetworks.delete_checked(&path)?;

    detach(&subnetwork, &mut state.networks);
    if let Some(network) = state.networks.get_mut(&subnetwork.network_path) {
        network.subnetworks.retain(|link| *link != subnetwork.self_link);
    }

    Ok(state.record_operation(
        project,
        OperationScope::Region(region.to_string()),
        OperationType::Delete,
        &path,
        Some(subnetwork.id),
    ))
}
