//! VM instances (zonal)
//!
//! An instance references disks, networks and subnetworks. Insert resolves
//! and validates every reference before anything is stored, so a rejected
//! request leaves no partial disks or edges behind.

use std::collections::BTreeMap;
use std::net::Ipv4Addr;
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::store::{already_exists, not_found};
use crate::core::{
    attach, detach, has_dependents, DependsOn, Dialect, ErrorEnvelope, ErrorKind, FieldMap,
    OperationScope, OperationType, Outcome, Resource,
};

use super::disk::{self, Disk, DiskRequest};
use super::json::{int64_string, to_object};
use super::links::{collection_path, global_path, region_of, regional_path, segment_after, short_name, zonal_path};
use super::network::Network;
use super::subnetwork::Subnetwork;
use super::{
    common_fields, in_collection, label_fingerprint, link_values, now, require, validate_labels,
    validate_name, with_label_fields, ComputeState, ListQuery,
};

const MACHINE_TYPES: &[&str] = &[
    "f1-micro",
    "g1-small",
    "e2-micro",
    "e2-small",
    "e2-medium",
    "e2-standard-2",
    "e2-standard-4",
    "e2-standard-8",
    "n1-standard-1",
    "n1-standard-2",
    "n1-standard-4",
    "n1-standard-8",
    "n2-standard-2",
    "n2-standard-4",
    "n2-standard-8",
    "c2-standard-4",
];

const READ_WRITE: &str = "READ_WRITE";
const READ_ONLY: &str = "READ_ONLY";
const DEFAULT_NETWORK: &str = "default";

/// .0 is the network address and .1 the gateway
const FIRST_HOST: u32 = 2;
/// The last two addresses of a range are reserved as well
const RESERVED_TAIL: u64 = 2;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachedDisk {
    pub kind: String,
    #[serde(rename = "type")]
    pub attachment_type: String,
    pub mode: String,
    pub source: String,
    pub device_name: String,
    pub index: usize,
    pub boot: bool,
    pub auto_delete: bool,
    pub interface: String,
    #[serde(serialize_with = "int64_string")]
    pub disk_size_gb: u64,
    #[serde(skip)]
    pub path: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessConfig {
    pub kind: String,
    pub name: String,
    #[serde(rename = "type")]
    pub config_type: String,
    pub network_tier: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkInterface {
    pub kind: String,
    pub name: String,
    pub network: String,
    pub subnetwork: String,
    #[serde(rename = "networkIP")]
    pub network_ip: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub access_configs: Vec<AccessConfig>,
    pub stack_type: String,
    pub fingerprint: String,
    #[serde(skip)]
    pub network_path: String,
    #[serde(skip)]
    pub subnetwork_path: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Tags {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub items: Vec<String>,
    pub fingerprint: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Instance {
    pub kind: String,
    pub id: String,
    pub creation_timestamp: String,
    pub name: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub description: String,
    pub zone: String,
    pub machine_type: String,
    pub status: String,
    pub self_link: String,
    pub can_ip_forward: bool,
    pub deletion_protection: bool,
    pub disks: Vec<AttachedDisk>,
    pub network_interfaces: Vec<NetworkInterface>,
    pub tags: Tags,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    pub label_fingerprint: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_start_timestamp: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_stop_timestamp: Option<String>,
    #[serde(skip)]
    pub path: String,
}

impl Resource for Instance {
    const KIND: &'static str = "compute-instances";

    fn key(&self) -> &str {
        &self.path
    }
}

impl DependsOn<Disk> for Instance {
    fn parent_keys(&self) -> Vec<String> {
        self.disks.iter().map(|d| d.path.clone()).collect()
    }
}

impl DependsOn<Network> for Instance {
    fn parent_keys(&self) -> Vec<String> {
        self.network_interfaces
            .iter()
            .map(|nic| nic.network_path.clone())
            .collect()
    }
}

impl DependsOn<Subnetwork> for Instance {
    fn parent_keys(&self) -> Vec<String> {
        self.network_interfaces
            .iter()
            .map(|nic| nic.subnetwork_path.clone())
            .collect()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AttachedDiskRequest {
    pub source: Option<String>,
    pub initialize_params: Option<DiskRequest>,
    pub boot: Option<bool>,
    pub auto_delete: Option<bool>,
    pub mode: Option<String>,
    pub device_name: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AccessConfigRequest {
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub config_type: Option<String>,
    pub network_tier: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NetworkInterfaceRequest {
    pub network: Option<String>,
    pub subnetwork: Option<String>,
    #[serde(rename = "networkIP")]
    pub network_ip: Option<String>,
    pub access_configs: Option<Vec<AccessConfigRequest>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TagsRequest {
    pub items: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct InstanceRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub machine_type: Option<String>,
    pub disks: Option<Vec<AttachedDiskRequest>>,
    pub network_interfaces: Option<Vec<NetworkInterfaceRequest>>,
    pub tags: Option<TagsRequest>,
    pub labels: Option<BTreeMap<String, String>>,
    pub can_ip_forward: Option<bool>,
    pub deletion_protection: Option<bool>,
}

fn fields() -> &'static FieldMap<Instance> {
    static FIELDS: OnceLock<FieldMap<Instance>> = OnceLock::new();
    FIELDS.get_or_init(|| {
        let fields = common_fields(
            |i: &Instance| i.name.as_str(),
            |i: &Instance| i.id.as_str(),
            |i: &Instance| i.description.as_str(),
            |i: &Instance| i.creation_timestamp.as_str(),
            |i: &Instance| i.self_link.as_str(),
        )
        .multi("zone", |i: &Instance| link_values(&i.zone))
        .multi("machineType", |i: &Instance| link_values(&i.machine_type))
        .field("status", |i: &Instance| i.status.clone())
        .field("canIpForward", |i: &Instance| i.can_ip_forward.to_string())
        .field("deletionProtection", |i: &Instance| i.deletion_protection.to_string())
        .multi("tags.items", |i: &Instance| i.tags.items.clone())
        .multi("networkInterfaces.networkIP", |i: &Instance| {
            i.network_interfaces.iter().map(|n| n.network_ip.clone()).collect()
        })
        .multi("networkInterfaces.network", |i: &Instance| {
            i.network_interfaces
                .iter()
                .flat_map(|n| link_values(&n.network))
                .collect()
        })
        .multi("networkInterfaces.subnetwork", |i: &Instance| {
            i.network_interfaces
                .iter()
                .flat_map(|n| link_values(&n.subnetwork))
                .collect()
        })
        .multi("disks.source", |i: &Instance| {
            i.disks.iter().flat_map(|d| link_values(&d.source)).collect()
        });
        with_label_fields(fields, |i: &Instance| &i.labels)
    })
}

fn invalid(message: String) -> ErrorEnvelope {
    ErrorEnvelope::invalid_value(Dialect::Gcp, message)
}

fn instance_path(project: &str, zone: &str, name: &str) -> String {
    zonal_path(project, zone, Instance::def().collection(), name)
}

fn resolve_machine_type(state: &ComputeState, project: &str, zone: &str, raw: &str) -> Outcome<String> {
    let name = short_name(raw);
    let path = format!("projects/{}/zones/{}/machineTypes/{}", project, zone, name);
    if !MACHINE_TYPES.contains(&name) {
        return Err(ErrorEnvelope::of(
            Dialect::Gcp,
            ErrorKind::NotFound,
            format!("The resource '{}' was not found", path),
        ));
    }
    Ok(state.link(&path))
}

/// Attached disks plus the disks `initializeParams` asks to create
fn resolve_disks(
    state: &mut ComputeState,
    project: &str,
    zone: &str,
    instance_name: &str,
    requests: &[AttachedDiskRequest],
) -> Outcome<(Vec<AttachedDisk>, Vec<Disk>)> {
    if requests.is_empty() {
        return Err(invalid("At least one disk must be attached to an instance".to_string()));
    }

    let mut attached: Vec<AttachedDisk> = Vec::new();
    let mut created: Vec<Disk> = Vec::new();

    for (index, request) in requests.iter().enumerate() {
        let mode = request.mode.as_deref().unwrap_or(READ_WRITE);
        if mode != READ_WRITE && mode != READ_ONLY {
            return Err(invalid(format!(
                "Invalid value for field 'resource.disks[{}].mode': '{}'.",
                index, mode
            )));
        }

        let (path, self_link, size_gb, auto_delete) =
            match (&request.source, &request.initialize_params) {
                (Some(source), None) => {
                    if let Some(disk_zone) = segment_after(source, "zones") {
                        if disk_zone != zone {
                            return Err(invalid(format!(
                                "Disk '{}' is in zone '{}'; instances can only attach disks from '{}'",
                                short_name(source),
                                disk_zone,
                                zone
                            )));
                        }
                    }
                    let path = zonal_path(project, zone, Disk::def().collection(), short_name(source));
                    let disk = state.disks.get_or_err(&path)?;
                    if let Some(user) = disk.conflicting_user(mode == READ_WRITE) {
                        return Err(ErrorEnvelope::precondition(
                            Dialect::Gcp,
                            format!(
                                "The disk resource '{}' is already being used by '{}'",
                                path,
                                short_name(user)
                            ),
                        ));
                    }
                    (
                        path,
                        disk.self_link.clone(),
                        disk.size_gb,
                        request.auto_delete.unwrap_or(false),
                    )
                }
                (None, Some(params)) => {
                    let name = match &params.name {
                        Some(name) => name.clone(),
                        None if index == 0 => instance_name.to_string(),
                        None => format!("{}-{}", instance_name, index),
                    };
                    let new_disk = disk::build(state, project, zone, &name, params)?;
                    if created.iter().any(|d| d.path == new_disk.path) {
                        return Err(already_exists::<Disk>(&new_disk.path));
                    }
                    let result = (
                        new_disk.path.clone(),
                        new_disk.self_link.clone(),
                        new_disk.size_gb,
                        request.auto_delete.unwrap_or(true),
                    );
                    created.push(new_disk);
                    result
                }
                _ => {
                    return Err(invalid(format!(
                        "Exactly one of 'source' or 'initializeParams' must be set on 'resource.disks[{}]'",
                        index
                    )))
                }
            };

        if attached.iter().any(|d| d.path == path) {
            return Err(invalid(format!("Disk '{}' is attached more than once", path)));
        }
        attached.push(AttachedDisk {
            kind: "compute#attachedDisk".to_string(),
            attachment_type: "PERSISTENT".to_string(),
            mode: mode.to_string(),
            device_name: request
                .device_name
                .clone()
                .unwrap_or_else(|| short_name(&path).to_string()),
            source: self_link,
            index,
            boot: request.boot.unwrap_or(index == 0),
            auto_delete,
            interface: "SCSI".to_string(),
            disk_size_gb: size_gb,
            path,
        });
    }

    if attached.iter().filter(|d| d.boot).count() > 1 {
        return Err(invalid("Only one disk can be marked as boot".to_string()));
    }
    Ok((attached, created))
}

/// Addresses already handed out in a subnetwork
fn addresses_in_use(state: &ComputeState, subnetwork_path: &str) -> Vec<Ipv4Addr> {
    state
        .instances
        .values()
        .into_iter()
        .flat_map(|i| i.network_interfaces.iter())
        .filter(|nic| nic.subnetwork_path == subnetwork_path)
        .filter_map(|nic| nic.network_ip.parse().ok())
        .collect()
}

fn allocate_address(
    state: &ComputeState,
    subnetwork: &Subnetwork,
    requested: Option<&str>,
) -> Outcome<Ipv4Addr> {
    let range = subnetwork.range.ok_or_else(|| {
        invalid(format!("Subnetwork '{}' has no primary range", subnetwork.name))
    })?;
    let taken = addresses_in_use(state, &subnetwork.path);
    let last = u32::try_from(range.size().saturating_sub(RESERVED_TAIL)).unwrap_or(u32::MAX);

    if let Some(raw) = requested {
        let addr: Ipv4Addr = raw.parse().map_err(|_| {
            invalid(format!("Invalid value for field 'networkIP': '{}'.", raw))
        })?;
        let usable = range
            .offset_of(addr)
            .is_some_and(|offset| (FIRST_HOST..last).contains(&offset));
        if !usable {
            return Err(invalid(format!(
                "Requested internal IP address '{}' is outside the usable range of subnetwork '{}' ({})",
                addr, subnetwork.name, range
            )));
        }
        if taken.contains(&addr) {
            return Err(ErrorEnvelope::precondition(
                Dialect::Gcp,
                format!("IP '{}' is already being used by another resource", addr),
            ));
        }
        return Ok(addr);
    }

    (FIRST_HOST..last)
        .filter_map(|offset| range.host(offset))
        .find(|addr| !taken.contains(addr))
        .ok_or_else(|| {
            ErrorEnvelope::precondition(
                Dialect::Gcp,
                format!("Subnetwork '{}' has no free addresses", subnetwork.name),
            )
        })
}

fn resolve_interfaces(
    state: &mut ComputeState,
    project: &str,
    zone: &str,
    requests: &[NetworkInterfaceRequest],
) -> Outcome<Vec<NetworkInterface>> {
    let region = region_of(zone);
    let defaulted = [NetworkInterfaceRequest::default()];
    let requests = if requests.is_empty() { &defaulted[..] } else { requests };
    let mut interfaces: Vec<NetworkInterface> = Vec::new();

    for (index, request) in requests.iter().enumerate() {
        let subnetwork = match &request.subnetwork {
            Some(sub_ref) => {
                if let Some(sub_region) = segment_after(sub_ref, "regions") {
                    if sub_region != region {
                        return Err(invalid(format!(
                            "Subnetwork '{}' is in region '{}', instance zone '{}' is in '{}'",
                            short_name(sub_ref),
                            sub_region,
                            zone,
                            region
                        )));
                    }
                }
                let path = regional_path(
                    project,
                    &region,
                    Subnetwork::def().collection(),
                    short_name(sub_ref),
                );
                let subnetwork = state.subnetworks.get_or_err(&path)?;
                if let Some(net_ref) = &request.network {
                    let net_path = global_path(project, Network::def().collection(), short_name(net_ref));
                    if net_path != subnetwork.network_path {
                        return Err(invalid(format!(
                            "Subnetwork '{}' does not belong to network '{}'",
                            subnetwork.name,
                            short_name(net_ref)
                        )));
                    }
                }
                subnetwork
            }
            None => {
                let net_ref = request.network.as_deref().unwrap_or(DEFAULT_NETWORK);
                let net_path = global_path(project, Network::def().collection(), short_name(net_ref));
                state.networks.get_or_err(&net_path)?;
                let in_region = collection_path(
                    project,
                    &OperationScope::Region(region.clone()),
                    Subnetwork::def().collection(),
                );
                in_collection(&state.subnetworks, &in_region)
                    .into_iter()
                    .find(|s| s.network_path == net_path)
                    .ok_or_else(|| {
                        invalid(format!(
                            "Network '{}' has no subnetwork in region '{}'",
                            short_name(net_ref),
                            region
                        ))
                    })?
            }
        };

        if interfaces.iter().any(|nic| nic.network_path == subnetwork.network_path) {
            return Err(invalid(format!(
                "Network interfaces must be in different networks (network '{}')",
                short_name(&subnetwork.network)
            )));
        }
        let address = allocate_address(state, subnetwork, request.network_ip.as_deref())?;

        let access_configs = request
            .access_configs
            .iter()
            .flatten()
            .map(|ac| AccessConfig {
                kind: "compute#accessConfig".to_string(),
                name: ac.name.clone().unwrap_or_else(|| "External NAT".to_string()),
                config_type: ac
                    .config_type
                    .clone()
                    .unwrap_or_else(|| "ONE_TO_ONE_NAT".to_string()),
                network_tier: ac.network_tier.clone().unwrap_or_else(|| "PREMIUM".to_string()),
            })
            .collect();

        let (network, subnetwork_link, network_path, subnetwork_path) = (
            subnetwork.network.clone(),
            subnetwork.self_link.clone(),
            subnetwork.network_path.clone(),
            subnetwork.path.clone(),
        );
        interfaces.push(NetworkInterface {
            kind: "compute#networkInterface".to_string(),
            name: format!("nic{}", index),
            network,
            subnetwork: subnetwork_link,
            network_ip: address.to_string(),
            access_configs,
            stack_type: "IPV4_ONLY".to_string(),
            fingerprint: state.ids.hex_token(16),
            network_path,
            subnetwork_path,
        });
    }

    Ok(interfaces)
}

/// instances.insert
pub fn insert(state: &mut ComputeState, project: &str, zone: &str, body: InstanceRequest) -> Outcome<Value> {
    state.check_zone(project, zone)?;
    let name = require("resource.name", &body.name)?;
    validate_name("resource.name", name)?;
    let path = instance_path(project, zone, name);
    state.instances.ensure_absent(&path)?;

    let machine_type = resolve_machine_type(
        state,
        project,
        zone,
        require("resource.machineType", &body.machine_type)?,
    )?;
    let labels = body.labels.clone().unwrap_or_default();
    validate_labels(&labels)?;

    let (disks, created) = resolve_disks(state, project, zone, name, body.disks.as_deref().unwrap_or(&[]))?;
    let network_interfaces = resolve_interfaces(
        state,
        project,
        zone,
        body.network_interfaces.as_deref().unwrap_or(&[]),
    )?;

    let started = now();
    let instance = Instance {
        kind: Instance::def().kind.clone().unwrap_or_default(),
        id: state.new_id(),
        creation_timestamp: started.clone(),
        name: name.to_string(),
        description: body.description.clone().unwrap_or_default(),
        zone: state.link(&format!("projects/{}/zones/{}", project, zone)),
        machine_type,
        status: "RUNNING".to_string(),
        self_link: state.link(&path),
        can_ip_forward: body.can_ip_forward.unwrap_or(false),
        deletion_protection: body.deletion_protection.unwrap_or(false),
        disks,
        network_interfaces,
        tags: Tags {
            items: body.tags.as_ref().and_then(|t| t.items.clone()).unwrap_or_default(),
            fingerprint: state.ids.hex_token(16),
        },
        label_fingerprint: label_fingerprint(&labels),
        labels,
        last_start_timestamp: Some(started),
        last_stop_timestamp: None,
        path: path.clone(),
    };

    for disk in created {
        state.disks.put(disk);
    }
    attach::<Instance, Disk>(&instance, &mut state.disks);
    attach::<Instance, Network>(&instance, &mut state.networks);
    attach::<Instance, Subnetwork>(&instance, &mut state.subnetworks);
    for attached in &instance.disks {
        if let Some(disk) = state.disks.get_mut(&attached.path) {
            disk.add_user(&instance.self_link, attached.mode == READ_WRITE);
        }
    }
    let id = instance.id.clone();
    state.instances.put(instance);

    Ok(state.record_operation(
        project,
        OperationScope::Zone(zone.to_string()),
        OperationType::Insert,
        &path,
        Some(id),
    ))
}

/// instances.get
pub fn get(state: &ComputeState, project: &str, zone: &str, name: &str) -> Outcome<Value> {
    state
        .instances
        .get_or_err(&instance_path(project, zone, name))
        .map(to_object)
}

/// instances.list
pub fn list(state: &ComputeState, project: &str, zone: &str, query: &ListQuery) -> Outcome<Value> {
    state.check_zone(project, zone)?;
    state.list_collection(
        &state.instances,
        project,
        &OperationScope::Zone(zone.to_string()),
        query,
        fields(),
    )
}

/// instances.aggregatedList
pub fn aggregated_list(state: &ComputeState, project: &str, query: &ListQuery) -> Outcome<Value> {
    state.aggregated_list(&state.instances, project, query, fields())
}

/// instances.delete
///
/// Detaches every edge, then removes `autoDelete` disks nothing else uses.
pub fn delete(state: &mut ComputeState, project: &str, zone: &str, name: &str) -> Outcome<Value> {
    let path = instance_path(project, zone, name);
    let current = state.instances.get_or_err(&path)?;
    if current.deletion_protection {
        return Err(ErrorEnvelope::precondition(
            Dialect::Gcp,
            format!(
                "Invalid resource usage: 'Resource cannot be deleted if it's protected against deletion: {}'",
                path
            ),
        ));
    }
    let instance = state
        .instances
        .delete(&path)
        .ok_or_else(|| not_found::<Instance>(&path))?;

    detach::<Instance, Disk>(&instance, &mut state.disks);
    detach::<Instance, Network>(&instance, &mut state.networks);
    detach::<Instance, Subnetwork>(&instance, &mut state.subnetworks);

    for attached in &instance.disks {
        let orphaned = match state.disks.get_mut(&attached.path) {
            Some(disk) => {
                disk.remove_user(&instance.self_link);
                !has_dependents(disk)
            }
            None => false,
        };
        if attached.auto_delete && orphaned {
            state.disks.delete(&attached.path);
        }
    }

    Ok(state.record_operation(
        project,
        OperationScope::Zone(zone.to_string()),
        OperationType::Delete,
        &path,
        Some(instance.id),
    ))
}

fn set_status(
    state: &mut ComputeState,
    project: &str,
    zone: &str,
    name: &str,
    operation_type: OperationType,
) -> Outcome<Value> {
    let path = instance_path(project, zone, name);
    let instance = state.instances.get_mut_or_err(&path)?;
    match operation_type {
        OperationType::Start => {
            instance.status = "RUNNING".to_string();
            instance.last_start_timestamp = Some(now());
        }
        _ => {
            instance.status = "TERMINATED".to_string();
            instance.last_stop_timestamp = Some(now());
        }
    }
    let id = instance.id.clone();

    Ok(state.record_operation(
        project,
        OperationScope::Zone(zone.to_string()),
        operation_type,
        &path,
        Some(id),
    ))
}

/// instances.start
pub fn start(state: &mut ComputeState, project: &str, zone: &str, name: &str) -> Outcome<Value> {
    set_status(state, project, zone, name, OperationType::Start)
}

/// instances.stop
pub fn stop(state: &mut ComputeState, project: &str, zone: &str, name: &str) -> Outcome<Value> {
    set_status(state, project, zone, name, OperationType::Stop)
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::super::{network, subnetwork};
    use super::*;
    use serde_json::json;

    fn setup() -> ComputeState {
        let mut s = state();
        network::insert(&mut s, PROJECT, body(json!({"name": "default"}))).expect("network");
        subnetwork::insert(
            &mut s,
            PROJECT,
            REGION,
            body(json!({"name": "default", "network": "default", "ipCidrRange": "10.128.0.0/20"})),
        )
        .expect("subnetwork");
        s
    }

    fn vm(name: &str) -> Value {
        json!({
            "name": name,
            "machineType": "zones/us-central1-a/machineTypes/e2-micro",
            "disks": [{"boot": true, "initializeParams": {"diskSizeGb": "20"}}],
        })
    }

    #[test]
    fn test_insert_creates_boot_disk_and_address() {
        let mut s = setup();
        let op = insert(&mut s, PROJECT, ZONE, body(vm("web-1"))).expect("insert");
        assert_eq!(op["status"], "DONE");

        let inst = get(&s, PROJECT, ZONE, "web-1").expect("get");
        assert_eq!(inst["status"], "RUNNING");
        assert_eq!(inst["networkInterfaces"][0]["networkIP"], "10.128.0.2");
        assert_eq!(inst["disks"][0]["boot"], true);
        assert_eq!(inst["disks"][0]["autoDelete"], true);

        let disk = disk::get(&s, PROJECT, ZONE, "web-1").expect("boot disk");
        assert_eq!(disk["sizeGb"], "20");
        assert_eq!(disk["users"][0], inst["selfLink"]);

        insert(&mut s, PROJECT, ZONE, body(vm("web-2"))).expect("second");
        let second = get(&s, PROJECT, ZONE, "web-2").expect("get");
        assert_eq!(second["networkInterfaces"][0]["networkIP"], "10.128.0.3");
    }

    #[test]
    fn test_references_block_parent_deletes() {
        let mut s = setup();
        insert(&mut s, PROJECT, ZONE, body(vm("web-1"))).expect("insert");

        assert_eq!(disk::delete(&mut s, PROJECT, ZONE, "web-1").unwrap_err().code, "FAILED_PRECONDITION");
        assert_eq!(
            subnetwork::delete(&mut s, PROJECT, REGION, "default").unwrap_err().code,
            "FAILED_PRECONDITION"
        );

        delete(&mut s, PROJECT, ZONE, "web-1").expect("delete instance");
        assert_eq!(disk::get(&s, PROJECT, ZONE, "web-1").unwrap_err().code, "NOT_FOUND");
        subnetwork::delete(&mut s, PROJECT, REGION, "default").expect("subnetwork free");
        network::delete(&mut s, PROJECT, "default").expect("network free");
    }

    #[test]
    fn test_source_disk_survives_and_is_exclusive() {
        let mut s = setup();
        disk::insert(&mut s, PROJECT, ZONE, body(json!({"name": "data"}))).expect("disk");
        let with_data = |name: &str| {
            json!({
                "name": name,
                "machineType": "e2-small",
                "disks": [
                    {"boot": true, "initializeParams": {}},
                    {"source": "projects/demo/zones/us-central1-a/disks/data"}
                ],
            })
        };
        insert(&mut s, PROJECT, ZONE, body(with_data("a"))).expect("first user");
        let err = insert(&mut s, PROJECT, ZONE, body(with_data("b"))).unwrap_err();
        assert_eq!(err.code, "FAILED_PRECONDITION");
        assert!(disk::get(&s, PROJECT, ZONE, "b").is_err(), "rejected insert created a disk");

        delete(&mut s, PROJECT, ZONE, "a").expect("delete");
        let data = disk::get(&s, PROJECT, ZONE, "data").expect("source disk kept");
        assert!(data.get("users").is_none());
        assert!(disk::get(&s, PROJECT, ZONE, "a").is_err());
    }

    #[test]
    fn test_read_only_attachments_share_but_exclude_writers() {
        let mut s = setup();
        disk::insert(&mut s, PROJECT, ZONE, body(json!({"name": "data"}))).expect("disk");
        let with_data = |name: &str, mode: &str| {
            json!({
                "name": name,
                "machineType": "e2-small",
                "disks": [
                    {"boot": true, "initializeParams": {}},
                    {"source": "data", "mode": mode}
                ],
            })
        };

        insert(&mut s, PROJECT, ZONE, body(with_data("ro-1", "READ_ONLY"))).expect("first reader");
        insert(&mut s, PROJECT, ZONE, body(with_data("ro-2", "READ_ONLY"))).expect("second reader");
        let err = insert(&mut s, PROJECT, ZONE, body(with_data("rw", "READ_WRITE"))).unwrap_err();
        assert_eq!(err.code, "FAILED_PRECONDITION");

        delete(&mut s, PROJECT, ZONE, "ro-1").expect("delete");
        delete(&mut s, PROJECT, ZONE, "ro-2").expect("delete");
        insert(&mut s, PROJECT, ZONE, body(with_data("rw", "READ_WRITE"))).expect("writer");
        let err = insert(&mut s, PROJECT, ZONE, body(with_data("ro-3", "READ_ONLY"))).unwrap_err();
        assert_eq!(err.code, "FAILED_PRECONDITION");
        assert!(err.message.contains("rw"));
    }

    #[test]
    fn test_insert_validation() {
        let mut s = setup();
        let mut bad_type = vm("x");
        bad_type["machineType"] = json!("e2-galactic");
        assert_eq!(insert(&mut s, PROJECT, ZONE, body(bad_type)).unwrap_err().code, "NOT_FOUND");

        let both = json!({
            "name": "x", "machineType": "e2-micro",
            "disks": [{"source": "data", "initializeParams": {}}],
        });
        assert_eq!(insert(&mut s, PROJECT, ZONE, body(both)).unwrap_err().code, "INVALID_ARGUMENT");

        let wrong_zone = json!({
            "name": "x", "machineType": "e2-micro",
            "disks": [{"source": "zones/us-east1-b/disks/data"}],
        });
        assert_eq!(insert(&mut s, PROJECT, ZONE, body(wrong_zone)).unwrap_err().code, "INVALID_ARGUMENT");

        let mut wrong_region = vm("x");
        wrong_region["networkInterfaces"] = json!([{"subnetwork": "regions/us-east1/subnetworks/default"}]);
        assert_eq!(insert(&mut s, PROJECT, ZONE, body(wrong_region)).unwrap_err().code, "INVALID_ARGUMENT");

        let mut east = vm("x");
        east["machineType"] = json!("e2-micro");
        let err = insert(&mut s, PROJECT, "us-east1-b", body(east)).unwrap_err();
        assert_eq!(err.code, "INVALID_ARGUMENT", "no subnetwork in us-east1");

        assert!(s.instances.is_empty());
        assert_eq!(s.disks.len(), 0);
    }

    #[test]
    fn test_requested_address() {
        let mut s = setup();
        let mut fixed = vm("fixed");
        fixed["networkInterfaces"] = json!([{"network": "default", "networkIP": "10.128.0.50"}]);
        insert(&mut s, PROJECT, ZONE, body(fixed)).expect("fixed address");

        let mut clash = vm("clash");
        clash["networkInterfaces"] = json!([{"networkIP": "10.128.0.50"}]);
        assert_eq!(insert(&mut s, PROJECT, ZONE, body(clash)).unwrap_err().code, "FAILED_PRECONDITION");

        let mut outside = vm("outside");
        outside["networkInterfaces"] = json!([{"networkIP": "192.168.0.5"}]);
        assert_eq!(insert(&mut s, PROJECT, ZONE, body(outside)).unwrap_err().code, "INVALID_ARGUMENT");
    }

    #[test]
    fn test_start_stop_and_protection() {
        let mut s = setup();
        let mut protected = vm("db");
        protected["deletionProtection"] = json!(true);
        insert(&mut s, PROJECT, ZONE, body(protected)).expect("insert");

        let op = stop(&mut s, PROJECT, ZONE, "db").expect("stop");
        assert_eq!(op["operationType"], "stop");
        assert_eq!(get(&s, PROJECT, ZONE, "db").expect("get")["status"], "TERMINATED");
        start(&mut s, PROJECT, ZONE, "db").expect("start");
        assert_eq!(get(&s, PROJECT, ZONE, "db").expect("get")["status"], "RUNNING");

        assert_eq!(delete(&mut s, PROJECT, ZONE, "db").unwrap_err().code, "FAILED_PRECONDITION");
        assert_eq!(stop(&mut s, PROJECT, ZONE, "nope").unwrap_err().code, "NOT_FOUND");
    }

    #[test]
    fn test_list_filters() {
        let mut s = setup();
        for name in ["web-1", "web-2", "db-1"] {
            insert(&mut s, PROJECT, ZONE, body(vm(name))).expect("insert");
        }
        stop(&mut s, PROJECT, ZONE, "web-2").expect("stop");

        let running_web = list(
            &s,
            PROJECT,
            ZONE,
            &query(Some(r#"(name eq "web-.*") (status = RUNNING)"#), None, None),
        )
        .expect("list");
        assert_eq!(names(&running_web), vec!["web-1"]);

        let by_ip = list(
            &s,
            PROJECT,
            ZONE,
            &query(Some("networkInterfaces.networkIP = 10.128.0.4"), None, None),
        )
        .expect("by ip");
        assert_eq!(names(&by_ip), vec!["db-1"]);

        let agg = aggregated_list(&s, PROJECT, &query(None, Some("2"), None)).expect("aggregated");
        assert_eq!(agg["items"]["zones/us-central1-a"]["instances"].as_array().map(Vec::len), Some(2));
        assert_eq!(agg["nextPageToken"], "2");
    }
}
