//! Persistent disks (zonal)

use std::collections::{BTreeMap, BTreeSet};
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::{
    Dependents, Dialect, ErrorEnvelope, ErrorKind, FieldMap, HasDependents, OperationScope, OperationType,
    Outcome, Resource,
};

use super::json::{int64_string, opt_int64, to_object};
use super::links::{short_name, zonal_path};
use super::{
    common_fields, label_fingerprint, link_values, now, require, validate_labels, validate_name,
    with_label_fields, ComputeState, ListQuery,
};

const MIN_SIZE_GB: i64 = 1;
const MAX_SIZE_GB: i64 = 65536;
const DEFAULT_SIZE_GB: i64 = 10;
const DEFAULT_TYPE: &str = "pd-standard";
const DISK_TYPES: &[&str] = &["pd-standard", "pd-balanced", "pd-ssd", "pd-extreme"];
const BLOCK_SIZE_BYTES: u64 = 4096;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Disk {
    pub kind: String,
    pub id: String,
    pub creation_timestamp: String,
    pub name: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(serialize_with = "int64_string")]
    pub size_gb: u64,
    pub zone: String,
    pub status: String,
    pub self_link: String,
    #[serde(rename = "type")]
    pub disk_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_image: Option<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    pub label_fingerprint: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub users: Vec<String>,
    #[serde(serialize_with = "int64_string")]
    pub physical_block_size_bytes: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_attach_timestamp: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_detach_timestamp: Option<String>,
    /// Users holding the disk `READ_WRITE`
    #[serde(skip)]
    pub writers: BTreeSet<String>,
    #[serde(skip)]
    pub path: String,
    #[serde(skip)]
    pub dependents: Dependents,
}

impl Resource for Disk {
    const KIND: &'static str = "compute-disks";

    fn key(&self) -> &str {
        &self.path
    }
}

impl HasDependents for Disk {
    fn dependents(&self) -> &Dependents {
        &self.dependents
    }

    fn dependents_mut(&mut self) -> &mut Dependents {
        &mut self.dependents
    }
}

impl Disk {
    /// Record an instance as a user of this disk
    pub(crate) fn add_user(&mut self, instance_link: &str, read_write: bool) {
        if !self.users.iter().any(|u| u == instance_link) {
            self.users.push(instance_link.to_string());
        }
        if read_write {
            self.writers.insert(instance_link.to_string());
        }
        self.last_attach_timestamp = Some(now());
    }

    pub(crate) fn remove_user(&mut self, instance_link: &str) {
        self.users.retain(|u| u != instance_link);
        self.writers.remove(instance_link);
        self.last_detach_timestamp = Some(now());
    }

    /// First user that blocks a new attachment in the given mode. A writer
    /// excludes everyone; a new writer needs the disk unused.
    pub(crate) fn conflicting_user(&self, read_write: bool) -> Option<&str> {
        if read_write {
            self.users.first().map(String::as_str)
        } else {
            self.writers.iter().next().map(String::as_str)
        }
    }
}

/// Body of `disks.insert`; also the shape of `initializeParams`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DiskRequest {
    #[serde(alias = "diskName")]
    pub name: Option<String>,
    pub description: Option<String>,
    #[serde(deserialize_with = "opt_int64", alias = "diskSizeGb")]
    pub size_gb: Option<i64>,
    #[serde(rename = "type", alias = "diskType")]
    pub disk_type: Option<String>,
    pub source_image: Option<String>,
    pub labels: Option<BTreeMap<String, String>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ResizeRequest {
    #[serde(deserialize_with = "opt_int64")]
    pub size_gb: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SetLabelsRequest {
    pub labels: Option<BTreeMap<String, String>>,
    pub label_fingerprint: Option<String>,
}

fn fields() -> &'static FieldMap<Disk> {
    static FIELDS: OnceLock<FieldMap<Disk>> = OnceLock::new();
    FIELDS.get_or_init(|| {
        let fields = common_fields(
            |d: &Disk| d.name.as_str(),
            |d: &Disk| d.id.as_str(),
            |d: &Disk| d.description.as_str(),
            |d: &Disk| d.creation_timestamp.as_str(),
            |d: &Disk| d.self_link.as_str(),
        )
        .multi("zone", |d: &Disk| link_values(&d.zone))
        .multi("type", |d: &Disk| link_values(&d.disk_type))
        .field("sizeGb", |d: &Disk| d.size_gb.to_string())
        .field("status", |d: &Disk| d.status.clone())
        .multi("users", |d: &Disk| d.users.clone())
        .field("sourceImage", |d: &Disk| d.source_image.clone().unwrap_or_default());
        with_label_fields(fields, |d: &Disk| &d.labels)
    })
}

fn validate_size(size: i64) -> Outcome<u64> {
    if (MIN_SIZE_GB..=MAX_SIZE_GB).contains(&size) {
        return Ok(size.unsigned_abs());
    }
    Err(ErrorEnvelope::invalid_value(
        Dialect::Gcp,
        format!(
            "Invalid value for field 'resource.sizeGb': '{}'. Disk size must be between {} and {} GB.",
            size, MIN_SIZE_GB, MAX_SIZE_GB
        ),
    ))
}

fn disk_path(project: &str, zone: &str, name: &str) -> String {
    zonal_path(project, zone, Disk::def().collection(), name)
}

/// Validate a request and build the record without storing it
///
/// Used by `disks.insert` and by instances creating boot disks from
/// `initializeParams`; `name` overrides the request's own name.
pub(crate) fn build(
    state: &mut ComputeState,
    project: &str,
    zone: &str,
    name: &str,
    request: &DiskRequest,
) -> Outcome<Disk> {
    validate_name("resource.name", name)?;
    let size_gb = validate_size(request.size_gb.unwrap_or(DEFAULT_SIZE_GB))?;

    let disk_type = request
        .disk_type
        .as_deref()
        .map(short_name)
        .unwrap_or(DEFAULT_TYPE);
    if !DISK_TYPES.contains(&disk_type) {
        return Err(ErrorEnvelope::of(
            Dialect::Gcp,
            ErrorKind::NotFound,
            format!(
                "The resource 'projects/{}/zones/{}/diskTypes/{}' was not found",
                project, zone, disk_type
            ),
        ));
    }

    let labels = request.labels.clone().unwrap_or_default();
    validate_labels(&labels)?;

    let path = disk_path(project, zone, name);
    state.disks.ensure_absent(&path)?;

    Ok(Disk {
        kind: Disk::def().kind.clone().unwrap_or_default(),
        id: state.new_id(),
        creation_timestamp: now(),
        name: name.to_string(),
        description: request.description.clone().unwrap_or_default(),
        size_gb,
        zone: state.link(&format!("projects/{}/zones/{}", project, zone)),
        status: "READY".to_string(),
        self_link: state.link(&path),
        disk_type: state.link(&format!(
            "projects/{}/zones/{}/diskTypes/{}",
            project, zone, disk_type
        )),
        source_image: request.source_image.clone(),
        label_fingerprint: label_fingerprint(&labels),
        labels,
        users: Vec::new(),
        writers: BTreeSet::new(),
        physical_block_size_bytes: BLOCK_SIZE_BYTES,
        last_attach_timestamp: None,
        last_detach_timestamp: None,
        path,
        dependents: Dependents::new(),
    })
}

/// disks.insert
pub fn insert(state: &mut ComputeState, project: &str, zone: &str, body: DiskRequest) -> Outcome<Value> {
    state.check_zone(project, zone)?;
    let name = require("resource.name", &body.name)?.to_string();
    let disk = build(state, project, zone, &name, &body)?;
    let path = disk.path.clone();
    let id = disk.id.clone();
    state.disks.put(disk);

    Ok(state.record_operation(
        project,
        OperationScope::Zone(zone.to_string()),
        OperationType::Insert,
        &path,
        Some(id),
    ))
}

/// disks.get
pub fn get(state: &ComputeState, project: &str, zone: &str, name: &str) -> Outcome<Value> {
    state.disks.get_or_err(&disk_path(project, zone, name)).map(to_object)
}

/// disks.list
pub fn list(state: &ComputeState, project: &str, zone: &str, query: &ListQuery) -> Outcome<Value> {
    state.check_zone(project, zone)?;
    state.list_collection(
        &state.disks,
        project,
        &OperationScope::Zone(zone.to_string()),
        query,
        fields(),
    )
}

/// disks.aggregatedList
pub fn aggregated_list(state: &ComputeState, project: &str, query: &ListQuery) -> Outcome<Value> {
    state.aggregated_list(&state.disks, project, query, fields())
}

/// disks.delete, refused while any instance has the disk attached
pub fn delete(state: &mut ComputeState, project: &str, zone: &str, name: &str) -> Outcome<Value> {
    let path = disk_path(project, zone, name);
    let disk = state.disks.delete_checked(&path)?;

    Ok(state.record_operation(
        project,
        OperationScope::Zone(zone.to_string()),
        OperationType::Delete,
        &path,
        Some(disk.id),
    ))
}

/// disks.resize; disks only grow
pub fn resize(
    state: &mut ComputeState,
    project: &str,
    zone: &str,
    name: &str,
    body: ResizeRequest,
) -> Outcome<Value> {
    let path = disk_path(project, zone, name);
    let requested = body
        .size_gb
        .ok_or_else(|| ErrorEnvelope::missing_parameter(Dialect::Gcp, "sizeGb"))?;
    let size_gb = validate_size(requested)?;

    let disk = state.disks.get_mut_or_err(&path)?;
    if size_gb <= disk.size_gb {
        return Err(ErrorEnvelope::precondition(
            Dialect::Gcp,
            format!(
                "Requested disk size cannot be smaller than the current size ({} GB -> {} GB).",
                disk.size_gb, size_gb
            ),
        ));
    }
    disk.size_gb = size_gb;
    let id = disk.id.clone();

    Ok(state.record_operation(
        project,
        OperationScope::Zone(zone.to_string()),
        OperationType::Resize,
        &path,
        Some(id),
    ))
}

/// disks.setLabels; a supplied fingerprint must match the current one
pub fn set_labels(
    state: &mut ComputeState,
    project: &str,
    zone: &str,
    name: &str,
    body: SetLabelsRequest,
) -> Outcome<Value> {
    let path = disk_path(project, zone, name);
    let labels = body.labels.unwrap_or_default();
    validate_labels(&labels)?;

    let disk = state.disks.get_mut_or_err(&path)?;
    let stale = body
        .label_fingerprint
        .as_deref()
        .is_some_and(|fingerprint| fingerprint != disk.label_fingerprint);
    if stale {
        return Err(ErrorEnvelope::precondition(
            Dialect::Gcp,
            format!(
                "Labels fingerprint either invalid or resource labels have changed (expected '{}')",
                disk.label_fingerprint
            ),
        ));
    }
    disk.label_fingerprint = label_fingerprint(&labels);
    disk.labels = labels;
    let id = disk.id.clone();

    Ok(state.record_operation(
        project,
        OperationScope::Zone(zone.to_string()),
        OperationType::SetLabels,
        &path,
        Some(id),
    ))
}
