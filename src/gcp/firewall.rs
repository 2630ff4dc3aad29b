//! Firewall rules (global)

use std::sync::OnceLock;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::cidr::Cidr;
use crate::core::store::not_found;
use crate::core::{
    attach, detach, verify_parents, DependsOn, Dialect, ErrorEnvelope, FieldMap, OperationScope,
    OperationType, Outcome, Resource,
};

use super::json::to_object;
use super::links::{global_path, short_name};
use super::network::Network;
use super::{common_fields, link_values, now, require, validate_name, ComputeState, ListQuery};

const DEFAULT_NETWORK: &str = "default";
const DEFAULT_PRIORITY: i64 = 1000;
const MAX_PRIORITY: i64 = 65535;
const ANY_ADDRESS: &str = "0.0.0.0/0";

/// Protocols whose rules may name ports
const PORTED_PROTOCOLS: &[&str] = &["tcp", "udp", "sctp"];
const NAMED_PROTOCOLS: &[&str] = &["tcp", "udp", "icmp", "esp", "ah", "sctp", "ipip", "all"];

/// One `allowed` or `denied` entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FirewallRule {
    #[serde(rename = "IPProtocol")]
    pub ip_protocol: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ports: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Firewall {
    pub kind: String,
    pub id: String,
    pub creation_timestamp: String,
    pub name: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub description: String,
    pub network: String,
    pub priority: i64,
    pub direction: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub source_ranges: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub destination_ranges: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub source_tags: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub target_tags: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub allowed: Vec<FirewallRule>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub denied: Vec<FirewallRule>,
    pub disabled: bool,
    pub self_link: String,
    #[serde(skip)]
    pub path: String,
    #[serde(skip)]
    pub network_path: String,
}

impl Resource for Firewall {
    const KIND: &'static str = "compute-firewalls";

    fn key(&self) -> &str {
        &self.path
    }
}

impl DependsOn<Network> for Firewall {
    fn parent_keys(&self) -> Vec<String> {
        vec![self.network_path.clone()]
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FirewallRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub network: Option<String>,
    pub priority: Option<i64>,
    pub direction: Option<String>,
    pub source_ranges: Option<Vec<String>>,
    pub destination_ranges: Option<Vec<String>>,
    pub source_tags: Option<Vec<String>>,
    pub target_tags: Option<Vec<String>>,
    pub allowed: Option<Vec<FirewallRule>>,
    pub denied: Option<Vec<FirewallRule>>,
    pub disabled: Option<bool>,
}

fn fields() -> &'static FieldMap<Firewall> {
    static FIELDS: OnceLock<FieldMap<Firewall>> = OnceLock::new();
    FIELDS.get_or_init(|| {
        common_fields(
            |f: &Firewall| f.name.as_str(),
            |f: &Firewall| f.id.as_str(),
            |f: &Firewall| f.description.as_str(),
            |f: &Firewall| f.creation_timestamp.as_str(),
            |f: &Firewall| f.self_link.as_str(),
        )
        .multi("network", |f: &Firewall| link_values(&f.network))
        .field("direction", |f: &Firewall| f.direction.clone())
        .field("priority", |f: &Firewall| f.priority.to_string())
        .field("disabled", |f: &Firewall| f.disabled.to_string())
        .multi("sourceRanges", |f: &Firewall| f.source_ranges.clone())
        .multi("destinationRanges", |f: &Firewall| f.destination_ranges.clone())
        .multi("targetTags", |f: &Firewall| f.target_tags.clone())
        .multi("sourceTags", |f: &Firewall| f.source_tags.clone())
    })
}

fn invalid(message: String) -> ErrorEnvelope {
    ErrorEnvelope::invalid_value(Dialect::Gcp, message)
}

fn validate_rules(field: &str, rules: &[FirewallRule]) -> Outcome<()> {
    for (i, rule) in rules.iter().enumerate() {
        let protocol = rule.ip_protocol.to_ascii_lowercase();
        let numeric = protocol.parse::<u8>().is_ok();
        if !numeric && !NAMED_PROTOCOLS.contains(&protocol.as_str()) {
            return Err(invalid(format!(
                "Invalid value for field '{}[{}].IPProtocol': '{}'.",
                field, i, rule.ip_protocol
            )));
        }
        if !rule.ports.is_empty() && !PORTED_PROTOCOLS.contains(&protocol.as_str()) {
            return Err(invalid(format!(
                "Invalid value for field '{}[{}].ports': ports are only valid for tcp, udp and sctp.",
                field, i
            )));
        }
        for port in &rule.ports {
            if !valid_port_spec(port) {
                return Err(invalid(format!(
                    "Invalid value for field '{}[{}].ports': '{}'.",
                    field, i, port
                )));
            }
        }
    }
    Ok(())
}

/// `80` or `8000-9000`
fn valid_port_spec(spec: &str) -> bool {
    let port = |s: &str| s.parse::<u16>().ok().filter(|p| *p > 0);
    match spec.split_once('-') {
        Some((lo, hi)) => matches!((port(lo), port(hi)), (Some(lo), Some(hi)) if lo <= hi),
        None => port(spec).is_some(),
    }
}

fn validate_ranges(field: &str, ranges: &[String]) -> Outcome<()> {
    for range in ranges {
        let ok = range.parse::<Cidr>().is_ok() || range.parse::<std::net::Ipv4Addr>().is_ok();
        if !ok {
            return Err(invalid(format!(
                "Invalid value for field '{}': '{}'.",
                field, range
            )));
        }
    }
    Ok(())
}

/// firewalls.insert
pub fn insert(state: &mut ComputeState, project: &str, body: FirewallRequest) -> Outcome<Value> {
    let name = require("resource.name", &body.name)?;
    validate_name("resource.name", name)?;

    let allowed = body.allowed.unwrap_or_default();
    let denied = body.denied.unwrap_or_default();
    match (allowed.is_empty(), denied.is_empty()) {
        (true, true) => {
            return Err(invalid(
                "Exactly one of 'allowed' or 'denied' must be specified".to_string(),
            ))
        }
        (false, false) => {
            return Err(invalid(
                "'allowed' and 'denied' cannot both be specified".to_string(),
            ))
        }
        _ => {}
    }
    validate_rules("resource.allowed", &allowed)?;
    validate_rules("resource.denied", &denied)?;

    let direction = body.direction.unwrap_or_else(|| "INGRESS".to_string());
    if direction != "INGRESS" && direction != "EGRESS" {
        return Err(invalid(format!(
            "Invalid value for field 'resource.direction': '{}'.",
            direction
        )));
    }
    let priority = body.priority.unwrap_or(DEFAULT_PRIORITY);
    if !(0..=MAX_PRIORITY).contains(&priority) {
        return Err(invalid(format!(
            "Invalid value for field 'resource.priority': '{}'. Must be between 0 and {}.",
            priority, MAX_PRIORITY
        )));
    }

    let source_tags = body.source_tags.unwrap_or_default();
    let mut source_ranges = body.source_ranges.unwrap_or_default();
    let mut destination_ranges = body.destination_ranges.unwrap_or_default();
    validate_ranges("resource.sourceRanges", &source_ranges)?;
    validate_ranges("resource.destinationRanges", &destination_ranges)?;
    if direction == "INGRESS" {
        if !destination_ranges.is_empty() && source_ranges.is_empty() && source_tags.is_empty() {
            return Err(invalid(
                "Ingress rules need 'sourceRanges' or 'sourceTags' when 'destinationRanges' is set"
                    .to_string(),
            ));
        }
        if source_ranges.is_empty() && source_tags.is_empty() {
            source_ranges.push(ANY_ADDRESS.to_string());
        }
    } else {
        if !source_tags.is_empty() {
            return Err(invalid("Egress rules cannot use 'sourceTags'".to_string()));
        }
        if destination_ranges.is_empty() {
            destination_ranges.push(ANY_ADDRESS.to_string());
        }
    }

    let path = global_path(project, Firewall::def().collection(), name);
    state.firewalls.ensure_absent(&path)?;
    let network_ref = body.network.as_deref().unwrap_or(DEFAULT_NETWORK);
    let network_path = global_path(project, Network::def().collection(), short_name(network_ref));

    let firewall = Firewall {
        kind: Firewall::def().kind.clone().unwrap_or_default(),
        id: state.new_id(),
        creation_timestamp: now(),
        name: name.to_string(),
        description: body.description.unwrap_or_default(),
        network: state.link(&network_path),
        priority,
        direction,
        source_ranges,
        destination_ranges,
        source_tags,
        target_tags: body.target_tags.unwrap_or_default(),
        allowed,
        denied,
        disabled: body.disabled.unwrap_or(false),
        self_link: state.link(&path),
        path: path.clone(),
        network_path,
    };

    verify_parents(&firewall, &state.networks)?;
    attach(&firewall, &mut state.networks);
    let id = firewall.id.clone();
    state.firewalls.put(firewall);

    Ok(state.record_operation(
        project,
        OperationScope::Global,
        OperationType::Insert,
        &path,
        Some(id),
    ))
}

/// firewalls.get
pub fn get(state: &ComputeState, project: &str, name: &str) -> Outcome<Value> {
    let path = global_path(project, Firewall::def().collection(), name);
    state.firewalls.get_or_err(&path).map(to_object)
}

/// firewalls.list
pub fn list(state: &ComputeState, project: &str, query: &ListQuery) -> Outcome<Value> {
    state.list_collection(&state.firewalls, project, &OperationScope::Global, query, fields())
}

/// firewalls.delete
pub fn delete(state: &mut ComputeState, project: &str, name: &str) -> Outcome<Value> {
    let path = global_path(project, Firewall::def().collection(), name);
    let firewall = state
        .firewalls
        .delete(&path)
        .ok_or_else(|| not_found::<Firewall>(&path))?;
    detach(&firewall, &mut state.networks);

    Ok(state.record_operation(
        project,
        OperationScope::Global,
        OperationType::Delete,
        &path,
        Some(firewall.id),
    ))
}
