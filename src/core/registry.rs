//! Resource Registry - Load resource type definitions from JSON
//!
//! Every emulated resource type is described once in an embedded JSON file:
//! its id prefix, its not-found/duplicate codes, its GCP kind and collection.
//! The store, the dependency layer and the serializers look definitions up
//! here instead of hardcoding per-type strings.

use serde::Deserialize;
use std::collections::HashMap;
use std::sync::OnceLock;

use super::error::Dialect;

/// Embedded resource JSON files (compiled into the binary)
const RESOURCE_FILES: &[&str] = &[
    include_str!("../resources/aws.json"),
    include_str!("../resources/gcp.json"),
];

/// Location scope of a GCP resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    #[default]
    Global,
    Regional,
    Zonal,
}

/// Resource definition from JSON
#[derive(Debug, Clone, Deserialize)]
pub struct ResourceDef {
    /// Human readable noun used in error messages
    pub display_name: String,
    pub dialect: Dialect,
    /// AWS id prefix (`vpc`, `subnet`, `sg`)
    #[serde(default)]
    pub id_prefix: Option<String>,
    /// AWS error code for unknown ids
    #[serde(default)]
    pub not_found_code: Option<String>,
    /// AWS error code for name or CIDR collisions
    #[serde(default)]
    pub duplicate_code: Option<String>,
    /// AWS `TagSpecification.N.ResourceType` value
    #[serde(default)]
    pub resource_type: Option<String>,
    /// GCP `kind` discriminator
    #[serde(default)]
    pub kind: Option<String>,
    /// GCP collection segment in resource paths
    #[serde(default)]
    pub collection: Option<String>,
    #[serde(default)]
    pub scope: Scope,
}

impl ResourceDef {
    /// GCP list kind, e.g. `compute#diskList`
    pub fn list_kind(&self) -> String {
        format!("{}List", self.kind.as_deref().unwrap_or("compute#resource"))
    }

    /// GCP aggregated list kind, e.g. `compute#diskAggregatedList`
    pub fn aggregated_list_kind(&self) -> String {
        format!(
            "{}AggregatedList",
            self.kind.as_deref().unwrap_or("compute#resource")
        )
    }

    pub fn id_prefix(&self) -> &str {
        self.id_prefix.as_deref().unwrap_or("r")
    }

    pub fn collection(&self) -> &str {
        self.collection.as_deref().unwrap_or(&self.display_name)
    }
}

/// Root structure of resources/*.json
#[derive(Debug, Clone, Deserialize)]
pub struct RegistryConfig {
    #[serde(default)]
    pub resources: HashMap<String, ResourceDef>,
}

/// Global registry loaded from JSON
static REGISTRY: OnceLock<RegistryConfig> = OnceLock::new();

/// Get the resource registry (loads from embedded JSON on first access)
pub fn get_registry() -> &'static RegistryConfig {
    REGISTRY.get_or_init(|| {
        let mut final_config = RegistryConfig {
            resources: HashMap::new(),
        };

        for content in RESOURCE_FILES {
            let partial: RegistryConfig = serde_json::from_str(content)
                .unwrap_or_else(|e| panic!("Failed to parse embedded resource JSON: {}", e));
            final_config.resources.extend(partial.resources);
        }

        final_config
    })
}

/// Get a resource definition by key
pub fn get_resource(key: &str) -> Option<&'static ResourceDef> {
    get_registry().resources.get(key)
}

/// Get a resource definition that the crate itself declared
///
/// Keys passed here come from `Resource::KIND` constants, which the
/// registry tests pin to the embedded JSON.
pub fn resource_def(key: &str) -> &'static ResourceDef {
    get_resource(key).unwrap_or_else(|| panic!("Unregistered resource kind: {}", key))
}

/// Find the AWS resource type owning an id prefix (`vpc-123` -> `ec2-vpc`)
pub fn find_by_id_prefix(id: &str) -> Option<(&'static str, &'static ResourceDef)> {
    let (prefix, _) = id.split_once('-')?;
    get_registry()
        .resources
        .iter()
        .find(|(_, def)| def.dialect == Dialect::Aws && def.id_prefix.as_deref() == Some(prefix))
        .map(|(key, def)| (key.as_str(), def))
}

/// Get all resource keys
pub fn get_all_resource_keys() -> Vec<&'static str> {
    get_registry()
        .resources
        .keys()
        .map(|s| s.as_str())
        .collect()
}
