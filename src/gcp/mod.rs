//! Compute Engine dialect
//!
//! REST paths under `/compute/v1/projects/{project}/...`, camelCase JSON in
//! and out. Every mutation answers with an operation that is already DONE.
//!
//! # Module Structure
//!
//! - [`links`] - Resource paths, self links and reference normalization
//! - [`filter_expr`] - `filter=` query parameter parser
//! - [`json`] - List, aggregated list and error bodies
//! - [`network`], [`subnetwork`], [`firewall`], [`disk`], [`instance`] - Resources
//! - [`operations`] - Operation get, list and wait
//!
//! # Example
//!
//! ```ignore
//! use cloudmock::gcp::{disk, ComputeSettings, ComputeState, ListQuery};
//!
//! let mut state = ComputeState::new(ComputeSettings::default());
//! let op = disk::insert(&mut state, "my-project", "us-central1-a", request)?;
//! let page = disk::list(&state, "my-project", "us-central1-a", &ListQuery::default())?;
//! ```

pub mod disk;
pub mod filter_expr;
pub mod firewall;
pub mod instance;
pub mod json;
pub mod links;
pub mod network;
pub mod operations;
pub mod subnetwork;

use std::collections::hash_map::DefaultHasher;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::hash::{Hash, Hasher};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::Config;
use crate::core::operation::format_timestamp;
use crate::core::{
    filter, make_operation, page, Dialect, ErrorEnvelope, ErrorKind, FieldMap, IdGenerator,
    OperationParams, OperationScope, OperationType, Outcome, Page, Resource, ResourceStore, Scope,
};

use disk::Disk;
use firewall::Firewall;
use instance::Instance;
use network::Network;
use subnetwork::Subnetwork;

/// Reported as `user` on every operation
pub const OPERATION_USER: &str = "cloudmock@example.com";

/// Labels per resource Compute accepts
pub const MAX_LABELS: usize = 64;

const MAX_NAME_LEN: usize = 63;

/// Settings the Compute state needs from the config
#[derive(Debug, Clone, PartialEq)]
pub struct ComputeSettings {
    pub base_url: String,
    pub zones: Vec<String>,
    pub default_page_size: usize,
    pub max_page_size: usize,
    pub operation_history: usize,
}

impl Default for ComputeSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl ComputeSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            base_url: config.effective_base_url(),
            zones: config.effective_zones(),
            default_page_size: config.effective_default_page_size(),
            max_page_size: config.effective_max_page_size(),
            operation_history: config.effective_operation_history(),
        }
    }
}

/// `filter`, `maxResults`, `pageToken`, `orderBy` of a list call
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListQuery {
    pub filter: Option<String>,
    pub max_results: Option<String>,
    pub page_token: Option<String>,
    pub order_by: Option<String>,
}

impl ListQuery {
    /// Effective page size: negative is rejected, 0 or absent means the
    /// default, anything above the maximum is clamped
    pub fn page_size(&self, settings: &ComputeSettings) -> Outcome<usize> {
        let Some(raw) = self.max_results.as_deref().filter(|s| !s.is_empty()) else {
            return Ok(settings.default_page_size);
        };
        let n: i64 = raw.trim().parse().map_err(|_| {
            ErrorEnvelope::invalid_value(
                Dialect::Gcp,
                format!("Invalid value for field 'maxResults': '{}'.", raw),
            )
        })?;
        match n {
            n if n < 0 => Err(ErrorEnvelope::invalid_value(
                Dialect::Gcp,
                format!(
                    "Invalid value for field 'maxResults': '{}'. Must be a non-negative integer.",
                    n
                ),
            )),
            0 => Ok(settings.default_page_size),
            n => Ok(usize::try_from(n)
                .unwrap_or(usize::MAX)
                .min(settings.max_page_size)),
        }
    }
}

/// In-memory Compute Engine, every project at once
#[derive(Debug, Clone)]
pub struct ComputeState {
    pub settings: ComputeSettings,
    pub networks: ResourceStore<Network>,
    pub subnetworks: ResourceStore<Subnetwork>,
    pub firewalls: ResourceStore<Firewall>,
    pub disks: ResourceStore<Disk>,
    pub instances: ResourceStore<Instance>,
    pub operations: ResourceStore<crate::core::Operation>,
    /// Operation keys per location path, oldest first
    operation_log: HashMap<String, VecDeque<String>>,
    pub ids: IdGenerator,
}

impl ComputeState {
    pub fn new(settings: ComputeSettings) -> Self {
        Self::with_ids(settings, IdGenerator::new(Dialect::Gcp))
    }

    pub fn with_ids(settings: ComputeSettings, ids: IdGenerator) -> Self {
        Self {
            settings,
            networks: ResourceStore::new(),
            subnetworks: ResourceStore::new(),
            firewalls: ResourceStore::new(),
            disks: ResourceStore::new(),
            instances: ResourceStore::new(),
            operations: ResourceStore::new(),
            operation_log: HashMap::new(),
            ids,
        }
    }

    /// Absolute URL of a relative path
    pub fn link(&self, path: &str) -> String {
        links::absolute(&self.settings.base_url, path)
    }

    /// Configured regions, in zone order without repeats
    pub fn regions(&self) -> Vec<String> {
        let mut regions: Vec<String> = Vec::new();
        for zone in &self.settings.zones {
            let region = links::region_of(zone);
            if !regions.contains(&region) {
                regions.push(region);
            }
        }
        regions
    }

    pub fn check_zone(&self, project: &str, zone: &str) -> Outcome<()> {
        if self.settings.zones.iter().any(|z| z == zone) {
            return Ok(());
        }
        Err(location_not_found(project, &OperationScope::Zone(zone.to_string())))
    }

    pub fn check_region(&self, project: &str, region: &str) -> Outcome<()> {
        if self.regions().iter().any(|r| r == region) {
            return Ok(());
        }
        Err(location_not_found(project, &OperationScope::Region(region.to_string())))
    }

    /// Numeric id for a new record
    pub(crate) fn new_id(&mut self) -> String {
        self.ids.generate("")
    }

    /// Store a DONE operation for a mutation and render it. Each location
    /// keeps the newest `operation_history` operations.
    pub(crate) fn record_operation(
        &mut self,
        project: &str,
        scope: OperationScope,
        operation_type: OperationType,
        target_path: &str,
        target_id: Option<String>,
    ) -> Value {
        let op = make_operation(
            &mut self.ids,
            operation_type,
            target_path,
            OperationParams {
                project: project.to_string(),
                scope,
                target_id,
                user: Some(OPERATION_USER.to_string()),
            },
        );
        let body = operations::to_json(&op, &self.settings.base_url);
        let log = self
            .operation_log
            .entry(links::scope_path(&op.project, &op.scope))
            .or_default();
        log.push_back(op.path().to_string());
        while log.len() > self.settings.operation_history.max(1) {
            if let Some(expired) = log.pop_front() {
                self.operations.delete(&expired);
            }
        }
        self.operations.put(op);
        body
    }

    /// Filter, order and page records already narrowed to one collection
    pub(crate) fn list_page<T: Resource>(
        &self,
        records: Vec<&T>,
        query: &ListQuery,
        fields: &FieldMap<T>,
    ) -> Outcome<Page<T>> {
        let clauses = filter_expr::parse(query.filter.as_deref().unwrap_or(""))?;
        fields.validate(&clauses, Dialect::Gcp)?;
        let mut matching = filter::apply(records, &clauses, fields);

        if let Some(order_by) = query.order_by.as_deref().filter(|o| !o.trim().is_empty()) {
            sort_records(&mut matching, order_by, fields)?;
        }

        let size = query.page_size(&self.settings)?;
        let owned: Vec<T> = matching.into_iter().cloned().collect();
        Ok(page(&owned, query.page_token.as_deref(), size))
    }

    /// `list` for one collection in one scope
    pub(crate) fn list_collection<T: Resource + Serialize>(
        &self,
        store: &ResourceStore<T>,
        project: &str,
        scope: &OperationScope,
        query: &ListQuery,
        fields: &FieldMap<T>,
    ) -> Outcome<Value> {
        let collection = links::collection_path(project, scope, T::def().collection());
        let page = self.list_page(in_collection(store, &collection), query, fields)?;
        Ok(json::list_response(
            T::def(),
            &self.link(&collection),
            &collection,
            &page,
        ))
    }

    /// `aggregatedList` across every configured zone or region
    pub(crate) fn aggregated_list<T: Resource + Serialize>(
        &self,
        store: &ResourceStore<T>,
        project: &str,
        query: &ListQuery,
        fields: &FieldMap<T>,
    ) -> Outcome<Value> {
        let def = T::def();
        let scopes: Vec<OperationScope> = match def.scope {
            Scope::Zonal => self
                .settings
                .zones
                .iter()
                .map(|z| OperationScope::Zone(z.clone()))
                .collect(),
            Scope::Regional => self.regions().into_iter().map(OperationScope::Region).collect(),
            Scope::Global => vec![OperationScope::Global],
        };
        let prefixes: Vec<String> = scopes
            .iter()
            .map(|scope| links::collection_path(project, scope, def.collection()))
            .collect();

        let records: Vec<&T> = prefixes
            .iter()
            .flat_map(|prefix| in_collection(store, prefix))
            .collect();
        let page = self.list_page(records, query, fields)?;

        let grouped = scopes
            .iter()
            .zip(&prefixes)
            .map(|(scope, prefix)| {
                let lead = format!("{}/", prefix);
                let items = page
                    .items
                    .iter()
                    .filter(|r| r.key().starts_with(&lead))
                    .map(json::to_object)
                    .collect();
                (scope.path(), items)
            })
            .collect();

        let collection = format!("projects/{}/aggregated/{}", project, def.collection());
        Ok(json::aggregated_response(
            def,
            &self.link(&collection),
            &collection,
            grouped,
            page.next_token,
        ))
    }
}

fn location_not_found(project: &str, scope: &OperationScope) -> ErrorEnvelope {
    ErrorEnvelope::of(
        Dialect::Gcp,
        ErrorKind::NotFound,
        format!("The resource '{}' was not found", links::scope_path(project, scope)),
    )
}

/// Records of a store under one collection path, in insertion order
pub(crate) fn in_collection<'a, T: Resource>(
    store: &'a ResourceStore<T>,
    collection: &str,
) -> Vec<&'a T> {
    let lead = format!("{}/", collection);
    store
        .values()
        .into_iter()
        .filter(|r| r.key().starts_with(&lead))
        .collect()
}

/// Stable sort on `field` or `field desc`
fn sort_records<T>(records: &mut [&T], order_by: &str, fields: &FieldMap<T>) -> Outcome<()> {
    let mut parts = order_by.split_whitespace();
    let key = parts.next().unwrap_or("");
    let descending = match parts.next() {
        None | Some("asc") => false,
        Some("desc") => true,
        Some(_) => return Err(invalid_order_by(order_by)),
    };
    if parts.next().is_some() || !fields.knows(key) {
        return Err(invalid_order_by(order_by));
    }

    let sort_key = |record: &T| {
        fields
            .values_of(record, key)
            .and_then(|values| values.into_iter().next())
            .unwrap_or_default()
    };
    records.sort_by(|a, b| {
        let ordering = sort_key(a).cmp(&sort_key(b));
        if descending {
            ordering.reverse()
        } else {
            ordering
        }
    });
    Ok(())
}

fn invalid_order_by(order_by: &str) -> ErrorEnvelope {
    ErrorEnvelope::invalid_value(
        Dialect::Gcp,
        format!("Invalid value for field 'orderBy': '{}'.", order_by),
    )
}

/// RFC 1035 resource name: lowercase letter first, then letters, digits
/// or dashes, not ending in a dash, at most 63 characters
pub fn validate_name(field: &str, name: &str) -> Outcome<()> {
    let valid = !name.is_empty()
        && name.len() <= MAX_NAME_LEN
        && name.starts_with(|c: char| c.is_ascii_lowercase())
        && !name.ends_with('-')
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');
    if valid {
        return Ok(());
    }
    Err(ErrorEnvelope::invalid_value(
        Dialect::Gcp,
        format!(
            "Invalid value for field '{}': '{}'. Must be a match of regex '(?:[a-z](?:[-a-z0-9]{{0,61}}[a-z0-9])?)'",
            field, name
        ),
    ))
}

/// Required string field of a request body
pub fn require<'a>(field: &str, value: &'a Option<String>) -> Outcome<&'a str> {
    value
        .as_deref()
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ErrorEnvelope::missing_parameter(Dialect::Gcp, field))
}

/// Label keys and values follow the same charset; keys must be non-empty
pub fn validate_labels(labels: &BTreeMap<String, String>) -> Outcome<()> {
    if labels.len() > MAX_LABELS {
        return Err(ErrorEnvelope::invalid_value(
            Dialect::Gcp,
            format!("Resources may carry at most {} labels", MAX_LABELS),
        ));
    }
    let label_char = |c: char| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_';
    for (key, value) in labels {
        let key_ok = key.len() <= MAX_NAME_LEN
            && key.starts_with(|c: char| c.is_ascii_lowercase())
            && key.chars().all(label_char);
        let value_ok = value.len() <= MAX_NAME_LEN && value.chars().all(label_char);
        if !key_ok || !value_ok {
            return Err(ErrorEnvelope::invalid_value(
                Dialect::Gcp,
                format!("Invalid label '{}': '{}'", key, value),
            ));
        }
    }
    Ok(())
}

/// Fingerprint of a label set, changes whenever the labels do
pub fn label_fingerprint(labels: &BTreeMap<String, String>) -> String {
    let mut hasher = DefaultHasher::new();
    labels.hash(&mut hasher);
    format!("{:016x}", hasher.finish())
}

/// Timestamp for `creationTimestamp` and friends
pub fn now() -> String {
    format_timestamp(&Utc::now())
}

/// Field map entries every Compute resource shares
pub(crate) fn common_fields<T: 'static>(
    name: fn(&T) -> &str,
    id: fn(&T) -> &str,
    description: fn(&T) -> &str,
    created: fn(&T) -> &str,
    self_link: fn(&T) -> &str,
) -> FieldMap<T> {
    FieldMap::new()
        .field("name", move |r: &T| name(r).to_string())
        .field("id", move |r: &T| id(r).to_string())
        .field("description", move |r: &T| description(r).to_string())
        .field("creationTimestamp", move |r: &T| created(r).to_string())
        .field("selfLink", move |r: &T| self_link(r).to_string())
}

/// `labels.<key>` filters
pub(crate) fn with_label_fields<T: 'static>(
    fields: FieldMap<T>,
    labels: fn(&T) -> &BTreeMap<String, String>,
) -> FieldMap<T> {
    fields.prefixed("labels.", move |r: &T, key| {
        labels(r).get(key).cloned().into_iter().collect()
    })
}

/// A link field matches on its full URL or its short name
pub(crate) fn link_values(link: &str) -> Vec<String> {
    vec![link.to_string(), links::short_name(link).to_string()]
}
