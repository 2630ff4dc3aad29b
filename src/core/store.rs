//! Resource Store
//!
//! One keyed collection per resource type. Records keep their insertion
//! order, which is the default list order before filtering.

use std::collections::HashMap;

use super::error::{Dialect, ErrorEnvelope, ErrorKind};
use super::registry::{resource_def, ResourceDef};

/// A record that can live in a [`ResourceStore`]
pub trait Resource: Clone + Send + Sync + 'static {
    /// Registry key for this resource type
    const KIND: &'static str;

    /// Store key. AWS records use their id, GCP records their canonical
    /// relative path.
    fn key(&self) -> &str;

    fn def() -> &'static ResourceDef {
        resource_def(Self::KIND)
    }
}

/// Canonical key -> record mapping for one resource type
#[derive(Debug, Clone)]
pub struct ResourceStore<T: Resource> {
    records: HashMap<String, T>,
    order: Vec<String>,
}

impl<T: Resource> Default for ResourceStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Resource> ResourceStore<T> {
    pub fn new() -> Self {
        Self {
            records: HashMap::new(),
            order: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.records.contains_key(key)
    }

    pub fn get(&self, key: &str) -> Option<&T> {
        self.records.get(key)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut T> {
        self.records.get_mut(key)
    }

    /// Get a record or the dialect's not-found envelope
    pub fn get_or_err(&self, key: &str) -> Result<&T, ErrorEnvelope> {
        self.records.get(key).ok_or_else(|| not_found::<T>(key))
    }

    pub fn get_mut_or_err(&mut self, key: &str) -> Result<&mut T, ErrorEnvelope> {
        self.records.get_mut(key).ok_or_else(|| not_found::<T>(key))
    }

    /// Fail with `AlreadyExists` when the key is taken
    pub fn ensure_absent(&self, key: &str) -> Result<(), ErrorEnvelope> {
        if self.contains(key) {
            return Err(already_exists::<T>(key));
        }
        Ok(())
    }

    /// Insert or overwrite. Overwriting keeps the record's list position.
    pub fn put(&mut self, record: T) -> Option<T> {
        let key = record.key().to_string();
        let previous = self.records.insert(key.clone(), record);
        if previous.is_none() {
            self.order.push(key);
        }
        previous
    }

    /// Remove unconditionally. Callers check dependents first.
    pub fn delete(&mut self, key: &str) -> Option<T> {
        let removed = self.records.remove(key)?;
        self.order.retain(|k| k != key);
        Some(removed)
    }

    /// Snapshot of every record in insertion order
    pub fn values(&self) -> Vec<&T> {
        self.order
            .iter()
            .filter_map(|key| self.records.get(key))
            .collect()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(|k| k.as_str())
    }

    /// First record matching a predicate, in insertion order
    pub fn find(&self, predicate: impl Fn(&T) -> bool) -> Option<&T> {
        self.values().into_iter().find(|record| predicate(*record))
    }
}

/// Not-found envelope for a resource type
pub fn not_found<T: Resource>(key: &str) -> ErrorEnvelope {
    let def = T::def();
    match def.dialect {
        Dialect::Aws => ErrorEnvelope::with_code(
            Dialect::Aws,
            ErrorKind::NotFound,
            def.not_found_code
                .clone()
                .unwrap_or_else(|| ErrorKind::NotFound.aws_code().to_string()),
            format!("The {} ID '{}' does not exist", def.display_name, key),
        ),
        Dialect::Gcp => ErrorEnvelope::of(
            Dialect::Gcp,
            ErrorKind::NotFound,
            format!("The resource '{}' was not found", key),
        ),
    }
}

/// Already-exists envelope for a resource type
pub fn already_exists<T: Resource>(key: &str) -> ErrorEnvelope {
    let def = T::def();
    match def.dialect {
        Dialect::Aws => ErrorEnvelope::with_code(
            Dialect::Aws,
            ErrorKind::AlreadyExists,
            def.duplicate_code
                .clone()
                .unwrap_or_else(|| ErrorKind::AlreadyExists.aws_code().to_string()),
            format!("The {} '{}' already exists", def.display_name, key),
        ),
        Dialect::Gcp => ErrorEnvelope::of(
            Dialect::Gcp,
            ErrorKind::AlreadyExists,
            format!("The resource '{}' already exists", key),
        ),
    }
}
