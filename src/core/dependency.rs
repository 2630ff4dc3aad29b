//! Dependency Graph
//!
//! Parent -> dependents edges live on the parent record itself. A child adds
//! its id to the parent's set when it is created and removes it when it is
//! deleted; a parent with any non-empty set cannot be deleted.

use std::collections::BTreeMap;

use super::error::{Dialect, ErrorEnvelope, ErrorKind};
use super::registry::get_resource;
use super::store::{Resource, ResourceStore};

/// Child ids keyed by child resource type, in attach order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Dependents {
    edges: BTreeMap<String, Vec<String>>,
}

impl Dependents {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an edge. Adding an existing edge is a no-op.
    pub fn add(&mut self, child_type: &str, child_id: &str) {
        let ids = self.edges.entry(child_type.to_string()).or_default();
        if !ids.iter().any(|id| id == child_id) {
            ids.push(child_id.to_string());
        }
    }

    /// Remove an edge. Removing an absent edge is a no-op.
    pub fn remove(&mut self, child_type: &str, child_id: &str) {
        if let Some(ids) = self.edges.get_mut(child_type) {
            ids.retain(|id| id != child_id);
            if ids.is_empty() {
                self.edges.remove(child_type);
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.edges.values().all(|ids| ids.is_empty())
    }

    /// Dependents of one child type
    pub fn of_type(&self, child_type: &str) -> &[String] {
        self.edges
            .get(child_type)
            .map(|ids| ids.as_slice())
            .unwrap_or(&[])
    }

    /// First blocking edge as `(child_type, child_id)`
    pub fn first_blocking(&self) -> Option<(&str, &str)> {
        self.edges
            .iter()
            .find_map(|(ty, ids)| ids.first().map(|id| (ty.as_str(), id.as_str())))
    }
}

/// Records that carry a dependents map
pub trait HasDependents {
    fn dependents(&self) -> &Dependents;
    fn dependents_mut(&mut self) -> &mut Dependents;
}

/// Typed cross-resource reference from a child to parents of type `P`
pub trait DependsOn<P: Resource> {
    /// Store keys of the referenced parents
    fn parent_keys(&self) -> Vec<String>;
}

pub fn add_dependent<P: HasDependents>(parent: &mut P, child_type: &str, child_id: &str) {
    parent.dependents_mut().add(child_type, child_id);
}

pub fn remove_dependent<P: HasDependents>(parent: &mut P, child_type: &str, child_id: &str) {
    parent.dependents_mut().remove(child_type, child_id);
}

pub fn has_dependents<P: HasDependents>(parent: &P) -> bool {
    !parent.dependents().is_empty()
}

/// Fail with `DependencyViolation` naming the blocking child type
pub fn ensure_deletable<P: Resource + HasDependents>(parent: &P) -> Result<(), ErrorEnvelope> {
    let Some((child_type, child_id)) = parent.dependents().first_blocking() else {
        return Ok(());
    };

    let def = P::def();
    let child_name = get_resource(child_type)
        .map(|d| d.display_name.as_str())
        .unwrap_or(child_type);

    let message = match def.dialect {
        Dialect::Aws => format!(
            "The {} '{}' has dependencies and cannot be deleted (dependent {} '{}')",
            def.display_name,
            parent.key(),
            child_name,
            child_id
        ),
        Dialect::Gcp => format!(
            "The {} resource '{}' is already being used by {} '{}'",
            def.display_name,
            parent.key(),
            child_name,
            child_id
        ),
    };
    Err(ErrorEnvelope::of(
        def.dialect,
        ErrorKind::DependencyViolation,
        message,
    ))
}

impl<T: Resource + HasDependents> ResourceStore<T> {
    /// Delete a record only when nothing depends on it
    pub fn delete_checked(&mut self, key: &str) -> Result<T, ErrorEnvelope> {
        ensure_deletable(self.get_or_err(key)?)?;
        self.delete(key).ok_or_else(|| super::store::not_found::<T>(key))
    }

    /// Add an edge on a stored parent. Missing parents are a no-op.
    pub fn add_dependent(&mut self, parent_key: &str, child_type: &str, child_id: &str) {
        if let Some(parent) = self.get_mut(parent_key) {
            add_dependent(parent, child_type, child_id);
        }
    }

    /// Remove an edge from a stored parent. Missing parents are a no-op.
    pub fn remove_dependent(&mut self, parent_key: &str, child_type: &str, child_id: &str) {
        if let Some(parent) = self.get_mut(parent_key) {
            remove_dependent(parent, child_type, child_id);
        }
    }
}

/// Check that every parent a child references exists
pub fn verify_parents<C, P>(child: &C, parents: &ResourceStore<P>) -> Result<(), ErrorEnvelope>
where
    C: Resource + DependsOn<P>,
    P: Resource + HasDependents,
{
    for key in child.parent_keys() {
        parents.get_or_err(&key)?;
    }
    Ok(())
}

/// Register the child on every parent it references
pub fn attach<C, P>(child: &C, parents: &mut ResourceStore<P>)
where
    C: Resource + DependsOn<P>,
    P: Resource + HasDependents,
{
    for key in child.parent_keys() {
        parents.add_dependent(&key, C::KIND, child.key());
    }
}

/// Deregister the child from every parent it references
pub fn detach<C, P>(child: &C, parents: &mut ResourceStore<P>)
where
    C: Resource + DependsOn<P>,
    P: Resource + HasDependents,
{
    for key in child.parent_keys() {
        parents.remove_dependent(&key, C::KIND, child.key());
    }
}
