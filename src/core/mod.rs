//! Emulation substrate
//!
//! Everything the per-resource handlers share, independent of either wire
//! dialect. Nothing in here logs, retries or blocks; every failure comes back
//! as an [`ErrorEnvelope`] value.
//!
//! # Architecture
//!
//! - [`error`] - Error envelope and the dialect-agnostic error kinds
//! - [`ids`] - AWS and GCP style identifier generation
//! - [`registry`] - Resource type definitions loaded from embedded JSON
//! - [`store`] - Typed, insertion-ordered resource store
//! - [`dependency`] - Parent -> dependents edges and delete blocking
//! - [`filter`] - Clause evaluation over resource collections
//! - [`pagination`] - Offset-based next tokens
//! - [`operation`] - Immediately-DONE long-running operations
//!
//! # Example
//!
//! ```ignore
//! use cloudmock::core::{filter, pagination};
//!
//! let matching = filter::apply(store.values(), &clauses, &fields);
//! let page = pagination::page(&matching, token, 10);
//! ```

pub mod dependency;
pub mod error;
pub mod filter;
pub mod ids;
pub mod operation;
pub mod pagination;
pub mod registry;
pub mod store;

pub use dependency::{
    add_dependent, attach, detach, ensure_deletable, has_dependents, remove_dependent,
    verify_parents, Dependents, DependsOn, HasDependents,
};
pub use error::{create_error, is_error, Dialect, ErrorEnvelope, ErrorKind, Outcome};
pub use filter::{FieldMap, FilterClause, Operator};
pub use ids::IdGenerator;
pub use operation::{make_operation, Operation, OperationParams, OperationScope, OperationType};
pub use pagination::{page, Page};
pub use registry::{get_resource, ResourceDef, Scope};
pub use store::{Resource, ResourceStore};
