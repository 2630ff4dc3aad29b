//! cloudmock: an in-memory cloud control plane
//!
//! Serves two dialects over HTTP from one process:
//!
//! - the EC2 query API (`Action=CreateVpc&...`, XML responses) on `/`
//! - the Compute Engine REST API (JSON, long-running operations) under
//!   `/compute/v1`
//!
//! Both share the substrate in [`core`]: typed resource stores, id
//! generation, dependency tracking, filtering, pagination, operation
//! records and error envelopes.

pub mod aws;
pub mod cidr;
pub mod config;
pub mod core;
pub mod gcp;
pub mod server;
pub mod state;

/// Version injected at compile time via CLOUDMOCK_VERSION env var,
/// or "dev" for local builds.
pub const VERSION: &str = match option_env!("CLOUDMOCK_VERSION") {
    Some(v) => v,
    None => "dev",
};
