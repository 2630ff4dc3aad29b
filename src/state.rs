//! Shared application state
//!
//! Both dialects live behind their own `RwLock`: describe/get/list calls
//! take the read side, mutations the write side, so every mutation is
//! atomic with respect to every other request of the same dialect.

use std::sync::Arc;

use tokio::sync::RwLock;

use crate::aws::Ec2State;
use crate::config::Config;
use crate::gcp::{ComputeSettings, ComputeState};

#[derive(Debug, Clone)]
pub struct AppState {
    pub ec2: Arc<RwLock<Ec2State>>,
    pub compute: Arc<RwLock<ComputeState>>,
}

impl AppState {
    pub fn new(ec2: Ec2State, compute: ComputeState) -> Self {
        Self {
            ec2: Arc::new(RwLock::new(ec2)),
            compute: Arc::new(RwLock::new(compute)),
        }
    }

    /// Empty emulator for the effective configuration
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            Ec2State::new(config.effective_account_id(), config.effective_region()),
            ComputeState::new(ComputeSettings::from_config(config)),
        )
    }
}
