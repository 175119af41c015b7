//! Configuration loader for the simulation runner.
//!
//! A configuration file carries a `[shared]` table and a `[machine]`
//! table. Both are validated before the bundle is returned.
//!
//! ```toml
//! [shared]
//! service_name = "stepper-sim"
//!
//! [machine]
//! max_step_rate = 28000
//!
//! [[machine.axes]]
//! size = 200000
//! ```

use serde::Deserialize;
use std::path::Path;
use stepper_common::config::{ConfigError, ConfigLoader, SharedConfig};
use stepper_common::machine::config::MachineConfig;
use tracing::debug;

// ─── Loaded Config Bundle ───────────────────────────────────────────

/// Validated configuration, ready for [`crate::stepper::Stepper::new`].
#[derive(Debug, Clone, Deserialize)]
pub struct LoadedConfig {
    pub shared: SharedConfig,
    pub machine: MachineConfig,
}

impl LoadedConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.shared.validate()?;
        self.machine
            .validate()
            .map_err(|e| ConfigError::ValidationError(format!("machine: {e}")))
    }
}

#[derive(Deserialize)]
struct SharedFile {
    shared: SharedConfig,
}

#[derive(Deserialize)]
struct MachineFile {
    machine: MachineConfig,
}

// ─── Loading Functions ──────────────────────────────────────────────

/// Load and validate a file holding both `[shared]` and `[machine]`.
pub fn load_config(path: &Path) -> Result<LoadedConfig, ConfigError> {
    let loaded = LoadedConfig::load(path)?;
    loaded.validate()?;
    debug!(
        "Loaded {} axes ({:?}) from {}",
        loaded.machine.axis_count(),
        loaded.machine.kinematics,
        path.display()
    );
    Ok(loaded)
}

/// Load config from separate TOML strings (for testing).
pub fn load_config_from_strings(
    shared_toml: &str,
    machine_toml: &str,
) -> Result<LoadedConfig, ConfigError> {
    let shared = SharedFile::from_toml_str(shared_toml)?.shared;
    let machine = MachineFile::from_toml_str(machine_toml)?.machine;
    let loaded = LoadedConfig { shared, machine };
    loaded.validate()?;
    Ok(loaded)
}
