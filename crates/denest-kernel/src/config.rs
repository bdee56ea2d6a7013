// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*!
Global kernel configuration.

Seeds, data path, resolution and other process-wide options are gathered into
one [`KernelConfig`] value and applied exactly once per run, before any
object exists. Nothing here is global mutable state: two kernels initialized
from two configs never see each other.
*/

use crate::error::{KernelError, KernelResult};
use crate::traits::Kernel;
use crate::types::Status;
use denest_params::{ParamsResult, ResolvedNode, Schema};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::path::PathBuf;
use tracing::{info, warn};

/// Kernel status keys that only [`KernelConfig::initialize`] may set
pub const RESERVED_KERNEL_KEYS: &[&str] = &["data_path", "msd", "grng_seed", "rng_seed", "rng_seeds"];

/// Seeds derived from the master seed for a given number of virtual processes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedPlan {
    pub grng_seed: u64,
    pub rng_seeds: Vec<u64>,
}

/// Explicit, once-per-run kernel configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KernelConfig {
    /// Global options passed through to the kernel (resolution, threads, ...)
    pub status: Status,
    /// Directory where the kernel writes raw recorder output
    pub data_path: PathBuf,
    /// Master seed of the kernel's random generators
    pub kernel_seed: u64,
    /// Seed of the generator choosing unit subsets for partial changes
    pub selection_seed: u64,
    /// External model modules to install
    pub extension_modules: Vec<String>,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            status: Status::new(),
            data_path: PathBuf::from("."),
            kernel_seed: 1,
            selection_seed: 1,
            extension_modules: Vec::new(),
        }
    }
}

impl KernelConfig {
    /// Schema of the `kernel` node's `params`
    pub fn schema() -> Schema {
        Schema::new()
            .optional("extension_modules", json!([]))
            .optional("kernel_seed", 1)
            .optional("selection_seed", 1)
    }

    /// Schema of the `kernel` node's `kernel_params`: any global option
    /// except the ones derived here
    pub fn kernel_params_schema() -> Schema {
        RESERVED_KERNEL_KEYS
            .iter()
            .fold(Schema::open(), |schema, key| schema.reserved(key))
    }

    /// Build the configuration from the resolved `kernel` node
    ///
    /// `data_path` comes from the run's output directory, never from the
    /// tree.
    pub fn from_params(node: &ResolvedNode, data_path: PathBuf) -> ParamsResult<Self> {
        let params = Self::schema().validate("kernel", &node.params)?;
        let status = Self::kernel_params_schema()
            .validate("kernel", &node.kernel_params)?
            .as_map()
            .clone();
        Ok(Self {
            status,
            data_path,
            kernel_seed: params.get_u64("kernel_seed")?,
            selection_seed: params.get_u64("selection_seed")?,
            extension_modules: params.get_str_list("extension_modules")?,
        })
    }

    /// Global seed is `kernel_seed + n_vp`; per-process seeds follow it
    ///
    /// Fails when the derived seeds do not fit in a `u64`.
    pub fn seed_plan(&self, n_vp: usize) -> KernelResult<SeedPlan> {
        let overflow = || KernelError::InvalidStatus {
            target: "kernel".to_string(),
            reason: format!(
                "kernel_seed {} is too large for {} virtual processes",
                self.kernel_seed, n_vp
            ),
        };
        let n_vp = u64::try_from(n_vp).map_err(|_| overflow())?;
        let grng_seed = self.kernel_seed.checked_add(n_vp).ok_or_else(overflow)?;
        let last = grng_seed.checked_add(n_vp).ok_or_else(overflow)?;
        Ok(SeedPlan {
            grng_seed,
            rng_seeds: (grng_seed + 1..=last).collect(),
        })
    }

    /// Reset the kernel and apply this configuration
    ///
    /// Order: reset, global options, data path and seeds, modules. A module
    /// that is already loaded is not an error.
    pub fn initialize(&self, kernel: &mut dyn Kernel) -> KernelResult<SeedPlan> {
        for key in self.status.keys() {
            if RESERVED_KERNEL_KEYS.contains(&key.as_str()) {
                return Err(KernelError::InvalidStatus {
                    target: "kernel".to_string(),
                    reason: format!("`{}` is reserved and set from the run configuration", key),
                });
            }
        }

        kernel.reset_kernel()?;
        if !self.status.is_empty() {
            info!(target: "denest-kernel", "  Setting kernel status: {:?}", self.status);
            kernel.set_kernel_status(&self.status)?;
        }

        let plan = self.seed_plan(kernel.num_virtual_processes())?;
        let mut derived = Status::new();
        derived.insert("data_path".to_string(), json!(self.data_path.display().to_string()));
        derived.insert("grng_seed".to_string(), json!(plan.grng_seed));
        derived.insert("rng_seeds".to_string(), json!(plan.rng_seeds));
        info!(
            target: "denest-kernel",
            "  Kernel seeds: grng_seed={}, rng_seeds={:?}",
            plan.grng_seed, plan.rng_seeds
        );
        kernel.set_kernel_status(&derived)?;

        for module in &self.extension_modules {
            match kernel.install_module(module) {
                Ok(()) => info!(target: "denest-kernel", "  ✓ Installed module `{}`", module),
                Err(KernelError::ModuleAlreadyLoaded(_)) => {
                    warn!(target: "denest-kernel", "  Module `{}` already loaded, continuing", module)
                }
                Err(e) => return Err(e),
            }
        }
        Ok(plan)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use denest_params::{ConfigurationError, ParamMap};

    fn node(params: serde_json::Value, kernel_params: serde_json::Value) -> ResolvedNode {
        let to_map = |value: serde_json::Value| -> ParamMap {
            serde_json::from_value(value).unwrap()
        };
        ResolvedNode {
            params: to_map(params),
            kernel_params: to_map(kernel_params),
        }
    }

    #[test]
    fn test_from_params_defaults() {
        let config = KernelConfig::from_params(&node(json!({}), json!({})), PathBuf::from("out/data")).unwrap();
        assert_eq!(config.kernel_seed, 1);
        assert_eq!(config.selection_seed, 1);
        assert!(config.extension_modules.is_empty());
        assert_eq!(config.data_path, PathBuf::from("out/data"));
    }

    #[test]
    fn test_from_params_passes_options_through() {
        let config = KernelConfig::from_params(
            &node(
                json!({"kernel_seed": 7, "extension_modules": ["mymodule"]}),
                json!({"resolution": 0.5, "local_num_threads": 2}),
            ),
            PathBuf::from("."),
        )
        .unwrap();
        assert_eq!(config.kernel_seed, 7);
        assert_eq!(config.extension_modules, vec!["mymodule".to_string()]);
        assert_eq!(config.status["resolution"], json!(0.5));
    }

    #[test]
    fn test_from_params_rejects_reserved_and_unknown() {
        let err = KernelConfig::from_params(&node(json!({}), json!({"grng_seed": 3})), PathBuf::from("."))
            .unwrap_err();
        assert!(matches!(err, ConfigurationError::ReservedParameter { ref key, .. } if key == "grng_seed"));

        let err = KernelConfig::from_params(&node(json!({"nest_seed": 3}), json!({})), PathBuf::from("."))
            .unwrap_err();
        assert!(matches!(err, ConfigurationError::UnrecognizedParameter { ref key, .. } if key == "nest_seed"));
    }

    #[test]
    fn test_seed_plan() {
        let config = KernelConfig {
            kernel_seed: 10,
            ..KernelConfig::default()
        };
        let plan = config.seed_plan(3).unwrap();
        assert_eq!(plan.grng_seed, 13);
        assert_eq!(plan.rng_seeds, vec![14, 15, 16]);
    }

    #[test]
    fn test_seed_plan_single_process() {
        let plan = KernelConfig::default().seed_plan(1).unwrap();
        assert_eq!(plan.grng_seed, 2);
        assert_eq!(plan.rng_seeds, vec![3]);
    }

    #[test]
    fn test_seed_plan_near_u64_max() {
        let config = KernelConfig {
            kernel_seed: u64::MAX - 2,
            ..KernelConfig::default()
        };
        let plan = config.seed_plan(1).unwrap();
        assert_eq!(plan.grng_seed, u64::MAX - 1);
        assert_eq!(plan.rng_seeds, vec![u64::MAX]);

        assert!(matches!(config.seed_plan(2), Err(KernelError::InvalidStatus { .. })));
        let config = KernelConfig {
            kernel_seed: u64::MAX,
            ..KernelConfig::default()
        };
        assert!(matches!(config.seed_plan(1), Err(KernelError::InvalidStatus { .. })));
    }
}
