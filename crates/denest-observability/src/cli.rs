// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Per-crate debug flags
//!
//! `--debug-denest-network`, `--debug-all` and the `DENEST_DEBUG` environment
//! variable raise individual crates to `debug`.

use std::collections::BTreeSet;
use std::env;

use crate::KNOWN_CRATES;

/// Environment variable listing crates to debug (comma-separated, or `all`)
pub const DEBUG_ENV: &str = "DENEST_DEBUG";

/// Crates with debug logging enabled
///
/// # Example
/// ```rust
/// use denest_observability::CrateDebugFlags;
///
/// let flags = CrateDebugFlags::from_args(vec!["--debug-denest-network".to_string()]);
/// assert!(flags.is_enabled("denest-network"));
/// ```
#[derive(Debug, Clone, Default)]
pub struct CrateDebugFlags {
    pub enabled_crates: BTreeSet<String>,
}

impl CrateDebugFlags {
    /// Parse `--debug-{crate-name}` and `--debug-all` arguments; anything
    /// else is ignored
    pub fn from_args<I>(args: I) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        let mut flags = CrateDebugFlags::default();
        for arg in args {
            if arg == "--debug-all" {
                flags.enable_all();
            } else if let Some(crate_name) = arg.strip_prefix("--debug-") {
                flags.enabled_crates.insert(crate_name.to_string());
            }
        }
        flags
    }

    /// Merge crate names from a `DENEST_DEBUG`-style value
    pub fn extend_from_env_value(&mut self, value: &str) {
        if value.trim() == "all" {
            self.enable_all();
            return;
        }
        for crate_name in value.split(',') {
            let crate_name = crate_name.trim();
            if !crate_name.is_empty() {
                self.enabled_crates.insert(crate_name.to_string());
            }
        }
    }

    fn enable_all(&mut self) {
        for crate_name in KNOWN_CRATES {
            self.enabled_crates.insert(crate_name.to_string());
        }
    }

    pub fn is_enabled(&self, crate_name: &str) -> bool {
        self.enabled_crates.contains(crate_name)
    }

    pub fn any_enabled(&self) -> bool {
        !self.enabled_crates.is_empty()
    }

    /// `DEBUG` for enabled crates, `INFO` otherwise
    pub fn log_level(&self, crate_name: &str) -> tracing::Level {
        if self.is_enabled(crate_name) {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }

    /// Filter directives for `EnvFilter`
    ///
    /// Format: `"denest-network=debug,denest-kernel=debug,info"`, where the
    /// trailing directive is `default_level`.
    pub fn to_filter_string(&self, default_level: &str) -> String {
        let mut filters: Vec<String> = self
            .enabled_crates
            .iter()
            .map(|crate_name| format!("{}=debug", crate_name))
            .collect();
        filters.push(default_level.to_lowercase());
        filters.join(",")
    }
}

/// Debug flags from the process arguments and `DENEST_DEBUG`
pub fn parse_debug_flags() -> CrateDebugFlags {
    let mut flags = CrateDebugFlags::from_args(env::args());
    if let Ok(value) = env::var(DEBUG_ENV) {
        flags.extend_from_env_value(&value);
    }
    flags
}

/// Split `--debug-*` flags out of an argument list
///
/// Returns the remaining arguments (for the regular CLI parser) and the
/// parsed flags.
pub fn split_debug_args<I>(args: I) -> (Vec<String>, CrateDebugFlags)
where
    I: IntoIterator<Item = String>,
{
    let (debug, rest): (Vec<String>, Vec<String>) =
        args.into_iter().partition(|arg| arg.starts_with("--debug-"));
    let mut flags = CrateDebugFlags::from_args(debug);
    if let Ok(value) = env::var(DEBUG_ENV) {
        flags.extend_from_env_value(&value);
    }
    (rest, flags)
}

/// Help text for debug flags
pub fn debug_flags_help() -> String {
    format!(
        r#"Debug Flags:
  --debug-all                    Enable debug logging for all crates
  --debug-{{crate-name}}          Enable debug logging for specific crate

Available crates:
  {}

Environment Variable:
  DENEST_DEBUG={{crate-name}}[,{{crate-name}}]  Enable debug for crates (comma-separated)
  DENEST_DEBUG=all                               Enable debug for all crates
"#,
        KNOWN_CRATES.join(", ")
    )
}
