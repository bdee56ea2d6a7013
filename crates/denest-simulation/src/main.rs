// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! `denest` command-line entry point

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use denest_config::{load_config_or_default, DenestConfig};
use denest_kernel::{InMemoryKernel, Kernel};
use denest_observability::{debug_flags_help, init_logging, split_debug_args, FileLogging};
use denest_simulation::{RunOverrides, Simulation};
use std::collections::HashMap;
use std::path::PathBuf;
use tracing::info;

/// denest - multi-session spiking network simulations from parameter trees
#[derive(Parser, Debug)]
#[command(name = "denest", version, author, long_about = None, after_help = debug_flags_help())]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Run configuration file (default: search for denest.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log level for crates without a debug flag
    #[arg(long, global = true)]
    log_level: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Build the network and run every session
    Run {
        #[command(flatten)]
        paths: PathArgs,

        /// Keep files left in the output directory by a previous run
        #[arg(long, default_value_t = false)]
        no_clear: bool,
    },
    /// Check the tree and print the planned sessions without running them
    Validate {
        #[command(flatten)]
        paths: PathArgs,
    },
}

#[derive(clap::Args, Debug)]
struct PathArgs {
    /// Parameter tree documents; earlier documents win on conflicts
    #[arg(required = true)]
    trees: Vec<PathBuf>,

    /// Overrides `simulation.params.output_dir`
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Overrides `simulation.params.input_dir`
    #[arg(short, long)]
    input_dir: Option<PathBuf>,
}

impl Cli {
    /// CLI values in the form expected by the config loader
    fn overrides(&self) -> HashMap<String, String> {
        let mut map = HashMap::new();
        let paths = match &self.command {
            Command::Run { paths, no_clear } => {
                if *no_clear {
                    map.insert("clear_output_dir".to_string(), "false".to_string());
                }
                paths
            }
            Command::Validate { paths } => paths,
        };
        if let Some(dir) = &paths.output_dir {
            map.insert("output_dir".to_string(), dir.display().to_string());
        }
        if let Some(dir) = &paths.input_dir {
            map.insert("input_dir".to_string(), dir.display().to_string());
        }
        if let Some(level) = &self.log_level {
            map.insert("log_level".to_string(), level.clone());
        }
        map
    }

    fn trees(&self) -> &[PathBuf] {
        match &self.command {
            Command::Run { paths, .. } | Command::Validate { paths } => &paths.trees,
        }
    }
}

fn main() -> Result<()> {
    let (args, debug_flags) = split_debug_args(std::env::args());
    let cli = Cli::parse_from(args);

    let config: DenestConfig = load_config_or_default(cli.config.as_deref(), Some(&cli.overrides()))
        .context("Failed to load run configuration")?;

    let file_logging = config.logging.file_logging.then(|| FileLogging {
        log_dir: config.logging.log_dir.clone(),
        retention_days: config.logging.retention_days,
    });
    let _guard = init_logging(&debug_flags, &config.logging.level, file_logging.as_ref())?;

    print_banner();
    let overrides = RunOverrides::from_config(&config);
    let mut simulation = Simulation::from_paths(cli.trees(), &overrides)
        .with_context(|| format!("Invalid parameter tree: {:?}", cli.trees()))?;

    match &cli.command {
        Command::Validate { .. } => {
            let kernel = InMemoryKernel::new();
            simulation
                .network_spec()
                .validate_references(&kernel)
                .context("Network references do not resolve")?;
            for session in simulation.sessions() {
                println!("{:<24} {:>10} → {:>10} ms", session.name(), session.start(), session.end());
            }
            info!(target: "denest-simulation", "✅ Tree is valid");
        }
        Command::Run { .. } => {
            let mut kernel = InMemoryKernel::new();
            let summary = simulation.run(&mut kernel).context("Simulation failed")?;
            info!(
                target: "denest-simulation",
                "Output: {} (kernel {})",
                summary.output_dir.display(),
                kernel.version()
            );
        }
    }
    Ok(())
}

fn print_banner() {
    info!(target: "denest-simulation", "denest v{}", denest_simulation::VERSION);
}
