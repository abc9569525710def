//! Command-line interface.
//!
//! - `ivanti-export run [ENTITY...]` - export entities to batch files
//! - `ivanti-export entities` - list the configured entities
//!
//! Settings come from an optional TOML file (`--config` /
//! `IVANTI_EXPORT_CONFIG`); flags and environment variables override it.

pub mod entities;
pub mod run;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::ExportConfig;
use crate::error::AppError;

/// Export Ivanti OData business objects into size-bounded JSON batch files.
#[derive(Debug, Parser)]
#[command(name = "ivanti-export")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Configuration file (TOML).
    #[arg(long, short, global = true, env = "IVANTI_EXPORT_CONFIG")]
    pub config: Option<PathBuf>,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Loads the configuration file, or the defaults when none is given.
    pub fn load_config(&self) -> Result<ExportConfig, AppError> {
        match &self.config {
            Some(path) => ExportConfig::load(path),
            None => Ok(ExportConfig::default()),
        }
    }
}

/// CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Fetch, clean and write batches for one or more entities.
    Run(run::RunArgs),
    /// List configured entities.
    Entities,
}

/// Process exit status for a finished command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Everything was exported.
    Complete,
    /// At least one entity stopped early on a page failure.
    Partial,
    /// At least one entity hit a fatal error.
    Failed,
}

impl Outcome {
    pub fn exit_code(self) -> u8 {
        match self {
            Outcome::Complete => 0,
            Outcome::Failed => 1,
            Outcome::Partial => 2,
        }
    }
}
