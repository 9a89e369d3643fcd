//! Command-line interface

pub mod output;

use clap::Parser;
use std::ffi::OsString;
use std::path::PathBuf;
use std::time::Duration;

/// File used when no configuration is named
pub const DEFAULT_CONFIG: &str = ".gitlab-ci.yml";

/// Run a staged CI pipeline locally
#[derive(Debug, Parser, Clone)]
#[command(name = "stagerun")]
#[command(version)]
#[command(about = "Run a staged CI pipeline configuration on this machine", long_about = None)]
pub struct Cli {
    /// Pipeline configuration file
    #[arg(value_name = "CONFIG")]
    pub config: Option<String>,

    /// Print the execution plan without running anything
    #[arg(long)]
    pub dry_run: bool,

    /// Maximum number of jobs of one stage running at once
    #[arg(short = 'j', long = "jobs", default_value_t = 1, value_parser = clap::value_parser!(u16).range(1..))]
    pub jobs: u16,

    /// Kill a phase that runs longer than this many seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Print the run report as JSON
    #[arg(long)]
    pub json: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}

impl Cli {
    /// Parse CLI arguments from environment
    pub fn from_args() -> Self {
        Self::parse()
    }

    /// Parse CLI arguments from a slice
    pub fn try_parse_from<I, T>(itr: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        <Self as Parser>::try_parse_from(itr)
    }

    /// Configuration path, falling back to [`DEFAULT_CONFIG`]
    ///
    /// Anything that does not end in `ml` is not taken for a YAML file.
    pub fn config_path(&self) -> PathBuf {
        match &self.config {
            Some(path) if path.ends_with("ml") => PathBuf::from(path),
            _ => PathBuf::from(DEFAULT_CONFIG),
        }
    }

    pub fn max_parallelism(&self) -> usize {
        usize::from(self.jobs).max(1)
    }

    pub fn phase_timeout(&self) -> Option<Duration> {
        self.timeout.map(Duration::from_secs)
    }
}
