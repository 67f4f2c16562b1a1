//! CLI command definitions using clap.
//!
//! - run: sample, plan and mine until quotas are met
//! - discover: refresh the candidate table from the hosting API
//! - status: per-category quota progress
//! - plan: dry-run shard planning for one candidate

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Repominer - adaptive, resumable repository history miner
#[derive(Parser, Debug)]
#[command(name = "repominer")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Optional config file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Check if verbose mode is enabled
    pub fn is_verbose(&self) -> bool {
        self.verbose
    }
}

/// Main subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a full batch: sample, plan, mine
    Run {
        /// Refresh candidates from the hosting API first
        #[arg(short, long)]
        discover: bool,
    },

    /// Crawl the organization's repositories into the candidate table
    Discover {
        /// Also fetch commit counts, used to start large projects first
        #[arg(short, long)]
        size_hints: bool,
    },

    /// Show mined / available / target per category
    Status,

    /// Print the shards that would be planned for one candidate
    Plan {
        /// Candidate project name
        name: String,
    },
}
