//! CLI command definitions and parsing
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "lease-rag",
    version,
    about = "Hybrid legal retrieval for housing-lease questions",
    long_about = "lease-rag answers housing-lease questions from three local legal corpora (statutes, \
                  regulations and case law) using dense search, BM25 fusion, cross-encoder reranking \
                  and full case-text expansion, and arranges the material by legal priority."
)]
pub struct Cli {
    /// Global config file path (defaults to ~/.config/lease-rag/config.toml)
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Profile to apply on top of the config file
    #[arg(short, long, global = true)]
    pub profile: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Answer a question from the retrieved legal material
    Ask {
        /// Question to ask
        question: String,

        /// Use the question as-is instead of normalizing legal terms
        #[arg(long)]
        skip_normalization: bool,

        /// Also print the structured context the answer was built from
        #[arg(long)]
        show_context: bool,
    },

    /// Run retrieval only and list the final documents
    Search {
        /// Search query text
        query: String,

        /// Show results in JSON format
        #[arg(long)]
        json: bool,

        /// Use the query as-is instead of normalizing legal terms
        #[arg(long)]
        skip_normalization: bool,
    },

    /// Show how a question is rewritten into statutory terms
    Normalize {
        /// Question to normalize
        question: String,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show {
        /// Show only a specific section
        #[arg(short, long)]
        section: Option<String>,
    },

    /// Validate configuration file
    Validate {
        /// Path to config file (defaults to standard location)
        #[arg(short, long)]
        file: Option<PathBuf>,
    },

    /// Initialize default configuration
    Init {
        /// Force overwrite existing config
        #[arg(short, long)]
        force: bool,
    },
}

impl Cli {
    /// Parse CLI arguments from command line
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
