//! dataferry CLI Library
//!
//! Command-line client for the dataferry server.
//!
//! # Overview
//!
//! - **Submission**: start a chunked delivery run (`ferry submit`)
//! - **Status**: run state and delivery cursor (`ferry status`)
//! - **Health**: server and progress store connectivity (`ferry health`)
//! - **Identifiers**: compute file and ingestion ids offline (`ferry id`)

pub mod api;
pub mod commands;
pub mod error;

// Re-export commonly used types
pub use error::{CliError, Result};

use clap::{Parser, Subcommand};

/// dataferry - chunked, checksummed JSON delivery
#[derive(Parser, Debug)]
#[command(name = "ferry")]
#[command(author, version, about, long_about = None)]
#[command(arg_required_else_help = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Print raw JSON instead of formatted text
    #[arg(long, global = true)]
    pub json: bool,

    /// Server URL
    #[arg(long, env = "FERRY_SERVER_URL", default_value = api::client::DEFAULT_SERVER_URL, global = true)]
    pub server_url: String,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start an ingestion run on the server
    Submit {
        /// Local path, directory, or http(s) URL of the JSON source
        #[arg(short, long)]
        file: String,

        /// Consumer endpoint that receives the chunks
        #[arg(short, long)]
        callback: String,

        /// At most this many records per chunk (1-4000)
        #[arg(long, conflicts_with = "bytes", required_unless_present = "bytes")]
        records: Option<u32>,

        /// At most this many serialized bytes per chunk
        #[arg(long)]
        bytes: Option<u64>,

        /// Source format
        #[arg(short = 't', long = "type", default_value = "json")]
        file_type: String,

        /// Continue the resumable run of this file instead of starting fresh
        #[arg(long)]
        resume: bool,
    },

    /// Show the state of an ingestion run
    Status {
        /// Ingestion id returned by `ferry submit`
        ingestion_id: String,
    },

    /// Check server health
    Health,

    /// Compute file and ingestion identifiers without contacting the server
    Id {
        /// Source path exactly as it will be submitted
        path: String,

        /// Source format
        #[arg(short = 't', long = "type", default_value = "json")]
        file_type: String,

        /// Use the resumable version token
        #[arg(long, conflicts_with = "version")]
        resume: bool,

        /// Explicit version token, e.g. a millisecond timestamp
        #[arg(short = 'V', long)]
        version: Option<String>,
    },
}
