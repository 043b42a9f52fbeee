use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "blobportd", version, about = "Serves fixed-topology blob networks")]
pub struct Cli {
    /// Log level (RUST_LOG)
    #[arg(long, global = true, default_value = "info")]
    pub log: String,

    /// Upper bound on accelerators to use; 0 forces CPU execution
    #[arg(long, global = true)]
    pub gpus: Option<usize>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Args, Debug)]
pub struct ModelArgs {
    /// Path to the binary network topology
    #[arg(long)]
    pub topology: PathBuf,

    /// Path to trained parameters in the same binary format
    #[arg(long)]
    pub weights: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Load a network and print its bindings and buffer shapes
    Info {
        #[command(flatten)]
        model: ModelArgs,
    },
    /// Drive synthetic requests through the batching pipeline
    Bench {
        #[command(flatten)]
        model: ModelArgs,

        /// Rows per request
        #[arg(long, default_value_t = 1)]
        batch: usize,

        /// Number of requests to send
        #[arg(long, default_value_t = 64)]
        requests: usize,

        /// Sessions (one per worker)
        #[arg(long, default_value_t = 1)]
        workers: usize,

        /// Rows to accumulate before a batch is dispatched
        #[arg(long, default_value_t = 8)]
        max_batch: usize,

        /// Longest a request waits for a batch to fill
        #[arg(long, default_value_t = 5)]
        max_delay_ms: u64,

        /// Grow every session to `max_batch` before sending traffic
        #[arg(long)]
        prewarm: bool,
    },
}
