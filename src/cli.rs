use clap::{Parser, Subcommand};

/// pvsync — SEMS portal collector and ingestion service
#[derive(Parser)]
#[command(name = "pvsync", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the collector server
    Serve {
        /// Port to bind (overrides PVSYNC_PORT)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Run one fetch→cache cycle and exit
    SyncOnce,

    /// Run one ingestion cycle and exit
    IngestOnce,
}
