// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use clap::{Parser, Subcommand};
use keyseq_cli::commands::{compare, inspect, verify};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "keyseq")]
#[command(about = "Offline tools for key-directory sequencer data", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print a domain's mutation log or outcome log.
    Inspect {
        /// Path to a `<domain>.log` or `<domain>.outcomes` file.
        path: PathBuf,

        /// Show at most this many frames.
        #[arg(long, short)]
        limit: Option<usize>,
    },
    /// Verify an exported run of signed map heads.
    VerifyHeads {
        heads_path: PathBuf,

        /// Hex Ed25519 public key of the domain's map.
        #[arg(long)]
        public_key: String,
    },
    /// Check two exported head files for equivocation.
    CompareHeads {
        left: PathBuf,
        right: PathBuf,

        #[arg(long)]
        public_key: String,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Inspect { path, limit } => inspect::run(&path, limit).map(|_| ()),
        Commands::VerifyHeads { heads_path, public_key } => verify::run(&heads_path, &public_key),
        Commands::CompareHeads { left, right, public_key } => {
            compare::run(&left, &right, &public_key).map(|_| ())
        }
    }
}
