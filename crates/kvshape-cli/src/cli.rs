use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "kvshape",
    about = "Map nested JSON documents onto key-value store commands",
    version,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Print the command batch a save would commit
    Plan(DocumentArgs),
    /// Save into an in-memory store, then load back and compare
    Roundtrip(DocumentArgs),
    /// Check a document against a schema
    Validate(DocumentArgs),
}

#[derive(Args, Debug)]
pub struct DocumentArgs {
    /// Schema file (TOML)
    #[arg(short, long)]
    pub schema: PathBuf,
    /// JSON document, `-` for stdin
    #[arg(short, long)]
    pub input: PathBuf,
    /// Repository overrides (TOML with `key` and `ttl`)
    #[arg(short, long)]
    pub config: Option<PathBuf>,
}
