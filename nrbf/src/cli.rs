use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    name = "nrbf",
    about = "Inspect and validate .NET Remoting Binary Format (BinaryFormatter) streams.",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    #[command(visible_aliases = ["l", "ls"], about = "List the objects in a stream")]
    List(ListArgs),

    #[command(about = "Print the decoded object graph as JSON")]
    Show(ShowArgs),

    #[command(visible_aliases = ["t", "test"], about = "Check that a stream decodes cleanly")]
    Validate(ValidateArgs),
}

#[derive(Debug, clap::Args)]
pub struct ListArgs {
    /// Stream file to read
    pub file: PathBuf,

    /// Output as JSON
    #[arg(short, long)]
    pub json: bool,

    /// Deepest object nesting to follow
    #[arg(long, default_value_t = 256)]
    pub max_depth: usize,
}

#[derive(Debug, clap::Args)]
pub struct ShowArgs {
    /// Stream file to read
    pub file: PathBuf,

    /// Deepest object nesting to follow
    #[arg(long, default_value_t = 256)]
    pub max_depth: usize,
}

#[derive(Debug, clap::Args)]
pub struct ValidateArgs {
    /// Stream file to read
    pub file: PathBuf,

    /// Only report failures
    #[arg(short, long)]
    pub quiet: bool,

    /// Deepest object nesting to follow
    #[arg(long, default_value_t = 256)]
    pub max_depth: usize,
}
