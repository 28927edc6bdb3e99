use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "sharc",
    about = "Shared module archives — record an import set, dump it, map it back",
    version,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Command {
    /// Import modules, optionally recording them or serving them from an archive
    Run(RunArgs),
    /// List an archive's stamp and records
    Inspect(InspectArgs),
    /// Check an archive against its checksums
    Verify(VerifyArgs),
}

#[derive(Args)]
pub struct RunArgs {
    /// Modules to import, in order
    pub imports: Vec<String>,
    /// dump | share | debug-dump | debug-load (SHARC_MODE when absent)
    #[arg(short, long)]
    pub mode: Option<String>,
    /// Archive file (SHARC_ARCHIVE, then modules.sharc)
    #[arg(long)]
    pub archive: Option<PathBuf>,
    /// Module list consumed by dump mode (SHARC_LIST, then modules.lst)
    #[arg(long)]
    pub list: Option<PathBuf>,
    /// Record every import of this run into a list file
    #[arg(long)]
    pub dump_list: Option<PathBuf>,
    /// Hash seed policy: "random" or a fixed integer
    #[arg(long)]
    pub seed: Option<String>,
    /// Frozen set layout in dumps: canonical | literal
    #[arg(long)]
    pub set_layout: Option<String>,
    /// Keep dumping when a name cannot be archived faithfully
    #[arg(long)]
    pub skip_conflicts: bool,
    /// Module universe manifest (TOML); the built-in universe when absent
    #[arg(long)]
    pub manifest: Option<PathBuf>,
    /// Literal to serialize in debug-dump mode
    #[arg(short, long)]
    pub expr: Option<String>,
}

#[derive(Args)]
pub struct InspectArgs {
    pub archive: PathBuf,
}

#[derive(Args)]
pub struct VerifyArgs {
    pub archive: PathBuf,
}
