//! cfgtree cli interface

use clap::{Parser, Subcommand, ValueEnum};
use std::fmt::Formatter;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Change the work directory
    ///
    /// Can be specified multiple times. Note that all
    /// paths on the way to the final path must exist.
    ///
    /// This is equivalent to running { cd <directory>; cfgtree ... }
    #[clap(short = 'C', long = "directory", global(true))]
    pub directory: Vec<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Resolve configuration and print the node at PATH
    ///
    /// Reads a json document from stdin unless files are provided (via --input-file)
    #[command(alias = "r")]
    Resolve(ResolveCommand),

    /// Print debug information for development
    Dev(DevCommand),
}

#[derive(Parser, Debug)]
pub struct ResolveCommand {
    #[clap(flatten)]
    pub input: InputArgs,

    #[clap(flatten)]
    pub output: OutputArgs,

    /// Node to print, relative paths start at the root
    #[clap(default_value = "/")]
    pub path: String,
}

#[derive(Parser, Debug)]
pub struct InputArgs {
    /// Load a file (and its includes)
    ///
    /// Can be specified multiple times, later files override earlier ones.
    #[clap(short = 'f', long = "input-file")]
    pub files: Vec<PathBuf>,

    /// Load a file as external configuration
    ///
    /// Externals are resolved on their own and only consulted for references
    /// the input files cannot satisfy themselves.
    #[clap(short = 'x', long = "external")]
    pub externals: Vec<PathBuf>,

    /// Set an environment variable used for ${NAME} expansion
    #[clap(short = 's', long = "set", value_name = "NAME=VALUE", value_parser = parse_assignment)]
    pub variables: Vec<(String, String)>,

    /// Do not expand variables from the process environment
    #[clap(long = "no-process-env")]
    pub no_process_env: bool,

    /// Give up resolving references after this many passes
    #[clap(long = "max-cycles", default_value_t = cfgtree::reader::DEFAULT_MAX_CYCLES)]
    pub max_cycles: usize,
}

fn parse_assignment(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((name, value)) if !name.is_empty() => Ok((name.to_string(), value.to_string())),
        _ => Err(format!("expected NAME=VALUE, got `{raw}`")),
    }
}

#[derive(Parser, Debug)]
pub struct OutputArgs {
    #[arg(short = 'F', long = "output-format", default_value_t)]
    pub format: OutputFormat,
}

#[derive(ValueEnum, Clone, Default, Debug)]
pub enum OutputFormat {
    #[default]
    Json,
    Yaml,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Json => f.write_str("json"),
            OutputFormat::Yaml => f.write_str("yaml"),
        }
    }
}

#[derive(Parser, Debug)]
pub struct DevCommand {
    #[clap(flatten)]
    pub input: InputArgs,

    #[command(subcommand)]
    pub command: DevSubCommand,
}

#[derive(Subcommand, Debug)]
pub enum DevSubCommand {
    /// Loaded documents in merge order
    Documents,
    /// Merged tree before resolution
    Tree,
    /// Placeholders of the merged tree before resolution
    Unresolved,
}
