use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use depot_types::{BusinessId, Category};

#[derive(Parser)]
#[command(
    name = "depot",
    about = "Depot: deposit, version and retrieve archived research objects",
    version,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Archive snapshot file
    #[arg(long, global = true, default_value = "depot-archive.json")]
    pub archive: PathBuf,

    /// Engine configuration (TOML)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

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
    /// Deposit a business object described by a JSON file
    Deposit(DepositArgs),
    /// Deposit a directory as one data item inside a collection
    Ingest(IngestArgs),
    /// Show the current version of an object
    Show(ShowArgs),
    /// List the current children of a collection
    Children(ChildrenArgs),
    /// Show every version of an object, newest first
    History(HistoryArgs),
    /// Allocate fresh business identifiers
    Allocate(AllocateArgs),
}

#[derive(Args)]
pub struct DepositArgs {
    /// JSON object with a "type" field (collection, data_item, ...)
    pub file: PathBuf,
    /// Read new file content from this directory, matched by file name
    #[arg(long)]
    pub content_dir: Option<PathBuf>,
}

#[derive(Args)]
pub struct IngestArgs {
    pub dir: PathBuf,
    /// Target collection
    #[arg(short, long)]
    pub collection: BusinessId,
    /// Data item id; allocated when omitted
    #[arg(long)]
    pub id: Option<BusinessId>,
    /// Data item name; defaults to the directory name
    #[arg(long)]
    pub name: Option<String>,
}

#[derive(Args)]
pub struct ShowArgs {
    pub business_id: BusinessId,
}

#[derive(Args)]
pub struct ChildrenArgs {
    pub collection: BusinessId,
    /// Page size; negative lists everything
    #[arg(short = 'n', long, default_value = "-1", allow_hyphen_values = true)]
    pub limit: i64,
    #[arg(long, default_value = "0")]
    pub offset: usize,
    /// List sub-collections instead of data items
    #[arg(long)]
    pub collections: bool,
    /// List metadata files describing the collection
    #[arg(long, conflicts_with = "collections")]
    pub metadata: bool,
}

#[derive(Args)]
pub struct HistoryArgs {
    pub business_id: BusinessId,
}

#[derive(Args)]
pub struct AllocateArgs {
    /// Category name or prefix (collection, ds, file, ...)
    pub category: Category,
    #[arg(short = 'n', long, default_value = "1")]
    pub count: usize,
}
