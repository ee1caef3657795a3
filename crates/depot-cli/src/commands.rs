use std::path::{Component, Path, PathBuf};

use anyhow::{bail, Context};
use colored::Colorize;
use serde::Serialize;
use serde_json::json;
use tracing::debug;
use walkdir::WalkDir;

use depot_engine::{
    BusinessObjectState, DepositEngine, DepositReceipt, EngineConfig, ExtractedContainer,
    SearchResult, StatePayload, WaitOutcome,
};
use depot_model::{BusinessObject, DataFile, DataItem, MetadataFile};
use depot_store::{ContentHasher, InMemoryArchive};
use depot_types::BusinessId;

use crate::cli::*;

pub async fn run_command(cli: Cli) -> anyhow::Result<()> {
    let session = Session::open(&cli)?;
    match cli.command {
        Command::Deposit(args) => cmd_deposit(&session, args).await,
        Command::Ingest(args) => cmd_ingest(&session, args).await,
        Command::Show(args) => cmd_show(&session, args),
        Command::Children(args) => cmd_children(&session, args),
        Command::History(args) => cmd_history(&session, args),
        Command::Allocate(args) => cmd_allocate(&session, args),
    }
}

/// An engine over the snapshot named on the command line.
struct Session {
    engine: DepositEngine<InMemoryArchive>,
    archive_path: PathBuf,
    format: OutputFormat,
}

impl Session {
    fn open(cli: &Cli) -> anyhow::Result<Self> {
        let config = match &cli.config {
            Some(path) => EngineConfig::load(path)?,
            None => EngineConfig::default(),
        };
        let archive = InMemoryArchive::open_or_create(&cli.archive, config.archive.clone())
            .with_context(|| format!("opening archive {}", cli.archive.display()))?;
        debug!(path = %cli.archive.display(), records = archive.len(), "archive opened");
        let engine = DepositEngine::open(archive, &config)?;
        Ok(Self {
            engine,
            archive_path: cli.archive.clone(),
            format: cli.format,
        })
    }

    /// Wait for a submitted deposit, then persist the archive.
    async fn complete(&self, receipt: DepositReceipt) -> anyhow::Result<()> {
        match self.engine.wait(&receipt.deposit_id).await? {
            WaitOutcome::Deposited => {}
            WaitOutcome::Failed { reason } => {
                bail!("deposit {} of {} failed: {reason}", receipt.deposit_id, receipt.business_id)
            }
            WaitOutcome::TimedOut { attempts } => bail!(
                "deposit {} of {} still pending after {attempts} checks",
                receipt.deposit_id,
                receipt.business_id
            ),
        }
        self.engine
            .archive()
            .save(&self.archive_path)
            .with_context(|| format!("saving archive {}", self.archive_path.display()))?;

        let record = self.engine.record(&receipt.deposit_id)?;
        match self.format {
            OutputFormat::Json => print_json(&json!({ "receipt": receipt, "deposit": record })),
            OutputFormat::Text => {
                println!(
                    "{} Deposited {} {}",
                    "✓".green().bold(),
                    receipt.category,
                    receipt.business_id.to_string().yellow().bold()
                );
                println!("  Deposit: {}", receipt.deposit_id.to_string().cyan());
                println!("  Root:    {}", receipt.root.short_hex().dimmed());
                println!("  State:   {}", receipt.subject_state.short_hex().dimmed());
                println!("  Records: {}", record.records.len());
                Ok(())
            }
        }
    }
}

async fn cmd_deposit(session: &Session, args: DepositArgs) -> anyhow::Result<()> {
    let text = std::fs::read_to_string(&args.file)
        .with_context(|| format!("reading {}", args.file.display()))?;
    let mut object: BusinessObject = serde_json::from_str(&text)
        .with_context(|| format!("parsing {}", args.file.display()))?;
    if let Some(dir) = &args.content_dir {
        attach_sources(&session.engine, &mut object, dir)?;
    }
    let receipt = session.engine.deposit(object)?;
    session.complete(receipt).await
}

async fn cmd_ingest(session: &Session, args: IngestArgs) -> anyhow::Result<()> {
    let container = read_directory(&args.dir, args.name)?;
    let receipt = session
        .engine
        .deposit_container(&args.collection, args.id, container)?;
    session.complete(receipt).await
}

fn cmd_show(session: &Session, args: ShowArgs) -> anyhow::Result<()> {
    let state = session.engine.resolver().find_latest_state(&args.business_id)?;
    let object = session
        .engine
        .query()
        .retrieve_object(state.category, args.business_id.clone())?
        .into_first()
        .with_context(|| format!("{} has no readable state", args.business_id))?;

    if session.format == OutputFormat::Json {
        return print_json(&json!({ "state": state, "object": object }));
    }
    println!(
        "{} {} (version {})",
        state.category.to_string().cyan(),
        state.business_id.to_string().yellow().bold(),
        state.version
    );
    println!("  Name:   {}", object.name());
    if let Some(parent) = object.parent_id() {
        println!("  Parent: {}", parent.to_string().yellow());
    }
    println!("  Root:   {}", state.root.short_hex().dimmed());
    println!("  Head:   {}", state.head.short_hex().dimmed());
    if let Some(files) = object.files() {
        println!("  Files:");
        for file in files {
            println!(
                "    {}  {} ({}, {} bytes)",
                label(file.id.as_ref()).yellow(),
                file.name,
                file.media_type,
                file.size
            );
        }
    }
    if let BusinessObject::Collection(collection) = &object {
        if !collection.children_ids.is_empty() {
            let children: Vec<String> = collection.children_ids.iter().map(|c| c.to_string()).collect();
            println!("  Children: {}", children.join(", "));
        }
    }
    Ok(())
}

fn cmd_children(session: &Session, args: ChildrenArgs) -> anyhow::Result<()> {
    let query = session.engine.query();
    if args.collections {
        let page = query.retrieve_sub_collections(&args.collection, args.limit, args.offset)?;
        print_page(session.format, &page, |c| {
            format!("{}  {} ({} children)", label(c.id.as_ref()).yellow(), c.name, c.children_ids.len())
        })
    } else if args.metadata {
        let page = query.retrieve_metadata(&args.collection)?;
        print_page(session.format, &page, |m: &MetadataFile| {
            format!("{}  {} [{}]", label(m.id.as_ref()).yellow(), m.name, m.format)
        })
    } else {
        let page = query.retrieve_children(&args.collection, args.limit, args.offset)?;
        print_page(session.format, &page, |d: &DataItem| {
            format!("{}  {} ({} files)", label(d.id.as_ref()).yellow(), d.name, d.files.len())
        })
    }
}

fn cmd_history(session: &Session, args: HistoryArgs) -> anyhow::Result<()> {
    let history = session.engine.resolver().history(&args.business_id)?;
    if session.format == OutputFormat::Json {
        return print_json(&history);
    }
    for state in &history {
        println!(
            "{}  {}  {}",
            format!("v{}", state.version).yellow().bold(),
            state.head.short_hex().dimmed(),
            version_name(state)
        );
    }
    Ok(())
}

fn cmd_allocate(session: &Session, args: AllocateArgs) -> anyhow::Result<()> {
    let ids = (0..args.count)
        .map(|_| session.engine.allocator().allocate(args.category))
        .collect::<Result<Vec<BusinessId>, _>>()?;
    match session.format {
        OutputFormat::Json => print_json(&ids),
        OutputFormat::Text => {
            for id in &ids {
                println!("{id}");
            }
            Ok(())
        }
    }
}

// ---- Helpers ----

fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_page<T: Serialize>(
    format: OutputFormat,
    page: &SearchResult<T>,
    line: impl Fn(&T) -> String,
) -> anyhow::Result<()> {
    if format == OutputFormat::Json {
        return print_json(page);
    }
    if page.is_empty() {
        println!("No children.");
    }
    for item in &page.items {
        println!("  {}", line(item));
    }
    println!(
        "{}",
        format!("{} shown, {} total, offset {}", page.len(), page.total, page.offset).dimmed()
    );
    Ok(())
}

fn label(id: Option<&BusinessId>) -> String {
    id.map(|i| i.to_string()).unwrap_or_else(|| "-".into())
}

fn version_name(state: &BusinessObjectState) -> String {
    StatePayload::from_record(state.head, &state.record)
        .map(|payload| payload.name().to_string())
        .unwrap_or_else(|_| "(unreadable state)".into())
}

/// Fill `source` of listed files from `dir/<file name>`.
///
/// Files whose content matches the archived head are left without a source
/// so the deposit carries them forward.
fn attach_sources(
    engine: &DepositEngine<InMemoryArchive>,
    object: &mut BusinessObject,
    dir: &Path,
) -> anyhow::Result<()> {
    let files: &mut Vec<DataFile> = match object {
        BusinessObject::DataItem(item) => &mut item.files,
        BusinessObject::MetadataFile(metadata) => &mut metadata.files,
        BusinessObject::DataFile(file) => return attach_source(engine, file, dir),
        _ => return Ok(()),
    };
    for file in files.iter_mut() {
        attach_source(engine, file, dir)?;
    }
    Ok(())
}

fn attach_source(
    engine: &DepositEngine<InMemoryArchive>,
    file: &mut DataFile,
    dir: &Path,
) -> anyhow::Result<()> {
    if file.has_source() {
        return Ok(());
    }
    let name = Path::new(&file.name);
    if name.is_absolute()
        || !name
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
    {
        bail!("file name {:?} points outside {}", file.name, dir.display());
    }
    let path = dir.join(name);
    if !path.is_file() {
        return Ok(());
    }
    let data = std::fs::read(&path).with_context(|| format!("reading {}", path.display()))?;
    if let Some(id) = &file.id {
        if let Ok(head) = engine.resolver().find_latest_state(id) {
            if head.record.content == Some(ContentHasher::CONTENT.hash(&data)) {
                debug!(file = %file.name, "content unchanged, carrying forward");
                return Ok(());
            }
        }
    }
    debug!(file = %file.name, bytes = data.len(), "attached content");
    *file = file.clone().with_source(data);
    Ok(())
}

/// Act as the container extractor for a plain directory.
fn read_directory(dir: &Path, name: Option<String>) -> anyhow::Result<ExtractedContainer> {
    if !dir.is_dir() {
        bail!("{} is not a directory", dir.display());
    }
    let name = name.unwrap_or_else(|| {
        dir.file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| dir.display().to_string())
    });

    let mut container = ExtractedContainer::new(name, "inode/directory");
    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = entry.path().strip_prefix(dir)?;
        let path = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        let data = std::fs::read(entry.path())
            .with_context(|| format!("reading {}", entry.path().display()))?;
        debug!(%path, bytes = data.len(), "container entry");
        container = container.with_entry(path, media_type_for(relative), data);
    }
    Ok(container)
}

fn media_type_for(path: &Path) -> &'static str {
    let extension = path
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    match extension.as_str() {
        "csv" => "text/csv",
        "tsv" => "text/tab-separated-values",
        "txt" => "text/plain",
        "md" => "text/markdown",
        "json" => "application/json",
        "xml" => "application/xml",
        "pdf" => "application/pdf",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "tif" | "tiff" => "image/tiff",
        "zip" => "application/zip",
        "tar" => "application/x-tar",
        "gz" => "application/gzip",
        _ => "application/octet-stream",
    }
}
