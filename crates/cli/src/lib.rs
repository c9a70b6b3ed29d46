use anyhow::{Context as AnyhowContext, Result};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use std::io::{self, Read};
use std::path::PathBuf;
use wordbook_collections::{
    CollectionEntry, CollectionId, EntryPatch, OverlaySource, SharedCollection, UserDefaultEntry,
};
use wordbook_dictionary::{
    normalize_word, Example, Meaning, PartOfSpeech, Provenance, WordDefinition, MAX_DIFFICULTY,
};

mod config;
mod context;
mod library;

pub use config::{RemoteConfig, StoreBackend, UsageConfig, WordbookConfig};
pub use context::AppContext;
pub use library::{AddWordsReport, DefineReport, Library, ScanReport};

fn print_stdout(text: &str) -> Result<()> {
    use std::io::Write;

    let mut stdout = io::stdout().lock();
    if let Err(err) = stdout
        .write_all(text.as_bytes())
        .and_then(|_| stdout.write_all(b"\n"))
        .and_then(|_| stdout.flush())
    {
        if err.kind() == io::ErrorKind::BrokenPipe {
            return Ok(());
        }
        return Err(err.into());
    }
    Ok(())
}

/// Prints `value` as JSON, or the human rendering.
fn emit<T: Serialize>(json: bool, value: &T, human: impl FnOnce(&T) -> String) -> Result<()> {
    if json {
        print_stdout(&serde_json::to_string_pretty(value)?)
    } else {
        print_stdout(&human(value))
    }
}

#[derive(Parser)]
#[command(name = "wordbook")]
#[command(about = "Local-first vocabulary collections with cached definitions", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Quiet mode: log only warnings/errors
    #[arg(long, global = true)]
    quiet: bool,

    /// Emit JSON instead of text (implies --quiet)
    #[arg(long, global = true)]
    json: bool,

    /// Config file (default: <config dir>/wordbook/config.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Data directory (overrides WORDBOOK_DATA_DIR)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Store backend: file|memory
    #[arg(long, global = true, value_enum)]
    backend: Option<StoreBackend>,

    /// Definition backend base URL (overrides WORDBOOK_REMOTE_URL)
    #[arg(long, global = true)]
    remote_url: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Look up definitions
    Define(DefineArgs),

    /// Extract candidate words from raw text and look them up
    Scan(ScanArgs),

    /// Manage collections
    #[command(subcommand)]
    Collection(CollectionCommand),

    /// Add words to a collection
    Add(AddArgs),

    /// Remove a word from a collection
    Remove(WordInCollectionArgs),

    /// Mark a word as mastered (or not) in a collection
    Master(MasterArgs),

    /// Edit a word inside one collection
    Customize(CustomizeArgs),

    /// Manage global per-word overrides
    #[command(subcommand)]
    Defaults(DefaultsCommand),

    /// Inspect or repair the mastery index
    #[command(subcommand)]
    Mastery(MasteryCommand),

    /// Show today's metered generation usage
    Usage(UsageArgs),

    /// Manage the definition cache
    #[command(subcommand)]
    Cache(CacheCommand),
}

#[derive(Args)]
struct DefineArgs {
    /// Words to look up
    #[arg(required = true)]
    words: Vec<String>,
}

#[derive(Args)]
struct ScanArgs {
    /// Raw text; read from stdin when omitted
    text: Vec<String>,

    /// Keep words already mastered
    #[arg(long)]
    include_mastered: bool,
}

#[derive(Subcommand)]
enum CollectionCommand {
    /// List collections
    List,
    /// Create a collection
    Create {
        name: String,
        #[arg(long, default_value = "")]
        description: String,
    },
    /// Delete a collection (not the default one)
    Delete { id: CollectionId },
    /// Show a collection's words with overrides applied
    Show { id: CollectionId },
    /// Collection statistics
    Stats { id: CollectionId },
    /// Write a collection as a portable JSON document
    Export {
        id: CollectionId,
        /// Destination file (stdout when omitted)
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
    /// Create a collection from an exported JSON document ("-" reads stdin)
    Import { path: PathBuf },
}

#[derive(Args)]
struct AddArgs {
    /// Target collection (default collection when omitted)
    #[arg(long, short)]
    collection: Option<CollectionId>,

    #[arg(required = true)]
    words: Vec<String>,
}

#[derive(Args)]
struct WordInCollectionArgs {
    #[arg(long, short)]
    collection: Option<CollectionId>,

    word: String,
}

#[derive(Args)]
struct MasterArgs {
    #[command(flatten)]
    target: WordInCollectionArgs,

    /// Clear the mastered flag instead of setting it
    #[arg(long)]
    unmark: bool,
}

#[derive(Args)]
struct DefinitionFields {
    #[arg(long)]
    pronunciation: Option<String>,

    /// 1-5
    #[arg(long)]
    difficulty: Option<u8>,

    /// "pos:native" or "pos:native:foreign", repeatable
    #[arg(long = "meaning")]
    meanings: Vec<String>,

    #[arg(long)]
    note: Option<String>,
}

#[derive(Args)]
struct CustomizeArgs {
    #[command(flatten)]
    target: WordInCollectionArgs,

    #[command(flatten)]
    fields: DefinitionFields,

    /// Comma-separated tags
    #[arg(long, value_delimiter = ',')]
    tags: Option<Vec<String>>,

    /// Drop customizations and restore the original snapshot
    #[arg(long, conflicts_with_all = ["pronunciation", "difficulty", "meanings", "note", "tags"])]
    reset: bool,
}

#[derive(Subcommand)]
enum DefaultsCommand {
    /// Create or replace the override for a word
    Set {
        word: String,
        #[command(flatten)]
        fields: DefinitionFields,
        /// "english|translation", repeatable
        #[arg(long = "example")]
        examples: Vec<String>,
    },
    /// Delete the override for a word
    Delete { word: String },
    /// List overrides
    List,
    /// Override statistics
    Stats,
}

#[derive(Subcommand)]
enum MasteryCommand {
    /// Is the word mastered in any collection?
    Check { word: String },
    /// Rescan every collection
    Rebuild,
    /// Index size
    Stats,
}

#[derive(Args)]
struct UsageArgs {
    /// Daily limit to compare against (default from config)
    #[arg(long)]
    limit: Option<u64>,
}

#[derive(Subcommand)]
enum CacheCommand {
    /// Clear the memory and persistent definition caches
    Clear,
    /// Cache sizes and hit rate
    Status,
}

pub async fn main_entry() -> Result<()> {
    let mut cli = Cli::parse();
    if cli.json {
        cli.quiet = true;
    }

    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if cli.quiet {
        builder.filter_level(log::LevelFilter::Warn);
    } else if cli.verbose {
        builder.filter_level(log::LevelFilter::Debug);
    }
    builder.target(env_logger::Target::Stderr).init();

    let mut config = WordbookConfig::load(cli.config.as_deref())?;
    if let Some(dir) = cli.data_dir.take() {
        config.data_dir = dir;
    }
    if let Some(backend) = cli.backend {
        config.store_backend = backend;
    }
    if let Some(url) = cli.remote_url.take() {
        config.remote.base_url = Some(url);
    }
    log::debug!(
        "Using {:?} store at {}",
        config.store_backend,
        config.data_dir.display()
    );

    let context = AppContext::open(config).await?;
    run(cli.command, &context, cli.json).await
}

async fn run(command: Commands, context: &AppContext, json: bool) -> Result<()> {
    let library = context.library();
    match command {
        Commands::Define(args) => {
            let report = library.define(&args.words).await;
            emit(json, &report, |report| {
                let mut out = render_definitions(&report.resolved.definitions);
                if report.resolved.definitions.is_empty() {
                    out.push_str("No definitions found");
                }
                if report.quota_exceeded {
                    out.push_str("\n(daily quota reached: remote lookups skipped)");
                }
                out.trim_end().to_string()
            })
        }
        Commands::Scan(args) => {
            let raw = if args.text.is_empty() {
                let mut buf = String::new();
                io::stdin()
                    .read_to_string(&mut buf)
                    .context("Failed to read stdin")?;
                vec![buf]
            } else {
                args.text
            };
            let report = library.scan_candidates(&raw, !args.include_mastered).await;
            emit(json, &report, |report| {
                let mut out = format!(
                    "{} candidates ({} already mastered)\n",
                    report.candidates.len(),
                    report.skipped_mastered.len()
                );
                out.push_str(&render_definitions(&report.definitions));
                out.trim_end().to_string()
            })
        }
        Commands::Collection(cmd) => run_collection(cmd, context, &library, json).await,
        Commands::Add(args) => {
            let collection_id = target_collection(context, args.collection).await?;
            let report = library.add_words(collection_id, &args.words).await?;
            emit(json, &report, |report| {
                let mut out = format!(
                    "Saved {} word(s) to collection {collection_id}",
                    report.saved.len()
                );
                if !report.skipped.is_empty() {
                    out.push_str(&format!("\nAlready present: {}", report.skipped.join(", ")));
                }
                if !report.missing.is_empty() {
                    out.push_str(&format!("\nNo definition: {}", report.missing.join(", ")));
                }
                out
            })
        }
        Commands::Remove(args) => {
            let (collection_id, entry) = find_entry(context, &args).await?;
            let removed = library.remove_entry(collection_id, entry.id).await?;
            emit(json, &removed, |removed| {
                format!("Removed '{}' from collection {collection_id}", removed.word)
            })
        }
        Commands::Master(args) => {
            let (collection_id, entry) = find_entry(context, &args.target).await?;
            let updated = library
                .set_mastered(collection_id, entry.id, !args.unmark)
                .await?;
            emit(json, &updated, |updated| {
                let state = if updated.progress.mastered {
                    "mastered"
                } else {
                    "not mastered"
                };
                format!("'{}' is now {state} in collection {collection_id}", updated.word)
            })
        }
        Commands::Customize(args) => {
            let (collection_id, entry) = find_entry(context, &args.target).await?;
            let updated = if args.reset {
                context
                    .collections
                    .reset_customization(collection_id, entry.id)
                    .await?
            } else {
                let patch = EntryPatch {
                    pronunciation: args.fields.pronunciation,
                    difficulty: args.fields.difficulty,
                    meanings: if args.fields.meanings.is_empty() {
                        None
                    } else {
                        Some(parse_meanings(&args.fields.meanings)?)
                    },
                    custom_note: args.fields.note,
                    tags: args.tags,
                };
                context
                    .collections
                    .customize_entry(collection_id, entry.id, patch)
                    .await?
            };
            emit(json, &updated, |updated| {
                format!(
                    "'{}' in collection {collection_id}: customized={}",
                    updated.word, updated.is_customized
                )
            })
        }
        Commands::Defaults(cmd) => run_defaults(cmd, context, json).await,
        Commands::Mastery(cmd) => run_mastery(cmd, context, json).await,
        Commands::Usage(args) => {
            let limit = args.limit.unwrap_or(context.config.usage.daily_limit);
            let usage = context.usage.current().await?;
            let quota = context.usage.check(limit).await?;
            let value = serde_json::json!({ "usage": usage, "quota": quota });
            emit(json, &value, |_| {
                format!(
                    "{}: {} metered call(s), ~${:.3}; {} of {} remaining{}",
                    usage.date,
                    usage.count,
                    usage.estimated_cost,
                    quota.remaining,
                    quota.limit,
                    if quota.exceeded { " (exceeded)" } else { "" }
                )
            })
        }
        Commands::Cache(CacheCommand::Clear) => {
            let removed = context.resolver.clear_cache().await?;
            emit(json, &serde_json::json!({ "removed": removed }), |_| {
                format!("Cleared {removed} cached definition(s)")
            })
        }
        Commands::Cache(CacheCommand::Status) => {
            let status = context.resolver.status();
            let stats = context.resolver.cache_stats().await?;
            let persisted = context.cache.len().await?;
            let value = serde_json::json!({
                "memory_entries": status.memory_entries,
                "memory_capacity": status.memory_capacity,
                "bundled_entries": status.bundled_entries,
                "persisted_entries": persisted,
                "total_requests": stats.total_requests,
                "hit_rate": stats.hit_rate(),
            });
            emit(json, &value, |_| {
                format!(
                    "memory {}/{}, bundled {}, persisted {}, hit rate {:.1}% over {} request(s)",
                    status.memory_entries,
                    status.memory_capacity,
                    status.bundled_entries,
                    persisted,
                    stats.hit_rate() * 100.0,
                    stats.total_requests
                )
            })
        }
    }
}

async fn run_collection(
    cmd: CollectionCommand,
    context: &AppContext,
    library: &Library,
    json: bool,
) -> Result<()> {
    match cmd {
        CollectionCommand::List => {
            let metas = context.collections.list_collections().await?;
            emit(json, &metas, |metas| {
                metas
                    .iter()
                    .map(|meta| {
                        let marker = if meta.is_default { " (default)" } else { "" };
                        format!("{:>4}  {}{marker}", meta.id, meta.name)
                    })
                    .collect::<Vec<_>>()
                    .join("\n")
            })
        }
        CollectionCommand::Create { name, description } => {
            let meta = context
                .collections
                .create_collection(&name, &description)
                .await?;
            emit(json, &meta, |meta| {
                format!("Created collection {} '{}'", meta.id, meta.name)
            })
        }
        CollectionCommand::Delete { id } => {
            let removed = library.delete_collection(id).await?;
            emit(json, &removed, |removed| {
                format!("Deleted collection {id} ({} word(s))", removed.len())
            })
        }
        CollectionCommand::Show { id } => {
            let words = library.view_collection(id).await?;
            emit(json, &words, |words| {
                words
                    .iter()
                    .map(|word| {
                        let tag = match word.source {
                            OverlaySource::Customized => " [custom]",
                            OverlaySource::UserDefault => " [default]",
                            OverlaySource::Base => "",
                        };
                        let mastered = if word.progress.mastered { " ✓" } else { "" };
                        format!(
                            "{}{tag}{mastered}: {}",
                            word.word,
                            summarize(&word.definition)
                        )
                    })
                    .collect::<Vec<_>>()
                    .join("\n")
            })
        }
        CollectionCommand::Stats { id } => {
            let stats = context.collections.statistics(id).await?;
            emit(json, &stats, |stats| {
                format!(
                    "total {}, mastered {}, learning {}, average difficulty {:.1}",
                    stats.total, stats.mastered, stats.learning, stats.average_difficulty
                )
            })
        }
        CollectionCommand::Export { id, output } => {
            let shared = context.collections.export_collection(id).await?;
            let document = shared.to_json_pretty()?;
            match output {
                None => print_stdout(&document),
                Some(path) => {
                    std::fs::write(&path, format!("{document}\n"))
                        .with_context(|| format!("Failed to write {}", path.display()))?;
                    let summary = serde_json::json!({
                        "collection": id,
                        "words": shared.metadata.word_count,
                        "path": path.display().to_string(),
                    });
                    emit(json, &summary, |_| {
                        format!(
                            "Exported collection {id} ({} word(s)) to {}",
                            shared.metadata.word_count,
                            path.display()
                        )
                    })
                }
            }
        }
        CollectionCommand::Import { path } => {
            let raw = if path.as_os_str() == "-" {
                let mut buf = String::new();
                io::stdin()
                    .read_to_string(&mut buf)
                    .context("Failed to read stdin")?;
                buf
            } else {
                std::fs::read_to_string(&path)
                    .with_context(|| format!("Failed to read {}", path.display()))?
            };
            let shared = SharedCollection::from_json(&raw)?;
            let report = context.collections.import_collection(shared).await?;
            emit(json, &report, |report| {
                let mut out = format!(
                    "Imported {} word(s) into collection {} '{}'",
                    report.imported, report.collection.id, report.collection.name
                );
                if !report.skipped.is_empty() {
                    out.push_str(&format!("\nSkipped: {}", report.skipped.join(", ")));
                }
                out
            })
        }
    }
}

async fn run_defaults(cmd: DefaultsCommand, context: &AppContext, json: bool) -> Result<()> {
    match cmd {
        DefaultsCommand::Set {
            word,
            fields,
            examples,
        } => {
            let mut entry = match context.defaults.get(&word).await? {
                Some(existing) => existing,
                None => match context.resolver.lookup(&word).await {
                    Some(definition) => UserDefaultEntry::from_definition(&definition),
                    None => UserDefaultEntry::from_definition(&WordDefinition {
                        word: normalize_word(&word),
                        pronunciation: String::new(),
                        difficulty: 1,
                        meanings: Vec::new(),
                        usage_notes: None,
                        provenance: Provenance::UserDefault,
                    }),
                },
            };
            if let Some(pronunciation) = fields.pronunciation {
                entry.pronunciation = pronunciation;
            }
            if let Some(difficulty) = fields.difficulty {
                entry.difficulty = difficulty.min(MAX_DIFFICULTY);
            }
            if !fields.meanings.is_empty() {
                entry.meanings = parse_meanings(&fields.meanings)?;
            }
            if fields.note.is_some() {
                entry.custom_note = fields.note;
            }
            if !examples.is_empty() {
                entry.custom_examples = parse_examples(&examples);
            }
            if entry.meanings.is_empty() {
                anyhow::bail!("'{word}' has no definition to start from; pass at least one --meaning");
            }
            let saved = context.defaults.save(entry).await?;
            emit(json, &saved, |saved| format!("Saved override for '{}'", saved.word))
        }
        DefaultsCommand::Delete { word } => {
            let existed = context.defaults.delete(&word).await?;
            emit(json, &serde_json::json!({ "deleted": existed }), |_| {
                if existed {
                    format!("Deleted override for '{}'", normalize_word(&word))
                } else {
                    format!("No override for '{}'", normalize_word(&word))
                }
            })
        }
        DefaultsCommand::List => {
            let all = context.defaults.all().await?;
            emit(json, &all, |all| {
                all.iter()
                    .map(|entry| format!("{}: {}", entry.word, summarize(&entry.to_definition())))
                    .collect::<Vec<_>>()
                    .join("\n")
            })
        }
        DefaultsCommand::Stats => {
            let stats = context.defaults.statistics().await?;
            emit(json, &stats, |stats| format!("{} override(s)", stats.total))
        }
    }
}

async fn run_mastery(cmd: MasteryCommand, context: &AppContext, json: bool) -> Result<()> {
    match cmd {
        MasteryCommand::Check { word } => {
            let mastered = context.mastery.is_mastered(&word);
            emit(
                json,
                &serde_json::json!({ "word": normalize_word(&word), "mastered": mastered }),
                |_| {
                    if mastered {
                        format!("'{}' is mastered", normalize_word(&word))
                    } else {
                        format!("'{}' is not mastered", normalize_word(&word))
                    }
                },
            )
        }
        MasteryCommand::Rebuild => {
            let count = context.mastery.rebuild().await?;
            emit(json, &serde_json::json!({ "total": count }), |_| {
                format!("Mastery index rebuilt: {count} word(s)")
            })
        }
        MasteryCommand::Stats => {
            let stats = context.mastery.stats();
            emit(json, &stats, |stats| format!("{} mastered word(s)", stats.total))
        }
    }
}

async fn target_collection(
    context: &AppContext,
    requested: Option<CollectionId>,
) -> Result<CollectionId> {
    match requested {
        Some(id) => Ok(id),
        None => Ok(context.collections.ensure_default_collection().await?.id),
    }
}

async fn find_entry(
    context: &AppContext,
    args: &WordInCollectionArgs,
) -> Result<(CollectionId, CollectionEntry)> {
    let collection_id = target_collection(context, args.collection).await?;
    let entry = context
        .collections
        .find_entry(collection_id, &args.word)
        .await?
        .with_context(|| {
            format!(
                "'{}' is not in collection {collection_id}",
                normalize_word(&args.word)
            )
        })?;
    Ok((collection_id, entry))
}

/// Parses `pos:native[:foreign]`.
fn parse_meanings(raw: &[String]) -> Result<Vec<Meaning>> {
    raw.iter()
        .map(|spec| -> Result<Meaning> {
            let mut parts = spec.splitn(3, ':');
            let pos = parts.next().unwrap_or_default().trim();
            let native = parts.next().unwrap_or_default().trim();
            let foreign = parts.next().unwrap_or_default().trim();
            if pos.is_empty() || native.is_empty() {
                anyhow::bail!("Invalid --meaning '{spec}': expected pos:native[:foreign]");
            }
            Ok(Meaning {
                part_of_speech: PartOfSpeech::parse(pos),
                native: native.to_string(),
                foreign: foreign.to_string(),
                examples: Vec::new(),
            })
        })
        .collect()
}

/// Parses `english|translation`; the translation is optional.
fn parse_examples(raw: &[String]) -> Vec<Example> {
    raw.iter()
        .filter_map(|spec| {
            let (en, native) = spec.split_once('|').unwrap_or((spec.as_str(), ""));
            let en = en.trim();
            (!en.is_empty()).then(|| Example {
                en: en.to_string(),
                native: native.trim().to_string(),
            })
        })
        .collect()
}

fn summarize(definition: &WordDefinition) -> String {
    definition
        .meanings
        .iter()
        .map(|meaning| format!("({}) {}", meaning.part_of_speech, meaning.native))
        .collect::<Vec<_>>()
        .join("; ")
}

fn render_definitions(definitions: &[WordDefinition]) -> String {
    let mut out = String::new();
    for definition in definitions {
        out.push_str(&format!(
            "{} {} [{}]\n",
            definition.word, definition.pronunciation, definition.provenance
        ));
        for meaning in &definition.meanings {
            out.push_str(&format!("  ({}) {}", meaning.part_of_speech, meaning.native));
            if !meaning.foreign.is_empty() {
                out.push_str(&format!(" - {}", meaning.foreign));
            }
            out.push('\n');
        }
    }
    out
}
