//! CLI entry point for the knowledge-base search engine.
//!
//! Provides commands for managing records, generating embeddings and
//! running semantic queries against a local store.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{
    Parser, Subcommand,
    builder::styling::{AnsiColor, Effects, Styles},
};
use serde::Serialize;
use tracing::{debug, info, warn};

use kbsearch::display::{self, THEME};
use kbsearch::io::{ExitCode, JsonResponse, OutputFormat};
use kbsearch::semantic::EmbeddingStatus;
use kbsearch::storage::StoreMetadata;
use kbsearch::{
    BackfillCoordinator, BoundedEncoder, ContentHash, EmbeddingCapability, EmbeddingStore,
    KbError, Payload, Record, RecordId, RecordLifecycle, SearchService, Settings, StoreError,
    StorePersistence, logging,
};

fn clap_cargo_style() -> Styles {
    Styles::styled()
        .header(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .usage(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .literal(AnsiColor::Green.on_default())
        .placeholder(AnsiColor::Green.on_default())
}

/// Semantic search over a question/answer knowledge base
#[derive(Parser)]
#[command(
    name = "kbsearch",
    version = env!("CARGO_PKG_VERSION"),
    about = "Semantic search over a question/answer knowledge base",
    next_line_help = true,
    styles = clap_cargo_style(),
    after_help = "Quick Start:\n  $ kbsearch init\n  $ kbsearch add \"How do I install Python?\" --answer \"Use the official installer\"\n  $ kbsearch search python setup"
)]
struct Cli {
    /// Path to custom settings.toml file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Print debug logs to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output in JSON format
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Available CLI commands
#[derive(Subcommand)]
enum Commands {
    /// Initialize project
    #[command(about = "Set up .kbsearch directory with default configuration")]
    Init {
        /// Force overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },

    /// Show current configuration settings
    #[command(about = "Display active settings")]
    Config,

    /// Add a record
    #[command(
        about = "Add a question/answer record",
        after_help = "Examples:\n  kbsearch add \"What is Rust?\" --answer \"A systems language\"\n  kbsearch add \"Reset password\" --field category=account"
    )]
    Add {
        /// Text that gets embedded and searched (e.g. the question)
        text: String,

        /// Answer stored with the record
        #[arg(short, long)]
        answer: Option<String>,

        /// Explicit record id (derived from the text and time if omitted)
        #[arg(long)]
        id: Option<String>,

        /// Extra payload fields as key=value
        #[arg(long = "field", value_parser = parse_field)]
        fields: Vec<(String, String)>,
    },

    /// Edit a record
    #[command(about = "Change a record's text, answer or fields")]
    Edit {
        id: String,

        /// New text; the embedding is regenerated
        #[arg(short, long)]
        text: Option<String>,

        /// New answer
        #[arg(short, long)]
        answer: Option<String>,

        /// Payload fields to set as key=value
        #[arg(long = "field", value_parser = parse_field)]
        fields: Vec<(String, String)>,
    },

    /// Remove a record
    #[command(about = "Delete a record and its embedding")]
    Remove { id: String },

    /// List records
    #[command(about = "List records with their embedding state")]
    List,

    /// Generate missing embeddings
    #[command(
        about = "Generate embeddings for records that lack one",
        long_about = "Embed every record without a current embedding, in batches.\n\nFailed batches are reported and left for the next run."
    )]
    Backfill {
        /// Records per model call (overrides config)
        #[arg(short, long)]
        batch_size: Option<usize>,

        /// Drop all embeddings first, e.g. after changing the model
        #[arg(long)]
        rebuild: bool,
    },

    /// Search records
    #[command(
        about = "Find records semantically similar to a query",
        after_help = "Examples:\n  kbsearch search how do I install python\n  kbsearch search \"git remote\" -k 3 -t 0.5\n  kbsearch search python --json | jq '.data[].id'"
    )]
    Search {
        /// Query text
        #[arg(required = true, num_args = 1..)]
        query: Vec<String>,

        /// Maximum number of results (overrides config)
        #[arg(short = 'k', long)]
        top_k: Option<usize>,

        /// Minimum score between 0.0 and 1.0 (overrides config)
        #[arg(short, long)]
        threshold: Option<f32>,
    },

    /// Show store statistics
    #[command(about = "Show record and embedding counts")]
    Status,
}

fn parse_field(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("expected key=value, got '{raw}'")),
    }
}

#[derive(Debug, Serialize)]
struct WriteInfo {
    id: RecordId,
    embedding: EmbeddingStatus,
}

#[derive(Debug, Serialize)]
struct ListedRecord {
    #[serde(flatten)]
    record: Record,
    embedded: bool,
}

#[derive(Debug, Serialize)]
struct StatusInfo {
    store_path: PathBuf,
    metadata: StoreMetadata,
    missing_embeddings: usize,
    configured_model: String,
    semantic_search_enabled: bool,
}

/// Everything a command needs after configuration is loaded.
struct App {
    settings: Settings,
    persistence: StorePersistence,
    store: Arc<EmbeddingStore>,
    metadata: StoreMetadata,
    format: OutputFormat,
}

impl App {
    fn open(settings: Settings, format: OutputFormat) -> Result<Self, KbError> {
        let persistence = StorePersistence::new(&settings.store_path);
        let (store, metadata) = persistence.load_or_default()?;
        Ok(Self {
            settings,
            persistence,
            store: Arc::new(store),
            metadata,
            format,
        })
    }

    /// Load the embedding model off the async executor if it is enabled.
    async fn capability(&self) -> anyhow::Result<EmbeddingCapability> {
        let config = self.settings.semantic_search.clone();
        if !config.enabled {
            return Ok(EmbeddingCapability::from_settings(&config));
        }

        let spinner = (!self.format.is_json())
            .then(|| display::create_spinner(&format!("Loading embedding model {}", config.model)));
        let capability =
            tokio::task::spawn_blocking(move || EmbeddingCapability::from_settings(&config))
                .await
                .context("model loading task failed")?;
        if let Some(spinner) = spinner {
            spinner.finish_and_clear();
        }

        Ok(capability)
    }

    /// Pin the store to the generator's dimension.
    fn bind_model(&self, capability: &EmbeddingCapability) -> Result<(), KbError> {
        let Some(generator) = capability.generator() else {
            return Ok(());
        };
        self.store.bind_dimension(generator.dimension())?;
        if let Some(stored) = &self.metadata.model_name {
            if stored != generator.model_name() {
                warn!(
                    stored = %stored,
                    configured = %generator.model_name(),
                    "embeddings were produced by another model, run 'kbsearch backfill --rebuild'"
                );
            }
        }
        Ok(())
    }

    fn lifecycle(&self, capability: &EmbeddingCapability) -> RecordLifecycle {
        RecordLifecycle::new(
            Arc::clone(&self.store),
            capability,
            &self.settings.semantic_search,
        )
    }

    fn save(&self, capability: Option<&EmbeddingCapability>) -> Result<StoreMetadata, KbError> {
        let model_name = capability
            .and_then(EmbeddingCapability::generator)
            .map(|generator| generator.model_name().to_string());
        Ok(self.persistence.save(&self.store, model_name.as_deref())?)
    }

    fn print<T: Serialize>(&self, data: T, text: impl FnOnce(&T) -> String) -> anyhow::Result<()> {
        if self.format.is_json() {
            let response = JsonResponse::success(data);
            println!("{}", serde_json::to_string_pretty(&response)?);
        } else {
            println!("{}", text(&data));
        }
        Ok(())
    }
}

/// Entry point: loads configuration, dispatches the command and maps
/// errors to exit codes.
#[tokio::main]
async fn main() -> std::process::ExitCode {
    let cli = Cli::parse();

    let settings = match &cli.config {
        Some(config_path) => match Settings::load_from(config_path) {
            Ok(settings) => settings,
            Err(e) => {
                eprintln!(
                    "Configuration error loading from {}: {e}",
                    config_path.display()
                );
                return ExitCode::ConfigError.into();
            }
        },
        None => Settings::load().unwrap_or_else(|e| {
            eprintln!("Configuration error: {e}");
            Settings::default()
        }),
    };

    logging::init(&settings.logging, cli.verbose || settings.debug);

    let format = OutputFormat::from_json_flag(cli.json);
    match run(cli.command, settings, format).await {
        Ok(code) => code.into(),
        Err(error) => report_error(&error, format).into(),
    }
}

fn report_error(error: &anyhow::Error, format: OutputFormat) -> ExitCode {
    let kb_error = error.downcast_ref::<KbError>();
    let code = kb_error.map_or(ExitCode::GeneralError, ExitCode::from_error);
    debug!(exit_code = i32::from(code), kind = code.description(), "command failed");

    match (format, kb_error) {
        (OutputFormat::Json, Some(kb_error)) => {
            let response = JsonResponse::from_error(kb_error);
            match serde_json::to_string_pretty(&response) {
                Ok(json) => println!("{json}"),
                Err(_) => eprintln!("{kb_error}"),
            }
        }
        _ => {
            eprintln!("{}", THEME.error_with_icon(&format!("{error:#}")));
            if let Some(kb_error) = kb_error {
                for suggestion in kb_error.recovery_suggestions() {
                    eprintln!("  {}", THEME.apply(&THEME.dim, suggestion));
                }
            }
        }
    }
    code
}

async fn run(command: Commands, settings: Settings, format: OutputFormat) -> anyhow::Result<ExitCode> {
    match command {
        Commands::Init { force } => {
            let path = Settings::init_config_file(force).map_err(|e| KbError::Config {
                reason: e.to_string(),
            })?;
            println!(
                "{}",
                THEME.success_with_icon(&format!(
                    "Created configuration at {}",
                    THEME.apply(&THEME.path, path.display())
                ))
            );
            println!("Edit this file to customize your settings.");
            Ok(ExitCode::Success)
        }

        Commands::Config => {
            if format.is_json() {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&JsonResponse::success(&settings))?
                );
            } else {
                println!("Current Configuration:");
                println!("{}", "=".repeat(50));
                println!("{}", toml::to_string_pretty(&settings)?);
            }
            Ok(ExitCode::Success)
        }

        Commands::Add {
            text,
            answer,
            id,
            fields,
        } => {
            let app = App::open(settings, format)?;
            let capability = app.capability().await?;
            app.bind_model(&capability)?;

            let id = id.map(RecordId::new).unwrap_or_else(|| generate_id(&text));
            let mut record = Record::new(id.clone(), text)
                .with_field("created_at", chrono::Utc::now().to_rfc3339());
            if let Some(answer) = answer {
                record = record.with_field("answer", answer);
            }
            for (key, value) in fields {
                record = record.with_field(&key, value);
            }

            let status = app
                .lifecycle(&capability)
                .record_created(record)
                .await
                .map_err(KbError::from)?;
            app.save(Some(&capability))?;

            app.print(WriteInfo { id, embedding: status }, |info| {
                write_message("Added", info)
            })?;
            Ok(ExitCode::Success)
        }

        Commands::Edit {
            id,
            text,
            answer,
            fields,
        } => {
            if text.is_none() && answer.is_none() && fields.is_empty() {
                return Err(KbError::General(
                    "Nothing to edit: pass --text, --answer or --field".to_string(),
                )
                .into());
            }

            let app = App::open(settings, format)?;
            let id = RecordId::new(id);
            let existing = app
                .store
                .record(&id)
                .ok_or_else(|| KbError::from(StoreError::RecordNotFound { id: id.clone() }))?;

            let capability = if text.is_some() {
                let capability = app.capability().await?;
                app.bind_model(&capability)?;
                capability
            } else {
                EmbeddingCapability::disabled("text unchanged")
            };
            let lifecycle = app.lifecycle(&capability);

            if answer.is_some() || !fields.is_empty() {
                let mut payload: Payload = existing.payload;
                if let Some(answer) = answer {
                    payload.insert("answer".to_string(), answer.into());
                }
                for (key, value) in fields {
                    payload.insert(key, value.into());
                }
                payload.insert(
                    "updated_at".to_string(),
                    chrono::Utc::now().to_rfc3339().into(),
                );
                lifecycle
                    .record_payload_updated(&id, payload)
                    .map_err(KbError::from)?;
            }

            let status = match text {
                Some(text) => lifecycle
                    .record_text_updated(&id, text)
                    .await
                    .map_err(KbError::from)?,
                None if app.store.get(&id).ok().flatten().is_some() => EmbeddingStatus::Current,
                None => EmbeddingStatus::Pending,
            };
            app.save(capability.is_available().then_some(&capability))?;

            app.print(WriteInfo { id, embedding: status }, |info| {
                write_message("Updated", info)
            })?;
            Ok(ExitCode::Success)
        }

        Commands::Remove { id } => {
            let app = App::open(settings, format)?;
            let id = RecordId::new(id);
            let removed = app
                .lifecycle(&EmbeddingCapability::disabled("not needed"))
                .record_deleted(&id)
                .map_err(KbError::from)?;
            app.save(None)?;

            app.print(removed, |record| {
                THEME.success_with_icon(&format!("Removed record {}", record.id))
            })?;
            Ok(ExitCode::Success)
        }

        Commands::List => {
            let app = App::open(settings, format)?;
            let embedded: std::collections::HashSet<RecordId> = app
                .store
                .all_with_embeddings()
                .into_iter()
                .map(|candidate| candidate.id)
                .collect();
            let records: Vec<ListedRecord> = app
                .store
                .records()
                .into_iter()
                .map(|record| ListedRecord {
                    embedded: embedded.contains(&record.id),
                    record,
                })
                .collect();

            app.print(records, |records| {
                if records.is_empty() {
                    return "No records yet. Add one with 'kbsearch add'.".to_string();
                }
                let rows: Vec<(Record, bool)> = records
                    .iter()
                    .map(|listed| (listed.record.clone(), listed.embedded))
                    .collect();
                display::create_records_table(&rows)
            })?;
            Ok(ExitCode::Success)
        }

        Commands::Backfill {
            batch_size,
            rebuild,
        } => run_backfill(settings, format, batch_size, rebuild).await,

        Commands::Search {
            query,
            top_k,
            threshold,
        } => {
            let app = App::open(settings, format)?;
            let capability = app.capability().await?;
            app.bind_model(&capability)?;

            let service = SearchService::new(
                Arc::clone(&app.store),
                &capability,
                app.settings.semantic_search.clone(),
            );
            let query = query.join(" ");
            let results = service
                .search(&query, top_k, threshold)
                .await
                .map_err(KbError::from)?;

            let missing = app.store.all_missing_embeddings().len();
            if missing > 0 && !format.is_json() {
                eprintln!(
                    "{}",
                    THEME.warning_with_icon(&format!(
                        "{missing} record(s) have no embedding yet; run 'kbsearch backfill'"
                    ))
                );
            }

            app.print(results, |results| {
                if results.is_empty() {
                    "No matching records.".to_string()
                } else {
                    display::create_results_table(results)
                }
            })?;
            Ok(ExitCode::Success)
        }

        Commands::Status => {
            let app = App::open(settings, format)?;
            let mut metadata = app.metadata.clone();
            metadata.update_counts(app.store.record_count(), app.store.embedding_count());
            metadata.dimension = app.store.dimension().map(|d| d.get());

            let config = &app.settings.semantic_search;
            let info = StatusInfo {
                store_path: app.settings.store_path.clone(),
                missing_embeddings: app.store.all_missing_embeddings().len(),
                configured_model: config.model.clone(),
                semantic_search_enabled: config.enabled,
                metadata,
            };

            app.print(info, |info| {
                let semantic = if info.semantic_search_enabled {
                    Ok(())
                } else {
                    Err("semantic_search.enabled = false")
                };
                display::create_status_table(
                    &info.metadata,
                    info.missing_embeddings,
                    &info.configured_model,
                    semantic,
                )
            })?;
            Ok(ExitCode::Success)
        }
    }
}

async fn run_backfill(
    settings: Settings,
    format: OutputFormat,
    batch_size: Option<usize>,
    rebuild: bool,
) -> anyhow::Result<ExitCode> {
    let mut app = App::open(settings, format)?;
    let capability = app.capability().await?;
    let Some(generator) = capability.generator().cloned() else {
        let reason = capability.disabled_reason().unwrap_or_default().to_string();
        return Err(KbError::from(kbsearch::SearchError::Unavailable { reason }).into());
    };

    if rebuild {
        let same_dimension = app
            .store
            .dimension()
            .is_none_or(|dimension| dimension == generator.dimension());
        if same_dimension {
            let dropped = app.store.clear_embeddings();
            info!(dropped, "rebuilding all embeddings");
        } else {
            // The dimension is pinned once set, so a new model needs a new store
            let fresh = EmbeddingStore::with_dimension(generator.dimension());
            for record in app.store.records() {
                fresh.insert_record(record).map_err(KbError::from)?;
            }
            info!(
                records = fresh.record_count(),
                dimension = %generator.dimension(),
                "rebuilding all embeddings for a new dimension"
            );
            app.store = Arc::new(fresh);
        }
        app.store
            .bind_dimension(generator.dimension())
            .map_err(KbError::from)?;
    } else {
        app.bind_model(&capability)?;
    }

    let batch_size = batch_size.unwrap_or(app.settings.semantic_search.batch_size);
    let coordinator = BackfillCoordinator::new(
        Arc::clone(&app.store),
        BoundedEncoder::new(generator, app.settings.semantic_search.encode_timeout()),
    );

    let missing = app.store.all_missing_embeddings().len() as u64;
    let progress = (!format.is_json() && missing > 0)
        .then(|| display::create_progress_bar(missing, "embedding records"));
    let report = coordinator
        .run_with_progress(batch_size, |batch| {
            if let Some(pb) = &progress {
                display::apply_batch_progress(pb, batch);
            }
        })
        .await;
    if let Some(pb) = progress {
        pb.finish_and_clear();
    }

    app.save(Some(&capability))?;

    let code = if report.failed_ids.is_empty() {
        ExitCode::Success
    } else {
        ExitCode::EncoderError
    };
    if format.is_json() {
        let mut response = JsonResponse::success(&report);
        if !report.is_complete() {
            response = response.with_message("Backfill left some records without embeddings");
        }
        println!("{}", serde_json::to_string_pretty(&response)?);
        return Ok(code);
    }

    println!("{}", display::create_backfill_table(&report));
    if !report.failed_ids.is_empty() {
        println!(
            "{}",
            THEME.warning_with_icon("Some batches failed; run 'kbsearch backfill' again to retry them")
        );
    }
    Ok(code)
}

/// Derive a record id from the text and the current time.
fn generate_id(text: &str) -> RecordId {
    let nanos = chrono::Utc::now()
        .timestamp_nanos_opt()
        .unwrap_or_default();
    let hash = ContentHash::of(&format!("{nanos}:{text}"));
    RecordId::new(format!("q-{}", &hash.as_str()[..12]))
}

fn write_message(verb: &str, info: &WriteInfo) -> String {
    match info.embedding {
        EmbeddingStatus::Current => {
            THEME.success_with_icon(&format!("{verb} record {} (embedded)", info.id))
        }
        EmbeddingStatus::Pending => THEME.warning_with_icon(&format!(
            "{verb} record {}; embedding pending, run 'kbsearch backfill'",
            info.id
        )),
    }
}
