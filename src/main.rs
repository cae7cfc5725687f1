//! CLI entry point for quarry.
//!
//! Commands for importing pre-embedded records, building ANN indexes and
//! searching one or more indexes.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{
    ArgAction, Parser, Subcommand,
    builder::styling::{AnsiColor, Effects, Styles},
};
use is_terminal::IsTerminal;
use serde::{Deserialize, Serialize};
use tracing::{Level, debug};

use quarry::adapter::{Adapter, AdapterRegistry, FastEmbedTextAdapter};
use quarry::ann::AnnStatus;
use quarry::display::{THEME, create_info_table, create_results_table, with_spinner};
use quarry::io::{ExitCode, JsonResponse, OutputFormat};
use quarry::store::{ImportBatch, ImportSummary, IndexMetadata};
use quarry::{
    Embedding, IndexCatalog, QueryVectors, RetrievalError, SearchEngine, SearchMode,
    SearchOptions, SearchResponse, Settings, StoreError, VectorStore,
};

fn clap_cargo_style() -> Styles {
    Styles::styled()
        .header(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .usage(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .literal(AnsiColor::Green.on_default())
        .placeholder(AnsiColor::Green.on_default())
}

#[derive(Parser)]
#[command(
    name = "quarry",
    version,
    about = "Multi-index semantic retrieval over pre-embedded documents",
    styles = clap_cargo_style()
)]
struct Cli {
    /// Path to custom settings.toml file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    /// Output in JSON format
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Set up .quarry directory with default configuration
    Init {
        /// Force overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },

    /// Display active settings
    Config,

    /// List indexes under the index root
    List,

    /// Import pre-embedded chunks and pages from a JSON lines file
    #[command(after_help = "Each line is {\"kind\":\"chunk\",...} or {\"kind\":\"page\",...}.\n\
        A missing index is created with dimensions taken from the first records.")]
    Import {
        /// Index to import into
        index: String,

        /// JSON lines file
        file: PathBuf,

        /// Chunk embedding dimension for a new index
        #[arg(long)]
        text_dim: Option<usize>,

        /// Page patch dimension for a new index
        #[arg(long)]
        page_dim: Option<usize>,

        /// Text embedding model id recorded on a new index
        #[arg(long)]
        text_model: Option<String>,

        /// Vision embedding model id recorded on a new index
        #[arg(long)]
        vision_model: Option<String>,
    },

    /// Search one or more indexes
    Search(SearchArgs),

    /// Build or inspect ANN indexes
    Ann {
        #[command(subcommand)]
        action: AnnCommand,
    },

    /// Show counts, dimensions and ANN state of an index
    Info {
        index: String,
    },
}

#[derive(Subcommand)]
enum AnnCommand {
    /// Cluster the chunk embeddings of an index
    Build {
        index: String,

        /// Skip the build below this many chunks
        #[arg(long)]
        min_chunks: Option<usize>,
    },

    /// Show the ANN index of an index, if built
    Status {
        index: String,
    },
}

#[derive(clap::Args)]
struct SearchArgs {
    /// Query text
    query: String,

    /// Index to search; repeat for several. Defaults to every index
    #[arg(short, long = "index")]
    indexes: Vec<String>,

    /// Number of results
    #[arg(short = 'k', long)]
    top_k: Option<usize>,

    /// Minimum score to keep a result
    #[arg(long)]
    threshold: Option<f64>,

    /// text, vision or hybrid
    #[arg(short, long)]
    mode: Option<String>,

    /// Weight of the recency boost in [0, 1]
    #[arg(long)]
    recency_weight: Option<f64>,

    /// Age in days at which the recency boost halves
    #[arg(long)]
    half_life_days: Option<f64>,

    /// Metadata filter KEY=VALUE; repeat to require several
    #[arg(short, long = "filter", value_name = "KEY=VALUE")]
    filters: Vec<String>,

    /// Restrict the scan to ANN candidates where an ANN index exists
    #[arg(long)]
    ann: bool,

    /// Clusters probed per query
    #[arg(long)]
    nprobe: Option<usize>,

    /// JSON file with a precomputed query: an array for text, an array
    /// of arrays for vision patches
    #[arg(long, value_name = "FILE")]
    query_vector: Option<PathBuf>,
}

/// Precomputed query read from `--query-vector`.
#[derive(Deserialize)]
#[serde(untagged)]
enum QueryVectorFile {
    Text(Embedding),
    Vision(Vec<Embedding>),
}

#[derive(Serialize)]
struct IndexInfo {
    #[serde(flatten)]
    metadata: IndexMetadata,
    ann: Option<AnnStatus>,
}

fn main() -> std::process::ExitCode {
    let cli = Cli::parse();
    let format = OutputFormat::from_json_flag(cli.json);

    let code = match run(cli) {
        Ok(code) => code,
        Err(error) => report_error(&error, format),
    };
    std::process::ExitCode::from(code as u8)
}

fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let format = OutputFormat::from_json_flag(cli.json);
    let settings = load_settings(cli.config.as_deref())?;
    init_logging(cli.verbose, &settings.log_level);
    debug!("index root: {}", settings.resolved_index_root().display());

    let catalog = IndexCatalog::new(settings.resolved_index_root());

    match cli.command {
        Commands::Init { force } => {
            let cwd = std::env::current_dir().context("Cannot read current directory")?;
            let path = Settings::init_config_file(&cwd, force).map_err(|e| {
                RetrievalError::ConfigError {
                    reason: e.to_string(),
                }
            })?;
            if format.is_json() {
                print_json(&JsonResponse::success(path))?;
            } else {
                println!(
                    "{}",
                    THEME.success_with_icon(&format!(
                        "Created configuration file at: {}",
                        path.display()
                    ))
                );
            }
            Ok(ExitCode::Success)
        }

        Commands::Config => {
            if format.is_json() {
                print_json(&JsonResponse::success(&settings))?;
            } else {
                println!("{}", toml::to_string_pretty(&settings)?);
            }
            Ok(ExitCode::Success)
        }

        Commands::List => {
            let names = catalog.list()?;
            if format.is_json() {
                print_json(&JsonResponse::results(&names, names.len()))?;
            } else {
                for name in &names {
                    println!("{}", THEME.index_name(name));
                }
            }
            Ok(ExitCode::from_result_count(names.len()))
        }

        Commands::Import {
            index,
            file,
            text_dim,
            page_dim,
            text_model,
            vision_model,
        } => {
            let summary = import(
                &catalog,
                &index,
                &file,
                (text_dim, page_dim),
                (text_model, vision_model),
            )?;
            if format.is_json() {
                print_json(&JsonResponse::success(summary))?;
            } else {
                println!(
                    "{}",
                    THEME.success_with_icon(&format!(
                        "Imported {} chunks and {} pages into '{index}'",
                        summary.chunks, summary.pages
                    ))
                );
            }
            Ok(ExitCode::Success)
        }

        Commands::Search(args) => search(&catalog, &settings, args, format),

        Commands::Ann {
            action: AnnCommand::Build { index, min_chunks },
        } => {
            let mut options = settings.ann.to_build_options();
            if let Some(min_chunks) = min_chunks {
                options = options.with_min_chunks(min_chunks);
            }
            let report = with_spinner(
                &format!("Clustering '{index}'..."),
                !format.is_json() && std::io::stderr().is_terminal(),
                || catalog.build_ann(&index, &options),
            )?;
            if format.is_json() {
                print_json(&JsonResponse::success(&report))?;
            } else if report.built {
                println!(
                    "{}",
                    THEME.success_with_icon(&format!(
                        "Built {} clusters over {} chunks",
                        report.num_clusters, report.num_chunks
                    ))
                );
            } else {
                let reason = report.reason.as_deref().unwrap_or("ANN index not built");
                println!("{}", THEME.warning_with_icon(reason));
            }
            Ok(ExitCode::Success)
        }

        Commands::Ann {
            action: AnnCommand::Status { index },
        } => {
            let status = catalog.ann_status(&index)?;
            if format.is_json() {
                print_json(&JsonResponse::success(&status))?;
            } else {
                match &status {
                    Some(status) => println!(
                        "{} clusters, {} chunks, cluster sizes {}..{}",
                        status.num_clusters,
                        status.num_chunks,
                        status.smallest_cluster,
                        status.largest_cluster
                    ),
                    None => println!("No ANN index for '{index}'"),
                }
            }
            Ok(ExitCode::Success)
        }

        Commands::Info { index } => {
            let store = catalog.open(&index)?;
            let info = IndexInfo {
                metadata: store.metadata(),
                ann: catalog.ann_status(&index)?,
            };
            if format.is_json() {
                print_json(&JsonResponse::success(&info))?;
            } else {
                println!("{}", create_info_table(&info.metadata, info.ann.as_ref()));
            }
            Ok(ExitCode::Success)
        }
    }
}

fn load_settings(path: Option<&Path>) -> anyhow::Result<Settings> {
    let loaded = match path {
        Some(path) => Settings::load_from(path).map(|mut settings| {
            // `<root>/.quarry/settings.toml` anchors relative paths at `<root>`.
            if settings.workspace_root.is_none() {
                settings.workspace_root =
                    path.parent().and_then(Path::parent).map(Path::to_path_buf);
            }
            settings
        }),
        None => Settings::load(),
    };
    loaded.map_err(|e| {
        RetrievalError::ConfigError {
            reason: e.to_string(),
        }
        .into()
    })
}

fn init_logging(verbose: u8, configured: &str) {
    let level = match verbose {
        0 => configured.parse().unwrap_or(Level::WARN),
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(level)
        .with_target(false)
        .init();
}

fn import(
    catalog: &IndexCatalog,
    index: &str,
    file: &Path,
    (text_dim, page_dim): (Option<usize>, Option<usize>),
    (text_model, vision_model): (Option<String>, Option<String>),
) -> anyhow::Result<ImportSummary> {
    let reader = File::open(file).map_err(|e| StoreError::io(file, e))?;
    let batch = ImportBatch::read(BufReader::new(reader), file)?;

    let store = match catalog.open(index) {
        Ok(store) => store,
        Err(StoreError::NotFound { .. }) => {
            let mut spec = batch.infer_spec(text_dim, page_dim).ok_or_else(|| {
                RetrievalError::InvalidOptions {
                    reason: format!(
                        "cannot create '{index}' from an empty file; pass --text-dim or --page-dim"
                    ),
                }
            })?;
            spec.text_model = text_model;
            spec.vision_model = vision_model;
            catalog.create(index, spec)?
        }
        Err(e) => return Err(e.into()),
    };

    Ok(batch.apply(&store)?)
}

fn search_options(settings: &Settings, args: &SearchArgs) -> anyhow::Result<SearchOptions> {
    let mut opts = settings.search.to_options();
    if let Some(top_k) = args.top_k {
        opts = opts.with_top_k(top_k);
    }
    if let Some(threshold) = args.threshold {
        opts = opts.with_threshold(threshold);
    }
    if let Some(mode) = &args.mode {
        opts = opts.with_mode(mode.parse::<SearchMode>()?);
    }
    if let Some(weight) = args.recency_weight {
        opts.recency_weight = weight;
    }
    if let Some(half_life) = args.half_life_days {
        opts.half_life_days = half_life;
    }
    if args.ann {
        opts.use_ann = true;
    }
    if let Some(nprobe) = args.nprobe {
        opts.nprobe = nprobe;
    }
    for filter in &args.filters {
        let (key, value) = filter
            .split_once('=')
            .ok_or_else(|| RetrievalError::InvalidOptions {
                reason: format!("filter '{filter}' is not KEY=VALUE"),
            })?;
        opts = opts.with_filter(key.trim(), value.trim());
    }
    opts.validate()?;
    Ok(opts)
}

fn search(
    catalog: &IndexCatalog,
    settings: &Settings,
    args: SearchArgs,
    format: OutputFormat,
) -> anyhow::Result<ExitCode> {
    let opts = search_options(settings, &args)?;
    let names = if args.indexes.is_empty() {
        catalog.list()?
    } else {
        args.indexes.clone()
    };
    let interactive = !format.is_json() && std::io::stderr().is_terminal();

    let response = match &args.query_vector {
        Some(path) => search_precomputed(catalog, &args.query, path, &names, &opts)?,
        None => {
            let adapter = with_spinner("Loading embedding model...", interactive, || {
                FastEmbedTextAdapter::new(
                    &settings.embedding.text_model,
                    Some(settings.models_dir()),
                    interactive,
                )
            })?;
            let mut adapters = AdapterRegistry::new();
            adapters.register(Adapter::Text(Arc::new(adapter)))?;

            let engine = SearchEngine::new(catalog, &adapters);
            with_spinner("Searching...", interactive, || {
                engine.search(&args.query, names.as_slice(), &opts)
            })?
        }
    };

    let count = response.results.len();
    if format.is_json() {
        let envelope =
            JsonResponse::results(&response.results, count).with_warnings(response.warnings);
        print_json(&envelope)?;
    } else {
        for warning in &response.warnings {
            eprintln!("{}", THEME.warning_with_icon(warning));
        }
        if count == 0 {
            println!("No results found for '{}'", args.query);
        } else {
            println!("{}", create_results_table(&response.results));
        }
    }
    Ok(ExitCode::from_result_count(count))
}

/// Searches with a query vector read from `path` instead of an adapter.
fn search_precomputed(
    catalog: &IndexCatalog,
    query_text: &str,
    path: &Path,
    names: &[String],
    opts: &SearchOptions,
) -> anyhow::Result<SearchResponse> {
    let file = File::open(path).map_err(|e| StoreError::io(path, e))?;
    let vectors = match serde_json::from_reader(BufReader::new(file)) {
        Ok(QueryVectorFile::Text(embedding)) => QueryVectors::text(embedding),
        Ok(QueryVectorFile::Vision(patches)) => QueryVectors::vision(patches),
        Err(e) => {
            return Err(RetrievalError::InvalidOptions {
                reason: format!("query vector file '{}': {e}", path.display()),
            }
            .into());
        }
    };

    let (opened, failures) = catalog.open_many(names);
    let stores: Vec<Arc<dyn VectorStore>> = opened
        .into_iter()
        .map(|store| store as Arc<dyn VectorStore>)
        .collect();
    let mut warnings: Vec<String> = failures
        .into_iter()
        .map(|(name, e)| format!("skipped index '{name}': {e}"))
        .collect();

    let mut response = SearchEngine::search_with_vectors(query_text, &vectors, &stores, opts)?;
    warnings.append(&mut response.warnings);
    response.warnings = warnings;
    Ok(response)
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn exit_code_for(error: &anyhow::Error) -> ExitCode {
    if let Some(error) = error.downcast_ref::<RetrievalError>() {
        ExitCode::from_error(error)
    } else if let Some(error) = error.downcast_ref::<StoreError>() {
        ExitCode::from_store_error(error)
    } else if error.downcast_ref::<std::io::Error>().is_some() {
        ExitCode::IoError
    } else {
        ExitCode::GeneralError
    }
}

fn report_error(error: &anyhow::Error, format: OutputFormat) -> ExitCode {
    let code = exit_code_for(error);
    if format.is_json() {
        let mut response = match error.downcast_ref::<RetrievalError>() {
            Some(retrieval) => JsonResponse::from_error(retrieval),
            None => JsonResponse::from_error(&RetrievalError::General(format!("{error:#}"))),
        };
        response.exit_code = code as u8;
        match serde_json::to_string_pretty(&response) {
            Ok(json) => println!("{json}"),
            Err(_) => eprintln!("Error: {error:#}"),
        }
    } else {
        eprintln!("{}", THEME.error_with_icon(&format!("{error:#}")));
    }
    code
}
