//! CLI entry point for the retrieval index.
//!
//! Provides commands for building generations, querying them, and
//! generating grounded completions from the retrieved context.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, anyhow, bail};
use clap::{
    ArgGroup, Parser, Subcommand,
    builder::styling::{AnsiColor, Effects, Styles},
};
use ragindex::completion::{
    CompletionProvider, OllamaClient, body_message_prompt, question_prompt,
};
use ragindex::config::CorpusKind;
use ragindex::corpus::{PullRequestRecord, load_corpus, load_pull_requests};
use ragindex::display::{
    THEME, create_progress_bar, generations_table, results_table, with_spinner,
};
use ragindex::vector::{EmbeddingGenerator, HASHING_MODEL_NAME, create_generator};
use ragindex::{
    GenerationManifest, GenerationStore, IndexBuilder, IndexError, RetrievalEngine, Settings,
};

fn clap_cargo_style() -> Styles {
    Styles::styled()
        .header(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .usage(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .literal(AnsiColor::Green.on_default())
        .placeholder(AnsiColor::Green.on_default())
}

/// Similarity-search index for grounding LLM generation
#[derive(Parser)]
#[command(
    name = "ragindex",
    version = env!("CARGO_PKG_VERSION"),
    about = "Similarity-search index for grounding LLM generation",
    long_about = "Build versioned embedding indexes over documents or pull requests, query them, and generate grounded completions.",
    next_line_help = true,
    styles = clap_cargo_style()
)]
struct Cli {
    /// Path to custom settings.toml file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Verbose logging
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize project
    #[command(about = "Set up .ragindex directory with default configuration")]
    Init {
        /// Force overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },

    /// Build and publish a new generation
    #[command(
        about = "Embed a corpus and publish it as a new generation",
        after_help = "Examples:\n  ragindex index\n  ragindex index --docs kb\n  ragindex index --pull-requests prs.jsonl --hash"
    )]
    Index {
        /// Directory of knowledge-base documents (overrides config)
        #[arg(long, conflicts_with = "pull_requests")]
        docs: Option<PathBuf>,

        /// JSON or JSON Lines file of pull requests (overrides config)
        #[arg(long)]
        pull_requests: Option<PathBuf>,

        /// Use the offline hashing embedder instead of the configured model
        #[arg(long)]
        hash: bool,

        /// Texts per embedding call (overrides config)
        #[arg(long)]
        batch_size: Option<usize>,
    },

    /// Retrieve the documents nearest to a text
    #[command(
        group(ArgGroup::new("input").required(true).args(["text", "pull_request"])),
        after_help = "Examples:\n  ragindex query \"outdoor activity\" -k 2\n  ragindex query --pull-request pr.json --json"
    )]
    Query {
        /// Query text
        text: Option<String>,

        /// Query with the text of a pull-request record file
        #[arg(long)]
        pull_request: Option<PathBuf>,

        /// Number of documents to return (defaults to retrieval.top_k)
        #[arg(short)]
        k: Option<usize>,

        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Retrieve context and stream a completion
    #[command(
        group(ArgGroup::new("input").required(true).args(["question", "pull_request"])),
        after_help = "Examples:\n  ragindex ask \"How do I list repository forks?\"\n  ragindex ask --pull-request pr.json"
    )]
    Ask {
        /// Question to answer
        question: Option<String>,

        /// Write the body message for this pull-request record file
        #[arg(long)]
        pull_request: Option<PathBuf>,

        /// Number of context documents (defaults to retrieval.top_k)
        #[arg(short)]
        k: Option<usize>,
    },

    /// List generations on disk
    #[command(about = "List published generations and mark the current one")]
    Generations,

    /// Serve an older generation
    #[command(about = "Point CURRENT at a retained generation")]
    Rollback {
        /// Generation number
        generation: u64,
    },

    /// Show current configuration settings
    #[command(about = "Display active settings")]
    Config,
}

fn main() {
    let cli = Cli::parse();

    if let Err(err) = run(cli) {
        tracing::error!("{err:#}");
        eprintln!("{}", THEME.error_with_icon(&format!("Error: {err}")));
        for cause in err.chain().skip(1) {
            eprintln!("  caused by: {cause}");
        }
        if let Some(index_err) = err.downcast_ref::<IndexError>() {
            for suggestion in index_err.recovery_suggestions() {
                eprintln!("  {}", THEME.apply(&THEME.dim, suggestion));
            }
        }
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    if let Commands::Init { force } = cli.command {
        let path = Settings::init_config_file(force).map_err(|e| anyhow!("{e}"))?;
        println!(
            "{}",
            THEME.success_with_icon(&format!("Created configuration file at: {}", path.display()))
        );
        println!("Edit this file to customize your settings.");
        return Ok(());
    }

    // Index auto-initializes; everything else just warns
    if cli.config.is_none() {
        if let Err(warning) = Settings::check_init() {
            if matches!(cli.command, Commands::Index { .. }) {
                eprintln!("Initializing project configuration...");
                match Settings::init_config_file(false) {
                    Ok(path) => eprintln!("Created configuration file at: {}", path.display()),
                    Err(e) => eprintln!("Warning: Could not create config file: {e}"),
                }
            } else {
                eprintln!("{}", THEME.warning_with_icon(&warning));
                eprintln!("Using default configuration for now.");
            }
        }
    }

    let settings = match &cli.config {
        Some(path) => Settings::load_from(path)
            .map_err(|e| anyhow!("Configuration error loading from {}: {e}", path.display()))?,
        None => Settings::load().map_err(|e| anyhow!("Configuration error: {e}"))?,
    };
    ragindex::logging::init(cli.debug || settings.debug);

    match cli.command {
        Commands::Init { .. } => Ok(()),
        Commands::Config => {
            println!("{}", THEME.apply(&THEME.header, "Current Configuration:"));
            println!("{}", "=".repeat(50));
            println!("{}", toml::to_string_pretty(&settings)?);
            Ok(())
        }
        Commands::Index {
            docs,
            pull_requests,
            hash,
            batch_size,
        } => run_index(&settings, docs, pull_requests, hash, batch_size),
        Commands::Query {
            text,
            pull_request,
            k,
            json,
        } => run_query(&settings, text, pull_request.as_deref(), k, json),
        Commands::Ask {
            question,
            pull_request,
            k,
        } => run_ask(&settings, question, pull_request.as_deref(), k),
        Commands::Generations => {
            let store = GenerationStore::new(settings.resolved_index_path());
            let generations = store.list()?;
            if generations.is_empty() {
                println!("No generations under {}", store.root().display());
            } else {
                println!("{}", generations_table(&generations));
            }
            Ok(())
        }
        Commands::Rollback { generation } => {
            let store = GenerationStore::new(settings.resolved_index_path());
            let manifest = store.rollback(generation)?;
            println!(
                "{}",
                THEME.success_with_icon(&format!(
                    "Serving generation {} ({} vectors, model {})",
                    manifest.generation, manifest.vector_count, manifest.model
                ))
            );
            Ok(())
        }
    }
}

fn run_index(
    settings: &Settings,
    docs: Option<PathBuf>,
    pull_requests: Option<PathBuf>,
    hash: bool,
    batch_size: Option<usize>,
) -> anyhow::Result<()> {
    let mut corpus = settings.corpus.clone();
    corpus.source = settings.resolved_corpus_source();
    if let Some(dir) = docs {
        corpus.kind = CorpusKind::Documents;
        corpus.source = dir;
    } else if let Some(file) = pull_requests {
        corpus.kind = CorpusKind::PullRequests;
        corpus.source = file;
    }

    let mut embedding = settings.embedding.clone();
    if hash {
        embedding.model = HASHING_MODEL_NAME.to_string();
    }

    let units = with_spinner("Loading corpus...", || load_corpus(&corpus))?;
    println!(
        "Loaded {} units from {}",
        THEME.apply(&THEME.number, units.len()),
        THEME.apply(&THEME.path, corpus.source.display())
    );

    let embedder = with_spinner("Loading embedding model...", || create_generator(&embedding))
        .with_context(|| format!("Failed to initialize embedding model '{}'", embedding.model))?;

    let bar = create_progress_bar(units.len() as u64, "embedding");
    let progress = bar.clone();
    let mut builder = IndexBuilder::from_settings(settings, embedder)
        .with_progress(move |done, _total| progress.set_position(done as u64));
    if let Some(batch_size) = batch_size {
        builder = builder.with_batch_size(batch_size);
    }

    let report = builder.build(units);
    bar.finish_and_clear();
    let report = report?;

    println!(
        "{}",
        THEME.success_with_icon(&format!(
            "Published generation {} ({} vectors, dim {}) in {:.2?}",
            report.manifest.generation,
            report.manifest.vector_count,
            report.manifest.dim,
            report.elapsed
        ))
    );
    if !report.pruned.is_empty() {
        println!(
            "{}",
            THEME.apply(&THEME.dim, format!("Pruned generations: {:?}", report.pruned))
        );
    }
    Ok(())
}

fn run_query(
    settings: &Settings,
    text: Option<String>,
    pull_request: Option<&Path>,
    k: Option<usize>,
    json: bool,
) -> anyhow::Result<()> {
    let query = match (text, pull_request) {
        (Some(text), _) => text,
        (None, Some(path)) => read_pull_request(path)?.query_text(&settings.corpus.placeholders),
        (None, None) => bail!("Provide query text or --pull-request"),
    };

    let engine = open_engine(settings)?;
    let results = engine.retrieve(&query, k.unwrap_or(settings.retrieval.top_k))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&results)?);
    } else {
        println!(
            "{}",
            THEME.apply(
                &THEME.dim,
                format!("generation {} · {}", engine.generation(), engine.manifest().model)
            )
        );
        println!("{}", results_table(&results));
    }
    Ok(())
}

fn run_ask(
    settings: &Settings,
    question: Option<String>,
    pull_request: Option<&Path>,
    k: Option<usize>,
) -> anyhow::Result<()> {
    let engine = open_engine(settings)?;
    let k = k.unwrap_or(settings.retrieval.top_k);
    let placeholders = &settings.corpus.placeholders;

    let prompt = match (question, pull_request) {
        (Some(question), _) => {
            let context = engine.retrieve_documents(&question, k)?;
            question_prompt(&question, &context)
        }
        (None, Some(path)) => {
            let pr = read_pull_request(path)?;
            let context = engine.retrieve_documents(&pr.query_text(placeholders), k)?;
            body_message_prompt(&pr, &context, placeholders)
        }
        (None, None) => bail!("Provide a question or --pull-request"),
    };
    tracing::debug!(prompt_chars = prompt.len(), "built prompt");

    let client = OllamaClient::new(&settings.generation).map_err(IndexError::from)?;
    let fragments = client.generate(&prompt).map_err(IndexError::from)?;

    let mut stdout = std::io::stdout().lock();
    for fragment in fragments {
        let fragment = fragment.map_err(IndexError::from)?;
        stdout.write_all(fragment.as_bytes())?;
        stdout.flush()?;
    }
    writeln!(stdout)?;
    Ok(())
}

/// Loads the current generation with an embedder matching its manifest.
fn open_engine(settings: &Settings) -> anyhow::Result<RetrievalEngine> {
    let store = GenerationStore::new(settings.resolved_index_path());
    let loaded = with_spinner("Loading index...", || store.load_current())?;
    let embedder = query_embedder(settings, &loaded.manifest)?;
    Ok(RetrievalEngine::from_loaded(loaded, embedder)?)
}

/// Queries must be embedded by the model the generation was built with.
fn query_embedder(
    settings: &Settings,
    manifest: &GenerationManifest,
) -> anyhow::Result<Arc<dyn EmbeddingGenerator>> {
    let mut config = settings.embedding.clone();
    config.model = manifest.model.clone();
    config.hash_dimension = manifest.dim;
    create_generator(&config)
        .with_context(|| format!("Failed to initialize query model '{}'", manifest.model))
}

fn read_pull_request(path: &Path) -> anyhow::Result<PullRequestRecord> {
    load_pull_requests(path)?
        .into_iter()
        .next()
        .ok_or_else(|| anyhow!("No pull-request record in {}", path.display()))
}
