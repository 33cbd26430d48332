use lease_rag::cli::{Cli, Commands, ConfigAction};
use lease_rag::config::Config;
use lease_rag::error::{LeaseRagError, Result};
use lease_rag::pipeline::{build_normalizer, load_dictionary};
use lease_rag::retrieval::document::keys;
use lease_rag::services::QueryNormalizer;
use lease_rag::RagPipeline;
use std::path::PathBuf;

fn main() -> Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse_args();

    // Initialize logging
    init_logging(cli.verbose);

    // Handle commands
    match cli.command {
        Commands::Ask {
            question,
            skip_normalization,
            show_context,
        } => {
            cmd_ask(cli.config, cli.profile, &question, skip_normalization, show_context)?;
        }
        Commands::Search {
            query,
            json,
            skip_normalization,
        } => {
            cmd_search(cli.config, cli.profile, &query, json, skip_normalization)?;
        }
        Commands::Normalize { question } => {
            cmd_normalize(cli.config, cli.profile, &question)?;
        }
        Commands::Config { action } => {
            cmd_config(cli.config, cli.profile, action)?;
        }
    }

    Ok(())
}

fn init_logging(verbose: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default_level = if verbose { "lease_rag=debug" } else { "lease_rag=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Runtime::new().map_err(|e| LeaseRagError::Io {
        source: e,
        context: "Failed to create tokio runtime".to_string(),
    })
}

fn cmd_ask(
    config_path: Option<PathBuf>,
    profile: Option<String>,
    question: &str,
    skip_normalization: bool,
    show_context: bool,
) -> Result<()> {
    let config = load_config(config_path, profile)?;
    let pipeline = RagPipeline::from_local_corpus(config)?;

    let answer = runtime()?.block_on(pipeline.answer(question, skip_normalization));

    if show_context && !answer.retrieval.context.is_empty() {
        println!("{}", answer.retrieval.context);
        println!("\n---\n");
    }
    println!("{}", answer.text);

    Ok(())
}

fn cmd_search(
    config_path: Option<PathBuf>,
    profile: Option<String>,
    query: &str,
    json: bool,
    skip_normalization: bool,
) -> Result<()> {
    let config = load_config(config_path, profile)?;
    let pipeline = RagPipeline::from_local_corpus(config)?;

    let retrieval = runtime()?.block_on(pipeline.retrieve(query, skip_normalization));

    if json {
        let output = serde_json::to_string_pretty(&retrieval).map_err(|e| LeaseRagError::Json {
            source: e,
            context: "Failed to serialize search results".to_string(),
        })?;
        println!("{}", output);
        return Ok(());
    }

    println!("Query: {}", retrieval.query);
    if retrieval.documents.is_empty() {
        println!("No documents found");
        return Ok(());
    }

    for (i, doc) in retrieval.documents.iter().enumerate() {
        let source = doc
            .source_index()
            .map(|s| s.to_string())
            .unwrap_or_else(|| "-".to_string());
        let title = doc
            .get_str(keys::TITLE)
            .or_else(|| doc.get_str(keys::CASE_NAME))
            .or_else(|| doc.case_no())
            .unwrap_or_default();
        let rerank = doc
            .get(keys::RERANK_SCORE)
            .and_then(|v| v.as_f64())
            .map(|s| format!(" rerank={:.3}", s))
            .unwrap_or_default();
        let expanded = if doc.is_expanded() { " [full text]" } else { "" };

        println!(
            "{:>2}. [{}] priority={} {}{}{}",
            i + 1,
            source,
            doc.priority(),
            title,
            rerank,
            expanded
        );
        println!("    {}", preview(&doc.content, 120));
    }

    Ok(())
}

fn cmd_normalize(config_path: Option<PathBuf>, profile: Option<String>, question: &str) -> Result<()> {
    let config = load_config(config_path, profile)?;
    let dictionary = load_dictionary(&config)?;
    let normalizer = build_normalizer(&config)?;

    match normalizer.normalize(&dictionary, question) {
        Ok(normalized) if !normalized.trim().is_empty() => println!("{}", normalized.trim()),
        Ok(_) => println!("{}", question),
        Err(e) => {
            tracing::warn!("Normalization failed, using original question: {}", e);
            println!("{}", question);
        }
    }
    Ok(())
}

fn cmd_config(config_path: Option<PathBuf>, profile: Option<String>, action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Show { section } => {
            let config = load_config(config_path, profile)?;
            let value = serde_json::to_value(&config).map_err(|e| LeaseRagError::Json {
                source: e,
                context: "Failed to serialize config".to_string(),
            })?;

            let value = match section {
                Some(section) => value
                    .get(&section)
                    .cloned()
                    .ok_or_else(|| LeaseRagError::Config(format!("Unknown config section: {}", section)))?,
                None => value,
            };

            let json = serde_json::to_string_pretty(&value).map_err(|e| LeaseRagError::Json {
                source: e,
                context: "Failed to serialize config".to_string(),
            })?;
            println!("{}", json);
        }
        ConfigAction::Validate { file } => {
            let path = match file.or(config_path) {
                Some(path) => path,
                None => Config::default_path()?,
            };
            let config = Config::load(&path)?;
            println!("✓ Configuration is valid");
            println!("  Schema version: {}", config.meta.schema_version);
            println!("  Fusion: {} (hybrid enabled: {})", config.hybrid.method, config.hybrid.enabled);
        }
        ConfigAction::Init { force } => {
            let path = match config_path {
                Some(path) => path,
                None => Config::default_path()?,
            };

            if path.exists() && !force {
                println!("Configuration file already exists at: {}", path.display());
                println!("Use --force to overwrite");
                return Ok(());
            }

            let config = Config::default();
            config.save(&path)?;

            println!("✓ Configuration initialized at: {}", path.display());
            println!(
                "  Place {}.jsonl, {}.jsonl and {}.jsonl in {}",
                config.indices.law,
                config.indices.rule,
                config.indices.case,
                config.corpus.dir.display()
            );
        }
    }

    Ok(())
}

fn load_config(config_path: Option<PathBuf>, profile: Option<String>) -> Result<Config> {
    let path = match config_path {
        Some(path) => path,
        None => Config::default_path()?,
    };

    if !path.exists() {
        tracing::warn!("Config file not found, using defaults. Run 'lease-rag config init' to create one.");
        let mut config = Config::default();
        if let Some(profile) = profile {
            config.apply_profile(&profile)?;
        }
        config.apply_env_overrides();
        return Ok(config);
    }

    if let Some(profile) = profile {
        Config::load_with_profile(&path, &profile)
    } else {
        Config::load(&path)
    }
}

fn preview(text: &str, max_chars: usize) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    lease_rag::retrieval::document::truncate_chars(&flat, max_chars)
}
