//! docseeker - CLI entry point

use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use docseeker::{
    agent::{classify, Orchestrator, TurnRequest},
    cli::{Args, Commands, EventPrinter, Verbosity},
    config::Config,
    embedding::EmbeddingCache,
    expansion::SynonymIndex,
    llm::OllamaClient,
    store::{Corpus, FileSynonymSource, InMemoryDocumentStore, InMemoryKnowledgeGraph},
    telemetry::{init_tracing, TelemetryCollector, TelemetryDisplay},
};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.verbosity());

    let mut config = Config::load(args.config.clone()).context("Failed to load configuration")?;
    args.apply_overrides(&mut config);
    config.validate().context("Invalid configuration")?;

    match &args.command {
        Commands::Ask {
            question,
            corpus,
            caller,
            hints,
        } => {
            let mut request = TurnRequest::new(question.clone(), caller.clone());
            if let Some(hints) = hints {
                request = request.with_hints(hints.clone());
            }
            ask(config, corpus, request, args.verbosity()).await
        }
        Commands::Classify { text } => {
            show_classification(text);
            Ok(())
        }
        Commands::Config => {
            let rendered = toml::to_string_pretty(&config).context("Failed to render configuration")?;
            println!("{}", rendered);
            Ok(())
        }
    }
}

async fn ask(config: Config, corpus_path: &Path, request: TurnRequest, verbosity: Verbosity) -> Result<()> {
    let corpus = Corpus::load(corpus_path)?;
    let client = Arc::new(OllamaClient::from_config(&config).context("Failed to create Ollama client")?);

    let cache = Arc::new(EmbeddingCache::new(client.clone(), config.cache.clone()));
    let _sweeper = cache.spawn_sweeper(Duration::from_secs(config.cache.sweep_interval_secs.max(1)));

    let mut store = InMemoryDocumentStore::from_corpus(&corpus);
    match store.index_embeddings(&cache).await {
        Ok(indexed) => info!(indexed, "document embeddings ready"),
        Err(e) => warn!(error = %e, "embedding index unavailable, searches fall back to keywords"),
    }
    let graph = InMemoryKnowledgeGraph::from_corpus(&corpus);

    let synonyms = Arc::new(SynonymIndex::new(corpus.synonyms.clone()));
    if let Some(path) = config.synonyms_path() {
        let source = FileSynonymSource::new(path);
        match synonyms.reload(&source).await {
            Ok(groups) => info!(groups, path = %source.path().display(), "synonyms loaded"),
            Err(e) => warn!(error = %e, "synonym file not loaded, keeping corpus groups"),
        }
    }

    let orchestrator = Orchestrator::from_stores(
        config,
        client,
        cache,
        Arc::new(store),
        Arc::new(graph),
        synonyms,
    );

    let telemetry = TelemetryCollector::new();
    let mut printer = EventPrinter::new(verbosity);
    let mut events = orchestrator.run_turn(request);
    let mut failed = false;
    while let Some(event) = events.recv().await {
        telemetry.record(&event);
        printer.print(&event);
        failed |= matches!(event, docseeker::types::Event::Error { .. });
    }

    TelemetryDisplay::new(telemetry, verbosity).display_summary();
    if failed {
        std::process::exit(1);
    }
    Ok(())
}

fn show_classification(text: &str) {
    let decision = classify(text);
    let verdict = if decision.is_chitchat {
        "chit-chat".green().bold()
    } else {
        "retrieval".cyan().bold()
    };
    println!("{} (rule: {:?})", verdict, decision.rule);
    if let Some(kind) = decision.kind {
        println!("kind: {:?}", kind);
    }
    if let Some(template) = decision.template() {
        println!("reply: {}", template);
    }
}
