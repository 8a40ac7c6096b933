use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tokio_stream::StreamExt;

use lector_core::answer::AnswerEvent;
use lector_core::{Chunker, ChunkerConfig, Config, Pipeline, RetrieverConfig};
use lector_gateway::GatewayServer;
use lector_llm::embedder::Embedder;
use lector_llm::ollama::OllamaProvider;
use lector_store::QdrantVectorStore;

#[derive(Parser)]
#[command(
    name = "lector",
    version,
    about = "Document question answering over a RAG pipeline"
)]
struct Cli {
    /// Path to the TOML config file.
    #[arg(long, default_value = "lector.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP gateway (default).
    Serve,
    /// Ingest a file and print its receipt.
    Ingest { path: PathBuf },
    /// Ask a question and stream the answer to stdout.
    Ask {
        question: String,
        #[arg(long)]
        top_k: Option<usize>,
    },
    /// Delete a previously ingested document.
    Delete { document_id: String },
}

type OllamaPipeline = Pipeline<OllamaProvider, OllamaProvider>;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();
    let config = Config::load(&cli.config).context("loading config")?;

    let pipeline = build_pipeline(&config).await?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(&config, pipeline).await,
        Command::Ingest { path } => {
            let receipt = pipeline.ingest_file(&path).await?;
            println!(
                "ingested {} as {} ({} chunks)",
                receipt.source_name, receipt.document_id, receipt.chunk_count
            );
            Ok(())
        }
        Command::Ask { question, top_k } => ask(&pipeline, &question, top_k).await,
        Command::Delete { document_id } => {
            pipeline.delete_document(&document_id).await?;
            println!("deleted {document_id}");
            Ok(())
        }
    }
}

async fn build_pipeline(config: &Config) -> anyhow::Result<Arc<OllamaPipeline>> {
    let provider = Arc::new(OllamaProvider::new(
        &config.ollama.host,
        config.ollama.model.clone(),
        config.ollama.embedding_model.clone(),
    ));
    let embedder = Arc::new(
        Embedder::new(Arc::clone(&provider)).with_max_chars(config.embedding.max_chars),
    );

    let store = QdrantVectorStore::new(&config.qdrant.url, config.qdrant.collection.clone())
        .context("connecting to qdrant")?;

    // Probe the embedding model once so the collection is created with the
    // right vector size before any request arrives.
    let dimension = embedder
        .dimension()
        .await
        .context("probing embedding dimension")?;
    store
        .ensure_collection(dimension as u64)
        .await
        .context("preparing qdrant collection")?;

    let chunker = Chunker::new(ChunkerConfig::from(&config.chunking))?;

    Ok(Arc::new(Pipeline::new(
        provider,
        embedder,
        Arc::new(store),
        chunker,
        RetrieverConfig::from(&config.retrieval),
    )))
}

async fn serve(config: &Config, pipeline: Arc<OllamaPipeline>) -> anyhow::Result<()> {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("shutdown signal received");
            let _ = shutdown_tx.send(true);
        }
    });

    GatewayServer::new(
        &config.server.host,
        config.server.port,
        pipeline,
        shutdown_rx,
    )
    .with_auth(config.server.auth_token.clone())
    .with_max_body_size(config.server.max_body_bytes)
    .serve()
    .await?;

    Ok(())
}

async fn ask(
    pipeline: &OllamaPipeline,
    question: &str,
    top_k: Option<usize>,
) -> anyhow::Result<()> {
    use std::io::Write;

    let mut stream = pipeline.ask_stream(question, top_k).await?;
    let mut stdout = std::io::stdout();

    while let Some(event) = stream.next().await {
        match event {
            AnswerEvent::Content { text } => {
                stdout.write_all(text.as_bytes())?;
                stdout.flush()?;
            }
            AnswerEvent::Done { sources } => {
                println!("\n\nsources:");
                for source in sources {
                    println!(
                        "  {} #{} (similarity {:.3})",
                        source.source_name, source.chunk_index, source.similarity
                    );
                }
            }
            AnswerEvent::NoContext => {
                println!("no relevant context found in the ingested documents");
            }
            AnswerEvent::Error { message } => {
                anyhow::bail!("generation failed: {message}");
            }
        }
    }

    Ok(())
}
