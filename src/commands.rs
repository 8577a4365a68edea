use std::path::PathBuf;
use tracing::info;

use crate::Result;
use crate::config::Config;
use crate::embeddings::OllamaClient;
use crate::index::VectorStore;
use crate::pipeline::{QueryOutcome, RagPipeline, rebuild_index};

/// Build (or rebuild) the vector index from the sales spreadsheet
#[inline]
pub async fn index_dataset(dataset: Option<PathBuf>) -> Result<()> {
    let config = Config::load_default()?;

    info!("Building index (mode: {:?})", config.retrieval.mode);

    let documents_indexed = rebuild_index(&config, dataset.as_deref()).await?;

    println!("Index built successfully!");
    println!("  Documents indexed: {}", documents_indexed);
    println!("  Synthesis mode: {:?}", config.retrieval.mode);
    println!("  Index directory: {}", config.index_dir().display());

    Ok(())
}

/// Answer a single question against the indexed dataset
#[inline]
pub async fn ask_question(question: String, k: Option<usize>) -> Result<()> {
    let mut config = Config::load_default()?;
    if k.is_some() {
        config.retrieval.k = k;
    }

    let pipeline = RagPipeline::new(config).await?;
    let outcome = pipeline.query(&question).await?;

    match outcome {
        QueryOutcome::Greeting(answer) => {
            println!("{}", answer.text);
        }
        QueryOutcome::Answered(answer) => {
            println!("{}", answer.text);
            if !answer.sources.is_empty() {
                println!();
                println!("Fuentes: {}", answer.sources.join(", "));
            }
        }
        QueryOutcome::Degraded(answer) => {
            println!("{}", answer.text);
            println!();
            println!("⚠️  El modelo de generación no respondió; se muestra el contexto recuperado.");
        }
    }

    Ok(())
}

/// Show detailed status of the answering pipeline
#[inline]
pub async fn show_status() -> Result<()> {
    let config = Config::load_default().unwrap_or_default();

    println!("📊 Retail-RAG Status Report");
    println!("{}", "=".repeat(50));
    println!();

    println!("🗂️  Dataset:");
    match &config.dataset_path {
        Some(path) if path.exists() => println!("   ✅ Configured: {}", path.display()),
        Some(path) => println!("   ⚠️  Configured but missing: {}", path.display()),
        None => println!("   🔍 Not configured; the indexer will scan for .xlsx/.xls files"),
    }

    println!("🤖 Ollama Status:");
    match OllamaClient::new(&config.ollama) {
        Ok(client) => match client.health_check() {
            Ok(()) => {
                println!(
                    "   ✅ Ollama: Connected ({}:{})",
                    config.ollama.host, config.ollama.port
                );
                println!("   📋 Embedding Model: {}", config.ollama.embedding_model);
                println!("   💬 Generation Model: {}", config.ollama.generation_model);
                println!("   🔢 Batch Size: {}", config.ollama.batch_size);
            }
            Err(e) => {
                println!("   ⚠️  Ollama: Connected but unhealthy - {}", e);
            }
        },
        Err(e) => {
            println!("   ❌ Ollama: Failed to connect - {}", e);
        }
    }

    println!("🧠 Generation Backend:");
    println!("   Provider: {}", config.generation.provider);

    println!("🔍 Vector Index Status:");
    match VectorStore::open(&config.index_dir()).await {
        Ok(store) => match store.count_documents().await {
            Ok(count) => {
                println!("   ✅ LanceDB: Connected");
                println!("   📄 Indexed Documents: {}", count);
                if let Ok(dimension) = store.vector_dimension().await {
                    println!("   📐 Vector Dimension: {}", dimension);
                }
            }
            Err(e) => {
                println!("   ⚠️  LanceDB: Connected but no index - {}", e);
            }
        },
        Err(e) => {
            println!("   ❌ LanceDB: Failed to connect - {}", e);
        }
    }

    println!();
    println!(
        "⚙️  Retrieval: mode {:?}, k {}",
        config.retrieval.mode,
        config.retrieval.effective_k()
    );

    println!();
    println!("💡 Next Steps:");
    println!("   • Use 'retail-rag index' to build the vector index from the spreadsheet");
    println!("   • Use 'retail-rag ask \"¿Cuántas ventas hubo en 2023?\"' to query it");
    println!("   • Use 'retail-rag config' to update connection settings");

    Ok(())
}
