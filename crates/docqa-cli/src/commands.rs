//! CLI command implementations.

use crate::eval;
use crate::guard::check_question;
use crate::output::{self, OutputFormat, TableBuilder};
use anyhow::{Context, Result};
use docqa_rag::{
    create_generator, create_provider, IndexStore, RagConfig, RetrievalEngine,
};
use serde_json::json;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Resolve the effective configuration: file (or defaults), environment,
/// then command-line overrides.
pub async fn load_config(path: Option<&Path>, data_dir: Option<PathBuf>) -> Result<RagConfig> {
    let mut config = match path {
        Some(path) => RagConfig::load_from_path(path)
            .await
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => RagConfig::from_env().context("Invalid configuration")?,
    };

    if let Some(data_dir) = data_dir {
        debug!("Overriding data_dir from command line: {}", data_dir.display());
        config.store.data_dir = data_dir;
    }

    config.validate().context("Invalid configuration")?;
    Ok(config)
}

/// Engine for commands that only need retrieval. No generator is created,
/// so generation credentials are not required.
fn retrieval_engine(config: &RagConfig) -> Result<RetrievalEngine> {
    let provider = create_provider(&config.embedding).context("Failed to create embedding provider")?;
    let store = IndexStore::from_config(&config.store);
    Ok(RetrievalEngine::new(config, provider, None, store)?)
}

/// Engine with both collaborators wired.
fn answering_engine(config: &RagConfig) -> Result<RetrievalEngine> {
    let provider = create_provider(&config.embedding).context("Failed to create embedding provider")?;
    let generator = create_generator(&config.generation).context("Failed to create answer generator")?;
    let store = IndexStore::from_config(&config.store);
    Ok(RetrievalEngine::new(config, provider, generator, store)?)
}

// ============================================================================
// Build Command
// ============================================================================

pub async fn build(config: &RagConfig, document: &Path, format: OutputFormat) -> Result<()> {
    let engine = retrieval_engine(config)?;

    let spinner = (format == OutputFormat::Human)
        .then(|| output::spinner(format!("Indexing {}...", document.display())));
    let result = engine.build_from_path(document).await;
    if let Some(spinner) = spinner {
        spinner.finish_and_clear();
    }

    let report = result.with_context(|| format!("Failed to index {}", document.display()))?;

    match format {
        OutputFormat::Json => output::json(&report)?,
        OutputFormat::Human => {
            output::success(format!("Indexed {}", report.source));
            output::kv("Generation", &report.generation_id);
            output::kv("Chunks", report.chunk_count);
            output::kv("Dimension", report.dimension);
            output::kv(
                "Model",
                format!("{}/{}", report.model.provider, report.model.model_name),
            );
            output::kv("Elapsed", format!("{} ms", report.elapsed_ms));
        }
    }

    Ok(())
}

// ============================================================================
// Query Commands
// ============================================================================

pub async fn ask(config: &RagConfig, question: &str, format: OutputFormat) -> Result<()> {
    check_question(question)?;

    let engine = answering_engine(config)?;
    let answer = engine.ask(question).await.context("Failed to answer question")?;

    match format {
        OutputFormat::Json => output::json(&json!({ "question": question, "answer": answer }))?,
        OutputFormat::Human => println!("{}", answer),
    }

    Ok(())
}

pub async fn retrieve(config: &RagConfig, question: &str, format: OutputFormat) -> Result<()> {
    check_question(question)?;

    let engine = retrieval_engine(config)?;
    let retrieved = engine
        .retrieve(question)
        .await
        .context("Failed to retrieve context")?;

    match format {
        OutputFormat::Json => output::json(&retrieved)?,
        OutputFormat::Human => {
            let mut table = TableBuilder::new().header(vec!["Rank", "Chunk", "Score", "Text"]);
            for (rank, hit) in retrieved.hits.iter().enumerate() {
                table = table.row(vec![
                    (rank + 1).to_string(),
                    hit.chunk.ordinal.to_string(),
                    format!("{:.4}", hit.score),
                    output::preview(&hit.chunk.text, 72),
                ]);
            }
            table.print();

            output::header(format!(
                "Context ({} characters)",
                retrieved.context.chars().count()
            ));
            println!("{}", retrieved.context);
        }
    }

    Ok(())
}

// ============================================================================
// Status Command
// ============================================================================

pub async fn status(config: &RagConfig, format: OutputFormat) -> Result<()> {
    let store = IndexStore::from_config(&config.store);
    let info = store.status().await.context("Failed to read index status")?;

    match (format, info) {
        (OutputFormat::Json, info) => output::json(&json!({ "index": info }))?,
        (OutputFormat::Human, None) => {
            output::info(format!(
                "No index has been built yet in {}",
                store.dir().display()
            ));
        }
        (OutputFormat::Human, Some(info)) => {
            output::header("Current index");
            output::kv("Generation", &info.id);
            output::kv("Source", &info.source);
            output::kv("Created", info.created_at.to_rfc3339());
            output::kv("Chunks", info.entry_count);
            output::kv("Dimension", info.dimension);
            output::kv(
                "Model",
                format!("{}/{}", info.model.provider, info.model.model_name),
            );
            output::kv("Data dir", store.dir().display());
        }
    }

    Ok(())
}

// ============================================================================
// Eval Command
// ============================================================================

pub async fn evaluate(config: &RagConfig, cases_path: &Path, format: OutputFormat) -> Result<()> {
    let cases = eval::load_cases(cases_path).await?;
    let engine = answering_engine(config)?;

    let report = eval::run_cases(&cases, |question| {
        let engine = &engine;
        async move { engine.ask(&question).await }
    })
    .await;

    match format {
        OutputFormat::Json => {
            output::json(&json!({ "report": report, "pass_rate": report.pass_rate() }))?
        }
        OutputFormat::Human => {
            output::header("Offline evaluation results");
            for outcome in &report.outcomes {
                println!("{}. Question: {}", outcome.number, outcome.question);
                match (&outcome.answer, &outcome.error) {
                    (_, Some(error)) => println!("   Error: {}", error),
                    (Some(answer), None) => println!("   Answer: {}", answer),
                    (None, None) => {}
                }
                let verdict = if outcome.passed { "PASS" } else { "FAIL" };
                println!("   Result: {}\n", verdict);
            }
            println!(
                "Overall Pass Rate: {}/{} = {:.1}%",
                report.passed,
                report.total,
                report.pass_rate()
            );
        }
    }

    Ok(())
}

// ============================================================================
// Config Command
// ============================================================================

pub async fn show_config(config: &RagConfig, write: Option<&Path>) -> Result<()> {
    let text = toml::to_string_pretty(config).context("Failed to serialize configuration")?;
    print!("{}", text);

    if let Some(path) = write {
        config
            .save_to_path(path)
            .await
            .with_context(|| format!("Failed to write config to {}", path.display()))?;
        output::success(format!("Configuration written to {}", path.display()));
    }

    Ok(())
}
