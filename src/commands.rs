use std::io::Write;
use std::path::Path;
use std::pin::pin;
use std::sync::Arc;

use anyhow::{Context, Result};
use console::style;
use futures::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};

use crate::RagError;
use crate::answer::{ANSWER_FAILURE_MESSAGE, AnswerEvent, AnswerStream, format_context};
use crate::answer::context::similarity_percent;
use crate::assistant::Assistant;
use crate::chunker::Chunk;
use crate::config::Config;
use crate::database::sqlite::Database;
use crate::database::{DocumentStore, VectorStore};
use crate::embeddings::{Embedder, LanguageModel, OllamaClient};
use crate::ingest::{Ingestor, preview};

const RECENT_RUNS: i64 = 5;
const EXIT_COMMANDS: [&str; 3] = ["exit", "quit", "خروج"];

/// Chunk and store a source document, recording the run in the ledger
#[inline]
pub async fn ingest_document(config: &Config, path: &Path, dry_run: bool) -> Result<()> {
    if dry_run {
        let chunks = preview(path, &config.chunking)
            .await
            .with_context(|| format!("Failed to chunk {}", path.display()))?;
        print_chunk_summary(&chunks);
        return Ok(());
    }

    let database = Database::initialize_from_config_dir(config.get_base_dir())
        .await
        .context("Failed to initialize SQLite database")?;

    let client = ollama_client(config)?;
    check_ollama(&client).await?;

    let store = VectorStore::new(config)
        .await
        .context("Failed to initialize vector store")?;

    let source = path.display().to_string();
    let run = database.start_ingest_run(&source).await?;
    info!("Started ingest run {} for {}", run.id, source);

    let ingestor = Ingestor::new(
        Arc::new(store),
        Arc::new(client),
        config.chunking.clone(),
        config.ingest.clone(),
    )
    .with_progress(ingest_progress_bar());

    match ingestor.ingest(path).await {
        Ok(report) => {
            database.complete_ingest_run(run.id, report.into()).await?;
            eprintln!("{}", style("✅ Ingestion complete").green());
            eprintln!("   Chunks: {}", report.total_chunks);
            eprintln!("   Stored: {}", report.success_count);
            if report.error_count > 0 {
                eprintln!(
                    "   {}",
                    style(format!("Failed: {}", report.error_count)).yellow()
                );
            }
            Ok(())
        }
        Err(e) => {
            error!("Ingestion of {} failed: {}", source, e);
            database.fail_ingest_run(run.id, &e.to_string()).await?;
            Err(e.into())
        }
    }
}

/// Print the context that would be handed to the model for `question`
#[inline]
pub async fn search(config: &Config, question: &str) -> Result<()> {
    let assistant = build_assistant(config).await?;
    let (analysis, matches) = assistant.search(question).await?;

    eprintln!("{}", style("🔎 Query analysis").bold().cyan());
    for (label, value) in [
        ("Program", &analysis.program),
        ("Institution", &analysis.university),
        ("Code", &analysis.code),
    ] {
        if let Some(value) = value {
            eprintln!("   {}: {}", label, value);
        }
    }
    eprintln!("   Phrasings: {}", analysis.search_phrasings().join(" | "));
    eprintln!("   Matches: {}", matches.len());
    eprintln!();

    println!("{}", format_context(&matches));
    Ok(())
}

/// Answer one question, streaming tokens to stdout; Ctrl-C cancels
#[inline]
pub async fn ask(config: &Config, question: &str) -> Result<()> {
    let assistant = build_assistant(config).await?;
    let mut stream = match assistant.ask(question).await {
        Ok(stream) => stream,
        Err(e) => return Err(report_request_error(e)),
    };

    let mut ctrl_c = pin!(tokio::signal::ctrl_c());

    loop {
        tokio::select! {
            event = stream.next() => {
                let Some(event) = event else { break };
                if render_event(&event)? {
                    break;
                }
            }
            _ = &mut ctrl_c => {
                stream.cancel();
                println!();
                eprintln!("{}", style("Answer cancelled").yellow());
                break;
            }
        }
    }

    Ok(())
}

/// Interactive question loop. Entering a line while an answer is streaming
/// cancels it; a non-empty line is then asked next.
#[inline]
pub async fn chat(config: &Config) -> Result<()> {
    let assistant = build_assistant(config).await?;
    let mut session = assistant.session();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut pending: Option<String> = None;

    eprintln!(
        "{}",
        style("🎓 Admissions assistant. Type a question, or 'exit' to quit.")
            .bold()
            .cyan()
    );

    loop {
        let line = match pending.take() {
            Some(line) => line,
            None => {
                eprint!("{} ", style("❯").cyan());
                std::io::stderr().flush()?;
                match lines.next_line().await? {
                    Some(line) => line,
                    None => break,
                }
            }
        };

        let question = line.trim();
        if question.is_empty() {
            continue;
        }
        if EXIT_COMMANDS.contains(&question) {
            break;
        }

        let stream = match session.ask(question).await {
            Ok(stream) => stream,
            Err(e) => {
                let _ = report_request_error(e);
                continue;
            }
        };

        match stream_until_interrupted(stream, &mut lines).await? {
            Interruption::Finished => {}
            Interruption::NewLine(line) => {
                session.cancel();
                println!();
                eprintln!("{}", style("Answer cancelled").yellow());
                pending = Some(line);
            }
            Interruption::InputClosed => {
                session.cancel();
                break;
            }
        }
    }

    Ok(())
}

enum Interruption {
    Finished,
    NewLine(String),
    InputClosed,
}

async fn stream_until_interrupted<R>(
    mut stream: AnswerStream,
    lines: &mut tokio::io::Lines<R>,
) -> Result<Interruption>
where
    R: tokio::io::AsyncBufRead + Unpin,
{
    loop {
        tokio::select! {
            event = stream.next() => {
                let Some(event) = event else { return Ok(Interruption::Finished) };
                if render_event(&event)? {
                    return Ok(Interruption::Finished);
                }
            }
            line = lines.next_line() => {
                return Ok(match line? {
                    Some(line) => Interruption::NewLine(line),
                    None => Interruption::InputClosed,
                });
            }
        }
    }
}

/// Show Ollama health, store contents and recent ingestion runs
#[inline]
pub async fn show_status(config: &Config) -> Result<()> {
    eprintln!("{}", style("📊 Admissions Assistant Status").bold().cyan());
    eprintln!("{}", "=".repeat(50));

    eprintln!("🤖 Ollama:");
    match ollama_client(config) {
        Ok(client) => match check_ollama(&client).await {
            Ok(()) => {
                eprintln!(
                    "   ✅ Connected ({}:{})",
                    config.ollama.host, config.ollama.port
                );
                eprintln!("   Embedding model: {}", config.ollama.embedding_model);
                eprintln!("   Chat model: {}", config.ollama.chat_model);
            }
            Err(e) => eprintln!("   ⚠️  Unhealthy: {:#}", e),
        },
        Err(e) => eprintln!("   ❌ Invalid configuration: {:#}", e),
    }

    eprintln!("🔍 Vector store:");
    match VectorStore::new(config).await {
        Ok(store) => match store.count().await {
            Ok(count) => eprintln!("   ✅ {} chunks stored", count),
            Err(e) => eprintln!("   ⚠️  Could not count chunks: {:#}", e),
        },
        Err(e) => eprintln!("   ❌ Failed to open: {}", e),
    }

    eprintln!("🗂️  Recent ingestion runs:");
    let database = Database::initialize_from_config_dir(config.get_base_dir())
        .await
        .context("Failed to initialize SQLite database")?;
    let runs = database.recent_ingest_runs(RECENT_RUNS).await?;
    if runs.is_empty() {
        eprintln!("   None yet. Use 'admissions-rag ingest <file>' to load a document.");
    }
    for run in runs {
        eprintln!(
            "   #{} {} [{}] {}",
            run.id,
            run.source_path,
            run.status,
            run.started_at.format("%Y-%m-%d %H:%M:%S")
        );
        eprintln!(
            "      chunks: {}, stored: {}, failed: {}",
            run.total_chunks, run.success_count, run.error_count
        );
        if let Some(duration) = run.duration() {
            eprintln!("      took {}s", duration.num_seconds());
        }
        if let Some(message) = &run.error_message {
            eprintln!("      {}", style(message).red());
        }
    }

    Ok(())
}

async fn build_assistant(config: &Config) -> Result<Assistant> {
    let client = Arc::new(ollama_client(config)?);
    let store = VectorStore::new(config)
        .await
        .context("Failed to initialize vector store")?;

    if store.count().await? == 0 {
        warn!("Vector store is empty, answers will have no supporting context");
    }

    Ok(Assistant::new(
        Arc::new(store),
        Arc::clone(&client) as Arc<dyn Embedder>,
        client as Arc<dyn LanguageModel>,
        config,
    ))
}

fn ollama_client(config: &Config) -> Result<OllamaClient> {
    OllamaClient::new(&config.ollama).context("Failed to create Ollama client")
}

async fn check_ollama(client: &OllamaClient) -> Result<()> {
    let client = client.clone();
    tokio::task::spawn_blocking(move || client.health_check())
        .await
        .context("Health check task failed")?
}

/// Write one answer event to the terminal; returns true on a terminal event
fn render_event(event: &AnswerEvent) -> Result<bool> {
    match event {
        AnswerEvent::Sources(sources) => {
            if sources.is_empty() {
                eprintln!("{}", style("No matching sources").dim());
            }
            for (index, source) in sources.iter().enumerate() {
                let label = [
                    source.metadata.program_code.as_deref(),
                    source.metadata.program_name.as_deref(),
                ]
                .into_iter()
                .flatten()
                .collect::<Vec<_>>()
                .join(" ");
                eprintln!(
                    "{}",
                    style(format!(
                        "[{}] {} ({}%)",
                        index + 1,
                        label,
                        similarity_percent(source.similarity)
                    ))
                    .dim()
                );
            }
            eprintln!();
            Ok(false)
        }
        AnswerEvent::Chunk(text) => {
            let mut stdout = std::io::stdout();
            write!(stdout, "{}", text)?;
            stdout.flush()?;
            Ok(false)
        }
        AnswerEvent::Done => {
            println!();
            Ok(true)
        }
        AnswerEvent::Error(message) => {
            println!();
            eprintln!("{}", style(message).red());
            Ok(true)
        }
    }
}

/// Tell the user why a request produced no answer
fn report_request_error(e: RagError) -> anyhow::Error {
    match &e {
        RagError::InvalidInput(reason) => {
            eprintln!("{}", style(format!("Invalid question: {}", reason)).yellow());
        }
        _ => {
            error!("Request failed: {}", e);
            eprintln!("{}", style(ANSWER_FAILURE_MESSAGE).red());
        }
    }
    e.into()
}

fn print_chunk_summary(chunks: &[Chunk]) {
    eprintln!(
        "{}",
        style(format!("📄 {} chunks (dry run, nothing stored)", chunks.len()))
            .bold()
            .cyan()
    );
    for chunk in chunks {
        let metadata = &chunk.metadata;
        eprintln!(
            "  #{:<3} {:<20} code: {:<8} name: {} | section: {} | {} chars",
            metadata.chunk_index,
            metadata.chunk_type,
            metadata.program_code.as_deref().unwrap_or("-"),
            metadata.program_name.as_deref().unwrap_or("-"),
            metadata.section.as_deref().unwrap_or("-"),
            chunk.content.chars().count()
        );
    }
}

fn ingest_progress_bar() -> ProgressBar {
    if console::user_attended_stderr() {
        ProgressBar::new(0).with_style(
            ProgressStyle::with_template("{spinner} [{bar:30}] {pos}/{len} chunks embedded")
                .expect("style template is valid"),
        )
    } else {
        ProgressBar::hidden()
    }
}
