//! lore - retrieval-augmented support chat CLI

mod commands;
mod config;
mod session;
mod utils;

use anyhow::Context as _;
use clap::Parser;
use futures::StreamExt;
use lore_ai::{CompletionOptions, Message, OpenAIEmbedder, Provider, models};
use lore_graph::{
    ChromaConfig, ChromaIndex, GeneratorConfig, MemoryCheckpointer, Pipeline, PipelineConfig,
    ProviderModel, RetrieverConfig, Stage, ThreadId,
};
use std::io::{self, Write};
use std::sync::Arc;

const DEFAULT_TEMPERATURE: f32 = 0.7;
const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";

/// lore - answer questions from a document collection
#[derive(Parser, Debug)]
#[command(name = "lore")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Chat model id (default depends on provider)
    #[arg(short, long)]
    model: Option<String>,

    /// Provider (openai, anthropic, azure, ollama, groq, openrouter)
    #[arg(short, long)]
    provider: Option<String>,

    /// Override the provider endpoint
    #[arg(long)]
    base_url: Option<String>,

    /// Chroma collection to search
    #[arg(long)]
    collection: Option<String>,

    /// Answer a single question and exit
    #[arg(short = 'c', long)]
    command: Option<String>,

    /// Report each pipeline stage as it completes
    #[arg(long)]
    stream: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Resume a previous session by thread id
    #[arg(long)]
    resume: Option<String>,

    /// List saved sessions
    #[arg(long)]
    sessions: bool,

    /// Initialize config file
    #[arg(long)]
    init_config: bool,
}

/// What one turn produced, whichever way it was run
struct TurnOutcome {
    reply: Message,
    context: Vec<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    if args.verbose {
        tracing_subscriber::fmt()
            .with_env_filter("lore=debug")
            .with_writer(io::stderr)
            .init();
    } else if std::env::var_os("RUST_LOG").is_some() {
        tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_writer(io::stderr)
            .init();
    }

    if args.init_config {
        match config::Config::init() {
            Ok(path) => {
                println!("Config file created at: {}", path.display());
                println!("\nExample config:\n{}", config::example_config());
            }
            Err(e) => {
                eprintln!("Error creating config: {}", e);
                std::process::exit(1);
            }
        }
        return Ok(());
    }

    if args.sessions {
        return list_sessions();
    }

    let cfg = config::Config::load();

    let provider = Provider::parse(
        args.provider
            .as_deref()
            .or(cfg.provider.as_deref())
            .unwrap_or("openai"),
    );
    let model_id = args
        .model
        .clone()
        .or(cfg.model.clone())
        .unwrap_or_else(|| models::default_model_id(provider).to_string());
    let base_url = args.base_url.as_deref().or(cfg.base_url.as_deref());
    let model = models::resolve_model(provider, &model_id, base_url)?;

    let api_key = cfg.get_api_key(provider);
    if api_key.is_none() {
        if let Some(var) = provider.api_key_env_var() {
            eprintln!("Error: No API key found for {}", provider.name());
            eprintln!();
            eprintln!("Set your API key with: export {}=your-key", var);
            eprintln!("Or add it to config file: lore --init-config");
            std::process::exit(1);
        }
    }

    let pipeline = build_pipeline(&cfg, &args, model, api_key)?;

    if let Some(ref command) = args.command {
        return run_command(&pipeline, command, args.stream).await;
    }

    let (thread_id, session) = match args.resume {
        Some(ref id) => {
            let (session, messages) = session::SessionManager::load(id)
                .with_context(|| format!("Failed to load session {}", id))?;
            let thread_id = ThreadId::new(id.as_str());
            println!("Resuming session {} ({} messages)", id, messages.len());
            pipeline.seed(&thread_id, messages).await?;
            (thread_id, Some(session))
        }
        None => {
            let thread_id = ThreadId::generate();
            let session = open_transcript(&thread_id, &model_id);
            (thread_id, session)
        }
    };

    run_interactive(&pipeline, thread_id, session, &model_id, args.stream).await
}

fn build_pipeline(
    cfg: &config::Config,
    args: &Args,
    model: lore_ai::Model,
    api_key: Option<String>,
) -> anyhow::Result<Pipeline> {
    let embed_provider = Provider::parse(cfg.embedding.provider.as_deref().unwrap_or("openai"));
    let embed_url = cfg
        .embedding
        .base_url
        .clone()
        .unwrap_or_else(|| embed_provider.default_base_url().to_string());
    if embed_url.is_empty() {
        anyhow::bail!(
            "embedding provider {} requires [embedding] base_url",
            embed_provider.name()
        );
    }
    let embedder = OpenAIEmbedder::new(
        embed_provider,
        embed_url,
        cfg.embedding
            .model
            .clone()
            .unwrap_or_else(|| DEFAULT_EMBEDDING_MODEL.to_string()),
        cfg.get_api_key(embed_provider),
    )?;

    let defaults = ChromaConfig::default();
    let chroma = ChromaConfig {
        url: cfg.retrieval.chroma_url.clone().unwrap_or(defaults.url),
        tenant: cfg.retrieval.tenant.clone().unwrap_or(defaults.tenant),
        database: cfg.retrieval.database.clone().unwrap_or(defaults.database),
        collection: args
            .collection
            .clone()
            .or(cfg.retrieval.collection.clone())
            .unwrap_or(defaults.collection),
    };
    tracing::info!("Using Chroma collection {} at {}", chroma.collection, chroma.url);
    let index = ChromaIndex::new(chroma, Arc::new(embedder));

    let options = CompletionOptions {
        max_tokens: cfg.max_tokens,
        temperature: Some(cfg.temperature.unwrap_or(DEFAULT_TEMPERATURE)),
    };
    let llm = ProviderModel::new(model, api_key, options)?;

    let mut generator = GeneratorConfig::default();
    if let Some(ref contact) = cfg.support_contact {
        generator.support_contact = contact.clone();
    }
    let mut retriever = RetrieverConfig::default();
    if let Some(top_k) = cfg.retrieval.top_k {
        retriever.top_k = top_k;
    }

    Ok(Pipeline::new(
        Arc::new(index),
        Arc::new(llm),
        Arc::new(MemoryCheckpointer::new()),
        PipelineConfig {
            retriever,
            generator,
            serialize_turns: true,
        },
    ))
}

/// Run one turn, either to completion or stage by stage.
async fn run_turn(
    pipeline: &Pipeline,
    input: &str,
    thread_id: Option<&ThreadId>,
    stream: bool,
) -> anyhow::Result<TurnOutcome> {
    if !stream {
        let state = pipeline.invoke(input, thread_id).await?;
        let reply = state
            .last_assistant_message()
            .cloned()
            .context("pipeline finished without a reply")?;
        return Ok(TurnOutcome {
            reply,
            context: state.context,
        });
    }

    let mut context = Vec::new();
    let mut reply = None;
    let mut updates = pipeline.stream(input, thread_id);
    while let Some(update) = updates.next().await {
        let update = update?;
        match update.stage {
            Stage::Retrieve => {
                context = update.update.context.unwrap_or_default();
                eprintln!("[{}: {} fragment(s)]", update.stage.name(), context.len());
            }
            Stage::Generate => {
                eprintln!("[{}: done]", update.stage.name());
                reply = update.update.messages.into_iter().last();
            }
        }
    }

    Ok(TurnOutcome {
        reply: reply.context("pipeline finished without a reply")?,
        context,
    })
}

async fn run_command(pipeline: &Pipeline, command: &str, stream: bool) -> anyhow::Result<()> {
    let outcome = run_turn(pipeline, command, None, stream).await?;
    println!("{}", outcome.reply.text());
    Ok(())
}

async fn run_interactive(
    pipeline: &Pipeline,
    mut thread_id: ThreadId,
    mut session: Option<session::SessionManager>,
    model_id: &str,
    stream: bool,
) -> anyhow::Result<()> {
    let mut last_context: Vec<String> = Vec::new();

    println!("Session: {}", thread_id);
    println!("Type 'quit' to exit, /help for commands.");
    println!();

    loop {
        print!("You: ");
        io::stdout().flush()?;

        let mut input = String::new();
        if io::stdin().read_line(&mut input)? == 0 {
            // EOF
            break;
        }

        let input = input.trim();
        if input.is_empty() {
            continue;
        }

        if matches!(input.to_lowercase().as_str(), "quit" | "exit" | "q") {
            break;
        }

        if let Some(result) = commands::execute_command(input) {
            match result {
                commands::CommandResult::NewThread => {
                    thread_id = ThreadId::generate();
                    session = open_transcript(&thread_id, model_id);
                    last_context.clear();
                    println!("Session: {}", thread_id);
                }
                commands::CommandResult::ShowHistory => {
                    let messages = pipeline.history(&thread_id).await?;
                    println!(
                        "{}",
                        commands::HistoryCommand::render(thread_id.as_str(), &messages)
                    );
                }
                commands::CommandResult::ShowContext => {
                    println!("{}", commands::ContextCommand::render(&last_context));
                }
                commands::CommandResult::Message(msg) => {
                    println!("{}", msg);
                }
                commands::CommandResult::Exit => {
                    break;
                }
                commands::CommandResult::Unknown(cmd) => {
                    println!("Unknown command: /{}", cmd);
                    println!("Type /help for available commands.");
                }
            }
            println!();
            continue;
        }

        let outcome = match run_turn(pipeline, input, Some(&thread_id), stream).await {
            Ok(outcome) => outcome,
            Err(e) if is_fatal(&e) => return Err(e),
            Err(e) => {
                eprintln!("Error: {:#}", e);
                continue;
            }
        };

        println!("Bot: {}", outcome.reply.text());
        println!();

        if let Some(ref mut s) = session {
            if let Err(e) = record_turn(s, input, &outcome) {
                tracing::warn!("Failed to write transcript for {}: {}", s.id(), e);
            }
        }
        last_context = outcome.context;
    }

    Ok(())
}

/// Errors that leave the thread unusable end the session instead of the turn
fn is_fatal(e: &anyhow::Error) -> bool {
    e.downcast_ref::<lore_graph::Error>()
        .is_some_and(lore_graph::Error::is_fatal)
}

fn record_turn(
    session: &mut session::SessionManager,
    input: &str,
    outcome: &TurnOutcome,
) -> std::io::Result<()> {
    session.append_message(&Message::user(input))?;
    session.append_context(&outcome.context)?;
    session.append_message(&outcome.reply)
}

fn open_transcript(thread_id: &ThreadId, model_id: &str) -> Option<session::SessionManager> {
    match session::SessionManager::new(thread_id.as_str(), model_id) {
        Ok(session) => Some(session),
        Err(e) => {
            tracing::warn!("Transcript disabled: {}", e);
            None
        }
    }
}

fn list_sessions() -> anyhow::Result<()> {
    match session::SessionManager::list_sessions() {
        Ok(sessions) => {
            if sessions.is_empty() {
                println!("No saved sessions found.");
                println!(
                    "Sessions are stored in: {}",
                    session::SessionManager::sessions_dir().display()
                );
            } else {
                println!("Saved sessions:\n");
                println!("{:<38} {:<20} {:<8} Model", "ID", "Created", "Msgs");
                println!("{}", "-".repeat(80));
                for s in sessions {
                    println!(
                        "{:<38} {:<20} {:<8} {}",
                        s.id,
                        s.created_at_display(),
                        s.message_count,
                        utils::truncate_chars(&s.model, 20)
                    );
                }
                println!("\nResume with: lore --resume <session-id>");
            }
        }
        Err(e) => {
            eprintln!("Error listing sessions: {}", e);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checkpoint_failure_ends_the_session() {
        let err = anyhow::Error::from(lore_graph::Error::Checkpoint("store gone".into()));
        assert!(is_fatal(&err));
        assert!(is_fatal(&err.context("turn failed")));
    }

    #[test]
    fn test_recoverable_errors_keep_the_session() {
        let index = anyhow::Error::from(lore_graph::Error::Index("collection missing".into()));
        assert!(!is_fatal(&index));

        let ai = anyhow::Error::from(lore_graph::Error::Ai(lore_ai::Error::InvalidApiKey));
        assert!(!is_fatal(&ai));

        assert!(!is_fatal(&anyhow::anyhow!("pipeline finished without a reply")));
    }
}
