//! `copycat agent`: interactive or single-message chat mode.
//!
//! Each invocation gets a fresh in-memory chat; history lasts for the
//! session only.

use std::io::Write;
use std::sync::Arc;

use copycat_agent::{ChatService, TurnReply};
use copycat_config::AppConfig;
use copycat_core::event::EventBus;
use copycat_store::InMemoryConversationStore;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::debug;

pub async fn run(message: Option<String>) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;

    // Check for API key early and give a clear error
    if !config.has_api_key() {
        eprintln!();
        eprintln!("  ERROR: No API key configured!");
        eprintln!();
        eprintln!("  Set one of these environment variables:");
        eprintln!("    COPYCAT_API_KEY = 'sk-...'");
        eprintln!("    OPENAI_API_KEY  = 'sk-...'");
        eprintln!();
        eprintln!("  Or add it to your config file:");
        eprintln!("    {}", AppConfig::config_dir().join("config.toml").display());
        eprintln!();
        return Err("No API key found. See above for setup instructions.".into());
    }

    let service = build_service(&config)?;
    let chat = service.store().create("CLI session").await?;
    debug!(chat_id = %chat.id, "CLI chat created");

    if let Some(msg) = message {
        // Single message mode
        eprint!("  Thinking...");
        let reply = turn(&service, &chat.id, &msg).await;
        eprint!("\r              \r");
        let reply = reply?;
        println!("{}", reply.reply);
        if !reply.success {
            return Err("The agent did not reach an answer".into());
        }
        return Ok(());
    }

    // Interactive mode
    println!();
    println!("  CopyCat Agent: Interactive Mode");
    println!();
    println!("  Provider:  {}", config.provider.name);
    println!("  Model:     {}", config.provider.model);
    println!("  Tools:     {}", service.agent().tools().names().join(", "));
    println!("  Clones:    {}", config.cloner.output_root.display());
    println!();
    println!("  Type your message and press Enter.");
    println!("  Type 'exit' or Ctrl+C to quit.");
    println!();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        print!("  You > ");
        std::io::stdout().flush()?;

        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else { break };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if matches!(line, "exit" | "quit") {
            break;
        }

        eprint!("  ...");
        let result = turn(&service, &chat.id, line).await;
        eprint!("\r     \r");

        match result {
            Ok(reply) => {
                println!();
                for line in reply.reply.lines() {
                    println!("  Assistant > {line}");
                }
                println!();
            }
            Err(e) => {
                eprintln!("  [Error] {e}");
                println!();
            }
        }
    }

    println!();
    println!("  Goodbye!");
    println!();

    Ok(())
}

fn build_service(config: &AppConfig) -> Result<ChatService, Box<dyn std::error::Error>> {
    let provider = copycat_providers::build_from_config(config)?;
    let tools = Arc::new(copycat_tools::default_registry(config));
    let event_bus = Arc::new(EventBus::default());
    let agent = copycat_agent::agent_from_config(config, provider, tools, event_bus);

    Ok(ChatService::new(
        Arc::new(agent),
        Arc::new(InMemoryConversationStore::new()),
    ))
}

/// One turn; Ctrl+C cancels it instead of killing the session.
async fn turn(
    service: &ChatService,
    chat_id: &copycat_core::ConversationId,
    prompt: &str,
) -> Result<TurnReply, copycat_core::Error> {
    let cancel = CancellationToken::new();
    let guard = cancel.clone();
    let watcher = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            guard.cancel();
        }
    });

    let result = service
        .process_turn_with_cancel(chat_id, prompt, &cancel)
        .await;
    watcher.abort();
    result
}
