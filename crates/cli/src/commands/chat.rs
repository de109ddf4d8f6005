//! `threadmind chat`: interactive or single-message chat with memory.

use std::io::Write;
use threadmind_agent::{ChatAgent, ChatReply, build_chat_agent};
use threadmind_config::AppConfig;
use threadmind_core::turn::SessionId;
use tokio::io::{AsyncBufReadExt, BufReader};

/// A line typed at the interactive prompt.
#[derive(Debug, PartialEq, Eq)]
enum Input<'a> {
    Quit,
    Clear,
    Context(Option<&'a str>),
    Empty,
    Message(&'a str),
}

fn parse_input(line: &str) -> Input<'_> {
    let line = line.trim();
    match line {
        "" => Input::Empty,
        "exit" | "quit" | "/exit" | "/quit" => Input::Quit,
        "/clear" => Input::Clear,
        "/context" => Input::Context(None),
        _ => match line.strip_prefix("/context ") {
            Some(query) => Input::Context(Some(query.trim())),
            None => Input::Message(line),
        },
    }
}

pub async fn run(
    session: Option<String>,
    message: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;

    // Check for an API key early so the error is readable
    if !config.has_api_key() && config.provider.name != "ollama" {
        eprintln!();
        eprintln!("  ERROR: No API key configured!");
        eprintln!();
        eprintln!("  Set one of these environment variables:");
        eprintln!("    THREADMIND_API_KEY = 'sk-...'");
        eprintln!("    OPENAI_API_KEY     = 'sk-...'");
        eprintln!();
        eprintln!("  Or add it to your config file:");
        eprintln!("    {}", AppConfig::config_dir().join("config.toml").display());
        eprintln!();
        return Err("No API key found. See above for setup instructions.".into());
    }

    let agent = build_chat_agent(&config).await?;
    let session_id = session.map(SessionId::from).unwrap_or_else(SessionId::generate);

    if let Some(msg) = message {
        eprint!("  Thinking...");
        let reply = agent.reply(&session_id, &msg).await;
        eprint!("\r              \r");
        let reply = reply?;
        println!("{}", reply.reply);
        print_notes(&reply);
        return Ok(());
    }

    println!();
    println!("  Threadmind, interactive mode");
    println!();
    println!("  Provider:  {}", config.provider.name);
    println!("  Model:     {}", config.provider.chat_model);
    println!("  Memory:    {} store", agent.memory().store_name());
    println!("  Session:   {session_id}");
    println!();
    println!("  Type your message and press Enter.");
    println!("  /context [query] shows memory, /clear forgets this session, 'exit' quits.");
    println!();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    prompt()?;

    while let Some(line) = lines.next_line().await? {
        match parse_input(&line) {
            Input::Quit => break,
            Input::Empty => {}
            Input::Clear => match agent.memory().clear_session(&session_id).await {
                Ok(outcome) => match outcome.pruned {
                    Some(n) => println!("  Session cleared ({n} stored records removed).\n"),
                    None => println!("  Session cleared (stored records could not be removed).\n"),
                },
                Err(e) => println!("  [Info] {e}\n"),
            },
            Input::Context(query) => show_context(&agent, &session_id, query).await,
            Input::Message(text) => {
                eprint!("  ...");
                let result = agent.reply(&session_id, text).await;
                eprint!("\r     \r");
                match result {
                    Ok(reply) => {
                        println!();
                        for line in reply.reply.lines() {
                            println!("  Assistant > {line}");
                        }
                        print_notes(&reply);
                        println!();
                    }
                    Err(e) => {
                        eprintln!("  [Error] {e}");
                        println!();
                    }
                }
            }
        }
        prompt()?;
    }

    println!();
    println!("  Goodbye!");
    println!();
    Ok(())
}

fn prompt() -> std::io::Result<()> {
    print!("  You > ");
    std::io::stdout().flush()
}

fn print_notes(reply: &ChatReply) {
    if let Some(summary) = &reply.summary {
        eprintln!("  [Memory] Conversation compacted: {summary}");
    }
    for warning in &reply.warnings {
        eprintln!("  [Warn] {warning}");
    }
}

async fn show_context(agent: &ChatAgent, session_id: &SessionId, query: Option<&str>) {
    let memory = agent.memory();
    let context = memory
        .assemble_context(session_id, query.unwrap_or_default(), None)
        .await;

    println!();
    println!(
        "  Window: {} turns, {} tokens",
        context.recent.len(),
        memory.total_tokens(session_id).await
    );
    for turn in &context.recent {
        println!("    {}", turn.transcript_line());
    }
    if query.is_some() {
        if context.recall_degraded {
            println!("  Recall unavailable.");
        } else {
            println!("  Recalled: {}", context.retrieved.len());
            for content in &context.retrieved {
                println!("    - {content}");
            }
        }
    }
    println!();
}
