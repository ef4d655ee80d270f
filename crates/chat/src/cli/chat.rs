//! `studybuddy chat`: interactive REPL.
//!
//! Each line is one turn; reply text streams to stdout, tool activity goes
//! to stderr dimmed. Slash-commands inspect the conversation state.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::mpsc;

use sb_domain::config::Config;
use sb_sessions::{ConversationStore, MemoryStore};

use crate::bootstrap;
use crate::cache::SessionCache;
use crate::fallback::pending_actions_reply;
use crate::turn::{ChatRuntime, TurnEvent, TurnInput};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Public entry point
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn chat(config: Arc<Config>, data_dir: Option<PathBuf>) -> anyhow::Result<()> {
    let runtime = bootstrap::build_runtime(config)?;
    let store = bootstrap::open_store(data_dir.as_deref())?;
    let cache = SessionCache::new();

    let history_path = data_dir.as_ref().map(|d| d.join("chat_history.txt"));
    let mut rl = rustyline::DefaultEditor::new()?;
    if let Some(path) = &history_path {
        let _ = rl.load_history(path);
    }

    eprintln!("studybuddy chat");
    eprintln!("Type /help for commands, Ctrl+D to exit");
    eprintln!();

    loop {
        match rl.readline("you> ") {
            Ok(line) => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                rl.add_history_entry(&line).ok();

                if trimmed.starts_with('/') {
                    match handle_slash_command(trimmed, &store, &cache) {
                        Ok(true) => break,
                        Ok(false) => {}
                        Err(e) => eprintln!("\x1B[31merror: {e}\x1B[0m"),
                    }
                    continue;
                }

                if let Err(e) = send_message(&runtime, &store, &cache, trimmed).await {
                    eprintln!("\x1B[31merror: {e}\x1B[0m");
                }
            }
            Err(rustyline::error::ReadlineError::Interrupted) => {
                eprintln!("(Use Ctrl+D or /exit to quit)");
            }
            Err(rustyline::error::ReadlineError::Eof) => break,
            Err(e) => {
                eprintln!("\x1B[31mreadline error: {e}\x1B[0m");
                break;
            }
        }
    }

    if let Some(path) = &history_path {
        rl.save_history(path).ok();
    }
    eprintln!("Goodbye!");
    Ok(())
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Slash command handling
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Process a slash command. Returns `true` if the REPL should exit.
fn handle_slash_command(
    input: &str,
    store: &MemoryStore,
    cache: &SessionCache,
) -> anyhow::Result<bool> {
    let mut parts = input.splitn(2, ' ');
    let cmd = parts.next().unwrap_or_default();
    let arg = parts.next().map(str::trim);

    match cmd {
        "/exit" | "/quit" => return Ok(true),

        "/pending" => {
            let pending = store.pending_actions(Utc::now())?;
            if pending.is_empty() {
                eprintln!("No changes are waiting for confirmation.");
            } else {
                eprintln!("{}", pending_actions_reply(&pending));
            }
        }

        "/history" => {
            let page = arg.and_then(|a| a.parse().ok()).unwrap_or(1);
            let history = store.history_page(page, 10)?;
            for msg in &history.messages {
                eprintln!(
                    "[{}] {}: {}",
                    msg.timestamp.format("%Y-%m-%d %H:%M"),
                    msg.role.as_str(),
                    msg.content
                );
            }
            eprintln!(
                "(page {} of {} messages{})",
                history.page,
                history.total,
                if history.has_more { ", more with /history <n>" } else { "" }
            );
        }

        "/reset" => {
            cache.clear();
            eprintln!("Session cache cleared.");
        }

        "/clear" => {
            eprint!("\x1B[2J\x1B[1;1H");
        }

        "/help" => {
            eprintln!("Commands:");
            eprintln!("  /pending         List changes awaiting confirmation");
            eprintln!("  /history [n]     Show a page of conversation history");
            eprintln!("  /reset           Clear cached summaries and cooldowns");
            eprintln!("  /clear           Clear the screen");
            eprintln!("  /exit, /quit     Exit the chat");
            eprintln!("  /help            Show this help");
        }

        other => {
            eprintln!("Unknown command: {other}  (type /help for a list)");
        }
    }

    Ok(false)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Message sending + event streaming
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

async fn send_message(
    runtime: &ChatRuntime,
    store: &MemoryStore,
    cache: &SessionCache,
    text: &str,
) -> anyhow::Result<()> {
    let (tx, rx) = mpsc::channel(64);
    let printer = tokio::spawn(print_events(rx));

    let result = runtime
        .send_message(store, cache, TurnInput::text(text).with_events(tx))
        .await;
    printer.await.ok();

    let outcome = result?;
    if !outcome.citations.is_empty() {
        let labels: Vec<&str> = outcome.citations.iter().map(|c| c.label.as_str()).collect();
        eprintln!("\x1B[2msources: {}\x1B[0m", labels.join("; "));
    }
    eprintln!();
    Ok(())
}

/// Render turn events on the terminal. A retract erases the lines printed
/// since the last one.
pub(crate) async fn print_events(mut rx: mpsc::Receiver<TurnEvent>) {
    let mut lines = 0;
    while let Some(event) = rx.recv().await {
        match &event {
            TurnEvent::AssistantDelta { text } => {
                lines += text.matches('\n').count();
                print!("{text}");
                std::io::stdout().flush().ok();
            }
            TurnEvent::Retract => {
                if lines > 0 {
                    print!("\x1B[{lines}F\x1B[0J");
                } else {
                    print!("\r\x1B[0J");
                }
                std::io::stdout().flush().ok();
                lines = 0;
            }
            TurnEvent::ToolCall { name, .. } => {
                eprintln!("\x1B[2m[tool: {name}]\x1B[0m");
            }
            TurnEvent::ToolResult { name, is_error: true } => {
                eprintln!("\x1B[2m[tool failed: {name}]\x1B[0m");
            }
            TurnEvent::Final { .. } => {
                println!();
                lines = 0;
            }
            _ => {}
        }
    }
}
