//! `studybuddy run`: one turn, then exit. Useful for scripting.

use std::path::PathBuf;
use std::sync::Arc;

use serde_json::json;
use tokio::sync::mpsc;

use sb_domain::config::Config;

use crate::bootstrap;
use crate::cache::SessionCache;
use crate::turn::TurnInput;

pub async fn run(
    config: Arc<Config>,
    message: String,
    data_dir: Option<PathBuf>,
    json_output: bool,
) -> anyhow::Result<()> {
    let runtime = bootstrap::build_runtime(config)?;
    let store = bootstrap::open_store(data_dir.as_deref())?;
    let cache = SessionCache::new();

    if json_output {
        let outcome = runtime
            .send_message(&store, &cache, TurnInput::text(message))
            .await?;
        let out = json!({
            "reply": outcome.reply,
            "finish_reason": outcome.finish_reason,
            "usage": outcome.usage,
            "citations": outcome.citations,
            "assistant_message": outcome.assistant_message,
        });
        let rendered = serde_json::to_string_pretty(&out)
            .map_err(|e| anyhow::anyhow!("serializing outcome: {e}"))?;
        println!("{rendered}");
        return Ok(());
    }

    let (tx, rx) = mpsc::channel(64);
    let printer = tokio::spawn(super::chat::print_events(rx));

    let result = runtime
        .send_message(&store, &cache, TurnInput::text(message).with_events(tx))
        .await;
    printer.await.ok();
    result?;
    Ok(())
}
