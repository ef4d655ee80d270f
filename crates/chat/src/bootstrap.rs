//! Wire a [`ChatRuntime`] from config: Gemini client, demo tools and the
//! conversation store.

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use chrono::Utc;

use sb_domain::config::{Config, ConfigSeverity};
use sb_providers::GoogleProvider;
use sb_sessions::MemoryStore;
use sb_tools::demo::{demo_registry, DemoData, DemoMutationExecutor};

use crate::turn::ChatRuntime;

/// Refuse to start on config errors; warnings are logged.
pub fn check_config(config: &Config) -> anyhow::Result<()> {
    let issues = config.validate();
    for issue in issues.iter().filter(|i| i.severity == ConfigSeverity::Warning) {
        tracing::warn!(field = %issue.field, "{}", issue.message);
    }
    let errors: Vec<String> = issues
        .iter()
        .filter(|i| i.severity == ConfigSeverity::Error)
        .map(|i| i.to_string())
        .collect();
    if !errors.is_empty() {
        anyhow::bail!("invalid configuration:\n{}", errors.join("\n"));
    }
    Ok(())
}

pub fn build_runtime(config: Arc<Config>) -> anyhow::Result<ChatRuntime> {
    check_config(&config)?;

    let provider = GoogleProvider::from_config(&config.llm).context("creating Gemini client")?;
    let summarizer = config
        .llm
        .summarizer_model
        .as_deref()
        .map(|model| provider.with_model(model));

    let data = Arc::new(DemoData::seeded(Utc::now()));
    let mut runtime = ChatRuntime::new(
        Arc::new(provider),
        demo_registry(data.clone()),
        Arc::new(DemoMutationExecutor::new(data)),
        config,
    );
    if let Some(summarizer) = summarizer {
        runtime = runtime.with_summarizer(Arc::new(summarizer));
    }

    tracing::info!("chat runtime ready");
    Ok(runtime)
}

/// Open the conversation store under `dir`, or an in-memory one.
pub fn open_store(dir: Option<&Path>) -> anyhow::Result<MemoryStore> {
    match dir {
        Some(dir) => MemoryStore::open(dir)
            .with_context(|| format!("opening conversation store at {}", dir.display())),
        None => Ok(MemoryStore::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_config_is_rejected() {
        let mut config = Config::default();
        config.chat.max_function_rounds = 0;
        let err = check_config(&config).unwrap_err();
        assert!(err.to_string().contains("chat.max_function_rounds"));
    }

    #[test]
    fn opens_file_backed_and_in_memory_stores() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(Some(dir.path())).unwrap();
        assert_eq!(store.message_count(), 0);
        assert!(open_store(None).is_ok());
    }
}
