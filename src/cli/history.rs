// src/cli/history.rs — `muse history` subcommands

use crate::brainstorm::history::{HistoryRecord, HistoryStore};
use crate::infra::paths;
use crate::util::preview;

use super::run::format_results;
use super::HistoryAction;

pub async fn run_history(action: &HistoryAction) -> anyhow::Result<()> {
    let store = HistoryStore::new(paths::history_dir());
    match action {
        HistoryAction::List { limit } => {
            let records = store.list()?;
            if records.is_empty() {
                println!("No brainstorms recorded yet.");
            }
            for record in records.iter().take(*limit) {
                println!("{}", summary_line(record));
            }
        }
        HistoryAction::Show { id } => {
            let record = store
                .list()?
                .into_iter()
                .find(|r| r.id.starts_with(id.as_str()))
                .ok_or_else(|| anyhow::anyhow!("No history entry with id '{id}'"))?;
            println!("Prompt: {}\n", record.prompt.trim());
            print!("{}", format_results(&record.results));
            if let (Some(judge), Some(text)) = (&record.judge, &record.judge_response) {
                println!("=== Evaluation ({}/{}) ===\n{}", judge.provider, judge.model, text.trim());
            }
        }
    }
    Ok(())
}

pub fn summary_line(record: &HistoryRecord) -> String {
    let mut flags = String::new();
    if record.cancelled {
        flags.push_str(" [cancelled]");
    }
    if record.judge_response.is_some() {
        flags.push_str(" [judged]");
    }
    format!(
        "{}  {}  {} result(s){}  {}",
        &record.id[..record.id.len().min(8)],
        record.timestamp.format("%Y-%m-%d %H:%M"),
        record.results.len(),
        flags,
        preview(&record.prompt, 60)
    )
}
