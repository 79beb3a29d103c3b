// src/brainstorm/history.rs — Persisted record of finished brainstorms

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::group::{RunGroup, RunResult};
use super::judge::JudgeSettings;
use super::orchestrator::BrainstormOutcome;
use crate::infra::errors::BrainstormError;

const FILE_PREFIX: &str = "history_";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub prompt: String,
    pub run_groups: Vec<RunGroup>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub judge: Option<JudgeSettings>,
    pub results: Vec<RunResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub judge_response: Option<String>,
    #[serde(default)]
    pub failed: usize,
    #[serde(default)]
    pub cancelled: bool,
}

impl HistoryRecord {
    pub fn new(prompt: impl Into<String>, run_groups: Vec<RunGroup>, outcome: &BrainstormOutcome) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            prompt: prompt.into(),
            run_groups,
            judge: None,
            results: outcome.results.clone(),
            judge_response: None,
            failed: outcome.failed,
            cancelled: outcome.cancelled,
        }
    }

    pub fn with_judgment(mut self, judge: JudgeSettings, response: impl Into<String>) -> Self {
        self.judge = Some(judge);
        self.judge_response = Some(response.into());
        self
    }

    /// `history_<unix-ts>_<first 8 chars of id>.json`
    pub fn file_name(&self) -> String {
        let short: String = self.id.chars().filter(|c| *c != '-').take(8).collect();
        format!("{FILE_PREFIX}{}_{short}.json", self.timestamp.timestamp())
    }
}

pub struct HistoryStore {
    dir: PathBuf,
}

impl HistoryStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn save(&self, record: &HistoryRecord) -> Result<PathBuf, BrainstormError> {
        std::fs::create_dir_all(&self.dir)?;
        let path = self.dir.join(record.file_name());
        std::fs::write(&path, serde_json::to_string_pretty(record)?)?;
        tracing::debug!(path = %path.display(), results = record.results.len(), "Saved history");
        Ok(path)
    }

    pub fn load(path: &Path) -> Result<HistoryRecord, BrainstormError> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Stored records, newest first. Unreadable files are skipped.
    pub fn list(&self) -> Result<Vec<HistoryRecord>, BrainstormError> {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut records: Vec<HistoryRecord> = entries
            .flatten()
            .map(|e| e.path())
            .filter(|p| {
                p.extension().and_then(|e| e.to_str()) == Some("json")
                    && p.file_name()
                        .and_then(|n| n.to_str())
                        .is_some_and(|n| n.starts_with(FILE_PREFIX))
            })
            .filter_map(|p| match Self::load(&p) {
                Ok(record) => Some(record),
                Err(e) => {
                    tracing::warn!(path = %p.display(), "Skipping unreadable history entry: {e}");
                    None
                }
            })
            .collect();

        records.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_name_shape() {
        let record = HistoryRecord::new("p", vec![], &BrainstormOutcome::default());
        let name = record.file_name();
        assert!(name.starts_with("history_"));
        assert!(name.ends_with(".json"));
        let stem = name.trim_end_matches(".json");
        let short = stem.rsplit('_').next().unwrap();
        assert_eq!(short.len(), 8);
    }

    #[test]
    fn test_record_copies_outcome() {
        let outcome = BrainstormOutcome {
            results: vec![RunResult {
                provider: "OpenAI".into(),
                model: "gpt-4".into(),
                response: "idea".into(),
            }],
            total: 2,
            failed: 1,
            ..Default::default()
        };
        let record = HistoryRecord::new("p", vec![RunGroup::new("OpenAI", "gpt-4")], &outcome)
            .with_judgment(JudgeSettings::new("OpenAI", "gpt-4"), "good");
        assert_eq!(record.results.len(), 1);
        assert_eq!(record.failed, 1);
        assert_eq!(record.judge_response.as_deref(), Some("good"));
    }
}
