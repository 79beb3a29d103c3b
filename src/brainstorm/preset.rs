// src/brainstorm/preset.rs — Named run-group configurations
//
// Built-in presets ship with the binary; user presets live as one pretty
// JSON file per preset under the presets directory, named by slug.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::group::RunGroup;
use super::judge::{JudgeSettings, DEFAULT_JUDGE_PROMPT};
use crate::infra::errors::BrainstormError;

pub const BUILTIN_PRESETS: [&str; 3] = ["Quick Comparison", "Thorough Analysis", "Budget Conscious"];

/// Minimum Jaro-Winkler score for a "did you mean" suggestion.
const SUGGESTION_THRESHOLD: f64 = 0.7;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Preset {
    pub name: String,
    pub run_groups: Vec<RunGroup>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub judge: Option<JudgeSettings>,
    #[serde(skip)]
    pub builtin: bool,
}

impl Preset {
    pub fn new(name: impl Into<String>, run_groups: Vec<RunGroup>) -> Self {
        Self {
            name: name.into(),
            run_groups,
            judge: None,
            builtin: false,
        }
    }

    pub fn with_judge(mut self, judge: JudgeSettings) -> Self {
        self.judge = Some(judge);
        self
    }

    /// Look up a built-in preset by exact (case-insensitive) name.
    pub fn builtin(name: &str) -> Option<Self> {
        let group = |provider: &str, model: &str, runs: u32, delay: f64, max: usize, tokens: u32| {
            RunGroup::new(provider, model)
                .with_runs(runs)
                .with_delay(delay)
                .with_max_concurrent(max)
                .with_max_tokens(tokens)
        };
        let judge = |provider: &str, model: &str| {
            JudgeSettings::new(provider, model).with_prompt(DEFAULT_JUDGE_PROMPT)
        };

        let preset = match name.to_lowercase().as_str() {
            "quick comparison" => Self::new(
                "Quick Comparison",
                vec![
                    group("OpenAI", "gpt-3.5-turbo", 1, 1.0, 5, 1024),
                    group("Anthropic", "claude-3-haiku-20240307", 1, 1.0, 5, 1024),
                    group("Ollama", "llama2", 1, 1.0, 1, 1024),
                ],
            )
            .with_judge(judge("OpenAI", "gpt-4")),
            "thorough analysis" => Self::new(
                "Thorough Analysis",
                vec![
                    group("OpenAI", "gpt-4", 5, 2.0, 5, 2048),
                    group("Anthropic", "claude-3-sonnet-20240229", 5, 2.0, 5, 2048),
                    group("OpenRouter", "mistralai/mistral-7b-instruct", 5, 2.0, 5, 2048),
                ],
            )
            .with_judge(judge("OpenAI", "gpt-4")),
            "budget conscious" => Self::new(
                "Budget Conscious",
                vec![
                    group("Ollama", "llama2", 3, 1.0, 1, 1024),
                    group("LMStudio", "local-model", 3, 1.0, 1, 1024),
                ],
            )
            .with_judge(judge("Ollama", "llama2")),
            _ => return None,
        };
        Some(Self {
            builtin: true,
            ..preset
        })
    }

    pub fn is_builtin_name(name: &str) -> bool {
        BUILTIN_PRESETS.iter().any(|b| b.eq_ignore_ascii_case(name))
    }
}

/// File-backed preset storage.
pub struct PresetStore {
    dir: PathBuf,
}

impl PresetStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{}.json", slug::slugify(name)))
    }

    /// All preset names: built-ins first, then saved presets sorted by name.
    pub fn list(&self) -> Result<Vec<String>, BrainstormError> {
        let mut names: Vec<String> = BUILTIN_PRESETS.iter().map(|s| s.to_string()).collect();
        let mut saved: Vec<String> = self
            .load_saved()?
            .into_iter()
            .map(|p| p.name)
            .filter(|n| !Preset::is_builtin_name(n))
            .collect();
        saved.sort_by_key(|n| n.to_lowercase());
        names.extend(saved);
        Ok(names)
    }

    /// Resolve `name` against built-ins, then saved files.
    pub fn load(&self, name: &str) -> Result<Preset, BrainstormError> {
        if let Some(preset) = Preset::builtin(name) {
            return Ok(preset);
        }

        let path = self.path_for(name);
        if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            let preset: Preset = serde_json::from_str(&content)?;
            tracing::debug!(preset = %preset.name, path = %path.display(), "Loaded preset");
            return Ok(preset);
        }

        let known = self.list()?;
        Err(BrainstormError::PresetNotFound {
            name: name.to_string(),
            suggestion: closest_name(name, &known),
        })
    }

    /// Write `preset` to disk, replacing any preset with the same slug.
    /// Built-in names are reserved.
    pub fn save(&self, preset: &Preset) -> Result<PathBuf, BrainstormError> {
        if Preset::is_builtin_name(&preset.name) {
            return Err(BrainstormError::Config(format!(
                "'{}' is a built-in preset and cannot be overwritten",
                preset.name
            )));
        }
        if slug::slugify(&preset.name).is_empty() {
            return Err(BrainstormError::Config(
                "Preset name must contain a letter or digit".into(),
            ));
        }
        for (index, group) in preset.run_groups.iter().enumerate() {
            group.validate(index)?;
        }

        std::fs::create_dir_all(&self.dir)?;
        let path = self.path_for(&preset.name);
        std::fs::write(&path, serde_json::to_string_pretty(preset)?)?;
        tracing::info!(preset = %preset.name, path = %path.display(), "Saved preset");
        Ok(path)
    }

    pub fn delete(&self, name: &str) -> Result<(), BrainstormError> {
        if Preset::is_builtin_name(name) {
            return Err(BrainstormError::Config(format!(
                "'{name}' is a built-in preset and cannot be deleted"
            )));
        }
        let path = self.path_for(name);
        if !path.exists() {
            let known = self.list()?;
            return Err(BrainstormError::PresetNotFound {
                name: name.to_string(),
                suggestion: closest_name(name, &known),
            });
        }
        std::fs::remove_file(&path)?;
        tracing::info!(preset = name, "Deleted preset");
        Ok(())
    }

    fn load_saved(&self) -> Result<Vec<Preset>, BrainstormError> {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut presets = Vec::new();
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let parsed = std::fs::read_to_string(&path)
                .map_err(BrainstormError::from)
                .and_then(|c| serde_json::from_str::<Preset>(&c).map_err(BrainstormError::from));
            match parsed {
                Ok(preset) => presets.push(preset),
                Err(e) => tracing::warn!(path = %path.display(), "Skipping unreadable preset: {e}"),
            }
        }
        Ok(presets)
    }
}

/// Best fuzzy match for `name` among `candidates`, if any is close enough.
pub fn closest_name(name: &str, candidates: &[String]) -> Option<String> {
    let needle = name.to_lowercase();
    candidates
        .iter()
        .map(|c| (c, strsim::jaro_winkler(&c.to_lowercase(), &needle)))
        .filter(|(_, score)| *score > SUGGESTION_THRESHOLD)
        .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
        .map(|(c, _)| c.clone())
}
