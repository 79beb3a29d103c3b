// src/cli/run.rs — `muse run`: brainstorm, judge, record

use std::io::Read;
use std::sync::Arc;

use crate::brainstorm::history::{HistoryRecord, HistoryStore};
use crate::brainstorm::judge::{is_evaluation_error, Judge, JudgeSettings};
use crate::brainstorm::preset::PresetStore;
use crate::brainstorm::{BrainstormOutcome, Orchestrator, RunGroup, RunResult};
use crate::infra::config::Config;
use crate::infra::paths;
use crate::provider::registry::ProviderRegistry;
use crate::provider::{LlmClient, ModelRef};

use super::progress::{terminal_errors, terminal_progress};
use super::{GroupArgs, RunArgs};

/// Groups and judge for one brainstorm, after presets, flags and config
/// have been layered.
#[derive(Debug, Clone, PartialEq)]
pub struct BrainstormPlan {
    pub groups: Vec<RunGroup>,
    pub judge: Option<JudgeSettings>,
}

/// Parse `provider/model[:runs]`.
///
/// Only a digits-only suffix after the last ':' counts as a run count, so
/// model tags like `llama2:13b` pass through untouched.
pub fn parse_group_spec(spec: &str) -> anyhow::Result<RunGroup> {
    let (target, runs) = match spec.rsplit_once(':') {
        Some((head, tail)) if !tail.is_empty() && tail.chars().all(|c| c.is_ascii_digit()) => {
            (head, Some(tail.parse::<u32>()?))
        }
        _ => (spec, None),
    };

    let model_ref = ModelRef::parse(target).ok_or_else(|| {
        anyhow::anyhow!("Invalid group '{spec}': expected provider/model[:runs]")
    })?;

    let mut group = RunGroup::new(model_ref.provider, model_ref.model);
    if let Some(runs) = runs {
        group = group.with_runs(runs);
    }
    Ok(group)
}

/// Layer the plan: preset, then `--group`/`--judge` flags, then config
/// defaults for the judge.
pub fn resolve_plan(
    groups: &GroupArgs,
    preset: Option<&str>,
    no_judge: bool,
    store: &PresetStore,
    config: &Config,
) -> anyhow::Result<BrainstormPlan> {
    let mut plan = BrainstormPlan {
        groups: Vec::new(),
        judge: None,
    };

    if let Some(name) = preset {
        let preset = store.load(name)?;
        tracing::debug!(preset = %preset.name, groups = preset.run_groups.len(), "Using preset");
        plan.groups = preset.run_groups;
        plan.judge = preset.judge;
    }

    if !groups.groups.is_empty() {
        plan.groups = groups
            .groups
            .iter()
            .map(|s| parse_group_spec(s))
            .collect::<anyhow::Result<_>>()?;
    }

    if let Some(ref judge) = groups.judge {
        let model_ref = ModelRef::parse(judge)
            .ok_or_else(|| anyhow::anyhow!("Invalid judge '{judge}': expected provider/model"))?;
        plan.judge = Some(JudgeSettings::new(model_ref.provider, model_ref.model));
    } else if plan.judge.is_none() {
        if let (Some(provider), Some(model)) = (&config.judge.provider, &config.judge.model) {
            plan.judge = Some(JudgeSettings::new(provider.clone(), model.clone()));
        }
    }

    if let Some(ref mut judge) = plan.judge {
        if let Some(ref text) = groups.judge_prompt {
            judge.prompt = Some(text.clone());
        } else if judge.prompt.is_none() {
            judge.prompt = config.judge.prompt.clone();
        }
    }

    if no_judge {
        plan.judge = None;
    }

    if plan.groups.is_empty() {
        anyhow::bail!("No run groups: pass --group provider/model[:runs] or --preset NAME");
    }
    Ok(plan)
}

fn read_prompt(args: &RunArgs) -> anyhow::Result<String> {
    let prompt = if args.stdin {
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf)?;
        buf
    } else {
        args.prompt.join(" ")
    };
    if prompt.trim().is_empty() {
        anyhow::bail!("No prompt given. Pass it as arguments or use --stdin.");
    }
    Ok(prompt)
}

/// Render results for stdout, one block per response.
pub fn format_results(results: &[RunResult]) -> String {
    let mut out = String::new();
    for (i, r) in results.iter().enumerate() {
        out.push_str(&format!(
            "=== Response {} ({} - {}) ===\n{}\n\n",
            i + 1,
            r.provider,
            r.model,
            r.response.trim()
        ));
    }
    out
}

pub async fn run_brainstorm(args: &RunArgs, config: &Config) -> anyhow::Result<()> {
    let prompt = read_prompt(args)?;
    let store = PresetStore::new(paths::presets_dir());
    let plan = resolve_plan(
        &args.groups,
        args.preset.as_deref(),
        args.no_judge,
        &store,
        config,
    )?;

    let client: Arc<dyn LlmClient> = Arc::new(ProviderRegistry::from_config(config));
    let outcome = execute(&prompt, &plan, client.clone(), config, args.quiet).await?;

    print!("{}", format_results(&outcome.results));

    let mut judgment = None;
    if let Some(ref settings) = plan.judge {
        if outcome.cancelled {
            eprintln!("Skipping evaluation: run was cancelled.");
        } else if outcome.results.is_empty() {
            eprintln!("Skipping evaluation: no responses to judge.");
        } else {
            if !args.quiet {
                eprintln!("Evaluating with {}/{}...", settings.provider, settings.model);
            }
            let text = Judge::from_config(client, &config.judge)
                .evaluate(
                    &outcome.results,
                    &settings.provider,
                    &settings.model,
                    settings.prompt_text(),
                )
                .await;
            if is_evaluation_error(&text) {
                eprintln!("{text}");
            } else {
                println!("=== Evaluation ({}/{}) ===\n{}", settings.provider, settings.model, text.trim());
            }
            judgment = Some((settings.clone(), text));
        }
    }

    if !args.no_history {
        let mut record = HistoryRecord::new(&prompt, plan.groups.clone(), &outcome);
        if let Some((settings, text)) = judgment {
            record = record.with_judgment(settings, text);
        }
        match HistoryStore::new(paths::history_dir()).save(&record) {
            Ok(path) => tracing::debug!(path = %path.display(), "History recorded"),
            Err(e) => tracing::warn!("Could not write history: {e}"),
        }
    }

    if !args.quiet {
        eprintln!(
            "{}/{} run(s) succeeded, {} failed, {} retried",
            outcome.results.len(),
            outcome.total,
            outcome.failed,
            outcome.retries
        );
    }

    if outcome.results.is_empty() && outcome.failed > 0 {
        anyhow::bail!("All {} run(s) failed", outcome.total);
    }
    Ok(())
}

/// Drive the orchestrator with terminal observers and Ctrl-C cancellation.
async fn execute(
    prompt: &str,
    plan: &BrainstormPlan,
    client: Arc<dyn LlmClient>,
    config: &Config,
    quiet: bool,
) -> anyhow::Result<BrainstormOutcome> {
    let mut orchestrator = Orchestrator::new(client)
        .with_config(config.orchestrator.clone())
        .with_rate_limits(config.rate_limits.clone())
        .with_errors(terminal_errors());
    if !quiet {
        orchestrator = orchestrator.with_progress(terminal_progress());
    }

    let handle = orchestrator.cancel_handle();
    let watcher = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\nCancelling, waiting for in-flight requests...");
            handle.cancel();
        }
    });

    let outcome = orchestrator.run(prompt, &plan.groups).await;
    watcher.abort();
    Ok(outcome?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::brainstorm::preset::Preset;

    fn flags(groups: &[&str], judge: Option<&str>) -> GroupArgs {
        GroupArgs {
            groups: groups.iter().map(|s| s.to_string()).collect(),
            judge: judge.map(str::to_string),
            judge_prompt: None,
        }
    }

    #[test]
    fn test_parse_group_spec_with_runs() {
        let g = parse_group_spec("OpenAI/gpt-4:3").unwrap();
        assert_eq!(g.provider, "OpenAI");
        assert_eq!(g.model, "gpt-4");
        assert_eq!(g.runs, 3);
    }

    #[test]
    fn test_parse_group_spec_keeps_model_tags() {
        let g = parse_group_spec("Ollama/llama2:13b").unwrap();
        assert_eq!(g.model, "llama2:13b");
        assert_eq!(g.runs, 1);

        let g = parse_group_spec("OpenRouter/mistralai/mistral-7b-instruct:2").unwrap();
        assert_eq!(g.provider, "OpenRouter");
        assert_eq!(g.model, "mistralai/mistral-7b-instruct");
        assert_eq!(g.runs, 2);
    }

    #[test]
    fn test_parse_group_spec_rejects_missing_model() {
        assert!(parse_group_spec("gpt-4").is_err());
        assert!(parse_group_spec("OpenAI/").is_err());
    }

    #[test]
    fn test_resolve_plan_from_flags() {
        let dir = tempfile::tempdir().unwrap();
        let store = PresetStore::new(dir.path());
        let plan = resolve_plan(
            &flags(&["OpenAI/gpt-4:2", "Ollama/llama2"], Some("Anthropic/claude-3-haiku")),
            None,
            false,
            &store,
            &Config::default(),
        )
        .unwrap();
        assert_eq!(plan.groups.len(), 2);
        let judge = plan.judge.unwrap();
        assert_eq!(judge.provider, "Anthropic");
        assert!(judge.prompt.is_none());
    }

    #[test]
    fn test_resolve_plan_flags_override_preset_groups() {
        let dir = tempfile::tempdir().unwrap();
        let store = PresetStore::new(dir.path());
        let plan = resolve_plan(
            &flags(&["LMStudio/local-model"], None),
            Some("Quick Comparison"),
            false,
            &store,
            &Config::default(),
        )
        .unwrap();
        assert_eq!(plan.groups.len(), 1);
        // judge still comes from the preset
        assert_eq!(plan.judge.unwrap().model, "gpt-4");
    }

    #[test]
    fn test_resolve_plan_no_judge() {
        let dir = tempfile::tempdir().unwrap();
        let store = PresetStore::new(dir.path());
        let plan = resolve_plan(
            &flags(&[], None),
            Some("budget conscious"),
            true,
            &store,
            &Config::default(),
        )
        .unwrap();
        assert_eq!(plan.groups.len(), 2);
        assert!(plan.judge.is_none());
    }

    #[test]
    fn test_resolve_plan_judge_from_config() {
        let dir = tempfile::tempdir().unwrap();
        let store = PresetStore::new(dir.path());
        let mut config = Config::default();
        config.judge.provider = Some("Ollama".into());
        config.judge.model = Some("llama3".into());
        config.judge.prompt = Some("Pick the boldest idea.".into());

        let plan =
            resolve_plan(&flags(&["OpenAI/gpt-4"], None), None, false, &store, &config).unwrap();
        let judge = plan.judge.unwrap();
        assert_eq!(judge.model, "llama3");
        assert_eq!(judge.prompt_text(), "Pick the boldest idea.");
    }

    #[test]
    fn test_resolve_plan_saved_preset() {
        let dir = tempfile::tempdir().unwrap();
        let store = PresetStore::new(dir.path());
        store
            .save(&Preset::new("Night Shift", vec![RunGroup::new("Ollama", "mistral").with_runs(4)]))
            .unwrap();
        let plan = resolve_plan(&flags(&[], None), Some("night shift"), false, &store, &Config::default())
            .unwrap();
        assert_eq!(plan.groups[0].runs, 4);
        assert!(plan.judge.is_none());
    }

    #[test]
    fn test_resolve_plan_requires_groups() {
        let dir = tempfile::tempdir().unwrap();
        let store = PresetStore::new(dir.path());
        let err = resolve_plan(&flags(&[], None), None, false, &store, &Config::default())
            .unwrap_err();
        assert!(err.to_string().contains("--group"));
    }

    #[test]
    fn test_format_results_numbers_blocks() {
        let out = format_results(&[
            RunResult {
                provider: "OpenAI".into(),
                model: "gpt-4".into(),
                response: "  one  ".into(),
            },
            RunResult {
                provider: "Ollama".into(),
                model: "llama2".into(),
                response: "two".into(),
            },
        ]);
        assert!(out.starts_with("=== Response 1 (OpenAI - gpt-4) ===\none\n\n"));
        assert!(out.contains("=== Response 2 (Ollama - llama2) ===\ntwo\n"));
    }
}
