// src/cli/presets.rs — `muse presets` subcommands

use crate::brainstorm::preset::{Preset, PresetStore};
use crate::infra::config::Config;
use crate::infra::paths;

use super::run::resolve_plan;
use super::PresetAction;

pub async fn run_presets(action: &PresetAction, config: &Config) -> anyhow::Result<()> {
    let store = PresetStore::new(paths::presets_dir());
    match action {
        PresetAction::List => {
            for line in list_lines(&store)? {
                println!("{line}");
            }
        }
        PresetAction::Show { name } => {
            let preset = store.load(name)?;
            println!("{}", serde_json::to_string_pretty(&preset)?);
        }
        PresetAction::Save { name, groups } => {
            let plan = resolve_plan(groups, None, false, &store, config)?;
            let mut preset = Preset::new(name.clone(), plan.groups);
            preset.judge = plan.judge;
            let path = store.save(&preset)?;
            println!("Saved preset '{name}' to {}", path.display());
        }
        PresetAction::Delete { name } => {
            store.delete(name)?;
            println!("Deleted preset '{name}'");
        }
    }
    Ok(())
}

/// One line per preset: name, origin, total runs and judge.
pub fn list_lines(store: &PresetStore) -> anyhow::Result<Vec<String>> {
    let mut lines = Vec::new();
    for name in store.list()? {
        let preset = match store.load(&name) {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!(preset = %name, "Skipping preset: {e}");
                continue;
            }
        };
        let runs: u32 = preset.run_groups.iter().map(|g| g.runs).sum();
        let judge = preset
            .judge
            .as_ref()
            .map(|j| format!("{}/{}", j.provider, j.model))
            .unwrap_or_else(|| "-".into());
        lines.push(format!(
            "{:<24} {:<8} {:>3} run(s)  judge: {judge}",
            preset.name,
            if preset.builtin { "built-in" } else { "saved" },
            runs
        ));
    }
    Ok(lines)
}
