// src/cli/mod.rs — CLI definition (clap derive)

pub mod history;
pub mod presets;
pub mod progress;
pub mod run;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "muse",
    about = "Fan one prompt out to many models, then let a judge rank the answers",
    version
)]
pub struct Cli {
    /// Config file path
    #[arg(long, global = true)]
    pub config: Option<String>,

    /// Verbose logging (debug level)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a brainstorm
    Run(RunArgs),
    /// Manage saved presets
    Presets {
        #[command(subcommand)]
        action: PresetAction,
    },
    /// Browse past brainstorms
    History {
        #[command(subcommand)]
        action: HistoryAction,
    },
}

#[derive(Args, Clone, Debug, Default)]
pub struct RunArgs {
    /// Prompt text (joined with spaces)
    #[arg(trailing_var_arg = true)]
    pub prompt: Vec<String>,

    /// Read the prompt from stdin
    #[arg(long)]
    pub stdin: bool,

    /// Start from a named preset
    #[arg(short, long)]
    pub preset: Option<String>,

    #[command(flatten)]
    pub groups: GroupArgs,

    /// Skip the evaluation pass
    #[arg(long)]
    pub no_judge: bool,

    /// Do not record this run in history
    #[arg(long)]
    pub no_history: bool,

    /// Suppress progress output (only emit results)
    #[arg(short, long)]
    pub quiet: bool,
}

/// Run-group and judge selection shared by `run` and `presets save`.
#[derive(Args, Clone, Debug, Default)]
pub struct GroupArgs {
    /// Run group as provider/model[:runs]; repeatable
    #[arg(short, long = "group", value_name = "SPEC")]
    pub groups: Vec<String>,

    /// Judge model as provider/model
    #[arg(long, value_name = "PROVIDER/MODEL")]
    pub judge: Option<String>,

    /// Instruction given to the judge
    #[arg(long, value_name = "TEXT")]
    pub judge_prompt: Option<String>,
}

#[derive(Subcommand, Clone, Debug)]
pub enum PresetAction {
    /// List built-in and saved presets
    List,
    /// Print a preset as JSON
    Show { name: String },
    /// Save run groups and judge as a named preset
    Save {
        name: String,
        #[command(flatten)]
        groups: GroupArgs,
    },
    /// Delete a saved preset
    Delete { name: String },
}

#[derive(Subcommand, Clone, Debug)]
pub enum HistoryAction {
    /// List past brainstorms, newest first
    List {
        #[arg(short = 'n', long, default_value = "20")]
        limit: usize,
    },
    /// Print one past brainstorm in full
    Show {
        /// Record id, or a prefix of it
        id: String,
    },
}
