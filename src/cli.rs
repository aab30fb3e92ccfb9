mod plan;
mod rates;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub use self::{plan::plan, rates::rates};

#[derive(Parser)]
#[command(author, version, about, propagate_version = true)]
#[must_use]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Main command: run a planning cycle on the scenario, and print the plans.
    #[clap(name = "plan")]
    Plan(Box<PlanArgs>),

    /// Print the normalized rates, with the overrides applied.
    #[clap(name = "rates")]
    Rates(Box<InputArgs>),
}

#[derive(Parser)]
pub struct InputArgs {
    /// Planning cycle inputs in JSON: the rates, forecasts, and the battery state.
    #[clap(long, env = "SCENARIO_PATH")]
    pub scenario: PathBuf,

    /// Planner settings in TOML, the defaults are used when the file does not exist.
    #[clap(long, env = "SETTINGS_PATH", default_value = "settings.toml")]
    pub settings: PathBuf,
}

#[derive(Parser)]
pub struct PlanArgs {
    #[clap(flatten)]
    pub input: InputArgs,

    /// Write the schedule in JSON.
    #[clap(long, env = "OUTPUT_PATH")]
    pub output: Option<PathBuf>,

    /// Also print the battery forecast per slot.
    #[clap(long)]
    pub forecast: bool,
}
