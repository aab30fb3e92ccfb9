use crate::{
    cli::InputArgs,
    planner::Planner,
    prelude::*,
    scenario::Scenario,
    settings::Settings,
    tables::build_rates_table,
};

#[instrument(skip_all)]
pub fn rates(args: &InputArgs) -> Result {
    let settings = Settings::read_from(&args.settings)?;
    let scenario = Scenario::read_from(&args.scenario)?;
    let timeline = Planner::builder().settings(&settings).scenario(&scenario).build().timeline()?;
    println!("{}", build_rates_table(&timeline));
    info!(extend_discharge_to = ?timeline.extend_discharge_to, "normalized");
    Ok(())
}
