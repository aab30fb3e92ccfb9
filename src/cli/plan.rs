use std::fs;

use crate::{
    cli::PlanArgs,
    planner::Planner,
    prelude::*,
    scenario::Scenario,
    settings::Settings,
    tables::{build_forecast_table, build_plans_table, build_summary_table},
};

#[instrument(skip_all)]
pub fn plan(args: &PlanArgs) -> Result {
    let settings = Settings::read_from(&args.input.settings)?;
    let scenario = Scenario::read_from(&args.input.scenario)?;
    let planner = Planner::builder().settings(&settings).scenario(&scenario).build();

    let schedule = planner.plan()?;
    println!("{}", build_plans_table(&schedule.plans));
    if args.forecast {
        let timeline = planner.timeline()?;
        println!("{}", build_forecast_table(&schedule.forecast, &timeline, &schedule.plans));
    }
    println!("{}", build_summary_table(&schedule.grid_summary));
    info!(
        battery_mode = %schedule.battery_mode,
        diverter_mode = %schedule.diverter_mode,
        summary = %schedule.summary,
        next_max_charge_cost = %schedule.next_max_charge_cost,
        "planned",
    );

    if let Some(output) = &args.output {
        fs::write(output, serde_json::to_string_pretty(&schedule)?)
            .with_context(|| format!("failed to write `{}`", output.display()))?;
        info!(?output, "written the schedule");
    }
    Ok(())
}
