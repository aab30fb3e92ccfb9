use comfy_table::{Attribute, Cell, CellAlignment, Color, Table, modifiers, presets};
use enumset::EnumSet;
use itertools::Itertools;

use crate::{
    core::{
        battery::BatteryForecast,
        interval::Interval,
        plans::{PlanKind, Plans},
        profile::{GridSummary, Summary},
        series::{MergeAdjacent, OverPeriod},
        timeline::Timeline,
    },
    quantity::{energy::KilowattHours, rate::KilowattHourRate},
};

fn new_table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL_CONDENSED)
        .apply_modifier(modifiers::UTF8_ROUND_CORNERS)
        .enforce_styling();
    table
}

fn mean_rate(rates: &[(Interval, KilowattHourRate)]) -> KilowattHourRate {
    if rates.is_empty() {
        KilowattHourRate::ZERO
    } else {
        #[allow(clippy::cast_precision_loss)]
        let n_rates = rates.len() as f64;
        rates.iter().map(|(_, rate)| *rate).sum::<KilowattHourRate>() / n_rates
    }
}

/// Merged runs of every plan, in chronological order.
pub fn build_plans_table(plans: &Plans) -> Table {
    let mut table = new_table();
    table.set_header(vec!["Date", "Start", "End", "Plan", "Energy"]);
    let runs = EnumSet::<PlanKind>::all()
        .iter()
        .flat_map(|kind| {
            plans.energy(kind).merge_adjacent().into_iter().map(move |(interval, energy)| (kind, interval, energy))
        })
        .sorted_by_key(|(_, interval, _)| interval.start);
    for (kind, interval, energy) in runs {
        table.add_row(vec![
            Cell::new(interval.start.format("%b %d")).add_attribute(Attribute::Dim),
            Cell::new(interval.start.format("%H:%M")),
            Cell::new(interval.end.format("%H:%M")).add_attribute(Attribute::Dim),
            Cell::new(kind).fg(kind.color()),
            Cell::new(energy).set_alignment(CellAlignment::Right),
        ]);
    }
    table
}

/// Battery level per slot, along with the rates and the plan in effect.
pub fn build_forecast_table(forecast: &BatteryForecast, timeline: &Timeline, plans: &Plans) -> Table {
    let mean_import_rate = mean_rate(&timeline.import_rates);
    let mean_export_rate = mean_rate(&timeline.export_rates);

    let mut table = new_table();
    table.set_header(vec!["Date", "Start", "End", "Import", "Export", "Plan", "Energy", "Level"]);
    for slot in &forecast.slots {
        let interval = slot.interval;
        let import_rate = timeline.import_rates.starting_at(interval.start);
        let export_rate = timeline.export_rates.starting_at(interval.start);
        let kind = [
            PlanKind::DischargeExportSolar,
            PlanKind::DischargeToGrid,
            PlanKind::Standby,
            PlanKind::GridCharge,
            PlanKind::HouseGrid,
            PlanKind::SolarCharge,
            PlanKind::DischargeToHouse,
        ]
        .into_iter()
        .find(|kind| plans.any_over(EnumSet::only(*kind), interval));

        table.add_row(vec![
            Cell::new(interval.start.format("%b %d")).add_attribute(Attribute::Dim),
            Cell::new(interval.start.format("%H:%M")),
            Cell::new(interval.end.format("%H:%M")).add_attribute(Attribute::Dim),
            import_rate.map_or_else(
                || Cell::new("-"),
                |rate| Cell::new(rate).fg(if rate >= mean_import_rate { Color::Red } else { Color::Green }),
            ),
            export_rate.map_or_else(
                || Cell::new("-"),
                |rate| Cell::new(rate).fg(if rate >= mean_export_rate { Color::Green } else { Color::Reset }),
            ),
            kind.map_or_else(|| Cell::new(""), |kind| Cell::new(kind).fg(kind.color())),
            Cell::new(slot.energy).set_alignment(CellAlignment::Right).fg(if slot.is_empty {
                Color::Red
            } else if slot.is_full {
                Color::Green
            } else {
                Color::Reset
            }),
            Cell::new(format!("{:.1}%", slot.percentage)).set_alignment(CellAlignment::Right),
        ]);
    }
    table
}

/// Normalized rates, highlighting the overridden ones.
pub fn build_rates_table(timeline: &Timeline) -> Table {
    let mut table = new_table();
    table.set_header(vec!["Date", "Start", "End", "Import", "Export", "Usage", "Surplus"]);
    for (interval, import_rate) in &timeline.import_rates {
        let original_import_rate = timeline.original_import_rates.starting_at(interval.start);
        let export_rate = timeline.export_rates.starting_at(interval.start);
        let original_export_rate = timeline.original_export_rates.starting_at(interval.start);
        let rate_cell = |rate: Option<KilowattHourRate>, original: Option<KilowattHourRate>| {
            rate.map_or_else(
                || Cell::new("-"),
                |rate| {
                    let cell = Cell::new(rate);
                    if Some(rate) == original { cell } else { cell.fg(Color::Magenta) }
                },
            )
        };
        let surplus = timeline.solar_surplus.over_period(*interval).median;
        table.add_row(vec![
            Cell::new(interval.start.format("%b %d")).add_attribute(Attribute::Dim),
            Cell::new(interval.start.format("%H:%M")),
            Cell::new(interval.end.format("%H:%M")).add_attribute(Attribute::Dim),
            rate_cell(Some(*import_rate), original_import_rate),
            rate_cell(export_rate, original_export_rate),
            Cell::new(timeline.usage.over_period(*interval)).set_alignment(CellAlignment::Right),
            Cell::new(surplus)
                .set_alignment(CellAlignment::Right)
                .fg(if surplus > KilowattHours::ZERO { Color::Yellow } else { Color::Reset }),
        ]);
    }
    table
}

pub fn build_summary_table(summary: &GridSummary) -> Table {
    let mut table = new_table();
    table.set_header(vec!["", "Energy", "Cost", "Rate"]);
    let row = |title: &str, summary: &Summary| {
        vec![
            Cell::new(title).add_attribute(Attribute::Bold),
            Cell::new(summary.energy).set_alignment(CellAlignment::Right),
            Cell::new(summary.cost).set_alignment(CellAlignment::Right),
            Cell::new(format!("{:.2} p/kWh", summary.rate)).set_alignment(CellAlignment::Right),
        ]
    };
    table.add_row(row("Import", &summary.import));
    table.add_row(row("Export", &summary.export));
    table.add_row(row("Net", &summary.net));
    table
}
