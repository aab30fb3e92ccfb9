pub mod allocator;
pub mod battery;
mod charge_plan;
pub mod discharge;
pub mod diverter;
pub mod estimate;
pub mod interval;
pub mod mode;
pub mod plans;
pub mod profile;
pub mod queue;
pub mod selector;
pub mod series;
pub mod state;
pub mod timeline;
