//! Application wiring

pub mod run;
pub mod settings;
