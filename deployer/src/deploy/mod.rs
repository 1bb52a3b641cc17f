//! Deployment module

pub mod confirm;
pub mod drift;
pub mod environment;
pub mod fsm;
pub mod options;
pub mod orchestrator;
