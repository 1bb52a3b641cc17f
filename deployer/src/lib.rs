//! safe-deploy library
//!
//! Promotes code from `dev` to `test` to `live`, gated on configuration drift,
//! with optional backups, post-deploy maintenance and Slack notifications.

pub mod app;
pub mod deploy;
pub mod errors;
pub mod logs;
pub mod notify;
pub mod platform;
pub mod remote;
pub mod utils;
