//! Wire models for the hosting platform REST API.

pub mod models;

pub use models::*;
