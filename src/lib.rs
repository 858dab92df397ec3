//! LoudML worker: job-execution core.

pub mod config;
pub mod datasource;
pub mod error;
pub mod model;
pub mod store;
pub mod worker;
