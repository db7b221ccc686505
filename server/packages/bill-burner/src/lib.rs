//! Bill Burner client library and proxy server.

pub mod achievement;
pub mod api_client;
pub mod auth;
pub mod burn_plan;
pub mod cli;
pub mod config;
pub mod jwt;
pub mod recent;
pub mod router;
pub mod session;
pub mod storage;
pub mod telemetry;
