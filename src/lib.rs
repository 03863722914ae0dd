//! # HP 4280A Lab Controller Library
//!
//! Drives an HP 4280A 1 MHz C meter / C-V plotter over GPIB and serves it to a lab
//! through a small JSON web API. The binary (`main.rs`) is a thin CLI over this library,
//! so sweeps can be run from the command line as well as from the browser.
//!
//! ## Crate Structure
//!
//! - **`adapters`**: The `InstrumentConnection` trait with the VISA (`instrument_visa`
//!   feature) and simulated implementations.
//! - **`instrument`**: The `Hp4280a` controller, its command vocabulary, parameter sets and
//!   block-response parser.
//! - **`data`**: CSV files of captured sweeps.
//! - **`database`**: SQLite users and measurement log through `sea-orm`.
//! - **`auth`**: bcrypt password hashes and JWT session tokens.
//! - **`session`**: Per-user controllers and form settings.
//! - **`server`**: The actix-web routes.
//! - **`config`**: Figment-based configuration (`config/hp4280a.toml` + `HP4280A_*` env).
//! - **`error`**: The `LabError` enum shared by every module.
//! - **`tracing_setup`**: Subscriber initialisation.
//! - **`validation`**: Input and configuration checks.

pub mod adapters;
pub mod auth;
pub mod config;
pub mod data;
pub mod database;
pub mod error;
pub mod instrument;
pub mod server;
pub mod session;
pub mod tracing_setup;
pub mod validation;
