//! infratest CLI
//!
//! Command-line interface for running staged infrastructure tests and
//! inspecting the deployment they leave behind.

pub mod commands;
pub mod output;
