//! CLI module - report rendering for the command-line entry point

pub mod report;

pub use report::{render_report, save_report};
