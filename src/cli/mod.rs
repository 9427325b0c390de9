//! CLI module for selfcal - command-line interface and subcommands.
//!
//! Provides the main entry point with subcommands for running a
//! self-calibration, previewing a plan and inspecting its artifacts.

pub mod commands;

pub use commands::Cli;
