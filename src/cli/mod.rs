//! CLI module for repominer - command-line interface and subcommands.

pub mod commands;

pub use commands::Cli;
