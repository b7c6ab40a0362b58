//! Command-line front end for the system configuration engine

pub mod cli;

pub use cli::{run, Cli, ExitCode};
