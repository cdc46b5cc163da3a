//! Terminal front end

pub mod cli;

pub use cli::{format_clock, Args, Cli, Command, PlayArgs};
