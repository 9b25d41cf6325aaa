pub mod app;
pub mod args;
pub mod commands;

pub use app::{Cli, Commands};
