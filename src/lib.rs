//! `maz`: credential chains, subscription resolution and rendering for a small Azure command line

pub mod api;
pub mod auth;
pub mod cli;
pub mod context;
pub mod error;
pub mod render;
pub mod ui;

pub use error::{ContextError, ContextResult};
