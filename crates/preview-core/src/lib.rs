pub mod config;
pub mod diff;
pub mod error;
pub mod io;
pub mod manifest;
pub mod materializer;
pub mod memory;
pub mod paths;
pub mod reaper;
pub mod reconciler;
pub mod registry;
pub mod reporter;
pub mod scheduler;
pub mod source;
pub mod status;
pub mod tag;
pub mod types;
pub mod updater;
pub mod values;

#[cfg(test)]
mod testutil;

pub use error::{ReconcileError, Result};
