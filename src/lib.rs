pub mod assembler;
pub mod clients;
pub mod config;
pub mod error;
pub mod json_utils;
pub mod models;
pub mod orchestrator;
pub mod output;
pub mod phases;
pub mod pipeline;
pub mod slug;

pub use config::Config;
pub use error::{DocforgeError, Result};
pub use models::{DocKind, Leaf, Part, Plan};
pub use pipeline::{Pipeline, RunSummary};
