pub mod ceremony;
pub mod config;
pub mod dialogue;
pub mod error;
pub mod failure;
pub mod io;
pub mod learning;
pub mod maintenance;
pub mod orchestrator;
pub mod paths;
pub mod relevance;
pub mod store;
pub mod trigger;
pub mod types;
pub mod vcs;
pub mod workflow;

pub use error::{CadenceError, Result};
