//! Utility modules for the hot backup agent.

pub mod errors;
pub mod logger;

pub use errors::{AgentError, Result};
