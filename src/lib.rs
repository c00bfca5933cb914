pub mod automation;
pub mod config;
pub mod error;
pub mod executor;
pub mod logger;
pub mod relay;

pub use error::{CyberpilotError, Result};
