pub mod config;
pub mod error;
pub mod types;

pub use config::ForceConfig;
pub use error::{ForceError, Result};
