//! Bot runtime
//!
//! - `config`: configuration structures
//! - `loader`: layered loading from embedded defaults, files, and environment
//! - `init`: startup and the run loop
//! - `shutdown`: signal handling

pub mod config;
mod init;
mod loader;
mod shutdown;

pub use init::run;
pub use loader::{load_config, DEFAULT_CONFIG};
