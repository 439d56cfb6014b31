//! Statpipe Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared error handling and logging setup for the statpipe workspace.
//!
//! - **Error Handling**: [`StatpipeError`] and the [`Result`] alias
//! - **Logging**: tracing subscriber configuration in [`logging`]
//!
//! # Example
//!
//! ```no_run
//! use statpipe_common::logging::{init_logging, LogConfig};
//!
//! fn main() -> anyhow::Result<()> {
//!     init_logging(&LogConfig::from_env()?)?;
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod logging;

// Re-export commonly used types
pub use error::{Result, StatpipeError};
