//! Dockwatch Core - Foundation crate for the dockwatch scan-control service
//!
//! This crate provides functionality shared by the server, the orchestrator and
//! the command-line client:
//!
//! # Modules
//!
//! - [`config`]: Strongly-typed configuration with TOML and environment variable support
//! - [`logging`]: Structured logging with tracing
//!
//! # Configuration
//!
//! Load configuration from files and environment:
//!
//! ```rust,ignore
//! use dockwatch_core::Config;
//!
//! let config = Config::load()?;
//! ```
//!
//! Environment variables use the `DOCKWATCH__` prefix with double underscore separators:
//!
//! ```bash
//! DOCKWATCH__SERVER__PORT=5000
//! DOCKWATCH__RUNTIME_ANALYSIS__ENABLED=true
//! ```
//!
//! # Logging
//!
//! ```rust,ignore
//! use dockwatch_core::init_tracing;
//!
//! init_tracing(&config.logging)?;
//! ```

pub mod config;
pub mod logging;

pub use config::Config;
pub use logging::init_tracing;
