//! Shared error model, configuration, and logging for hutchns.
//!
//! This crate is the foundation depended on by the other hutchns crates.
//! It provides:
//! - [`NamespaceError`]: the unified error type
//! - Configuration ([`AppConfig`], config loading)
//! - Logging setup and console-level control ([`setup_logging`], [`debug_mode`])

pub mod config;
pub mod error;
pub mod logging;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, ClassNamespaceConfig, LoggingConfig, MetadataNamespaceConfig, NamespacesConfig,
    config_dir, config_file_path, init_config, init_config_in, load_config, load_config_from,
};
pub use error::{NamespaceError, Result};
pub use logging::{
    ConsoleControl, DebugGuard, LogFormat, LogOptions, console_level, debug_context, debug_mode,
    debug_wrapper, parse_level, prepare_log_file, set_console_level, setup_logging,
};
