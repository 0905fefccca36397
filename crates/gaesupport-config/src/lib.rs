//! Configuration system for gaesupport.
//!
//! Provides TOML-based configuration with:
//! - Application identity, cache, session, datastore, trace and server sections
//! - Config file layering (user config dir + project-local overrides)
//! - Ambient environment overrides (`APPLICATION_ID`, `CURRENT_MODULE_ID`,
//!   `MEMCACHE_HOST`, `MEMCACHE_PORT`, `SESSION_MAX_LIFETIME`,
//!   `DATASTORE_EMULATOR_HOST`)

pub mod discovery;
pub mod error;
pub mod types;

pub use discovery::{
    ConfigSource, LoadedConfig, load_config, load_config_file, load_config_with_options,
    save_config, user_config_dir, user_config_path,
};
pub use error::{ConfigError, Result};
pub use types::*;
