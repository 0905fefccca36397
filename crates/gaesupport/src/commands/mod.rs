//! CLI command handlers and the service wiring they share.

pub mod gc;
pub mod serve;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;

use gaesupport_config::{DatastoreConfig, GaeSupportConfig, LoadedConfig};
use gaesupport_session::{
    DatastoreClient, MemcacheClient, SessionStoreConfig, SharedCache, SharedEntityStore,
};
use gaesupport_types::{
    AppIdentity, MetadataTokenProvider, SharedTokenProvider, StaticTokenProvider,
};

/// Shared context for all commands.
#[derive(Debug, Clone)]
pub struct Context {
    /// Explicit config file, bypassing discovery.
    pub config_path: Option<PathBuf>,
    /// Verbose output enabled.
    pub verbose: bool,
}

/// Load configuration from `--config` or by discovery, then report what was
/// loaded.
pub fn load_config(ctx: &Context) -> Result<GaeSupportConfig> {
    let loaded = match ctx.config_path {
        Some(ref path) => {
            let mut config = gaesupport_config::load_config_file(path)?;
            config.apply_env(|key| std::env::var(key).ok().filter(|v| !v.is_empty()));
            LoadedConfig {
                config,
                sources: vec![gaesupport_config::ConfigSource {
                    path: path.clone(),
                    loaded: true,
                }],
                warnings: Vec::new(),
            }
        }
        None => gaesupport_config::load_config(None)?,
    };

    for warning in &loaded.warnings {
        eprintln!("warning: {}", warning);
    }

    if ctx.verbose {
        let sources = loaded.loaded_from();
        if sources.is_empty() {
            println!("No config files found, using defaults + environment");
        } else {
            for source in sources {
                println!("Loaded config: {}", source.display());
            }
        }
    }

    Ok(loaded.config)
}

/// Backing services of the session store.
pub struct SessionServices {
    pub identity: AppIdentity,
    pub cache: SharedCache,
    pub store: SharedEntityStore,
    pub session: SessionStoreConfig,
    pub tokens: SharedTokenProvider,
}

impl SessionServices {
    /// Build the memcached and datastore clients described by `config`.
    ///
    /// Connections are opened lazily on first use.
    pub fn from_config(config: &GaeSupportConfig) -> Self {
        let identity = config.identity();
        let cache_cfg = config.cache();
        let datastore_cfg = config.datastore();

        let tokens = token_provider(&datastore_cfg);
        let project_id = datastore_cfg
            .project_id
            .clone()
            .unwrap_or_else(|| identity.project_id().to_string());

        let store = match datastore_cfg.emulator_host {
            Some(ref host) => {
                tracing::info!(host = %host, project_id = %project_id, "Using datastore emulator");
                DatastoreClient::emulator(host, project_id)
            }
            None => DatastoreClient::new(project_id, Arc::clone(&tokens)),
        };

        let session = SessionStoreConfig::from_session_config(&identity, &config.session());

        Self {
            cache: Arc::new(MemcacheClient::connect(&cache_cfg.host, cache_cfg.port)),
            store: Arc::new(store),
            session,
            tokens,
            identity,
        }
    }
}

/// Static token when configured, the metadata server otherwise.
fn token_provider(config: &DatastoreConfig) -> SharedTokenProvider {
    match config.access_token {
        Some(ref token) => Arc::new(StaticTokenProvider::new(token.clone())),
        None => Arc::new(MetadataTokenProvider::new()),
    }
}
