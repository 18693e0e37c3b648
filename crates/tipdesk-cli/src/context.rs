use std::sync::Arc;

use anyhow::Result;
use tracing::{debug, warn};

use tipdesk_core::auth::{FileTokenStore, KeyringTokenStore, TokenStore};
use tipdesk_core::config::{TokenStorageKind, LOGIN_PATH};
use tipdesk_core::{ApiClient, ApiConfig, Config, MemoryNavigator, SessionStore};

/// Everything a command needs, wired the same way for every command.
pub struct Context {
    pub config: Config,
    pub session: SessionStore,
    pub navigator: Arc<MemoryNavigator>,
    pub client: ApiClient,
}

impl Context {
    /// Build the context with the user "on" `location`.
    pub fn new(location: &str) -> Result<Self> {
        let config = Config::load().unwrap_or_else(|e| {
            warn!(error = %e, "Failed to load config, using defaults");
            Config::default()
        });

        let storage: Arc<dyn TokenStore> = match config.token_storage {
            TokenStorageKind::File => Arc::new(FileTokenStore::new(Config::data_dir()?)),
            TokenStorageKind::Keyring => Arc::new(KeyringTokenStore::new()),
        };
        debug!(storage = ?config.token_storage, "Token storage configured");

        Self::with_storage(config, storage, location, ApiConfig::resolve())
    }

    /// Build the context from explicit parts.
    pub fn with_storage(
        config: Config,
        storage: Arc<dyn TokenStore>,
        location: &str,
        api_config: ApiConfig,
    ) -> Result<Self> {
        let session = SessionStore::new(storage);
        session.initialize();

        let navigator = Arc::new(MemoryNavigator::new(location));
        debug!(base_url = %api_config.base_url, "API configured");
        let client = ApiClient::new(api_config, Arc::new(session.clone()), navigator.clone())?;

        Ok(Self {
            config,
            session,
            navigator,
            client,
        })
    }

    /// Tell the user if the pipeline sent them back to the login screen.
    /// Returns true when that happened.
    pub fn report_redirects(&self) -> bool {
        let to_login = self
            .navigator
            .take_redirects()
            .iter()
            .any(|path| path == LOGIN_PATH);
        if to_login {
            eprintln!("Session expired. Run `tipdesk login` to sign in again.");
        }
        to_login
    }
}
