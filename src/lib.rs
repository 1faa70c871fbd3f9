#[macro_use]
extern crate log;

#[cfg(test)]
#[macro_use]
extern crate engine_test;

use crate::auth::{AuthSequencer, LoginHistoryRecorder};
use crate::credentials::CredentialStore;
use crate::engine::ElectionEngine;
use crate::error::Result;
use crate::model::{session::Session, store::Store};

pub use crate::config::Config;

pub mod auth;
pub mod config;
pub mod credentials;
pub mod engine;
pub mod error;
pub mod logging;
pub mod model;

#[cfg(test)]
mod testing;

/// The store and every service built on it, wired together.
#[derive(Clone)]
pub struct App {
    config: Config,
    store: Store,
    credentials: CredentialStore,
    auth: AuthSequencer,
    engine: ElectionEngine,
}

impl App {
    /// Open the configured store (in memory if none is configured) and make
    /// sure the administrator account exists.
    pub fn new(config: Config) -> Result<Self> {
        let store = match config.store_path() {
            Some(path) => Store::open(path)?,
            None => {
                warn!("No store path configured, nothing will be saved");
                Store::in_memory()
            }
        };
        Self::with_store(config, store)
    }

    pub fn with_store(config: Config, store: Store) -> Result<Self> {
        let credentials = CredentialStore::new(&store, &config);
        credentials.ensure_admin_exists(&config)?;
        let auth = AuthSequencer::new(credentials.clone(), &config)
            .with_sink(LoginHistoryRecorder::new(&store));
        let engine = ElectionEngine::new(&store, &config);
        Ok(Self {
            config,
            store,
            credentials,
            auth,
            engine,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn credentials(&self) -> &CredentialStore {
        &self.credentials
    }

    pub fn auth(&self) -> &AuthSequencer {
        &self.auth
    }

    pub fn engine(&self) -> &ElectionEngine {
        &self.engine
    }

    /// The session saved by the last run, if its user is still valid.
    pub fn restore_session(&self) -> Result<Session> {
        Session::restore(&self.store)
    }

    pub fn save_session(&self, session: &Session) -> Result<()> {
        session.save(&self.store)
    }
}
