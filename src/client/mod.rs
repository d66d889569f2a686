//! Browsing client: local state, the API client and the outreach helpers.

pub mod api;
pub mod browse;
pub mod debounce;
pub mod export;
pub mod prompt;
pub mod state;
pub mod storage;

use std::sync::Arc;

use tracing::debug;

use crate::config::ClientConfig;
use crate::error::AppResult;

use self::state::ClientStore;
use self::storage::FileStorage;

/// Opens the on-disk local storage and hydrates a store from it.
pub fn open_store(config: &ClientConfig) -> AppResult<ClientStore> {
    let storage = FileStorage::open(&config.state_dir)?;
    debug!(path = %storage.path().display(), "opened local storage");
    let mut store = ClientStore::new(Arc::new(storage));
    store.hydrate();
    Ok(store)
}
