//! Database connection management
//!
//! Resolves the configured URL to a store handle. The in-process
//! [`MemoryStore`] is selected by the `mem://` (or `memory://`) scheme; the
//! path component, when present, names the database.

use tracing::{info, warn};

use crate::config::DatabaseConfig;
use crate::error::{sanitize_url, Error, Result};
use crate::store::MemoryStore;

const MEMORY_SCHEMES: [&str; 2] = ["mem", "memory"];

/// Connect to the configured database
///
/// ```rust
/// use docrepo::config::DatabaseConfig;
///
/// let config = DatabaseConfig { url: "mem://shop".into(), name: "app".into() };
/// let store = docrepo::database::connect(&config).unwrap();
/// assert_eq!(store.name(), "shop");
/// ```
pub fn connect(config: &DatabaseConfig) -> Result<MemoryStore> {
    let safe_url = sanitize_url(&config.url);
    let Some((scheme, rest)) = config.url.split_once("://") else {
        return Err(Error::UnsupportedBackend {
            scheme: String::new(),
            url: safe_url,
        });
    };
    if !MEMORY_SCHEMES.contains(&scheme.to_ascii_lowercase().as_str()) {
        warn!(url = %safe_url, "Unsupported database backend");
        return Err(Error::UnsupportedBackend {
            scheme: scheme.to_string(),
            url: safe_url,
        });
    }

    let name = database_name(rest).unwrap_or(&config.name);
    let store = MemoryStore::new(name);
    info!(url = %safe_url, database = %store.name(), "Successfully connected to database");
    Ok(store)
}

/// Close the store; later operations fail with a connection error
pub fn disconnect(store: &MemoryStore) {
    store.close();
    info!(database = %store.name(), "Database connection closed");
}

/// Database name from the part of the URL after `scheme://`
fn database_name(rest: &str) -> Option<&str> {
    let without_query = rest.split('?').next().unwrap_or(rest);
    let without_credentials = without_query
        .rsplit_once('@')
        .map_or(without_query, |(_, host)| host);
    let name = match without_credentials.split_once('/') {
        Some((_, path)) => path,
        None => without_credentials,
    };
    let name = name.trim_matches('/');
    (!name.is_empty()).then_some(name)
}
