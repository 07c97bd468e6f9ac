//! Config registry and listener bus
//!
//! Keyed store of `(code → value)` backed by the repository, with an
//! in-memory cache for fast reads. Components register listeners per code;
//! on update each listener runs on its own fire-and-forget task so a slow
//! or failing listener never blocks the others. Listeners are expected to
//! be idempotent.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde::de::DeserializeOwned;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::models::{default_value_for, KNOWN_CODES};
use crate::repository::ConfigRepository;
use crate::{Error, Result};

/// Change listener: receives the new raw value (None when the record
/// disappeared) and returns a future run on its own task.
pub type ConfigListener =
    Arc<dyn Fn(Option<String>) -> BoxFuture<'static, ()> + Send + Sync>;

/// Config registry
#[derive(Clone)]
pub struct ConfigRegistry {
    repository: ConfigRepository,
    cache: Arc<RwLock<HashMap<String, String>>>,
    listeners: Arc<RwLock<HashMap<String, Vec<ConfigListener>>>>,
}

impl std::fmt::Debug for ConfigRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigRegistry").finish_non_exhaustive()
    }
}

impl ConfigRegistry {
    #[must_use]
    pub fn new(repository: ConfigRepository) -> Self {
        Self {
            repository,
            cache: Arc::new(RwLock::new(HashMap::new())),
            listeners: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Load every record into the cache, seeding defaults for known codes
    /// that have no row yet.
    pub async fn initialize(&self) -> Result<()> {
        info!("Initializing config registry");

        for code in KNOWN_CODES {
            if let Some(value) = default_value_for(code) {
                self.repository.insert_if_absent(code, code, &value).await?;
            }
        }

        let entries = self.repository.get_all().await?;
        let mut cache = self.cache.write().await;
        cache.clear();
        for entry in entries {
            debug!("Loaded config '{}'", entry.code);
            cache.insert(entry.code, entry.value);
        }

        info!("Config registry initialized with {} records", cache.len());
        Ok(())
    }

    /// Raw value for a code
    pub async fn get_raw(&self, code: &str) -> Option<String> {
        self.cache.read().await.get(code).cloned()
    }

    /// Parsed value for a code
    pub async fn get_parsed<T: DeserializeOwned>(&self, code: &str) -> Result<T> {
        let raw = self
            .get_raw(code)
            .await
            .ok_or_else(|| Error::ConfigMissing(code.to_string()))?;
        serde_json::from_str(&raw)
            .map_err(|e| Error::ConfigMissing(format!("{code}: {e}")))
    }

    /// Persist a new value, refresh the cache, and notify listeners.
    pub async fn update(&self, code: &str, value: &str) -> Result<()> {
        // Reject values that are not JSON at all; the typed parse happens
        // in the owning component.
        serde_json::from_str::<serde_json::Value>(value)
            .map_err(|e| Error::InvalidInput(format!("config value must be JSON: {e}")))?;

        self.repository.update_value(code, value).await?;
        self.cache
            .write()
            .await
            .insert(code.to_string(), value.to_string());

        self.notify(code).await;
        info!("Updated config '{}'", code);
        Ok(())
    }

    /// Register a change listener for a code
    pub async fn register(&self, code: &str, listener: ConfigListener) {
        let mut listeners = self.listeners.write().await;
        listeners.entry(code.to_string()).or_default().push(listener);
        debug!("Registered config listener for '{}'", code);
    }

    /// Invoke every listener registered for a code, each on its own task.
    pub async fn notify(&self, code: &str) {
        let value = self.get_raw(code).await;
        let listeners = self.listeners.read().await;
        let Some(registered) = listeners.get(code) else {
            return;
        };

        debug!(
            "Notifying {} listeners of config change '{}'",
            registered.len(),
            code
        );
        for listener in registered {
            let listener = Arc::clone(listener);
            let value = value.clone();
            let code = code.to_string();
            tokio::spawn(async move {
                // Listener failures are their own to log; a panic here is
                // confined to this task.
                listener(value).await;
                debug!("Config listener for '{}' finished", code);
            });
        }
    }

    /// Fire every known code once, letting subscribers seed their state
    /// from the freshly loaded cache.
    pub async fn notify_all_known(&self) {
        for code in KNOWN_CODES {
            self.notify(code).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    // Listener plumbing is testable without a database by driving the
    // listener map directly.
    #[tokio::test]
    async fn test_listener_registration_shape() {
        let counter = Arc::new(AtomicUsize::new(0));
        let counter_clone = Arc::clone(&counter);
        let listener: ConfigListener = Arc::new(move |value| {
            let counter = Arc::clone(&counter_clone);
            Box::pin(async move {
                if value.is_some() {
                    counter.fetch_add(1, Ordering::SeqCst);
                }
            })
        });

        // Invoke the listener the way notify() does.
        listener(Some("{}".to_string())).await;
        listener(None).await;
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }
}
