// SPDX-License-Identifier: MIT
//! Hot-swappable dynamic configuration cache.
//!
//! A [`DbStore`] wraps a keyed configuration record fetched through a
//! [`ConfigDao`]. Construction performs one synchronous load — a store is
//! never handed out empty — then a background task refreshes it on a fixed
//! interval. Each load runs the record's [`DynamicConfig::on_update`] hook
//! (which derives compiled patterns, parsed durations, lookup maps) and only
//! on hook success swaps the current snapshot, so `get()` never observes a
//! partially-applied configuration. A failed refresh keeps the previous
//! snapshot in effect and is reported through metrics, not to callers.
//!
//! [`InMemoryStore`] serves static/offline configuration and tests; it runs
//! the same hook so derived fields are always present.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::error::Error;
use crate::metrics::SharedEmitter;

/// A configuration record that derives state after each load.
pub trait DynamicConfig: Send + Sync + 'static {
    /// Called every time the store loads this record. Failing the hook
    /// rejects the whole load; the previous snapshot stays current.
    fn on_update(&mut self) -> anyhow::Result<()>;
}

/// Consistent-read access to the backing key-value config table.
#[async_trait]
pub trait ConfigDao<T>: Send + Sync {
    async fn get_item(&self, name: &str, table: &str) -> anyhow::Result<T>;
}

/// Read access to a config store. `get` returns an atomic snapshot.
#[async_trait]
pub trait ConfigGetter<T>: Send + Sync {
    async fn get(&self) -> Result<Arc<T>, Error>;

    /// Stop the refresh loop, if any. Idempotent.
    fn close(&self);
}

fn emit_load_success(metrics: &SharedEmitter, name: &str) {
    metrics.emit_dist("config.load.success", 1.0, &[format!("name:{name}")]);
}

fn emit_load_error(metrics: &SharedEmitter, name: &str, code: &str) {
    metrics.emit_dist(
        "config.load.error",
        1.0,
        &[format!("name:{name}"), format!("code:{code}")],
    );
}

/// Periodically refreshed store backed by a [`ConfigDao`].
pub struct DbStore<T> {
    name: String,
    table: String,
    dao: Arc<dyn ConfigDao<T>>,
    snapshot: RwLock<Arc<T>>,
    metrics: SharedEmitter,
    refresh_task: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl<T: DynamicConfig> DbStore<T> {
    /// Load the record once and start the refresh loop.
    ///
    /// Fails if the initial load or its update hook fails — callers get no
    /// store rather than an empty one.
    pub async fn new(
        dao: Arc<dyn ConfigDao<T>>,
        name: impl Into<String>,
        table: impl Into<String>,
        refresh_interval: Duration,
        metrics: SharedEmitter,
    ) -> anyhow::Result<Arc<Self>> {
        let name = name.into();
        let table = table.into();
        let initial = Self::load(&dao, &name, &table, &metrics).await?;
        info!(config = %name, "loaded dynamic config");

        let store = Arc::new(Self {
            name,
            table,
            dao,
            snapshot: RwLock::new(Arc::new(initial)),
            metrics,
            refresh_task: std::sync::Mutex::new(None),
        });

        let handle = Arc::clone(&store).spawn_refresh(refresh_interval);
        *store
            .refresh_task
            .lock()
            .expect("refresh task slot poisoned") = Some(handle);
        Ok(store)
    }

    async fn load(
        dao: &Arc<dyn ConfigDao<T>>,
        name: &str,
        table: &str,
        metrics: &SharedEmitter,
    ) -> anyhow::Result<T> {
        let mut cfg = match dao.get_item(name, table).await {
            Ok(cfg) => cfg,
            Err(err) => {
                emit_load_error(metrics, name, "GetItemError");
                return Err(err);
            }
        };
        if let Err(err) = cfg.on_update() {
            emit_load_error(metrics, name, "UpdateHookError");
            return Err(err);
        }
        emit_load_success(metrics, name);
        Ok(cfg)
    }

    fn spawn_refresh(self: Arc<Self>, interval: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            // First tick fires immediately; skip it, the constructor already loaded.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                match Self::load(&self.dao, &self.name, &self.table, &self.metrics).await {
                    Ok(cfg) => {
                        *self.snapshot.write().await = Arc::new(cfg);
                    }
                    Err(err) => {
                        // Fail open: keep serving the previous snapshot.
                        error!(config = %self.name, %err, "dynamic config refresh failed");
                    }
                }
            }
        })
    }
}

#[async_trait]
impl<T: DynamicConfig> ConfigGetter<T> for DbStore<T> {
    async fn get(&self) -> Result<Arc<T>, Error> {
        Ok(Arc::clone(&*self.snapshot.read().await))
    }

    fn close(&self) {
        if let Some(handle) = self
            .refresh_task
            .lock()
            .expect("refresh task slot poisoned")
            .take()
        {
            handle.abort();
        }
    }
}

impl<T> Drop for DbStore<T> {
    fn drop(&mut self) {
        if let Ok(mut slot) = self.refresh_task.lock() {
            if let Some(handle) = slot.take() {
                handle.abort();
            }
        }
    }
}

/// Static store for offline configuration and tests. No refresh loop; the
/// update hook still runs once at construction.
pub struct InMemoryStore<T> {
    cfg: Arc<T>,
}

impl<T: DynamicConfig> InMemoryStore<T> {
    pub fn new(mut cfg: T) -> anyhow::Result<Self> {
        cfg.on_update()?;
        Ok(Self { cfg: Arc::new(cfg) })
    }
}

#[async_trait]
impl<T: DynamicConfig> ConfigGetter<T> for InMemoryStore<T> {
    async fn get(&self) -> Result<Arc<T>, Error> {
        Ok(Arc::clone(&self.cfg))
    }

    fn close(&self) {}
}
