//! Connection registry.
//!
//! Maps logical database names to their configuration and to at most one
//! pooled connection each. The pooled connection is opened lazily on first
//! use and shared by every non-parallel execution against that name.
//! Registries are plain values, so tests can build isolated ones.

use std::collections::HashMap;
use std::sync::Arc;

use hedge_core::{DialectKind, HedgeError, Result};
use tokio::sync::{Mutex, OnceCell};

use crate::config::{ConnectionConfig, Connections, FetchOptions};
use crate::database::Database;
use crate::driver::{Connection, Driver};

type PoolSlot = Arc<OnceCell<Arc<dyn Connection>>>;

pub struct ConnectionRegistry {
    connections: Connections,
    drivers: HashMap<DialectKind, Arc<dyn Driver>>,
    pooled: Mutex<HashMap<String, PoolSlot>>,
}

impl ConnectionRegistry {
    pub fn new(connections: Connections) -> Self {
        Self {
            connections,
            drivers: HashMap::new(),
            pooled: Mutex::new(HashMap::new()),
        }
    }

    /// Registry with every driver enabled by cargo features.
    pub fn with_default_drivers(connections: Connections) -> Self {
        #[allow(unused_mut)]
        let mut registry = Self::new(connections);
        #[cfg(feature = "rusqlite")]
        registry.register_driver(
            DialectKind::Sqlite,
            Arc::new(crate::driver::rusqlite::RusqliteDriver::default()),
        );
        #[cfg(feature = "tokio-postgres")]
        registry.register_driver(
            DialectKind::Postgres,
            Arc::new(crate::driver::tokio_postgres::TokioPostgresDriver::default()),
        );
        registry
    }

    /// Register the driver used for every database of `kind`. Replaces any
    /// driver previously registered for it.
    pub fn register_driver(&mut self, kind: DialectKind, driver: Arc<dyn Driver>) -> &mut Self {
        self.drivers.insert(kind, driver);
        self
    }

    pub fn with_driver(mut self, kind: DialectKind, driver: Arc<dyn Driver>) -> Self {
        self.register_driver(kind, driver);
        self
    }

    #[inline]
    pub fn connections(&self) -> &Connections {
        &self.connections
    }

    #[inline]
    pub fn fetch_options(&self) -> &FetchOptions {
        self.connections.fetch_options()
    }

    pub fn config(&self, name: &str) -> Result<&ConnectionConfig> {
        self.connections.get(name)
    }

    fn driver(&self, kind: DialectKind) -> Result<&Arc<dyn Driver>> {
        self.drivers.get(&kind).ok_or(HedgeError::NoDriver(kind))
    }

    /// Handle to the logical database `name`. Resolves the configuration now;
    /// no connection is opened until a statement runs.
    pub fn open(self: &Arc<Self>, name: &str) -> Result<Database> {
        let config = self.config(name)?.clone();
        self.driver(config.kind)?;
        Ok(Database::new(Arc::clone(self), name, config))
    }

    /// The shared connection for `name`, opening it on first use. Concurrent
    /// first callers wait for a single open; a failed open is retried by the
    /// next caller.
    pub async fn pooled(&self, name: &str) -> Result<Arc<dyn Connection>> {
        let config = self.config(name)?;
        let driver = self.driver(config.kind)?;

        let slot = {
            let mut pooled = self.pooled.lock().await;
            Arc::clone(pooled.entry(name.to_string()).or_default())
        };

        let connection = slot
            .get_or_try_init(|| async {
                hedge_core::hedge_trace_stream!("pool open", database = %name);
                driver.open(config).await
            })
            .await?;
        Ok(Arc::clone(connection))
    }

    /// A private connection for `name`, owned by the caller.
    pub async fn open_dedicated(&self, name: &str) -> Result<Arc<dyn Connection>> {
        let config = self.config(name)?;
        let driver = self.driver(config.kind)?;
        driver.open(config).await
    }

    /// Close and forget every pooled connection. Later executions reopen them.
    pub async fn close_pooled(&self) -> Result<()> {
        let slots: Vec<PoolSlot> = {
            let mut pooled = self.pooled.lock().await;
            pooled.drain().map(|(_, slot)| slot).collect()
        };

        let mut first_error = None;
        for slot in slots {
            if let Some(connection) = slot.get()
                && let Err(err) = connection.close().await
            {
                first_error.get_or_insert(err);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

impl std::fmt::Debug for ConnectionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionRegistry")
            .field("connections", &self.connections)
            .field("drivers", &self.drivers.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}
