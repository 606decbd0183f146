// Instance registry
//
// Maps each configured Id to its pipeline. The map lock is held only to find
// or insert an instance; flushing locks the instance itself, so different Ids
// flush concurrently while calls for one Id are serialized.

use crate::instance::{FrameSummary, InstanceError, PluginInstance};
use crate::FlushStatus;
use flightbit_config::{ConfigError, ConfigLookup, PluginConfig};
use flightbit_core::{Record, SinkConnector};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, warn};

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("instance '{id}' could not be created: {source}")]
    Instance {
        id: String,
        #[source]
        source: InstanceError,
    },

    #[error("an instance with Id '{0}' is already registered")]
    DuplicateId(String),
}

type SharedInstance<S> = Arc<Mutex<PluginInstance<S>>>;

pub struct Registry<C: SinkConnector> {
    connector: C,
    instances: RwLock<HashMap<String, SharedInstance<C::Sink>>>,
}

impl<C: SinkConnector> Registry<C> {
    pub fn new(connector: C) -> Self {
        Self {
            connector,
            instances: RwLock::new(HashMap::new()),
        }
    }

    pub fn connector(&self) -> &C {
        &self.connector
    }

    /// Validate flat configuration keys and create the instance.
    pub fn register<L: ConfigLookup + ?Sized>(&self, lookup: &L) -> Result<String, RegistryError> {
        let config = PluginConfig::from_lookup(lookup)?;
        self.register_config(config)
    }

    /// Create an instance from an already validated configuration.
    ///
    /// Returns the Id the instance is registered under.
    pub fn register_config(&self, config: PluginConfig) -> Result<String, RegistryError> {
        let id = config.id.clone();
        if self.instances.read().contains_key(&id) {
            return Err(RegistryError::DuplicateId(id));
        }

        // The session is opened outside the map lock; a racing registration of
        // the same Id loses at insert time and its session is closed again.
        let instance = PluginInstance::create(config, &self.connector).map_err(|source| {
            RegistryError::Instance {
                id: id.clone(),
                source,
            }
        })?;

        let mut instances = self.instances.write();
        if instances.contains_key(&id) {
            drop(instances);
            let mut instance = instance;
            if let Err(err) = instance.close(&self.connector) {
                warn!(instance = %id, error = %err, "failed to close duplicate session");
            }
            return Err(RegistryError::DuplicateId(id));
        }
        instances.insert(id.clone(), Arc::new(Mutex::new(instance)));
        info!(instance = %id, "instance registered");
        Ok(id)
    }

    /// Deliver one frame of records to the instance registered under `id`.
    pub fn flush<I>(&self, id: &str, records: I) -> FlushStatus
    where
        I: IntoIterator<Item = Record>,
    {
        let Some(instance) = self.get(id) else {
            error!(instance = %id, "flush for unknown instance Id");
            return FlushStatus::Error;
        };

        let mut instance = instance.lock();
        match instance.process(&self.connector, records) {
            Ok(summary) => {
                log_summary(id, &summary);
                FlushStatus::Ok
            }
            Err(InstanceError::Sink(err)) if err.is_retryable() => {
                warn!(instance = %id, error = %err, "flush failed; host should retry");
                FlushStatus::Retry
            }
            Err(err) => {
                error!(instance = %id, error = %err, "flush failed");
                FlushStatus::Error
            }
        }
    }

    /// Registered Ids in sorted order.
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.instances.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn contains(&self, id: &str) -> bool {
        self.instances.read().contains_key(id)
    }

    /// Records routed since the last flush of `id`.
    pub fn pending(&self, id: &str) -> Option<usize> {
        self.get(id).map(|instance| instance.lock().pending())
    }

    /// Send every instance's pending rows, close its session and forget it.
    ///
    /// Every instance is closed even when some fail; the first failure is
    /// returned.
    pub fn shutdown(&self) -> Result<(), RegistryError> {
        let drained: Vec<(String, SharedInstance<C::Sink>)> =
            self.instances.write().drain().collect();

        let mut first_error = None;
        for (id, instance) in drained {
            let mut instance = instance.lock();
            let pending = instance.pending();
            match instance.close(&self.connector) {
                Ok(()) => info!(instance = %id, pending, "instance shut down"),
                Err(err) => {
                    error!(instance = %id, error = %err, "instance shutdown failed");
                    if first_error.is_none() {
                        first_error = Some(RegistryError::Instance { id, source: err });
                    }
                }
            }
        }

        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn get(&self, id: &str) -> Option<SharedInstance<C::Sink>> {
        self.instances.read().get(id).cloned()
    }
}

fn log_summary(id: &str, summary: &FrameSummary) {
    if summary.skipped_records > 0 || summary.failed_fields > 0 {
        warn!(
            instance = %id,
            records = summary.records,
            skipped_records = summary.skipped_records,
            failed_fields = summary.failed_fields,
            batches = summary.batches,
            "frame processed with dropped data"
        );
    } else {
        debug!(
            instance = %id,
            records = summary.records,
            batches = summary.batches,
            "frame processed"
        );
    }
}
