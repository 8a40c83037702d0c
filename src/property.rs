use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::task::JoinHandle;

use crate::compactor;
use crate::engine::{Engine, EngineOptions};
use crate::limits::*;

struct OpenProperty {
    engine: Arc<Engine>,
    compactor: Option<JoinHandle<()>>,
}

/// One engine per hotel property, each with its own WAL file
/// `<data_dir>/<name>.wal` and compactor task.
pub struct PropertyManager {
    properties: DashMap<String, OpenProperty>,
    data_dir: PathBuf,
    options: EngineOptions,
    compact_threshold: u64,
    compact_interval: Duration,
}

impl PropertyManager {
    pub fn new(data_dir: PathBuf, options: EngineOptions, compact_threshold: u64, compact_interval: Duration) -> Self {
        Self {
            properties: DashMap::new(),
            data_dir,
            options,
            compact_threshold,
            compact_interval,
        }
    }

    /// Get the property's engine, replaying its WAL on first use.
    pub fn open(&self, name: &str) -> io::Result<Arc<Engine>> {
        let safe_name = sanitize(name)?;
        if let Some(p) = self.properties.get(&safe_name) {
            return Ok(p.engine.clone());
        }
        if self.properties.len() >= MAX_PROPERTIES {
            return Err(io::Error::other("too many properties"));
        }

        // The entry stays locked while the WAL replays, so a racing open of
        // the same name waits instead of opening the file twice.
        let opened = self
            .properties
            .entry(safe_name.clone())
            .or_try_insert_with(|| self.load(&safe_name))?
            .engine
            .clone();
        metrics::gauge!(crate::observability::PROPERTIES_ACTIVE).set(self.properties.len() as f64);
        Ok(opened)
    }

    fn load(&self, safe_name: &str) -> io::Result<OpenProperty> {
        let wal_path = self.data_dir.join(format!("{safe_name}.wal"));
        let engine = Arc::new(Engine::with_options(wal_path, self.options.clone())?);
        let compactor = (self.compact_threshold > 0).then(|| {
            tokio::spawn(compactor::run_compactor(
                engine.clone(),
                safe_name.to_string(),
                self.compact_threshold,
                self.compact_interval,
            ))
        });
        tracing::info!("property {safe_name} opened");
        Ok(OpenProperty { engine, compactor })
    }

    pub fn get(&self, name: &str) -> Option<Arc<Engine>> {
        let safe_name = sanitize(name).ok()?;
        self.properties.get(&safe_name).map(|p| p.engine.clone())
    }

    /// Open property names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.properties.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    /// Stop every compactor and run a last compaction per property.
    pub async fn shutdown(&self) {
        let mut open: Vec<(String, Arc<Engine>)> = Vec::new();
        for mut entry in self.properties.iter_mut() {
            if let Some(task) = entry.compactor.take() {
                task.abort();
            }
            open.push((entry.key().clone(), entry.engine.clone()));
        }
        for (name, engine) in open {
            match engine.compact_wal().await {
                Ok(()) => tracing::info!("{name}: final compaction done"),
                Err(e) => tracing::error!("{name}: final compaction failed: {e}"),
            }
        }
    }
}

/// Keep `[A-Za-z0-9_-]` so the name is a safe file stem.
fn sanitize(name: &str) -> io::Result<String> {
    if name.len() > MAX_PROPERTY_NAME_LEN {
        return Err(io::Error::new(io::ErrorKind::InvalidInput, "property name too long"));
    }
    let safe: String = name
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-')
        .collect();
    if safe.is_empty() {
        return Err(io::Error::new(io::ErrorKind::InvalidInput, "empty property name"));
    }
    Ok(safe)
}
