use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use dashmap::DashSet;
use ulid::Ulid;

use super::StoreError;

/// Answers "does this vehicle exist?" for the engine.
#[async_trait]
pub trait ResourceDirectory: Send + Sync {
    async fn contains(&self, resource_id: Ulid) -> Result<bool, StoreError>;
}

/// Vehicle registry, optionally mirrored to a JSON file so registrations
/// survive a restart.
#[derive(Default)]
pub struct FleetDirectory {
    vehicles: DashSet<Ulid>,
    file: Option<PathBuf>,
    /// Serializes changes so the file always matches one state of the set.
    writer: Mutex<()>,
}

impl FleetDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// In-memory directory holding `ids`.
    pub fn with_vehicles(ids: impl IntoIterator<Item = Ulid>) -> Self {
        let directory = Self::new();
        for id in ids {
            directory.vehicles.insert(id);
        }
        directory.update_gauge();
        directory
    }

    /// Load the vehicles saved at `path` (none if the file does not exist
    /// yet), add `seed`, and rewrite the file on every later change.
    pub fn open(path: &Path, seed: impl IntoIterator<Item = Ulid>) -> Result<Self, StoreError> {
        let saved: Vec<Ulid> = match fs::read(path) {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map_err(|e| StoreError::Backend(format!("{}: {e}", path.display())))?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(StoreError::Backend(format!("{}: {e}", path.display()))),
        };
        let directory = Self {
            file: Some(path.to_path_buf()),
            ..Self::with_vehicles(saved.into_iter().chain(seed))
        };
        directory.save()?;
        tracing::info!("{} vehicles in {}", directory.len(), path.display());
        Ok(directory)
    }

    /// Returns false if the vehicle was already registered.
    pub fn register(&self, id: Ulid) -> Result<bool, StoreError> {
        let _writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        if !self.vehicles.insert(id) {
            return Ok(false);
        }
        if let Err(e) = self.save() {
            self.vehicles.remove(&id);
            return Err(e);
        }
        self.update_gauge();
        Ok(true)
    }

    /// Existing reservations stay in the store; only new ones are refused.
    pub fn retire(&self, id: &Ulid) -> Result<bool, StoreError> {
        let _writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        if self.vehicles.remove(id).is_none() {
            return Ok(false);
        }
        if let Err(e) = self.save() {
            self.vehicles.insert(*id);
            return Err(e);
        }
        self.update_gauge();
        Ok(true)
    }

    pub fn len(&self) -> usize {
        self.vehicles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vehicles.is_empty()
    }

    /// Write the sorted id list next to the target, then rename over it.
    fn save(&self) -> Result<(), StoreError> {
        let Some(path) = &self.file else {
            return Ok(());
        };
        let mut ids: Vec<Ulid> = self.vehicles.iter().map(|id| *id).collect();
        ids.sort();
        let bytes = serde_json::to_vec(&ids).map_err(|e| StoreError::Backend(e.to_string()))?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, bytes)
            .and_then(|()| fs::rename(&tmp, path))
            .map_err(|e| StoreError::Backend(format!("{}: {e}", path.display())))
    }

    fn update_gauge(&self) {
        metrics::gauge!(crate::observability::VEHICLES_REGISTERED).set(self.len() as f64);
    }
}

#[async_trait]
impl ResourceDirectory for FleetDirectory {
    async fn contains(&self, resource_id: Ulid) -> Result<bool, StoreError> {
        Ok(self.vehicles.contains(&resource_id))
    }
}
