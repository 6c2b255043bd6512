//! ParleyKernel - owns the registry and its background tasks.

use crate::config::resolve_db_path;
use crate::error::{KernelError, KernelResult};
use crate::reaper::spawn_reaper;
use crate::registry::PeerRegistry;
use crate::supervisor::Supervisor;
use parley_memory::PeerStore;
use parley_types::config::ParleyConfig;
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;
use tracing::info;

/// The rendezvous kernel.
pub struct ParleyKernel {
    pub config: ParleyConfig,
    registry: Arc<PeerRegistry>,
    pub supervisor: Supervisor,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

/// Point-in-time registry counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KernelStatus {
    pub peers: usize,
    pub active: usize,
}

impl ParleyKernel {
    /// Boot with the SQLite store at the configured path.
    pub fn boot(config: ParleyConfig) -> KernelResult<Self> {
        let db_path = resolve_db_path(&config);
        let store = PeerStore::open(&db_path)
            .map_err(|e| KernelError::BootFailed(format!("{}: {e}", db_path.display())))?;
        info!(path = %db_path.display(), "Peer store opened");
        Self::boot_with_store(config, Some(store))
    }

    /// Boot with an explicit store, or none for a memory-only registry.
    pub fn boot_with_store(config: ParleyConfig, store: Option<PeerStore>) -> KernelResult<Self> {
        let registry = match store {
            Some(store) => PeerRegistry::with_store(store)?,
            None => PeerRegistry::new(),
        };
        info!(peers = registry.len(), "Parley kernel booted");
        Ok(Self {
            config,
            registry: Arc::new(registry),
            supervisor: Supervisor::new(),
            tasks: Mutex::new(Vec::new()),
        })
    }

    pub fn registry(&self) -> &Arc<PeerRegistry> {
        &self.registry
    }

    /// Start background tasks (currently just the reaper, when enabled).
    pub fn start_background(&self) {
        if let Some(handle) = spawn_reaper(
            Arc::clone(&self.registry),
            self.config.registry.reaper.clone(),
            self.supervisor.subscribe(),
        ) {
            self.supervisor.record_task();
            if let Ok(mut tasks) = self.tasks.lock() {
                tasks.push(handle);
            }
        }
    }

    pub fn status(&self) -> KernelStatus {
        KernelStatus {
            peers: self.registry.len(),
            active: self.registry.list_active().len(),
        }
    }

    /// Signal shutdown and wait for background tasks to finish.
    pub async fn shutdown(&self) {
        self.supervisor.shutdown();
        let tasks: Vec<JoinHandle<()>> = match self.tasks.lock() {
            Ok(mut tasks) => tasks.drain(..).collect(),
            Err(_) => Vec::new(),
        };
        for task in tasks {
            let _ = task.await;
        }
        info!("Parley kernel stopped");
    }
}
