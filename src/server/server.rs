// src/server/server.rs
//! Server lifecycle
//!
//! `connect` boots the storage worker (when configured) and attaches to the
//! store; `start` boots the runner and processor workers; `tick` drives the
//! pipeline; `stop` signals every supervised process.

use crate::queue::{QueueMode, QueueService, WorkQueue};
use crate::store::{Driver, Storage};
use crate::supervisor::{ProcessSupervisor, WorkerRole, STORAGE_READY};
use crate::utils::config::ServerConfig;
use crate::utils::errors::{Result, ServerError};
use crate::world::World;
use futures::future::BoxFuture;
use std::collections::HashMap;
use std::sync::atomic::AtomicI64;
use std::sync::Arc;
use tracing::info;

/// An awaited per-tick extension point
pub type TickHook = Box<dyn Fn() -> BoxFuture<'static, Result<()>> + Send + Sync>;

/// The embeddable simulation server
pub struct SimServer {
    config: ServerConfig,
    storage: Arc<Storage>,
    queues: Arc<QueueService>,
    driver: Arc<Driver>,
    supervisor: ProcessSupervisor,
    users_queue: Option<WorkQueue>,
    rooms_queue: Option<WorkQueue>,
    connected: bool,
    pub(crate) global_hook: Option<TickHook>,
    pub(crate) custom_hook: Option<TickHook>,
    pub(crate) last_rooms_refresh: AtomicI64,
}

impl SimServer {
    pub fn new(config: ServerConfig) -> Self {
        let storage = Arc::new(Storage::new());
        let queues = Arc::new(QueueService::new());
        let driver = Arc::new(Driver::new(Arc::clone(&storage), Arc::clone(&queues)));
        let supervisor = ProcessSupervisor::new(config.logdir.clone(), config.path.clone());
        let last_rooms_refresh = AtomicI64::new(-(config.tick.rooms_refresh_interval as i64));
        Self {
            config,
            storage,
            queues,
            driver,
            supervisor,
            users_queue: None,
            rooms_queue: None,
            connected: false,
            global_hook: None,
            custom_hook: None,
            last_rooms_refresh,
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn storage(&self) -> &Arc<Storage> {
        &self.storage
    }

    pub fn queues(&self) -> &Arc<QueueService> {
        &self.queues
    }

    pub fn driver(&self) -> &Arc<Driver> {
        &self.driver
    }

    pub fn supervisor(&self) -> &ProcessSupervisor {
        &self.supervisor
    }

    pub fn connected(&self) -> bool {
        self.connected
    }

    /// World manipulation facade over this server's store
    pub fn world(&self) -> World {
        World::new(Arc::clone(&self.driver))
    }

    /// Install the global simulation bookkeeping hook
    pub fn set_global_hook<F>(&mut self, hook: F)
    where
        F: Fn() -> BoxFuture<'static, Result<()>> + Send + Sync + 'static,
    {
        self.global_hook = Some(Box::new(hook));
    }

    /// Install the caller-supplied per-tick extension hook
    pub fn set_custom_hook<F>(&mut self, hook: F)
    where
        F: Fn() -> BoxFuture<'static, Result<()>> + Send + Sync + 'static,
    {
        self.custom_hook = Some(Box::new(hook));
    }

    /// Boot the storage worker (when configured) and attach to the store.
    ///
    /// A missing readiness handshake within the configured timeout is a
    /// hard failure; `connect` is not retried automatically.
    pub async fn connect(&mut self) -> Result<()> {
        tokio::fs::create_dir_all(&self.config.path).await?;
        tokio::fs::create_dir_all(&self.config.logdir).await?;

        if let Some(exec) = self.config.workers.storage_exec.clone() {
            info!("Starting storage process.");
            self.supervisor
                .start_process(WorkerRole::Storage, &exec, &self.worker_env())
                .await?;
            self.supervisor
                .await_message(
                    WorkerRole::Storage,
                    STORAGE_READY,
                    self.config.handshake_timeout(),
                )
                .await?;
        }

        self.users_queue = Some(WorkQueue::create(&self.queues, "users", QueueMode::Write));
        self.rooms_queue = Some(WorkQueue::create(&self.queues, "rooms", QueueMode::Write));
        self.connected = true;
        info!("Connected to store.");
        Ok(())
    }

    /// Boot the runner and processor workers and pre-initialize the room
    /// status caches.
    pub async fn start(&mut self) -> Result<()> {
        if !self.connected {
            self.connect().await?;
        }

        info!("Starting engine processes.");
        let env = self.worker_env();
        let engines = [
            (WorkerRole::EngineRunner, self.config.workers.runner_exec.clone()),
            (
                WorkerRole::EngineProcessor,
                self.config.workers.processor_exec.clone(),
            ),
        ];
        for (role, exec) in engines {
            if let Some(exec) = exec {
                self.supervisor.start_process(role, &exec, &env).await?;
            }
        }

        self.driver.update_accessible_rooms_list().await?;
        self.driver.update_room_status_data().await?;
        Ok(())
    }

    /// Send a terminate signal to every supervised process
    pub fn stop(&self) {
        info!("Stopping all processes.");
        self.supervisor.stop_all();
    }

    pub(crate) fn users_queue(&self) -> Result<&WorkQueue> {
        self.users_queue.as_ref().ok_or(ServerError::NotConnected)
    }

    pub(crate) fn rooms_queue(&self) -> Result<&WorkQueue> {
        self.rooms_queue.as_ref().ok_or(ServerError::NotConnected)
    }

    /// Environment handed to every worker process
    fn worker_env(&self) -> HashMap<String, String> {
        let mut env = HashMap::new();
        env.insert(
            "STORAGE_PORT".to_string(),
            self.config.storage_port.to_string(),
        );
        if let Some(modfile) = &self.config.modfile {
            env.insert("MODFILE".to_string(), modfile.display().to_string());
        }
        env
    }
}
