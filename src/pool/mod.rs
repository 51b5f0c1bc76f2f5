//! Engine resource pool
//!
//! A concurrency-bounded lease manager over remote compute engines.
//! The pool tracks a lease count per engine; `acquire` hands out engines
//! whose count is below the configured concurrency limit, `resize` grows,
//! revalidates and shrinks the member set against the provisioning API.
//!
//! Locking: a tokio `Mutex` (FIFO-fair) admits one acquirer at a time
//! into the scan-and-decide loop, so waiters form a queue and can never
//! race for the same freed slot. The engine map itself sits behind a std
//! `Mutex` that is only held for map mutation, never across an await, so
//! `resize` and `release` interleave freely with a blocked acquirer.

use futures::future::join_all;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

use crate::client::{ClientError, ProvisioningClient};

mod names;

pub use names::{random_suffix, sequential, NameGenerator};

/// Pool errors
#[derive(Error, Debug)]
pub enum PoolError {
    /// The pool has no engines at all; acquiring would stall forever.
    #[error("no engine available: pool is empty")]
    NoEngineAvailable,

    /// The name generator produced a name already present in the pool.
    /// Programmer error, surfaced immediately instead of regenerating.
    #[error("duplicate engine name from generator: {0}")]
    DuplicateEngineName(String),

    /// The service reported failed provisioning, or readiness polling
    /// exhausted its deadline. Absorbed during resize (the slot is
    /// dropped), never propagated to running tests.
    #[error("engine {0} failed provisioning")]
    ProvisionFailed(String),

    #[error(transparent)]
    Client(#[from] ClientError),
}

/// Pool configuration
#[derive(Debug)]
pub struct PoolConfig {
    /// Maximum simultaneous leases per engine
    pub concurrency: usize,

    /// Size passed to the provisioning API for new engines
    pub engine_size: String,

    /// Delay between acquire rescans when every engine is at its limit
    pub acquire_backoff: Duration,

    /// Interval between readiness polls after engine creation
    pub ready_poll_interval: Duration,

    /// Deadline for an engine to become ready
    pub ready_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            concurrency: 1,
            engine_size: "S".to_string(),
            acquire_backoff: Duration::from_secs(1),
            ready_poll_interval: Duration::from_secs(1),
            ready_timeout: Duration::from_secs(600),
        }
    }
}

/// Lease manager over a finite set of named engines
pub struct EnginePool {
    client: Arc<dyn ProvisioningClient>,
    config: PoolConfig,

    /// Engine name -> current lease count
    engines: Mutex<HashMap<String, usize>>,

    /// Serializes the acquire scan-and-decide loop (fair queue)
    admission: tokio::sync::Mutex<()>,

    /// Monotonic counter feeding the name generator
    next_id: AtomicU64,

    /// Default generator, replaceable via `set_name_generator`
    name_generator: Mutex<NameGenerator>,
}

impl EnginePool {
    pub fn new(client: Arc<dyn ProvisioningClient>, config: PoolConfig) -> Self {
        Self {
            client,
            config,
            engines: Mutex::new(HashMap::new()),
            admission: tokio::sync::Mutex::new(()),
            next_id: AtomicU64::new(0),
            name_generator: Mutex::new(names::sequential("txq-engine")),
        }
    }

    /// Replace the default name generator.
    pub fn set_name_generator(&self, generator: NameGenerator) {
        *self.name_generator.lock().unwrap() = generator;
    }

    /// Lease an engine.
    ///
    /// With an explicit name the pool returns it unchecked; the caller
    /// asserts it exists or will be provisioned lazily. Otherwise the
    /// call blocks until some engine has a free lease slot, rescanning
    /// at the configured backoff. An empty pool errors immediately.
    pub async fn acquire(&self, explicit: Option<&str>) -> Result<String, PoolError> {
        if let Some(name) = explicit {
            debug!("acquire: explicit engine {name}");
            return Ok(name.to_string());
        }

        let _admitted = self.admission.lock().await;
        loop {
            {
                let mut engines = self.engines.lock().unwrap();
                if engines.is_empty() {
                    return Err(PoolError::NoEngineAvailable);
                }
                if let Some((name, count)) = engines
                    .iter_mut()
                    .find(|(_, count)| **count < self.config.concurrency)
                {
                    *count += 1;
                    debug!("acquire: leased engine {name} ({count} in use)");
                    return Ok(name.clone());
                }
            }
            debug!("acquire: all engines busy, waiting");
            sleep(self.config.acquire_backoff).await;
        }
    }

    /// Lease an engine with release-on-drop semantics.
    pub async fn acquire_scoped(
        self: &Arc<Self>,
        explicit: Option<&str>,
    ) -> Result<EngineLease, PoolError> {
        let name = self.acquire(explicit).await?;
        Ok(EngineLease {
            pool: Arc::clone(self),
            name,
        })
    }

    /// Return a lease. A no-op for engines the pool no longer tracks
    /// (evicted by validation or removed by a concurrent shrink).
    pub fn release(&self, name: &str) {
        let mut engines = self.engines.lock().unwrap();
        if let Some(count) = engines.get_mut(name) {
            *count = count.saturating_sub(1);
            debug!("release: engine {name} ({count} in use)");
        }
    }

    /// Resize the pool to `target` engines: grow with freshly generated
    /// names, revalidate every member, then shrink. Provisioning calls
    /// run outside the pool lock so other pool users never block on the
    /// network.
    pub async fn resize(
        &self,
        target: usize,
        generator: Option<NameGenerator>,
    ) -> Result<(), PoolError> {
        info!("resizing pool to {target} engines");
        self.grow(target, generator).await?;
        self.validate().await;
        self.shrink(target).await;
        Ok(())
    }

    async fn grow(&self, target: usize, generator: Option<NameGenerator>) -> Result<(), PoolError> {
        // Register new names at lease count 0 under the lock, provision
        // outside it.
        let new_names = {
            let default_generator = self.name_generator.lock().unwrap();
            let generate: &(dyn Fn(u64) -> String + Send + Sync) = match &generator {
                Some(g) => g.as_ref(),
                None => default_generator.as_ref(),
            };

            let mut engines = self.engines.lock().unwrap();
            let mut names: Vec<String> = Vec::new();
            while engines.len() + names.len() < target {
                let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
                let name = generate(id);
                if engines.contains_key(&name) || names.contains(&name) {
                    return Err(PoolError::DuplicateEngineName(name));
                }
                names.push(name);
            }
            for name in &names {
                engines.insert(name.clone(), 0);
            }
            names
        };

        if new_names.is_empty() {
            return Ok(());
        }

        let outcomes = join_all(new_names.into_iter().map(|name| async move {
            let result = self.provision(&name).await;
            (name, result)
        }))
        .await;

        // A flaky engine never fails the whole resize: drop the slot and
        // clean up remotely.
        for (name, result) in outcomes {
            if let Err(e) = result {
                warn!("engine {name} failed provisioning, dropping slot: {e}");
                self.engines.lock().unwrap().remove(&name);
                self.delete_best_effort(&name).await;
            }
        }
        Ok(())
    }

    /// Evict every engine the service no longer reports as ready.
    /// Never raises; eviction failures are logged only.
    async fn validate(&self) {
        let names: Vec<String> = {
            let engines = self.engines.lock().unwrap();
            engines.keys().cloned().collect()
        };

        let checks = join_all(names.into_iter().map(|name| async move {
            let check = self.client.get_engine(&name).await;
            (name, check)
        }))
        .await;

        for (name, check) in checks {
            let ready = matches!(&check, Ok(info) if info.state.is_ready());
            if !ready {
                warn!("engine {name} is not ready, evicting from pool");
                self.engines.lock().unwrap().remove(&name);
                self.delete_best_effort(&name).await;
            }
        }
    }

    async fn shrink(&self, target: usize) {
        let removed: Vec<String> = {
            let mut engines = self.engines.lock().unwrap();
            let mut removed = Vec::new();
            while engines.len() > target {
                let Some(name) = engines.keys().next().cloned() else {
                    break;
                };
                engines.remove(&name);
                removed.push(name);
            }
            removed
        };

        if removed.is_empty() {
            return;
        }

        info!("shrinking pool: removing {} engines", removed.len());
        join_all(removed.iter().map(|name| self.delete_best_effort(name))).await;
    }

    async fn provision(&self, name: &str) -> Result<(), PoolError> {
        info!(
            "provisioning engine {name} (size {})",
            self.config.engine_size
        );
        self.client
            .create_engine(name, &self.config.engine_size)
            .await?;
        self.wait_ready(name).await
    }

    /// Poll the provisioning API until the engine settles or the
    /// readiness deadline passes.
    async fn wait_ready(&self, name: &str) -> Result<(), PoolError> {
        let deadline = Instant::now() + self.config.ready_timeout;
        loop {
            match self.client.get_engine(name).await {
                Ok(info) if info.state.is_settled() => {
                    if info.state.is_ready() {
                        debug!("engine {name} is ready");
                        return Ok(());
                    }
                    return Err(PoolError::ProvisionFailed(name.to_string()));
                }
                Ok(info) => debug!("engine {name} still {}", info.state),
                // Creation may not be visible yet.
                Err(e) if e.is_not_found() => debug!("engine {name} not visible yet"),
                Err(e) => return Err(e.into()),
            }

            if Instant::now() >= deadline {
                warn!("engine {name} did not become ready in time");
                return Err(PoolError::ProvisionFailed(name.to_string()));
            }
            sleep(self.config.ready_poll_interval).await;
        }
    }

    /// Deleting an already-gone engine is expected and non-fatal.
    async fn delete_best_effort(&self, name: &str) {
        if let Err(e) = self.client.delete_engine(name).await {
            debug!("best-effort delete of engine {name} failed: {e}");
        }
    }

    /// Current members and their lease counts, sorted by name.
    pub fn list(&self) -> Vec<(String, usize)> {
        let engines = self.engines.lock().unwrap();
        let mut members: Vec<(String, usize)> =
            engines.iter().map(|(n, c)| (n.clone(), *c)).collect();
        members.sort();
        members
    }

    /// Lease count for one engine, if the pool tracks it.
    pub fn lease_count(&self, name: &str) -> Option<usize> {
        self.engines.lock().unwrap().get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.engines.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.engines.lock().unwrap().is_empty()
    }

    /// Resize to zero: delete every engine in the pool.
    pub async fn destroy_all(&self) -> Result<(), PoolError> {
        self.resize(0, None).await
    }
}

/// A leased engine that returns itself to the pool on drop
pub struct EngineLease {
    pool: Arc<EnginePool>,
    name: String,
}

impl EngineLease {
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for EngineLease {
    fn drop(&mut self) {
        self.pool.release(&self.name);
    }
}

impl std::fmt::Debug for EngineLease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineLease").field("name", &self.name).finish()
    }
}
