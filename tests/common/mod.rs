//! Fakes shared by the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use libwgtunnel::*;
use std::collections::{BTreeSet, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Barrier;

pub const PRIVATE_KEY: &str = "yAnz5TF+lXXJte14tji3zlMNq+hd2rYUIgJBgB3fBmk=";
pub const PEER_KEY: &str = "xTIBA5rboUvnH4htodjb6e697QjLERt1NAB4mZqp8Dg=";

pub fn sample_config() -> Config {
    Config::parse(&format!(
        "[Interface]\nAddress = 10.0.0.2/32\nPrivateKey = {}\n\n[Peer]\nAllowedIPs = 0.0.0.0/0\nEndpoint = 192.0.2.1:51820\nPublicKey = {}\n",
        PRIVATE_KEY, PEER_KEY
    ))
    .unwrap()
}

/// Backend that keeps the running set in memory
#[derive(Default)]
pub struct FakeBackend {
    running: Mutex<BTreeSet<String>>,
    fail_up: Mutex<HashSet<String>>,
    calls: Mutex<Vec<String>>,
    gate: Mutex<Option<Arc<Barrier>>>,
    pub fail_apply: AtomicBool,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_running(names: &[&str]) -> Self {
        let backend = Self::new();
        backend
            .running
            .lock()
            .unwrap()
            .extend(names.iter().map(|n| n.to_string()));
        backend
    }

    /// Make bringing `name` up fail
    pub fn fail_up(&self, name: &str) {
        self.fail_up.lock().unwrap().insert(name.to_string());
    }

    /// Every `set_state` waits on this barrier before acting
    pub fn gate(&self, barrier: Arc<Barrier>) {
        *self.gate.lock().unwrap() = Some(barrier);
    }

    pub fn is_running(&self, name: &str) -> bool {
        self.running.lock().unwrap().contains(name)
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Backend for FakeBackend {
    async fn enumerate(&self) -> TunnelResult<BTreeSet<String>> {
        Ok(self.running.lock().unwrap().clone())
    }

    async fn get_state(&self, tunnel: &Tunnel) -> TunnelResult<State> {
        Ok(if self.is_running(&tunnel.name()) { State::Up } else { State::Down })
    }

    async fn set_state(&self, tunnel: &Tunnel, state: State) -> TunnelResult<State> {
        let gate = self.gate.lock().unwrap().clone();
        if let Some(barrier) = gate {
            barrier.wait().await;
        }
        let name = tunnel.name();
        self.calls.lock().unwrap().push(format!("{} {}", name, state));
        if tunnel.config().is_none() {
            return Err(TunnelError::Backend(format!("{} has no config", name)));
        }
        match state {
            State::Up => {
                if self.fail_up.lock().unwrap().contains(&name) {
                    return Err(TunnelError::Backend(format!("{} refused to start", name)));
                }
                self.running.lock().unwrap().insert(name);
            }
            State::Down => {
                self.running.lock().unwrap().remove(&name);
            }
        }
        Ok(state)
    }

    async fn apply_config(&self, tunnel: &Tunnel, config: &Config) -> TunnelResult<Config> {
        if self.fail_apply.load(Ordering::SeqCst) {
            return Err(TunnelError::Backend(format!("{} rejected the config", tunnel.name())));
        }
        Ok(config.clone())
    }

    async fn get_statistics(&self, tunnel: &Tunnel) -> TunnelResult<Statistics> {
        let mut statistics = Statistics::new();
        if self.is_running(&tunnel.name()) {
            statistics.add(
                PEER_KEY,
                PeerStatistics { rx_bytes: 100, tx_bytes: 50, latest_handshake: None },
            );
        }
        Ok(statistics)
    }
}

/// In-memory store with switchable failures and a load counter
#[derive(Default)]
pub struct FakeStore {
    inner: MemoryConfigStore,
    pub fail_delete: AtomicBool,
    pub fail_rename: AtomicBool,
    pub fail_save: AtomicBool,
    pub loads: AtomicUsize,
    load_delay: Mutex<Option<Duration>>,
}

impl FakeStore {
    pub fn with_tunnels(names: &[&str]) -> Self {
        Self {
            inner: MemoryConfigStore::with_configs(
                names.iter().map(|n| (n.to_string(), sample_config())),
            ),
            ..Self::default()
        }
    }

    pub fn slow_loads(&self, delay: Duration) {
        *self.load_delay.lock().unwrap() = Some(delay);
    }

    pub fn get(&self, name: &str) -> Option<Config> {
        self.inner.get(name)
    }

    fn failure(what: &str) -> TunnelError {
        TunnelError::Storage(format!("{} failed: disk full", what))
    }
}

#[async_trait]
impl ConfigStore for FakeStore {
    async fn enumerate(&self) -> TunnelResult<BTreeSet<String>> {
        self.inner.enumerate().await
    }

    async fn create(&self, name: &str, config: &Config) -> TunnelResult<Config> {
        self.inner.create(name, config).await
    }

    async fn load(&self, name: &str) -> TunnelResult<Config> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        let delay = *self.load_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.inner.load(name).await
    }

    async fn save(&self, name: &str, config: &Config) -> TunnelResult<Config> {
        if self.fail_save.load(Ordering::SeqCst) {
            return Err(Self::failure("save"));
        }
        self.inner.save(name, config).await
    }

    async fn delete(&self, name: &str) -> TunnelResult<()> {
        if self.fail_delete.load(Ordering::SeqCst) {
            return Err(Self::failure("delete"));
        }
        self.inner.delete(name).await
    }

    async fn rename(&self, name: &str, replacement: &str) -> TunnelResult<()> {
        if self.fail_rename.load(Ordering::SeqCst) {
            return Err(Self::failure("rename"));
        }
        self.inner.rename(name, replacement).await
    }
}

pub struct Harness {
    pub manager: TunnelManager,
    pub backend: Arc<FakeBackend>,
    pub store: Arc<FakeStore>,
    pub settings: Arc<MemorySettings>,
}

/// A loaded manager over the given stored and running tunnels
pub async fn harness(stored: &[&str], running: &[&str]) -> Harness {
    harness_with(stored, running, MemorySettings::new()).await
}

pub async fn harness_with(stored: &[&str], running: &[&str], settings: MemorySettings) -> Harness {
    let backend = Arc::new(FakeBackend::with_running(running));
    let store = Arc::new(FakeStore::with_tunnels(stored));
    let settings = Arc::new(settings);
    let manager = TunnelManager::new(
        backend.clone(),
        store.clone(),
        settings.clone(),
        AsyncWorker::new(4),
    );
    manager.load().await.unwrap();
    Harness { manager, backend, store, settings }
}
