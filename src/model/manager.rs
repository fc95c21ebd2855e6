//! Tunnel manager
//!
//! Every mutating operation is staged: the tunnel is taken out of the visible
//! collection, the external calls run, and on failure the visible state is put
//! back exactly as it was before the error is returned. Operations on one
//! tunnel are serialised by that tunnel's operation lock; names being created
//! or vacated are held in a reservation set so no other operation can claim
//! them mid-flight.

use futures::future::join_all;
use std::collections::{BTreeSet, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use super::collection::TunnelList;
use super::statistics::Statistics;
use super::tunnel::{State, Tunnel};
use crate::backend::Backend;
use crate::config::Config;
use crate::error::{TunnelError, TunnelResult};
use crate::settings::Settings;
use crate::store::ConfigStore;
use crate::validation::validate_tunnel_name;
use crate::worker::AsyncWorker;

/// Manager-level change notifications
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManagerEvent {
    /// The last used tunnel changed; `None` while cleared
    LastUsedChanged(Option<String>),
}

pub(crate) struct Shared {
    backend: Arc<dyn Backend>,
    store: Arc<dyn ConfigStore>,
    settings: Arc<dyn Settings>,
    worker: AsyncWorker,
    tunnels: TunnelList,
    last_used: Mutex<Option<Weak<Tunnel>>>,
    reserved: Mutex<HashSet<String>>,
    events: broadcast::Sender<ManagerEvent>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A name kept out of reach of create and rename until dropped
struct NameHold<'a> {
    reserved: &'a Mutex<HashSet<String>>,
    name: String,
    held: bool,
}

impl Drop for NameHold<'_> {
    fn drop(&mut self) {
        if self.held {
            lock(self.reserved).remove(&self.name);
        }
    }
}

/// Owns the tunnel collection and coordinates storage and backend.
///
/// Cloning is cheap and every clone drives the same set of tunnels.
#[derive(Clone)]
pub struct TunnelManager {
    shared: Arc<Shared>,
}

impl TunnelManager {
    pub fn new(
        backend: Arc<dyn Backend>,
        store: Arc<dyn ConfigStore>,
        settings: Arc<dyn Settings>,
        worker: AsyncWorker,
    ) -> Self {
        let (events, _) = broadcast::channel(32);
        Self {
            shared: Arc::new(Shared {
                backend,
                store,
                settings,
                worker,
                tunnels: TunnelList::new(),
                last_used: Mutex::new(None),
                reserved: Mutex::new(HashSet::new()),
                events,
            }),
        }
    }

    pub(crate) fn from_shared(shared: Arc<Shared>) -> Self {
        Self { shared }
    }

    /// The live, sorted tunnel collection
    pub fn tunnels(&self) -> &TunnelList {
        &self.shared.tunnels
    }

    pub fn tunnel(&self, name: &str) -> Option<Arc<Tunnel>> {
        self.shared.tunnels.get(name)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ManagerEvent> {
        self.shared.events.subscribe()
    }

    pub fn last_used_tunnel(&self) -> Option<Arc<Tunnel>> {
        lock(&self.shared.last_used).as_ref().and_then(Weak::upgrade)
    }

    fn is_last_used(&self, tunnel: &Arc<Tunnel>) -> bool {
        self.last_used_tunnel()
            .map(|last| Arc::ptr_eq(&last, tunnel))
            .unwrap_or(false)
    }

    fn set_last_used(&self, tunnel: Option<&Arc<Tunnel>>) {
        let name = tunnel.map(|t| t.name());
        *lock(&self.shared.last_used) = tunnel.map(Arc::downgrade);
        if let Err(e) = self.shared.settings.set_last_used_tunnel(name.as_deref()) {
            warn!("Failed to persist last used tunnel: {}", e);
        }
        let _ = self.shared.events.send(ManagerEvent::LastUsedChanged(name));
    }

    /// Claim a name that must be free in both the collection and the reservation set
    fn reserve(&self, name: &str) -> TunnelResult<NameHold<'_>> {
        let mut reserved = lock(&self.shared.reserved);
        if reserved.contains(name) || self.shared.tunnels.contains_key(name) {
            return Err(TunnelError::AlreadyExists(name.to_string()));
        }
        reserved.insert(name.to_string());
        Ok(NameHold {
            reserved: &self.shared.reserved,
            name: name.to_string(),
            held: true,
        })
    }

    /// Hold a name this operation is vacating
    fn hold(&self, name: &str) -> NameHold<'_> {
        let held = lock(&self.shared.reserved).insert(name.to_string());
        NameHold {
            reserved: &self.shared.reserved,
            name: name.to_string(),
            held,
        }
    }

    /// Take the tunnel's operation lock, failing if it left the collection meanwhile
    async fn lock_registered<'t>(
        &self,
        tunnel: &'t Arc<Tunnel>,
    ) -> TunnelResult<tokio::sync::MutexGuard<'t, ()>> {
        let guard = tunnel.op_lock.lock().await;
        if !self.shared.tunnels.contains(tunnel) {
            return Err(TunnelError::NotFound(tunnel.name()));
        }
        Ok(guard)
    }

    /// Re-derive the cached state from the backend after an uncertain failure
    async fn resync_state(&self, tunnel: &Arc<Tunnel>) {
        match self.shared.worker.run(self.shared.backend.get_state(tunnel)).await {
            Ok(state) => {
                debug!("Resynced {} to {}", tunnel.name(), state);
                tunnel.on_state_changed(state);
            }
            Err(e) => warn!("Could not query state of {}: {}", tunnel.name(), e),
        }
    }

    /// Populate the collection from storage, marking running tunnels as up
    pub async fn load(&self) -> TunnelResult<()> {
        let shared = &self.shared;
        let (present, running) = tokio::join!(
            shared.worker.run(shared.store.enumerate()),
            shared.worker.run(shared.backend.enumerate()),
        );
        let present = present?;
        let running = running.unwrap_or_else(|e| {
            warn!("Could not list running tunnels, assuming none: {}", e);
            BTreeSet::new()
        });

        for name in present {
            if shared.tunnels.contains_key(&name) {
                continue;
            }
            let state = if running.contains(&name) { State::Up } else { State::Down };
            let tunnel = Tunnel::new(Arc::downgrade(&self.shared), name, None, state);
            shared.tunnels.add(tunnel)?;
        }

        if let Some(name) = shared.settings.last_used_tunnel() {
            if let Some(tunnel) = shared.tunnels.get(&name) {
                *lock(&shared.last_used) = Some(Arc::downgrade(&tunnel));
                let _ = shared.events.send(ManagerEvent::LastUsedChanged(Some(name)));
            }
        }

        info!("Loaded {} tunnels ({} running)", shared.tunnels.len(), running.len());
        Ok(())
    }

    pub async fn create(&self, name: &str, config: Config) -> TunnelResult<Arc<Tunnel>> {
        validate_tunnel_name(name)?;
        let _reservation = self.reserve(name)?;

        info!("Creating tunnel {}", name);
        let saved = self
            .shared
            .worker
            .run(self.shared.store.create(name, &config))
            .await
            .map_err(|e| {
                error!("Failed to create tunnel {}: {}", name, e);
                e
            })?;

        let tunnel = Tunnel::new(Arc::downgrade(&self.shared), name.to_string(), Some(saved), State::Down);
        self.shared.tunnels.add(tunnel.clone())?;
        Ok(tunnel)
    }

    pub async fn delete(&self, tunnel: &Arc<Tunnel>) -> TunnelResult<()> {
        let _op = self.lock_registered(tunnel).await?;
        let shared = &self.shared;
        let name = tunnel.name();
        let original_state = tunnel.state();
        let was_last_used = self.is_last_used(tunnel);
        let _hold = self.hold(&name);

        info!("Deleting tunnel {}", name);
        if original_state.is_up() {
            // Needed to bring it back up if storage refuses the delete
            tunnel.get_config_async().await?;
        }
        if was_last_used {
            self.set_last_used(None);
        }
        shared.tunnels.remove(tunnel);

        let result: TunnelResult<()> = async {
            if original_state.is_up() {
                shared.worker.run(shared.backend.set_state(tunnel, State::Down)).await?;
            }
            if let Err(e) = shared.worker.run(shared.store.delete(&name)).await {
                if original_state.is_up() {
                    if let Err(restore) = shared.worker.run(shared.backend.set_state(tunnel, State::Up)).await {
                        error!("Failed to bring {} back up: {}", name, restore);
                        self.resync_state(tunnel).await;
                    }
                }
                return Err(e);
            }
            Ok(())
        }
        .await;

        match result {
            Ok(()) => {
                if original_state.is_up() {
                    tunnel.on_state_changed(State::Down);
                }
                info!("Deleted tunnel {}", name);
                Ok(())
            }
            Err(e) => {
                error!("Failed to delete tunnel {}: {}", name, e);
                if let Err(readd) = shared.tunnels.add(tunnel.clone()) {
                    error!("Could not restore {} to the tunnel list: {}", name, readd);
                }
                if was_last_used {
                    self.set_last_used(Some(tunnel));
                }
                Err(e)
            }
        }
    }

    /// Rename a tunnel, returning the name it ends up with
    pub async fn rename(&self, tunnel: &Arc<Tunnel>, new_name: &str) -> TunnelResult<String> {
        validate_tunnel_name(new_name)?;
        let _op = self.lock_registered(tunnel).await?;
        let shared = &self.shared;
        let old_name = tunnel.name();
        if old_name == new_name {
            return Ok(old_name);
        }
        let _reservation = self.reserve(new_name)?;
        let _hold = self.hold(&old_name);
        let original_state = tunnel.state();
        let was_last_used = self.is_last_used(tunnel);

        info!("Renaming tunnel {} to {}", old_name, new_name);
        if original_state.is_up() {
            tunnel.get_config_async().await?;
        }
        if was_last_used {
            self.set_last_used(None);
        }
        shared.tunnels.remove(tunnel);

        let result: TunnelResult<()> = async {
            if original_state.is_up() {
                shared.worker.run(shared.backend.set_state(tunnel, State::Down)).await?;
            }
            if let Err(e) = shared.worker.run(shared.store.rename(&old_name, new_name)).await {
                if original_state.is_up() {
                    if let Err(restore) = shared.worker.run(shared.backend.set_state(tunnel, State::Up)).await {
                        error!("Failed to bring {} back up: {}", old_name, restore);
                    }
                }
                return Err(e);
            }
            tunnel.on_name_changed(new_name.to_string());
            if original_state.is_up() {
                shared.worker.run(shared.backend.set_state(tunnel, State::Up)).await?;
            }
            Ok(())
        }
        .await;

        if let Err(readd) = shared.tunnels.add(tunnel.clone()) {
            error!("Could not restore {} to the tunnel list: {}", tunnel.name(), readd);
        }
        if was_last_used {
            self.set_last_used(Some(tunnel));
        }

        match result {
            Ok(()) => {
                info!("Renamed tunnel {} to {}", old_name, new_name);
                Ok(new_name.to_string())
            }
            Err(e) => {
                error!("Failed to rename tunnel {}: {}", old_name, e);
                self.resync_state(tunnel).await;
                Err(e)
            }
        }
    }

    pub async fn set_tunnel_config(&self, tunnel: &Arc<Tunnel>, config: Config) -> TunnelResult<Config> {
        let _op = self.lock_registered(tunnel).await?;
        let shared = &self.shared;
        let name = tunnel.name();

        debug!("Applying new config to {}", name);
        let applied = shared
            .worker
            .run(shared.backend.apply_config(tunnel, &config))
            .await
            .map_err(|e| {
                error!("Backend rejected config for {}: {}", name, e);
                e
            })?;
        let saved = shared.worker.run(shared.store.save(&name, &applied)).await.map_err(|e| {
            error!("Failed to save config for {}: {}", name, e);
            e
        })?;
        Ok(tunnel.on_config_changed(saved))
    }

    pub async fn set_tunnel_state(&self, tunnel: &Arc<Tunnel>, state: State) -> TunnelResult<State> {
        let _op = self.lock_registered(tunnel).await?;
        let shared = &self.shared;

        info!("Setting {} {}", tunnel.name(), state);
        let result: TunnelResult<State> = async {
            tunnel.get_config_async().await?;
            shared.worker.run(shared.backend.set_state(tunnel, state)).await
        }
        .await;

        match result {
            Ok(new_state) => {
                tunnel.on_state_changed(new_state);
                if new_state.is_up() {
                    self.set_last_used(Some(tunnel));
                }
                Ok(new_state)
            }
            Err(e) => {
                error!("Failed to set {} {}: {}", tunnel.name(), state, e);
                tunnel.on_state_changed(tunnel.state());
                Err(e)
            }
        }
    }

    /// Load the tunnel's config from storage and cache it
    pub async fn get_tunnel_config(&self, tunnel: &Arc<Tunnel>) -> TunnelResult<Config> {
        let name = tunnel.name();
        let config = self.shared.worker.run(self.shared.store.load(&name)).await?;
        debug!("Loaded config for {}", name);
        Ok(tunnel.on_config_changed(config))
    }

    pub async fn get_tunnel_state(&self, tunnel: &Arc<Tunnel>) -> TunnelResult<State> {
        let state = self.shared.worker.run(self.shared.backend.get_state(tunnel)).await?;
        Ok(tunnel.on_state_changed(state))
    }

    pub async fn get_tunnel_statistics(&self, tunnel: &Arc<Tunnel>) -> TunnelResult<Statistics> {
        let statistics = self.shared.worker.run(self.shared.backend.get_statistics(tunnel)).await?;
        Ok(tunnel.on_statistics_changed(statistics))
    }

    /// Record which tunnels are up so `restore_state` can bring them back
    pub fn save_state(&self) -> TunnelResult<()> {
        let running: BTreeSet<String> = self
            .shared
            .tunnels
            .to_vec()
            .iter()
            .filter(|t| t.state().is_up())
            .map(|t| t.name())
            .collect();
        debug!("Saving running tunnels: {:?}", running);
        self.shared.settings.set_running_tunnels(&running)
    }

    /// Bring up every tunnel recorded by `save_state`.
    ///
    /// Does nothing unless restore-on-boot is enabled or `force` is set. Each
    /// tunnel is started independently; the per-tunnel outcomes are returned
    /// once all of them have finished.
    pub async fn restore_state(&self, force: bool) -> Vec<(String, TunnelResult<State>)> {
        let settings = &self.shared.settings;
        if !force && !settings.restore_on_boot() {
            return Vec::new();
        }
        let Some(running) = settings.running_tunnels() else {
            debug!("No saved running tunnels to restore");
            return Vec::new();
        };

        let targets: Vec<Arc<Tunnel>> = self
            .shared
            .tunnels
            .to_vec()
            .into_iter()
            .filter(|t| running.contains(&t.name()))
            .collect();
        info!("Restoring {} tunnels", targets.len());

        join_all(targets.iter().map(|tunnel| async move {
            (tunnel.name(), self.set_tunnel_state(tunnel, State::Up).await)
        }))
        .await
    }
}
