//! A named tunnel handle with cached config, running state and statistics

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tokio::sync::broadcast;
use tracing::debug;

use super::manager::{Shared, TunnelManager};
use super::statistics::Statistics;
use crate::config::Config;
use crate::error::{TunnelError, TunnelResult};

/// Running state of a tunnel
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum State {
    #[default]
    Down,
    Up,
}

impl State {
    pub fn is_up(self) -> bool {
        self == State::Up
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            State::Up => f.write_str("UP"),
            State::Down => f.write_str("DOWN"),
        }
    }
}

/// Change notifications for a single tunnel
#[derive(Debug, Clone, PartialEq)]
pub enum TunnelEvent {
    NameChanged(String),
    ConfigChanged(Config),
    StateChanged(State),
    StatisticsChanged(Statistics),
}

#[derive(Debug)]
struct Cached {
    name: String,
    config: Option<Config>,
    state: State,
    statistics: Option<Statistics>,
}

/// One tunnel as seen by the manager.
///
/// Cached fields change only through the `on_*_changed` callbacks, each of
/// which notifies subscribers before returning. Handles are shared as
/// `Arc<Tunnel>`; the collection owns them and in-flight operations borrow.
pub struct Tunnel {
    cached: Mutex<Cached>,
    events: broadcast::Sender<TunnelEvent>,
    /// Held for the whole of any mutating manager operation on this tunnel
    pub(crate) op_lock: tokio::sync::Mutex<()>,
    /// Single in-flight config load
    load_lock: tokio::sync::Mutex<()>,
    manager: Weak<Shared>,
}

impl Tunnel {
    pub(crate) fn new(
        manager: Weak<Shared>,
        name: String,
        config: Option<Config>,
        state: State,
    ) -> Arc<Self> {
        let (events, _) = broadcast::channel(64);
        Arc::new(Self {
            cached: Mutex::new(Cached {
                name,
                config,
                state,
                statistics: None,
            }),
            events,
            op_lock: tokio::sync::Mutex::new(()),
            load_lock: tokio::sync::Mutex::new(()),
            manager,
        })
    }

    /// A tunnel not attached to any manager
    pub fn detached(name: impl Into<String>, config: Option<Config>, state: State) -> Arc<Self> {
        Self::new(Weak::new(), name.into(), config, state)
    }

    fn cached(&self) -> MutexGuard<'_, Cached> {
        self.cached.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn notify(&self, event: TunnelEvent) {
        // No receivers is not an error
        let _ = self.events.send(event);
    }

    fn manager(&self) -> TunnelResult<TunnelManager> {
        self.manager
            .upgrade()
            .map(TunnelManager::from_shared)
            .ok_or(TunnelError::Shutdown)
    }

    pub fn name(&self) -> String {
        self.cached().name.clone()
    }

    /// Cached config, `None` until loaded
    pub fn config(&self) -> Option<Config> {
        self.cached().config.clone()
    }

    pub fn state(&self) -> State {
        self.cached().state
    }

    /// Cached statistics, `None` until fetched
    pub fn statistics(&self) -> Option<Statistics> {
        self.cached().statistics.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TunnelEvent> {
        self.events.subscribe()
    }

    pub fn on_config_changed(&self, config: Config) -> Config {
        self.cached().config = Some(config.clone());
        self.notify(TunnelEvent::ConfigChanged(config.clone()));
        config
    }

    pub fn on_state_changed(&self, state: State) -> State {
        self.cached().state = state;
        self.notify(TunnelEvent::StateChanged(state));
        state
    }

    /// Rename the cached identity; the collection re-keys the tunnel itself
    pub fn on_name_changed(&self, name: String) -> String {
        debug!("Tunnel {} is now {}", self.name(), name);
        self.cached().name = name.clone();
        self.notify(TunnelEvent::NameChanged(name.clone()));
        name
    }

    pub fn on_statistics_changed(&self, statistics: Statistics) -> Statistics {
        self.cached().statistics = Some(statistics.clone());
        self.notify(TunnelEvent::StatisticsChanged(statistics.clone()));
        statistics
    }

    /// Return the cached config, loading it through the manager on first use.
    ///
    /// Concurrent callers share one load: later callers wait for the first
    /// and then read the value it cached.
    pub async fn get_config_async(self: &Arc<Self>) -> TunnelResult<Config> {
        if let Some(config) = self.config() {
            return Ok(config);
        }
        let _loading = self.load_lock.lock().await;
        if let Some(config) = self.config() {
            return Ok(config);
        }
        self.manager()?.get_tunnel_config(self).await
    }

    /// Query the backend for the real running state
    pub async fn get_state_async(self: &Arc<Self>) -> TunnelResult<State> {
        self.manager()?.get_tunnel_state(self).await
    }

    pub async fn get_statistics_async(self: &Arc<Self>) -> TunnelResult<Statistics> {
        self.manager()?.get_tunnel_statistics(self).await
    }

    pub async fn set_state(self: &Arc<Self>, state: State) -> TunnelResult<State> {
        self.manager()?.set_tunnel_state(self, state).await
    }

    pub async fn set_config(self: &Arc<Self>, config: Config) -> TunnelResult<Config> {
        self.manager()?.set_tunnel_config(self, config).await
    }

    pub async fn set_name(self: &Arc<Self>, name: &str) -> TunnelResult<String> {
        self.manager()?.rename(self, name).await
    }

    pub async fn delete(self: &Arc<Self>) -> TunnelResult<()> {
        self.manager()?.delete(self).await
    }
}

impl fmt::Debug for Tunnel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let cached = self.cached();
        f.debug_struct("Tunnel")
            .field("name", &cached.name)
            .field("state", &cached.state)
            .field("config_loaded", &cached.config.is_some())
            .finish_non_exhaustive()
    }
}
