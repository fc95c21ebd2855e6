//! The network backend that actually runs tunnels
//!
//! The manager never touches interfaces itself; it asks a [`Backend`] to
//! bring a tunnel up or down, to apply a new config to a live interface, and
//! to report what is running.

use async_trait::async_trait;
use std::collections::BTreeSet;

use crate::config::Config;
use crate::error::TunnelResult;
use crate::model::statistics::Statistics;
use crate::model::tunnel::{State, Tunnel};

pub mod wg_quick;

pub use wg_quick::WgQuickBackend;

/// Capability to activate tunnels and report their live state
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Backend: Send + Sync {
    /// Names of the tunnels currently running
    async fn enumerate(&self) -> TunnelResult<BTreeSet<String>>;

    /// Real running state of `tunnel`
    async fn get_state(&self, tunnel: &Tunnel) -> TunnelResult<State>;

    /// Move `tunnel` to `state` and return the state it ended up in.
    ///
    /// Callers make sure the tunnel's config is cached before bringing it up.
    async fn set_state(&self, tunnel: &Tunnel, state: State) -> TunnelResult<State>;

    /// Apply `config` to `tunnel`, rewriting the live interface if it is up.
    /// Returns the config as the backend accepted it.
    async fn apply_config(&self, tunnel: &Tunnel, config: &Config) -> TunnelResult<Config>;

    async fn get_statistics(&self, tunnel: &Tunnel) -> TunnelResult<Statistics>;
}
