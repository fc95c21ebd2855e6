//! wgtunnel - WireGuard Tunnel Management Library
//!
//! Async tunnel management providing:
//! - Lossless parsing and rendering of WireGuard `.conf` files
//! - x25519 key pair generation and public key derivation
//! - An observable, sorted collection of named tunnels
//! - A tunnel manager that keeps the in-memory view, stored configs and
//!   the running backend consistent, rolling back failed operations
//! - Pluggable config storage and tunnel backends (files and `wg-quick`)

pub mod error;
pub mod validation;
pub mod crypto;
pub mod config;
pub mod model;
pub mod worker;
pub mod backend;
pub mod store;
pub mod settings;
pub mod app_config;

// Re-export commonly used types
pub use error::{TunnelError, TunnelResult};
pub use config::{Attribute, Config, Interface, Peer};
pub use crypto::KeyPair;
pub use model::{
    ListEvent, ManagerEvent, PeerStatistics, State, Statistics, Tunnel, TunnelEvent,
    TunnelList, TunnelManager,
};
pub use worker::AsyncWorker;
pub use backend::{Backend, WgQuickBackend};
pub use store::{ConfigStore, FileConfigStore, MemoryConfigStore};
pub use settings::{FileSettings, MemorySettings, Settings};
pub use app_config::AppConfig;
