//! Observable tunnel model: entities, their collection and the manager

pub mod collection;
pub mod manager;
pub mod statistics;
pub mod tunnel;

pub use collection::{ListEvent, TunnelList};
pub use manager::{ManagerEvent, TunnelManager};
pub use statistics::{PeerStatistics, Statistics};
pub use tunnel::{State, Tunnel, TunnelEvent};
