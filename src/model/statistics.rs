use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Transfer counters for one peer
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PeerStatistics {
    pub rx_bytes: u64,
    pub tx_bytes: u64,
    pub latest_handshake: Option<DateTime<Utc>>,
}

/// Live statistics of a running tunnel, keyed by peer public key
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Statistics {
    peers: BTreeMap<String, PeerStatistics>,
}

impl Statistics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, public_key: impl Into<String>, stats: PeerStatistics) {
        self.peers.insert(public_key.into(), stats);
    }

    pub fn peer(&self, public_key: &str) -> Option<&PeerStatistics> {
        self.peers.get(public_key)
    }

    pub fn peers(&self) -> impl Iterator<Item = (&str, &PeerStatistics)> {
        self.peers.iter().map(|(key, stats)| (key.as_str(), stats))
    }

    pub fn total_rx(&self) -> u64 {
        self.peers.values().map(|p| p.rx_bytes).sum()
    }

    pub fn total_tx(&self) -> u64 {
        self.peers.values().map(|p| p.tx_bytes).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }
}
