use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::ConfigStore;
use crate::config::Config;
use crate::error::{TunnelError, TunnelResult};

/// Config store kept entirely in process memory
#[derive(Default)]
pub struct MemoryConfigStore {
    configs: Mutex<BTreeMap<String, Config>>,
}

impl MemoryConfigStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the store with existing configs
    pub fn with_configs<I>(configs: I) -> Self
    where
        I: IntoIterator<Item = (String, Config)>,
    {
        Self {
            configs: Mutex::new(configs.into_iter().collect()),
        }
    }

    fn configs(&self) -> MutexGuard<'_, BTreeMap<String, Config>> {
        self.configs.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn get(&self, name: &str) -> Option<Config> {
        self.configs().get(name).cloned()
    }
}

#[async_trait]
impl ConfigStore for MemoryConfigStore {
    async fn enumerate(&self) -> TunnelResult<BTreeSet<String>> {
        Ok(self.configs().keys().cloned().collect())
    }

    async fn create(&self, name: &str, config: &Config) -> TunnelResult<Config> {
        let mut configs = self.configs();
        if configs.contains_key(name) {
            return Err(TunnelError::AlreadyExists(name.to_string()));
        }
        configs.insert(name.to_string(), config.clone());
        Ok(config.clone())
    }

    async fn load(&self, name: &str) -> TunnelResult<Config> {
        self.get(name).ok_or_else(|| TunnelError::NotFound(name.to_string()))
    }

    async fn save(&self, name: &str, config: &Config) -> TunnelResult<Config> {
        match self.configs().get_mut(name) {
            Some(stored) => {
                *stored = config.clone();
                Ok(config.clone())
            }
            None => Err(TunnelError::NotFound(name.to_string())),
        }
    }

    async fn delete(&self, name: &str) -> TunnelResult<()> {
        self.configs()
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| TunnelError::NotFound(name.to_string()))
    }

    async fn rename(&self, name: &str, replacement: &str) -> TunnelResult<()> {
        let mut configs = self.configs();
        if configs.contains_key(replacement) {
            return Err(TunnelError::AlreadyExists(replacement.to_string()));
        }
        let config = configs
            .remove(name)
            .ok_or_else(|| TunnelError::NotFound(name.to_string()))?;
        configs.insert(replacement.to_string(), config);
        Ok(())
    }
}
