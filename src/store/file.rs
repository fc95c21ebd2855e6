use async_trait::async_trait;
use std::collections::BTreeSet;
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use super::ConfigStore;
use crate::config::Config;
use crate::error::{TunnelError, TunnelResult};

const CONFIG_EXTENSION: &str = "conf";

/// Stores each tunnel as `<dir>/<name>.conf`, readable only by the owner
pub struct FileConfigStore {
    dir: PathBuf,
}

impl FileConfigStore {
    pub fn new<P: Into<PathBuf>>(dir: P) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{}.{}", name, CONFIG_EXTENSION))
    }

    async fn write(&self, path: &Path, config: &Config, create_new: bool) -> TunnelResult<()> {
        let mut options = fs::OpenOptions::new();
        options.write(true).mode(0o600);
        if create_new {
            options.create_new(true);
        } else {
            options.truncate(true);
        }
        let mut file = options.open(path).await?;
        file.write_all(config.to_string().as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}

fn not_found_as(name: &str, error: io::Error) -> TunnelError {
    if error.kind() == io::ErrorKind::NotFound {
        TunnelError::NotFound(name.to_string())
    } else {
        TunnelError::Io(error)
    }
}

#[async_trait]
impl ConfigStore for FileConfigStore {
    async fn enumerate(&self) -> TunnelResult<BTreeSet<String>> {
        let mut names = BTreeSet::new();
        let mut entries = match fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(names),
            Err(e) => return Err(e.into()),
        };
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(CONFIG_EXTENSION) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) {
                names.insert(stem.to_string());
            }
        }
        Ok(names)
    }

    async fn create(&self, name: &str, config: &Config) -> TunnelResult<Config> {
        fs::create_dir_all(&self.dir).await?;
        let path = self.path_for(name);
        debug!("Creating {}", path.display());
        self.write(&path, config, true).await.map_err(|e| match e {
            TunnelError::Io(io) if io.kind() == io::ErrorKind::AlreadyExists => {
                TunnelError::AlreadyExists(name.to_string())
            }
            other => other,
        })?;
        Ok(config.clone())
    }

    async fn load(&self, name: &str) -> TunnelResult<Config> {
        let path = self.path_for(name);
        let content = fs::read_to_string(&path)
            .await
            .map_err(|e| not_found_as(name, e))?;
        Config::parse(&content)
    }

    async fn save(&self, name: &str, config: &Config) -> TunnelResult<Config> {
        let path = self.path_for(name);
        if !fs::try_exists(&path).await? {
            return Err(TunnelError::NotFound(name.to_string()));
        }
        debug!("Saving {}", path.display());
        self.write(&path, config, false).await?;
        Ok(config.clone())
    }

    async fn delete(&self, name: &str) -> TunnelResult<()> {
        let path = self.path_for(name);
        debug!("Deleting {}", path.display());
        fs::remove_file(&path).await.map_err(|e| not_found_as(name, e))
    }

    async fn rename(&self, name: &str, replacement: &str) -> TunnelResult<()> {
        let source = self.path_for(name);
        let target = self.path_for(replacement);
        if fs::try_exists(&target).await? {
            return Err(TunnelError::AlreadyExists(replacement.to_string()));
        }
        debug!("Renaming {} to {}", source.display(), target.display());
        fs::rename(&source, &target).await.map_err(|e| not_found_as(name, e))
    }
}
