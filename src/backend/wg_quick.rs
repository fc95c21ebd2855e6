//! Backend driving the kernel implementation through `wg` and `wg-quick`

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::{debug, info, warn};

use super::Backend;
use crate::config::Config;
use crate::error::{TunnelError, TunnelResult};
use crate::model::statistics::{PeerStatistics, Statistics};
use crate::model::tunnel::{State, Tunnel};
use crate::validation::sanitize_error_message;

/// Runs tunnels with `wg-quick`, reading live state back through `wg`.
///
/// `wg-quick` names the interface after the config file, so each running
/// tunnel gets `<runtime_dir>/<name>.conf`.
pub struct WgQuickBackend {
    runtime_dir: PathBuf,
    wg: String,
    wg_quick: String,
}

impl WgQuickBackend {
    pub fn new<P: Into<PathBuf>>(runtime_dir: P) -> Self {
        Self {
            runtime_dir: runtime_dir.into(),
            wg: "wg".to_string(),
            wg_quick: "wg-quick".to_string(),
        }
    }

    /// Use other executables in place of `wg` and `wg-quick`
    pub fn with_programs(mut self, wg: impl Into<String>, wg_quick: impl Into<String>) -> Self {
        self.wg = wg.into();
        self.wg_quick = wg_quick.into();
        self
    }

    pub fn runtime_path(&self, name: &str) -> PathBuf {
        self.runtime_dir.join(format!("{}.conf", name))
    }

    fn sync_path(&self, name: &str) -> PathBuf {
        self.runtime_dir.join(format!("{}.sync", name))
    }

    async fn run(&self, program: &str, args: &[&str]) -> TunnelResult<String> {
        let cmd = format!("{} {}", program, args.join(" "));
        debug!("Running {}", cmd);
        let output = Command::new(program)
            .args(args)
            .output()
            .await
            .map_err(|e| TunnelError::Backend(format!("Failed to run {}: {}", program, e)))?;

        if !output.status.success() {
            return Err(TunnelError::CommandFailed {
                cmd,
                code: output.status.code(),
                stderr: sanitize_error_message(&String::from_utf8_lossy(&output.stderr)),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    async fn write_secure(&self, path: &Path, content: &str) -> TunnelResult<()> {
        use std::os::unix::fs::PermissionsExt;

        tokio::fs::create_dir_all(&self.runtime_dir)
            .await
            .map_err(|e| runtime_error(&self.runtime_dir, e))?;
        tokio::fs::write(path, content).await.map_err(|e| runtime_error(path, e))?;
        tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
            .await
            .map_err(|e| runtime_error(path, e))?;
        debug!("Wrote {}", path.display());
        Ok(())
    }

    async fn remove_quietly(&self, path: &Path) {
        if let Err(e) = tokio::fs::remove_file(path).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("Failed to remove {}: {}", path.display(), e);
            }
        }
    }

    fn path_arg(path: &Path) -> TunnelResult<&str> {
        path.to_str()
            .ok_or_else(|| TunnelError::Backend(format!("Path is not valid UTF-8: {:?}", path)))
    }

    async fn up(&self, tunnel: &Tunnel) -> TunnelResult<()> {
        let name = tunnel.name();
        let config = tunnel
            .config()
            .ok_or_else(|| TunnelError::Backend(format!("Config of {} is not loaded", name)))?;
        config.validate()?;

        let path = self.runtime_path(&name);
        self.write_secure(&path, &config.to_string()).await?;
        if let Err(e) = self.run(&self.wg_quick, &["up", Self::path_arg(&path)?]).await {
            self.remove_quietly(&path).await;
            return Err(e);
        }
        info!("Tunnel {} is up", name);
        Ok(())
    }

    async fn down(&self, tunnel: &Tunnel) -> TunnelResult<()> {
        let name = tunnel.name();
        let path = self.runtime_path(&name);
        let exists = tokio::fs::try_exists(&path).await.map_err(|e| runtime_error(&path, e))?;
        if !exists {
            // Started outside this backend; wg-quick still needs a file to read
            let config = tunnel
                .config()
                .ok_or_else(|| TunnelError::Backend(format!("Config of {} is not loaded", name)))?;
            self.write_secure(&path, &config.to_string()).await?;
        }
        self.run(&self.wg_quick, &["down", Self::path_arg(&path)?]).await?;
        self.remove_quietly(&path).await;
        info!("Tunnel {} is down", name);
        Ok(())
    }
}

// Runtime files belong to the backend, not to config storage
fn runtime_error(path: &Path, e: std::io::Error) -> TunnelError {
    TunnelError::Backend(format!("{}: {}", path.display(), e))
}

/// Parse the peer lines of `wg show <interface> dump`.
///
/// The first line describes the interface itself. Each following line is
/// tab-separated: public key, preshared key, endpoint, allowed IPs, latest
/// handshake (unix seconds, 0 for never), rx bytes, tx bytes, keepalive.
pub fn parse_dump(dump: &str) -> Statistics {
    let mut statistics = Statistics::new();
    for line in dump.lines().skip(1) {
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() < 7 {
            continue;
        }
        let latest_handshake = fields[4]
            .parse::<i64>()
            .ok()
            .filter(|&secs| secs > 0)
            .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0));
        statistics.add(
            fields[0],
            PeerStatistics {
                rx_bytes: fields[5].parse().unwrap_or(0),
                tx_bytes: fields[6].parse().unwrap_or(0),
                latest_handshake,
            },
        );
    }
    statistics
}

#[async_trait]
impl Backend for WgQuickBackend {
    async fn enumerate(&self) -> TunnelResult<BTreeSet<String>> {
        let output = self.run(&self.wg, &["show", "interfaces"]).await?;
        Ok(output.split_whitespace().map(str::to_string).collect())
    }

    async fn get_state(&self, tunnel: &Tunnel) -> TunnelResult<State> {
        let running = self.enumerate().await?;
        Ok(if running.contains(&tunnel.name()) { State::Up } else { State::Down })
    }

    async fn set_state(&self, tunnel: &Tunnel, state: State) -> TunnelResult<State> {
        let current = self.get_state(tunnel).await?;
        if current == state {
            debug!("Tunnel {} already {}", tunnel.name(), state);
            return Ok(state);
        }
        match state {
            State::Up => self.up(tunnel).await?,
            State::Down => self.down(tunnel).await?,
        }
        Ok(state)
    }

    async fn apply_config(&self, tunnel: &Tunnel, config: &Config) -> TunnelResult<Config> {
        config.validate()?;
        let name = tunnel.name();
        if self.get_state(tunnel).await?.is_up() {
            self.write_secure(&self.runtime_path(&name), &config.to_string()).await?;
            let sync = self.sync_path(&name);
            self.write_secure(&sync, &config.to_wg_string()).await?;
            let result = self
                .run(&self.wg, &["syncconf", name.as_str(), Self::path_arg(&sync)?])
                .await;
            self.remove_quietly(&sync).await;
            result?;
            info!("Applied new config to running tunnel {}", name);
        }
        Ok(config.clone())
    }

    async fn get_statistics(&self, tunnel: &Tunnel) -> TunnelResult<Statistics> {
        let name = tunnel.name();
        if !self.get_state(tunnel).await?.is_up() {
            return Ok(Statistics::new());
        }
        let dump = self.run(&self.wg, &["show", name.as_str(), "dump"]).await?;
        Ok(parse_dump(&dump))
    }
}
