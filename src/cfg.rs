use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use log::LevelFilter;
use serde_derive::{Deserialize, Serialize};

use crate::backend::BackendAddress;

pub const DEFAULT_CONFIG_PATH: &str = "./proxy-config.json";

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(untagged)]
pub enum Players {
    Incremental,
    Static {
        max_players: i32,
        online_players: i32,
    },
    Capped {
        max_players: i32,
    },
}

fn placeholder_players() -> Players {
    Players::Static {
        max_players: 1919810,
        online_players: 114514,
    }
}

fn default_version_name() -> String {
    "WynnCraft".to_string()
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct StatusConfig {
    pub motd: String,
    #[serde(default = "default_version_name")]
    pub version_name: String,
    #[serde(default = "placeholder_players")]
    pub players: Players,
    /// PNG served as the server icon.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub favicon: Option<PathBuf>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy)]
#[serde(default)]
pub struct TimeoutConfig {
    pub connect_ms: u64,
    /// Deadline for each client packet read before relaying starts.
    pub handshake_ms: u64,
    /// Relay idle deadline; `null` disables it.
    pub idle_ms: Option<u64>,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        TimeoutConfig {
            connect_ms: 5_000,
            handshake_ms: 10_000,
            idle_ms: Some(60_000),
        }
    }
}

impl TimeoutConfig {
    pub fn connect(&self) -> Duration {
        Duration::from_millis(self.connect_ms)
    }

    pub fn handshake(&self) -> Duration {
        Duration::from_millis(self.handshake_ms)
    }

    pub fn idle(&self) -> Option<Duration> {
        self.idle_ms.map(Duration::from_millis)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct ControlConfig {
    pub enabled: bool,
    pub bind: String,
    pub secret: String,
    /// Verified backends must live under this domain.
    pub host_suffix: String,
    pub max_age_ms: i64,
}

impl Default for ControlConfig {
    fn default() -> Self {
        ControlConfig {
            enabled: true,
            bind: "0.0.0.0:1337".to_string(),
            secret: "Just8Bit".to_string(),
            host_suffix: ".proxy.wynncraft.com".to_string(),
            max_age_ms: 100_000,
        }
    }
}

fn default_max_connections() -> usize {
    10_000
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ProxyConfig {
    pub log_level: LevelFilter,
    pub bind: String,
    pub backend: BackendAddress,
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    pub status: StatusConfig,
    #[serde(default)]
    pub timeouts: TimeoutConfig,
    #[serde(default)]
    pub control: ControlConfig,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        ProxyConfig {
            log_level: LevelFilter::Info,
            bind: "127.0.0.1:25565".to_string(),
            backend: BackendAddress::new("play.wynncraft.com", 25565),
            max_connections: default_max_connections(),
            status: StatusConfig {
                motd: "WynnCraft-Proxy".to_string(),
                version_name: default_version_name(),
                players: placeholder_players(),
                favicon: None,
            },
            timeouts: TimeoutConfig::default(),
            control: ControlConfig::default(),
        }
    }
}

impl ProxyConfig {
    pub fn load(path: &Path) -> anyhow::Result<ProxyConfig> {
        let file = fs::File::open(path)
            .with_context(|| format!("failed to open {}", path.display()))?;
        serde_json::from_reader(file).with_context(|| format!("failed to parse {}", path.display()))
    }

    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let file = fs::File::create(path)
            .with_context(|| format!("failed to create {}", path.display()))?;
        serde_json::to_writer_pretty(file, self)
            .with_context(|| format!("failed to write {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config_fills_defaults() {
        let config: ProxyConfig = serde_json::from_str(
            r#"{
                "log_level": "debug",
                "bind": "0.0.0.0:25565",
                "backend": "lobby.example.com:25565",
                "status": { "motd": "hello" }
            }"#,
        )
        .unwrap();

        assert_eq!(config.log_level, LevelFilter::Debug);
        assert_eq!(config.backend, BackendAddress::new("lobby.example.com", 25565));
        assert_eq!(config.status.players, placeholder_players());
        assert_eq!(config.timeouts.connect(), Duration::from_secs(5));
        assert_eq!(config.max_connections, 10_000);
        assert!(config.control.enabled);
        assert_eq!(config.control.host_suffix, ".proxy.wynncraft.com");
    }

    #[test]
    fn test_player_modes() {
        let incremental: Players = serde_json::from_str("null").unwrap();
        assert_eq!(incremental, Players::Incremental);

        let fixed: Players =
            serde_json::from_str(r#"{"max_players": 20, "online_players": 4}"#).unwrap();
        assert_eq!(
            fixed,
            Players::Static {
                max_players: 20,
                online_players: 4
            }
        );

        let capped: Players = serde_json::from_str(r#"{"max_players": 5}"#).unwrap();
        assert_eq!(capped, Players::Capped { max_players: 5 });
    }

    #[test]
    fn test_idle_timeout_can_be_disabled() {
        let timeouts: TimeoutConfig = serde_json::from_str(r#"{"idle_ms": null}"#).unwrap();
        assert_eq!(timeouts.idle(), None);
        assert_eq!(timeouts.handshake(), Duration::from_secs(10));
    }

    #[test]
    fn test_save_then_load() {
        let path = std::env::temp_dir().join(format!(
            "transfer-proxy-config-{}.json",
            std::process::id()
        ));
        let mut config = ProxyConfig::default();
        config.status.motd = "saved".to_string();
        config.save(&path).unwrap();

        let loaded = ProxyConfig::load(&path).unwrap();
        assert_eq!(loaded.status.motd, "saved");
        assert_eq!(loaded.backend, config.backend);
        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_missing_file_is_an_error() {
        assert!(ProxyConfig::load(Path::new("/nonexistent/proxy-config.json")).is_err());
    }
}
