// ganglion-node/src/config.rs
//
// The full option set of spec.md §6, deserialised from YAML with a
// handful of `clap` command-line overrides for what operators expect to
// pass at the shell. Grounded on original_source/config.go's `Config`
// struct for the field list, and the teacher's workspace `serde_yaml` +
// `clap` dependencies (wired to a binary here, which the teacher's
// library-only crates never do themselves).

use ganglion_core::ServiceEntry;
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

fn default_service_prefix() -> String {
    ganglion_core::DEFAULT_SERVICE_PREFIX.to_string()
}

fn default_data_path() -> PathBuf {
    PathBuf::from("./ganglion-data")
}

fn default_gossip_port() -> u16 {
    7946
}

fn default_raft_bind() -> SocketAddr {
    "0.0.0.0:7373".parse().unwrap()
}

fn default_snapshots_retained() -> usize {
    3
}

fn default_log_cache_size() -> usize {
    512
}

const fn default_reconcile_interval() -> Duration {
    Duration::from_secs(60)
}

const fn default_connection_deadline() -> Duration {
    Duration::from_secs(5)
}

const fn default_enqueue_timeout() -> Duration {
    Duration::from_secs(30)
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TlsConfig {
    pub cert_path: Option<PathBuf>,
    pub key_path: Option<PathBuf>,
}

/// `GanglionConfig` recognises every option spec.md §6 lists. Hook
/// wiring (membership hooks, leadership hooks, application FSM) is not
/// representable in YAML and is supplied programmatically by whatever
/// embeds `Supervisor`; this struct covers everything else.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GanglionConfig {
    #[serde(default)]
    pub bootstrap: bool,
    pub node_id: String,
    pub node_name: String,
    #[serde(default = "default_data_center")]
    pub data_center: String,
    #[serde(default = "default_service_prefix")]
    pub service_prefix: String,
    #[serde(default = "default_data_path")]
    pub data_path: PathBuf,

    #[serde(default = "default_gossip_bind_addr")]
    pub gossip_bind_addr: IpAddr,
    #[serde(default = "default_gossip_port")]
    pub gossip_bind_port: u16,
    pub gossip_advertise_addr: Option<IpAddr>,
    pub gossip_advertise_port: Option<u16>,

    #[serde(default = "default_raft_bind")]
    pub raft_bind_addr: SocketAddr,

    #[serde(default = "default_snapshots_retained")]
    pub snapshots_retained: usize,
    #[serde(default = "default_log_cache_size")]
    pub log_cache_size: usize,

    #[serde(default)]
    pub tls: TlsConfig,

    #[serde(default = "default_reconcile_interval", with = "humantime_duration")]
    pub reconcile_interval: Duration,
    #[serde(default = "default_connection_deadline", with = "humantime_duration")]
    pub connection_deadline: Duration,
    #[serde(default = "default_enqueue_timeout", with = "humantime_duration")]
    pub enqueue_timeout: Duration,

    /// Raw `name:port(;name:port)*` services tag (spec.md §6), parsed
    /// via `ganglion_core::node::parse_services`.
    #[serde(default)]
    pub services: String,

    #[serde(default)]
    pub existing_nodes: Vec<SocketAddr>,
}

fn default_data_center() -> String {
    "dc1".to_string()
}

fn default_gossip_bind_addr() -> IpAddr {
    "0.0.0.0".parse().unwrap()
}

/// Serialises a `Duration` as whole seconds; keeps the YAML schema
/// readable (`reconcile_interval: 60`) without pulling in a separate
/// duration-parsing crate.
mod humantime_duration {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = u64::deserialize(d)?;
        Ok(Duration::from_secs(secs))
    }
}

impl GanglionConfig {
    pub fn from_yaml_str(yaml: &str) -> anyhow::Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    pub fn from_yaml_file(path: &std::path::Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&raw)
    }

    pub fn parsed_services(&self) -> Result<Vec<ServiceEntry>, String> {
        ganglion_core::node::parse_services(&self.services)
    }

    pub fn gossip_bind_socket(&self) -> SocketAddr {
        SocketAddr::new(self.gossip_bind_addr, self.gossip_bind_port)
    }
}

/// Command-line overrides for the handful of flags operators expect at
/// the shell (spec.md §6 / SPEC_FULL §4 ambient-config note).
#[derive(Debug, clap::Parser)]
#[command(name = "ganglion-node", about = "Ganglion cluster coordination node")]
pub struct CliArgs {
    /// Path to a YAML config file.
    #[arg(long)]
    pub config: PathBuf,

    #[arg(long)]
    pub bootstrap: bool,

    #[arg(long)]
    pub node_name: Option<String>,

    #[arg(long)]
    pub data_path: Option<PathBuf>,
}

impl CliArgs {
    pub fn load(&self) -> anyhow::Result<GanglionConfig> {
        let mut config = GanglionConfig::from_yaml_file(&self.config)?;
        if self.bootstrap {
            config.bootstrap = true;
        }
        if let Some(name) = &self.node_name {
            config.node_name = name.clone();
        }
        if let Some(path) = &self.data_path {
            config.data_path = path.clone();
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_yaml_with_defaults() {
        let yaml = "node_id: n1\nnode_name: n1\n";
        let config = GanglionConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(config.service_prefix, "ganglion");
        assert_eq!(config.reconcile_interval, Duration::from_secs(60));
        assert!(!config.bootstrap);
    }

    #[test]
    fn cli_overrides_win_over_yaml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "node_id: n1\nnode_name: from-yaml\nbootstrap: false\n").unwrap();

        let cli = CliArgs {
            config: path,
            bootstrap: true,
            node_name: Some("from-cli".to_string()),
            data_path: None,
        };
        let config = cli.load().unwrap();
        assert!(config.bootstrap);
        assert_eq!(config.node_name, "from-cli");
    }
}
