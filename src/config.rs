use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub agent: AgentConfig,
    pub uve: UveConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    /// vrouter name reported in VM UVEs; defaults to the system host name.
    pub hostname: Option<String>,
    #[serde(default = "default_bandwidth_interval_usecs")]
    pub bandwidth_interval_usecs: u64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            hostname: None,
            bandwidth_interval_usecs: default_bandwidth_interval_usecs(),
        }
    }
}

fn default_bandwidth_interval_usecs() -> u64 {
    1_000_000
}

#[derive(Debug, Clone, Deserialize)]
pub struct UveConfig {
    pub dispatch_interval_ms: u64,
    /// Capacity of the channel between the dispatch loop and the transport.
    pub channel_capacity: usize,
    /// How often to log app stats (VM count, messages sent) at INFO level.
    #[serde(default = "default_stats_log_interval_secs")]
    pub stats_log_interval_secs: u64,
}

fn default_stats_log_interval_secs() -> u64 {
    60
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
}

impl AppConfig {
    pub fn load() -> anyhow::Result<Self> {
        let path = std::env::var("CONFIG_FILE").unwrap_or_else(|_| "config.toml".into());
        Self::load_from_path(path)
    }

    pub fn load_from_path(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let s = std::fs::read_to_string(path.as_ref())?;
        Self::load_from_str(&s)
    }

    /// Parse and validate config from a string (e.g. for tests).
    pub fn load_from_str(s: &str) -> anyhow::Result<Self> {
        let config: AppConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Configured vrouter name, or the system host name.
    pub fn hostname(&self) -> String {
        self.agent
            .hostname
            .clone()
            .or_else(sysinfo::System::host_name)
            .unwrap_or_default()
    }

    fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            self.agent.bandwidth_interval_usecs > 0,
            "agent.bandwidth_interval_usecs must be > 0, got {}",
            self.agent.bandwidth_interval_usecs
        );
        if let Some(hostname) = &self.agent.hostname {
            anyhow::ensure!(
                !hostname.is_empty(),
                "agent.hostname must be non-empty when set"
            );
        }
        anyhow::ensure!(
            self.uve.dispatch_interval_ms > 0,
            "uve.dispatch_interval_ms must be > 0, got {}",
            self.uve.dispatch_interval_ms
        );
        anyhow::ensure!(
            self.uve.channel_capacity > 0,
            "uve.channel_capacity must be > 0, got {}",
            self.uve.channel_capacity
        );
        anyhow::ensure!(
            self.uve.stats_log_interval_secs > 0,
            "uve.stats_log_interval_secs must be > 0, got {}",
            self.uve.stats_log_interval_secs
        );
        anyhow::ensure!(
            self.server.port > 0,
            "server.port must be between 1 and 65535, got {}",
            self.server.port
        );
        Ok(())
    }
}
