use crate::error::{CoreError, Result};
use crate::permissions::Policy;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

// ---------------------------------------------------------------------------
// DockerSettings
// ---------------------------------------------------------------------------

/// How a restart is carried out against the runtime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RestartStrategy {
    /// Stop, then start, as two calls with independent failure points.
    #[default]
    StopThenStart,
    /// A single runtime restart call.
    Native,
}

/// Longest confirmation budget `validate` accepts: one day.
pub const MAX_CONFIRM_BUDGET_SECS: u64 = 24 * 60 * 60;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DockerSettings {
    /// Number of confirmation polls after a lifecycle call.
    #[serde(default = "default_retries")]
    pub retries: u32,
    /// Seconds to wait before each confirmation poll.
    #[serde(default = "default_time_before_retry")]
    pub time_before_retry: u64,
    /// Seconds between background registry refreshes (0 disables).
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval: u64,
    #[serde(default)]
    pub restart_strategy: RestartStrategy,
    /// Queue concurrent lifecycle requests that target the same unit.
    #[serde(default = "default_unit_locking")]
    pub unit_locking: bool,
}

fn default_retries() -> u32 {
    6
}

fn default_time_before_retry() -> u64 {
    5
}

fn default_refresh_interval() -> u64 {
    300
}

fn default_unit_locking() -> bool {
    true
}

impl Default for DockerSettings {
    fn default() -> Self {
        Self {
            retries: default_retries(),
            time_before_retry: default_time_before_retry(),
            refresh_interval: default_refresh_interval(),
            restart_strategy: RestartStrategy::default(),
            unit_locking: default_unit_locking(),
        }
    }
}

impl DockerSettings {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.time_before_retry)
    }

    /// Worst-case wait before a confirmation times out. Saturates instead
    /// of overflowing; `validate` rejects budgets that large.
    pub fn confirm_budget(&self) -> Duration {
        Duration::from_secs(self.time_before_retry.saturating_mul(u64::from(self.retries)))
    }
}

// ---------------------------------------------------------------------------
// RuntimeConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RuntimeConfig {
    /// Drive the `docker` command-line client.
    Cli {
        #[serde(default = "default_docker_binary")]
        binary: String,
    },
    /// Talk to the Docker Engine API over TCP, e.g. `http://127.0.0.1:2375`.
    Http { endpoint: String },
}

fn default_docker_binary() -> String {
    "docker".to_string()
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        RuntimeConfig::Cli {
            binary: default_docker_binary(),
        }
    }
}

// ---------------------------------------------------------------------------
// ServerConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    /// Shared secret the chat gateway presents as a bearer token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gateway_token: Option<String>,
}

fn default_port() -> u16 {
    3141
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            gateway_token: None,
        }
    }
}

// ---------------------------------------------------------------------------
// MetricsConfig
// ---------------------------------------------------------------------------

/// Host CPU and memory sampling. Off unless enabled.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Directory holding `stat` and `meminfo`. In a container, mount the
    /// host's `/proc` somewhere like `/host_proc` and point here.
    #[serde(default = "default_proc_dir")]
    pub proc_dir: PathBuf,
    /// Seconds between samples.
    #[serde(default = "default_metrics_interval")]
    pub interval: u64,
}

fn default_proc_dir() -> PathBuf {
    PathBuf::from("/proc")
}

fn default_metrics_interval() -> u64 {
    660
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            proc_dir: default_proc_dir(),
            interval: default_metrics_interval(),
        }
    }
}

// ---------------------------------------------------------------------------
// Settings (top-level)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub policy: Policy,
    #[serde(default)]
    pub docker: DockerSettings,
    #[serde(default)]
    pub runtime: RuntimeConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl Settings {
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(CoreError::SettingsNotFound(path.to_path_buf()));
        }
        let data = std::fs::read_to_string(path)?;
        Self::parse(&data)
    }

    pub fn parse(data: &str) -> Result<Self> {
        // An empty file is a valid, all-defaults settings file.
        if data.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(data)?)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let data = serde_yaml::to_string(self)?;
        crate::io::atomic_write(path, data.as_bytes())
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();
        let policy = &self.policy;

        // 1. Nobody can do anything
        if policy.admins.is_empty()
            && policy.role_start_permissions.is_empty()
            && policy.role_stop_permissions.is_empty()
            && policy.user_start_permissions.is_empty()
            && policy.user_stop_permissions.is_empty()
        {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: "policy grants no permissions: every request will be denied".to_string(),
            });
        }

        // 2. Empty grant sets are dead entries
        let maps = [
            ("role_start_permissions", &policy.role_start_permissions),
            ("role_stop_permissions", &policy.role_stop_permissions),
            ("user_start_permissions", &policy.user_start_permissions),
            ("user_stop_permissions", &policy.user_stop_permissions),
        ];
        for (map_name, map) in maps {
            let mut ids: Vec<_> = map
                .iter()
                .filter(|(_, grants)| grants.is_empty())
                .map(|(id, _)| *id)
                .collect();
            ids.sort_unstable();
            for id in ids {
                warnings.push(ConfigWarning {
                    level: WarnLevel::Warning,
                    message: format!("{map_name}[{id}] is empty and grants nothing"),
                });
            }
        }

        // 3. Admins listed in user maps: the entry is redundant
        let mut redundant: Vec<_> = policy
            .user_start_permissions
            .keys()
            .chain(policy.user_stop_permissions.keys())
            .filter(|id| policy.admins.contains(id))
            .copied()
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        redundant.sort_unstable();
        for id in redundant {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: format!("user {id} is an admin; their user permissions are redundant"),
            });
        }

        // 4. section_order duplicates
        let mut seen = HashSet::new();
        for section in &policy.section_order {
            if !seen.insert(section.as_str()) {
                warnings.push(ConfigWarning {
                    level: WarnLevel::Warning,
                    message: format!("section '{section}' appears more than once in section_order"),
                });
            }
        }

        // 5. Confirmation budget
        if self.docker.retries == 0 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: "docker.retries is 0: only a single confirmation check will run"
                    .to_string(),
            });
        } else if self.docker.retries > 60 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: format!(
                    "docker.retries={} is unusual (>60); users may wait {}s for an answer",
                    self.docker.retries,
                    self.docker.confirm_budget().as_secs()
                ),
            });
        }

        // 6. A budget nobody would wait for, or one that does not fit
        match self
            .docker
            .time_before_retry
            .checked_mul(u64::from(self.docker.retries))
        {
            Some(secs) if secs <= MAX_CONFIRM_BUDGET_SECS => {}
            _ => warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: format!(
                    "docker.retries * docker.time_before_retry exceeds {MAX_CONFIRM_BUDGET_SECS}s"
                ),
            }),
        }

        // 7. Metrics
        if self.metrics.enabled && self.metrics.interval == 0 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: "metrics.interval must be at least 1 second".to_string(),
            });
        }

        // 8. Runtime endpoint
        if let RuntimeConfig::Http { endpoint } = &self.runtime {
            if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") {
                warnings.push(ConfigWarning {
                    level: WarnLevel::Error,
                    message: format!(
                        "runtime.endpoint '{endpoint}' must start with http:// or https://"
                    ),
                });
            }
        }
        if let RuntimeConfig::Cli { binary } = &self.runtime {
            if binary.trim().is_empty() {
                warnings.push(ConfigWarning {
                    level: WarnLevel::Error,
                    message: "runtime.binary is empty".to_string(),
                });
            }
        }

        warnings
    }
}
