use anyhow::Result;
use coinquest_engine::{NetworkEndpoint, TaskCatalog, TaskDefinition};
use coinquest_types::{Coins, NetworkId, TaskId};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub api: ApiSettings,
    pub shortlink: ShortlinkSettings,
    pub withdrawal: WithdrawalSettings,
    pub logging: LoggingConfig,
    #[serde(rename = "task", default)]
    pub tasks: Vec<TaskEntry>,
    #[serde(rename = "network", default)]
    pub networks: Vec<NetworkEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiSettings {
    /// Base URL of the remote account-store API.
    pub base_url: String,
    pub timeout_secs: u64,
    pub max_retries: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShortlinkSettings {
    /// Where the return redirect lands; callback parameters are appended
    /// to this URL.
    pub app_url: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WithdrawalSettings {
    /// Smallest withdrawal the platform accepts, in coins.
    pub min_amount: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    /// "pretty", "compact", or "json".
    pub format: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_output: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskEntry {
    pub id: String,
    pub name: String,
    pub reward: u64,
    pub max_turns: u32,
    pub network: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkEntry {
    pub id: String,
    pub api_url: String,
    pub api_token: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        let networks = [
            "traffictot",
            "uptolink",
            "uptolink2",
            "click1s",
            "layma",
            "site2s",
            "bbmkts",
        ]
        .into_iter()
        .map(|id| NetworkEntry {
            id: id.to_string(),
            api_url: format!("https://api.{id}.example/shorten"),
            api_token: String::new(),
        })
        .collect();

        let tasks = vec![
            TaskEntry {
                id: "traffictot".to_string(),
                name: "Visit sponsor page".to_string(),
                reward: 50,
                max_turns: 4,
                network: "traffictot".to_string(),
            },
            TaskEntry {
                id: "uptolink-2-steps".to_string(),
                name: "Two-step link".to_string(),
                reward: 80,
                max_turns: 3,
                network: "uptolink".to_string(),
            },
            TaskEntry {
                id: "uptolink-3-steps".to_string(),
                name: "Three-step link".to_string(),
                reward: 120,
                max_turns: 2,
                network: "uptolink2".to_string(),
            },
            TaskEntry {
                id: "click1s".to_string(),
                name: "Quick click".to_string(),
                reward: 30,
                max_turns: 5,
                network: "click1s".to_string(),
            },
            TaskEntry {
                id: "layma".to_string(),
                name: "Code hunt".to_string(),
                reward: 100,
                max_turns: 3,
                network: "layma".to_string(),
            },
            TaskEntry {
                id: "site2s".to_string(),
                name: "Sponsored site visit".to_string(),
                reward: 40,
                max_turns: 4,
                network: "site2s".to_string(),
            },
            TaskEntry {
                id: "bbmkts".to_string(),
                name: "Marketplace browse".to_string(),
                reward: 60,
                max_turns: 3,
                network: "bbmkts".to_string(),
            },
        ];

        Self {
            api: ApiSettings {
                base_url: "http://127.0.0.1:3000".to_string(),
                timeout_secs: 10,
                max_retries: 3,
            },
            shortlink: ShortlinkSettings {
                app_url: "http://127.0.0.1:3000/dashboard".to_string(),
                timeout_secs: 10,
            },
            withdrawal: WithdrawalSettings { min_amount: 15 },
            logging: LoggingConfig {
                level: "info".to_string(),
                format: "pretty".to_string(),
                file_output: None,
            },
            tasks,
            networks,
        }
    }
}

impl AppConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Build the validated task catalog. Fails fast on a task that names a
    /// network missing from the `[[network]]` table.
    pub fn build_catalog(&self) -> Result<TaskCatalog> {
        let networks: HashSet<NetworkId> = self
            .networks
            .iter()
            .map(|n| NetworkId::new(n.id.clone()))
            .collect();

        let definitions = self
            .tasks
            .iter()
            .map(|t| TaskDefinition {
                id: TaskId::new(t.id.clone()),
                name: t.name.clone(),
                reward: Coins::new(t.reward),
                max_turns: t.max_turns,
                network: NetworkId::new(t.network.clone()),
            })
            .collect();

        Ok(TaskCatalog::new(definitions, &networks)?)
    }

    /// Shortlink endpoints keyed by network id, for the HTTP provider.
    pub fn network_endpoints(&self) -> HashMap<NetworkId, NetworkEndpoint> {
        self.networks
            .iter()
            .map(|n| {
                (
                    NetworkId::new(n.id.clone()),
                    NetworkEndpoint {
                        api_url: n.api_url.clone(),
                        api_token: n.api_token.clone(),
                    },
                )
            })
            .collect()
    }
}
