//! Backend configuration and factory.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use proctor_core::traits::{AccountService, EvaluationQueue, SubmissionStore, TopicSource};

use crate::file::JsonFileStore;
use crate::memory::{MemoryAccounts, MemoryQueue, MemoryStore, StaticTopics};
use crate::remote::RemoteBackend;

/// Configuration for a single backend.
///
/// Note: Custom Debug impl masks the API token to prevent accidental
/// exposure in logs.
#[derive(Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum BackendConfig {
    Memory {
        #[serde(default = "default_free_limit")]
        free_limit: u32,
        /// Unlimited attempts when set.
        #[serde(default)]
        pro: bool,
    },
    File {
        root: PathBuf,
        #[serde(default = "default_free_limit")]
        free_limit: u32,
        #[serde(default)]
        pro: bool,
    },
    Remote {
        base_url: String,
        api_token: String,
        #[serde(default)]
        poll_interval_ms: Option<u64>,
    },
}

impl std::fmt::Debug for BackendConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendConfig::Memory { free_limit, pro } => f
                .debug_struct("Memory")
                .field("free_limit", free_limit)
                .field("pro", pro)
                .finish(),
            BackendConfig::File {
                root,
                free_limit,
                pro,
            } => f
                .debug_struct("File")
                .field("root", root)
                .field("free_limit", free_limit)
                .field("pro", pro)
                .finish(),
            BackendConfig::Remote {
                api_token: _,
                base_url,
                poll_interval_ms,
            } => f
                .debug_struct("Remote")
                .field("base_url", base_url)
                .field("api_token", &"***")
                .field("poll_interval_ms", poll_interval_ms)
                .finish(),
        }
    }
}

fn default_free_limit() -> u32 {
    3
}

/// Top-level proctor configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProctorConfig {
    /// Backend to run sessions against.
    #[serde(default = "default_backend")]
    pub backend: BackendConfig,
    /// Candidate identity used by the CLI.
    #[serde(default = "default_user_id")]
    pub user_id: String,
    /// Bound on gate/dispatch collaborator calls, in seconds.
    #[serde(default = "default_call_timeout")]
    pub call_timeout_secs: u64,
}

fn default_backend() -> BackendConfig {
    BackendConfig::Memory {
        free_limit: default_free_limit(),
        pro: false,
    }
}

fn default_user_id() -> String {
    "local-candidate".to_string()
}

fn default_call_timeout() -> u64 {
    10
}

impl Default for ProctorConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            user_id: default_user_id(),
            call_timeout_secs: default_call_timeout(),
        }
    }
}

impl ProctorConfig {
    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }
}

/// The wired collaborator set the engine is constructed from.
pub struct BackendHandles {
    pub topics: Arc<dyn TopicSource>,
    pub accounts: Arc<dyn AccountService>,
    pub store: Arc<dyn SubmissionStore>,
    pub queue: Arc<dyn EvaluationQueue>,
}

/// Resolve environment variable references like `${VAR_NAME}` in a string.
fn resolve_env_vars(s: &str) -> String {
    let mut result = s.to_string();
    while let Some(start) = result.find("${") {
        if let Some(end) = result[start..].find('}') {
            let var_name = &result[start + 2..start + end];
            let value = std::env::var(var_name).unwrap_or_default();
            result = format!(
                "{}{}{}",
                &result[..start],
                value,
                &result[start + end + 1..]
            );
        } else {
            break;
        }
    }
    result
}

fn resolve_backend_config(config: &BackendConfig) -> BackendConfig {
    match config {
        BackendConfig::Remote {
            base_url,
            api_token,
            poll_interval_ms,
        } => BackendConfig::Remote {
            base_url: resolve_env_vars(base_url),
            api_token: resolve_env_vars(api_token),
            poll_interval_ms: *poll_interval_ms,
        },
        other => other.clone(),
    }
}

/// Load configuration from well-known paths.
///
/// Search order:
/// 1. `proctor.toml` in the current directory
/// 2. `~/.config/proctor/config.toml`
///
/// Environment variable override: `PROCTOR_API_TOKEN`.
pub fn load_config() -> Result<ProctorConfig> {
    load_config_from(None)
}

/// Load config from an explicit path, or search the default locations.
pub fn load_config_from(path: Option<&Path>) -> Result<ProctorConfig> {
    let config_path = if let Some(p) = path {
        if p.exists() {
            Some(p.to_path_buf())
        } else {
            anyhow::bail!("config file not found: {}", p.display());
        }
    } else {
        let local = PathBuf::from("proctor.toml");
        if local.exists() {
            Some(local)
        } else if let Some(home) = dirs_path() {
            let global = home.join("config.toml");
            if global.exists() {
                Some(global)
            } else {
                None
            }
        } else {
            None
        }
    };

    let mut config = match config_path {
        Some(path) => {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read config: {}", path.display()))?;
            toml::from_str::<ProctorConfig>(&content)
                .with_context(|| format!("failed to parse config: {}", path.display()))?
        }
        None => ProctorConfig::default(),
    };

    if let Ok(token) = std::env::var("PROCTOR_API_TOKEN") {
        if let BackendConfig::Remote { api_token, .. } = &mut config.backend {
            *api_token = token;
        }
    }

    config.backend = resolve_backend_config(&config.backend);
    Ok(config)
}

fn dirs_path() -> Option<PathBuf> {
    std::env::var("HOME")
        .ok()
        .map(|h| PathBuf::from(h).join(".config").join("proctor"))
}

/// Wire up the collaborator set for a backend configuration.
pub fn create_backend(config: &BackendConfig) -> Result<BackendHandles> {
    match config {
        BackendConfig::Memory { free_limit, pro } => {
            let store: Arc<dyn SubmissionStore> = Arc::new(MemoryStore::new());
            let queue = Arc::new(MemoryQueue::new(Arc::clone(&store)));
            let accounts = if *pro {
                MemoryAccounts::pro()
            } else {
                MemoryAccounts::free(*free_limit)
            };
            Ok(BackendHandles {
                topics: Arc::new(StaticTopics::defaults()),
                accounts: Arc::new(accounts),
                store,
                queue,
            })
        }
        BackendConfig::File {
            root,
            free_limit,
            pro,
        } => {
            let store: Arc<dyn SubmissionStore> = Arc::new(JsonFileStore::new(root.clone()));
            let queue = Arc::new(MemoryQueue::new(Arc::clone(&store)));
            let accounts = if *pro {
                MemoryAccounts::pro()
            } else {
                MemoryAccounts::free(*free_limit)
            };
            Ok(BackendHandles {
                topics: Arc::new(StaticTopics::defaults()),
                accounts: Arc::new(accounts),
                store,
                queue,
            })
        }
        BackendConfig::Remote {
            base_url,
            api_token,
            poll_interval_ms,
        } => {
            anyhow::ensure!(!api_token.is_empty(), "remote backend requires an api_token");
            let mut backend = RemoteBackend::new(base_url, api_token);
            if let Some(ms) = poll_interval_ms {
                backend = backend.with_poll_interval(Duration::from_millis(*ms));
            }
            let backend = Arc::new(backend);
            Ok(BackendHandles {
                topics: Arc::clone(&backend) as Arc<dyn TopicSource>,
                accounts: Arc::clone(&backend) as Arc<dyn AccountService>,
                store: Arc::clone(&backend) as Arc<dyn SubmissionStore>,
                queue: backend as Arc<dyn EvaluationQueue>,
            })
        }
    }
}
