//! Service configuration, loaded once at startup and passed by reference.
//!
//! Layout:
//! ```text
//! ~/.knowledge-capsule/          (or $CAPSULE_DATA_DIR)
//! ├── capsule.toml
//! └── data/
//!     └── knowledge_capsules.db
//! ```
//!
//! Nothing here writes to disk implicitly; persisting changes is an
//! explicit [`Config::save`].

use std::fmt;
use std::path::{Path, PathBuf};
use std::{env, fs, io};

use capsule_core::{DEFAULT_SEARCH_LIMIT, QueryBuilder, ZeroScore};
use serde::{Deserialize, Serialize};

pub const CONFIG_FILE_NAME: &str = "capsule.toml";
pub const DB_FILE_NAME: &str = "knowledge_capsules.db";
pub const DEFAULT_PORT: u16 = 3000;

/// Base directory for config and data: `$CAPSULE_DATA_DIR`, else
/// `~/.knowledge-capsule`.
pub fn default_base_dir() -> PathBuf {
    env::var("CAPSULE_DATA_DIR")
        .ok()
        .filter(|s| !s.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| dirs_home().join(".knowledge-capsule"))
}

pub fn default_config_path() -> PathBuf {
    default_base_dir().join(CONFIG_FILE_NAME)
}

fn dirs_home() -> PathBuf {
    env::var("HOME")
        .or_else(|_| env::var("USERPROFILE"))
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("."))
}

#[derive(Debug)]
pub enum ConfigError {
    Io { path: PathBuf, source: io::Error },
    Parse { path: PathBuf, source: toml::de::Error },
    Serialize(toml::ser::Error),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io { path, source } => write!(f, "{}: {source}", path.display()),
            ConfigError::Parse { path, source } => {
                write!(f, "invalid config {}: {source}", path.display())
            }
            ConfigError::Serialize(e) => write!(f, "failed to serialize config: {e}"),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Io { source, .. } => Some(source),
            ConfigError::Parse { source, .. } => Some(source),
            ConfigError::Serialize(e) => Some(e),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Config {
    pub data_dir: PathBuf,
    pub server: ServerConfig,
    pub search: SearchConfig,
    pub datm: DatmConfig,
}

/// On-disk shape: an absent `data_dir` resolves next to the file itself.
#[derive(Deserialize)]
struct ConfigFile {
    data_dir: Option<PathBuf>,
    #[serde(default)]
    server: ServerConfig,
    #[serde(default)]
    search: SearchConfig,
    #[serde(default)]
    datm: DatmConfig,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub default_limit: usize,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatmConfig {
    /// `preserve` keeps a supplied 0.0; `legacy` turns it into 0.5.
    pub zero_score: ZeroScore,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_limit: DEFAULT_SEARCH_LIMIT,
        }
    }
}

impl Config {
    /// Defaults rooted at `base`.
    pub fn for_base(base: &Path) -> Self {
        Self {
            data_dir: base.join("data"),
            server: ServerConfig::default(),
            search: SearchConfig::default(),
            datm: DatmConfig::default(),
        }
    }

    /// Read `path`, falling back to defaults rooted at the file's directory
    /// when it does not exist. Missing keys take their defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let base = path.parent().unwrap_or_else(|| Path::new("."));
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::debug!("no config at {}, using defaults", path.display());
                return Ok(Self::for_base(base));
            }
            Err(source) => {
                return Err(ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };

        let raw: ConfigFile = toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        tracing::debug!("loaded config from {}", path.display());
        Ok(Self {
            data_dir: raw.data_dir.unwrap_or_else(|| base.join("data")),
            server: raw.server,
            search: raw.search,
            datm: raw.datm,
        })
    }

    /// Write the config to `path`, creating its directory.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(|source| ConfigError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let content = toml::to_string_pretty(self).map_err(ConfigError::Serialize)?;
        fs::write(path, content).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        tracing::info!("saved config to {}", path.display());
        Ok(())
    }

    /// Apply `PORT` from the environment (or any lookup, for tests).
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(port) = lookup("PORT") {
            match port.trim().parse::<u16>() {
                Ok(port) => self.server.port = port,
                Err(_) => tracing::warn!("ignoring unparseable PORT={port}"),
            }
        }
    }

    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join(DB_FILE_NAME)
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    pub fn query_builder(&self) -> QueryBuilder {
        QueryBuilder::new(self.search.default_limit)
    }
}
